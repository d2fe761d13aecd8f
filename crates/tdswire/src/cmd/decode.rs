use std::fs;

use bytes::BytesMut;
use tdswire_packet::decode_packet;

use crate::cmd::DecodeArgs;
use crate::exit::{packet_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let data = resolve_input(&args)?;
    let mut buf = BytesMut::from(&data[..]);

    while !buf.is_empty() {
        match decode_packet(&mut buf, args.max_packet_size) {
            Ok(Some(packet)) => print_packet(&packet, format),
            Ok(None) => {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("input ends with a truncated packet ({} bytes left)", buf.len()),
                ))
            }
            Err(err) => return Err(packet_error("decode failed", err)),
        }
    }

    Ok(SUCCESS)
}

fn resolve_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Err(CliError::new(
        USAGE,
        "provide a hex string argument or --file",
    ))
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(CliError::new(USAGE, "hex input must not be empty"));
    }
    if compact.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex input has odd length ({})", compact.len()),
        ));
    }

    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex at offset {i}")))
        })
        .collect()
}
