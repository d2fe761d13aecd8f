use std::time::{Duration, Instant};

use tdswire_mux::{ConnConfig, Connection};
use tdswire_packet::{PacketStatus, PacketType};

use crate::cmd::ProbeArgs;
use crate::exit::{mux_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_probe, OutputFormat};

const PROBE_PAYLOAD: &[u8] = b"tdswire-probe";

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = ConnConfig::default()
        .with_read_timeout(Some(timeout))
        .with_write_timeout(Some(timeout));

    let conn = Connection::connect(args.addr.as_str(), config)
        .map_err(|err| mux_error("connect failed", err))?;

    let started = Instant::now();
    conn.send_message(
        args.channel,
        PacketType::Echo,
        PacketStatus::empty(),
        PROBE_PAYLOAD,
    )
    .map_err(|err| mux_error("send failed", err))?;

    let message = conn
        .receive_message_timeout(args.channel, timeout)
        .map_err(|err| mux_error("receive failed", err))?;
    let elapsed = started.elapsed();

    print_probe(&args.addr, &message, elapsed, format);
    Ok(SUCCESS)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
