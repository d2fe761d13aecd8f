use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tdswire_packet::{PacketConfig, PacketError, PacketReader};
use tdswire_transport::TcpTransport;

use crate::cmd::ListenArgs;
use crate::exit::{packet_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        TcpTransport::bind(args.addr.as_str()).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let config = PacketConfig {
        max_packet_size: args.max_packet_size,
        ..PacketConfig::default()
    };
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        let mut reader = PacketReader::with_config(stream, config.clone());

        while running.load(Ordering::SeqCst) {
            let packet = match reader.read_packet() {
                Ok(packet) => packet,
                Err(PacketError::ConnectionClosed) => break,
                Err(err) => return Err(packet_error("receive failed", err)),
            };

            if let Some(channels) = &args.channels {
                if !channels.contains(&packet.header.channel) {
                    continue;
                }
            }

            print_packet(&packet, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
