//! Multi-channel example: two logical requests multiplexed over one
//! connection, echoed back by a packet-level server.
//!
//! Run with:
//!   cargo run --example multi-channel

use std::thread;

use tdswire::mux::{ConnConfig, Connection};
use tdswire::packet::{PacketReader, PacketStatus, PacketType, PacketWriter};
use tdswire::transport::TcpTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpTransport::bind("127.0.0.1:0")?;
    let addr = listener.local_addr();

    let server = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let stream = listener.accept()?;
            let write_half = stream.try_clone()?;
            let mut reader = PacketReader::new(stream);
            let mut writer = PacketWriter::new(write_half);

            // Echo packets until both messages have completed.
            let mut completed = 0;
            while completed < 2 {
                let packet = reader.read_packet()?;
                eprintln!("[server] {}", packet.header);
                if packet.is_eom() {
                    completed += 1;
                }
                writer.write_packet(&packet)?;
            }
            Ok(())
        },
    );

    let conn = Connection::connect(addr, ConnConfig::default())?;

    // A language batch on channel 1 and a bulk transfer on channel 2
    // share the connection; responses come back per channel.
    conn.send_message(1, PacketType::Lang, PacketStatus::empty(), &b"select 1"[..])?;
    conn.send_message(2, PacketType::Bulk, PacketStatus::empty(), &b"bulk payload bytes"[..])?;

    let bulk = conn.receive_message(2)?;
    eprintln!(
        "[client] channel 2 ({}): {}",
        bulk.msg_type,
        String::from_utf8_lossy(&bulk.payload)
    );

    let lang = conn.receive_message(1)?;
    eprintln!(
        "[client] channel 1 ({}): {}",
        lang.msg_type,
        String::from_utf8_lossy(&lang.payload)
    );

    server
        .join()
        .expect("server thread should not panic")
        .expect("server should complete without error");
    Ok(())
}
