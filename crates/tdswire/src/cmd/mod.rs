use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a hex packet stream and print each packet.
    Decode(DecodeArgs),
    /// Probe a server with an echo packet and time the round trip.
    Probe(ProbeArgs),
    /// Listen and print received packets.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded packet stream (whitespace ignored).
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw packet bytes from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Largest packet length to accept.
    #[arg(long, default_value_t = 512)]
    pub max_packet_size: u16,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Server address (host:port).
    pub addr: String,
    /// Channel to probe on.
    #[arg(long, short = 'c', default_value_t = 0)]
    pub channel: u16,
    /// Time to wait for the echo response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (host:port).
    pub addr: String,
    /// Filter to specific channels (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u16>>,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Largest packet length to accept.
    #[arg(long, default_value_t = 512)]
    pub max_packet_size: u16,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
