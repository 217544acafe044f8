//! SBN Client command line tool
//!
//! Opens a session on the native bus client library, then either listens on
//! the command pipe or sends a single packet.
//!
//! # Usage
//!
//! ```text
//! sbn_client --library ./sbn_client.so listen --msg-id 0x1880 --msg-id 0x0880
//! sbn_client send command --apid 0x80 --function-code 2 --payload 0102
//! sbn_client send telemetry --apid 0x81 --seconds 1000 --payload deadbeef
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

use sbn_client::protocol::Sequence;
use sbn_client::{init_logging, BusHeader, ClientConfig};

#[cfg(unix)]
use sbn_client::{MsgId, NativeBus, Session, Timeout};
#[cfg(unix)]
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "sbn_client", version, about = "Software Bus Network client")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bus client shared library (overrides the config file)
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// Log filter (overrides the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe and print the headers of received packets
    Listen(ListenArgs),
    /// Build and transmit one packet
    #[command(subcommand)]
    Send(SendCommand),
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Message id to subscribe to (repeatable, hex with 0x prefix accepted)
    #[arg(short, long = "msg-id", value_parser = parse_u32, required = true)]
    msg_ids: Vec<u32>,

    /// Stop after this many packets
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Receive timeout in milliseconds; waits forever when omitted
    #[arg(short, long)]
    timeout_ms: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum SendCommand {
    Command {
        #[arg(long, value_parser = parse_u16)]
        apid: u16,
        #[arg(long, value_parser = parse_u8)]
        function_code: u8,
        #[command(flatten)]
        common: SendArgs,
    },
    Telemetry {
        #[arg(long, value_parser = parse_u16)]
        apid: u16,
        #[arg(long, default_value_t = 0)]
        seconds: u32,
        #[arg(long, default_value_t = 0)]
        subseconds: u16,
        #[command(flatten)]
        common: SendArgs,
    },
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Payload as hex bytes
    #[arg(long, default_value = "")]
    payload: String,

    /// Sequence count
    #[arg(long, default_value_t = 0)]
    sequence: u16,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let v = parse_u32(s)?;
    u16::try_from(v).map_err(|_| format!("{s} does not fit in 16 bits"))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let v = parse_u32(s)?;
    u8::try_from(v).map_err(|_| format!("{s} does not fit in 8 bits"))
}

fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if !s.is_ascii() {
        bail!("hex payload contains non-ASCII characters");
    }
    if s.len() % 2 != 0 {
        bail!("hex payload has an odd number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte {:?}", &s[i..i + 2]))
        })
        .collect()
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(library) = &cli.library {
        config = config.with_library_path(library);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

#[cfg(unix)]
fn listen(session: &mut Session<NativeBus>, args: &ListenArgs) -> anyhow::Result<()> {
    for &id in &args.msg_ids {
        session
            .subscribe(MsgId(id))
            .with_context(|| format!("subscribe {:#06x}", id))?;
    }

    let timeout = args.timeout_ms.map_or(Timeout::PendForever, Timeout::Millis);
    let mut received = 0u64;

    while args.count.map_or(true, |n| received < n) {
        match session.receive(timeout) {
            Ok(packet) => {
                received += 1;
                println!("{} payload={}B", packet.header, packet.payload.len());
            }
            Err(e) if e.is_malformed() => warn!(error = %e, "discarding packet"),
            Err(e) if e.status().is_some_and(|s| s.is_timeout()) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Header and payload described by a `send` subcommand.
fn build_packet(cmd: &SendCommand) -> anyhow::Result<(BusHeader, Vec<u8>)> {
    let (header, common) = match cmd {
        SendCommand::Command {
            apid,
            function_code,
            common,
        } => (BusHeader::command(*apid, *function_code), common),
        SendCommand::Telemetry {
            apid,
            seconds,
            subseconds,
            common,
        } => (BusHeader::telemetry(*apid, *seconds, *subseconds), common),
    };
    let header = header.with_sequence(Sequence::unsegmented(common.sequence));
    let payload = parse_hex(&common.payload)?;
    if payload.len() > header.max_payload() {
        bail!(
            "payload of {} bytes exceeds {} byte limit",
            payload.len(),
            header.max_payload()
        );
    }
    Ok((header, payload))
}

#[cfg(unix)]
fn send(session: &mut Session<NativeBus>, cmd: &SendCommand) -> anyhow::Result<()> {
    let (header, payload) = build_packet(cmd)?;
    session.send(&header, &payload)?;
    println!("sent {} payload={}B", header.msg_id(), payload.len());
    Ok(())
}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    let mut session = Session::open(&config)
        .with_context(|| format!("open session on {}", config.library_path.display()))?;

    let result = match &cli.command {
        Command::Listen(args) => listen(&mut session, args),
        Command::Send(cmd) => send(&mut session, cmd),
    };

    session.close();
    result
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;
    if let Command::Send(cmd) = &cli.command {
        build_packet(cmd)?;
    }
    bail!("the native bus client can only be loaded on unix targets")
}
