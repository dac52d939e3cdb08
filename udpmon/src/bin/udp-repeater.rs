//! `udp-repeater`: re-injects traffic captured on a single port toward a
//! target address and port.
//!
//! Forwards in pass-through mode with the target acting as overrides:
//! with no arguments beyond the source port, everything goes to
//! 127.0.0.1 on the captured port.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use udpmon::channel;
use udpmon::consumer::{CancelToken, Consumer};
use udpmon::forward::{ForwardPolicy, Forwarder};
use udpmon_common::PortRange;

/// Forward captured UDP traffic from one port to a new destination.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// UDP port the capture filter is deployed for.
    source_port: u16,

    /// Address to forward packets to.
    #[arg(default_value_t = Ipv4Addr::LOCALHOST)]
    target_ip: Ipv4Addr,

    /// Port to forward packets to [default: the source port].
    target_port: Option<u16>,

    /// Log every forwarded packet and send failure.
    #[arg(short, long)]
    debug: bool,

    /// Poll interval in milliseconds.
    #[arg(short, long, default_value_t = 100)]
    interval: u64,

    /// Root of the BPF filesystem the capture maps are pinned under.
    #[arg(long, default_value = channel::DEFAULT_PIN_ROOT)]
    pin_root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = udpmon::parse_args();
    udpmon::init_tracing(args.debug);

    if args.source_port == 0 {
        anyhow::bail!("invalid source port: 0 (expected 1-65535)");
    }
    if args.interval == 0 {
        anyhow::bail!("invalid poll interval: 0 (expected milliseconds > 0)");
    }

    let range = PortRange::single(args.source_port);
    let target_port = args.target_port.unwrap_or(args.source_port);

    let path = channel::ring_buffer_path(&args.pin_root, range);
    let ring = channel::open(&path)?;

    let mut forwarder = Forwarder::new(ForwardPolicy::PassThrough {
        addr: Some(args.target_ip),
        port: Some(target_port),
    })?;
    tracing::info!(
        "repeater started for port {} -> {}:{}",
        args.source_port,
        args.target_ip,
        target_port
    );

    let cancel = CancelToken::for_signals()?;
    Consumer::new(ring, Duration::from_millis(args.interval))
        .run(&mut forwarder, &cancel)
        .await;

    tracing::info!("repeater stopped");
    Ok(())
}
