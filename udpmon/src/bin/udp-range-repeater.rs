//! `udp-range-repeater`: re-injects traffic captured on a port range
//! toward a fixed target address.
//!
//! Redirect mode: only the address is substituted. The destination port
//! always comes from the event, so a deployment covering 5005-5010
//! forwards each datagram to the same port it was originally sent to.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use udpmon::channel;
use udpmon::consumer::{CancelToken, Consumer};
use udpmon::forward::{ForwardPolicy, Forwarder};
use udpmon_common::PortRange;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Forward captured UDP traffic from a port range to a target host.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// UDP port or inclusive port range the capture filter is deployed
    /// for, e.g. 5005 or 5005-5010.
    port_range: PortRange,

    /// Address to forward packets to; the port is taken from each packet.
    target_ip: Ipv4Addr,

    /// Log every forwarded packet and send failure.
    #[arg(short, long)]
    debug: bool,

    /// Root of the BPF filesystem the capture maps are pinned under.
    #[arg(long, default_value = channel::DEFAULT_PIN_ROOT)]
    pin_root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = udpmon::parse_args();
    udpmon::init_tracing(args.debug);

    let path = channel::ring_buffer_path(&args.pin_root, args.port_range);
    let ring = channel::open(&path)?;

    let mut forwarder = Forwarder::new(ForwardPolicy::Redirect { addr: args.target_ip })?;
    tracing::info!(
        "range repeater started for UDP {} -> {}",
        args.port_range,
        args.target_ip
    );

    let cancel = CancelToken::for_signals()?;
    Consumer::new(ring, POLL_INTERVAL)
        .run(&mut forwarder, &cancel)
        .await;

    tracing::info!("range repeater stopped");
    Ok(())
}
