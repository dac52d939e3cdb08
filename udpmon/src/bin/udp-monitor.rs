//! `udp-monitor`: prints every captured datagram for a deployed port
//! range as a human-readable summary with a hex payload preview.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use udpmon::channel;
use udpmon::consumer::{CancelToken, ConsoleSink, Consumer};
use udpmon_common::PortRange;

const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Watch captured UDP traffic for a deployed port range.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// UDP port or inclusive port range being monitored, e.g. 5005 or 5005-5010.
    port_range: PortRange,

    /// Root of the BPF filesystem the capture maps are pinned under.
    #[arg(long, default_value = channel::DEFAULT_PIN_ROOT)]
    pin_root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = udpmon::parse_args();
    udpmon::init_tracing(false);

    let path = channel::ring_buffer_path(&args.pin_root, args.port_range);
    tracing::info!(
        "monitoring UDP {} via ring buffer {}",
        args.port_range,
        path.display()
    );
    let ring = channel::open(&path)?;

    let cancel = CancelToken::for_signals()?;
    tracing::info!("listening for captured packets, press Ctrl-C to stop");

    let mut sink = ConsoleSink;
    Consumer::new(ring, POLL_INTERVAL).run(&mut sink, &cancel).await;

    tracing::info!("monitor stopped");
    Ok(())
}
