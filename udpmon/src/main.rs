//! `udp-capture`: deploys the XDP capture filter for one port range.
//!
//! Loads the eBPF object with the range baked in as a read-only global,
//! attaches it to the interface, and pins the ring buffer where the
//! consumer tools expect it. The pins live as long as this process;
//! unloading removes them and the filter together.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;

use aya::programs::{Xdp, XdpFlags};
use aya::EbpfLoader;

use udpmon::channel;
use udpmon::consumer::CancelToken;
use udpmon_common::PortRange;

/// Deploy the UDP capture filter for a port or port range.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// UDP port or inclusive port range to intercept, e.g. 5005 or 5005-5010.
    port_range: PortRange,

    /// Network interface to attach the XDP program to.
    #[arg(short, long, default_value = "eth0")]
    iface: String,

    /// Root of the BPF filesystem to pin the maps under.
    #[arg(long, default_value = channel::DEFAULT_PIN_ROOT)]
    pin_root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = udpmon::parse_args();
    udpmon::init_tracing(false);

    // -- eBPF setup --------------------------------------------------------
    let mut bpf = EbpfLoader::new()
        .set_global("PORT_RANGE", &args.port_range, true)
        .load(aya::include_bytes_aligned!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../udpmon-ebpf/target/bpfel-unknown-none/debug/udpmon"
        )))
        .context("failed to load eBPF object")?;

    let program: &mut Xdp = bpf
        .program_mut("udp_capture")
        .context("program udp_capture not found in eBPF object")?
        .try_into()?;
    program.load()?;
    program
        .attach(&args.iface, XdpFlags::default())
        .with_context(|| format!("failed to attach XDP program to {}", args.iface))?;
    tracing::info!(
        "capture filter attached to {} for UDP {}",
        args.iface,
        args.port_range
    );

    // -- Pin the transport channel -----------------------------------------
    let maps_dir = args.pin_root.join(channel::map_dir(args.port_range));
    fs::create_dir_all(&maps_dir)
        .with_context(|| format!("failed to create {}", maps_dir.display()))?;
    let ring_path = maps_dir.join(channel::RING_BUFFER_FILE);
    let pinned = bpf
        .map("RING_BUFFER")
        .context("map RING_BUFFER not found in eBPF object")
        .and_then(|map| {
            map.pin(&ring_path).with_context(|| {
                format!(
                    "failed to pin ring buffer at {} (already deployed for this range?)",
                    ring_path.display()
                )
            })
        });
    if let Err(err) = pinned {
        // A failed deployment must not leave the maps directory behind.
        if let Err(cleanup_err) = channel::remove_pins(&args.pin_root, args.port_range) {
            tracing::warn!(error = %cleanup_err, "failed to remove maps directory");
        }
        return Err(err);
    }
    tracing::info!("ring buffer pinned at {}", ring_path.display());

    // -- Wait for shutdown -------------------------------------------------
    let cancel = CancelToken::for_signals()?;
    tracing::info!("capture filter deployed, press Ctrl-C to unload");
    while !cancel.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Dropping `bpf` detaches the program; the pins must go explicitly
    // so a later deployment of the same range can pin again.
    if let Err(err) = channel::remove_pins(&args.pin_root, args.port_range) {
        tracing::warn!(error = %err, "failed to remove pinned maps");
    }
    tracing::info!("capture filter unloaded");
    Ok(())
}
