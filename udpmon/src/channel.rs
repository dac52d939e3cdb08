//! Access to the transport channel: the ring buffer the capture filter
//! pins in the BPF filesystem.
//!
//! The pin path encodes the deployment's port scope, so a consumer only
//! ever needs the range it was given on the command line to find the
//! channel. The map outlives any consumer; it exists from the moment
//! the capture filter is deployed until it is unloaded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use aya::maps::{Map, MapData, RingBuf};
use udpmon_common::PortRange;

/// Default root of the BPF filesystem.
pub const DEFAULT_PIN_ROOT: &str = "/sys/fs/bpf";

/// File name of the pinned ring buffer inside the maps directory.
pub const RING_BUFFER_FILE: &str = "ring_buffer";

/// Directory the loader pins a deployment's maps under.
///
/// `udp_monitor_<port>_maps` for a single port,
/// `udp_monitor_<start>_<end>_maps` for a range.
pub fn map_dir(range: PortRange) -> String {
    if range.is_single() {
        format!("udp_monitor_{}_maps", range.start)
    } else {
        format!("udp_monitor_{}_{}_maps", range.start, range.end)
    }
}

/// Full path of the pinned ring buffer for a deployment scope.
pub fn ring_buffer_path(pin_root: &Path, range: PortRange) -> PathBuf {
    pin_root.join(map_dir(range)).join(RING_BUFFER_FILE)
}

/// Opens the pinned ring buffer for polling.
///
/// Fails when no capture filter for this scope is deployed, which is a
/// setup error the tools report before entering their loop.
pub fn open(path: &Path) -> anyhow::Result<RingBuf<MapData>> {
    let data = MapData::from_pin(path).with_context(|| {
        format!(
            "failed to open ring buffer at {} (is the capture filter for this range deployed?)",
            path.display()
        )
    })?;
    RingBuf::try_from(Map::RingBuf(data))
        .with_context(|| format!("pinned map at {} is not a ring buffer", path.display()))
}

/// Removes a deployment's pins: the ring buffer file, when present, and
/// then the maps directory itself.
///
/// Used both on orderly unload and when deployment fails after the maps
/// directory was created, so no scope is ever left blocked by residue a
/// dead deployment left behind.
pub fn remove_pins(pin_root: &Path, range: PortRange) -> std::io::Result<()> {
    let dir = pin_root.join(map_dir(range));
    let file = dir.join(RING_BUFFER_FILE);
    if file.exists() {
        fs::remove_file(&file)?;
    }
    fs::remove_dir(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_port_dir_collapses_the_range() {
        assert_eq!(map_dir(PortRange::single(5005)), "udp_monitor_5005_maps");
        assert_eq!(map_dir(PortRange::new(5005, 5005)), "udp_monitor_5005_maps");
    }

    #[test]
    fn range_dir_names_both_ends() {
        assert_eq!(
            map_dir(PortRange::new(5005, 5010)),
            "udp_monitor_5005_5010_maps"
        );
    }

    #[test]
    fn ring_buffer_path_is_rooted_at_the_pin_root() {
        let path = ring_buffer_path(Path::new("/sys/fs/bpf"), PortRange::new(5005, 5010));
        assert_eq!(
            path,
            PathBuf::from("/sys/fs/bpf/udp_monitor_5005_5010_maps/ring_buffer")
        );
    }

    #[test]
    fn open_fails_without_a_deployment() {
        // `expect_err` needs the Ok type to be `Debug`, which `RingBuf` is not.
        let err = match open(Path::new("/nonexistent/udp_monitor_1_maps/ring_buffer")) {
            Ok(_) => panic!("open should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("is the capture filter"));
    }

    #[test]
    fn remove_pins_clears_file_and_directory() {
        let root = std::env::temp_dir().join(format!("udpmon-pins-{}", std::process::id()));
        let range = PortRange::single(5005);
        let dir = root.join(map_dir(range));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RING_BUFFER_FILE), b"").unwrap();

        remove_pins(&root, range).unwrap();
        assert!(!dir.exists());

        // Directory created but never pinned, as after a failed deploy.
        fs::create_dir_all(&dir).unwrap();
        remove_pins(&root, range).unwrap();
        assert!(!dir.exists());

        fs::remove_dir(&root).unwrap();
    }
}
