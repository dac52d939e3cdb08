//! Data contract between the XDP capture filter and userspace.
//!
//! Everything here is `no_std` and fixed-size: the eBPF verifier rejects
//! anything it cannot prove bounded, and the two sides share no allocator.
//! The `user` feature adds the `aya::Pod` impls the userspace loader needs.

#![cfg_attr(not(feature = "user"), no_std)]

use core::net::{Ipv4Addr, SocketAddrV4};

pub mod filter;

/// Capacity of the payload buffer in a [`CaptureEvent`].
///
/// One full Ethernet MTU worth of UDP payload. Larger datagrams are
/// truncated to this many bytes; `payload_len` still never exceeds it.
pub const MAX_CAPTURE_SIZE: usize = 1500;

/// One intercepted UDP datagram, as emitted by the capture filter.
///
/// The record has fixed total size regardless of the actual payload
/// length: `data` is a fixed buffer and `payload_len` says how much of
/// it is meaningful. Bytes past `payload_len` are unspecified padding
/// and must never be interpreted.
///
/// `#[repr(C)]` so kernel and userspace agree on layout byte-for-byte.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CaptureEvent {
    /// Source IPv4 address in network byte order.
    pub saddr: u32,
    /// Source port in host byte order.
    pub sport: u16,
    /// Destination IPv4 address in network byte order.
    pub daddr: u32,
    /// Destination port in host byte order.
    pub dport: u16,
    /// Number of valid bytes in `data`. Always `<= MAX_CAPTURE_SIZE`.
    pub payload_len: u32,
    /// Captured payload bytes.
    pub data: [u8; MAX_CAPTURE_SIZE],
}

impl CaptureEvent {
    /// The valid captured payload, `data[..payload_len]`.
    pub fn payload(&self) -> &[u8] {
        let len = (self.payload_len as usize).min(MAX_CAPTURE_SIZE);
        &self.data[..len]
    }

    /// Original sender of the captured datagram.
    pub fn source(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.saddr.to_ne_bytes()), self.sport)
    }

    /// Original target of the captured datagram.
    pub fn destination(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.daddr.to_ne_bytes()), self.dport)
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for CaptureEvent {}

/// The inclusive port range a deployment is scoped to.
///
/// Fixed at deployment time: the loader bakes it into the eBPF object as
/// a read-only global, and the pinned map path encodes it. There is no
/// runtime feedback from userspace into the filter.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub const fn single(port: u16) -> Self {
        Self { start: port, end: port }
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }
}

impl core::fmt::Display for PortRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Error returned when a port-range string does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPortRange;

impl core::fmt::Display for InvalidPortRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("expected PORT or START-END with ports in 1-65535 and START <= END")
    }
}

#[cfg(feature = "user")]
impl std::error::Error for InvalidPortRange {}

impl core::str::FromStr for PortRange {
    type Err = InvalidPortRange;

    /// Parses `"5005"` or `"5005-5010"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let range = match s.split_once('-') {
            Some((start, end)) => PortRange::new(
                start.trim().parse().map_err(|_| InvalidPortRange)?,
                end.trim().parse().map_err(|_| InvalidPortRange)?,
            ),
            None => PortRange::single(s.trim().parse().map_err(|_| InvalidPortRange)?),
        };
        if range.start == 0 || range.start > range.end {
            return Err(InvalidPortRange);
        }
        Ok(range)
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for PortRange {}

/// Number of payload bytes the filter captures for one datagram.
///
/// The minimum of what the UDP header declares, what is actually present
/// in the frame, and the fixed event buffer capacity. The declared
/// length wins only when the frame really carries that many bytes, so a
/// lying header can never make the copy overrun the frame.
pub fn capture_len(declared: u32, available: u32) -> u32 {
    declared.min(available).min(MAX_CAPTURE_SIZE as u32)
}
