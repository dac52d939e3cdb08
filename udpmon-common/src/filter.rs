//! Host-side model of the capture decision.
//!
//! The XDP program in `udpmon-ebpf` must express every bound as a guard
//! the kernel verifier can check against the packet pointers, which
//! rules out running it in a unit test. This module is the same
//! decision sequence over a plain byte slice: one bounded pass, guarded
//! early exits, and an irrevocable pass/consume outcome. The tests here
//! pin down the behavior the XDP rendition mirrors instruction for
//! instruction.

use crate::{capture_len, CaptureEvent, PortRange, MAX_CAPTURE_SIZE};

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;

const IPPROTO_UDP: u8 = 17;

// Byte offsets within the IPv4 and UDP headers.
const IPV4_PROTO: usize = 9;
const IPV4_SADDR: usize = 12;
const IPV4_DADDR: usize = 16;
const UDP_SPORT: usize = 0;
const UDP_DPORT: usize = 2;
const UDP_LEN: usize = 4;

/// Outcome of the capture filter for one frame.
///
/// `Pass` hands the frame to the normal network stack untouched.
/// `Consume` swallows it; the frame is never delivered further, whether
/// or not an event was emitted. Both decisions are final.
#[derive(Clone, Copy)]
pub enum FilterDecision {
    Pass,
    Consume(Option<CaptureEvent>),
}

/// Decides what to do with one link-layer frame.
///
/// Mirrors the XDP program exactly: truncated headers and non-matching
/// traffic pass through; a matching datagram is consumed, emitting an
/// event unless its capture length is zero. Channel backpressure is the
/// one condition this model cannot see; the XDP side consumes without
/// emitting when reservation fails.
pub fn evaluate(frame: &[u8], range: PortRange) -> FilterDecision {
    if frame.len() < ETH_HDR_LEN {
        return FilterDecision::Pass;
    }

    let ip = ETH_HDR_LEN;
    if frame.len() < ip + IPV4_HDR_LEN {
        return FilterDecision::Pass;
    }
    if frame[ip + IPV4_PROTO] != IPPROTO_UDP {
        return FilterDecision::Pass;
    }

    let udp = ip + IPV4_HDR_LEN;
    if frame.len() < udp + UDP_HDR_LEN {
        return FilterDecision::Pass;
    }

    let dport = read_be16(frame, udp + UDP_DPORT);
    if !range.contains(dport) {
        return FilterDecision::Pass;
    }

    let payload = udp + UDP_HDR_LEN;
    let declared = (read_be16(frame, udp + UDP_LEN) as u32).saturating_sub(UDP_HDR_LEN as u32);
    let available = (frame.len() - payload) as u32;
    let len = capture_len(declared, available);
    if len == 0 {
        return FilterDecision::Consume(None);
    }

    let mut event = CaptureEvent {
        saddr: read_ne32(frame, ip + IPV4_SADDR),
        sport: read_be16(frame, udp + UDP_SPORT),
        daddr: read_ne32(frame, ip + IPV4_DADDR),
        dport,
        payload_len: len,
        data: [0; MAX_CAPTURE_SIZE],
    };
    event.data[..len as usize].copy_from_slice(&frame[payload..payload + len as usize]);
    FilterDecision::Consume(Some(event))
}

/// Big-endian 16-bit field, converted to host order.
fn read_be16(frame: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([frame[offset], frame[offset + 1]])
}

/// 32-bit field kept in network byte order, as it sits in the frame.
fn read_ne32(frame: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    #[cfg(not(feature = "user"))]
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use core::net::Ipv4Addr;

    /// Builds an Ethernet + IPv4 + UDP frame. `declared_payload_len`
    /// overrides the UDP length field when the header should lie about
    /// how much payload follows.
    fn udp_frame(
        src: Ipv4Addr,
        sport: u16,
        dst: Ipv4Addr,
        dport: u16,
        payload: &[u8],
        declared_payload_len: Option<u16>,
    ) -> Vec<u8> {
        let mut frame = Vec::new();
        // Ethernet: addresses and ethertype are irrelevant to the filter.
        frame.extend_from_slice(&[0u8; 12]);
        frame.extend_from_slice(&0x0800u16.to_be_bytes());

        let ip_total = (IPV4_HDR_LEN + UDP_HDR_LEN + payload.len()) as u16;
        frame.push(0x45); // version 4, IHL 5
        frame.push(0);
        frame.extend_from_slice(&ip_total.to_be_bytes());
        frame.extend_from_slice(&[0u8; 5]); // id, flags, fragment offset, ttl
        frame.push(IPPROTO_UDP);
        frame.extend_from_slice(&[0u8; 2]); // checksum
        frame.extend_from_slice(&src.octets());
        frame.extend_from_slice(&dst.octets());

        let udp_len =
            declared_payload_len.map_or((UDP_HDR_LEN + payload.len()) as u16, |len| {
                UDP_HDR_LEN as u16 + len
            });
        frame.extend_from_slice(&sport.to_be_bytes());
        frame.extend_from_slice(&dport.to_be_bytes());
        frame.extend_from_slice(&udp_len.to_be_bytes());
        frame.extend_from_slice(&[0u8; 2]); // checksum
        frame.extend_from_slice(payload);
        frame
    }

    fn hello_frame() -> Vec<u8> {
        udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5005,
            b"HELLO",
            None,
        )
    }

    #[test]
    fn truncated_headers_pass_through() {
        let frame = hello_frame();
        let range = PortRange::single(5005);
        // Every prefix shorter than the full set of headers passes.
        for len in 0..ETH_HDR_LEN + IPV4_HDR_LEN + UDP_HDR_LEN {
            assert!(
                matches!(evaluate(&frame[..len], range), FilterDecision::Pass),
                "prefix of {len} bytes should pass through"
            );
        }
    }

    #[test]
    fn non_udp_protocol_passes_through() {
        let mut frame = hello_frame();
        frame[ETH_HDR_LEN + IPV4_PROTO] = 6; // TCP
        assert!(matches!(
            evaluate(&frame, PortRange::single(5005)),
            FilterDecision::Pass
        ));
    }

    #[test]
    fn port_outside_range_passes_through() {
        let frame = udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            6000,
            b"HELLO",
            None,
        );
        assert!(matches!(
            evaluate(&frame, PortRange::single(5005)),
            FilterDecision::Pass
        ));

        let range = PortRange::new(5005, 5010);
        for (dport, expect_match) in [(5004, false), (5005, true), (5007, true), (5010, true), (5011, false)] {
            let frame = udp_frame(
                Ipv4Addr::new(10, 0, 0, 1),
                4000,
                Ipv4Addr::new(10, 0, 0, 2),
                dport,
                b"x",
                None,
            );
            let consumed = matches!(evaluate(&frame, range), FilterDecision::Consume(Some(_)));
            assert_eq!(consumed, expect_match, "dport {dport}");
        }
    }

    #[test]
    fn matching_datagram_is_consumed_with_one_event() {
        let FilterDecision::Consume(Some(event)) =
            evaluate(&hello_frame(), PortRange::single(5005))
        else {
            panic!("expected a consumed frame with an event");
        };
        assert_eq!(event.source().ip(), &Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(event.sport, 4000);
        assert_eq!(event.destination().ip(), &Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(event.dport, 5005);
        assert_eq!(event.payload_len, 5);
        assert_eq!(event.payload(), b"HELLO");
    }

    #[test]
    fn zero_length_payload_is_consumed_silently() {
        let frame = udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5005,
            b"",
            None,
        );
        assert!(matches!(
            evaluate(&frame, PortRange::single(5005)),
            FilterDecision::Consume(None)
        ));
    }

    #[test]
    fn lying_udp_length_is_clamped_to_frame_bytes() {
        // Header declares 100 payload bytes; only 5 are on the wire.
        let frame = udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5005,
            b"HELLO",
            Some(100),
        );
        let FilterDecision::Consume(Some(event)) = evaluate(&frame, PortRange::single(5005))
        else {
            panic!("expected an event");
        };
        assert_eq!(event.payload_len, 5);
        assert_eq!(event.payload(), b"HELLO");
    }

    #[test]
    fn declared_length_bounds_the_capture() {
        // Frame carries trailing bytes past the declared UDP payload.
        let mut frame = udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5005,
            b"HELLO",
            Some(5),
        );
        frame.extend_from_slice(b"JUNK");
        let FilterDecision::Consume(Some(event)) = evaluate(&frame, PortRange::single(5005))
        else {
            panic!("expected an event");
        };
        assert_eq!(event.payload(), b"HELLO");
    }

    #[test]
    fn oversized_payload_truncates_to_capacity() {
        let exact = [0xabu8; MAX_CAPTURE_SIZE];
        let frame = udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5005,
            &exact,
            None,
        );
        let FilterDecision::Consume(Some(event)) = evaluate(&frame, PortRange::single(5005))
        else {
            panic!("expected an event");
        };
        assert_eq!(event.payload_len as usize, MAX_CAPTURE_SIZE);
        assert_eq!(event.payload(), &exact[..]);

        let over = [0xcdu8; MAX_CAPTURE_SIZE + 1];
        let frame = udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5005,
            &over,
            None,
        );
        let FilterDecision::Consume(Some(event)) = evaluate(&frame, PortRange::single(5005))
        else {
            panic!("expected an event");
        };
        assert_eq!(event.payload_len as usize, MAX_CAPTURE_SIZE);
        assert_eq!(event.payload(), &over[..MAX_CAPTURE_SIZE]);
    }
}
