#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action::{XDP_DROP, XDP_PASS},
    helpers::bpf_probe_read_kernel_buf,
    macros::{map, xdp},
    maps::RingBuf,
    programs::XdpContext,
};
use core::ptr;
use network_types::{
    eth::EthHdr,
    ip::{IpProto, Ipv4Hdr},
    udp::UdpHdr,
};
use udpmon_common::{capture_len, CaptureEvent, PortRange};

#[no_mangle]
#[link_section = "license"]
pub static _license: [u8; 4] = *b"GPL\0";

/// Port range this deployment is scoped to. Written once by the loader
/// via `set_global` before the object is loaded; `read_volatile` keeps
/// the symbol from being constant-folded away.
#[no_mangle]
static PORT_RANGE: PortRange = PortRange::new(0, 0);

/// Transport channel to userspace. Sized generously so a slow consumer
/// costs dropped events, never a stalled receive path.
#[map]
static RING_BUFFER: RingBuf = RingBuf::with_byte_size(1 << 24, 0);

/// XDP entry point.
///
/// One bounded pass per frame, every dereference behind an explicit
/// bounds check against `data_end`, and field-by-field struct writes so
/// no compiler-generated `memcpy`/`memset` lands outside this section.
/// The decision is final: a matching frame is consumed (XDP_DROP) and
/// never reaches the normal stack; everything else passes through
/// untouched.
#[xdp]
pub fn udp_capture(ctx: XdpContext) -> u32 {
    // -- Ethernet ----------------------------------------------------------
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth_end = data + EthHdr::LEN;
    if eth_end > data_end {
        return XDP_PASS;
    }

    // -- IPv4 --------------------------------------------------------------
    let ip_start = eth_end;
    let ip_end = ip_start + Ipv4Hdr::LEN;
    if ip_end > data_end {
        return XDP_PASS;
    }
    let ip_hdr = ip_start as *const Ipv4Hdr;
    let proto = unsafe { ptr::read_unaligned(ptr::addr_of!((*ip_hdr).proto)) };
    if proto != IpProto::Udp {
        return XDP_PASS;
    }

    // -- UDP ---------------------------------------------------------------
    let udp_start = ip_end;
    let udp_end = udp_start + UdpHdr::LEN;
    if udp_end > data_end {
        return XDP_PASS;
    }
    let udp_hdr = udp_start as *const UdpHdr;

    let dport = u16::from_be(unsafe { ptr::read_unaligned(ptr::addr_of!((*udp_hdr).dest)) });
    let range = unsafe { ptr::read_volatile(&PORT_RANGE) };
    if !range.contains(dport) {
        return XDP_PASS;
    }

    // -- Capture length ----------------------------------------------------
    // The UDP header's idea of the payload length is clamped to what the
    // frame actually carries and to the event buffer capacity.
    let udp_len = u16::from_be(unsafe { ptr::read_unaligned(ptr::addr_of!((*udp_hdr).len)) });
    let declared = (udp_len as u32).saturating_sub(UdpHdr::LEN as u32);
    let available = (data_end - udp_end) as u32;
    let copy_len = capture_len(declared, available);
    if copy_len == 0 {
        return XDP_DROP;
    }

    // -- Emit event --------------------------------------------------------
    // Reservation failure means the channel is full: drop the frame
    // without blocking or retrying. Addresses stay in network byte
    // order, ports are converted to host order.
    let Some(mut entry) = RING_BUFFER.reserve::<CaptureEvent>(0) else {
        return XDP_DROP;
    };
    let event: *mut CaptureEvent = entry.as_mut_ptr();
    unsafe {
        let saddr = ptr::read_unaligned(ptr::addr_of!((*ip_hdr).src_addr));
        let daddr = ptr::read_unaligned(ptr::addr_of!((*ip_hdr).dst_addr));
        let sport = u16::from_be(ptr::read_unaligned(ptr::addr_of!((*udp_hdr).source)));
        ptr::write(ptr::addr_of_mut!((*event).saddr), saddr);
        ptr::write(ptr::addr_of_mut!((*event).sport), sport);
        ptr::write(ptr::addr_of_mut!((*event).daddr), daddr);
        ptr::write(ptr::addr_of_mut!((*event).dport), dport);
        ptr::write(ptr::addr_of_mut!((*event).payload_len), copy_len);

        let dst = core::slice::from_raw_parts_mut(
            ptr::addr_of_mut!((*event).data) as *mut u8,
            copy_len as usize,
        );
        if bpf_probe_read_kernel_buf(udp_end as *const u8, dst).is_err() {
            entry.discard(0);
            return XDP_DROP;
        }
    }
    entry.submit(0);

    // Nobody else gets this frame.
    XDP_DROP
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
