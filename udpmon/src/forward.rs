//! Re-injection of captured payloads onto a new UDP flow.
//!
//! One socket, created at startup and reused for every send. Sends are
//! best-effort and non-blocking: a failure is logged at debug level and
//! the event is gone -- no retry, no queueing, no ordering contract.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use anyhow::Context as _;
use udpmon_common::CaptureEvent;

use crate::consumer::EventSink;

/// How the outbound destination is built from a decoded event.
#[derive(Clone, Copy, Debug)]
pub enum ForwardPolicy {
    /// Reuse the event's own destination, with each half individually
    /// replaceable by a startup override.
    PassThrough {
        addr: Option<Ipv4Addr>,
        port: Option<u16>,
    },
    /// Substitute a fixed target address; the port always comes from
    /// the event. Used by the range-scoped repeater, which deliberately
    /// has no port override.
    Redirect { addr: Ipv4Addr },
}

impl ForwardPolicy {
    pub fn destination(&self, event: &CaptureEvent) -> SocketAddrV4 {
        match *self {
            ForwardPolicy::PassThrough { addr, port } => SocketAddrV4::new(
                addr.unwrap_or_else(|| *event.destination().ip()),
                port.unwrap_or(event.dport),
            ),
            ForwardPolicy::Redirect { addr } => SocketAddrV4::new(addr, event.dport),
        }
    }
}

pub struct Forwarder {
    socket: UdpSocket,
    policy: ForwardPolicy,
}

impl Forwarder {
    /// Binds the outbound socket. Socket creation failure is a setup
    /// error; send failures later are not.
    pub fn new(policy: ForwardPolicy) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .context("failed to create outbound UDP socket")?;
        socket
            .set_nonblocking(true)
            .context("failed to make outbound UDP socket non-blocking")?;
        Ok(Self { socket, policy })
    }
}

impl EventSink for Forwarder {
    fn handle(&mut self, event: &CaptureEvent) {
        let dest = self.policy.destination(event);
        match self.socket.send_to(event.payload(), dest) {
            Ok(sent) => {
                tracing::debug!(
                    from = %event.source(),
                    to = %dest,
                    bytes = sent,
                    "forwarded datagram"
                );
            }
            Err(err) => {
                tracing::debug!(to = %dest, error = %err, "forward send failed");
            }
        }
    }
}
