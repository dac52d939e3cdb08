//! The consumer runtime: poll the transport channel, decode each record,
//! dispatch to a single sink.
//!
//! Single-threaded and cooperative. The only suspension point is the
//! timed sleep between drain cycles, and cancellation is observed only
//! there: an in-flight drain always finishes before the loop stops.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use aya::maps::{MapData, RingBuf};
use udpmon_common::CaptureEvent;

/// Cooperative cancellation shared between the signal handler and the
/// poll loop. Checked between cycles, never preempting a dispatch.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Token flipped by SIGINT/SIGTERM for an orderly shutdown.
    pub fn for_signals() -> anyhow::Result<Self> {
        let token = Self::new();
        let handler = token.clone();
        ctrlc::set_handler(move || handler.cancel())
            .context("failed to install signal handler")?;
        Ok(token)
    }
}

/// Where decoded events go. Chosen once at startup, never per record.
pub trait EventSink {
    fn handle(&mut self, event: &CaptureEvent);
}

/// Reads one ring-buffer record as a capture event.
///
/// The producer's length is not trusted: a record shorter than the fixed
/// event layout is rejected here before any field is read.
pub fn decode(bytes: &[u8]) -> Option<CaptureEvent> {
    if bytes.len() < mem::size_of::<CaptureEvent>() {
        return None;
    }
    // The pinned map's records are exactly sized CaptureEvents, but the
    // buffer carries no alignment guarantee.
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const CaptureEvent) })
}

pub struct Consumer {
    ring: RingBuf<MapData>,
    poll_interval: Duration,
}

impl Consumer {
    pub fn new(ring: RingBuf<MapData>, poll_interval: Duration) -> Self {
        Self { ring, poll_interval }
    }

    /// Polls until the token is cancelled.
    ///
    /// Malformed records are logged and skipped; the loop never aborts
    /// because of one. Dispatch within a cycle is sequential.
    pub async fn run(mut self, sink: &mut dyn EventSink, cancel: &CancelToken) {
        while !cancel.is_cancelled() {
            while let Some(record) = self.ring.next() {
                match decode(&record) {
                    Some(event) => sink.handle(&event),
                    None => {
                        tracing::warn!(len = record.len(), "skipping malformed capture record");
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        tracing::debug!("cancellation observed, poll loop stopped");
    }
}

/// Prints each event as a human-readable summary on stdout.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn handle(&mut self, event: &CaptureEvent) {
        println!(
            "[{}] UDP packet: {}",
            chrono::Utc::now().timestamp(),
            summary(event)
        );
        println!(
            "payload ({} bytes): {}\n",
            event.payload_len,
            hex_preview(event.payload())
        );
    }
}

/// `SRC:PORT -> DST:PORT (N bytes)` line for one event.
pub fn summary(event: &CaptureEvent) -> String {
    format!(
        "{} -> {} ({} bytes)",
        event.source(),
        event.destination(),
        event.payload_len
    )
}

/// First 32 payload bytes as spaced hex, with a trailing `...` marker
/// when the payload is longer than what is shown.
pub fn hex_preview(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(32)];
    let mut out = shown
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if payload.len() > shown.len() {
        out.push_str(" ...");
    }
    out
}
