//! Packet transport contract.
//!
//! The real transport (reliable, in-order, named sub-channels) lives outside
//! this crate; the pipelines only see this narrow interface. A loopback
//! implementation is provided for tests and the demo binary.

use anyhow::{Result, bail};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Duplex, named-channel, reliable, in-order byte transport.
///
/// `receive` must honor its timeout so pipeline loops can observe
/// cancellation within one timeout window.
pub trait Transport: Send + Sync {
    fn send(&self, channel: &str, payload: Bytes) -> Result<()>;

    fn receive(&self, channel: &str, timeout: Duration) -> Option<Bytes>;

    /// False once the peer has disconnected; loops treat this as normal
    /// session end, not an error.
    fn healthy(&self) -> bool;
}

/// Adapt a transport channel into the byte-sink shape the encoder writes to.
///
/// The sink reports the transport's health back to the encoder so a dead
/// link surfaces as a failed frame write instead of silently piling up.
pub fn transport_encoder_sink(
    transport: Arc<dyn Transport>,
    channel: String,
) -> crate::codec::EncodedWrite {
    Box::new(move |buf: &[u8]| {
        match transport.send(&channel, Bytes::copy_from_slice(buf)) {
            Ok(()) => transport.healthy(),
            Err(_) => false,
        }
    })
}

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<String, VecDeque<Bytes>>>,
    condvar: Condvar,
}

impl Mailbox {
    fn push(&self, channel: &str, payload: Bytes) {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(channel.to_owned()).or_default().push_back(payload);
        self.condvar.notify_all();
    }

    fn pop(&self, channel: &str, timeout: Duration, open: &AtomicBool) -> Option<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut queues = self.queues.lock().unwrap();

        loop {
            if let Some(payload) = queues.get_mut(channel).and_then(VecDeque::pop_front) {
                return Some(payload);
            }
            if !open.load(Ordering::Relaxed) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self.condvar.wait_timeout(queues, deadline - now).unwrap();
            queues = next;
        }
    }

    fn wake_all(&self) {
        let _guard = self.queues.lock().unwrap();
        self.condvar.notify_all();
    }
}

/// In-memory transport endpoint; `pair()` returns two cross-wired ends.
///
/// Closing either end marks the whole link unhealthy and wakes any blocked
/// receiver on both sides.
pub struct LoopbackTransport {
    inbound: Arc<Mailbox>,
    outbound: Arc<Mailbox>,
    open: Arc<AtomicBool>,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let a = Arc::new(Mailbox::default());
        let b = Arc::new(Mailbox::default());
        let open = Arc::new(AtomicBool::new(true));

        (
            LoopbackTransport {
                inbound: Arc::clone(&a),
                outbound: Arc::clone(&b),
                open: Arc::clone(&open),
            },
            LoopbackTransport {
                inbound: b,
                outbound: a,
                open,
            },
        )
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
        self.inbound.wake_all();
        self.outbound.wake_all();
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, channel: &str, payload: Bytes) -> Result<()> {
        if !self.healthy() {
            bail!("transport closed");
        }
        self.outbound.push(channel, payload);
        Ok(())
    }

    fn receive(&self, channel: &str, timeout: Duration) -> Option<Bytes> {
        self.inbound.pop(channel, timeout, &self.open)
    }

    fn healthy(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}
