//! Session handshake bracketing the media pipelines.
//!
//! Two control messages over the whole client lifetime: a bidirectional
//! `ready` exchange before any pipeline thread starts, and a fire-and-forget
//! `detach` once both pipelines are stopped.

use crate::transport::Transport;
use bytes::Bytes;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Control-channel wire messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Start-of-session readiness, exchanged by both peers.
    Ready(bool),
    /// End-of-session notification, sent once, never acknowledged.
    Detach(bool),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no ready message from peer within {0:?}")]
    Timeout(Duration),
    #[error("transport failed during handshake: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Bound on a single control-channel wait, so the overall deadline is
/// re-checked at a reasonable cadence.
const CONTROL_POLL: Duration = Duration::from_millis(200);

fn send_control(
    transport: &dyn Transport,
    channel: &str,
    message: &ControlMessage,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(message)?;
    transport.send(channel, Bytes::from(payload))
}

/// Announce readiness and block until the peer's `ready` is observed.
///
/// Messages that fail to parse are skipped; a `detach` observed here means
/// the peer is already leaving and counts as a timeout-style failure at the
/// deadline. The caller decides whether to proceed degraded or abort.
pub fn establish(
    transport: &dyn Transport,
    channel: &str,
    timeout: Duration,
) -> Result<(), HandshakeError> {
    send_control(transport, channel, &ControlMessage::Ready(true))
        .map_err(HandshakeError::Transport)?;

    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(HandshakeError::Timeout(timeout));
        }

        let wait = CONTROL_POLL.min(deadline - now);
        let Some(payload) = transport.receive(channel, wait) else {
            continue;
        };

        match serde_json::from_slice::<ControlMessage>(&payload) {
            Ok(ControlMessage::Ready(_)) => {
                info!("session established: peer is ready");
                return Ok(());
            }
            Ok(ControlMessage::Detach(_)) => {
                debug!("peer sent detach during handshake");
            }
            Err(e) => {
                warn!("skipping unparseable control message: {e}");
            }
        }
    }
}

/// Tell the peer we are disconnecting so it can tear down cleanly.
///
/// Best effort: the session is ending regardless, so transport failures are
/// only logged.
pub fn teardown(transport: &dyn Transport, channel: &str) {
    if let Err(e) = send_control(transport, channel, &ControlMessage::Detach(true)) {
        debug!("detach not delivered: {e}");
    } else {
        info!("detach sent, session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;
    use std::thread;

    const CONTROL: &str = "control";

    #[test]
    fn control_message_wire_format() {
        let json = serde_json::to_string(&ControlMessage::Ready(true)).unwrap();
        assert_eq!(json, r#"{"kind":"ready","value":true}"#);

        let parsed: ControlMessage =
            serde_json::from_str(r#"{"kind":"detach","value":true}"#).unwrap();
        assert_eq!(parsed, ControlMessage::Detach(true));
    }

    #[test]
    fn establish_succeeds_when_both_sides_sync() {
        let (client, server) = LoopbackTransport::pair();

        let peer = thread::spawn(move || {
            establish(&server, CONTROL, Duration::from_secs(2))
        });

        establish(&client, CONTROL, Duration::from_secs(2)).unwrap();
        peer.join().unwrap().unwrap();
    }

    #[test]
    fn establish_times_out_without_peer() {
        let (client, _server) = LoopbackTransport::pair();
        let start = Instant::now();
        let result = establish(&client, CONTROL, Duration::from_millis(50));
        assert!(matches!(result, Err(HandshakeError::Timeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn establish_skips_garbage_messages() {
        let (client, server) = LoopbackTransport::pair();
        server.send(CONTROL, Bytes::from_static(b"not json")).unwrap();

        let peer = thread::spawn(move || {
            // Drain the client's ready, then answer
            let _ = server.receive(CONTROL, Duration::from_secs(1));
            send_control(&server, CONTROL, &ControlMessage::Ready(true)).unwrap();
        });

        establish(&client, CONTROL, Duration::from_secs(2)).unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn teardown_ignores_closed_transport() {
        let (client, server) = LoopbackTransport::pair();
        client.close();
        // Must not panic or error out
        teardown(&client, CONTROL);
        drop(server);
    }

    #[test]
    fn teardown_delivers_detach() {
        let (client, server) = LoopbackTransport::pair();
        teardown(&client, CONTROL);

        let payload = server.receive(CONTROL, Duration::from_millis(200)).unwrap();
        let message: ControlMessage = serde_json::from_slice(&payload).unwrap();
        assert_eq!(message, ControlMessage::Detach(true));
    }
}
