//! The client facade: one session, two pipelines, one handshake bracket.
//!
//! `connect` performs the ready exchange and brings up both media pipelines;
//! `shutdown` (or drop) tears them down and sends the detach notification
//! exactly once. A missing camera or an unavailable render stream degrades
//! the session instead of failing it.

use crate::codec::{VideoDecoder, VideoEncoder};
use crate::config::ClientConfig;
use crate::device::DeviceAdapter;
use crate::display::FrameBuffer;
use crate::pipeline::{
    CaptureEncodePipeline, ConfigError, DeviceStatus, ReceiveDecodePipeline, StreamStatus,
    Telemetry,
};
use crate::session::{self, HandshakeError};
use crate::transport::Transport;
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct RenderClient {
    transport: Arc<dyn Transport>,
    control_channel: String,
    capture: CaptureEncodePipeline,
    preview: ReceiveDecodePipeline,
    detached: bool,
}

impl RenderClient {
    /// Handshake with the render server, then bring up the camera feed and
    /// the render preview.
    ///
    /// Either pipeline may come up disabled without failing the call; only a
    /// failed handshake or a rejected configuration aborts the session.
    pub fn connect(
        transport: Arc<dyn Transport>,
        adapter: Box<dyn DeviceAdapter>,
        encoder: Box<dyn VideoEncoder>,
        decoder: Box<dyn VideoDecoder>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let mut preview = ReceiveDecodePipeline::new(Arc::clone(&transport), decoder, &config)?;

        session::establish(&*transport, &config.control_channel, config.handshake_timeout)?;

        let mut capture =
            CaptureEncodePipeline::new(adapter, encoder, Arc::clone(&transport), &config);
        if capture.configure() == DeviceStatus::Ready {
            let (width, height) = capture.frame_size();
            match capture.initialize_stream(width, height, config.target_fps, config.four_cc) {
                StreamStatus::Ready => capture.start(),
                status => warn!("camera feed not started: {status:?}"),
            }
        }

        if preview.initialize(config.preview_init_timeout) {
            preview.start();
        } else {
            info!("render preview unavailable, session continues without video");
        }

        Ok(Self {
            transport,
            control_channel: config.control_channel,
            capture,
            preview,
            detached: false,
        })
    }

    /// Stop both pipelines and notify the peer. Idempotent; the detach
    /// message goes out at most once, after the last capture packet.
    pub fn shutdown(&mut self) {
        if self.detached {
            return;
        }
        self.capture.stop();
        self.preview.stop();
        session::teardown(&*self.transport, &self.control_channel);
        self.detached = true;
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture.is_enabled()
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview.is_enabled()
    }

    /// Geometry of the inbound render stream, zero until known.
    pub fn frame_width(&self) -> u32 {
        self.preview.frame_width()
    }

    pub fn frame_height(&self) -> u32 {
        self.preview.frame_height()
    }

    pub fn bandwidth_mbps(&self) -> f64 {
        self.preview.bandwidth_mbps()
    }

    pub fn frame_rate(&self) -> f64 {
        self.preview.frame_rate()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        self.preview.telemetry()
    }

    /// Copy of the latest rendered frame, if any has been published.
    pub fn snapshot_frame(&self) -> Option<FrameBuffer> {
        self.preview.snapshot_frame()
    }

    pub fn has_new_frame(&self) -> bool {
        self.preview.has_new_frame()
    }
}

impl Drop for RenderClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
