use crate::assets;
use crate::codec::FourCc;
use crate::device::DeviceConfig;
use std::time::Duration;

/// Everything tunable about one client session.
///
/// The defaults reproduce the reference deployment: 30 fps FMP4 capture with
/// a one second device timeout, RGB preview, five second handshake window.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Outbound camera-feed channel name.
    pub capture_channel: String,
    /// Inbound render-feed channel name.
    pub preview_channel: String,
    /// Handshake control channel name.
    pub control_channel: String,

    /// Bound on the start-of-session ready exchange.
    pub handshake_timeout: Duration,
    /// Bound on learning the preview stream geometry.
    pub preview_init_timeout: Duration,
    /// Bound on one blocking transport receive inside the decode loop.
    pub receive_timeout: Duration,
    /// Bound on one blocking device capture inside the capture loop.
    pub capture_timeout: Duration,
    /// Minimum delay between capture iterations.
    pub frame_interval: Duration,
    /// How long `stop()` waits for a worker before abandoning it.
    pub join_grace: Duration,

    /// Frame rate requested from the encoder stream.
    pub target_fps: u32,
    /// Codec tag requested from the encoder stream.
    pub four_cc: FourCc,
    /// Channel layout of the published preview frame: 3 (RGB) or 4 (RGBA).
    pub preview_channels: u8,

    /// Capture configuration applied to the opened device.
    pub device: DeviceConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            capture_channel: assets::CHANNEL_CAPTURE.to_owned(),
            preview_channel: assets::CHANNEL_PREVIEW.to_owned(),
            control_channel: assets::CHANNEL_CONTROL.to_owned(),
            handshake_timeout: assets::HANDSHAKE_TIMEOUT,
            preview_init_timeout: assets::PREVIEW_INIT_TIMEOUT,
            receive_timeout: assets::RECEIVE_TIMEOUT,
            capture_timeout: assets::CAPTURE_TIMEOUT,
            frame_interval: assets::FRAME_INTERVAL,
            join_grace: assets::JOIN_GRACE,
            target_fps: assets::FRAME_RATE,
            four_cc: assets::VIDEO_FOUR_CC,
            preview_channels: 3,
            device: DeviceConfig::default(),
        }
    }
}
