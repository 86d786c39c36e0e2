use crate::codec::FourCc;
use std::time::Duration;

pub const FRAME_RATE: u32 = 30;
pub const FRAME_WIDTH: u32 = 1920;
pub const FRAME_HEIGHT: u32 = 1080;

/// Codec tag requested from the encoder.
pub const VIDEO_FOUR_CC: FourCc = FourCc::new(*b"FMP4");

// channels
pub const CHANNEL_CAPTURE: &str = "capture";
pub const CHANNEL_PREVIEW: &str = "preview";
pub const CHANNEL_CONTROL: &str = "control";

// timeouts
pub const CAPTURE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const PREVIEW_INIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Minimum delay between capture iterations, throttling the camera feed
/// independently of device speed.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(35);
