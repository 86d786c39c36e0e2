//! Capture-device capability layer.
//!
//! The physical camera driver stays outside this crate; the capture pipeline
//! talks to these traits. Concrete implementations are selected at
//! construction, which is what lets the tests and the demo run on the
//! deterministic [`TestPatternAdapter`] instead of real hardware.

use bytes::Bytes;
use std::time::Duration;

/// Pixel layout of a raw (uncompressed) frame handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra32,
    Rgb24,
    Rgba32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra32 | PixelFormat::Rgba32 => 4,
        }
    }
}

/// Depth sensor mode; the depth plane itself never reaches the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    Disabled,
    NarrowFov,
    WideFov,
}

/// Capture configuration applied to an opened device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub color_format: PixelFormat,
    pub resolution: (u32, u32),
    pub depth_mode: DepthMode,
    pub fps: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            color_format: PixelFormat::Bgra32,
            resolution: (1920, 1080),
            depth_mode: DepthMode::NarrowFov,
            fps: 30,
        }
    }
}

/// One raw image as produced by the device.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

/// One capture from the device.
///
/// A capture may carry no color image (depth-only sync window); the pipeline
/// skips those. Depth and infrared planes are discarded inside the adapter
/// by design.
#[derive(Debug)]
pub struct DeviceCapture {
    color: Option<RawFrame>,
}

impl DeviceCapture {
    pub fn new(color: Option<RawFrame>) -> Self {
        Self { color }
    }

    pub fn color_image(&self) -> Option<&RawFrame> {
        self.color.as_ref()
    }
}

/// Outcome of a bounded wait for the next capture.
#[derive(Debug)]
pub enum CaptureOutcome {
    Success(DeviceCapture),
    Timeout,
    Failed,
}

/// An opened capture device. Dropping the box releases the device, so the
/// handle is released exactly once whatever the loop outcome.
pub trait CaptureDevice: Send {
    /// Apply the capture configuration and start the cameras.
    fn configure(&mut self, config: &DeviceConfig) -> bool;

    /// Wait at most `timeout` for the next capture.
    fn get_capture(&mut self, timeout: Duration) -> CaptureOutcome;
}

/// Device enumeration and opening.
pub trait DeviceAdapter: Send {
    fn device_count(&self) -> usize;

    /// Open the default device. `None` means open failed; the capture
    /// pipeline stays disabled rather than failing the session.
    fn open_default(&mut self) -> Option<Box<dyn CaptureDevice>>;
}

// ── Test pattern device ─────────────────────────────────────────

/// Deterministic fake adapter: pretends to host `device_count` cameras whose
/// frames are filled with an incrementing filler byte.
pub struct TestPatternAdapter {
    device_count: usize,
}

impl TestPatternAdapter {
    pub fn new(device_count: usize) -> Self {
        Self { device_count }
    }
}

impl DeviceAdapter for TestPatternAdapter {
    fn device_count(&self) -> usize {
        self.device_count
    }

    fn open_default(&mut self) -> Option<Box<dyn CaptureDevice>> {
        if self.device_count == 0 {
            return None;
        }
        Some(Box::new(TestPatternDevice::default()))
    }
}

/// Synthetic camera producing flat-filler frames at the configured geometry.
pub struct TestPatternDevice {
    config: DeviceConfig,
    configured: bool,
    counter: u8,
}

impl Default for TestPatternDevice {
    fn default() -> Self {
        Self {
            config: DeviceConfig::default(),
            configured: false,
            counter: 0,
        }
    }
}

impl CaptureDevice for TestPatternDevice {
    fn configure(&mut self, config: &DeviceConfig) -> bool {
        self.config = config.clone();
        self.configured = true;
        true
    }

    fn get_capture(&mut self, _timeout: Duration) -> CaptureOutcome {
        if !self.configured {
            return CaptureOutcome::Failed;
        }

        let (width, height) = self.config.resolution;
        let bpp = self.config.color_format.bytes_per_pixel();
        let stride = width as usize * bpp;

        self.counter = self.counter.wrapping_add(1);
        let data = Bytes::from(vec![self.counter; stride * height as usize]);

        CaptureOutcome::Success(DeviceCapture::new(Some(RawFrame {
            data,
            format: self.config.color_format,
            width,
            height,
            stride,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_devices_opens_nothing() {
        let mut adapter = TestPatternAdapter::new(0);
        assert_eq!(adapter.device_count(), 0);
        assert!(adapter.open_default().is_none());
    }

    #[test]
    fn unconfigured_device_fails_capture() {
        let mut adapter = TestPatternAdapter::new(1);
        let mut device = adapter.open_default().unwrap();
        assert!(matches!(
            device.get_capture(Duration::from_millis(10)),
            CaptureOutcome::Failed
        ));
    }

    #[test]
    fn configured_device_yields_color_frames() {
        let mut adapter = TestPatternAdapter::new(1);
        let mut device = adapter.open_default().unwrap();

        let config = DeviceConfig {
            resolution: (8, 4),
            ..Default::default()
        };
        assert!(device.configure(&config));

        let CaptureOutcome::Success(capture) = device.get_capture(Duration::from_millis(10))
        else {
            panic!("expected a capture");
        };
        let frame = capture.color_image().unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 4);
        assert_eq!(frame.stride, 8 * 4);
        assert_eq!(frame.data.len(), 8 * 4 * 4);
    }
}
