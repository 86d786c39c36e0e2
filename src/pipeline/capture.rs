//! Capture → encode → transmit pipeline.
//!
//! Owns the capture device and the encoder binding, and runs one background
//! worker that pulls frames from the device, encodes the color plane and
//! ships the result over the transport's capture channel.
//!
//! A host without a usable camera is not an error: `configure` reports
//! `Disabled`, every later call is a no-op, and the session keeps running on
//! the preview half alone.

use crate::codec::{FourCc, VideoEncoder};
use crate::config::ClientConfig;
use crate::device::{CaptureDevice, CaptureOutcome, DeviceAdapter, DeviceConfig};
use crate::pipeline::state::{PipelineState, StateCell};
use crate::transport::Transport;
use crate::utils::{SignalOfStop, join_with_grace};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Result of device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Device opened, configured, and geometry probed.
    Ready,
    /// No device, open failure, or configuration failure; pipeline inert.
    Disabled,
}

/// Result of binding the encoder stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Ready,
    /// Capture is disabled, stream init is a no-op.
    Disabled,
    /// The encoder rejected the requested geometry or codec tag.
    InitFailed,
}

pub struct CaptureEncodePipeline {
    adapter: Box<dyn DeviceAdapter>,
    device: Option<Box<dyn CaptureDevice>>,
    encoder: Option<Box<dyn VideoEncoder>>,
    transport: Arc<dyn Transport>,

    device_config: DeviceConfig,
    capture_timeout: Duration,
    frame_interval: Duration,
    join_grace: Duration,

    state: StateCell,
    sos: SignalOfStop,
    worker: Option<JoinHandle<()>>,

    frame_size: (u32, u32),
    device_ready: bool,
    stream_ready: bool,
}

impl CaptureEncodePipeline {
    pub fn new(
        adapter: Box<dyn DeviceAdapter>,
        encoder: Box<dyn VideoEncoder>,
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            adapter,
            device: None,
            encoder: Some(encoder),
            transport,
            device_config: config.device.clone(),
            capture_timeout: config.capture_timeout,
            frame_interval: config.frame_interval,
            join_grace: config.join_grace,
            state: StateCell::default(),
            sos: SignalOfStop::new(),
            worker: None,
            frame_size: (0, 0),
            device_ready: false,
            stream_ready: false,
        }
    }

    /// Enumerate, open and configure the default capture device, then probe
    /// one capture for the stream geometry.
    pub fn configure(&mut self) -> DeviceStatus {
        self.state.set(PipelineState::Configuring);

        if self.adapter.device_count() == 0 {
            info!("no capture devices found, camera feed disabled");
            return DeviceStatus::Disabled;
        }

        let Some(mut device) = self.adapter.open_default() else {
            info!("failed to open capture device, camera feed disabled");
            return DeviceStatus::Disabled;
        };

        if !device.configure(&self.device_config) {
            warn!("failed to start capture device, camera feed disabled");
            return DeviceStatus::Disabled;
        }

        // Probe for a color image to learn the stream dimensions
        match device.get_capture(self.capture_timeout) {
            CaptureOutcome::Success(capture) => match capture.color_image() {
                Some(image) => {
                    self.frame_size = (image.width, image.height);
                    info!("capture device ready, color {}x{}", image.width, image.height);
                    self.device = Some(device);
                    self.device_ready = true;
                    DeviceStatus::Ready
                }
                None => {
                    warn!("first capture carried no color image, camera feed disabled");
                    DeviceStatus::Disabled
                }
            },
            CaptureOutcome::Timeout => {
                warn!("timed out waiting for the first capture, camera feed disabled");
                DeviceStatus::Disabled
            }
            CaptureOutcome::Failed => {
                warn!("failed to read the first capture, camera feed disabled");
                DeviceStatus::Disabled
            }
        }
    }

    /// Bind the encoder to the outbound stream. No-op `Disabled` while the
    /// device handle is null.
    pub fn initialize_stream(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
        four_cc: FourCc,
    ) -> StreamStatus {
        if self.device.is_none() {
            debug!("stream init skipped, capture pipeline disabled");
            return StreamStatus::Disabled;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            warn!("no encoder available to bind the video stream");
            return StreamStatus::InitFailed;
        };

        if encoder.add_stream(width, height, fps, four_cc) {
            info!("camera stream initialised: {width}x{height}@{fps} ({four_cc})");
            self.stream_ready = true;
            StreamStatus::Ready
        } else {
            warn!("encoder rejected stream {width}x{height}@{fps} ({four_cc})");
            StreamStatus::InitFailed
        }
    }

    /// Spawn the capture worker. No-op while disabled; not reentrant while
    /// running.
    pub fn start(&mut self) {
        if !self.stream_ready {
            debug!("capture pipeline disabled, start is a no-op");
            return;
        }
        if self.worker.is_some() {
            warn!("capture pipeline already running, ignoring start");
            return;
        }
        let (Some(mut device), Some(mut encoder)) = (self.device.take(), self.encoder.take())
        else {
            warn!("capture pipeline has no device or encoder to run with");
            return;
        };
        if !self.state.set(PipelineState::Running) {
            self.device = Some(device);
            self.encoder = Some(encoder);
            return;
        }

        let transport = Arc::clone(&self.transport);
        let sos = self.sos.clone();
        let capture_timeout = self.capture_timeout;
        let frame_interval = self.frame_interval;

        self.worker = Some(thread::spawn(move || {
            debug!("camera encode thread launched");

            while !sos.cancelled() {
                // Throttles the feed independently of device speed, and is
                // the prompt cancellation point
                if sos.wait_timeout(frame_interval) {
                    break;
                }
                if !transport.healthy() {
                    info!("peer disconnected, stopping camera feed");
                    break;
                }

                // Each iteration settles on a definite sent/skipped outcome
                // before it is inspected
                let sent = match device.get_capture(capture_timeout) {
                    CaptureOutcome::Timeout => {
                        debug!("timed out waiting for a capture");
                        false
                    }
                    CaptureOutcome::Failed => {
                        warn!("failed to read a capture");
                        false
                    }
                    CaptureOutcome::Success(capture) => match capture.color_image() {
                        // Depth/IR-only captures are skipped by design
                        None => {
                            trace!("capture carried no color image");
                            false
                        }
                        Some(image) => encoder.put_frame(image),
                    },
                };

                if !sent {
                    trace!("camera frame skipped");
                }
            }

            info!("stopping camera feed");
            // The device box drops here: released exactly once, whatever the
            // loop outcome
        }));
    }

    /// Signal cancellation and join the worker within the grace period.
    pub fn stop(&mut self) {
        if matches!(self.state.get(), PipelineState::Idle | PipelineState::Stopped) {
            self.device = None;
            return;
        }

        self.state.set(PipelineState::Stopping);
        self.sos.cancel();

        if let Some(handle) = self.worker.take() {
            join_with_grace(handle, self.join_grace, "capture");
        }

        // Release the device if the worker never took ownership of it
        self.device = None;
        self.state.set(PipelineState::Stopped);
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// True once `configure` found a usable camera.
    pub fn is_enabled(&self) -> bool {
        self.device_ready
    }

    /// Stream geometry probed by `configure`.
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }
}
