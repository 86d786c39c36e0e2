//! Receive → decode → publish pipeline.
//!
//! Runs one background worker that pulls compressed packets off the preview
//! channel, decodes them, and copies the pixels into the shared published
//! frame under its single mutex. Bandwidth and frame-rate averages are
//! folded outside the lock and read lock-free by the display layer.

use crate::codec::VideoDecoder;
use crate::config::ClientConfig;
use crate::display::{FrameBuffer, SharedFrameBuffer};
use crate::pipeline::state::{PipelineState, StateCell};
use crate::pipeline::telemetry::Telemetry;
use crate::transport::Transport;
use crate::utils::{SignalOfStop, join_with_grace};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Construction-time configuration errors. Checked before any thread exists,
/// so a bad layout can never silently mis-copy a buffer at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported channel layout {0}: the preview buffer must be 3 (RGB) or 4 (RGBA)")]
    UnsupportedChannelLayout(u8),
}

pub struct ReceiveDecodePipeline {
    transport: Arc<dyn Transport>,
    channel: String,
    decoder: Option<Box<dyn VideoDecoder>>,

    frame: Arc<SharedFrameBuffer>,
    telemetry: Arc<Telemetry>,
    channels: u8,
    geometry: Option<(u32, u32)>,

    receive_timeout: Duration,
    join_grace: Duration,

    state: StateCell,
    sos: SignalOfStop,
    worker: Option<JoinHandle<()>>,
}

impl ReceiveDecodePipeline {
    /// Fails fast with [`ConfigError::UnsupportedChannelLayout`] unless the
    /// requested layout is 3 or 4 channels.
    pub fn new(
        transport: Arc<dyn Transport>,
        decoder: Box<dyn VideoDecoder>,
        config: &ClientConfig,
    ) -> Result<Self, ConfigError> {
        let channels = config.preview_channels;
        if channels != 3 && channels != 4 {
            return Err(ConfigError::UnsupportedChannelLayout(channels));
        }

        Ok(Self {
            transport,
            channel: config.preview_channel.clone(),
            decoder: Some(decoder),
            frame: Arc::new(SharedFrameBuffer::new()),
            telemetry: Arc::new(Telemetry::new()),
            channels,
            geometry: None,
            receive_timeout: config.receive_timeout,
            join_grace: config.join_grace,
            state: StateCell::default(),
            sos: SignalOfStop::new(),
            worker: None,
        })
    }

    /// Wait up to `timeout` for the first decodable packet to learn the
    /// stream geometry. `false` means the preview is unavailable; the caller
    /// carries on without video.
    pub fn initialize(&mut self, timeout: Duration) -> bool {
        self.state.set(PipelineState::Configuring);

        let Some(decoder) = self.decoder.as_mut() else {
            return false;
        };

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline && !self.sos.cancelled() {
            let wait = self.receive_timeout.min(deadline - Instant::now());
            let Some(packet) = self.transport.receive(&self.channel, wait) else {
                continue;
            };

            let mut geometry = None;
            decoder.decode_packet(&packet, &mut |frame| {
                geometry = Some((frame.width(), frame.height()));
            });

            if let Some((width, height)) = geometry {
                info!("preview stream initialised: {width}x{height}");
                self.geometry = Some((width, height));
                return true;
            }
            debug!("undecodable packet while probing preview stream");
        }

        warn!("failed to initialise preview stream within {timeout:?}");
        false
    }

    /// Spawn the decode worker. No-op until `initialize` has succeeded; not
    /// reentrant while running.
    pub fn start(&mut self) {
        if self.geometry.is_none() {
            debug!("preview unavailable, start is a no-op");
            return;
        }
        if self.worker.is_some() {
            warn!("preview pipeline already running, ignoring start");
            return;
        }
        let Some(mut decoder) = self.decoder.take() else {
            warn!("preview pipeline has no decoder to run with");
            return;
        };
        if !self.state.set(PipelineState::Running) {
            self.decoder = Some(decoder);
            return;
        }

        let transport = Arc::clone(&self.transport);
        let frame = Arc::clone(&self.frame);
        let telemetry = Arc::clone(&self.telemetry);
        let channel = self.channel.clone();
        let channels = self.channels;
        let receive_timeout = self.receive_timeout;
        let sos = self.sos.clone();

        self.worker = Some(thread::spawn(move || {
            debug!("video decode thread launched");

            let mut last_frame = Instant::now();
            let mut bytes_since_last = 0usize;

            while !sos.cancelled() {
                if !transport.healthy() {
                    info!("peer disconnected, stopping preview");
                    break;
                }
                // The bounded receive is the cancellation point
                let Some(packet) = transport.receive(&channel, receive_timeout) else {
                    trace!("no preview packet within {receive_timeout:?}");
                    continue;
                };
                bytes_since_last += packet.len();

                // Each iteration settles on a definite decode outcome before
                // it is inspected
                let decoded = decoder.decode_packet(&packet, &mut |stream| {
                    let (width, height) = (stream.width(), stream.height());
                    // Pixel copy only under the lock; decode already happened
                    frame.publish(|buffer: &mut FrameBuffer| {
                        buffer.reset(width, height, channels);
                        let stride = buffer.stride();
                        let extracted = if channels == 4 {
                            stream.extract_rgba(buffer.data_mut(), stride)
                        } else {
                            stream.extract_rgb(buffer.data_mut(), stride)
                        };
                        if !extracted {
                            warn!("pixel extraction failed for {width}x{height} frame");
                        }
                    });
                });

                // Telemetry outside the buffer lock
                if decoded {
                    let now = Instant::now();
                    telemetry.record_frame(bytes_since_last, now - last_frame);
                    last_frame = now;
                    bytes_since_last = 0;
                    trace!(
                        "video bit-rate filtered: {:.2} Mbps, frame rate filtered: {:.2} fps",
                        telemetry.bandwidth_mbps(),
                        telemetry.frames_per_second()
                    );
                }
            }

            info!("video decode thread finished");
        }));
    }

    /// Signal cancellation and join the worker within the grace period.
    pub fn stop(&mut self) {
        if matches!(self.state.get(), PipelineState::Idle | PipelineState::Stopped) {
            return;
        }

        self.state.set(PipelineState::Stopping);
        self.sos.cancel();

        if let Some(handle) = self.worker.take() {
            join_with_grace(handle, self.join_grace, "preview");
        }

        self.state.set(PipelineState::Stopped);
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// True once `initialize` learned the stream geometry.
    pub fn is_enabled(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn frame_width(&self) -> u32 {
        self.geometry.map(|(w, _)| w).unwrap_or(0)
    }

    pub fn frame_height(&self) -> u32 {
        self.geometry.map(|(_, h)| h).unwrap_or(0)
    }

    /// Lock-free read of the filtered video bandwidth.
    pub fn bandwidth_mbps(&self) -> f64 {
        self.telemetry.bandwidth_mbps()
    }

    /// Lock-free read of the filtered decoded frame rate.
    pub fn frame_rate(&self) -> f64 {
        self.telemetry.frames_per_second()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Copy of the latest published frame; the lock is held only for the
    /// duration of the copy.
    pub fn snapshot_frame(&self) -> Option<FrameBuffer> {
        self.frame.snapshot()
    }

    pub fn has_new_frame(&self) -> bool {
        self.frame.has_new_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FourCc, RawFrameDecoder, RawFrameEncoder, VideoEncoder};
    use crate::device::{PixelFormat, RawFrame};
    use crate::transport::LoopbackTransport;
    use bytes::Bytes;
    use std::sync::Mutex;

    fn test_config(channels: u8) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.preview_channels = channels;
        config.receive_timeout = Duration::from_millis(50);
        config.join_grace = Duration::from_millis(500);
        config
    }

    fn pipeline_over(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
    ) -> Result<ReceiveDecodePipeline, ConfigError> {
        ReceiveDecodePipeline::new(transport, Box::new(RawFrameDecoder::new()), config)
    }

    /// Encode one raw-codec packet per filler byte at the given geometry.
    fn encode_frames(width: u32, height: u32, fillers: &[u8]) -> Vec<Bytes> {
        let packets = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&packets);
        let mut encoder = RawFrameEncoder::new(Box::new(move |buf: &[u8]| {
            sink.lock().unwrap().push(Bytes::copy_from_slice(buf));
            true
        }));
        assert!(encoder.add_stream(width, height, 30, FourCc::new(*b"FMP4")));

        for &filler in fillers {
            let frame = RawFrame {
                data: Bytes::from(vec![filler; (width * height * 3) as usize]),
                format: PixelFormat::Rgb24,
                width,
                height,
                stride: width as usize * 3,
            };
            assert!(encoder.put_frame(&frame));
        }

        let out = packets.lock().unwrap().clone();
        out
    }

    #[test]
    fn unsupported_channel_layout_fails_fast() {
        let (client, _server) = LoopbackTransport::pair();
        let config = test_config(2);
        let result = pipeline_over(Arc::new(client), &config);
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedChannelLayout(2))
        ));
    }

    #[test]
    fn initialize_times_out_without_packets() {
        let (client, _server) = LoopbackTransport::pair();
        let config = test_config(3);
        let mut pipeline = pipeline_over(Arc::new(client), &config).unwrap();

        let start = Instant::now();
        assert!(!pipeline.initialize(Duration::from_millis(100)));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!pipeline.is_enabled());

        // start on an uninitialised pipeline never spawns a thread
        pipeline.start();
        assert!(pipeline.worker.is_none());
        assert_ne!(pipeline.state(), PipelineState::Running);
    }

    #[test]
    fn decodes_into_rgb_snapshot_with_telemetry() {
        let (client, server) = LoopbackTransport::pair();
        let config = test_config(3);
        let mut pipeline = pipeline_over(Arc::new(client), &config).unwrap();

        let packets = encode_frames(16, 8, &[1, 2, 3, 4, 5]);
        server
            .send(&config.preview_channel, packets[0].clone())
            .unwrap();

        assert!(pipeline.initialize(Duration::from_secs(2)));
        assert_eq!((pipeline.frame_width(), pipeline.frame_height()), (16, 8));

        pipeline.start();
        assert!(pipeline.state().is_running());
        for packet in &packets[1..] {
            server.send(&config.preview_channel, packet.clone()).unwrap();
        }

        // Poll until the decode thread has published something
        let deadline = Instant::now() + Duration::from_secs(2);
        let snapshot = loop {
            if let Some(frame) = pipeline.snapshot_frame() {
                break frame;
            }
            assert!(Instant::now() < deadline, "no frame published in time");
            thread::sleep(Duration::from_millis(5));
        };
        pipeline.stop();

        assert_eq!(snapshot.width(), 16);
        assert_eq!(snapshot.height(), 8);
        assert_eq!(snapshot.channels(), 3);
        let first = snapshot.data()[0];
        assert!(snapshot.data().iter().all(|&b| b == first));

        assert!(pipeline.telemetry().frames_decoded() >= 1);
        assert!(pipeline.frame_rate() > 0.0);
        assert!(pipeline.bandwidth_mbps() > 0.0);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn rgba_layout_publishes_four_channels() {
        let (client, server) = LoopbackTransport::pair();
        let config = test_config(4);
        let mut pipeline = pipeline_over(Arc::new(client), &config).unwrap();

        for packet in encode_frames(4, 4, &[9, 9]) {
            server.send(&config.preview_channel, packet).unwrap();
        }
        assert!(pipeline.initialize(Duration::from_secs(2)));
        pipeline.start();

        let deadline = Instant::now() + Duration::from_secs(2);
        let snapshot = loop {
            if let Some(frame) = pipeline.snapshot_frame() {
                break frame;
            }
            assert!(Instant::now() < deadline, "no frame published in time");
            thread::sleep(Duration::from_millis(5));
        };
        pipeline.stop();

        assert_eq!(snapshot.channels(), 4);
        assert_eq!(snapshot.stride(), 4 * 4);
        // r g b from the filler, alpha forced opaque
        assert_eq!(&snapshot.data()[..4], &[9, 9, 9, 255]);
    }

    #[test]
    fn malformed_packets_do_not_kill_the_loop() {
        let (client, server) = LoopbackTransport::pair();
        let config = test_config(3);
        let mut pipeline = pipeline_over(Arc::new(client), &config).unwrap();

        let packets = encode_frames(8, 8, &[7, 7]);
        server
            .send(&config.preview_channel, packets[0].clone())
            .unwrap();
        assert!(pipeline.initialize(Duration::from_secs(2)));
        pipeline.start();

        server
            .send(&config.preview_channel, Bytes::from_static(b"garbage"))
            .unwrap();
        server
            .send(&config.preview_channel, packets[1].clone())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.snapshot_frame().is_none() {
            assert!(Instant::now() < deadline, "no frame published in time");
            thread::sleep(Duration::from_millis(5));
        }
        pipeline.stop();
    }

    #[test]
    fn start_then_immediate_stop_is_bounded() {
        for receive_timeout in [Duration::from_millis(10), Duration::from_millis(1000)] {
            let (client, server) = LoopbackTransport::pair();
            let mut config = test_config(3);
            config.receive_timeout = receive_timeout;
            let mut pipeline = pipeline_over(Arc::new(client), &config).unwrap();

            let packets = encode_frames(8, 8, &[1]);
            server
                .send(&config.preview_channel, packets[0].clone())
                .unwrap();
            assert!(pipeline.initialize(Duration::from_secs(2)));
            pipeline.start();

            let start = Instant::now();
            pipeline.stop();
            assert!(
                start.elapsed() < receive_timeout + Duration::from_millis(300),
                "stop took {:?}",
                start.elapsed()
            );
            assert_eq!(pipeline.state(), PipelineState::Stopped);
        }
    }

    #[test]
    fn transport_closure_ends_the_loop() {
        let (client, server) = LoopbackTransport::pair();
        let config = test_config(3);
        let mut pipeline = pipeline_over(Arc::new(client), &config).unwrap();

        let packets = encode_frames(8, 8, &[1]);
        server
            .send(&config.preview_channel, packets[0].clone())
            .unwrap();
        assert!(pipeline.initialize(Duration::from_secs(2)));
        pipeline.start();

        server.close();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if pipeline
                .worker
                .as_ref()
                .map(|w| w.is_finished())
                .unwrap_or(true)
            {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(pipeline.worker.as_ref().unwrap().is_finished());

        pipeline.stop();
    }
}
