//! Live stream telemetry: bandwidth and frame-rate moving averages.
//!
//! All fields are single atomic scalars. The decode thread is the only
//! writer; any thread may read without locking, tolerating at most one frame
//! of staleness but never a torn value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// EMA decay: how much of the history survives each new sample.
pub const EMA_KEEP: f64 = 0.9;
/// EMA blend: the weight of the newest sample.
pub const EMA_BLEND: f64 = 0.1;

#[inline]
fn ema(old: f64, sample: f64) -> f64 {
    EMA_KEEP * old + EMA_BLEND * sample
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Telemetry for one receive/decode pipeline.
///
/// The f64 averages are stored as bit patterns in `AtomicU64` so readers get
/// whole values without a mutex.
pub struct Telemetry {
    /// Filtered video bandwidth, Mbps
    bandwidth_mbps: AtomicU64,

    /// Filtered decoded frame rate, frames per second
    frames_per_second: AtomicU64,

    /// Unix microseconds of the last decoded frame
    last_frame_micros: AtomicU64,

    /// Number of frames decoded over the pipeline lifetime
    frames_decoded: AtomicU64,

    /// Total compressed bytes consumed
    bytes_received: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            bandwidth_mbps: AtomicU64::new(0f64.to_bits()),
            frames_per_second: AtomicU64::new(0f64.to_bits()),
            last_frame_micros: AtomicU64::new(now_micros()),
            frames_decoded: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Fold one decoded frame into the averages.
    ///
    /// `bytes` is the compressed payload consumed since the previous decoded
    /// frame and `elapsed` the wall-clock time since it.
    pub fn record_frame(&self, bytes: usize, elapsed: Duration) {
        let secs = elapsed.as_secs_f64().max(1e-9);
        let instant_mbps = (bytes as f64 * 8.0) / secs / (1024.0 * 1024.0);
        let mbps = ema(self.bandwidth_mbps(), instant_mbps);
        self.bandwidth_mbps
            .store(mbps.to_bits(), Ordering::Relaxed);

        let elapsed_ms = elapsed.as_millis().max(1) as f64;
        let instant_fps = 1000.0 / elapsed_ms;
        let fps = ema(self.frames_per_second(), instant_fps);
        self.frames_per_second
            .store(fps.to_bits(), Ordering::Relaxed);

        self.last_frame_micros
            .store(now_micros(), Ordering::Relaxed);
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bandwidth_mbps(&self) -> f64 {
        f64::from_bits(self.bandwidth_mbps.load(Ordering::Relaxed))
    }

    pub fn frames_per_second(&self) -> f64 {
        f64::from_bits(self.frames_per_second.load(Ordering::Relaxed))
    }

    /// Unix microseconds of the last decoded frame.
    pub fn last_frame_micros(&self) -> u64 {
        self.last_frame_micros.load(Ordering::Relaxed)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} Mbps, {:.2} fps, {} frames, {} bytes",
            self.bandwidth_mbps(),
            self.frames_per_second(),
            self.frames_decoded(),
            self.bytes_received()
        )
    }
}
