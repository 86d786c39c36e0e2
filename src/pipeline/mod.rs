//! The two media pipelines and their shared bookkeeping.

pub mod capture;
pub mod preview;
pub mod state;
pub mod telemetry;

pub use capture::{CaptureEncodePipeline, DeviceStatus, StreamStatus};
pub use preview::{ConfigError, ReceiveDecodePipeline};
pub use state::{PipelineState, StateCell};
pub use telemetry::Telemetry;
