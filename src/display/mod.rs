pub mod frame;

pub use frame::{FrameBuffer, SharedFrameBuffer};
