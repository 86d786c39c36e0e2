//! Client for a remote render service: ships a local camera feed to the
//! server and shows the rendered result it streams back.
//!
//! The crate is transport- and codec-agnostic. Callers provide a
//! [`transport::Transport`], a [`device::DeviceAdapter`] for the camera and a
//! [`codec::VideoEncoder`]/[`codec::VideoDecoder`] pair; [`RenderClient`]
//! wires them into two bounded-latency worker threads bracketed by a
//! ready/detach handshake.

pub mod assets;
pub mod client;
pub mod codec;
pub mod config;
pub mod device;
pub mod display;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod utils;

pub use client::{ClientError, RenderClient};
pub use config::ClientConfig;
pub use display::FrameBuffer;
