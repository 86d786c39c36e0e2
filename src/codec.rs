//! Video codec contracts.
//!
//! The compressed-stream codec is an external collaborator; the pipelines
//! drive it through these traits. The encoder is bound to the transport at
//! construction via a write callback, so encoded output flows straight out as
//! it is produced.
//!
//! [`RawFrameEncoder`] / [`RawFrameDecoder`] implement the contract with a
//! trivial uncompressed wire format (header + RGB24 payload). They are the
//! deterministic codec used by the demo binary and the end-to-end tests.

use crate::device::{PixelFormat, RawFrame};
use bytes::{Buf, BufMut, BytesMut};
use log::{debug, warn};

/// Four-character codec tag, e.g. `FMP4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(tag: [u8; 4]) -> Self {
        Self(tag)
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

/// Sink for encoded packets. Returns false once the downstream transport is
/// gone, which the encoder reports back through `put_frame`.
pub type EncodedWrite = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Encoder side of the codec.
pub trait VideoEncoder: Send {
    /// Bind an output stream with the given geometry, frame rate and codec
    /// tag. Must succeed before any `put_frame`.
    fn add_stream(&mut self, width: u32, height: u32, fps: u32, four_cc: FourCc) -> bool;

    /// Encode one raw frame and flush it downstream. False when encoding
    /// failed or the downstream write reported closure.
    fn put_frame(&mut self, frame: &RawFrame) -> bool;
}

/// One decoded frame, readable in a requested channel layout.
pub trait DecodedFrame {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Copy pixels into `dst` as 3-channel RGB rows of `row_stride` bytes.
    fn extract_rgb(&self, dst: &mut [u8], row_stride: usize) -> bool;

    /// Copy pixels into `dst` as 4-channel RGBA rows of `row_stride` bytes.
    fn extract_rgba(&self, dst: &mut [u8], row_stride: usize) -> bool;
}

/// Decoder side of the codec.
pub trait VideoDecoder: Send {
    /// Feed one compressed packet. Invokes `on_frame` for every frame that
    /// completes; returns whether a frame was decoded.
    fn decode_packet(
        &mut self,
        packet: &[u8],
        on_frame: &mut dyn FnMut(&dyn DecodedFrame),
    ) -> bool;
}

// ── Raw frame codec ─────────────────────────────────────────────

/// Wire magic for the raw-frame packet format.
const RAW_FRAME_MAGIC: &[u8; 4] = b"RVF0";
/// Packet header: magic + width + height.
const RAW_FRAME_HEADER: usize = 4 + 4 + 4;

#[derive(Debug, Clone, Copy)]
struct StreamParams {
    width: u32,
    height: u32,
}

/// Encoder producing one self-contained packet per frame: `RVF0`, width,
/// height (big endian u32), then tightly packed RGB24 rows.
pub struct RawFrameEncoder {
    write: EncodedWrite,
    stream: Option<StreamParams>,
    scratch: BytesMut,
}

impl RawFrameEncoder {
    pub fn new(write: EncodedWrite) -> Self {
        Self {
            write,
            stream: None,
            scratch: BytesMut::new(),
        }
    }
}

impl VideoEncoder for RawFrameEncoder {
    fn add_stream(&mut self, width: u32, height: u32, fps: u32, four_cc: FourCc) -> bool {
        if width == 0 || height == 0 || fps == 0 {
            warn!("rejecting stream with degenerate geometry {width}x{height}@{fps}");
            return false;
        }
        debug!("raw encoder stream bound: {width}x{height}@{fps} ({four_cc})");
        self.stream = Some(StreamParams { width, height });
        true
    }

    fn put_frame(&mut self, frame: &RawFrame) -> bool {
        let Some(stream) = self.stream else {
            warn!("put_frame before add_stream");
            return false;
        };
        if frame.width != stream.width || frame.height != stream.height {
            warn!(
                "frame geometry {}x{} does not match stream {}x{}",
                frame.width, frame.height, stream.width, stream.height
            );
            return false;
        }

        let w = frame.width as usize;
        let h = frame.height as usize;

        self.scratch.clear();
        self.scratch.reserve(RAW_FRAME_HEADER + w * h * 3);
        self.scratch.put_slice(RAW_FRAME_MAGIC);
        self.scratch.put_u32(frame.width);
        self.scratch.put_u32(frame.height);

        let bpp = frame.format.bytes_per_pixel();
        for row in 0..h {
            let line = &frame.data[row * frame.stride..row * frame.stride + w * bpp];
            for px in line.chunks_exact(bpp) {
                let (r, g, b) = match frame.format {
                    PixelFormat::Rgb24 | PixelFormat::Rgba32 => (px[0], px[1], px[2]),
                    PixelFormat::Bgra32 => (px[2], px[1], px[0]),
                };
                self.scratch.put_slice(&[r, g, b]);
            }
        }

        (self.write)(&self.scratch)
    }
}

struct RawDecodedFrame<'a> {
    width: u32,
    height: u32,
    rgb: &'a [u8],
}

impl DecodedFrame for RawDecodedFrame<'_> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn extract_rgb(&self, dst: &mut [u8], row_stride: usize) -> bool {
        let w = self.width as usize;
        let h = self.height as usize;
        if row_stride < w * 3 || dst.len() < row_stride * h {
            return false;
        }
        for row in 0..h {
            let src = &self.rgb[row * w * 3..(row + 1) * w * 3];
            dst[row * row_stride..row * row_stride + w * 3].copy_from_slice(src);
        }
        true
    }

    fn extract_rgba(&self, dst: &mut [u8], row_stride: usize) -> bool {
        let w = self.width as usize;
        let h = self.height as usize;
        if row_stride < w * 4 || dst.len() < row_stride * h {
            return false;
        }
        for row in 0..h {
            let src = &self.rgb[row * w * 3..(row + 1) * w * 3];
            let line = &mut dst[row * row_stride..row * row_stride + w * 4];
            for (out, px) in line.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                out[0] = px[0];
                out[1] = px[1];
                out[2] = px[2];
                out[3] = u8::MAX;
            }
        }
        true
    }
}

/// Decoder for the raw-frame packet format.
#[derive(Debug, Default)]
pub struct RawFrameDecoder;

impl RawFrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl VideoDecoder for RawFrameDecoder {
    fn decode_packet(
        &mut self,
        packet: &[u8],
        on_frame: &mut dyn FnMut(&dyn DecodedFrame),
    ) -> bool {
        if packet.len() < RAW_FRAME_HEADER || &packet[..4] != RAW_FRAME_MAGIC {
            debug!("discarding malformed packet of {} bytes", packet.len());
            return false;
        }

        let mut header = &packet[4..RAW_FRAME_HEADER];
        let width = header.get_u32();
        let height = header.get_u32();
        let payload = &packet[RAW_FRAME_HEADER..];

        let expected = width as usize * height as usize * 3;
        if payload.len() != expected {
            debug!(
                "packet payload is {} bytes, expected {} for {width}x{height}",
                payload.len(),
                expected
            );
            return false;
        }

        on_frame(&RawDecodedFrame {
            width,
            height,
            rgb: payload,
        });
        true
    }
}
