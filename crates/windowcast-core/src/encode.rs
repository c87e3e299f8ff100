//! Output-format strategies applied on the delivery thread.
//!
//! Encoding is split in two so the caller can release the native pixel
//! buffer between the steps:
//!
//! ```text
//! locked native buffer ──draw()──► Bitmap (owned, tightly packed)
//!                                     │   native buffer unlocked here
//!                                     ▼
//!                                 encode() ──► EncodedImage
//! ```

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};

use crate::config::StreamConfig;
use crate::errors::CaptureError;
use crate::types::PixelFormat;

/// Bytes per pixel of the native capture format (interleaved BGRA / BGRx).
pub const NATIVE_BYTES_PER_PIXEL: usize = 4;

/// Owned, tightly packed pixels copied out of a native buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Vec<u8>,
}

/// Result of the encode step, ready to be sealed into a [`Frame`](crate::Frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub channel_count: u32,
    pub format: PixelFormat,
    pub payload: Bytes,
}

/// Encode strategy, chosen once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoder {
    /// Zero-transform passthrough of BGRA bytes.
    Raw,
    Jpeg { quality: u8 },
    Png,
}

impl FrameEncoder {
    pub fn from_config(config: &StreamConfig) -> Self {
        match config.output_format {
            PixelFormat::Raw => Self::Raw,
            PixelFormat::Jpeg => Self::Jpeg { quality: config.jpeg_quality.clamp(1, 100) },
            PixelFormat::Png => Self::Png,
        }
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            Self::Raw => PixelFormat::Raw,
            Self::Jpeg { .. } => PixelFormat::Jpeg,
            Self::Png => PixelFormat::Png,
        }
    }

    /// Copy a (possibly row-padded) BGRA buffer into an owned bitmap laid
    /// out the way the encode step wants it: BGRA for raw, RGB for JPEG,
    /// RGBA for PNG.
    pub fn draw(
        &self,
        src: &[u8],
        width: u32,
        height: u32,
        bytes_per_row: usize,
    ) -> Result<Bitmap, CaptureError> {
        let row_len = width as usize * NATIVE_BYTES_PER_PIXEL;
        let rows = height as usize;
        if bytes_per_row < row_len {
            return Err(CaptureError::EncodeFailed {
                reason: format!("row stride {bytes_per_row} shorter than {row_len} bytes"),
            });
        }
        let needed = bytes_per_row * rows.saturating_sub(1) + row_len;
        if rows > 0 && src.len() < needed {
            return Err(CaptureError::EncodeFailed {
                reason: format!("buffer holds {} bytes, {}x{} needs {}", src.len(), width, height, needed),
            });
        }

        let channels = self.format().channel_count();
        let mut pixels = Vec::with_capacity(width as usize * rows * channels as usize);

        match self {
            Self::Raw if bytes_per_row == row_len => {
                pixels.extend_from_slice(&src[..row_len * rows]);
            }
            Self::Raw => {
                for row in src.chunks(bytes_per_row).take(rows) {
                    pixels.extend_from_slice(&row[..row_len]);
                }
            }
            Self::Jpeg { .. } => {
                for row in src.chunks(bytes_per_row).take(rows) {
                    for px in row[..row_len].chunks_exact(4) {
                        pixels.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
            }
            Self::Png => {
                for row in src.chunks(bytes_per_row).take(rows) {
                    for px in row[..row_len].chunks_exact(4) {
                        // BGRx sources leave the fourth byte undefined.
                        pixels.extend_from_slice(&[px[2], px[1], px[0], 255]);
                    }
                }
            }
        }

        Ok(Bitmap { width, height, channels, pixels })
    }

    /// Compress a bitmap produced by [`draw`](Self::draw).
    pub fn encode(&self, bitmap: Bitmap) -> Result<EncodedImage, CaptureError> {
        let Bitmap { width, height, channels, pixels } = bitmap;
        let payload = match self {
            Self::Raw => Bytes::from(pixels),
            Self::Jpeg { quality } => {
                let mut out = Cursor::new(Vec::with_capacity(pixels.len() / 8));
                JpegEncoder::new_with_quality(&mut out, *quality)
                    .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| CaptureError::EncodeFailed { reason: format!("jpeg: {e}") })?;
                Bytes::from(out.into_inner())
            }
            Self::Png => {
                let mut out = Cursor::new(Vec::with_capacity(pixels.len() / 2));
                PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::Sub)
                    .write_image(&pixels, width, height, ExtendedColorType::Rgba8)
                    .map_err(|e| CaptureError::EncodeFailed { reason: format!("png: {e}") })?;
                Bytes::from(out.into_inner())
            }
        };

        Ok(EncodedImage { width, height, channel_count: channels, format: self.format(), payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x2 BGRA image with 4 bytes of row padding.
    fn padded_source() -> (Vec<u8>, usize) {
        let stride = 3 * 4 + 4;
        let mut src = Vec::new();
        for y in 0..2u8 {
            for x in 0..3u8 {
                src.extend_from_slice(&[x, y, 200, 0]);
            }
            src.extend_from_slice(&[0xEE; 4]);
        }
        (src, stride)
    }

    #[test]
    fn raw_strips_row_padding() {
        let (src, stride) = padded_source();
        let bitmap = FrameEncoder::Raw.draw(&src, 3, 2, stride).unwrap();
        assert_eq!(bitmap.pixels.len(), 3 * 2 * 4);
        assert!(!bitmap.pixels.contains(&0xEE));
        let img = FrameEncoder::Raw.encode(bitmap).unwrap();
        assert_eq!(img.channel_count, 4);
        assert_eq!(img.format, PixelFormat::Raw);
    }

    #[test]
    fn jpeg_produces_jfif_container() {
        let (src, stride) = padded_source();
        let enc = FrameEncoder::Jpeg { quality: 80 };
        let bitmap = enc.draw(&src, 3, 2, stride).unwrap();
        assert_eq!(bitmap.channels, 3);
        assert_eq!(&bitmap.pixels[..3], &[200, 0, 0]);
        let img = enc.encode(bitmap).unwrap();
        assert_eq!(&img.payload[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn png_produces_png_signature_and_opaque_alpha() {
        let (src, stride) = padded_source();
        let bitmap = FrameEncoder::Png.draw(&src, 3, 2, stride).unwrap();
        assert_eq!(bitmap.pixels[3], 255);
        let img = FrameEncoder::Png.encode(bitmap).unwrap();
        assert_eq!(&img.payload[1..4], b"PNG");
        assert_eq!(img.channel_count, 4);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = FrameEncoder::Raw.draw(&[0u8; 10], 3, 2, 12).unwrap_err();
        assert!(matches!(err, CaptureError::EncodeFailed { .. }));
    }

    #[test]
    fn quality_comes_from_config() {
        let cfg = StreamConfig {
            output_format: PixelFormat::Jpeg,
            jpeg_quality: 55,
            ..Default::default()
        };
        assert_eq!(FrameEncoder::from_config(&cfg), FrameEncoder::Jpeg { quality: 55 });
    }
}
