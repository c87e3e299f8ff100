use std::time::{Duration, Instant};

use bytes::Bytes;
use image::RgbaImage;

use crate::encode::EncodedImage;
use crate::errors::CaptureError;
use crate::types::PixelFormat;

/// One captured image plus timing / format metadata.
///
/// Fields are private: a `Frame` is never mutated after construction. The
/// payload is reference counted, so cloning a frame (e.g. for
/// `peek_latest`) shares bytes without copying them.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    channel_count: u32,
    pixel_format: PixelFormat,
    payload: Bytes,
    sequence_number: u64,
    captured_at: Instant,
    capture_latency: Duration,
    gpu_accelerated: bool,
}

impl Frame {
    /// Seal an encoded image into a frame. `capture_latency` is measured
    /// from `captured_at` to this call.
    pub fn new(
        image: EncodedImage,
        sequence_number: u64,
        captured_at: Instant,
        gpu_accelerated: bool,
    ) -> Self {
        let EncodedImage { width, height, channel_count, format, payload } = image;
        Self {
            width,
            height,
            channel_count,
            pixel_format: format,
            payload,
            sequence_number,
            captured_at,
            capture_latency: captured_at.elapsed(),
            gpu_accelerated,
        }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn channel_count(&self) -> u32 { self.channel_count }
    pub fn pixel_format(&self) -> PixelFormat { self.pixel_format }
    pub fn payload(&self) -> &Bytes { &self.payload }
    pub fn sequence_number(&self) -> u64 { self.sequence_number }
    pub fn captured_at(&self) -> Instant { self.captured_at }
    pub fn capture_latency(&self) -> Duration { self.capture_latency }
    pub fn gpu_accelerated(&self) -> bool { self.gpu_accelerated }

    pub fn memory_footprint_bytes(&self) -> usize {
        self.payload.len()
    }

    /// Take the payload, consuming the frame.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Decode the payload into an RGBA image (swizzles raw BGRA, decodes
    /// JPEG / PNG containers).
    pub fn to_rgba_image(&self) -> Result<RgbaImage, CaptureError> {
        match self.pixel_format {
            PixelFormat::Raw => {
                let mut rgba = self.payload.to_vec();
                for px in rgba.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                RgbaImage::from_raw(self.width, self.height, rgba).ok_or_else(|| {
                    CaptureError::EncodeFailed {
                        reason: format!(
                            "raw payload of {} bytes does not fit {}x{}",
                            self.payload.len(),
                            self.width,
                            self.height
                        ),
                    }
                })
            }
            PixelFormat::Jpeg | PixelFormat::Png => {
                let format = match self.pixel_format {
                    PixelFormat::Jpeg => image::ImageFormat::Jpeg,
                    _ => image::ImageFormat::Png,
                };
                image::load_from_memory_with_format(&self.payload, format)
                    .map(|img| img.to_rgba8())
                    .map_err(|e| CaptureError::EncodeFailed { reason: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_image(width: u32, height: u32) -> EncodedImage {
        let payload: Vec<u8> = (0..width * height)
            .flat_map(|_| [10u8, 20, 30, 255])
            .collect();
        EncodedImage {
            width,
            height,
            channel_count: 4,
            format: PixelFormat::Raw,
            payload: Bytes::from(payload),
        }
    }

    #[test]
    fn footprint_matches_payload() {
        let frame = Frame::new(raw_image(4, 2), 7, Instant::now(), false);
        assert_eq!(frame.memory_footprint_bytes(), 4 * 2 * 4);
        assert_eq!(frame.sequence_number(), 7);
        assert_eq!(frame.pixel_format(), PixelFormat::Raw);
    }

    #[test]
    fn latency_is_measured_from_capture_start() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        let frame = Frame::new(raw_image(1, 1), 0, start, true);
        assert!(frame.capture_latency() >= Duration::from_millis(5));
        assert!(frame.gpu_accelerated());
    }

    #[test]
    fn raw_frame_converts_to_rgba() {
        let frame = Frame::new(raw_image(2, 2), 0, Instant::now(), false);
        let img = frame.to_rgba_image().unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [30, 20, 10, 255]);
    }
}
