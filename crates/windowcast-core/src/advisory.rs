//! Sizing helpers for callers choosing stream parameters.

use crate::config::StreamConfig;
use crate::encode::NATIVE_BYTES_PER_PIXEL;
use crate::types::Resolution;

/// Suggested target fps for a window of the given size.
///
/// | Size | GPU | CPU |
/// |------|-----|-----|
/// | ≤ 720p | 60 | 60 |
/// | ≤ 1080p | 60 | 30 |
/// | larger (1440p, 4K…) | 30 | 15 |
pub fn recommended_fps(width: u32, height: u32, gpu_available: bool) -> u32 {
    let pixels = Resolution::new(width, height).total_pixels();
    if pixels <= Resolution::HD.total_pixels() {
        60
    } else if pixels <= Resolution::FHD.total_pixels() {
        if gpu_available { 60 } else { 30 }
    } else if gpu_available {
        30
    } else {
        15
    }
}

/// Expected buffered bytes for a full buffer at the given window size.
///
/// Per-frame size is `w*h*4` divided by the format's assumed compression
/// ratio (raw 1, JPEG 10, PNG 3). Returns `None` for unbounded buffers.
pub fn estimate_memory_usage(config: &StreamConfig, width: u32, height: u32) -> Option<u64> {
    if config.max_buffer_size == 0 {
        return None;
    }
    let raw = width as u64 * height as u64 * NATIVE_BYTES_PER_PIXEL as u64;
    let per_frame = raw / config.output_format.compression_ratio();
    Some(per_frame * config.max_buffer_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    #[test]
    fn fps_buckets() {
        assert_eq!(recommended_fps(1280, 720, false), 60);
        assert_eq!(recommended_fps(1920, 1080, true), 60);
        assert_eq!(recommended_fps(1920, 1080, false), 30);
        assert_eq!(recommended_fps(3840, 2160, true), 30);
        assert_eq!(recommended_fps(3840, 2160, false), 15);
    }

    #[test]
    fn memory_estimate_by_format() {
        let raw = StreamConfig { max_buffer_size: 10, ..Default::default() };
        assert_eq!(estimate_memory_usage(&raw, 100, 100), Some(400_000));

        let jpeg = StreamConfig { output_format: PixelFormat::Jpeg, ..raw.clone() };
        assert_eq!(estimate_memory_usage(&jpeg, 100, 100), Some(40_000));

        let png = StreamConfig { output_format: PixelFormat::Png, ..raw.clone() };
        assert_eq!(estimate_memory_usage(&png, 100, 100), Some(133_330));

        let unbounded = StreamConfig { max_buffer_size: 0, ..raw };
        assert_eq!(estimate_memory_usage(&unbounded, 100, 100), None);
    }
}
