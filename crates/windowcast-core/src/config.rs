use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::errors::{CaptureError, ConfigError};
use crate::frame::Frame;
use crate::types::{PixelFormat, WindowMatchPolicy};

/// Native delivery is capped near the display refresh rate.
pub const MAX_TARGET_FPS: u32 = 60;

/// Side-channel hook run on the delivery thread for every frame.
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync>;
/// Hook run on start failures and asynchronous session interruptions.
pub type ErrorCallback = Arc<dyn Fn(&CaptureError) + Send + Sync>;

// MARK: - OverflowPolicy

/// What the producer does when the frame buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered frame and count it as dropped.
    #[default]
    DropOldest,
    /// Stall the delivery thread until a consumer frees a slot.
    Block,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OverflowRepr {
    Flag(bool),
    Named(OverflowPolicy),
}

/// Accepts `"drop_oldest"` / `"block"` or the boolean `drop_frames_on_overflow` form.
fn deserialize_overflow<'de, D: Deserializer<'de>>(d: D) -> Result<OverflowPolicy, D::Error> {
    Ok(match OverflowRepr::deserialize(d)? {
        OverflowRepr::Flag(true) => OverflowPolicy::DropOldest,
        OverflowRepr::Flag(false) => OverflowPolicy::Block,
        OverflowRepr::Named(policy) => policy,
    })
}

// MARK: - StreamConfig

/// Capture parameters for one stream.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    #[serde(alias = "targetFPS", alias = "targetFps")]
    pub target_fps: u32,
    /// Maximum buffered frames; `0` means unbounded.
    #[serde(alias = "maxBufferSize")]
    pub max_buffer_size: usize,
    #[serde(alias = "outputFormat")]
    pub output_format: PixelFormat,
    #[serde(alias = "jpegQuality")]
    pub jpeg_quality: u8,
    #[serde(alias = "useGpuAcceleration")]
    pub use_gpu_acceleration: bool,
    #[serde(
        alias = "overflowPolicy",
        alias = "drop_frames_on_overflow",
        alias = "dropFramesOnOverflow",
        deserialize_with = "deserialize_overflow"
    )]
    pub overflow_policy: OverflowPolicy,
    #[serde(alias = "captureCursor")]
    pub capture_cursor: bool,
    #[serde(alias = "captureShadow")]
    pub capture_shadow: bool,
    #[serde(alias = "resolutionScale")]
    pub resolution_scale: f64,
    #[serde(skip)]
    pub frame_callback: Option<FrameCallback>,
    #[serde(skip)]
    pub error_callback: Option<ErrorCallback>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            max_buffer_size: 10,
            output_format: PixelFormat::Raw,
            jpeg_quality: 85,
            use_gpu_acceleration: true,
            overflow_policy: OverflowPolicy::DropOldest,
            capture_cursor: false,
            capture_shadow: false,
            resolution_scale: 1.0,
            frame_callback: None,
            error_callback: None,
        }
    }
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("target_fps", &self.target_fps)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("output_format", &self.output_format)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("use_gpu_acceleration", &self.use_gpu_acceleration)
            .field("overflow_policy", &self.overflow_policy)
            .field("capture_cursor", &self.capture_cursor)
            .field("capture_shadow", &self.capture_shadow)
            .field("resolution_scale", &self.resolution_scale)
            .field("frame_callback", &self.frame_callback.is_some())
            .field("error_callback", &self.error_callback.is_some())
            .finish()
    }
}

impl StreamConfig {
    /// 60 fps raw passthrough with a short buffer.
    pub fn high_performance() -> Self {
        Self {
            target_fps: 60,
            max_buffer_size: 5,
            output_format: PixelFormat::Raw,
            ..Default::default()
        }
    }

    /// 15 fps half-resolution JPEG.
    pub fn low_bandwidth() -> Self {
        Self {
            target_fps: 15,
            output_format: PixelFormat::Jpeg,
            jpeg_quality: 70,
            resolution_scale: 0.5,
            ..Default::default()
        }
    }

    pub fn drop_frames_on_overflow(&self) -> bool {
        self.overflow_policy == OverflowPolicy::DropOldest
    }

    pub fn with_drop_frames_on_overflow(mut self, drop: bool) -> Self {
        self.overflow_policy = if drop { OverflowPolicy::DropOldest } else { OverflowPolicy::Block };
        self
    }

    pub fn with_frame_callback(mut self, callback: impl Fn(&Frame) + Send + Sync + 'static) -> Self {
        self.frame_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_error_callback(
        mut self,
        callback: impl Fn(&CaptureError) + Send + Sync + 'static,
    ) -> Self {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    /// Frame rate actually requested from the native layer.
    pub fn effective_fps(&self) -> u32 {
        if self.target_fps > MAX_TARGET_FPS {
            warn!("target_fps {} above native limit, clamping to {}", self.target_fps, MAX_TARGET_FPS);
        }
        self.target_fps.clamp(1, MAX_TARGET_FPS)
    }

    /// Minimum interval between native frames.
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.effective_fps() as u64)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.target_fps == 0 {
            return Err(CaptureError::invalid_config("target_fps must be at least 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CaptureError::invalid_config(format!(
                "jpeg_quality {} outside 1-100",
                self.jpeg_quality
            )));
        }
        if !self.resolution_scale.is_finite() || self.resolution_scale <= 0.0 {
            return Err(CaptureError::invalid_config(format!(
                "resolution_scale {} must be a positive number",
                self.resolution_scale
            )));
        }
        Ok(())
    }
}

// MARK: - ManagerConfig

/// Settings for a stream manager, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    #[serde(alias = "maxConcurrentStreams")]
    pub max_concurrent_streams: usize,
    /// Bounded wait for native start confirmation.
    #[serde(alias = "startTimeoutMs")]
    pub start_timeout_ms: u64,
    /// Bounded wait for native stop confirmation.
    #[serde(alias = "stopTimeoutMs")]
    pub stop_timeout_ms: u64,
    #[serde(alias = "matchPolicy")]
    pub match_policy: WindowMatchPolicy,
    /// Used by callers that create streams without an explicit config.
    #[serde(alias = "defaultStream")]
    pub default_stream: StreamConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 10,
            start_timeout_ms: 2_000,
            stop_timeout_ms: 2_000,
            match_policy: WindowMatchPolicy::FirstMatch,
            default_stream: StreamConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Read a JSON config file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.default_stream.validate()?;
        Ok(config.with_env_overrides())
    }

    /// `WINDOWCAST_MAX_STREAMS`, `WINDOWCAST_START_TIMEOUT_MS` and
    /// `WINDOWCAST_STOP_TIMEOUT_MS` override the loaded values when they parse.
    pub fn with_env_overrides(mut self) -> Self {
        fn env_num<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
        }
        if let Some(max) = env_num::<usize>("WINDOWCAST_MAX_STREAMS") {
            self.max_concurrent_streams = max;
        }
        if let Some(ms) = env_num::<u64>("WINDOWCAST_START_TIMEOUT_MS") {
            self.start_timeout_ms = ms;
        }
        if let Some(ms) = env_num::<u64>("WINDOWCAST_STOP_TIMEOUT_MS") {
            self.stop_timeout_ms = ms;
        }
        self
    }
}
