//! Seams between the stream engine and the platform capture subsystem.
//!
//! A backend opens one [`NativeSession`] per stream. The session calls its
//! [`SessionDelegate`] on a delivery thread it owns: once per frame, and at
//! most once with a terminal error if the session dies on its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use windowcast_core::{CaptureError, Resolution, StreamConfig, WindowInfo};

/// Pixel layout requested from the native layer. Only one is used: the
/// conversion step expects fixed-size interleaved 4-channel pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePixelFormat {
    /// B, G, R, A/X at 4 bytes per pixel.
    Bgra8,
}

/// Parameters for one native capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub window: WindowInfo,
    /// Window size after `resolution_scale`.
    pub resolution: Resolution,
    pub fps: u32,
    pub min_frame_interval: Duration,
    pub show_cursor: bool,
    pub show_shadow: bool,
    pub prefer_gpu: bool,
    pub pixel_format: NativePixelFormat,
}

impl SessionParams {
    pub fn new(window: &WindowInfo, config: &StreamConfig) -> Self {
        let resolution = window.resolution().scaled(config.resolution_scale);
        let params = Self {
            window: window.clone(),
            resolution,
            fps: config.effective_fps(),
            min_frame_interval: config.min_frame_interval(),
            show_cursor: config.capture_cursor,
            show_shadow: config.capture_shadow,
            prefer_gpu: config.use_gpu_acceleration,
            pixel_format: NativePixelFormat::Bgra8,
        };
        debug!(
            "Stream[{}] session params {} @{}fps cursor={} shadow={}",
            window.window_id, params.resolution, params.fps, params.show_cursor, params.show_shadow
        );
        params
    }
}

/// A native pixel buffer handed to the delegate for the duration of one callback.
pub trait PixelBuffer {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn bytes_per_row(&self) -> usize;
    /// True when the pixels live in GPU-resident memory.
    fn is_gpu_backed(&self) -> bool;
    /// Lock the buffer read-only and run `f` over its bytes. The lock is
    /// released when this returns.
    fn with_locked_bytes(&self, f: &mut dyn FnMut(&[u8])) -> Result<(), CaptureError>;
}

/// Receives frames and terminal errors from a native session.
pub trait SessionDelegate: Send + Sync {
    fn on_frame(&self, buffer: &dyn PixelBuffer);
    fn on_stopped_with_error(&self, error: CaptureError);
}

/// One running (or startable) native capture session.
pub trait NativeSession: Send {
    /// Begin delivering frames, waiting up to `timeout` for confirmation.
    /// On error the session must not deliver frames.
    fn start(&mut self, timeout: Duration) -> Result<(), CaptureError>;

    /// Stop delivering frames. Returns `false` if the native layer did not
    /// confirm within `timeout`; the session is considered stopped anyway.
    fn stop(&mut self, timeout: Duration) -> bool;
}

/// Platform capture subsystem.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn open_session(
        &self,
        params: SessionParams,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Box<dyn NativeSession>, CaptureError>;
}

/// Enumerates capturable windows. Results are never cached by the engine
/// beyond a single resolution attempt.
pub trait WindowSource: Send + Sync {
    fn list_windows(&self) -> Result<Vec<WindowInfo>, CaptureError>;

    /// Hint that the next `list_windows` should re-read platform state.
    fn refresh(&self) {}

    fn find_window(&self, window_id: u32) -> Result<Option<WindowInfo>, CaptureError> {
        Ok(self.list_windows()?.into_iter().find(|w| w.window_id == window_id))
    }
}
