//! Persistent per-window capture streams.
//!
//! # Architecture
//!
//! ```text
//! StreamManager ──owns──► CaptureStream (one per window)
//!                             │ start(): WindowSource lookup → CaptureBackend::open_session
//!                             ▼
//!                      NativeSession ──delivery thread──► FrameBridge::on_frame
//!                                                           │ lock → draw → unlock → encode
//!                                                           │ frame_callback (side channel)
//!                                                           ▼
//!                                                    FrameBuffer (Mutex + Condvar)
//!                                                           │
//!             get_frame / try_get_frame / drain_all ◄───────┘
//! ```
//!
//! # Backends
//!
//! | Platform | Capture | Window list |
//! |----------|---------|-------------|
//! | Linux (X11) | GStreamer `ximagesrc xid=…` → appsink | `xcap` |
//! | other | unsupported stub | `xcap` |
//!
//! Any [`CaptureBackend`] / [`WindowSource`] pair can be injected through
//! [`CaptureStream::with_backend`] and [`StreamManager::with_backend`].

pub mod backend;
mod bridge;
pub mod buffer;
pub mod manager;
pub mod native;
pub mod stats;
pub mod stream;

use std::sync::Arc;

pub use buffer::{FrameBuffer, PushOutcome};
pub use manager::{StreamId, StreamManager, DEFAULT_MAX_CONCURRENT_STREAMS};
pub use native::{
    CaptureBackend, NativePixelFormat, NativeSession, PixelBuffer, SessionDelegate, SessionParams,
    WindowSource,
};
pub use stats::{LatencyWindow, StatsRecorder, LATENCY_WINDOW};
pub use stream::CaptureStream;

pub use windowcast_core::{
    estimate_memory_usage, recommended_fps, CaptureError, Frame, ManagerConfig, OverflowPolicy,
    PixelFormat, StreamConfig, StreamStats, WindowInfo, WindowMatchPolicy,
};

/// Capture backend for the current platform.
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(backend::GstBackend::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(backend::UnsupportedBackend)
    }
}

/// Window enumeration for the current platform.
pub fn default_window_source() -> Arc<dyn WindowSource> {
    Arc::new(backend::XcapWindowSource)
}

/// Whether the platform capture subsystem can open sessions.
pub fn is_capture_available() -> bool {
    default_backend().is_available()
}
