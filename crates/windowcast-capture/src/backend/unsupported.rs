//! Fallback for targets without a capture backend (CI, cross-compilation).

use std::sync::Arc;

use windowcast_core::CaptureError;

use crate::native::{CaptureBackend, NativeSession, SessionDelegate, SessionParams};

pub struct UnsupportedBackend;

impl CaptureBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn open_session(
        &self,
        params: SessionParams,
        _delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Box<dyn NativeSession>, CaptureError> {
        tracing::warn!(
            "Stream[{}] no capture backend for {}",
            params.window.window_id,
            std::env::consts::OS
        );
        Err(CaptureError::start_failed(format!(
            "window capture is not supported on {}",
            std::env::consts::OS
        )))
    }
}
