//! Window enumeration through `xcap`.

use tracing::debug;
use windowcast_core::{CaptureError, WindowInfo};

use crate::native::WindowSource;

/// Reads the live window list on every call; nothing is cached.
pub struct XcapWindowSource;

impl WindowSource for XcapWindowSource {
    fn list_windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        let windows = xcap::Window::all().map_err(|e| CaptureError::EnumerationFailed {
            reason: e.to_string(),
        })?;

        let infos: Vec<WindowInfo> = windows
            .iter()
            .map(|w| WindowInfo {
                window_id: w.id(),
                app_name: w.app_name().to_string(),
                title: w.title().to_string(),
                bundle_id: None,
                x: w.x(),
                y: w.y(),
                width: w.width(),
                height: w.height(),
                is_visible: !w.is_minimized(),
            })
            .collect();
        debug!("xcap listed {} windows", infos.len());
        Ok(infos)
    }
}
