//! Platform implementations of the native seams.

#[cfg(target_os = "linux")]
mod gst;
mod unsupported;
mod xcap_windows;

#[cfg(target_os = "linux")]
pub use gst::GstBackend;
pub use unsupported::UnsupportedBackend;
pub use xcap_windows::XcapWindowSource;
