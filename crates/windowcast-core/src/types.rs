use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;

// MARK: - Resolution

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Self = Self { width: 1280, height: 720 };
    pub const FHD: Self = Self { width: 1920, height: 1080 };
    pub const UHD: Self = Self { width: 3840, height: 2160 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Scale both dimensions, never collapsing below one pixel.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |v: u32| ((v as f64 * factor).round() as u32).max(1);
        Self { width: scale(self.width), height: scale(self.height) }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - PixelFormat

/// Pixel format of a delivered frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Uncompressed interleaved BGRA, 4 bytes per pixel.
    #[default]
    Raw,
    Jpeg,
    Png,
}

impl PixelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Channels carried by a payload of this format.
    pub fn channel_count(&self) -> u32 {
        match self {
            Self::Raw | Self::Png => 4,
            Self::Jpeg => 3,
        }
    }

    /// Assumed size reduction relative to raw BGRA.
    pub fn compression_ratio(&self) -> u64 {
        match self {
            Self::Raw => 1,
            Self::Jpeg => 10,
            Self::Png => 3,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Raw => "bgra",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(CaptureError::invalid_config(format!("unknown output format '{other}'"))),
        }
    }
}

// MARK: - WindowInfo

/// A capturable window as reported by the window-enumeration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub window_id: u32,
    pub app_name: String,
    pub title: String,
    /// Bundle / package identifier, when the platform exposes one.
    pub bundle_id: Option<String>,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_visible: bool,
}

impl WindowInfo {
    pub fn new(window_id: u32, app_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            window_id,
            app_name: app_name.into(),
            title: title.into(),
            bundle_id: None,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            is_visible: true,
        }
    }

    pub fn with_geometry(mut self, x: i32, y: i32, width: u32, height: u32) -> Self {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Case-insensitive substring match on application name and, when
    /// `title_filter` is non-empty, on window title.
    pub fn matches(&self, app_name: &str, title_filter: &str) -> bool {
        let app_ok = self.app_name.to_lowercase().contains(&app_name.to_lowercase());
        let title_ok = title_filter.is_empty()
            || self.title.to_lowercase().contains(&title_filter.to_lowercase());
        app_ok && title_ok
    }
}

impl std::fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} - {} ({}x{} @ {},{})",
            self.window_id, self.app_name, self.title, self.width, self.height, self.x, self.y
        )
    }
}

// MARK: - WindowMatchPolicy

/// Tie-break used when several windows match an app/title query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMatchPolicy {
    /// First match in enumeration order.
    #[default]
    FirstMatch,
    /// Largest on-screen area; enumeration order breaks remaining ties.
    LargestArea,
}

impl WindowMatchPolicy {
    pub fn select<'a>(
        &self,
        windows: &'a [WindowInfo],
        app_name: &str,
        title_filter: &str,
    ) -> Option<&'a WindowInfo> {
        let mut candidates = windows.iter().filter(|w| w.matches(app_name, title_filter));
        match self {
            Self::FirstMatch => candidates.next(),
            Self::LargestArea => candidates.fold(None, |best: Option<&WindowInfo>, w| match best {
                Some(b) if b.resolution().total_pixels() >= w.resolution().total_pixels() => Some(b),
                _ => Some(w),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows() -> Vec<WindowInfo> {
        vec![
            WindowInfo::new(11, "Safari", "Gmail - Inbox").with_geometry(0, 0, 800, 600),
            WindowInfo::new(12, "Terminal", "zsh").with_geometry(0, 0, 640, 480),
            WindowInfo::new(13, "Safari", "Docs").with_geometry(0, 0, 1600, 1000),
        ]
    }

    #[test]
    fn first_match_is_case_insensitive_and_ignores_empty_title() {
        let list = windows();
        let hit = WindowMatchPolicy::FirstMatch.select(&list, "safari", "").unwrap();
        assert_eq!(hit.window_id, 11);
    }

    #[test]
    fn title_filter_narrows_match() {
        let list = windows();
        let hit = WindowMatchPolicy::FirstMatch.select(&list, "SAFARI", "docs").unwrap();
        assert_eq!(hit.window_id, 13);
        assert!(WindowMatchPolicy::FirstMatch.select(&list, "safari", "zsh").is_none());
    }

    #[test]
    fn largest_area_prefers_bigger_window() {
        let list = windows();
        let hit = WindowMatchPolicy::LargestArea.select(&list, "safari", "").unwrap();
        assert_eq!(hit.window_id, 13);
    }

    #[test]
    fn pixel_format_parses_aliases() {
        assert_eq!("JPG".parse::<PixelFormat>().unwrap(), PixelFormat::Jpeg);
        assert_eq!("png".parse::<PixelFormat>().unwrap(), PixelFormat::Png);
        assert!("gif".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn scaled_resolution_never_hits_zero() {
        assert_eq!(Resolution::FHD.scaled(0.5), Resolution::new(960, 540));
        assert_eq!(Resolution::new(1, 1).scaled(0.1), Resolution::new(1, 1));
    }
}
