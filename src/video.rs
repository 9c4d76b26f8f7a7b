#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Title used when the platform reports none.
pub const UNTITLED: &str = "Untitled";

/// Label shown instead of a duration when the length is unknown.
pub const UNKNOWN_DURATION: &str = "unknown";

/// One upload in a channel listing.
///
/// Records are built by [`crate::lister::list_entries`] and never change
/// afterwards. `index` is 1-based and dense within a single listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub url: String,
    /// Length in seconds; `0` means unknown.
    pub duration: u64,
}

impl VideoRecord {
    /// Human readable duration, `unknown` when the length was not reported.
    pub fn duration_label(&self) -> String {
        format_duration(self.duration).unwrap_or_else(|| UNKNOWN_DURATION.to_string())
    }
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Renders durations as `H:MM:SS` or `M:SS` for short clips. Zero yields
/// `None` because the backend uses it for "not reported".
pub fn format_duration(duration: u64) -> Option<String> {
    if duration == 0 {
        return None;
    }

    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;

    Some(if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    })
}
