#![forbid(unsafe_code)]

//! The media-extraction capability the core depends on.
//!
//! Only two operations are needed: a shallow ("flat") listing of whatever
//! sits under a URL, and a combined fetch + audio transcode of a single
//! video. [`crate::ytdlp::YtDlp`] provides both by driving the `yt-dlp`
//! executable; tests substitute an in-memory fake.

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use serde::Deserialize;

use crate::error::BackendError;

/// Shallow metadata for one entry under a listing URL. Everything is
/// optional because the platform omits fields freely.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlatEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Seconds; the platform reports fractional values for some uploads.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
}

/// Entries in backend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatListing {
    pub entries: Vec<FlatEntry>,
}

/// Target encoding for stored audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub codec: String,
    pub bitrate_kbps: u32,
}

impl AudioFormat {
    /// File extension produced by the transcode step.
    pub fn extension(&self) -> &str {
        &self.codec
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            codec: "mp3".to_string(),
            bitrate_kbps: 192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub format: AudioFormat,
    /// Output path with `%(ext)s` standing in for the final extension.
    pub output_template: PathBuf,
}

/// Raw progress reported while a download is running. Transfer and
/// post-processing events arrive on the same channel in the order the
/// backend observed them.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed_bytes_per_sec: Option<f64>,
        eta_seconds: Option<u64>,
    },
    TranscodeStarted,
    TranscodeFinished,
    Failed {
        message: String,
    },
}

pub trait ExtractionBackend: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Lists at most `limit` entries under `url` without resolving each one.
    fn list_flat(&self, url: &str, limit: usize) -> Result<FlatListing, BackendError>;

    /// Fetches `url` and transcodes it into `request.format`, streaming
    /// progress into `events` until the call returns.
    fn download_audio(
        &self,
        url: &str,
        request: &DownloadRequest,
        events: &Sender<ProgressEvent>,
    ) -> Result<(), BackendError>;
}

/// Pseudo-URL that makes the backend return the single best search hit.
pub fn top_search_url(query: &str) -> String {
    format!("ytsearch1:{query}")
}
