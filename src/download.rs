#![forbid(unsafe_code)]

//! Stores selected uploads as audio files.
//!
//! The backend reports transfer and transcode progress as separate events
//! on one channel. The download itself runs on a scoped worker thread while
//! the calling thread drains the channel, folding every event into a single
//! [`DownloadStatus`] that is overwritten and handed to the observer. No
//! history is kept.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::backend::{AudioFormat, DownloadRequest, ExtractionBackend, ProgressEvent};
use crate::error::DownloadError;
use crate::sanitize::sanitize_filename;
use crate::video::VideoRecord;

const MIB: f64 = 1024.0 * 1024.0;

/// Latest known state of one download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    Starting,
    Downloading {
        percent: f64,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed_bytes_per_sec: Option<f64>,
        eta_seconds: Option<u64>,
    },
    Converting,
    Completed,
    Failed {
        message: String,
    },
}

impl DownloadStatus {
    /// Replaces the status with whatever `event` implies.
    pub fn apply(&mut self, event: ProgressEvent) {
        *self = match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                speed_bytes_per_sec,
                eta_seconds,
            } => DownloadStatus::Downloading {
                percent: percent_of(downloaded_bytes, total_bytes),
                downloaded_bytes,
                total_bytes,
                speed_bytes_per_sec,
                eta_seconds,
            },
            ProgressEvent::TranscodeStarted => DownloadStatus::Converting,
            ProgressEvent::TranscodeFinished => DownloadStatus::Completed,
            ProgressEvent::Failed { message } => DownloadStatus::Failed { message },
        };
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed { .. }
        )
    }
}

fn percent_of(downloaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (downloaded as f64 / total as f64 * 100.0).min(100.0),
        _ => 0.0,
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Starting => f.write_str("starting"),
            DownloadStatus::Downloading {
                percent,
                speed_bytes_per_sec,
                eta_seconds,
                ..
            } => {
                let speed = speed_bytes_per_sec
                    .filter(|speed| *speed > 0.0)
                    .map(|speed| format!("{:.2}MiB/s", speed / MIB))
                    .unwrap_or_else(|| "-".to_string());
                let eta = eta_seconds
                    .map(|eta| format!("{eta}s"))
                    .unwrap_or_else(|| "-".to_string());
                write!(f, "downloading {percent:5.1}%  speed: {speed}  eta: {eta}")
            }
            DownloadStatus::Converting => f.write_str("converting audio"),
            DownloadStatus::Completed => f.write_str("completed"),
            DownloadStatus::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Outcome of one item in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub index: usize,
    pub title: String,
    pub result: Result<PathBuf, DownloadError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&BatchItem, &Path)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().ok().map(|path| (item, path.as_path())))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&BatchItem, &DownloadError)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().err().map(|err| (item, err)))
    }
}

pub struct Downloader<'a, B: ?Sized> {
    backend: &'a B,
    output_dir: PathBuf,
    format: AudioFormat,
}

impl<'a, B> Downloader<'a, B>
where
    B: ExtractionBackend + ?Sized,
{
    pub fn new(backend: &'a B, output_dir: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            format,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Creates the destination directory when missing.
    pub fn prepare(&self) -> Result<(), DownloadError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| DownloadError::Io {
            path: self.output_dir.display().to_string(),
            source,
        })
    }

    /// Downloads and transcodes one video, returning the stored file.
    ///
    /// `observer` sees every status change as it happens. A backend that
    /// reports success without leaving an audio file behind is treated as
    /// a failure.
    pub fn download(
        &self,
        video: &VideoRecord,
        observer: &mut dyn FnMut(&DownloadStatus),
    ) -> Result<PathBuf, DownloadError> {
        self.prepare()?;

        let stem = sanitize_filename(&video.title);
        let request = DownloadRequest {
            format: self.format.clone(),
            output_template: self.output_dir.join(format!("{stem}.%(ext)s")),
        };
        debug!(
            backend = self.backend.name(),
            url = %video.url,
            template = %request.output_template.display(),
            "starting download"
        );

        let mut status = DownloadStatus::Starting;
        observer(&status);

        let backend = self.backend;
        let (tx, rx) = mpsc::channel();
        let outcome = thread::scope(|scope| {
            let worker = scope.spawn(move || backend.download_audio(&video.url, &request, &tx));
            for event in rx {
                status.apply(event);
                observer(&status);
            }
            worker.join()
        });

        match outcome {
            Err(_) => {
                status = DownloadStatus::Failed {
                    message: "download worker panicked".to_string(),
                };
                observer(&status);
                Err(DownloadError::WorkerPanicked {
                    title: video.title.clone(),
                })
            }
            Ok(Err(err)) => {
                warn!(url = %video.url, error = %err, "download failed");
                let message = err.to_string();
                // The backend usually reports its own failure first.
                if !matches!(status, DownloadStatus::Failed { .. }) {
                    status = DownloadStatus::Failed {
                        message: message.clone(),
                    };
                    observer(&status);
                }
                Err(DownloadError::Backend {
                    title: video.title.clone(),
                    message,
                })
            }
            Ok(Ok(())) => match locate_output(&self.output_dir, &stem, self.format.extension()) {
                Some(path) => {
                    info!(url = %video.url, path = %path.display(), "download stored");
                    if status != DownloadStatus::Completed {
                        status = DownloadStatus::Completed;
                        observer(&status);
                    }
                    Ok(path)
                }
                None => {
                    let extension = self.format.extension().to_string();
                    warn!(url = %video.url, %extension, "backend finished without output");
                    status = DownloadStatus::Failed {
                        message: format!("no .{extension} file was produced"),
                    };
                    observer(&status);
                    Err(DownloadError::MissingOutput {
                        title: video.title.clone(),
                        extension,
                    })
                }
            },
        }
    }

    /// Downloads each video in turn. A failure is recorded and the batch
    /// moves on to the next item.
    pub fn download_batch(
        &self,
        videos: &[&VideoRecord],
        observer: &mut dyn FnMut(&VideoRecord, &DownloadStatus),
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for &video in videos {
            let result = self.download(video, &mut |status| observer(video, status));
            report.items.push(BatchItem {
                index: video.index,
                title: video.title.clone(),
                result,
            });
        }
        report
    }
}

/// Finds the stored file: the path implied by the sanitized stem when it
/// exists, else the most recently modified file with `extension` in `dir`.
pub fn locate_output(dir: &Path, stem: &str, extension: &str) -> Option<PathBuf> {
    let expected = dir.join(format!("{stem}.{extension}"));
    if expected.is_file() {
        return Some(expected);
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.into_path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}
