#![forbid(unsafe_code)]

//! [`ExtractionBackend`] backed by the `yt-dlp` executable.
//!
//! Listings come from `--flat-playlist --dump-single-json`. Downloads use
//! `--extract-audio` with two progress templates so that transfer and
//! post-processing progress can be told apart on stdout:
//!
//! ```text
//! [progress] downloading 1048576 4194304 NA 524288.0 6
//! [postprocess] started FFmpegExtractAudio
//! ```

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::thread;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::backend::{DownloadRequest, ExtractionBackend, FlatEntry, FlatListing, ProgressEvent};
use crate::error::BackendError;

pub const DEFAULT_PROGRAM: &str = "yt-dlp";

const DOWNLOAD_PREFIX: &str = "[progress]";
const POSTPROCESS_PREFIX: &str = "[postprocess]";
const DOWNLOAD_TEMPLATE: &str = "download:[progress] %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";
const POSTPROCESS_TEMPLATE: &str =
    "postprocess:[postprocess] %(progress.status)s %(progress.postprocessor)s";
const EXTRACT_AUDIO: &str = "ExtractAudio";

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

/// `--dump-single-json` payload for a playlist-like URL. A single video has
/// no `entries`, which is read as an empty listing.
#[derive(Debug, Deserialize)]
struct RawListing {
    #[serde(default)]
    entries: Option<Vec<Option<FlatEntry>>>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ffmpeg_location: None,
        }
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs `<program> --version` to fail loudly when yt-dlp is missing.
    pub fn ensure_available(&self) -> Result<(), BackendError> {
        let status = self
            .command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(self.failed(status, "--version returned a failure status")),
            Err(err) => Err(BackendError::Spawn {
                program: self.program_name(),
                reason: format!("not installed or not in PATH: {err}"),
            }),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn failed(&self, status: ExitStatus, message: &str) -> BackendError {
        BackendError::Failed {
            program: self.program_name(),
            status: status.to_string(),
            message: message.to_string(),
        }
    }

    fn spawn_error(&self, err: std::io::Error) -> BackendError {
        BackendError::Spawn {
            program: self.program_name(),
            reason: err.to_string(),
        }
    }
}

impl ExtractionBackend for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn list_flat(&self, url: &str, limit: usize) -> Result<FlatListing, BackendError> {
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--ignore-no-formats-error");
        if limit > 0 {
            command.arg("--playlist-end").arg(limit.to_string());
        }
        command.arg("--").arg(url);

        let output = command.output().map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(output.status, &error_message(&stderr)));
        }

        parse_listing(&output.stdout)
    }

    fn download_audio(
        &self,
        url: &str,
        request: &DownloadRequest,
        events: &Sender<ProgressEvent>,
    ) -> Result<(), BackendError> {
        let mut command = self.command();
        command
            .arg("--format")
            .arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(&request.format.codec)
            .arg("--audio-quality")
            .arg(format!("{}K", request.format.bitrate_kbps))
            .arg("--output")
            .arg(&request.output_template)
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--progress-template")
            .arg(DOWNLOAD_TEMPLATE)
            .arg("--progress-template")
            .arg(POSTPROCESS_TEMPLATE);
        if let Some(location) = &self.ffmpeg_location {
            command.arg("--ffmpeg-location").arg(location);
        }
        command
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %self.program.display(), %url, "spawning download");
        let mut child = command.spawn().map_err(|err| self.spawn_error(err))?;

        // yt-dlp echoes titles and paths in the locale encoding, so both
        // streams are read as bytes and decoded lossily.
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut collected = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut collected);
            }
            String::from_utf8_lossy(&collected).into_owned()
        });

        if let Some(stdout) = child.stdout.take() {
            for raw in BufReader::new(stdout).split(b'\n').map_while(Result::ok) {
                let line = String::from_utf8_lossy(&raw);
                match parse_progress_line(&line) {
                    Some(event) => {
                        let _ = events.send(event);
                    }
                    None => trace!(line = %line, "yt-dlp"),
                }
            }
        }

        let status = child.wait().map_err(|err| self.spawn_error(err))?;
        let stderr = stderr_reader.join().unwrap_or_default();

        if status.success() {
            return Ok(());
        }

        let message = error_message(&stderr);
        let _ = events.send(ProgressEvent::Failed {
            message: message.clone(),
        });
        Err(self.failed(status, &message))
    }
}

fn parse_listing(stdout: &[u8]) -> Result<FlatListing, BackendError> {
    let raw: RawListing =
        serde_json::from_slice(stdout).map_err(|err| BackendError::Malformed(err.to_string()))?;
    Ok(FlatListing {
        entries: raw.entries.unwrap_or_default().into_iter().flatten().collect(),
    })
}

/// Picks the most useful line from yt-dlp's stderr: the last `ERROR:` line,
/// or failing that the last non-empty one.
fn error_message(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "no error output".to_string())
}

/// Translates one stdout line into a progress event, if it carries one.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(DOWNLOAD_PREFIX) {
        let mut fields = rest.split_whitespace();
        let status = fields.next()?;
        let downloaded = fields.next().and_then(parse_number);
        let total = fields.next().and_then(parse_number);
        let estimate = fields.next().and_then(parse_number);
        let speed = fields.next().and_then(parse_number);
        let eta = fields.next().and_then(parse_number);

        let total_bytes = total.or(estimate).map(|value| value as u64);
        return match status {
            "downloading" => Some(ProgressEvent::Downloading {
                downloaded_bytes: downloaded.map(|value| value as u64).unwrap_or(0),
                total_bytes,
                speed_bytes_per_sec: speed,
                eta_seconds: eta.map(|value| value as u64),
            }),
            "finished" => {
                let done = downloaded.map(|value| value as u64).or(total_bytes).unwrap_or(0);
                Some(ProgressEvent::Downloading {
                    downloaded_bytes: done,
                    total_bytes: total_bytes.or(Some(done)),
                    speed_bytes_per_sec: None,
                    eta_seconds: Some(0),
                })
            }
            "error" => Some(ProgressEvent::Failed {
                message: "transfer error".to_string(),
            }),
            _ => None,
        };
    }

    if let Some(rest) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let mut fields = rest.split_whitespace();
        let status = fields.next()?;
        let postprocessor = fields.next()?;
        if !postprocessor.contains(EXTRACT_AUDIO) {
            return None;
        }
        return match status {
            "started" => Some(ProgressEvent::TranscodeStarted),
            "finished" => Some(ProgressEvent::TranscodeFinished),
            _ => None,
        };
    }

    // yt-dlp versions that ignore postprocess templates still log this.
    if line.starts_with("[ExtractAudio]") {
        return Some(ProgressEvent::TranscodeStarted);
    }

    None
}

fn parse_number(field: &str) -> Option<f64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}
