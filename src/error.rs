#![forbid(unsafe_code)]

//! Error types shared by the resolver, lister and download orchestrator.

use thiserror::Error;

use crate::resolver::ProbeAttempt;

/// Failure reported by an extraction backend call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend executable could not be started.
    #[error("could not run {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The backend ran but exited unsuccessfully.
    #[error("{program} failed ({status}): {message}")]
    Failed {
        program: String,
        status: String,
        message: String,
    },

    /// The backend output could not be understood.
    #[error("unreadable backend output: {0}")]
    Malformed(String),
}

/// A single listing probe failed. Resolution treats this as a failed
/// candidate and moves on.
#[derive(Debug, Clone, Error)]
#[error("listing {url} failed: {source}")]
pub struct RetrievalError {
    pub url: String,
    #[source]
    pub source: BackendError,
}

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Every strategy was exhausted without yielding a single upload.
    #[error("channel not found for '{input}' after {} attempt(s)", attempts.len())]
    NotFound {
        input: String,
        attempts: Vec<ProbeAttempt>,
    },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download of '{title}' failed: {message}")]
    Backend { title: String, message: String },

    /// The backend reported success but no audio file could be found.
    #[error("no .{extension} file was produced for '{title}'")]
    MissingOutput { title: String, extension: String },

    #[error("preparing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download worker for '{title}' panicked")]
    WorkerPanicked { title: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("invalid selection '{0}': expected numbers separated by commas, 'all' or 'q'")]
    InvalidSelection(String),
}
