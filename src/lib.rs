#![forbid(unsafe_code)]

//! Core of the channel audio grabber: turns a channel name or URL into a
//! listing of recent uploads and stores selected uploads as audio files.
//!
//! The media work itself is delegated to an [`backend::ExtractionBackend`];
//! [`ytdlp::YtDlp`] is the implementation used by the `grab_audio` binary.

pub mod backend;
pub mod config;
pub mod download;
pub mod error;
pub mod lister;
pub mod resolver;
pub mod sanitize;
pub mod selection;
pub mod video;
pub mod ytdlp;

pub use backend::{
    AudioFormat, DownloadRequest, ExtractionBackend, FlatEntry, FlatListing, ProgressEvent,
};
pub use download::{BatchReport, DownloadStatus, Downloader};
pub use error::{BackendError, DownloadError, ResolveError, RetrievalError, SelectionError};
pub use lister::list_entries;
pub use resolver::{Resolution, ResolutionContext, Resolver};
pub use sanitize::sanitize_filename;
pub use selection::Selection;
pub use video::VideoRecord;
pub use ytdlp::YtDlp;
