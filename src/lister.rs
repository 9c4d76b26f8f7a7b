#![forbid(unsafe_code)]

use tracing::debug;

use crate::backend::{ExtractionBackend, FlatEntry};
use crate::error::RetrievalError;
use crate::video::{UNTITLED, VideoRecord, watch_url};

/// Lists the first `max_results` uploads under `url`.
///
/// Entries without an id are dropped after truncation, and indices are
/// assigned afterwards so they stay dense. An empty listing is `Ok(vec![])`;
/// only backend failures become a [`RetrievalError`].
pub fn list_entries<B>(
    backend: &B,
    url: &str,
    max_results: usize,
) -> Result<Vec<VideoRecord>, RetrievalError>
where
    B: ExtractionBackend + ?Sized,
{
    debug!(backend = backend.name(), %url, max_results, "listing entries");

    let listing = backend
        .list_flat(url, max_results)
        .map_err(|source| RetrievalError {
            url: url.to_string(),
            source,
        })?;

    let records: Vec<VideoRecord> = listing
        .entries
        .into_iter()
        .take(max_results)
        .filter_map(record_parts)
        .enumerate()
        .map(|(position, (id, title, url, duration))| VideoRecord {
            index: position + 1,
            id,
            title,
            url,
            duration,
        })
        .collect();

    debug!(%url, count = records.len(), "listing complete");
    Ok(records)
}

fn record_parts(entry: FlatEntry) -> Option<(String, String, String, u64)> {
    let id = entry.id.filter(|id| !id.trim().is_empty())?;
    let title = entry
        .title
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());
    let url = entry
        .url
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| watch_url(&id));
    let duration = entry
        .duration
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .map(|seconds| seconds as u64)
        .unwrap_or(0);
    Some((id, title, url, duration))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{DownloadRequest, FlatListing, ProgressEvent};
    use crate::error::BackendError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::mpsc::Sender;

    /// In-memory backend keyed by listing URL. URLs missing from both maps
    /// fail like an unreachable page.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub listings: HashMap<String, Vec<FlatEntry>>,
        pub failures: HashMap<String, String>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        pub fn with_listing(mut self, url: &str, entries: Vec<FlatEntry>) -> Self {
            self.listings.insert(url.to_string(), entries);
            self
        }

        pub fn with_failure(mut self, url: &str, message: &str) -> Self {
            self.failures.insert(url.to_string(), message.to_string());
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl ExtractionBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        fn list_flat(&self, url: &str, _limit: usize) -> Result<FlatListing, BackendError> {
            self.requested.lock().unwrap().push(url.to_string());
            if let Some(entries) = self.listings.get(url) {
                return Ok(FlatListing {
                    entries: entries.clone(),
                });
            }
            let message = self
                .failures
                .get(url)
                .cloned()
                .unwrap_or_else(|| "HTTP Error 404: Not Found".to_string());
            Err(BackendError::Failed {
                program: "fake".into(),
                status: "exit status: 1".into(),
                message,
            })
        }

        fn download_audio(
            &self,
            _url: &str,
            _request: &DownloadRequest,
            _events: &Sender<ProgressEvent>,
        ) -> Result<(), BackendError> {
            Err(BackendError::Malformed("downloads are not faked here".into()))
        }
    }

    pub(crate) fn entry(id: &str, title: &str, duration: Option<f64>) -> FlatEntry {
        FlatEntry {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            duration,
            ..FlatEntry::default()
        }
    }

    const CHANNEL: &str = "https://www.youtube.com/@SomeChannel/videos";

    #[test]
    fn lists_records_with_dense_indices() -> anyhow::Result<()> {
        let backend = FakeBackend::default().with_listing(
            CHANNEL,
            vec![
                entry("a", "T1", Some(65.0)),
                entry("b", "T2", Some(0.0)),
                entry("c", "T3", Some(3725.0)),
            ],
        );

        let records = list_entries(&backend, CHANNEL, 20)?;
        let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let labels: Vec<String> = records.iter().map(|r| r.duration_label()).collect();
        assert_eq!(labels, vec!["1:05", "unknown", "1:02:05"]);
        assert_eq!(records[0].url, "https://www.youtube.com/watch?v=a");
        Ok(())
    }

    #[test]
    fn skips_entries_without_id_without_leaving_gaps() -> anyhow::Result<()> {
        let mut nameless = entry("", "ghost", None);
        nameless.id = None;
        let backend = FakeBackend::default().with_listing(
            CHANNEL,
            vec![
                entry("a", "T1", None),
                nameless,
                entry("", "blank", None),
                entry("d", "T4", Some(12.7)),
            ],
        );

        let records = list_entries(&backend, CHANNEL, 20)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, 2);
        assert_eq!(records[1].id, "d");
        assert_eq!(records[1].duration, 12);
        assert!(records.iter().all(|r| !r.id.is_empty()));
        Ok(())
    }

    #[test]
    fn truncates_before_filtering() -> anyhow::Result<()> {
        let mut nameless = entry("", "ghost", None);
        nameless.id = None;
        let backend = FakeBackend::default().with_listing(
            CHANNEL,
            vec![entry("a", "T1", None), nameless, entry("c", "T3", None)],
        );

        let records = list_entries(&backend, CHANNEL, 2)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "a");
        Ok(())
    }

    #[test]
    fn fills_defaults_for_missing_fields() -> anyhow::Result<()> {
        let mut bare = FlatEntry::default();
        bare.id = Some("zz".into());
        bare.url = Some("https://www.youtube.com/shorts/zz".into());
        bare.duration = Some(-3.0);
        let backend = FakeBackend::default().with_listing(CHANNEL, vec![bare]);

        let records = list_entries(&backend, CHANNEL, 5)?;
        assert_eq!(records[0].title, UNTITLED);
        assert_eq!(records[0].duration, 0);
        assert_eq!(records[0].url, "https://www.youtube.com/shorts/zz");
        Ok(())
    }

    #[test]
    fn empty_listing_is_not_an_error() -> anyhow::Result<()> {
        let backend = FakeBackend::default().with_listing(CHANNEL, Vec::new());
        assert!(list_entries(&backend, CHANNEL, 20)?.is_empty());
        Ok(())
    }

    #[test]
    fn backend_failure_becomes_retrieval_error() {
        let backend = FakeBackend::default().with_failure(CHANNEL, "Unsupported URL");
        let err = list_entries(&backend, CHANNEL, 20).unwrap_err();
        assert_eq!(err.url, CHANNEL);
        assert!(err.to_string().contains("Unsupported URL"));
    }
}
