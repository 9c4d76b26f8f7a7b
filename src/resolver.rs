#![forbid(unsafe_code)]

//! Resolves a channel name or URL into a listing URL that actually yields
//! uploads.
//!
//! The platform exposes channels under several URL schemes (`/@handle`,
//! `/c/name`, `/user/name`, `/channel/UC...`) and a free-text name can match
//! any of them. Candidates are produced by an ordered list of strategies and
//! probed one at a time; the first one that lists at least one upload wins.
//! A failing probe never aborts resolution, it is recorded and skipped.

use std::fmt;

use tracing::{debug, info, warn};

use crate::backend::{ExtractionBackend, FlatEntry, top_search_url};
use crate::error::ResolveError;
use crate::lister::list_entries;
use crate::video::VideoRecord;

pub const PLATFORM_ROOT: &str = "https://www.youtube.com";

/// How a candidate listing URL was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The user supplied a URL.
    DirectUrl,
    /// Channel of the top search hit for the input.
    SearchDerived,
    /// `/@<input>/videos`
    Handle,
    /// `/c/<input>/videos`
    CustomName,
    /// `/user/<input>/videos`
    LegacyUser,
    /// `/channel/<input>/videos`
    ChannelId,
}

/// Order in which free-text input is tried.
pub const FREE_TEXT_STRATEGIES: [Strategy; 5] = [
    Strategy::SearchDerived,
    Strategy::Handle,
    Strategy::CustomName,
    Strategy::LegacyUser,
    Strategy::ChannelId,
];

impl Strategy {
    /// Pattern strategies only need the input; the search strategy is
    /// handled separately because it queries the backend.
    fn pattern_url(self, input: &str) -> Option<String> {
        match self {
            Strategy::Handle => Some(handle_url(input)),
            Strategy::CustomName => Some(custom_name_url(input)),
            Strategy::LegacyUser => Some(legacy_user_url(input)),
            Strategy::ChannelId => Some(channel_id_url(input)),
            Strategy::DirectUrl | Strategy::SearchDerived => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::DirectUrl => "direct url",
            Strategy::SearchDerived => "search",
            Strategy::Handle => "handle",
            Strategy::CustomName => "custom name",
            Strategy::LegacyUser => "legacy user",
            Strategy::ChannelId => "channel id",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(usize),
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub strategy: Strategy,
    pub url: String,
    pub outcome: ProbeOutcome,
}

/// Log of one resolve call: the raw input and every candidate tried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    pub input: String,
    pub attempts: Vec<ProbeAttempt>,
}

impl ResolutionContext {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            attempts: Vec::new(),
        }
    }

    fn record(&mut self, strategy: Strategy, url: &str, outcome: ProbeOutcome) {
        self.attempts.push(ProbeAttempt {
            strategy,
            url: url.to_string(),
            outcome,
        });
    }

    fn not_found(self) -> ResolveError {
        ResolveError::NotFound {
            input: self.input,
            attempts: self.attempts,
        }
    }
}

/// A listing URL that was probed successfully, with what it listed.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub listing_url: String,
    pub strategy: Strategy,
    pub videos: Vec<VideoRecord>,
    pub context: ResolutionContext,
}

pub struct Resolver<'a, B: ?Sized> {
    backend: &'a B,
    max_results: usize,
}

impl<'a, B> Resolver<'a, B>
where
    B: ExtractionBackend + ?Sized,
{
    pub fn new(backend: &'a B, max_results: usize) -> Self {
        Self {
            backend,
            max_results,
        }
    }

    /// Entry point for whatever the user typed. URL-shaped input is listed
    /// as-is and never falls back to name guessing.
    pub fn resolve(&self, input: &str) -> Result<Resolution, ResolveError> {
        let input = input.trim();
        if looks_like_url(input) {
            return self.resolve_url(input);
        }

        let mut context = ResolutionContext::new(input);
        if input.is_empty() {
            return Err(context.not_found());
        }
        match self.resolve_name(input, &mut context) {
            Some((strategy, url, videos)) => Ok(finish(strategy, url, videos, context)),
            None => Err(context.not_found()),
        }
    }

    /// Lists a URL the user supplied directly.
    pub fn resolve_url(&self, url: &str) -> Result<Resolution, ResolveError> {
        let url = url.trim();
        let mut context = ResolutionContext::new(url);
        match self.probe(Strategy::DirectUrl, url, &mut context) {
            Some(videos) => Ok(finish(Strategy::DirectUrl, url.to_string(), videos, context)),
            None => Err(context.not_found()),
        }
    }

    /// Tries a known listing URL first and, when it yields nothing, resolves
    /// `fallback_name` as free text. Used for bookmarked channels whose URL
    /// may have moved.
    pub fn resolve_with_fallback(
        &self,
        url: &str,
        fallback_name: &str,
    ) -> Result<Resolution, ResolveError> {
        let url = url.trim();
        let fallback_name = fallback_name.trim();
        let mut context = ResolutionContext::new(url);

        if let Some(videos) = self.probe(Strategy::DirectUrl, url, &mut context) {
            return Ok(finish(Strategy::DirectUrl, url.to_string(), videos, context));
        }
        if fallback_name.is_empty() {
            return Err(context.not_found());
        }

        debug!(%url, fallback = %fallback_name, "bookmark yielded nothing, resolving by name");
        match self.resolve_name(fallback_name, &mut context) {
            Some((strategy, url, videos)) => Ok(finish(strategy, url, videos, context)),
            None => Err(context.not_found()),
        }
    }

    fn resolve_name(
        &self,
        input: &str,
        context: &mut ResolutionContext,
    ) -> Option<(Strategy, String, Vec<VideoRecord>)> {
        FREE_TEXT_STRATEGIES.into_iter().find_map(|strategy| {
            let url = match strategy {
                Strategy::SearchDerived => self.search_candidate(input, context)?,
                other => other.pattern_url(input)?,
            };
            let videos = self.probe(strategy, &url, context)?;
            Some((strategy, url, videos))
        })
    }

    /// Looks up the top search hit for `input` and derives its channel's
    /// listing URL. The hit is not verified to be the channel the user
    /// meant; a same-named channel can win here.
    fn search_candidate(&self, input: &str, context: &mut ResolutionContext) -> Option<String> {
        let search_url = top_search_url(input);
        let listing = match self.backend.list_flat(&search_url, 1) {
            Ok(listing) => listing,
            Err(err) => {
                warn!(%input, error = %err, "channel search failed");
                context.record(
                    Strategy::SearchDerived,
                    &search_url,
                    ProbeOutcome::Failed(err.to_string()),
                );
                return None;
            }
        };

        let candidate = listing.entries.first().and_then(channel_url_from_hit);
        if candidate.is_none() {
            debug!(%input, "search returned no channel information");
            context.record(Strategy::SearchDerived, &search_url, ProbeOutcome::Empty);
        }
        candidate
    }

    fn probe(
        &self,
        strategy: Strategy,
        url: &str,
        context: &mut ResolutionContext,
    ) -> Option<Vec<VideoRecord>> {
        debug!(%strategy, %url, "probing candidate");
        match list_entries(self.backend, url, self.max_results) {
            Ok(videos) if !videos.is_empty() => {
                info!(%strategy, %url, count = videos.len(), "channel listing accepted");
                context.record(strategy, url, ProbeOutcome::Found(videos.len()));
                Some(videos)
            }
            Ok(_) => {
                debug!(%strategy, %url, "candidate listed no uploads");
                context.record(strategy, url, ProbeOutcome::Empty);
                None
            }
            Err(err) => {
                warn!(%strategy, %url, error = %err, "candidate failed");
                context.record(strategy, url, ProbeOutcome::Failed(err.to_string()));
                None
            }
        }
    }
}

fn finish(
    strategy: Strategy,
    listing_url: String,
    videos: Vec<VideoRecord>,
    context: ResolutionContext,
) -> Resolution {
    Resolution {
        listing_url,
        strategy,
        videos,
        context,
    }
}

/// True for input that should be listed verbatim instead of guessed at.
pub fn looks_like_url(input: &str) -> bool {
    let lower = input.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Picks the most specific channel reference from a search hit: an id
/// (`@handle` or `UC...`), then an uploader handle, then the display name.
pub fn channel_url_from_hit(hit: &FlatEntry) -> Option<String> {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    if let Some(id) = non_empty(&hit.channel_id) {
        return Some(if id.starts_with('@') {
            handle_url(&id)
        } else {
            channel_id_url(&id)
        });
    }
    if let Some(handle) = non_empty(&hit.uploader_id).filter(|id| id.starts_with('@')) {
        return Some(handle_url(&handle));
    }
    non_empty(&hit.channel).map(|name| {
        if name.starts_with('@') {
            handle_url(&name)
        } else {
            custom_name_url(&name)
        }
    })
}

pub fn handle_url(handle: &str) -> String {
    let handle = handle.trim().trim_start_matches('@');
    format!("{PLATFORM_ROOT}/@{}/videos", urlencoding::encode(handle))
}

pub fn custom_name_url(name: &str) -> String {
    format!("{PLATFORM_ROOT}/c/{}/videos", urlencoding::encode(name.trim()))
}

pub fn legacy_user_url(name: &str) -> String {
    format!("{PLATFORM_ROOT}/user/{}/videos", urlencoding::encode(name.trim()))
}

pub fn channel_id_url(id: &str) -> String {
    format!("{PLATFORM_ROOT}/channel/{}/videos", urlencoding::encode(id.trim()))
}
