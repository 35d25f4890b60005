pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::{future::Future, sync::LazyLock, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::audio::track::{QueuedTrack, SourceKind, TrackDescriptor};

pub use spotify::SpotifyClient;
pub use ytdlp::YtDlpClient;

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/(?:intl-[a-z]+/)?(track|playlist|album)/([a-zA-Z0-9]+)")
        .expect("valid regex")
});
static SPOTIFY_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:(track|playlist|album):([a-zA-Z0-9]+)").expect("valid regex")
});
static YOUTUBE_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?youtube\.com/playlist\?list=([a-zA-Z0-9_-]+)")
        .expect("valid regex")
});

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// The provider answered, but with nothing playable.
    #[error("no results found")]
    NoResults,
    #[error("catalog integration is not configured")]
    CatalogUnavailable,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("timed out")]
    Timeout,
    #[error("unexpected provider response: {0}")]
    Malformed(String),
}

impl ResolveError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Provider(_) | ResolveError::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Track,
    Playlist,
    Album,
}

impl CatalogKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "track" => Some(CatalogKind::Track),
            "playlist" => Some(CatalogKind::Playlist),
            "album" => Some(CatalogKind::Album),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    pub kind: CatalogKind,
    pub id: String,
}

/// How a `play` query is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Catalog(CatalogLink),
    Playlist(String),
    Single(String),
}

impl QueryKind {
    pub fn is_expansion(&self) -> bool {
        !matches!(self, QueryKind::Single(_))
    }
}

pub fn classify_query(query: &str) -> QueryKind {
    let query = query.trim();

    let catalog = SPOTIFY_URL
        .captures(query)
        .or_else(|| SPOTIFY_URI.captures(query));
    if let Some(caps) = catalog {
        if let Some(kind) = CatalogKind::parse(&caps[1]) {
            return QueryKind::Catalog(CatalogLink {
                kind,
                id: caps[2].to_string(),
            });
        }
    }

    if YOUTUBE_PLAYLIST.is_match(query) {
        return QueryKind::Playlist(query.to_string());
    }

    QueryKind::Single(query.to_string())
}

/// Direct http(s) links are looked up as-is; anything else is searched.
pub fn is_http_url(query: &str) -> bool {
    Url::parse(query.trim()).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

pub fn single_descriptor(query: &str) -> TrackDescriptor {
    if is_http_url(query) {
        TrackDescriptor::url(query.trim())
    } else {
        TrackDescriptor::search(query.trim())
    }
}

/// Turns queries into playable tracks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// One playable track for a search phrase, URL or catalog entry.
    async fn resolve_single(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<QueuedTrack, ResolveError>;

    /// Every entry of a playlist or album, all pages drained. Empty on failure.
    async fn resolve_expansion(&self, query: &QueryKind) -> Vec<TrackDescriptor>;

    fn catalog_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(45),
            backoff: Duration::from_millis(500),
        }
    }
}

/// Runs `op` under `policy`: each attempt is time-boxed, transient failures
/// are retried with linear backoff, permanent ones return immediately.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, ResolveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ResolveError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last = ResolveError::Timeout;

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => {
                warn!("⚠️ {} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                last = e;
            }
            Err(_) => {
                warn!(
                    "⏰ {} timed out after {:?} (attempt {}/{})",
                    what, policy.timeout, attempt, attempts
                );
                last = ResolveError::Timeout;
            }
        }
        if attempt < attempts {
            tokio::time::sleep(policy.backoff * attempt).await;
        }
    }

    Err(last)
}

/// yt-dlp for audio, Spotify (when configured) for catalog metadata.
pub struct SourceManager {
    ytdlp: YtDlpClient,
    spotify: Option<SpotifyClient>,
    policy: RetryPolicy,
}

impl SourceManager {
    pub fn new(ytdlp: YtDlpClient, spotify: Option<SpotifyClient>, policy: RetryPolicy) -> Self {
        Self {
            ytdlp,
            spotify,
            policy,
        }
    }
}

#[async_trait]
impl TrackResolver for SourceManager {
    async fn resolve_single(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<QueuedTrack, ResolveError> {
        debug!("🔍 Resolving '{}'", descriptor.label());
        let track =
            with_retry(self.policy, "yt-dlp lookup", || self.ytdlp.lookup(descriptor)).await?;
        Ok(apply_catalog_metadata(track, descriptor))
    }

    async fn resolve_expansion(&self, query: &QueryKind) -> Vec<TrackDescriptor> {
        let result = match query {
            QueryKind::Catalog(link) => match &self.spotify {
                Some(spotify) => {
                    with_retry(self.policy, "Spotify expansion", || spotify.expand(link)).await
                }
                None => Err(ResolveError::CatalogUnavailable),
            },
            QueryKind::Playlist(url) => {
                with_retry(self.policy, "playlist expansion", || self.ytdlp.playlist(url)).await
            }
            QueryKind::Single(query) => Ok(vec![single_descriptor(query)]),
        };

        match result {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("❌ Expansion of {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }

    fn catalog_available(&self) -> bool {
        self.spotify.is_some()
    }
}

/// Catalog titles, artists and artwork win over what the platform reports.
pub fn apply_catalog_metadata(track: QueuedTrack, descriptor: &TrackDescriptor) -> QueuedTrack {
    let Some(catalog) = &descriptor.catalog else {
        return track;
    };

    let mut merged = QueuedTrack::new(track.audio_reference(), catalog.title.clone())
        .with_source_kind(SourceKind::Catalog);
    if let Some(artist) = &catalog.artist {
        merged = merged.with_artist(artist.clone());
    }
    if let Some(artwork) = catalog.artwork_url.as_deref().or(track.artwork_url()) {
        merged = merged.with_artwork(artwork);
    }
    if let Some(duration) = track.duration() {
        merged = merged.with_duration(duration);
    }
    merged
}
