use std::time::Duration;

/// Where a track's display metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Metadata from the catalog provider, audio from a platform search.
    Catalog,
    /// Metadata and audio from a direct platform search or URL.
    Search,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Catalog => "Spotify",
            SourceKind::Search => "YouTube",
        }
    }
}

/// A resolved, playable track waiting in (or taken from) a guild queue.
///
/// The audio reference is a short-lived stream locator; it is resolved once,
/// close to enqueue time, and never refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    audio_reference: String,
    title: String,
    artist: Option<String>,
    artwork_url: Option<String>,
    duration: Option<Duration>,
    source_kind: SourceKind,
}

impl QueuedTrack {
    pub fn new(audio_reference: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            audio_reference: audio_reference.into(),
            title: title.into(),
            artist: None,
            artwork_url: None,
            duration: None,
            source_kind: SourceKind::Search,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_artwork(mut self, artwork_url: impl Into<String>) -> Self {
        self.artwork_url = Some(artwork_url.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_source_kind(mut self, source_kind: SourceKind) -> Self {
        self.source_kind = source_kind;
        self
    }

    pub fn audio_reference(&self) -> &str {
        &self.audio_reference
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn artwork_url(&self) -> Option<&str> {
        self.artwork_url.as_deref()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    /// `artist - title` when the artist is known.
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// Display metadata supplied by the catalog provider for one entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
}

/// One entry of a catalog expansion, not yet resolved to audio.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    /// Free-text search terms or a direct platform URL.
    pub query: String,
    pub is_url: bool,
    pub catalog: Option<CatalogMetadata>,
}

impl TrackDescriptor {
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            is_url: false,
            catalog: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            query: url.into(),
            is_url: true,
            catalog: None,
        }
    }

    pub fn from_catalog(metadata: CatalogMetadata) -> Self {
        let query = match &metadata.artist {
            Some(artist) => format!("{} - {}", artist, metadata.title),
            None => metadata.title.clone(),
        };
        Self {
            query,
            is_url: false,
            catalog: Some(metadata),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        self.catalog
            .as_ref()
            .map(|c| c.title.as_str())
            .unwrap_or(&self.query)
    }
}

/// `(m:ss)` suffix used in command replies; empty when the duration is unknown.
pub fn duration_suffix(duration: Option<Duration>) -> String {
    match duration {
        Some(d) if !d.is_zero() => {
            let secs = d.as_secs();
            format!(" ({}:{:02})", secs / 60, secs % 60)
        }
        _ => String::new(),
    }
}
