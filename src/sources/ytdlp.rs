use async_process::Command;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::ResolveError;
use crate::audio::track::{QueuedTrack, SourceKind, TrackDescriptor};

/// Best audio first, preferring streams ffmpeg can pass through cheaply.
pub const AUDIO_FORMAT: &str =
    "bestaudio[acodec=opus]/bestaudio[ext=webm]/bestaudio[ext=m4a]/bestaudio";

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Subset of yt-dlp's `--dump-single-json` output we read.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

/// Drives the `yt-dlp` binary for lookups and playlist expansion.
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    binary: String,
    socket_timeout_secs: u64,
    retries: u32,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, socket_timeout_secs: u64, retries: u32) -> Self {
        Self {
            binary: binary.into(),
            socket_timeout_secs,
            retries,
        }
    }

    pub fn lookup_args(&self, descriptor: &TrackDescriptor) -> Vec<String> {
        let target = if descriptor.is_url {
            descriptor.query.clone()
        } else {
            format!("ytsearch1:{}", descriptor.query)
        };

        vec![
            "--format".into(),
            AUDIO_FORMAT.into(),
            "--no-playlist".into(),
            "--dump-single-json".into(),
            "--no-warnings".into(),
            "--quiet".into(),
            "--socket-timeout".into(),
            self.socket_timeout_secs.to_string(),
            "--retries".into(),
            self.retries.to_string(),
            target,
        ]
    }

    pub fn playlist_args(&self, url: &str) -> Vec<String> {
        vec![
            "--flat-playlist".into(),
            "--dump-single-json".into(),
            "--no-warnings".into(),
            "--quiet".into(),
            "--socket-timeout".into(),
            self.socket_timeout_secs.to_string(),
            url.into(),
        ]
    }

    /// Best match for one descriptor, with a fresh stream URL.
    pub async fn lookup(&self, descriptor: &TrackDescriptor) -> Result<QueuedTrack, ResolveError> {
        debug!("🎵 yt-dlp lookup: {}", descriptor.query);
        let stdout = self.run(self.lookup_args(descriptor)).await?;
        parse_lookup(&stdout)
    }

    /// Flat listing of a platform playlist as watch-URL descriptors.
    pub async fn playlist(&self, url: &str) -> Result<Vec<TrackDescriptor>, ResolveError> {
        info!("📋 Expanding playlist: {}", url);
        let stdout = self.run(self.playlist_args(url)).await?;
        parse_playlist(&stdout)
    }

    async fn run(&self, args: Vec<String>) -> Result<String, ResolveError> {
        // Dropped on timeout; the child must not outlive the attempt.
        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Provider(format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Unavailable or unmatched media is a permanent miss, anything else may pass.
fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("no video formats")
        || lower.contains("requested format is not available")
    {
        ResolveError::NoResults
    } else {
        ResolveError::Provider(format!("yt-dlp: {}", stderr))
    }
}

fn parse_lookup(json: &str) -> Result<QueuedTrack, ResolveError> {
    let info: YtDlpInfo =
        serde_json::from_str(json.trim()).map_err(|e| ResolveError::Malformed(e.to_string()))?;

    // Searches wrap the hit in a one-entry playlist.
    let info = match info.entries {
        Some(entries) => entries.into_iter().next().ok_or(ResolveError::NoResults)?,
        None => info,
    };

    let url = info
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ResolveError::Malformed("entry has no stream url".into()))?;

    let mut track = QueuedTrack::new(url, info.title.unwrap_or_else(|| "Untitled".into()))
        .with_source_kind(SourceKind::Search);
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_artwork(thumbnail);
    }
    if let Some(secs) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
        track = track.with_duration(Duration::from_secs_f64(secs));
    }
    Ok(track)
}

fn parse_playlist(json: &str) -> Result<Vec<TrackDescriptor>, ResolveError> {
    let info: YtDlpInfo =
        serde_json::from_str(json.trim()).map_err(|e| ResolveError::Malformed(e.to_string()))?;

    Ok(info
        .entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| entry.id)
        .map(|id| TrackDescriptor::url(format!("{}{}", WATCH_URL, id)))
        .collect())
}
