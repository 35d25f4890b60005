use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    future::Future,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CatalogKind, CatalogLink, ResolveError};
use crate::audio::track::{CatalogMetadata, TrackDescriptor};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
/// Refresh this long before the provider-side expiry.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Option<AlbumRef>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct AlbumTrack {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
    tracks: Paging<AlbumTrack>,
}

/// Spotify Web API client for catalog metadata (client-credentials flow).
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        debug!("🔑 Requesting Spotify access token");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(provider_error)?;

        if !response.status().is_success() {
            return Err(ResolveError::Provider(format!(
                "token request rejected: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(provider_error)?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => return Err(ResolveError::NoResults),
            StatusCode::UNAUTHORIZED => {
                // Revoked early; the next attempt fetches a fresh token.
                *self.token.lock().await = None;
                return Err(ResolveError::Provider("access token rejected".into()));
            }
            status if !status.is_success() => {
                return Err(ResolveError::Provider(format!("{} for {}", status, url)));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))
    }

    async fn drain<T: DeserializeOwned>(&self, first: Paging<T>) -> Result<Vec<T>, ResolveError> {
        drain_pages(first, |url| async move { self.get(&url).await }).await
    }

    /// Every entry behind a catalog link, in catalog order.
    pub async fn expand(&self, link: &CatalogLink) -> Result<Vec<TrackDescriptor>, ResolveError> {
        let descriptors: Vec<TrackDescriptor> = match link.kind {
            CatalogKind::Track => {
                let track: Track = self.get(&format!("{}/tracks/{}", API_BASE, link.id)).await?;
                track_descriptor(track).into_iter().collect()
            }
            CatalogKind::Playlist => {
                let first: Paging<PlaylistItem> = self
                    .get(&format!("{}/playlists/{}/tracks?limit=100", API_BASE, link.id))
                    .await?;
                self.drain(first)
                    .await?
                    .into_iter()
                    .filter_map(|item| item.track)
                    .filter_map(track_descriptor)
                    .collect()
            }
            CatalogKind::Album => {
                let album: Album = self.get(&format!("{}/albums/{}", API_BASE, link.id)).await?;
                let artwork = album.images.into_iter().next().map(|i| i.url);
                self.drain(album.tracks)
                    .await?
                    .into_iter()
                    .filter_map(|t| album_track_descriptor(t, artwork.clone()))
                    .collect()
            }
        };

        info!(
            "🎧 Spotify {:?} {} expanded to {} tracks",
            link.kind,
            link.id,
            descriptors.len()
        );
        Ok(descriptors)
    }
}

/// Follows `next` links until the provider reports no more pages. Any page
/// failing fails the whole expansion.
async fn drain_pages<T, F, Fut>(first: Paging<T>, mut fetch: F) -> Result<Vec<T>, ResolveError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Paging<T>, ResolveError>>,
{
    let mut items = first.items;
    let mut next = first.next;
    while let Some(url) = next {
        debug!("📄 Fetching next Spotify page: {}", url);
        let page = fetch(url).await?;
        items.extend(page.items);
        next = page.next;
    }
    Ok(items)
}

fn provider_error(e: reqwest::Error) -> ResolveError {
    if e.is_timeout() {
        ResolveError::Timeout
    } else {
        ResolveError::Provider(e.to_string())
    }
}

fn join_artists(artists: &[Artist]) -> Option<String> {
    if artists.is_empty() {
        return None;
    }
    Some(
        artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Local files and removed tracks come back without artists; they cannot be searched.
fn track_descriptor(track: Track) -> Option<TrackDescriptor> {
    let artist = join_artists(&track.artists)?;
    let artwork_url = track
        .album
        .and_then(|a| a.images.into_iter().next())
        .map(|i| i.url);
    Some(TrackDescriptor::from_catalog(CatalogMetadata {
        title: track.name,
        artist: Some(artist),
        artwork_url,
    }))
}

fn album_track_descriptor(
    track: AlbumTrack,
    artwork_url: Option<String>,
) -> Option<TrackDescriptor> {
    let artist = join_artists(&track.artists)?;
    Some(TrackDescriptor::from_catalog(CatalogMetadata {
        title: track.name,
        artist: Some(artist),
        artwork_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn page(items: &[u32], next: Option<&str>) -> Paging<u32> {
        Paging {
            items: items.to_vec(),
            next: next.map(String::from),
        }
    }

    #[tokio::test]
    async fn pagination_follows_next_links_in_order() {
        let mut pages = HashMap::from([
            ("p2".to_string(), page(&[3, 4], Some("p3"))),
            ("p3".to_string(), page(&[5], None)),
        ]);
        let mut fetched = Vec::new();

        let items = drain_pages(page(&[1, 2], Some("p2")), |url| {
            fetched.push(url.clone());
            let page = pages.remove(&url).ok_or(ResolveError::NoResults);
            async move { page }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(fetched, vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn failing_page_fails_the_expansion() {
        let mut calls = 0;
        let result = drain_pages(page(&[1], Some("p2")), |_| {
            calls += 1;
            async { Err::<Paging<u32>, _>(ResolveError::Timeout) }
        })
        .await;

        assert_eq!(result, Err(ResolveError::Timeout));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn single_page_needs_no_fetch() {
        let items = drain_pages(page(&[7], None), |_| async {
            Err::<Paging<u32>, _>(ResolveError::NoResults)
        })
        .await
        .unwrap();
        assert_eq!(items, vec![7]);
    }

    #[test]
    fn playlist_items_map_to_search_descriptors() {
        let page: Paging<PlaylistItem> = serde_json::from_str(
            r#"{
                "items": [
                    {"track": {
                        "name": "Digital Love",
                        "artists": [{"name": "Daft Punk"}],
                        "album": {"images": [{"url": "https://i.scdn.co/big"}, {"url": "https://i.scdn.co/small"}]}
                    }},
                    {"track": null},
                    {"track": {"name": "local.mp3", "artists": []}}
                ],
                "next": "https://api.spotify.com/v1/playlists/x/tracks?offset=100&limit=100"
            }"#,
        )
        .unwrap();
        assert!(page.next.is_some());

        let descriptors: Vec<_> = page
            .items
            .into_iter()
            .filter_map(|i| i.track)
            .filter_map(track_descriptor)
            .collect();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].query, "Daft Punk - Digital Love");
        assert_eq!(
            descriptors[0].catalog.as_ref().and_then(|c| c.artwork_url.as_deref()),
            Some("https://i.scdn.co/big")
        );
    }

    #[test]
    fn album_tracks_share_album_artwork() {
        let album: Album = serde_json::from_str(
            r#"{
                "images": [{"url": "https://i.scdn.co/cover"}],
                "tracks": {
                    "items": [{"name": "One", "artists": [{"name": "A"}, {"name": "B"}]}],
                    "next": null
                }
            }"#,
        )
        .unwrap();
        let artwork = album.images.into_iter().next().map(|i| i.url);
        let descriptor = album
            .tracks
            .items
            .into_iter()
            .find_map(|t| album_track_descriptor(t, artwork.clone()))
            .unwrap();
        assert_eq!(descriptor.query, "A, B - One");
        assert_eq!(
            descriptor.catalog.unwrap().artwork_url.as_deref(),
            Some("https://i.scdn.co/cover")
        );
    }
}
