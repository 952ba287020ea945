//! Spotify Web API client (client-credentials flow).
//!
//! Spotify never streams here: its tracks become YouTube search phrases
//! with the Spotify title and album art attached.

use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::error::ResolutionError;

const ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
const API_BASE: &str = "https://api.spotify.com";
// refresh a little before Spotify says the token dies
const TOKEN_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyAlbum {
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub album: SpotifyAlbum,
}

impl SpotifyTrack {
    /// Every credited artist, comma separated.
    fn artists(&self) -> Option<String> {
        let names: Vec<&str> = self
            .artists
            .iter()
            .map(|a| a.name.trim())
            .filter(|name| !name.is_empty())
            .collect();
        (!names.is_empty()).then(|| names.join(", "))
    }

    /// What to search the video provider for.
    pub fn search_phrase(&self) -> String {
        match self.artists() {
            Some(artists) => format!("{} {}", self.name, artists),
            None => self.name.clone(),
        }
    }

    pub fn display_title(&self) -> String {
        super::display_title(&self.name, self.artists().as_deref())
    }

    pub fn artwork(&self) -> Option<String> {
        self.album.images.first().map(|i| i.url.clone())
    }
}

#[derive(Debug, Clone)]
pub struct SpotifyPlaylist {
    pub name: String,
    pub owner: Option<String>,
    pub tracks: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Owner {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistResponse {
    name: String,
    owner: Option<Owner>,
    tracks: Page,
}

/// Extracts the id following `kind` in an open.spotify.com path.
pub fn spotify_id(url: &str, kind: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == kind)?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    accounts_base: String,
    api_base: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyClient {
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::with_endpoints(http, client_id, client_secret, ACCOUNTS_BASE, API_BASE)
    }

    pub fn with_endpoints(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        accounts_base: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            accounts_base: accounts_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ResolutionError> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() + TOKEN_SLACK < *expires {
                return Ok(token.clone());
            }
        }

        debug!("🔑 Requesting Spotify access token");
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .map_err(ResolutionError::provider)?
            .json::<TokenResponse>()
            .await?;

        let expires = Instant::now() + Duration::from_secs(response.expires_in);
        *cached = Some((response.access_token.clone(), expires));
        Ok(response.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolutionError> {
        let token = self.token().await?;
        Ok(self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?)
    }

    pub async fn track(&self, url: &str) -> Result<SpotifyTrack, ResolutionError> {
        let id = spotify_id(url, "track")
            .ok_or_else(|| ResolutionError::not_found(format!("no track id in {url}")))?;
        self.get(&format!("{}/v1/tracks/{}", self.api_base, id)).await
    }

    /// Playlist with at most `limit` playable tracks, following pagination.
    pub async fn playlist(&self, url: &str, limit: usize) -> Result<SpotifyPlaylist, ResolutionError> {
        let id = spotify_id(url, "playlist")
            .ok_or_else(|| ResolutionError::not_found(format!("no playlist id in {url}")))?;
        let response: PlaylistResponse = self
            .get(&format!("{}/v1/playlists/{}", self.api_base, id))
            .await?;

        let mut tracks: Vec<SpotifyTrack> = Vec::new();
        let mut page = response.tracks;
        loop {
            tracks.extend(page.items.into_iter().filter_map(|item| item.track));
            if tracks.len() >= limit {
                tracks.truncate(limit);
                break;
            }
            match page.next {
                Some(next) => page = self.get(&next).await?,
                None => break,
            }
        }

        Ok(SpotifyPlaylist {
            name: response.name,
            owner: response.owner.and_then(|o| o.display_name),
            tracks,
        })
    }
}
