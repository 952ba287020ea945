//! SoundCloud api-v2 client: URL resolution, set hydration and
//! progressive stream lookup.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use super::display_title;
use crate::error::ResolutionError;

const API_BASE: &str = "https://api-v2.soundcloud.com";
// the resolve endpoint only returns full objects for the first few tracks of a set
const HYDRATE_BATCH: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct ScUser {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScTranscoding {
    pub url: String,
    pub format: ScFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScFormat {
    pub protocol: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScMedia {
    #[serde(default)]
    pub transcodings: Vec<ScTranscoding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScTrack {
    pub id: u64,
    pub title: Option<String>,
    pub permalink_url: Option<String>,
    pub artwork_url: Option<String>,
    pub user: Option<ScUser>,
    #[serde(default)]
    pub media: ScMedia,
}

impl ScTrack {
    pub fn display_title(&self) -> Option<String> {
        let title = self.title.as_deref()?;
        Some(display_title(
            title,
            self.user.as_ref().map(|u| u.username.as_str()),
        ))
    }

    fn is_partial(&self) -> bool {
        self.title.is_none() || self.permalink_url.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScPlaylist {
    pub title: String,
    pub user: Option<ScUser>,
    #[serde(default)]
    pub tracks: Vec<ScTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScResource {
    Track(ScTrack),
    Playlist(ScPlaylist),
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StreamLocation {
    url: String,
}

#[derive(Debug, Clone)]
pub struct SoundCloudClient {
    http: reqwest::Client,
    client_id: String,
    api_base: String,
}

impl SoundCloudClient {
    pub fn new(http: reqwest::Client, client_id: impl Into<String>) -> Self {
        Self::with_api_base(http, client_id, API_BASE)
    }

    pub fn with_api_base(
        http: reqwest::Client,
        client_id: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn resolve(&self, url: &str) -> Result<ScResource, ResolutionError> {
        debug!("☁️ Resolving SoundCloud URL: {}", url);
        let resource = self
            .http
            .get(format!("{}/resolve", self.api_base))
            .query(&[("url", url), ("client_id", self.client_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<ScResource>()
            .await?;
        Ok(resource)
    }

    pub async fn track(&self, url: &str) -> Result<ScTrack, ResolutionError> {
        match self.resolve(url).await? {
            ScResource::Track(track) => Ok(track),
            _ => Err(ResolutionError::not_found(format!("{url} is not a track"))),
        }
    }

    /// Resolves a set and fills in tracks the API returned as bare ids.
    pub async fn playlist(&self, url: &str) -> Result<ScPlaylist, ResolutionError> {
        let mut playlist = match self.resolve(url).await? {
            ScResource::Playlist(playlist) => playlist,
            _ => return Err(ResolutionError::not_found(format!("{url} is not a set"))),
        };

        let missing: Vec<u64> = playlist
            .tracks
            .iter()
            .filter(|track| track.is_partial())
            .map(|track| track.id)
            .collect();
        if missing.is_empty() {
            return Ok(playlist);
        }

        let mut full = HashMap::new();
        for batch in missing.chunks(HYDRATE_BATCH) {
            let ids = batch
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let tracks = self
                .http
                .get(format!("{}/tracks", self.api_base))
                .query(&[("ids", ids.as_str()), ("client_id", self.client_id.as_str())])
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<ScTrack>>()
                .await?;
            full.extend(tracks.into_iter().map(|track| (track.id, track)));
        }

        for track in &mut playlist.tracks {
            if let Some(hydrated) = full.remove(&track.id) {
                *track = hydrated;
            }
        }
        playlist.tracks.retain(|track| !track.is_partial());
        Ok(playlist)
    }

    /// Direct URL of the progressive (plain HTTP) rendition.
    pub async fn progressive_stream_url(&self, track: &ScTrack) -> Result<String, ResolutionError> {
        let transcoding = track
            .media
            .transcodings
            .iter()
            .find(|t| t.format.protocol == "progressive")
            .ok_or_else(|| {
                ResolutionError::not_found(format!("track {} has no progressive stream", track.id))
            })?;

        let location = self
            .http
            .get(&transcoding.url)
            .query(&[("client_id", self.client_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<StreamLocation>()
            .await?;
        Ok(location.url)
    }
}
