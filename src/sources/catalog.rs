//! Query expansion before enqueueing.
//!
//! A lookup turns whatever the user typed into one or more queue entries.
//! Entries keep a query the resolver understands (a page URL or a search
//! phrase) plus the display metadata already known; streams are only
//! materialized once an entry reaches the head of the queue.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    has_url_scheme, is_soundcloud_url, is_spotify_url, is_youtube_url,
    soundcloud::{ScTrack, SoundCloudClient},
    spotify::{SpotifyClient, SpotifyTrack},
    youtube::{VideoInfo, YouTubeClient},
};
use crate::error::ResolutionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub query: String,
    pub title: Option<String>,
    pub artwork: Option<String>,
}

impl From<VideoInfo> for CatalogEntry {
    fn from(video: VideoInfo) -> Self {
        Self {
            title: Some(video.display_title()),
            artwork: video.thumbnail,
            query: video.url,
        }
    }
}

impl From<&SpotifyTrack> for CatalogEntry {
    fn from(track: &SpotifyTrack) -> Self {
        Self {
            query: track.search_phrase(),
            title: Some(track.display_title()),
            artwork: track.artwork(),
        }
    }
}

impl CatalogEntry {
    fn from_soundcloud(track: &ScTrack) -> Option<Self> {
        Some(Self {
            query: track.permalink_url.clone()?,
            title: track.display_title(),
            artwork: track.artwork_url.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Single(CatalogEntry),
    Collection {
        name: String,
        owner: Option<String>,
        entries: Vec<CatalogEntry>,
    },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<Lookup, ResolutionError>;
}

/// Catalog over YouTube (always), SoundCloud and Spotify (when configured).
pub struct ProviderCatalog {
    http: reqwest::Client,
    youtube: YouTubeClient,
    soundcloud: Option<SoundCloudClient>,
    spotify: Option<SpotifyClient>,
    max_entries: usize,
}

impl ProviderCatalog {
    pub fn new(
        http: reqwest::Client,
        youtube: YouTubeClient,
        soundcloud: Option<SoundCloudClient>,
        spotify: Option<SpotifyClient>,
        max_entries: usize,
    ) -> Self {
        Self {
            http,
            youtube,
            soundcloud,
            spotify,
            max_entries,
        }
    }

    async fn lookup_spotify(&self, url: &str) -> Result<Lookup, ResolutionError> {
        let spotify = self
            .spotify
            .as_ref()
            .ok_or_else(|| ResolutionError::unsupported(url))?;

        if url.contains("/playlist/") {
            let playlist = spotify.playlist(url, self.max_entries).await?;
            if playlist.tracks.is_empty() {
                return Err(ResolutionError::not_found(format!("{url} has no tracks")));
            }
            info!(
                "📃 Spotify playlist `{}` expanded to {} tracks",
                playlist.name,
                playlist.tracks.len()
            );
            Ok(Lookup::Collection {
                name: playlist.name,
                owner: playlist.owner,
                entries: playlist.tracks.iter().map(CatalogEntry::from).collect(),
            })
        } else if url.contains("/track/") {
            let track = spotify.track(url).await?;
            Ok(Lookup::Single(CatalogEntry::from(&track)))
        } else {
            Err(ResolutionError::unsupported(url))
        }
    }

    async fn lookup_soundcloud(&self, url: &str) -> Result<Lookup, ResolutionError> {
        let soundcloud = self
            .soundcloud
            .as_ref()
            .ok_or_else(|| ResolutionError::unsupported(url))?;

        // short links (on.soundcloud.com) only reveal sets after redirects
        let final_url = self.http.get(url).send().await?.url().to_string();
        debug!("☁️ {} resolved to {}", url, final_url);

        if final_url.contains("/sets/") {
            let playlist = soundcloud.playlist(&final_url).await?;
            let entries: Vec<_> = playlist
                .tracks
                .iter()
                .filter_map(CatalogEntry::from_soundcloud)
                .take(self.max_entries)
                .collect();
            if entries.is_empty() {
                return Err(ResolutionError::not_found(format!("{url} has no tracks")));
            }
            Ok(Lookup::Collection {
                name: playlist.title,
                owner: playlist.user.map(|u| u.username),
                entries,
            })
        } else {
            let track = soundcloud.track(&final_url).await?;
            CatalogEntry::from_soundcloud(&track)
                .map(Lookup::Single)
                .ok_or_else(|| ResolutionError::not_found(format!("{url} has no page")))
        }
    }
}

#[async_trait]
impl Catalog for ProviderCatalog {
    async fn lookup(&self, query: &str) -> Result<Lookup, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::not_found("empty query"));
        }

        if !has_url_scheme(query) {
            let hit = self
                .youtube
                .search(query)
                .await?
                .ok_or_else(|| ResolutionError::not_found(format!("no results for `{query}`")))?;
            Ok(Lookup::Single(hit.into()))
        } else if is_youtube_url(query) {
            Ok(Lookup::Single(self.youtube.info(query).await?.into()))
        } else if is_spotify_url(query) {
            self.lookup_spotify(query).await
        } else if is_soundcloud_url(query) {
            self.lookup_soundcloud(query).await
        } else {
            Err(ResolutionError::unsupported(query))
        }
    }
}
