//! # Sources Module
//!
//! Everything that turns a user query into something playable.
//!
//! - [`classify`] decides which provider owns a query.
//! - [`Resolve`] materializes a queue entry into a stream when it reaches
//!   the head of the queue ([`TrackResolver`] is the songbird-backed one).
//! - [`Catalog`] expands a query into queue entries before enqueueing
//!   ([`ProviderCatalog`] covers YouTube, SoundCloud and Spotify).

pub mod catalog;
pub mod resolver;
pub mod soundcloud;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use url::Url;

use crate::{audio::track::TrackInfo, error::ResolutionError};

pub use catalog::{Catalog, CatalogEntry, Lookup, ProviderCatalog};
pub use resolver::TrackResolver;

/// Providers that can stream audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// yt-dlp backed; also handles bare search phrases.
    YouTube,
    SoundCloud,
}

/// Picks the provider for a query. First match wins:
/// no URL scheme or a YouTube host goes to YouTube, a SoundCloud URL goes
/// to SoundCloud, anything else is unsupported.
pub fn classify(query: &str) -> Option<Provider> {
    if !has_url_scheme(query) || is_youtube_url(query) {
        Some(Provider::YouTube)
    } else if host_has_label(query, "soundcloud") {
        Some(Provider::SoundCloud)
    } else {
        None
    }
}

pub fn has_url_scheme(query: &str) -> bool {
    let query = query.trim_start();
    query.starts_with("http://") || query.starts_with("https://")
}

pub fn is_youtube_url(query: &str) -> bool {
    host_of(query).is_some_and(|host| host == "youtu.be" || host_labels_contain(&host, "youtube"))
}

pub fn is_spotify_url(query: &str) -> bool {
    host_has_label(query, "spotify")
}

pub fn is_soundcloud_url(query: &str) -> bool {
    host_has_label(query, "soundcloud")
}

fn host_of(query: &str) -> Option<String> {
    if !has_url_scheme(query) {
        return None;
    }
    Url::parse(query.trim())
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
}

fn host_has_label(query: &str, label: &str) -> bool {
    host_of(query).is_some_and(|host| host_labels_contain(&host, label))
}

fn host_labels_contain(host: &str, label: &str) -> bool {
    host.split('.').any(|part| part == label)
}

/// Decodes HTML entities and trims; provider titles arrive escaped.
pub fn clean_text(raw: &str) -> String {
    htmlescape::decode_html(raw)
        .unwrap_or_else(|_| raw.to_string())
        .trim()
        .to_string()
}

/// `"{title} by {author}"`, both cleaned.
pub fn display_title(title: &str, author: Option<&str>) -> String {
    match author.map(clean_text).filter(|a| !a.is_empty()) {
        Some(author) => format!("{} by {}", clean_text(title), author),
        None => clean_text(title),
    }
}

/// A stream plus whatever metadata resolution discovered.
pub struct Resolved<S> {
    pub stream: S,
    pub title: Option<String>,
    pub artwork: Option<String>,
}

/// Turns a queue entry into a playable stream.
#[async_trait]
pub trait Resolve<S>: Send + Sync {
    /// `track` carries the metadata already known, so providers can skip
    /// lookups they do not need.
    async fn resolve(&self, track: &TrackInfo) -> Result<Resolved<S>, ResolutionError>;
}
