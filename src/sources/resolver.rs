//! Songbird-backed [`Resolve`] implementation.
//!
//! YouTube (and bare search phrases) stream through a yt-dlp subprocess;
//! SoundCloud streams its progressive rendition over HTTP. Either way the
//! stream is probed before the player sees it.

use async_trait::async_trait;
use songbird::input::{
    codecs::{get_codec_registry, get_probe},
    HttpRequest, Input,
};
use tracing::{debug, warn};

use super::{
    classify, has_url_scheme, soundcloud::SoundCloudClient, youtube::YouTubeClient, Provider,
    Resolve, Resolved,
};
use crate::{audio::track::TrackInfo, error::ResolutionError};

pub struct TrackResolver {
    http: reqwest::Client,
    youtube: YouTubeClient,
    soundcloud: Option<SoundCloudClient>,
}

impl TrackResolver {
    pub fn new(
        http: reqwest::Client,
        youtube: YouTubeClient,
        soundcloud: Option<SoundCloudClient>,
    ) -> Self {
        Self {
            http,
            youtube,
            soundcloud,
        }
    }

    async fn resolve_youtube(&self, track: &TrackInfo) -> Result<Resolved<Input>, ResolutionError> {
        let mut title = track.title.clone();
        let mut artwork = track.artwork.clone();

        let url = if has_url_scheme(&track.query) {
            track.query.trim().to_string()
        } else {
            let hit = self.youtube.search(&track.query).await?.ok_or_else(|| {
                ResolutionError::not_found(format!("no results for `{}`", track.query))
            })?;
            title.get_or_insert_with(|| hit.display_title());
            artwork = artwork.or_else(|| hit.thumbnail.clone());
            hit.url
        };

        if title.is_none() || artwork.is_none() {
            let info = self.youtube.info(&url).await?;
            title.get_or_insert_with(|| info.display_title());
            artwork = artwork.or(info.thumbnail);
        }

        let stream = self.extract(&url).await?;
        Ok(Resolved {
            stream,
            title,
            artwork,
        })
    }

    async fn extract(&self, url: &str) -> Result<Input, ResolutionError> {
        let input = Input::from(self.youtube.spawn_extractor(url)?);

        // on failure the input is dropped, which kills and reaps yt-dlp
        match input
            .make_playable_async(get_codec_registry(), get_probe())
            .await
        {
            Ok(input) => {
                debug!("🎧 Extractor stream ready for {}", url);
                Ok(input)
            }
            Err(e) => {
                warn!("❌ Probe failed for {}: {}", url, e);
                Err(ResolutionError::probe(e))
            }
        }
    }

    async fn resolve_soundcloud(
        &self,
        track: &TrackInfo,
    ) -> Result<Resolved<Input>, ResolutionError> {
        let client = self
            .soundcloud
            .as_ref()
            .ok_or_else(|| ResolutionError::unsupported(&track.query))?;

        let found = client.track(track.query.trim()).await?;
        let stream_url = client.progressive_stream_url(&found).await?;

        let input: Input = HttpRequest::new(self.http.clone(), stream_url).into();
        let stream = input
            .make_playable_async(get_codec_registry(), get_probe())
            .await
            .map_err(ResolutionError::probe)?;

        Ok(Resolved {
            stream,
            title: track.title.clone().or_else(|| found.display_title()),
            artwork: track.artwork.clone().or(found.artwork_url),
        })
    }
}

#[async_trait]
impl Resolve<Input> for TrackResolver {
    async fn resolve(&self, track: &TrackInfo) -> Result<Resolved<Input>, ResolutionError> {
        match classify(&track.query) {
            Some(Provider::YouTube) => self.resolve_youtube(track).await,
            Some(Provider::SoundCloud) => self.resolve_soundcloud(track).await,
            None => Err(ResolutionError::unsupported(&track.query)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionErrorKind;

    fn resolver() -> TrackResolver {
        TrackResolver::new(
            reqwest::Client::new(),
            YouTubeClient::new("/nonexistent/yt-dlp", "bestaudio", "100K"),
            None,
        )
    }

    fn info(query: &str) -> TrackInfo {
        TrackInfo {
            query: query.into(),
            title: Some("Known".into()),
            artwork: Some("art.jpg".into()),
        }
    }

    #[tokio::test]
    async fn test_unsupported_link() {
        let err = resolver()
            .resolve(&info("https://example.com/a.mp3"))
            .await
            .err()
            .map(|e| e.kind);
        assert_eq!(err, Some(ResolutionErrorKind::UnsupportedFormat));
    }

    #[tokio::test]
    async fn test_missing_extractor_is_probe_failure() {
        // metadata is already known, so the only subprocess is the extractor
        let err = resolver()
            .resolve(&info("https://www.youtube.com/watch?v=abc"))
            .await
            .err()
            .map(|e| e.kind);
        assert_eq!(err, Some(ResolutionErrorKind::ProbeFailed));
    }

    #[tokio::test]
    async fn test_soundcloud_without_credentials_is_unsupported() {
        let err = resolver()
            .resolve(&info("https://soundcloud.com/artist/song"))
            .await
            .err()
            .map(|e| e.kind);
        assert_eq!(err, Some(ResolutionErrorKind::UnsupportedFormat));
    }
}
