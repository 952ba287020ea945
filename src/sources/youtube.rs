use std::{process::Stdio, sync::Arc};

use async_process::Command;
use serde::Deserialize;
use songbird::input::ChildContainer;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::display_title;
use crate::error::ResolutionError;

/// Metadata for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
}

impl VideoInfo {
    /// `"{title} by {author}"` with entities decoded.
    pub fn display_title(&self) -> String {
        display_title(&self.title, self.author.as_deref())
    }
}

/// One `--dump-json` object from yt-dlp.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpInfo {
    fn into_video(self) -> Option<VideoInfo> {
        let url = self
            .webpage_url
            .or_else(|| self.url.filter(|u| u.starts_with("http")))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })?;
        Some(VideoInfo {
            url,
            title: self.title?,
            author: self.channel.or(self.uploader),
            thumbnail: self
                .thumbnail
                .or_else(|| self.thumbnails.into_iter().last().map(|t| t.url)),
        })
    }
}

/// Parses one `--dump-json` line.
pub fn parse_video(line: &str) -> Result<VideoInfo, ResolutionError> {
    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| ResolutionError::provider(format!("bad yt-dlp output: {e}")))?;
    info.into_video()
        .ok_or_else(|| ResolutionError::provider("yt-dlp entry without title or url"))
}

/// Talks to YouTube through the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    binary: String,
    format: String,
    rate_limit: String,
    // bounds concurrent metadata lookups
    limiter: Arc<Semaphore>,
}

impl YouTubeClient {
    pub fn new(
        binary: impl Into<String>,
        format: impl Into<String>,
        rate_limit: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
            rate_limit: rate_limit.into(),
            limiter: Arc::new(Semaphore::new(3)),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Top search result for a phrase, if any.
    pub async fn search(&self, phrase: &str) -> Result<Option<VideoInfo>, ResolutionError> {
        info!("🔍 Searching YouTube: {}", phrase);
        let search = format!("ytsearch1:{phrase}");
        let stdout = self
            .run(&[
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search,
            ])
            .await?;

        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .find_map(|line| parse_video(line).ok()))
    }

    pub async fn info(&self, url: &str) -> Result<VideoInfo, ResolutionError> {
        debug!("📊 Fetching video info: {}", url);
        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;
        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| ResolutionError::not_found(format!("no video at {url}")))?;
        parse_video(line)
    }

    /// Command that writes the audio of `url` to stdout.
    pub fn extractor_command(&self, url: &str) -> std::process::Command {
        let mut command = std::process::Command::new(&self.binary);
        command
            .args(["-o", "-", "-q", "--no-playlist", "-f"])
            .arg(&self.format)
            .arg("-r")
            .arg(&self.rate_limit)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        command
    }

    /// Starts yt-dlp streaming `url`. Dropping the container kills the
    /// process.
    pub fn spawn_extractor(&self, url: &str) -> Result<ChildContainer, ResolutionError> {
        let child = self.extractor_command(url).spawn().map_err(|e| {
            ResolutionError::probe(format!("could not start {}: {e}", self.binary))
        })?;
        debug!("⬇️ Streaming {} through {}", url, self.binary);
        Ok(ChildContainer::from(child))
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolutionError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(ResolutionError::provider)?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| ResolutionError::provider(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn classify_failure(stderr: &str) -> ResolutionError {
    let lower = stderr.to_ascii_lowercase();
    let message = stderr.trim();
    if lower.contains("video unavailable")
        || lower.contains("not available")
        || lower.contains("does not exist")
        || lower.contains("404")
    {
        ResolutionError::not_found(message)
    } else {
        ResolutionError::provider(format!("yt-dlp error: {message}"))
    }
}
