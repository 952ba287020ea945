use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::connection::RecoveryPolicy;

pub const DEFAULT_YTDLP_FORMAT: &str = "bestaudio[ext=webm+acodec=opus+asr=48000]/bestaudio";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // registers commands in this guild only

    // Extractor
    pub ytdlp_path: String,
    pub ytdlp_format: String,
    pub ytdlp_rate_limit: String,

    // APIs (optional)
    pub soundcloud_client_id: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Voice connection
    pub ready_timeout: Duration,
    pub reconnect_window: Duration,
    pub rejoin_backoff: Duration,
    pub max_rejoin_attempts: u32,

    // Limits
    pub max_playlist_size: usize,
    pub finished_message_ttl: Duration,
}

impl Config {
    /// Loads `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let duration = |key: &str, default: Duration| -> Result<Duration> {
            match var(key) {
                Some(value) => humantime::parse_duration(value.trim())
                    .with_context(|| format!("{key} must be a duration like `20s`, got `{value}`")),
                None => Ok(default),
            }
        };

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Extractor
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_format: var("YTDLP_FORMAT").unwrap_or(defaults.ytdlp_format),
            ytdlp_rate_limit: var("YTDLP_RATE_LIMIT").unwrap_or(defaults.ytdlp_rate_limit),

            // APIs
            soundcloud_client_id: var("SOUNDCLOUD_CLIENT_ID"),
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),

            // Voice connection
            ready_timeout: duration("READY_TIMEOUT", defaults.ready_timeout)?,
            reconnect_window: duration("RECONNECT_WINDOW", defaults.reconnect_window)?,
            rejoin_backoff: duration("REJOIN_BACKOFF", defaults.rejoin_backoff)?,
            max_rejoin_attempts: var("MAX_REJOIN_ATTEMPTS")
                .unwrap_or_else(|| defaults.max_rejoin_attempts.to_string())
                .parse()
                .context("MAX_REJOIN_ATTEMPTS must be a number")?,

            // Limits
            max_playlist_size: var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|| defaults.max_playlist_size.to_string())
                .parse()
                .context("MAX_PLAYLIST_SIZE must be a number")?,
            finished_message_ttl: duration("FINISHED_MESSAGE_TTL", defaults.finished_message_ttl)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token must not be empty
    /// - Voice timeouts and the rejoin backoff must be non-zero
    /// - Playlists must allow at least one track
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        for (name, value) in [
            ("READY_TIMEOUT", self.ready_timeout),
            ("RECONNECT_WINDOW", self.reconnect_window),
            ("REJOIN_BACKOFF", self.rejoin_backoff),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            ready_timeout: self.ready_timeout,
            reconnect_window: self.reconnect_window,
            rejoin_backoff: self.rejoin_backoff,
            max_rejoin_attempts: self.max_rejoin_attempts,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Secrets are reported only as present or absent.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Extractor: {} -f {} -r {}\n  \
            Providers: SoundCloud={}, Spotify={}\n  \
            Voice: ready {}, reconnect window {}, backoff {} x{}\n  \
            Limits: {} playlist tracks, finished messages kept {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.ytdlp_path,
            self.ytdlp_format,
            self.ytdlp_rate_limit,
            self.soundcloud_client_id.is_some(),
            self.spotify_client_id.is_some(),
            humantime::format_duration(self.ready_timeout),
            humantime::format_duration(self.reconnect_window),
            humantime::format_duration(self.rejoin_backoff),
            self.max_rejoin_attempts,
            self.max_playlist_size,
            humantime::format_duration(self.finished_message_ttl),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let policy = RecoveryPolicy::default();
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_format: DEFAULT_YTDLP_FORMAT.to_string(),
            ytdlp_rate_limit: "100K".to_string(),

            soundcloud_client_id: None,
            spotify_client_id: None,
            spotify_client_secret: None,

            ready_timeout: policy.ready_timeout,
            reconnect_window: policy.reconnect_window,
            rejoin_backoff: policy.rejoin_backoff,
            max_rejoin_attempts: policy.max_rejoin_attempts,

            max_playlist_size: 100,
            finished_message_ttl: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply() {
        let config = load(&[("DISCORD_TOKEN", "tok"), ("APPLICATION_ID", "42")]).unwrap();
        assert_eq!(config.application_id, 42);
        assert_eq!(config.ytdlp_format, DEFAULT_YTDLP_FORMAT);
        assert_eq!(config.recovery_policy(), RecoveryPolicy::default());
        assert_eq!(config.finished_message_ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_durations_use_humantime() {
        let config = load(&[
            ("DISCORD_TOKEN", "tok"),
            ("APPLICATION_ID", "42"),
            ("READY_TIMEOUT", "1m 30s"),
            ("REJOIN_BACKOFF", "250ms"),
        ])
        .unwrap();
        assert_eq!(config.ready_timeout, Duration::from_secs(90));
        assert_eq!(config.rejoin_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("APPLICATION_ID", "42")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "tok"), ("APPLICATION_ID", "x")]).is_err());
        assert!(load(&[
            ("DISCORD_TOKEN", "tok"),
            ("APPLICATION_ID", "1"),
            ("READY_TIMEOUT", "0s"),
        ])
        .is_err());
        assert!(load(&[
            ("DISCORD_TOKEN", "tok"),
            ("APPLICATION_ID", "1"),
            ("SPOTIFY_CLIENT_ID", "only-id"),
        ])
        .is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = load(&[
            ("DISCORD_TOKEN", "super-secret"),
            ("APPLICATION_ID", "1"),
            ("SPOTIFY_CLIENT_ID", "sid"),
            ("SPOTIFY_CLIENT_SECRET", "shh"),
        ])
        .unwrap();
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(!summary.contains("shh"));
        assert!(summary.contains("Spotify=true"));
    }
}
