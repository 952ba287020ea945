//! # Error Types
//!
//! Classified errors shared by the resolver, the session and the command
//! surface. Only [`CommandError::user_message`] text ever reaches a user;
//! everything else is logged.

use std::fmt;

use thiserror::Error;

/// Why a query could not be turned into a playable stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    /// The provider answered but had nothing for the query.
    NotFound,
    /// No provider owns the query.
    UnsupportedFormat,
    /// The provider could not be reached or answered garbage.
    ProviderError,
    /// The stream could not be started or its container recognised.
    ProbeFailed,
}

impl fmt::Display for ResolutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::UnsupportedFormat => "unsupported format",
            Self::ProviderError => "provider error",
            Self::ProbeFailed => "probe failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    message: String,
}

impl ResolutionError {
    pub fn new(kind: ResolutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ResolutionErrorKind::NotFound, message)
    }

    pub fn unsupported(query: &str) -> Self {
        Self::new(
            ResolutionErrorKind::UnsupportedFormat,
            format!("no provider handles `{query}`"),
        )
    }

    pub fn provider(message: impl fmt::Display) -> Self {
        Self::new(ResolutionErrorKind::ProviderError, message.to_string())
    }

    pub fn probe(message: impl fmt::Display) -> Self {
        Self::new(ResolutionErrorKind::ProbeFailed, message.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for ResolutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            Self::not_found(err.to_string())
        } else {
            Self::provider(err)
        }
    }
}

/// A connection did not reach the awaited state in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionTimeout {
    #[error("voice connection did not become ready in time")]
    Elapsed,
    #[error("voice connection went away while waiting")]
    Closed,
}

/// The session stopped taking entries (force-stopped or disconnected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session is closed")]
pub struct SessionClosed;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("player is busy")]
    Busy,
    #[error("no voice call for this guild")]
    NoCall,
}

/// Rejections and failures of user-facing music commands.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("caller is not in a voice channel")]
    NotInVoiceChannel,
    #[error("no session for this guild")]
    NotPlaying,
    #[error("caller is in a different voice channel")]
    WrongChannel,
    #[error("bot is busy in another voice channel")]
    BusyElsewhere,
    #[error(transparent)]
    ConnectionTimeout(#[from] ConnectionTimeout),
    #[error(transparent)]
    SessionClosed(#[from] SessionClosed),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl CommandError {
    /// Templated text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotInVoiceChannel => "Join a voice channel and then try that again.".into(),
            Self::NotPlaying => "Not playing in this server.".into(),
            Self::WrongChannel => {
                "You must be on the same channel where I'm currently active to perform this action."
                    .into()
            }
            Self::BusyElsewhere => "I'm currently playing on another channel.".into(),
            Self::ConnectionTimeout(_) => {
                "Failed to join voice channel in time, please try again later.".into()
            }
            Self::SessionClosed(_) => {
                "Lost the voice connection before your song could be queued, please try again."
                    .into()
            }
            Self::Resolution(err) => match err.kind {
                ResolutionErrorKind::NotFound => "No match found, please try again.".into(),
                ResolutionErrorKind::UnsupportedFormat => {
                    "This link is currently not supported.".into()
                }
                ResolutionErrorKind::ProviderError | ResolutionErrorKind::ProbeFailed => {
                    "Failed to play track, please try again later.".into()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_messages_are_classified() {
        let not_found = CommandError::from(ResolutionError::not_found("empty search"));
        assert_eq!(not_found.user_message(), "No match found, please try again.");

        let unsupported = CommandError::from(ResolutionError::unsupported("https://x.test"));
        assert_eq!(
            unsupported.user_message(),
            "This link is currently not supported."
        );

        let probe = CommandError::from(ResolutionError::probe("exit status 1"));
        assert_eq!(
            probe.user_message(),
            "Failed to play track, please try again later."
        );
    }

    #[test]
    fn test_internal_details_stay_out_of_user_messages() {
        let err = CommandError::from(ResolutionError::provider("token=secret"));
        assert!(!err.user_message().contains("secret"));
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_connection_messages() {
        let timeout = CommandError::from(ConnectionTimeout::Elapsed);
        assert_eq!(
            timeout.user_message(),
            "Failed to join voice channel in time, please try again later."
        );
        assert!(!timeout.user_message().chars().any(|c| c.is_ascii_digit()));

        let closed = CommandError::from(SessionClosed);
        assert!(closed.user_message().starts_with("Lost the voice connection"));
    }
}
