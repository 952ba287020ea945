//! # Voice Connection State
//!
//! Explicit state machine for a tenant's voice transport plus the recovery
//! policy applied when it drops.
//!
//! ## States
//!
//! ```text
//! Signalling -> Connecting -> Ready
//!      ^            |           |
//!      +------ Disconnected <---+
//!
//! any state -> Destroyed (terminal)
//! ```
//!
//! Observers subscribe through a [`tokio::sync::watch`] channel; the cell
//! rejects transitions the table does not allow.

use std::time::Duration;

use async_trait::async_trait;
use serenity::model::id::ChannelId;
use thiserror::Error;
use tokio::sync::watch;

use crate::error::ConnectionTimeout;

/// Websocket close code Discord sends when the bot was kicked or moved.
pub const KICKED_OR_MOVED: u16 = 4014;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The voice websocket closed, with its close code when known.
    WebSocketClose(Option<u16>),
    /// Joining failed or the gateway never answered.
    JoinFailed,
    /// The transport failed below the websocket (UDP, crypto, ...).
    Transport,
}

impl DisconnectReason {
    /// A 4014 close can mean a kick or a channel move; only a follow-up
    /// reconnect tells them apart.
    pub fn is_kick_or_move(&self) -> bool {
        matches!(self, Self::WebSocketClose(Some(KICKED_OR_MOVED)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Signalling,
    Connecting,
    Ready,
    Disconnected(DisconnectReason),
    Destroyed,
}

impl ConnectionState {
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Signalling, Connecting | Disconnected(_)) => true,
            (Connecting, Ready | Signalling | Disconnected(_)) => true,
            (Ready, Signalling | Connecting | Disconnected(_)) => true,
            (Disconnected(_), Signalling | Connecting) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid connection transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Holds the current state and broadcasts every accepted transition.
#[derive(Debug)]
pub struct ConnectionCell {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Signalling);
        Self { tx }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Applies `next` if the table allows it and returns the previous state.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        let mut result = Err(InvalidTransition {
            from: next,
            to: next,
        });
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                result = Ok(*current);
                *current = next;
                true
            } else {
                result = Err(InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        result
    }
}

/// The transport side of a session.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn state(&self) -> ConnectionState;

    fn subscribe(&self) -> watch::Receiver<ConnectionState>;

    /// Channel the connection is currently bound to.
    fn channel_id(&self) -> ChannelId;

    /// Rejoins since the connection was last ready.
    fn rejoin_attempts(&self) -> u32;

    /// Asks the transport to sign in again. Returns false if it refused.
    async fn rejoin(&self) -> bool;

    /// Tears the connection down for good. Idempotent.
    async fn destroy(&self);
}

/// Waits until the state satisfies `accept`, or `timeout` elapses.
pub async fn enters_state<F>(
    mut rx: watch::Receiver<ConnectionState>,
    timeout: Duration,
    mut accept: F,
) -> Result<ConnectionState, ConnectionTimeout>
where
    F: FnMut(&ConnectionState) -> bool,
{
    let wait = async move {
        rx.wait_for(|state| accept(state))
            .await
            .map(|state| *state)
            .map_err(|_| ConnectionTimeout::Closed)
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionTimeout::Elapsed),
    }
}

/// What to do after the transport dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Give the transport this long to start reconnecting on its own.
    AwaitReconnect(Duration),
    /// Sleep, then rejoin.
    Rejoin { delay: Duration },
    Destroy,
}

/// Timeouts and retry budget for a session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub ready_timeout: Duration,
    pub reconnect_window: Duration,
    pub rejoin_backoff: Duration,
    pub max_rejoin_attempts: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(20),
            reconnect_window: Duration::from_secs(5),
            rejoin_backoff: Duration::from_secs(5),
            max_rejoin_attempts: 5,
        }
    }
}

impl RecoveryPolicy {
    pub fn on_disconnect(&self, reason: DisconnectReason, attempts: u32) -> Recovery {
        if reason.is_kick_or_move() {
            Recovery::AwaitReconnect(self.reconnect_window)
        } else if attempts < self.max_rejoin_attempts {
            Recovery::Rejoin {
                delay: self.rejoin_delay(attempts),
            }
        } else {
            Recovery::Destroy
        }
    }

    /// Linear backoff: one step per attempt already made, plus one.
    pub fn rejoin_delay(&self, attempts: u32) -> Duration {
        self.rejoin_backoff.saturating_mul(attempts.saturating_add(1))
    }
}
