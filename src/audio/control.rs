//! # Music Control
//!
//! The guild-scoped operations behind the slash commands and buttons.
//! Every operation goes through the [`SessionRegistry`] and checks that the
//! caller shares the session's voice channel before touching it.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    connection::{RecoveryPolicy, VoiceConnection},
    player::{AudioPlayer, PlayerEvents},
    registry::SessionRegistry,
    session::{Session, StopRequest},
    track::{NotificationSink, TrackInfo},
};
use crate::{
    error::{CommandError, SessionClosed},
    sources::{Catalog, Lookup, Resolve},
};

/// Upcoming entries shown by the queue view.
pub const QUEUE_PREVIEW: usize = 10;

/// Who issued a command, and where they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub guild_id: GuildId,
    pub voice_channel: Option<ChannelId>,
}

/// Factory for voice transports and players.
#[async_trait]
pub trait VoiceGateway<S>: Send + Sync {
    /// Channel the bot sits in for `guild_id`, session or not.
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Starts joining `channel_id`. The returned connection begins in
    /// `Signalling` and reports its own progress.
    fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<dyn VoiceConnection>;

    fn create_player(&self, guild_id: GuildId, events: PlayerEvents) -> Arc<dyn AudioPlayer<S>>;

    /// Leaves voice without going through a session.
    async fn disconnect(&self, guild_id: GuildId);
}

/// Outcome of a successful `play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Track {
        title: String,
    },
    Collection {
        count: usize,
        name: String,
        owner: Option<String>,
    },
}

impl Enqueued {
    pub fn message(&self) -> String {
        match self {
            Self::Track { title } => format!("Enqueued **{title}**."),
            Self::Collection {
                count,
                name,
                owner: Some(owner),
            } => format!("Enqueued {count} songs from **{name}** playlist by **{owner}**."),
            Self::Collection {
                count,
                name,
                owner: None,
            } => format!("Enqueued {count} songs from **{name}** playlist."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueView {
    pub now_playing: Option<TrackInfo>,
    /// The first [`QUEUE_PREVIEW`] waiting entries.
    pub upcoming: Vec<TrackInfo>,
    /// Waiting entries in total.
    pub total: usize,
}

pub struct MusicControl<S> {
    registry: Arc<SessionRegistry<S>>,
    gateway: Arc<dyn VoiceGateway<S>>,
    resolver: Arc<dyn Resolve<S>>,
    catalog: Arc<dyn Catalog>,
    policy: RecoveryPolicy,
}

impl<S: Send + 'static> MusicControl<S> {
    pub fn new(
        registry: Arc<SessionRegistry<S>>,
        gateway: Arc<dyn VoiceGateway<S>>,
        resolver: Arc<dyn Resolve<S>>,
        catalog: Arc<dyn Catalog>,
        policy: RecoveryPolicy,
    ) -> Self {
        Self {
            registry,
            gateway,
            resolver,
            catalog,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<S>> {
        &self.registry
    }

    /// Joins the caller's channel if needed, waits for the connection,
    /// expands `query` and queues the result.
    pub async fn play(
        &self,
        caller: &Caller,
        sink: &dyn NotificationSink,
        query: &str,
    ) -> Result<Enqueued, CommandError> {
        let guild_id = caller.guild_id;
        let existing = self
            .registry
            .get(guild_id)
            .filter(|session| !session.is_closed());

        let session = match (caller.voice_channel, existing) {
            (Some(channel), Some(session))
                if session.channel_id() != channel && !session.is_idle() =>
            {
                return Err(CommandError::BusyElsewhere);
            }
            (Some(channel), _) => self.registry.get_or_create(
                guild_id,
                |session| {
                    !session.is_closed() && (session.channel_id() == channel || !session.is_idle())
                },
                || self.start_session(guild_id, channel),
            ),
            (None, Some(session)) => session,
            (None, None) => return Err(CommandError::NotInVoiceChannel),
        };

        if let Err(e) = session.wait_ready().await {
            warn!(
                "⏱️ Guild {}: voice connection not ready for `{}`: {}",
                guild_id, query, e
            );
            session.destroy().await;
            return Err(e.into());
        }

        let lookup = self.catalog.lookup(query).await.map_err(|e| {
            warn!("❌ Guild {}: lookup failed for `{}`: {}", guild_id, query, e);
            e
        })?;

        // the connection may have gone away during a slow lookup
        if session.is_closed() {
            warn!(
                "🛑 Guild {}: session closed while looking up `{}`",
                guild_id, query
            );
            return Err(SessionClosed.into());
        }

        let enqueued = match lookup {
            Lookup::Single(entry) => {
                let title = entry.title.clone().unwrap_or_else(|| entry.query.clone());
                session.enqueue(sink.track_events(), entry.query, entry.title, entry.artwork)?;
                Enqueued::Track { title }
            }
            Lookup::Collection {
                name,
                owner,
                entries,
            } => {
                let count = entries.len();
                for entry in entries {
                    session.enqueue(sink.track_events(), entry.query, entry.title, entry.artwork)?;
                }
                Enqueued::Collection { count, name, owner }
            }
        };

        info!("📥 Guild {}: {}", guild_id, enqueued.message());
        Ok(enqueued)
    }

    /// Skips `count` tracks (default one), the playing one included.
    pub fn skip(&self, caller: &Caller, count: Option<usize>) -> Result<usize, CommandError> {
        let session = self.active_session(caller)?;
        Ok(session.stop(StopRequest::Skip(count.unwrap_or(1))))
    }

    /// Clears the queue and closes the session. The bot stays in the channel.
    pub fn stop(&self, caller: &Caller) -> Result<usize, CommandError> {
        let session = self.active_session(caller)?;
        Ok(session.stop(StopRequest::Force))
    }

    pub fn pause(&self, caller: &Caller) -> Result<bool, CommandError> {
        Ok(self.active_session(caller)?.pause())
    }

    pub fn resume(&self, caller: &Caller) -> Result<bool, CommandError> {
        Ok(self.active_session(caller)?.resume())
    }

    /// Leaves voice: through the session if there is one, otherwise by
    /// disconnecting directly.
    pub async fn leave(&self, caller: &Caller) -> Result<(), CommandError> {
        let guild_id = caller.guild_id;
        if let Some(session) = self.registry.get(guild_id) {
            if caller.voice_channel != Some(session.channel_id()) {
                return Err(CommandError::WrongChannel);
            }
            self.registry.remove_if_same(guild_id, &session);
            session.destroy().await;
            info!("👋 Left voice in guild {}", guild_id);
            return Ok(());
        }

        if self.gateway.current_channel(guild_id).await.is_some() {
            self.gateway.disconnect(guild_id).await;
            info!("👋 Left voice in guild {} (no session)", guild_id);
            return Ok(());
        }

        Err(CommandError::NotPlaying)
    }

    /// What is playing and what comes next. Readable from any channel.
    pub fn queue(&self, caller: &Caller) -> Result<QueueView, CommandError> {
        let session = self
            .registry
            .get(caller.guild_id)
            .ok_or(CommandError::NotPlaying)?;
        let queued = session.queued();
        Ok(QueueView {
            now_playing: session.now_playing(),
            total: queued.len(),
            upcoming: queued.into_iter().take(QUEUE_PREVIEW).collect(),
        })
    }

    fn active_session(&self, caller: &Caller) -> Result<Arc<Session<S>>, CommandError> {
        let session = self
            .registry
            .get(caller.guild_id)
            .ok_or(CommandError::NotPlaying)?;
        if caller.voice_channel != Some(session.channel_id()) {
            debug!(
                "🚫 Guild {}: caller in {:?}, session in {}",
                caller.guild_id,
                caller.voice_channel,
                session.channel_id()
            );
            return Err(CommandError::WrongChannel);
        }
        Ok(session)
    }

    fn start_session(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<Session<S>> {
        debug!("🔊 Joining channel {} in guild {}", channel_id, guild_id);
        let connection = self.gateway.join(guild_id, channel_id);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let player = self.gateway.create_player(guild_id, events_tx);
        Session::start(
            guild_id,
            connection,
            player,
            events_rx,
            self.resolver.clone(),
            self.policy,
        )
    }
}
