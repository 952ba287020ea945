//! # Songbird Driver
//!
//! Production [`VoiceGateway`], [`VoiceConnection`] and [`AudioPlayer`] on
//! top of songbird. Songbird's driver events are folded into the
//! [`ConnectionState`] and [`PlayerStatus`] machines; everything above this
//! module only sees those.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Weak,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::context_data::DisconnectReason as DriverDisconnectReason,
    input::Input,
    model::CloseCode,
    tracks::{PlayMode, TrackHandle},
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{
    connection::{ConnectionCell, ConnectionState, DisconnectReason, VoiceConnection, KICKED_OR_MOVED},
    control::VoiceGateway,
    player::{AudioPlayer, AudioResource, PlayerEvents, PlayerMachine, PlayerStatus},
    track::Track,
};
use crate::error::PlayerError;

fn to_serenity_channel(channel: songbird::id::ChannelId) -> ChannelId {
    ChannelId::new(channel.0.get())
}

fn disconnect_reason(reason: Option<&DriverDisconnectReason>) -> DisconnectReason {
    match reason {
        Some(DriverDisconnectReason::WsClosed(Some(CloseCode::Disconnected))) => {
            DisconnectReason::WebSocketClose(Some(KICKED_OR_MOVED))
        }
        Some(DriverDisconnectReason::WsClosed(_)) => DisconnectReason::WebSocketClose(None),
        Some(DriverDisconnectReason::AttemptDiscarded) | None => DisconnectReason::JoinFailed,
        Some(_) => DisconnectReason::Transport,
    }
}

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway<Input> for SongbirdGateway {
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(to_serenity_channel(channel))
    }

    fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<dyn VoiceConnection> {
        SongbirdConnection::open(self.manager.clone(), guild_id, channel_id)
    }

    fn create_player(&self, guild_id: GuildId, events: PlayerEvents) -> Arc<dyn AudioPlayer<Input>> {
        Arc::new(SongbirdPlayer::new(self.manager.clone(), guild_id, events))
    }

    async fn disconnect(&self, guild_id: GuildId) {
        if let Err(e) = self.manager.remove(guild_id).await {
            warn!("⚠️ Guild {}: disconnect failed: {:?}", guild_id, e);
        }
    }
}

/// A songbird call seen through the connection state machine.
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel: Mutex<ChannelId>,
    cell: ConnectionCell,
    attempts: AtomicU32,
    this: Weak<SongbirdConnection>,
}

impl SongbirdConnection {
    /// Creates the connection and starts joining in the background.
    pub fn open(manager: Arc<Songbird>, guild_id: GuildId, channel_id: ChannelId) -> Arc<Self> {
        let connection = Arc::new_cyclic(|this| Self {
            manager,
            guild_id,
            channel: Mutex::new(channel_id),
            cell: ConnectionCell::new(),
            attempts: AtomicU32::new(0),
            this: this.clone(),
        });
        connection.spawn_connect();
        connection
    }

    fn spawn_connect(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move { this.connect().await });
    }

    fn apply(&self, next: ConnectionState) {
        match self.cell.transition(next) {
            Ok(previous) => debug!(
                "🔌 Guild {}: {:?} -> {:?}",
                self.guild_id, previous, next
            ),
            Err(e) => debug!("🔌 Guild {}: {}", self.guild_id, e),
        }
    }

    async fn connect(&self) {
        if self.cell.transition(ConnectionState::Connecting).is_err() {
            return;
        }
        let channel_id = *self.channel.lock();
        match self.manager.join(self.guild_id, channel_id).await {
            Ok(call) => {
                let mut call = call.lock().await;
                call.remove_all_global_events();
                for event in [
                    CoreEvent::DriverConnect,
                    CoreEvent::DriverReconnect,
                    CoreEvent::DriverDisconnect,
                ] {
                    call.add_global_event(
                        Event::Core(event),
                        DriverEvents {
                            connection: self.this.clone(),
                        },
                    );
                }
                drop(call);
                self.on_ready(None);
                info!("🔊 Joined channel {} in guild {}", channel_id, self.guild_id);
            }
            Err(e) => {
                error!(
                    "❌ Could not join channel {} in guild {}: {:?}",
                    channel_id, self.guild_id, e
                );
                if !self.cell.get().is_destroyed() {
                    self.apply(ConnectionState::Disconnected(DisconnectReason::JoinFailed));
                }
            }
        }
    }

    fn on_ready(&self, channel: Option<ChannelId>) {
        if let Some(channel) = channel {
            *self.channel.lock() = channel;
        }
        if matches!(self.cell.get(), ConnectionState::Disconnected(_)) {
            self.apply(ConnectionState::Connecting);
        }
        self.apply(ConnectionState::Ready);
        if self.cell.get().is_ready() {
            self.attempts.store(0, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn state(&self) -> ConnectionState {
        self.cell.get()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.cell.subscribe()
    }

    fn channel_id(&self) -> ChannelId {
        *self.channel.lock()
    }

    fn rejoin_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn rejoin(&self) -> bool {
        if self.cell.transition(ConnectionState::Signalling).is_err() {
            return false;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("🔄 Guild {}: rejoining (attempt {})", self.guild_id, attempt);
        self.spawn_connect();
        true
    }

    async fn destroy(&self) {
        if self.cell.transition(ConnectionState::Destroyed).is_err() {
            return;
        }
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Guild {}: call already gone: {:?}", self.guild_id, e);
        }
        info!("👋 Voice connection destroyed in guild {}", self.guild_id);
    }
}

struct DriverEvents {
    connection: Weak<SongbirdConnection>,
}

#[async_trait]
impl VoiceEventHandler for DriverEvents {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let connection = self.connection.upgrade()?;
        match ctx {
            EventContext::DriverConnect(data) | EventContext::DriverReconnect(data) => {
                connection.on_ready(data.channel_id.map(to_serenity_channel));
            }
            EventContext::DriverDisconnect(data) => {
                let reason = disconnect_reason(data.reason.as_ref());
                warn!(
                    "🔌 Guild {}: driver disconnected ({:?})",
                    connection.guild_id, reason
                );
                connection.apply(ConnectionState::Disconnected(reason));
            }
            _ => {}
        }
        None
    }
}

/// Plays one [`Input`] at a time on the guild's call.
pub struct SongbirdPlayer {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    machine: Arc<PlayerMachine>,
    handle: Mutex<Option<(u64, TrackHandle)>>,
}

impl SongbirdPlayer {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, events: PlayerEvents) -> Self {
        Self {
            manager,
            guild_id,
            machine: Arc::new(PlayerMachine::new(events)),
            handle: Mutex::new(None),
        }
    }

    /// The handle of the current generation, if any.
    fn current(&self) -> Option<(u64, TrackHandle)> {
        let handle = self.handle.lock();
        handle
            .as_ref()
            .filter(|(generation, _)| *generation == self.machine.generation())
            .cloned()
    }
}

#[async_trait]
impl AudioPlayer<Input> for SongbirdPlayer {
    fn status(&self) -> PlayerStatus {
        self.machine.status()
    }

    fn now_playing(&self) -> Option<Arc<Track>> {
        self.machine.current()
    }

    async fn play(&self, resource: AudioResource<Input>) -> Result<(), PlayerError> {
        let call = self.manager.get(self.guild_id).ok_or(PlayerError::NoCall)?;
        let generation = self.machine.begin(resource.track)?;

        let handle = call.lock().await.play_only_input(resource.stream);
        for event in [
            TrackEvent::Playable,
            TrackEvent::Play,
            TrackEvent::Pause,
            TrackEvent::End,
            TrackEvent::Error,
        ] {
            let handler = TrackStatus {
                machine: Arc::downgrade(&self.machine),
                generation,
            };
            if let Err(e) = handle.add_event(Event::Track(event), handler) {
                warn!(
                    "⚠️ Guild {}: could not watch track event {:?}: {:?}",
                    self.guild_id, event, e
                );
            }
        }
        *self.handle.lock() = Some((generation, handle));
        Ok(())
    }

    fn pause(&self) -> bool {
        let Some((generation, handle)) = self.current() else {
            return false;
        };
        if self.machine.status() != PlayerStatus::Playing || handle.pause().is_err() {
            return false;
        }
        self.machine.transition(generation, PlayerStatus::Paused)
    }

    fn unpause(&self) -> bool {
        let Some((generation, handle)) = self.current() else {
            return false;
        };
        if self.machine.status() != PlayerStatus::Paused || handle.play().is_err() {
            return false;
        }
        self.machine.transition(generation, PlayerStatus::Playing)
    }

    fn stop(&self, force: bool) -> bool {
        let Some((generation, handle)) = self.current() else {
            return false;
        };
        if let Err(e) = handle.stop() {
            debug!("Guild {}: stop on finished track: {:?}", self.guild_id, e);
        }
        // without force the End event brings the player to Idle
        if force || self.machine.status() == PlayerStatus::Buffering {
            return self.machine.transition(generation, PlayerStatus::Idle);
        }
        true
    }
}

struct TrackStatus {
    machine: Weak<PlayerMachine>,
    generation: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackStatus {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let machine = self.machine.upgrade()?;
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        for (state, _handle) in tracks.iter() {
            match &state.playing {
                PlayMode::Play => {
                    machine.transition(self.generation, PlayerStatus::Playing);
                }
                PlayMode::Pause => {
                    machine.transition(self.generation, PlayerStatus::Paused);
                }
                PlayMode::End | PlayMode::Stop => {
                    machine.transition(self.generation, PlayerStatus::Idle);
                }
                PlayMode::Errored(e) => {
                    machine.error(self.generation, format!("{e:?}"));
                    machine.transition(self.generation, PlayerStatus::Idle);
                }
                _ => {}
            }
        }
        // keep listening; repeated events are ignored by the machine
        None
    }
}
