//! In-memory stand-ins for the voice transport, the player and the
//! resolver. Streams are plain strings.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::ChannelId;
use tokio::sync::{mpsc, watch};

use super::{
    connection::{ConnectionCell, ConnectionState, VoiceConnection},
    player::{
        AudioPlayer, AudioResource, PlayerEvent, PlayerEvents, PlayerMachine, PlayerStatus,
    },
    track::{NotificationSink, Track, TrackEvents, TrackInfo},
};
use crate::{
    error::{PlayerError, ResolutionError},
    sources::{Resolve, Resolved},
};

/// Lets spawned tasks run; with a paused clock this also advances time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Records every notice as `start:q:next`, `finish:q` or `error:q:msg`.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
    titles: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn sink(&self) -> Arc<dyn TrackEvents> {
        Arc::new(self.clone())
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Display titles of started tracks.
    pub fn titles(&self) -> Vec<String> {
        self.titles.lock().clone()
    }
}

impl TrackEvents for EventLog {
    fn started(&self, track: &TrackInfo, up_next: Option<&str>) {
        self.titles.lock().push(track.display_title().to_string());
        self.entries
            .lock()
            .push(format!("start:{}:{}", track.query, up_next.unwrap_or("-")));
    }

    fn finished(&self, track: &TrackInfo) {
        self.entries.lock().push(format!("finish:{}", track.query));
    }

    fn failed(&self, track: &TrackInfo, error: &str) {
        self.entries
            .lock()
            .push(format!("error:{}:{}", track.query, error));
    }
}

impl NotificationSink for EventLog {
    fn track_events(&self) -> Arc<dyn TrackEvents> {
        self.sink()
    }
}

pub struct FakeConnection {
    cell: ConnectionCell,
    channel: Mutex<ChannelId>,
    attempts: AtomicU32,
    rejoins: AtomicUsize,
    destroys: AtomicUsize,
}

impl FakeConnection {
    /// A connection still signalling.
    pub fn new(channel: ChannelId) -> Arc<Self> {
        Arc::new(Self {
            cell: ConnectionCell::new(),
            channel: Mutex::new(channel),
            attempts: AtomicU32::new(0),
            rejoins: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
        })
    }

    pub fn ready(channel: ChannelId) -> Arc<Self> {
        let connection = Self::new(channel);
        connection.set(ConnectionState::Connecting);
        connection.set(ConnectionState::Ready);
        connection
    }

    /// Drives the transport. Reaching `Ready` restores the rejoin budget,
    /// as the songbird connection does.
    pub fn set(&self, state: ConnectionState) {
        self.cell
            .transition(state)
            .expect("test drove an invalid connection transition");
        if state.is_ready() {
            self.attempts.store(0, Ordering::SeqCst);
        }
    }

    pub fn rejoin_calls(&self) -> usize {
        self.rejoins.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
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
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.rejoins.fetch_add(1, Ordering::SeqCst);
        self.cell.transition(ConnectionState::Signalling).is_ok()
    }

    async fn destroy(&self) {
        if self.cell.transition(ConnectionState::Destroyed).is_ok() {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Starts playing as soon as it is asked to; tests end tracks by hand.
pub struct FakePlayer {
    machine: PlayerMachine,
    played: Mutex<Vec<String>>,
    refused: Mutex<bool>,
}

impl FakePlayer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_events(tx), rx)
    }

    pub fn with_events(events: PlayerEvents) -> Arc<Self> {
        Arc::new(Self {
            machine: PlayerMachine::new(events),
            played: Mutex::new(Vec::new()),
            refused: Mutex::new(false),
        })
    }

    /// The current track reaches its end.
    pub fn finish(&self) {
        self.machine
            .transition(self.machine.generation(), PlayerStatus::Idle);
    }

    /// The current track dies mid-stream.
    pub fn fail(&self, message: &str) {
        let generation = self.machine.generation();
        self.machine.error(generation, message);
        self.machine.transition(generation, PlayerStatus::Idle);
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    /// Whether `play` was ever called while busy.
    pub fn refused_play(&self) -> bool {
        *self.refused.lock()
    }

    pub fn status(&self) -> PlayerStatus {
        self.machine.status()
    }
}

#[async_trait]
impl AudioPlayer<String> for FakePlayer {
    fn status(&self) -> PlayerStatus {
        self.machine.status()
    }

    fn now_playing(&self) -> Option<Arc<Track>> {
        self.machine.current()
    }

    async fn play(&self, resource: AudioResource<String>) -> Result<(), PlayerError> {
        let generation = match self.machine.begin(resource.track) {
            Ok(generation) => generation,
            Err(e) => {
                *self.refused.lock() = true;
                return Err(e);
            }
        };
        self.played.lock().push(resource.stream);
        self.machine.transition(generation, PlayerStatus::Playing);
        Ok(())
    }

    fn pause(&self) -> bool {
        self.machine
            .transition(self.machine.generation(), PlayerStatus::Paused)
    }

    fn unpause(&self) -> bool {
        self.machine.status() == PlayerStatus::Paused
            && self
                .machine
                .transition(self.machine.generation(), PlayerStatus::Playing)
    }

    fn stop(&self, _force: bool) -> bool {
        self.machine
            .transition(self.machine.generation(), PlayerStatus::Idle)
    }
}

/// Resolves every query to itself unless told to fail it.
#[derive(Default)]
pub struct FakeResolver {
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn fail(&self, query: &str) {
        self.failing.lock().insert(query.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Resolve<String> for FakeResolver {
    async fn resolve(&self, track: &TrackInfo) -> Result<Resolved<String>, ResolutionError> {
        self.calls.lock().push(track.query.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&track.query) {
            return Err(ResolutionError::not_found(format!(
                "no match for {}",
                track.query
            )));
        }
        Ok(Resolved {
            stream: track.query.clone(),
            title: Some(format!("title of {}", track.query)),
            artwork: None,
        })
    }
}
