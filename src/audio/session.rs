//! # Session
//!
//! One guild's playback: a voice connection, a player and a FIFO queue.
//!
//! Two background tasks keep it moving:
//!
//! - the **connection watcher** reacts to [`ConnectionState`] transitions
//!   (reconnect windows, rejoin backoff, readiness watchdog, teardown);
//! - the **player loop** reacts to [`PlayerEvent`]s (track notices and
//!   queue advancement).
//!
//! Both hold only a [`Weak`] reference, so dropping the last [`Arc`] ends
//! them.
//!
//! ## Invariants
//!
//! - At most one track is resolved and handed to the player at a time;
//!   the `advancing` latch is held for the whole resolve-and-play step.
//! - The player is only asked to play while idle.
//! - Once the connection is destroyed the queue is flushed and advancement
//!   is closed for good.

use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use super::{
    connection::{enters_state, ConnectionState, Recovery, RecoveryPolicy, VoiceConnection},
    latch::Latch,
    player::{AudioPlayer, AudioResource, PlayerEvent, PlayerStatus},
    track::{Track, TrackEvents, TrackInfo},
};
use crate::{
    error::{ConnectionTimeout, SessionClosed},
    sources::Resolve,
};

/// How much of the session `stop` tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// Drop the next `n - 1` queued tracks silently, then end the current one.
    Skip(usize),
    /// Clear the queue and end the current track.
    All,
    /// Like `All`, and close the queue permanently.
    Force,
}

pub struct Session<S> {
    guild_id: GuildId,
    connection: Arc<dyn VoiceConnection>,
    player: Arc<dyn AudioPlayer<S>>,
    resolver: Arc<dyn Resolve<S>>,
    policy: RecoveryPolicy,
    queue: Mutex<VecDeque<Arc<Track>>>,
    advancing: Latch,
    awaiting_ready: Latch,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// In-flight reactions to connection states (backoffs, watchdogs).
    reactions: Mutex<JoinSet<()>>,
}

impl<S: Send + 'static> Session<S> {
    /// Builds the session and spawns its watcher tasks.
    ///
    /// `player_events` must be the receiving end of the channel `player`
    /// emits on.
    pub fn start(
        guild_id: GuildId,
        connection: Arc<dyn VoiceConnection>,
        player: Arc<dyn AudioPlayer<S>>,
        player_events: mpsc::UnboundedReceiver<PlayerEvent>,
        resolver: Arc<dyn Resolve<S>>,
        policy: RecoveryPolicy,
    ) -> Arc<Self> {
        let states = connection.subscribe();
        let session = Arc::new(Self {
            guild_id,
            connection,
            player,
            resolver,
            policy,
            queue: Mutex::new(VecDeque::new()),
            advancing: Latch::new(),
            awaiting_ready: Latch::new(),
            tasks: Mutex::new(Vec::new()),
            reactions: Mutex::new(JoinSet::new()),
        });

        let weak = Arc::downgrade(&session);
        let watcher = tokio::spawn(Self::watch_connection(weak.clone(), states));
        let player_loop = tokio::spawn(Self::watch_player(weak, player_events));
        session.tasks.lock().extend([watcher, player_loop]);

        info!("🎶 Session opened in guild {}", guild_id);
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.connection.channel_id()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn player_status(&self) -> PlayerStatus {
        self.player.status()
    }

    pub fn now_playing(&self) -> Option<TrackInfo> {
        self.player.now_playing().map(|track| track.info())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn queued(&self) -> Vec<TrackInfo> {
        self.queue.lock().iter().map(|track| track.info()).collect()
    }

    /// True when nothing is playing and nothing is waiting.
    pub fn is_idle(&self) -> bool {
        self.player.status().is_idle() && self.queue.lock().is_empty()
    }

    /// True once the queue was force-closed or the connection destroyed.
    pub fn is_closed(&self) -> bool {
        self.advancing.is_closed() || self.connection.state().is_destroyed()
    }

    pub fn is_advancing(&self) -> bool {
        self.advancing.is_held()
    }

    /// Waits for the connection to be ready.
    pub async fn wait_ready(&self) -> Result<(), ConnectionTimeout> {
        let state = enters_state(
            self.connection.subscribe(),
            self.policy.ready_timeout,
            |state| state.is_ready() || state.is_destroyed(),
        )
        .await?;
        if state.is_destroyed() {
            return Err(ConnectionTimeout::Closed);
        }
        Ok(())
    }

    /// Appends a track and kicks queue advancement. A closed session
    /// takes no new entries.
    pub fn enqueue(
        self: &Arc<Self>,
        events: Arc<dyn TrackEvents>,
        query: impl Into<String>,
        title: Option<String>,
        artwork: Option<String>,
    ) -> Result<Arc<Track>, SessionClosed> {
        let track = Track::new(query, title, artwork, events);
        let waiting = {
            let mut queue = self.queue.lock();
            // checked under the queue lock: a force stop closes first, then drains
            if self.is_closed() {
                debug!(
                    "🛑 Guild {}: refusing `{}`, session closed",
                    self.guild_id,
                    track.query()
                );
                return Err(SessionClosed);
            }
            queue.push_back(track.clone());
            queue.len()
        };
        debug!(
            "➕ Queued `{}` in guild {} ({} waiting)",
            track.query(),
            self.guild_id,
            waiting
        );
        self.spawn_advance();
        Ok(track)
    }

    /// Plays the next queued track if the player is idle and nobody else is
    /// already advancing. Entries that fail to resolve get their error
    /// notice and are skipped.
    pub async fn process_queue(&self) {
        loop {
            {
                let Some(_guard) = self.advancing.try_acquire() else {
                    return;
                };
                self.advance_once().await;
            }
            // something may have been queued while the guard was held
            if self.advancing.is_closed()
                || !self.player.status().is_idle()
                || self.queue.lock().is_empty()
            {
                return;
            }
        }
    }

    async fn advance_once(&self) {
        let budget = self.queue_len();
        for _ in 0..budget {
            if !self.player.status().is_idle() {
                return;
            }
            let Some(track) = self.queue.lock().pop_front() else {
                return;
            };

            match self.resolver.resolve(&track.info()).await {
                Ok(resolved) => {
                    track.fill_metadata(resolved.title, resolved.artwork);
                    if self.advancing.is_closed() {
                        debug!("🛑 Session closed while resolving `{}`", track.query());
                        track.notify_error("session closed");
                        return;
                    }
                    let resource = AudioResource {
                        stream: resolved.stream,
                        track: track.clone(),
                    };
                    match self.player.play(resource).await {
                        Ok(()) => {
                            info!(
                                "▶️ Playing `{}` in guild {}",
                                track.info().display_title(),
                                self.guild_id
                            );
                            return;
                        }
                        Err(e) => {
                            warn!("❌ Player refused `{}`: {}", track.query(), e);
                            track.notify_error(&e.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "❌ Could not resolve `{}` in guild {}: {}",
                        track.query(),
                        self.guild_id,
                        e
                    );
                    track.notify_error(&e.to_string());
                }
            }
        }
    }

    /// Returns the number of tracks skipped or dropped, counting the one
    /// that was playing.
    pub fn stop(&self, request: StopRequest) -> usize {
        if request == StopRequest::Force {
            self.advancing.close();
        }

        let playing = usize::from(!self.player.status().is_idle());
        let removed = {
            let mut queue = self.queue.lock();
            match request {
                StopRequest::Skip(count) => {
                    let skipped = count.max(1).saturating_sub(1).min(queue.len());
                    queue.drain(..skipped).count()
                }
                StopRequest::All | StopRequest::Force => queue.drain(..).count(),
            }
        };

        self.player.stop(request == StopRequest::Force);
        debug!(
            "⏹️ Stop {:?} in guild {}: {} removed, {} playing",
            request, self.guild_id, removed, playing
        );
        removed + playing
    }

    pub fn pause(&self) -> bool {
        self.player.pause()
    }

    pub fn resume(&self) -> bool {
        self.player.unpause()
    }

    /// Destroys the connection; the watcher then flushes the queue.
    pub async fn destroy(&self) {
        self.connection.destroy().await;
    }

    /// Silences a session that is being replaced without touching the
    /// connection it may share with its successor.
    pub fn retire(&self) {
        self.stop(StopRequest::Force);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        // a pending rejoin or watchdog would otherwise act on the shared call
        self.reactions.lock().abort_all();
        debug!("🗃️ Session retired in guild {}", self.guild_id);
    }

    fn spawn_advance(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.process_queue().await });
    }

    async fn watch_connection(session: Weak<Self>, mut states: watch::Receiver<ConnectionState>) {
        let mut state = *states.borrow_and_update();
        loop {
            let Some(this) = session.upgrade() else {
                return;
            };
            // each reaction may sleep for a while; keep observing meanwhile
            {
                let mut reactions = this.reactions.lock();
                while reactions.try_join_next().is_some() {}
                reactions.spawn(Arc::clone(&this).on_connection_state(state));
            }
            drop(this);
            if state.is_destroyed() {
                return;
            }

            if states.changed().await.is_err() {
                return;
            }
            state = *states.borrow_and_update();
        }
    }

    async fn on_connection_state(self: Arc<Self>, state: ConnectionState) {
        debug!("🔌 Guild {} connection is {:?}", self.guild_id, state);
        match state {
            ConnectionState::Disconnected(reason) => {
                let attempts = self.connection.rejoin_attempts();
                match self.policy.on_disconnect(reason, attempts) {
                    Recovery::AwaitReconnect(window) => {
                        let reconnected = enters_state(self.connection.subscribe(), window, |s| {
                            matches!(
                                s,
                                ConnectionState::Connecting
                                    | ConnectionState::Ready
                                    | ConnectionState::Destroyed
                            )
                        })
                        .await;
                        if reconnected.is_err() {
                            info!(
                                "👢 Guild {}: no reconnect after close 4014, treating as kick",
                                self.guild_id
                            );
                            self.connection.destroy().await;
                        }
                    }
                    Recovery::Rejoin { delay } => {
                        debug!(
                            "🔄 Guild {}: rejoin attempt {} in {:?}",
                            self.guild_id,
                            attempts + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        if matches!(self.connection.state(), ConnectionState::Disconnected(_))
                            && !self.connection.rejoin().await
                        {
                            warn!("⚠️ Guild {}: rejoin refused", self.guild_id);
                        }
                    }
                    Recovery::Destroy => {
                        warn!(
                            "💀 Guild {}: rejoin budget of {} spent, destroying",
                            self.guild_id, self.policy.max_rejoin_attempts
                        );
                        self.connection.destroy().await;
                    }
                }
            }
            ConnectionState::Destroyed => {
                let dropped = self.stop(StopRequest::Force);
                info!(
                    "👋 Session closed in guild {} ({} tracks dropped)",
                    self.guild_id, dropped
                );
            }
            ConnectionState::Signalling | ConnectionState::Connecting => {
                let Some(_guard) = self.awaiting_ready.try_acquire() else {
                    return;
                };
                let outcome = enters_state(
                    self.connection.subscribe(),
                    self.policy.ready_timeout,
                    |s| s.is_ready() || s.is_destroyed(),
                )
                .await;
                if outcome.is_err() && !self.connection.state().is_destroyed() {
                    warn!(
                        "⏱️ Guild {}: connection not ready after {:?}, destroying",
                        self.guild_id, self.policy.ready_timeout
                    );
                    self.connection.destroy().await;
                }
            }
            ConnectionState::Ready => {}
        }
    }

    async fn watch_player(session: Weak<Self>, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Some(event) = events.recv().await {
            let Some(this) = session.upgrade() else {
                return;
            };
            this.on_player_event(event);
        }
    }

    fn on_player_event(self: &Arc<Self>, event: PlayerEvent) {
        match event {
            PlayerEvent::StateChanged { old, new, track } if new.is_idle() && !old.is_idle() => {
                track.notify_finish();
                self.spawn_advance();
            }
            PlayerEvent::StateChanged {
                new: PlayerStatus::Playing,
                track,
                ..
            } => {
                let up_next = self.queue.lock().front().map(|next| next.info());
                track.notify_start(up_next.as_ref().map(TrackInfo::display_title));
            }
            PlayerEvent::StateChanged { .. } => {}
            PlayerEvent::Error { track, message } => {
                warn!(
                    "❌ Playback error in guild {} for `{}`: {}",
                    self.guild_id,
                    track.query(),
                    message
                );
                track.notify_error(&message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        connection::DisconnectReason,
        testing::{settle, EventLog, FakeConnection, FakePlayer, FakeResolver},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Harness {
        session: Arc<Session<String>>,
        connection: Arc<FakeConnection>,
        player: Arc<FakePlayer>,
        resolver: Arc<FakeResolver>,
        log: EventLog,
    }

    fn harness() -> Harness {
        harness_with(RecoveryPolicy::default())
    }

    fn harness_with(policy: RecoveryPolicy) -> Harness {
        let connection = FakeConnection::ready(ChannelId::new(10));
        let (player, events) = FakePlayer::new();
        let resolver = Arc::new(FakeResolver::default());
        let session = Session::start(
            GuildId::new(1),
            connection.clone(),
            player.clone(),
            events,
            resolver.clone(),
            policy,
        );
        Harness {
            session,
            connection,
            player,
            resolver,
            log: EventLog::default(),
        }
    }

    impl Harness {
        fn enqueue(&self, query: &str) -> Arc<Track> {
            self.session
                .enqueue(self.log.sink(), query, None, None)
                .unwrap()
        }

        fn try_enqueue(&self, query: &str) -> Result<Arc<Track>, SessionClosed> {
            self.session.enqueue(self.log.sink(), query, None, None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_track_resolves_once_and_plays() {
        let h = harness();
        h.enqueue("https://www.youtube.com/watch?v=abc");
        settle().await;

        assert_eq!(h.resolver.calls(), vec!["https://www.youtube.com/watch?v=abc"]);
        assert_eq!(h.player.status(), PlayerStatus::Playing);
        assert_eq!(
            h.log.entries(),
            vec!["start:https://www.youtube.com/watch?v=abc:-"]
        );
        assert_eq!(
            h.log.titles(),
            vec!["title of https://www.youtube.com/watch?v=abc"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_fifo_order() {
        let h = harness();
        h.resolver.fail("b");
        h.resolver.fail("d");
        for query in ["a", "b", "c", "d", "e"] {
            h.enqueue(query);
        }
        settle().await;
        h.player.finish();
        settle().await;
        h.player.finish();
        settle().await;

        assert_eq!(
            h.log.entries(),
            vec![
                "start:a:b",
                "finish:a",
                "error:b:not found: no match for b",
                "start:c:d",
                "finish:c",
                "error:d:not found: no match for d",
                "start:e:-",
            ]
        );
        assert_eq!(h.player.played(), vec!["a", "c", "e"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_resource_in_flight() {
        let h = harness();
        h.resolver.set_delay(Duration::from_millis(50));
        for query in ["a", "b", "c"] {
            h.enqueue(query);
            tokio::spawn({
                let session = h.session.clone();
                async move { session.process_queue().await }
            });
        }
        settle().await;

        assert_eq!(h.player.played(), vec!["a"]);
        assert_eq!(h.resolver.calls(), vec!["a"]);
        assert!(!h.player.refused_play());
        assert_eq!(h.session.queue_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_released_after_every_failure() {
        let h = harness();
        h.resolver.fail("x");
        h.resolver.fail("y");
        h.enqueue("x");
        h.enqueue("y");
        settle().await;

        assert!(!h.session.is_advancing());
        assert_eq!(h.session.queue_len(), 0);
        assert_eq!(h.player.status(), PlayerStatus::Idle);

        h.enqueue("z");
        settle().await;
        assert_eq!(h.player.played(), vec!["z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_three_drops_two_and_stops_current() {
        let h = harness();
        for query in ["a", "b", "c", "d"] {
            h.enqueue(query);
        }
        settle().await;

        assert_eq!(h.session.stop(StopRequest::Skip(3)), 3);
        settle().await;

        assert_eq!(
            h.log.entries(),
            vec!["start:a:b", "finish:a", "start:d:-"]
        );
        assert_eq!(h.resolver.calls(), vec!["a", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_on_idle_empty_session_is_zero() {
        let h = harness();
        assert_eq!(h.session.stop(StopRequest::Skip(1)), 0);
        assert!(h.log.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_clears_queue_but_stays_open() {
        let h = harness();
        for query in ["a", "b", "c"] {
            h.enqueue(query);
        }
        settle().await;

        assert_eq!(h.session.stop(StopRequest::All), 3);
        settle().await;
        assert_eq!(h.session.queue_len(), 0);
        assert_eq!(h.log.entries(), vec!["start:a:b", "finish:a"]);

        h.enqueue("d");
        settle().await;
        assert_eq!(h.player.played(), vec!["a", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_stop_closes_queue() {
        let h = harness();
        h.enqueue("a");
        settle().await;

        h.session.stop(StopRequest::Force);
        assert_eq!(h.try_enqueue("b").err(), Some(SessionClosed));
        settle().await;

        assert!(h.session.is_closed());
        assert_eq!(h.session.queue_len(), 0);
        assert_eq!(h.player.played(), vec!["a"]);
        assert_eq!(h.log.entries(), vec!["start:a:-", "finish:a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_connection_flushes_everything() {
        let h = harness();
        for query in ["a", "b", "c"] {
            h.enqueue(query);
        }
        settle().await;

        h.connection.set(ConnectionState::Destroyed);
        settle().await;

        assert_eq!(h.session.queue_len(), 0);
        assert_eq!(h.player.status(), PlayerStatus::Idle);
        assert!(h.session.is_closed());
        assert_eq!(h.player.played(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_code_recovers_when_connecting_follows() {
        let h = harness();
        h.connection
            .set(ConnectionState::Disconnected(DisconnectReason::WebSocketClose(Some(4014))));
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.connection.set(ConnectionState::Connecting);
        h.connection.set(ConnectionState::Ready);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.connection.destroy_calls(), 0);
        assert_eq!(h.connection.state(), ConnectionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_code_destroys_after_silence() {
        let h = harness();
        h.connection
            .set(ConnectionState::Disconnected(DisconnectReason::WebSocketClose(Some(4014))));
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(h.connection.destroy_calls(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.connection.destroy_calls(), 1);
        assert!(h.connection.state().is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_backoff_then_destroy() {
        // long enough that the readiness watchdog stays out of the way
        let h = harness_with(RecoveryPolicy {
            ready_timeout: Duration::from_secs(600),
            ..RecoveryPolicy::default()
        });
        h.connection
            .set(ConnectionState::Disconnected(DisconnectReason::Transport));

        for attempt in 0..5u32 {
            let delay = Duration::from_secs(5 * u64::from(attempt + 1));
            tokio::time::sleep(delay - Duration::from_millis(100)).await;
            assert_eq!(h.connection.rejoin_calls(), attempt as usize);

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(h.connection.rejoin_calls(), attempt as usize + 1);
            assert_eq!(h.connection.rejoin_attempts(), attempt + 1);

            // the rejoin gets as far as connecting and fails again
            h.connection.set(ConnectionState::Connecting);
            h.connection
                .set(ConnectionState::Disconnected(DisconnectReason::JoinFailed));
        }

        settle().await;
        assert_eq!(h.connection.rejoin_calls(), 5);
        assert!(h.connection.state().is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_restores_rejoin_budget() {
        let h = harness();
        h.connection
            .set(ConnectionState::Disconnected(DisconnectReason::Transport));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.connection.rejoin_attempts(), 1);

        h.connection.set(ConnectionState::Connecting);
        h.connection.set(ConnectionState::Ready);
        assert_eq!(h.connection.rejoin_attempts(), 0);

        // first-attempt delay again, not the second
        h.connection
            .set(ConnectionState::Disconnected(DisconnectReason::Transport));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.connection.rejoin_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_session_abandons_pending_rejoin() {
        let h = harness();
        h.connection
            .set(ConnectionState::Disconnected(DisconnectReason::Transport));
        settle().await;

        h.session.retire();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.connection.rejoin_calls(), 0);
        assert_eq!(h.connection.destroy_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_session_abandons_readiness_watchdog() {
        let connection = FakeConnection::new(ChannelId::new(10));
        let (player, events) = FakePlayer::new();
        let session = Session::<String>::start(
            GuildId::new(1),
            connection.clone(),
            player,
            events,
            Arc::new(FakeResolver::default()),
            RecoveryPolicy::default(),
        );
        connection.set(ConnectionState::Connecting);
        settle().await;

        session.retire();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connection.destroy_calls(), 0);
        assert_eq!(connection.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_session_refuses_entries() {
        let h = harness();
        h.connection.set(ConnectionState::Destroyed);
        settle().await;

        assert_eq!(h.try_enqueue("late").err(), Some(SessionClosed));
        settle().await;
        assert!(h.log.entries().is_empty());
        assert!(h.resolver.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_watchdog_destroys_stuck_connection() {
        let connection = FakeConnection::new(ChannelId::new(10));
        let (player, events) = FakePlayer::new();
        let _session = Session::<String>::start(
            GuildId::new(1),
            connection.clone(),
            player,
            events,
            Arc::new(FakeResolver::default()),
            RecoveryPolicy::default(),
        );
        connection.set(ConnectionState::Connecting);
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(connection.destroy_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connection.destroy_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_watchdog_stands_down_when_ready() {
        let connection = FakeConnection::new(ChannelId::new(10));
        let (player, events) = FakePlayer::new();
        let session = Session::<String>::start(
            GuildId::new(1),
            connection.clone(),
            player,
            events,
            Arc::new(FakeResolver::default()),
            RecoveryPolicy::default(),
        );
        connection.set(ConnectionState::Connecting);
        tokio::time::sleep(Duration::from_secs(5)).await;
        connection.set(ConnectionState::Ready);

        assert!(session.wait_ready().await.is_ok());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connection.destroy_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_error_notifies_once_and_advances() {
        let h = harness();
        h.enqueue("a");
        h.enqueue("b");
        settle().await;

        h.player.fail("decoder exploded");
        settle().await;

        assert_eq!(
            h.log.entries(),
            vec!["start:a:b", "error:a:decoder exploded", "start:b:-"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let h = harness();
        h.enqueue("a");
        settle().await;

        assert!(h.session.pause());
        settle().await;
        assert_eq!(h.player.status(), PlayerStatus::Paused);
        assert!(h.session.resume());
        settle().await;
        assert_eq!(h.player.status(), PlayerStatus::Playing);
        assert_eq!(h.log.entries(), vec!["start:a:-"]);
    }
}
