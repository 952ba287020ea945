//! # Player State
//!
//! Status machine for a single-stream player and the event feed a session
//! listens to. [`PlayerMachine`] is the shared bookkeeping every
//! [`AudioPlayer`] backend drives.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::track::Track;
use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
}

impl PlayerStatus {
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn can_transition_to(self, next: PlayerStatus) -> bool {
        use PlayerStatus::*;

        match (self, next) {
            (Idle, Buffering) => true,
            (Buffering, Playing | Idle) => true,
            (Playing, Paused | Idle) => true,
            (Paused, Playing | Idle) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// `track` is the resource the transition concerns: the new one when
    /// leaving `Idle`, the finished one when entering it.
    StateChanged {
        old: PlayerStatus,
        new: PlayerStatus,
        track: Arc<Track>,
    },
    Error {
        track: Arc<Track>,
        message: String,
    },
}

pub type PlayerEvents = mpsc::UnboundedSender<PlayerEvent>;

/// A materialized stream paired with the queue entry it came from.
pub struct AudioResource<S> {
    pub stream: S,
    pub track: Arc<Track>,
}

#[async_trait]
pub trait AudioPlayer<S>: Send + Sync {
    fn status(&self) -> PlayerStatus;

    /// The track currently buffering, playing or paused.
    fn now_playing(&self) -> Option<Arc<Track>>;

    /// Starts `resource`. Fails without side effects unless the player is idle.
    async fn play(&self, resource: AudioResource<S>) -> Result<(), PlayerError>;

    fn pause(&self) -> bool;

    fn unpause(&self) -> bool;

    /// Stops the current resource. With `force` the player reaches `Idle`
    /// immediately even while buffering.
    fn stop(&self, force: bool) -> bool;
}

struct MachineState {
    status: PlayerStatus,
    current: Option<Arc<Track>>,
    generation: u64,
}

/// Status bookkeeping shared by player backends.
///
/// Every accepted transition is emitted while the state lock is held, so
/// listeners observe transitions in order.
pub struct PlayerMachine {
    state: Mutex<MachineState>,
    events: PlayerEvents,
}

impl PlayerMachine {
    pub fn new(events: PlayerEvents) -> Self {
        Self {
            state: Mutex::new(MachineState {
                status: PlayerStatus::Idle,
                current: None,
                generation: 0,
            }),
            events,
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.lock().status
    }

    pub fn current(&self) -> Option<Arc<Track>> {
        self.state.lock().current.clone()
    }

    /// `Idle -> Buffering` for a new track. Returns its generation, which
    /// later backend callbacks use to ignore stale streams.
    pub fn begin(&self, track: Arc<Track>) -> Result<u64, PlayerError> {
        let mut state = self.state.lock();
        if !state.status.is_idle() {
            return Err(PlayerError::Busy);
        }
        state.generation += 1;
        state.status = PlayerStatus::Buffering;
        state.current = Some(track.clone());
        self.emit(PlayerEvent::StateChanged {
            old: PlayerStatus::Idle,
            new: PlayerStatus::Buffering,
            track,
        });
        Ok(state.generation)
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Moves the current track to `next`. Returns false if the table
    /// refuses or `generation` is stale.
    pub fn transition(&self, generation: u64, next: PlayerStatus) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || !state.status.can_transition_to(next) {
            debug!(
                "🎚️ Ignoring player transition {:?} -> {:?} (gen {} vs {})",
                state.status, next, generation, state.generation
            );
            return false;
        }
        let Some(track) = state.current.clone() else {
            return false;
        };
        let old = state.status;
        state.status = next;
        if next.is_idle() {
            state.current = None;
        }
        self.emit(PlayerEvent::StateChanged { old, new: next, track });
        true
    }

    /// Reports a playback failure of the current track.
    pub fn error(&self, generation: u64, message: impl Into<String>) -> bool {
        let state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let Some(track) = state.current.clone() else {
            return false;
        };
        self.emit(PlayerEvent::Error {
            track,
            message: message.into(),
        });
        true
    }

    fn emit(&self, event: PlayerEvent) {
        // the session may already be gone
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::EventLog;

    fn track(query: &str) -> Arc<Track> {
        Track::new(query, None, None, EventLog::default().sink())
    }

    #[test]
    fn test_begin_refuses_when_busy() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let machine = PlayerMachine::new(tx);
        assert!(machine.begin(track("a")).is_ok());
        assert_eq!(machine.begin(track("b")), Err(PlayerError::Busy));
        assert_eq!(machine.current().map(|t| t.query().to_string()), Some("a".into()));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let machine = PlayerMachine::new(tx);
        let first = machine.begin(track("a")).unwrap();
        assert!(machine.transition(first, PlayerStatus::Idle));
        let second = machine.begin(track("b")).unwrap();

        assert!(!machine.transition(first, PlayerStatus::Playing));
        assert!(machine.transition(second, PlayerStatus::Playing));
        assert_eq!(machine.status(), PlayerStatus::Playing);
    }

    #[test]
    fn test_events_follow_transitions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let machine = PlayerMachine::new(tx);
        let generation = machine.begin(track("a")).unwrap();
        machine.transition(generation, PlayerStatus::Playing);
        machine.transition(generation, PlayerStatus::Idle);

        let mut seen = Vec::new();
        while let Ok(PlayerEvent::StateChanged { old, new, .. }) = rx.try_recv() {
            seen.push((old, new));
        }
        assert_eq!(
            seen,
            vec![
                (PlayerStatus::Idle, PlayerStatus::Buffering),
                (PlayerStatus::Buffering, PlayerStatus::Playing),
                (PlayerStatus::Playing, PlayerStatus::Idle),
            ]
        );
        assert!(machine.current().is_none());
    }

    #[test]
    fn test_idle_cannot_pause() {
        assert!(!PlayerStatus::Idle.can_transition_to(PlayerStatus::Paused));
        assert!(PlayerStatus::Paused.can_transition_to(PlayerStatus::Playing));
    }
}
