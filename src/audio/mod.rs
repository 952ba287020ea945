//! # Audio Module
//!
//! Per-guild playback sessions and the voice plumbing underneath them.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - Owns the queue, the voice connection and the player of one guild
//! - Serializes queue processing through a [`latch`]
//! - Recovers from voice disconnects or tears the session down
//!
//! ### [`connection`] / [`player`] - State Machines
//! - Transition tables for voice connection and player status
//! - Transports implement [`connection::VoiceConnection`] and
//!   [`player::AudioPlayer`]
//!
//! ### [`registry`] - Session Registry
//! - At most one live session per guild
//!
//! ### [`control`] - Command Surface
//! - `play`, `skip`, `stop`, `pause`, `resume`, `leave` and `queue` with
//!   the caller checks shared by slash commands and buttons
//!
//! ### [`driver`] - Songbird
//! - Production transports on top of songbird calls and track handles

pub mod connection;
pub mod control;
pub mod driver;
pub mod latch;
pub mod player;
pub mod registry;
pub mod session;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{Caller, Enqueued, MusicControl, QueueView, VoiceGateway};
pub use registry::SessionRegistry;
pub use session::Session;
