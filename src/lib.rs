//! Parallax Music: a multi-tenant Discord music bot.
//!
//! Each guild gets its own [`audio::Session`] with a queue, a voice
//! connection and a player; [`audio::MusicControl`] is the command surface
//! shared by slash commands and the player buttons.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
