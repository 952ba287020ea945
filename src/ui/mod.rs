//! Discord-facing presentation: embeds, player buttons and the per-channel
//! track notifier.

pub mod buttons;
pub mod embeds;
pub mod notifier;
