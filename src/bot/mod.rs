//! # Bot Module
//!
//! Discord event handling for Parallax Music.
//!
//! [`ParallaxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands once the gateway is ready and routes command and button
//! interactions to [`handlers`], which drive the shared [`MusicControl`].
//! Voice connections themselves are owned by songbird and surfaced through
//! the per-guild sessions.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use songbird::input::Input;
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod handlers;

use crate::{audio::MusicControl, config::Config};

/// Main Discord event handler.
pub struct ParallaxBot {
    /// Configuration loaded at start-up
    pub config: Arc<Config>,
    /// Command surface over the guild sessions
    pub control: Arc<MusicControl<Input>>,
}

impl ParallaxBot {
    pub fn new(config: Arc<Config>, control: Arc<MusicControl<Input>>) -> Self {
        Self { config, control }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands go to that guild only (instant
    /// updates while developing); otherwise they are registered globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registering commands for guild {}", guild_id);

                let count = commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "could not register guild commands; check the applications.commands scope"
                        )
                    })?;
                info!("✅ {} guild commands registered for {}", count, guild_id);
            }
            None => {
                info!("🌐 Registering commands globally");
                let count = commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!("could not register global commands")
                })?;
                info!("✅ {} global commands registered", count);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for ParallaxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error handling component: {:?}", e);
                }
            }
            _ => {}
        }
    }
}
