use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use super::commands::{names, options};
use crate::{
    audio::Caller,
    bot::ParallaxBot,
    error::CommandError,
    ui::{buttons::MusicAction, embeds, notifier::ChannelSink},
};

/// Runs a slash command.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ParallaxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("command used outside a server"))?;

    info!(
        "📝 Command /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    let caller = Caller {
        guild_id,
        voice_channel: get_user_voice_channel(ctx, guild_id, command.user.id),
    };
    let control = &bot.control;

    let content = match command.data.name.as_str() {
        names::PLAY => return handle_play(ctx, &command, bot, caller).await,
        names::SKIP => {
            let count = integer_option(&command, options::COUNT)
                .map(|count| count.max(1) as usize);
            control.skip(&caller, count).map(skipped_text)
        }
        names::STOP => control.stop(&caller).map(|_| "Stopped all songs.".to_string()),
        names::PAUSE => control.pause(&caller).map(|_| "Paused.".to_string()),
        names::RESUME => control.resume(&caller).map(|_| "Unpaused.".to_string()),
        names::LEAVE => control
            .leave(&caller)
            .await
            .map(|_| "Disconnected from the channel.".to_string()),
        names::QUEUE => control.queue(&caller).map(|view| embeds::queue_content(&view)),
        _ => Ok("❌ Unknown command".to_string()),
    };

    let content = content.unwrap_or_else(|e| {
        debug!("🚫 /{} rejected in guild {}: {}", command.data.name, guild_id, e);
        e.user_message()
    });
    reply_ephemeral(ctx, &command, content).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ParallaxBot,
    caller: Caller,
) -> Result<()> {
    let Some(song) = string_option(command, options::SONG) else {
        return reply_ephemeral(ctx, command, "❌ Missing song".to_string()).await;
    };

    // resolution and joining can outlast the interaction deadline
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
        )
        .await?;

    let sink = ChannelSink::new(
        ctx.http.clone(),
        ctx.cache.clone(),
        caller.guild_id,
        command.channel_id,
        bot.config.finished_message_ttl,
    );
    let content = match bot.control.play(&caller, &sink, &song).await {
        Ok(enqueued) => enqueued.message(),
        Err(e) => {
            warn!("❌ Guild {}: play `{}` failed: {}", caller.guild_id, song, e);
            e.user_message()
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

/// Handles a press on one of the player buttons.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &ParallaxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("component used outside a server"))?;

    let Some(action) = MusicAction::from_custom_id(&component.data.custom_id) else {
        debug!("Ignoring component {}", component.data.custom_id);
        return Ok(());
    };

    info!(
        "🔘 Button {:?} pressed by {} in guild {}",
        action, component.user.name, guild_id
    );

    let caller = Caller {
        guild_id,
        voice_channel: get_user_voice_channel(ctx, guild_id, component.user.id),
    };
    let control = &bot.control;

    let outcome = match action {
        MusicAction::Pause => control.pause(&caller).map(|_| None),
        MusicAction::Resume => control.resume(&caller).map(|_| None),
        MusicAction::Skip => control.skip(&caller, Some(1)).map(|_| None),
        MusicAction::Stop => control.stop(&caller).map(|_| None),
        MusicAction::Queue => control
            .queue(&caller)
            .map(|view| Some(embeds::queue_content(&view))),
    };

    let response = match component_reply(outcome) {
        Some(content) => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        ),
        None => CreateInteractionResponse::Acknowledge,
    };
    component.create_response(&ctx.http, response).await?;
    Ok(())
}

/// What a button press answers with; `None` acknowledges silently.
fn component_reply(outcome: Result<Option<String>, CommandError>) -> Option<String> {
    match outcome {
        Ok(content) => content,
        Err(CommandError::NotPlaying) => None,
        Err(e) => Some(e.user_message()),
    }
}

fn skipped_text(skipped: usize) -> String {
    let noun = if skipped > 1 { "songs" } else { "song" };
    format!("Skipped {skipped} {noun}.")
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| match &option.value {
            CommandDataOptionValue::String(value) => Some(value.trim().to_string()),
            _ => None,
        })
        .filter(|value| !value.is_empty())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

/// The user's voice channel, according to the cache.
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
