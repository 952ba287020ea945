use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
    prelude::Context,
};

/// Names of the registered slash commands.
pub mod names {
    pub const PLAY: &str = "play";
    pub const SKIP: &str = "skip";
    pub const STOP: &str = "stop";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const LEAVE: &str = "leave";
    pub const QUEUE: &str = "queue";
}

/// Option names.
pub mod options {
    pub const SONG: &str = "song";
    pub const COUNT: &str = "count";
}

/// Registers the commands globally.
///
/// Overwrites the whole set, so commands that no longer exist are dropped.
pub async fn register_global_commands(ctx: &Context) -> Result<usize> {
    let registered = Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(registered.len())
}

/// Registers the commands in one guild, which applies immediately.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<usize> {
    let registered = guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(registered.len())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        leave_command(),
        queue_command(),
    ]
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new(names::PLAY)
        .description("Plays a song or playlist, or adds it to the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                options::SONG,
                "Search phrase or a YouTube, SoundCloud or Spotify link",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new(names::SKIP)
        .description("Skips the current song")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                options::COUNT,
                "Number of songs to skip, the current one included",
            )
            .min_int_value(1),
        )
}

// Control

fn stop_command() -> CreateCommand {
    CreateCommand::new(names::STOP)
        .description("Stops playback and clears the queue")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new(names::PAUSE)
        .description("Pauses the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new(names::RESUME)
        .description("Resumes a paused song")
}

// Connection

fn leave_command() -> CreateCommand {
    CreateCommand::new(names::LEAVE)
        .description("Disconnects from the voice channel")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new(names::QUEUE)
        .description("Shows what is playing and what comes next")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn to_json(command: CreateCommand) -> Value {
        serde_json::to_value(command).unwrap()
    }

    #[test]
    fn test_command_names() {
        let registered: Vec<String> = all_commands()
            .into_iter()
            .map(|command| to_json(command)["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            registered,
            vec!["play", "skip", "stop", "pause", "resume", "leave", "queue"]
        );
    }

    #[test]
    fn test_play_requires_song() {
        let play = to_json(play_command());
        assert_eq!(play["options"][0]["name"], options::SONG);
        assert_eq!(play["options"][0]["required"], true);
    }

    #[test]
    fn test_skip_count_is_optional_and_positive() {
        let skip = to_json(skip_command());
        assert_eq!(skip["options"][0]["name"], options::COUNT);
        assert_eq!(skip["options"][0]["min_value"], 1);
        assert_ne!(skip["options"][0]["required"], true);
    }
}
