use serenity::builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter};

use crate::audio::{control::QueueView, track::TrackInfo};

/// Embed colors used across the bot.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const WARNING_YELLOW: Colour = Colour::from_rgb(255, 193, 7);
}

pub const NOW_PLAYING_AUTHOR: &str = "Parallax Music Player: Now Playing";
pub const PREVIOUSLY_PLAYED_AUTHOR: &str = "Parallax Music Player: Previously Played";

/// What the footer says about the voice channel, captured when the track
/// starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceChannelInfo {
    pub name: Option<String>,
    pub region: Option<String>,
    /// Bits per second.
    pub bitrate: Option<u32>,
}

impl VoiceChannelInfo {
    pub fn footer_text(&self) -> String {
        format!(
            "Channel: {}  |  Region: {}  |  Bitrate: {}",
            self.name.as_deref().unwrap_or("Unknown"),
            self.region
                .as_deref()
                .map(title_case)
                .unwrap_or_else(|| "Automatic".to_string()),
            self.bitrate
                .map(|bps| format!("{}kbps", bps / 1000))
                .unwrap_or_else(|| "Unknown".to_string()),
        )
    }
}

fn title_case(region: &str) -> String {
    region
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The "Now Playing" embed for a track.
pub fn now_playing(track: &TrackInfo, up_next: Option<&str>, channel: &VoiceChannelInfo) -> CreateEmbed {
    track_embed(track, up_next, channel, NOW_PLAYING_AUTHOR, colors::SUCCESS_GREEN)
}

/// Same card once the track is over.
pub fn previously_played(
    track: &TrackInfo,
    up_next: Option<&str>,
    channel: &VoiceChannelInfo,
) -> CreateEmbed {
    track_embed(
        track,
        up_next,
        channel,
        PREVIOUSLY_PLAYED_AUTHOR,
        colors::WARNING_YELLOW,
    )
}

fn track_embed(
    track: &TrackInfo,
    up_next: Option<&str>,
    channel: &VoiceChannelInfo,
    author: &str,
    colour: serenity::all::Colour,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .author(CreateEmbedAuthor::new(author))
        .title(track.display_title())
        .description(up_next_line(up_next))
        .footer(CreateEmbedFooter::new(channel.footer_text()))
        .color(colour);

    if let Some(artwork) = &track.artwork {
        embed = embed.thumbnail(artwork);
    }

    embed
}

fn up_next_line(up_next: Option<&str>) -> String {
    up_next
        .map(|title| format!("Up Next: {title}"))
        .unwrap_or_default()
}

/// Queue text: the current track and the first waiting titles.
pub fn queue_content(view: &QueueView) -> String {
    let current = match &view.now_playing {
        Some(track) => format!("**Now Playing:**\n{}", track.display_title()),
        None => "Nothing is currently playing!".to_string(),
    };

    let upcoming = view
        .upcoming
        .iter()
        .enumerate()
        .map(|(index, track)| format!("{}) {}", index + 1, track.display_title()))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{current}\n\n**On Queue: {}**\n{upcoming}", view.total)
}
