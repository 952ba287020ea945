//! Posts track notices to the text channel a track was requested from.
//!
//! Session code calls [`TrackEvents`] synchronously, so each track gets a
//! small worker task that performs the Discord calls in order. Delivery is
//! best effort: failures are logged and dropped.

use std::{sync::Arc, time::Duration};

use serenity::{
    builder::{CreateMessage, EditMessage},
    cache::Cache,
    http::Http,
    model::{
        channel::Message,
        id::{ChannelId, GuildId},
    },
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    buttons::create_player_buttons,
    embeds::{self, VoiceChannelInfo},
};
use crate::audio::track::{NotificationSink, TrackEvents, TrackInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Notice {
    Started {
        track: TrackInfo,
        up_next: Option<String>,
    },
    Finished {
        track: TrackInfo,
    },
    Failed {
        track: TrackInfo,
        error: String,
    },
}

/// Notices for every track queued from one text channel.
pub struct ChannelSink {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild_id: GuildId,
    channel_id: ChannelId,
    finished_ttl: Duration,
}

impl ChannelSink {
    pub fn new(
        http: Arc<Http>,
        cache: Arc<Cache>,
        guild_id: GuildId,
        channel_id: ChannelId,
        finished_ttl: Duration,
    ) -> Self {
        Self {
            http,
            cache,
            guild_id,
            channel_id,
            finished_ttl,
        }
    }
}

impl NotificationSink for ChannelSink {
    fn track_events(&self) -> Arc<dyn TrackEvents> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = NoticeWorker {
            http: self.http.clone(),
            cache: self.cache.clone(),
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            finished_ttl: self.finished_ttl,
        };
        tokio::spawn(worker.run(rx));
        Arc::new(TrackNotifier { tx })
    }
}

/// Forwards a single track's notices to its worker.
struct TrackNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl TrackNotifier {
    fn send(&self, notice: Notice) {
        // the worker only stops after a terminal notice
        let _ = self.tx.send(notice);
    }
}

impl TrackEvents for TrackNotifier {
    fn started(&self, track: &TrackInfo, up_next: Option<&str>) {
        self.send(Notice::Started {
            track: track.clone(),
            up_next: up_next.map(str::to_string),
        });
    }

    fn finished(&self, track: &TrackInfo) {
        self.send(Notice::Finished {
            track: track.clone(),
        });
    }

    fn failed(&self, track: &TrackInfo, error: &str) {
        self.send(Notice::Failed {
            track: track.clone(),
            error: error.to_string(),
        });
    }
}

struct Posted {
    message: Message,
    up_next: Option<String>,
    channel: VoiceChannelInfo,
}

struct NoticeWorker {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild_id: GuildId,
    channel_id: ChannelId,
    finished_ttl: Duration,
}

impl NoticeWorker {
    async fn run(self, mut notices: mpsc::UnboundedReceiver<Notice>) {
        let mut posted: Option<Posted> = None;

        while let Some(notice) = notices.recv().await {
            match notice {
                Notice::Started { track, up_next } => {
                    posted = self.post_now_playing(&track, up_next).await;
                }
                Notice::Finished { track } => {
                    if let Some(posted) = posted.take() {
                        self.retire(posted, &track).await;
                    }
                    return;
                }
                Notice::Failed { track, error } => {
                    warn!(
                        "❌ Guild {}: `{}` failed: {}",
                        self.guild_id, track.query, error
                    );
                    if let Some(posted) = posted.take() {
                        self.delete(&posted.message).await;
                    }
                    return;
                }
            }
        }
    }

    async fn post_now_playing(&self, track: &TrackInfo, up_next: Option<String>) -> Option<Posted> {
        let channel = voice_channel_info(&self.cache, self.guild_id);
        let message = CreateMessage::new()
            .embed(embeds::now_playing(track, up_next.as_deref(), &channel))
            .components(create_player_buttons());

        match self.channel_id.send_message(&self.http, message).await {
            Ok(message) => Some(Posted {
                message,
                up_next,
                channel,
            }),
            Err(e) => {
                warn!(
                    "⚠️ Guild {}: could not post now playing: {:?}",
                    self.guild_id, e
                );
                None
            }
        }
    }

    /// Turns the card into "Previously Played" and removes it later.
    async fn retire(&self, mut posted: Posted, track: &TrackInfo) {
        let embed = embeds::previously_played(track, posted.up_next.as_deref(), &posted.channel);
        let edit = EditMessage::new().embed(embed).components(Vec::new());
        if let Err(e) = posted.message.edit(&self.http, edit).await {
            warn!(
                "⚠️ Guild {}: could not edit finished message: {:?}",
                self.guild_id, e
            );
        }

        tokio::time::sleep(self.finished_ttl).await;
        self.delete(&posted.message).await;
    }

    async fn delete(&self, message: &Message) {
        if let Err(e) = message.delete(&self.http).await {
            debug!("Guild {}: message already gone: {:?}", self.guild_id, e);
        }
    }
}

/// Snapshot of the bot's current voice channel from the cache.
fn voice_channel_info(cache: &Cache, guild_id: GuildId) -> VoiceChannelInfo {
    let bot_id = cache.current_user().id;
    let Some(guild) = cache.guild(guild_id) else {
        return VoiceChannelInfo::default();
    };
    let channel = guild
        .voice_states
        .get(&bot_id)
        .and_then(|state| state.channel_id)
        .and_then(|channel_id| guild.channels.get(&channel_id));

    match channel {
        Some(channel) => VoiceChannelInfo {
            name: Some(channel.name.clone()),
            region: channel.rtc_region.clone(),
            bitrate: channel.bitrate,
        },
        None => VoiceChannelInfo::default(),
    }
}
