use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use parallax_music::{
    audio::{driver::SongbirdGateway, MusicControl, SessionRegistry},
    bot::ParallaxBot,
    config::Config,
    sources::{
        soundcloud::SoundCloudClient, spotify::SpotifyClient, youtube::YouTubeClient,
        ProviderCatalog, TrackResolver,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parallax_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Parallax Music v{}", env!("CARGO_PKG_VERSION"));

    // Configuration
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Providers
    let http = reqwest::Client::builder()
        .user_agent(concat!("parallax-music/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let youtube = YouTubeClient::new(
        config.ytdlp_path.clone(),
        config.ytdlp_format.clone(),
        config.ytdlp_rate_limit.clone(),
    );
    let soundcloud = config
        .soundcloud_client_id
        .as_ref()
        .map(|client_id| SoundCloudClient::new(http.clone(), client_id.clone()));
    let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
        (Some(id), Some(secret)) => Some(SpotifyClient::new(http.clone(), id.clone(), secret.clone())),
        _ => None,
    };

    let resolver = Arc::new(TrackResolver::new(
        http.clone(),
        youtube.clone(),
        soundcloud.clone(),
    ));
    let catalog = Arc::new(ProviderCatalog::new(
        http,
        youtube,
        soundcloud,
        spotify,
        config.max_playlist_size,
    ));

    // Voice and sessions
    let manager = Songbird::serenity();
    let registry = Arc::new(SessionRegistry::new());
    let control = Arc::new(MusicControl::new(
        registry.clone(),
        Arc::new(SongbirdGateway::new(manager.clone())),
        resolver,
        catalog,
        config.recovery_policy(),
    ));

    // Only the intents voice needs
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = ParallaxBot::new(config.clone(), control);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Graceful shutdown on Ctrl-C
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing {} sessions...", registry.len());
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("could not run {}", config.ytdlp_path))?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("{} --version failed", config.ytdlp_path);
    }
}
