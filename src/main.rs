use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{driver::SongbirdDriver, player::Player, store::SessionStore};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::{RetryPolicy, SourceManager, SpotifyClient, YtDlpClient};
use crate::ui::surface::{HttpMessages, MessageSurface};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        return health_check().await;
    }

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let resolver = Arc::new(build_resolver(&config));

    let songbird = Songbird::serenity();
    let driver = Arc::new(SongbirdDriver::new(
        songbird.clone(),
        config.ffmpeg_path.clone(),
    ));
    let http = Arc::new(Http::new(&config.discord_token));
    let surfaces = Arc::new(MessageSurface::new(HttpMessages::new(http)));
    let store = SessionStore::new(config.default_eq, config.max_queue_size);

    let (player, completions) = Player::new(store, resolver, driver, surfaces);
    player.spawn_completion_loop(completions);

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = JukeboxBot::new(config.clone(), player, songbird.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Shutdown signal received, closing shards...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("❌ Could not listen for Ctrl+C: {}", e),
        }
    });

    info!("🚀 Connecting to Discord");
    if let Err(why) = client.start().await {
        error!("❌ Client stopped with an error: {:?}", why);
    }

    Ok(())
}

fn build_resolver(config: &Config) -> SourceManager {
    let ytdlp = YtDlpClient::new(
        config.ytdlp_path.clone(),
        config.socket_timeout_secs,
        config.resolve_retries,
    );
    let policy = RetryPolicy {
        attempts: config.resolve_retries,
        timeout: config.resolve_timeout,
        ..RetryPolicy::default()
    };

    let spotify = match config.spotify_credentials() {
        Some((id, secret)) => match SpotifyClient::new(id, secret, config.resolve_timeout) {
            Ok(client) => {
                info!("🎧 Spotify catalog enabled");
                Some(client)
            }
            Err(e) => {
                warn!("⚠️ Could not build Spotify client, catalog links disabled: {}", e);
                None
            }
        },
        None => {
            info!("Spotify credentials not set, catalog links disabled");
            None
        }
    };

    SourceManager::new(ytdlp, spotify, policy)
}

async fn health_check() -> Result<()> {
    let ytdlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
    let ffmpeg_path = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());

    let yt_dlp = async_process::Command::new(&ytdlp_path)
        .arg("--version")
        .output()
        .await?;
    let ffmpeg = async_process::Command::new(&ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Missing dependencies: yt-dlp or ffmpeg did not run");
    }
}
