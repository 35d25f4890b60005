use anyhow::{Context as _, Result};
use std::time::Duration;

use crate::audio::preset::EqPreset;

/// Ten 90-character queue lines still fit one 1024-character embed field.
pub const MAX_QUEUE_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // commands register here instead of globally

    // Catalog
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // External tools
    pub ytdlp_path: String,
    pub ffmpeg_path: String,

    // Resolution
    pub resolve_timeout: Duration,
    pub resolve_retries: u32,
    pub socket_timeout_secs: u64,

    // Queue and UI
    pub max_queue_size: usize,
    pub queue_page_size: usize,
    pub default_eq: EqPreset,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            guild_id: optional_var("GUILD_ID")
                .map(|id| id.parse::<u64>())
                .transpose()
                .context("GUILD_ID must be a numeric id")?,

            spotify_client_id: optional_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: optional_var("SPOTIFY_CLIENT_SECRET"),

            ytdlp_path: var_or("YTDLP_PATH", "yt-dlp"),
            ffmpeg_path: var_or("FFMPEG_PATH", "ffmpeg"),

            resolve_timeout: humantime::parse_duration(&var_or("RESOLVE_TIMEOUT", "45s"))
                .context("RESOLVE_TIMEOUT must be a duration such as 45s")?,
            resolve_retries: var_or("RESOLVE_RETRIES", "3").parse()?,
            socket_timeout_secs: var_or("SOCKET_TIMEOUT_SECS", "30").parse()?,

            max_queue_size: var_or("MAX_QUEUE_SIZE", "5000").parse()?,
            queue_page_size: var_or("QUEUE_PAGE_SIZE", "10").parse()?,
            default_eq: var_or("DEFAULT_EQ", "enhanced")
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_EQ is not a known preset"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would disable resolution or paging outright.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }
        if self.guild_id == Some(0) {
            anyhow::bail!("GUILD_ID must not be 0");
        }
        if self.resolve_retries == 0 {
            anyhow::bail!("Resolve retries must be greater than 0");
        }
        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }
        if self.socket_timeout_secs == 0 {
            anyhow::bail!("Socket timeout must be greater than 0");
        }
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }
        if self.queue_page_size == 0 || self.queue_page_size > MAX_QUEUE_PAGE_SIZE {
            anyhow::bail!(
                "Queue page size must be between 1 and {}",
                MAX_QUEUE_PAGE_SIZE
            );
        }
        Ok(())
    }

    pub fn spotify_credentials(&self) -> Option<(&str, &str)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Startup summary without the token or client secret.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Spotify: {}\n  \
            Tools: yt-dlp={}, ffmpeg={}\n  \
            Resolve: {} timeout, {} attempts, {}s socket timeout\n  \
            Queue: {} max, {} per page, default EQ {}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("in guild {}", id)),
            if self.spotify_credentials().is_some() {
                "enabled"
            } else {
                "disabled"
            },
            self.ytdlp_path,
            self.ffmpeg_path,
            humantime::format_duration(self.resolve_timeout),
            self.resolve_retries,
            self.socket_timeout_secs,
            self.max_queue_size,
            self.queue_page_size,
            self.default_eq.key(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            ytdlp_path: "yt-dlp".into(),
            ffmpeg_path: "ffmpeg".into(),
            resolve_timeout: Duration::from_secs(45),
            resolve_retries: 3,
            socket_timeout_secs: 30,
            max_queue_size: 5000,
            queue_page_size: 10,
            default_eq: EqPreset::Enhanced,
        }
    }
}
