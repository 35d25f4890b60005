//! # Bot Module
//!
//! Discord gateway glue: slash command registration, interaction dispatch and
//! voice-state tracking. All playback state lives in [`Player`]; this module
//! only translates Discord events into player calls.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::player::Player, config::Config};

/// Serenity event handler for the jukebox.
pub struct JukeboxBot {
    pub config: Arc<Config>,
    pub player: Arc<Player>,
    /// Voice connection manager, shared with the playback driver.
    pub songbird: Arc<Songbird>,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, player: Arc<Player>, songbird: Arc<Songbird>) -> Self {
        Self {
            config,
            player,
            songbird,
        }
    }

    /// Registers per guild when `GUILD_ID` is set, globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registering slash commands for guild {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registering slash commands globally");
                commands::register_global_commands(ctx).await?;
            }
        }
        info!("✅ {} slash commands registered", commands::all_commands().len());
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Failed to register slash commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("❌ Command failed: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("❌ Button interaction failed: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Tears the session down when the bot itself leaves voice. Moving
    /// between channels keeps `channel_id` set and is ignored.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        if new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id.or_else(|| old.and_then(|o| o.guild_id)) else {
            warn!("⚠️ Voice disconnect without a guild id");
            return;
        };

        info!("🔌 Left voice in guild {}", guild_id);
        self.player.disconnected(guild_id).await;
    }
}
