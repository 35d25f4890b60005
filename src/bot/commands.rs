use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::preset::EqPreset;

/// Every slash command the bot serves.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        eq_command(),
        help_command(),
    ]
}

/// Registers globally; propagation can take up to an hour.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registers for one guild; visible almost immediately.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song/playlist or add it to the queue.")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Song name, YouTube/Spotify URL, or playlist URL",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the currently playing song.")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the currently paused song.")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current playing song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback and clear the queue.")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the current song queue with pagination.")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page to show")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the currently playing song with controls.")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffle the current queue")
}

fn eq_command() -> CreateCommand {
    let preset = EqPreset::ALL.into_iter().fold(
        CreateCommandOption::new(
            CommandOptionType::String,
            "preset",
            "Choose an EQ preset for better audio quality",
        )
        .required(true),
        |option, preset| {
            let name = format!("{} - {}", preset.label(), preset.tagline());
            option.add_string_choice(name, preset.key())
        },
    );

    CreateCommand::new("eq")
        .description("Change audio equalizer settings")
        .add_option(preset)
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Show all available music bot commands")
}
