use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::{PlayError, PlayOutcome, StateViolation},
        preset::EqPreset,
        session::{EnqueueError, PlaybackState, ShuffleOutcome},
        track::duration_suffix,
    },
    bot::JukeboxBot,
    sources::{classify_query, QueryKind, ResolveError},
    ui::{
        buttons::{self, ButtonAction},
        embeds,
    },
};

/// Dispatches a slash command.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        let message = text("❌ Commands only work inside a server.").ephemeral(true);
        return reply(ctx, &command, message).await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => {
            let content = match bot.player.pause(guild_id) {
                Ok(_) => "Playback paused!".to_string(),
                Err(violation) => violation.to_string(),
            };
            reply(ctx, &command, text(content)).await
        }
        "resume" => {
            let content = match bot.player.resume(guild_id) {
                Ok(_) => "Playback resumed!".to_string(),
                Err(violation) => violation.to_string(),
            };
            reply(ctx, &command, text(content)).await
        }
        "skip" => {
            let content = match bot.player.skip(guild_id) {
                Ok(_) => "Skipped the current song.",
                Err(_) => "Not playing anything to skip.",
            };
            reply(ctx, &command, text(content)).await
        }
        "stop" => {
            let content = match bot.player.stop(guild_id).await {
                Ok(_) => "Stopped playback and disconnected!".to_string(),
                Err(violation) => violation.to_string(),
            };
            reply(ctx, &command, text(content)).await
        }
        "queue" => {
            let page = integer_option(&command, "page")
                .and_then(|p| usize::try_from(p).ok())
                .unwrap_or(1);
            let message = match queue_view(bot, guild_id, page) {
                Some((embed, rows)) => CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(rows),
                None => CreateInteractionResponseMessage::new().embed(embeds::empty_queue()),
            };
            reply(ctx, &command, message).await
        }
        "nowplaying" => {
            let snapshot = bot.player.snapshot(guild_id);
            let message = match &snapshot.now_playing {
                Some(current) => CreateInteractionResponseMessage::new()
                    .embed(embeds::now_playing_detail(current, snapshot.tracks.len()))
                    .components(buttons::player_controls()),
                None => CreateInteractionResponseMessage::new().embed(embeds::nothing_playing()),
            };
            reply(ctx, &command, message).await
        }
        "shuffle" => {
            let outcome = bot.player.shuffle(guild_id);
            let message =
                CreateInteractionResponseMessage::new().embed(embeds::shuffle_result(outcome));
            reply(ctx, &command, message).await
        }
        "eq" => {
            let preset =
                string_option(&command, "preset").and_then(|key| key.parse::<EqPreset>().ok());
            match preset {
                Some(preset) => {
                    bot.player.set_preset(guild_id, preset);
                    let message =
                        CreateInteractionResponseMessage::new().embed(embeds::eq_updated(preset));
                    reply(ctx, &command, message).await
                }
                None => reply(ctx, &command, text("❌ Unknown EQ preset.").ephemeral(true)).await,
            }
        }
        "help" => {
            let message = CreateInteractionResponseMessage::new().embed(embeds::help());
            reply(ctx, &command, message).await
        }
        other => {
            warn!("Unknown command /{}", other);
            reply(ctx, &command, text("❌ Unknown command").ephemeral(true)).await
        }
    }
}

/// Dispatches a button click. Replies are ephemeral unless the click
/// rewrites the message it came from.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    info!(
        "🔘 Button {} pressed by {} in guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ButtonAction::parse(&component.data.custom_id) else {
        warn!("Unknown button id {}", component.data.custom_id);
        return respond(ctx, &component, notice("❌ Unknown button.")).await;
    };

    match action {
        ButtonAction::PauseResume => {
            let content = match bot.player.state(guild_id) {
                PlaybackState::Playing => match bot.player.pause(guild_id) {
                    Ok(_) => "⏸️ Paused!".to_string(),
                    Err(violation) => violation.to_string(),
                },
                PlaybackState::Paused => match bot.player.resume(guild_id) {
                    Ok(_) => "▶️ Resumed!".to_string(),
                    Err(violation) => violation.to_string(),
                },
                _ => StateViolation::NothingPlaying.to_string(),
            };
            respond(ctx, &component, notice(content)).await
        }
        ButtonAction::Skip => {
            let content = match bot.player.skip(guild_id) {
                Ok(_) => "⏭️ Skipped!",
                Err(_) => "Not playing anything to skip.",
            };
            respond(ctx, &component, notice(content)).await
        }
        ButtonAction::Shuffle => {
            let content = shuffle_notice(bot.player.shuffle(guild_id));
            respond(ctx, &component, notice(content)).await
        }
        ButtonAction::Queue => {
            let message = match queue_view(bot, guild_id, 1) {
                Some((embed, rows)) => CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(rows)
                    .ephemeral(true),
                None => notice("The queue is empty."),
            };
            respond(ctx, &component, message).await
        }
        ButtonAction::QueuePage(page) => {
            let update = match queue_view(bot, guild_id, page) {
                Some((embed, rows)) => CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(rows),
                None => CreateInteractionResponseMessage::new()
                    .embed(embeds::empty_queue())
                    .components(Vec::new()),
            };
            component
                .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(update))
                .await?;
            Ok(())
        }
        ButtonAction::Eq => {
            let current = bot.player.preset(guild_id);
            let message = CreateInteractionResponseMessage::new()
                .embed(embeds::eq_settings(current))
                .components(buttons::eq_selection(current))
                .ephemeral(true);
            respond(ctx, &component, message).await
        }
        ButtonAction::SetEq(preset) => {
            bot.player.set_preset(guild_id, preset);
            let update = CreateInteractionResponseMessage::new()
                .embed(embeds::eq_updated(preset))
                .components(Vec::new());
            component
                .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(update))
                .await?;
            Ok(())
        }
        ButtonAction::Stop => {
            let content = match bot.player.stop(guild_id).await {
                Ok(_) => "⏹️ Stopped playback and disconnected!".to_string(),
                Err(violation) => violation.to_string(),
            };
            respond(ctx, &component, notice(content)).await
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = string_option(command, "query").map(str::to_owned) else {
        return reply(ctx, command, text("❌ Missing query.").ephemeral(true)).await;
    };

    // Resolution can outlast the three-second interaction window.
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit(ctx, command, "You must be in a voice channel.").await;
    };

    if let Err(e) = join_voice(bot, guild_id, voice_channel).await {
        warn!("⚠️ Could not join voice channel {} in guild {}: {}", voice_channel, guild_id, e);
        return edit(ctx, command, "❌ I couldn't join your voice channel.").await;
    }

    let content = match bot.player.play(guild_id, command.channel_id, &query).await {
        Ok(outcome) => {
            debug!(
                "'{}' landed at position {} in guild {}",
                outcome.track.title(),
                outcome.position,
                guild_id
            );
            play_reply(&outcome)
        }
        Err(e) => {
            warn!("⚠️ /play '{}' failed in guild {}: {}", query, guild_id, e);
            play_error_reply(&e, &classify_query(&query))
        }
    };
    edit(ctx, command, content).await
}

async fn join_voice(
    bot: &JukeboxBot,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<()> {
    if let Some(call) = bot.songbird.get(guild_id) {
        let current = call.lock().await.current_channel();
        if current == Some(songbird::id::ChannelId::from(channel_id)) {
            return Ok(());
        }
    }
    bot.songbird.join(guild_id, channel_id).await?;
    info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

/// Embed and pagination row for `page`, or `None` when there is nothing
/// current and nothing queued.
fn queue_view(
    bot: &JukeboxBot,
    guild_id: GuildId,
    page: usize,
) -> Option<(CreateEmbed, Vec<CreateActionRow>)> {
    let snapshot = bot.player.snapshot(guild_id);
    if snapshot.now_playing.is_none() && snapshot.tracks.is_empty() {
        return None;
    }
    let per_page = bot.config.queue_page_size;
    let current_page = snapshot.page(page, per_page).current_page;
    let total_pages = snapshot.total_pages(per_page);
    Some((
        embeds::queue_page(&snapshot, page, per_page),
        vec![buttons::queue_pagination(current_page, total_pages)],
    ))
}

pub fn play_reply(outcome: &PlayOutcome) -> String {
    let verb = if outcome.started {
        "✅ Now playing"
    } else {
        "Added to queue"
    };
    let mut content = format!(
        "{}: **{}**{}",
        verb,
        outcome.track.title(),
        duration_suffix(outcome.track.duration())
    );
    if outcome.pending > 0 {
        content.push_str(&format!(
            "\n🎵 Processing {} more songs in background...",
            outcome.pending
        ));
    }
    content
}

pub fn play_error_reply(error: &PlayError, kind: &QueryKind) -> String {
    match (error, kind) {
        (PlayError::Resolve(ResolveError::CatalogUnavailable), _) => {
            "Spotify integration is not configured. Please check your API credentials.".to_string()
        }
        (PlayError::EmptyExpansion, QueryKind::Catalog(_)) => {
            "❌ No tracks found in Spotify content.".to_string()
        }
        (PlayError::EmptyExpansion, _) => "❌ No tracks found in YouTube playlist.".to_string(),
        (PlayError::Resolve(ResolveError::NoResults), QueryKind::Single(_)) => {
            "No results found.".to_string()
        }
        (PlayError::Resolve(ResolveError::NoResults), _) => {
            "❌ Could not find the first song.".to_string()
        }
        (PlayError::Resolve(e), _) => format!("❌ Error searching for song: {}", e),
        (PlayError::Queue(EnqueueError::QueueFull(cap)), _) => {
            format!("❌ The queue is full ({} songs).", cap)
        }
        (PlayError::Queue(EnqueueError::SessionEnded), _) => {
            "❌ Playback just ended, please try again.".to_string()
        }
    }
}

pub fn shuffle_notice(outcome: ShuffleOutcome) -> String {
    match outcome {
        ShuffleOutcome::Shuffled(n) => format!("🔀 Shuffled {} songs!", n),
        ShuffleOutcome::SingleTrack => "There's only one song in the queue.".to_string(),
        ShuffleOutcome::EmptyButPlaying => {
            "Queue is currently empty, but more songs may be added soon. Try shuffling again in a moment."
                .to_string()
        }
        ShuffleOutcome::NothingQueued => "Queue is empty and nothing is playing.".to_string(),
    }
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn text(content: impl Into<String>) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new().content(content)
}

fn notice(content: impl Into<String>) -> CreateInteractionResponseMessage {
    text(content).ephemeral(true)
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn respond(
    ctx: &Context,
    component: &ComponentInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    component
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn edit(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::QueuedTrack;
    use crate::sources::{CatalogKind, CatalogLink};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn outcome(started: bool, pending: usize) -> PlayOutcome {
        PlayOutcome {
            track: QueuedTrack::new("u", "Song").with_duration(Duration::from_secs(200)),
            started,
            position: 1,
            pending,
        }
    }

    #[test]
    fn play_reply_for_single_tracks() {
        assert_eq!(play_reply(&outcome(true, 0)), "✅ Now playing: **Song** (3:20)");
        assert_eq!(play_reply(&outcome(false, 0)), "Added to queue: **Song** (3:20)");
    }

    #[test]
    fn play_reply_mentions_background_work() {
        assert_eq!(
            play_reply(&outcome(true, 4)),
            "✅ Now playing: **Song** (3:20)\n🎵 Processing 4 more songs in background..."
        );
    }

    #[test]
    fn play_errors_depend_on_query_shape() {
        let catalog = QueryKind::Catalog(CatalogLink {
            kind: CatalogKind::Playlist,
            id: "abc".into(),
        });
        let single = QueryKind::Single("song".into());

        assert_eq!(
            play_error_reply(&PlayError::Resolve(ResolveError::NoResults), &single),
            "No results found."
        );
        assert_eq!(
            play_error_reply(&PlayError::Resolve(ResolveError::NoResults), &catalog),
            "❌ Could not find the first song."
        );
        assert_eq!(
            play_error_reply(&PlayError::EmptyExpansion, &catalog),
            "❌ No tracks found in Spotify content."
        );
        assert_eq!(
            play_error_reply(&PlayError::Resolve(ResolveError::CatalogUnavailable), &catalog),
            "Spotify integration is not configured. Please check your API credentials."
        );
    }

    #[test]
    fn shuffle_notices() {
        assert_eq!(shuffle_notice(ShuffleOutcome::Shuffled(7)), "🔀 Shuffled 7 songs!");
        assert_eq!(
            shuffle_notice(ShuffleOutcome::SingleTrack),
            "There's only one song in the queue."
        );
    }
}
