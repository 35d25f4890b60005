use chrono::Utc;
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    preset::EqPreset,
    session::{NowPlaying, QueueSnapshot, ShuffleOutcome},
    surface::NowPlayingView,
    track::{duration_suffix, QueuedTrack, SourceKind},
};

/// Color palette shared by every embed.
pub mod colors {
    use serenity::all::Colour;

    pub const NOW_PLAYING_GREEN: Colour = Colour::from_rgb(29, 185, 84);
    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 152, 219);
    pub const EQ_PURPLE: Colour = Colour::from_rgb(155, 89, 182);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(149, 165, 166);
}

const CONTROLS_FOOTER: &str = "Use the buttons below to control playback";
const DEFAULT_ARTWORK: &str = "https://i.imgur.com/QvWbWJ9.png";

fn track_header(track: &QueuedTrack) -> String {
    format!("**{}**{}", track.title(), duration_suffix(track.duration()))
}

fn with_track_fields(mut embed: CreateEmbed, track: &QueuedTrack, preset: EqPreset) -> CreateEmbed {
    if let Some(artist) = track.artist() {
        embed = embed.field("👤 Artist", artist, true);
    }
    embed = embed.thumbnail(track.artwork_url().unwrap_or(DEFAULT_ARTWORK));
    if track.source_kind() == SourceKind::Catalog {
        embed = embed.field("🎵 Source", track.source_kind().as_str(), true);
    }
    embed.field("🎛️ EQ", preset.label(), true)
}

fn up_next(queue_depth: usize) -> Option<String> {
    (queue_depth > 0).then(|| format!("{} songs in queue", queue_depth))
}

/// The shared now-playing message.
pub fn now_playing(view: &NowPlayingView) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(track_header(&view.track))
        .color(colors::NOW_PLAYING_GREEN);
    embed = with_track_fields(embed, &view.track, view.preset);
    if let Some(next) = up_next(view.queue_depth) {
        embed = embed.field("📋 Up Next", next, true);
    }
    embed
        .footer(CreateEmbedFooter::new(CONTROLS_FOOTER))
        .timestamp(Timestamp::now())
}

/// `/nowplaying`: the same card plus elapsed time and status.
pub fn now_playing_detail(current: &NowPlaying, queue_depth: usize) -> CreateEmbed {
    let elapsed = (Utc::now() - current.started_at).num_seconds().max(0) as u64;
    let status = if current.paused { "⏸️ Paused" } else { "▶️ Playing" };

    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(track_header(&current.track))
        .color(colors::NOW_PLAYING_GREEN);
    embed = with_track_fields(embed, &current.track, current.preset);
    embed = embed.field("⏰ Elapsed", format_clock(elapsed), true);
    if let Some(next) = up_next(queue_depth) {
        embed = embed.field("📋 Up Next", next, true);
    }
    embed
        .field("🎵 Status", status, true)
        .footer(CreateEmbedFooter::new(CONTROLS_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn nothing_playing() -> CreateEmbed {
    CreateEmbed::default()
        .title("🔇 Nothing Playing")
        .description("No music is currently playing.")
        .color(colors::NEUTRAL_GRAY)
}

pub fn empty_queue() -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Empty Queue")
        .description("The queue is currently empty.\nUse `/play` to add some music!")
        .color(colors::NEUTRAL_GRAY)
}

/// One page of the pending queue; `page` is 1-based and clamped.
pub fn queue_page(snapshot: &QueueSnapshot, page: usize, per_page: usize) -> CreateEmbed {
    let view = snapshot.page(page, per_page);
    let mut embed = CreateEmbed::default()
        .title("📋 Music Queue")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.now_playing {
        embed = embed.field("🎵 Now Playing", format!("**{}**", current.track.title()), false);
    }

    if view.items.is_empty() {
        embed = embed.field("⏭️ Up Next", "*Queue is empty*", false);
    } else {
        embed = embed.field(
            format!("⏭️ Up Next (Page {}/{})", view.current_page, view.total_pages),
            queue_lines(view.items, view.first_position),
            false,
        );
    }

    embed
        .field("🎛️ EQ", snapshot.preset.label(), true)
        .footer(CreateEmbedFooter::new(format!(
            "Total: {} songs • Page {}/{}",
            snapshot.tracks.len(),
            view.current_page,
            view.total_pages
        )))
}

pub fn queue_lines(items: &[QueuedTrack], first_position: usize) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, track)| format!("`{}.` {}", first_position + i, clip(&track.display_name())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps a full page under Discord's 1024-character field limit.
fn clip(text: &str) -> String {
    const MAX: usize = 90;
    if text.chars().count() <= MAX {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX - 1).collect();
    clipped.push('…');
    clipped
}

fn preset_line(preset: EqPreset) -> String {
    format!("{} - {}", preset.label(), preset.tagline())
}

pub fn eq_settings(current: EqPreset) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎛️ Audio Equalizer Settings")
        .description(format!("**Current EQ:** {}", preset_line(current)))
        .color(colors::EQ_PURPLE)
        .field(
            "📝 Available Presets",
            "Use the buttons below to change the EQ preset.\nNew settings will apply to the next song.",
            false,
        )
}

pub fn eq_updated(preset: EqPreset) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎛️ Audio EQ Updated")
        .description(format!("EQ preset changed to: **{}**", preset_line(preset)))
        .color(colors::SUCCESS_GREEN)
        .field(
            "📝 Note",
            "The new EQ settings will apply to the next song that plays.",
            false,
        )
        .field("🎚️ What this does", preset.description(), false)
}

pub fn shuffle_result(outcome: ShuffleOutcome) -> CreateEmbed {
    let (title, description, color) = match outcome {
        ShuffleOutcome::Shuffled(n) => (
            "🔀 Queue Shuffled!",
            format!("Successfully shuffled {} songs in the queue.", n),
            colors::SUCCESS_GREEN,
        ),
        ShuffleOutcome::SingleTrack => (
            "🔀 Only One Song",
            "There's only one song in the queue. Add more songs to shuffle!".to_string(),
            colors::WARNING_ORANGE,
        ),
        ShuffleOutcome::EmptyButPlaying => (
            "🔀 Queue Currently Empty",
            "The queue is currently empty, but if you just added a playlist, more songs may be added soon.\nTry shuffling again in a moment.".to_string(),
            colors::WARNING_ORANGE,
        ),
        ShuffleOutcome::NothingQueued => (
            "🔀 Cannot Shuffle",
            "Queue is empty and nothing is playing.".to_string(),
            colors::ERROR_RED,
        ),
    };
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(color)
}

pub fn help() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Music Bot Commands")
        .description("Here are all the available commands for the music bot:")
        .color(colors::SUCCESS_GREEN)
        .field(
            "🎶 Playback Commands",
            "`/play` - Play a song, playlist, or add to queue\n\
             `/pause` - Pause the current song\n\
             `/resume` - Resume the paused song\n\
             `/skip` - Skip to the next song\n\
             `/stop` - Stop playback and clear queue\n\
             `/eq` - Change audio equalizer settings",
            false,
        )
        .field(
            "📋 Queue Commands",
            "`/queue` - Show the current song queue\n\
             `/nowplaying` - Show the currently playing song\n\
             `/shuffle` - Shuffle the current queue",
            false,
        )
        .field(
            "🎵 Supported Sources",
            "• YouTube videos and playlists\n\
             • Spotify tracks, playlists, and albums\n\
             • Direct song searches",
            false,
        )
        .field(
            "📝 Usage Examples",
            "`/play Never Gonna Give You Up`\n\
             `/play https://open.spotify.com/playlist/...`\n\
             `/play https://youtube.com/playlist?list=...`\n\
             `/play https://youtu.be/dQw4w9WgXcQ`",
            false,
        )
        .thumbnail(DEFAULT_ARTWORK)
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn format_clock(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(75), "1:15");
        assert_eq!(format_clock(3725), "1:02:05");
    }

    #[test]
    fn queue_lines_number_from_page_start() {
        let items = vec![
            QueuedTrack::new("a", "One").with_artist("Band"),
            QueuedTrack::new("b", "Two"),
        ];
        assert_eq!(queue_lines(&items, 11), "`11.` Band - One\n`12.` Two");
    }

    #[test]
    fn long_names_are_clipped() {
        let long = "x".repeat(200);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), 90);
        assert!(clipped.ends_with('…'));
    }

    #[test]
    fn header_includes_duration() {
        let track = QueuedTrack::new("a", "Song").with_duration(Duration::from_secs(61));
        assert_eq!(track_header(&track), "**Song** (1:01)");
    }

    #[test]
    fn up_next_only_when_queued() {
        assert_eq!(up_next(0), None);
        assert_eq!(up_next(3).as_deref(), Some("3 songs in queue"));
    }
}
