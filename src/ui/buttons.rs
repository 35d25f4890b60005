use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::preset::EqPreset;

/// Custom ids for every button the bot renders.
pub mod button_ids {
    pub const PAUSE_RESUME: &str = "music_pause_resume";
    pub const SKIP: &str = "music_skip";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const QUEUE: &str = "music_queue";
    pub const EQ: &str = "music_eq";
    pub const STOP: &str = "music_stop";

    /// Followed by the 1-based page to show.
    pub const QUEUE_PAGE_PREFIX: &str = "queue_page:";
    /// Followed by the preset key.
    pub const EQ_SET_PREFIX: &str = "eq_set:";
}

/// A parsed button click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    PauseResume,
    Skip,
    Shuffle,
    Queue,
    Eq,
    Stop,
    QueuePage(usize),
    SetEq(EqPreset),
}

impl ButtonAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        let action = match custom_id {
            button_ids::PAUSE_RESUME => ButtonAction::PauseResume,
            button_ids::SKIP => ButtonAction::Skip,
            button_ids::SHUFFLE => ButtonAction::Shuffle,
            button_ids::QUEUE => ButtonAction::Queue,
            button_ids::EQ => ButtonAction::Eq,
            button_ids::STOP => ButtonAction::Stop,
            other => {
                if let Some(page) = other.strip_prefix(button_ids::QUEUE_PAGE_PREFIX) {
                    ButtonAction::QueuePage(page.parse().ok()?)
                } else if let Some(key) = other.strip_prefix(button_ids::EQ_SET_PREFIX) {
                    ButtonAction::SetEq(key.parse().ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(action)
    }
}

/// Controls attached to the now-playing message.
pub fn player_controls() -> Vec<CreateActionRow> {
    let playback = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PAUSE_RESUME)
            .label("Pause/Resume")
            .emoji('⏯')
            .style(ButtonStyle::Primary),
        CreateButton::new(button_ids::SKIP)
            .label("Skip")
            .emoji('⏭')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::SHUFFLE)
            .label("Shuffle")
            .emoji('🔀')
            .style(ButtonStyle::Secondary),
    ]);

    let info = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::QUEUE)
            .label("Queue")
            .emoji('📋')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::EQ)
            .label("EQ")
            .emoji('🎛')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::STOP)
            .label("Stop")
            .emoji('⏹')
            .style(ButtonStyle::Danger),
    ]);

    vec![playback, info]
}

pub fn queue_page_id(page: usize) -> String {
    format!("{}{}", button_ids::QUEUE_PAGE_PREFIX, page)
}

/// Previous / Next / Refresh for a 1-based `current_page`.
pub fn queue_pagination(current_page: usize, total_pages: usize) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(queue_page_id(current_page.saturating_sub(1)))
            .label("◀️ Previous")
            .style(ButtonStyle::Secondary)
            .disabled(current_page <= 1),
        CreateButton::new(queue_page_id(current_page + 1))
            .label("▶️ Next")
            .style(ButtonStyle::Secondary)
            .disabled(current_page >= total_pages),
        CreateButton::new(queue_page_id(current_page))
            .label("🔄 Refresh")
            .style(ButtonStyle::Primary),
    ])
}

/// One button per preset, the current one highlighted.
pub fn eq_selection(current: EqPreset) -> Vec<CreateActionRow> {
    EqPreset::ALL
        .chunks(3)
        .map(|row| {
            CreateActionRow::Buttons(
                row.iter()
                    .map(|&preset| {
                        let style = if preset == current {
                            ButtonStyle::Success
                        } else {
                            ButtonStyle::Secondary
                        };
                        CreateButton::new(format!("{}{}", button_ids::EQ_SET_PREFIX, preset.key()))
                            .label(preset.label())
                            .style(style)
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_ids() {
        assert_eq!(ButtonAction::parse("music_skip"), Some(ButtonAction::Skip));
        assert_eq!(ButtonAction::parse("music_stop"), Some(ButtonAction::Stop));
        assert_eq!(ButtonAction::parse("music_loop"), None);
    }

    #[test]
    fn parses_queue_pages() {
        assert_eq!(ButtonAction::parse(&queue_page_id(3)), Some(ButtonAction::QueuePage(3)));
        assert_eq!(ButtonAction::parse("queue_page:x"), None);
    }

    #[test]
    fn parses_every_eq_button() {
        for preset in EqPreset::ALL {
            let id = format!("{}{}", button_ids::EQ_SET_PREFIX, preset.key());
            assert_eq!(ButtonAction::parse(&id), Some(ButtonAction::SetEq(preset)));
        }
        assert_eq!(ButtonAction::parse("eq_set:loudness"), None);
    }
}
