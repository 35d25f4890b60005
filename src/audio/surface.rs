use async_trait::async_trait;
use serenity::model::id::ChannelId;

use crate::audio::{preset::EqPreset, session::SurfaceRef, track::QueuedTrack};

/// Content of the now-playing surface after an advance.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingView {
    pub track: QueuedTrack,
    pub preset: EqPreset,
    pub queue_depth: usize,
}

/// Renders the single now-playing message of a guild.
#[async_trait]
pub trait SurfacePresenter: Send + Sync {
    /// Edits `existing` in place if it still resolves; otherwise posts a new
    /// rich surface, falling back to plain text. `None` if nothing could be
    /// posted at all.
    async fn show(
        &self,
        channel_id: ChannelId,
        existing: Option<SurfaceRef>,
        view: &NowPlayingView,
    ) -> Option<SurfaceRef>;

    /// Best effort; failures are logged and ignored.
    async fn dispose(&self, surface: SurfaceRef);
}
