use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    audio::{
        session::SurfaceRef,
        surface::{NowPlayingView, SurfacePresenter},
    },
    ui::{buttons, embeds},
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("message no longer resolves: {0}")]
    Missing(String),
    #[error("discord rejected the request: {0}")]
    Rejected(String),
}

/// The raw message calls behind the now-playing surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageOps: Send + Sync {
    /// Fails when the message was deleted or the channel is gone.
    async fn verify(&self, surface: SurfaceRef) -> Result<(), SurfaceError>;
    async fn edit(&self, surface: SurfaceRef, view: &NowPlayingView) -> Result<(), SurfaceError>;
    async fn post_rich(
        &self,
        channel_id: ChannelId,
        view: &NowPlayingView,
    ) -> Result<MessageId, SurfaceError>;
    async fn post_plain(
        &self,
        channel_id: ChannelId,
        content: String,
    ) -> Result<MessageId, SurfaceError>;
    async fn delete(&self, surface: SurfaceRef) -> Result<(), SurfaceError>;
}

/// Serenity HTTP implementation of [`MessageOps`].
pub struct HttpMessages {
    http: Arc<Http>,
}

impl HttpMessages {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn rejected(e: serenity::Error) -> SurfaceError {
    SurfaceError::Rejected(e.to_string())
}

#[async_trait]
impl MessageOps for HttpMessages {
    async fn verify(&self, surface: SurfaceRef) -> Result<(), SurfaceError> {
        surface
            .channel_id
            .message(&self.http, surface.message_id)
            .await
            .map(|_| ())
            .map_err(|e| SurfaceError::Missing(e.to_string()))
    }

    async fn edit(&self, surface: SurfaceRef, view: &NowPlayingView) -> Result<(), SurfaceError> {
        let edit = EditMessage::new()
            .embed(embeds::now_playing(view))
            .components(buttons::player_controls());
        surface
            .channel_id
            .edit_message(&self.http, surface.message_id, edit)
            .await
            .map(|_| ())
            .map_err(rejected)
    }

    async fn post_rich(
        &self,
        channel_id: ChannelId,
        view: &NowPlayingView,
    ) -> Result<MessageId, SurfaceError> {
        let rich = CreateMessage::new()
            .embed(embeds::now_playing(view))
            .components(buttons::player_controls());
        channel_id
            .send_message(&self.http, rich)
            .await
            .map(|m| m.id)
            .map_err(rejected)
    }

    async fn post_plain(
        &self,
        channel_id: ChannelId,
        content: String,
    ) -> Result<MessageId, SurfaceError> {
        channel_id
            .say(&self.http, content)
            .await
            .map(|m| m.id)
            .map_err(rejected)
    }

    async fn delete(&self, surface: SurfaceRef) -> Result<(), SurfaceError> {
        surface
            .channel_id
            .delete_message(&self.http, surface.message_id)
            .await
            .map_err(rejected)
    }
}

/// Keeps one now-playing message per guild in its announce channel.
pub struct MessageSurface<O = HttpMessages> {
    ops: O,
}

impl<O: MessageOps> MessageSurface<O> {
    pub fn new(ops: O) -> Self {
        Self { ops }
    }

    async fn edit_in_place(&self, surface: SurfaceRef, view: &NowPlayingView) -> bool {
        // A deleted message fails here; fall through to posting a new one.
        if let Err(e) = self.ops.verify(surface).await {
            debug!("Now-playing message {} {}", surface.message_id, e);
            return false;
        }
        match self.ops.edit(surface, view).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Could not edit now-playing message: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl<O: MessageOps> SurfacePresenter for MessageSurface<O> {
    async fn show(
        &self,
        channel_id: ChannelId,
        existing: Option<SurfaceRef>,
        view: &NowPlayingView,
    ) -> Option<SurfaceRef> {
        if let Some(surface) = existing {
            if self.edit_in_place(surface, view).await {
                return Some(surface);
            }
        }

        let posted = match self.ops.post_rich(channel_id, view).await {
            Ok(message_id) => Ok(message_id),
            Err(e) => {
                warn!("⚠️ Rich now-playing message failed, sending plain text: {}", e);
                let plain = format!("🎵 Now playing: **{}**", view.track.title());
                self.ops.post_plain(channel_id, plain).await
            }
        };

        match posted {
            Ok(message_id) => Some(SurfaceRef {
                channel_id,
                message_id,
            }),
            Err(e) => {
                error!("❌ Could not post now-playing message in {}: {}", channel_id, e);
                None
            }
        }
    }

    async fn dispose(&self, surface: SurfaceRef) {
        if let Err(e) = self.ops.delete(surface).await {
            debug!("Now-playing message {} already gone: {}", surface.message_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{preset::EqPreset, track::QueuedTrack};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    const CHANNEL: ChannelId = ChannelId::new(10);

    fn view() -> NowPlayingView {
        NowPlayingView {
            track: QueuedTrack::new("https://cdn.example/a", "Song A"),
            preset: EqPreset::Enhanced,
            queue_depth: 2,
        }
    }

    fn stored(id: u64) -> SurfaceRef {
        SurfaceRef {
            channel_id: CHANNEL,
            message_id: MessageId::new(id),
        }
    }

    #[tokio::test]
    async fn live_message_is_edited_in_place() {
        let mut ops = MockMessageOps::new();
        ops.expect_verify().with(eq(stored(5))).returning(|_| Ok(()));
        ops.expect_edit().times(1).returning(|_, _| Ok(()));
        ops.expect_post_rich().never();

        let surface = MessageSurface::new(ops);
        assert_eq!(surface.show(CHANNEL, Some(stored(5)), &view()).await, Some(stored(5)));
    }

    #[tokio::test]
    async fn deleted_message_is_replaced_by_a_new_post() {
        let mut ops = MockMessageOps::new();
        ops.expect_verify()
            .returning(|_| Err(SurfaceError::Missing("Unknown Message".into())));
        ops.expect_edit().never();
        ops.expect_post_rich()
            .with(eq(CHANNEL), mockall::predicate::always())
            .returning(|_, _| Ok(MessageId::new(6)));

        let surface = MessageSurface::new(ops);
        assert_eq!(surface.show(CHANNEL, Some(stored(5)), &view()).await, Some(stored(6)));
    }

    #[tokio::test]
    async fn rejected_rich_post_falls_back_to_plain_text() {
        let mut ops = MockMessageOps::new();
        ops.expect_post_rich()
            .returning(|_, _| Err(SurfaceError::Rejected("Missing Permissions".into())));
        ops.expect_post_plain()
            .withf(|_, content| content == "🎵 Now playing: **Song A**")
            .returning(|_, _| Ok(MessageId::new(7)));

        let surface = MessageSurface::new(ops);
        assert_eq!(surface.show(CHANNEL, None, &view()).await, Some(stored(7)));
    }

    #[tokio::test]
    async fn nothing_posted_when_both_posts_fail() {
        let mut ops = MockMessageOps::new();
        ops.expect_post_rich()
            .returning(|_, _| Err(SurfaceError::Rejected("Missing Access".into())));
        ops.expect_post_plain()
            .returning(|_, _| Err(SurfaceError::Rejected("Missing Access".into())));

        let surface = MessageSurface::new(ops);
        assert_eq!(surface.show(CHANNEL, None, &view()).await, None);
    }

    #[tokio::test]
    async fn dispose_failure_is_ignored() {
        let mut ops = MockMessageOps::new();
        ops.expect_delete()
            .times(1)
            .returning(|_| Err(SurfaceError::Missing("Unknown Message".into())));

        MessageSurface::new(ops).dispose(stored(5)).await;
    }
}
