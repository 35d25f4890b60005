//! Per-guild playback state.
//!
//! Every method here is synchronous: callers hold the session lock only for
//! the duration of one call and never across an `.await`. That keeps each
//! transition atomic with respect to concurrent commands, background
//! enrichment and driver completions for the same guild.

use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{collections::VecDeque, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::audio::{preset::EqPreset, track::QueuedTrack};

/// Weak handle to the last now-playing message posted for a guild.
///
/// It may stop resolving at any time (deleted by a moderator, channel gone);
/// the presenter checks before every reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: QueuedTrack,
    pub started_at: DateTime<Utc>,
    /// Profile the stream was started with; later EQ changes do not touch it.
    pub preset: EqPreset,
    pub stream_id: u64,
    /// Enqueue id of the entry that became current.
    pub entry_id: u64,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Teardown,
}

/// What the player must do after one advance step.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceStep {
    /// The head of the queue became current; start streaming it.
    Start(StreamRequest),
    /// Something is already current (or the session is gone); nothing to do.
    Busy,
    /// Queue exhausted: the session is now torn down.
    Teardown { surface: Option<SurfaceRef> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub guild_id: GuildId,
    /// Session the stream belongs to; stream ids restart in every session.
    pub generation: u64,
    pub stream_id: u64,
    pub track: QueuedTrack,
    pub preset: EqPreset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueReceipt {
    pub entry_id: u64,
    /// 1-based position in the pending queue.
    pub position: usize,
    /// Nothing was current when the track was appended.
    pub was_idle: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("the queue is full ({0} songs)")]
    QueueFull(usize),
    #[error("the session has already ended")]
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleOutcome {
    Shuffled(usize),
    SingleTrack,
    /// Queue empty while a track is current; a playlist may still be loading.
    EmptyButPlaying,
    NothingQueued,
}

/// Everything a stop/disconnect released, for logging and replies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopSummary {
    pub now_playing: Option<QueuedTrack>,
    pub cleared: usize,
    pub surface: Option<SurfaceRef>,
}

#[derive(Debug)]
struct Entry {
    id: u64,
    track: QueuedTrack,
}

#[derive(Debug)]
pub struct GuildSession {
    guild_id: GuildId,
    generation: u64,
    queue: VecDeque<Entry>,
    now_playing: Option<NowPlaying>,
    eq_preset: EqPreset,
    surface: Option<SurfaceRef>,
    surface_gate: Arc<AsyncMutex<()>>,
    announce_channel: Option<ChannelId>,
    next_stream_id: u64,
    next_entry_id: u64,
    max_queue: usize,
    torn_down: bool,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, generation: u64, eq_preset: EqPreset, max_queue: usize) -> Self {
        Self {
            guild_id,
            generation,
            queue: VecDeque::new(),
            now_playing: None,
            eq_preset,
            surface: None,
            surface_gate: Arc::new(AsyncMutex::new(())),
            announce_channel: None,
            next_stream_id: 1,
            next_entry_id: 1,
            max_queue,
            torn_down: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> PlaybackState {
        if self.torn_down {
            return PlaybackState::Teardown;
        }
        match &self.now_playing {
            Some(np) if np.paused => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
            None => PlaybackState::Idle,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn queued(&self) -> impl Iterator<Item = &QueuedTrack> {
        self.queue.iter().map(|e| &e.track)
    }

    pub fn eq_preset(&self) -> EqPreset {
        self.eq_preset
    }

    /// Applies to the next stream only.
    pub fn set_eq_preset(&mut self, preset: EqPreset) {
        self.eq_preset = preset;
    }

    pub fn announce_channel(&self) -> Option<ChannelId> {
        self.announce_channel
    }

    pub fn set_announce_channel(&mut self, channel_id: ChannelId) {
        self.announce_channel = Some(channel_id);
    }

    pub fn surface(&self) -> Option<SurfaceRef> {
        self.surface
    }

    pub fn set_surface(&mut self, surface: Option<SurfaceRef>) {
        self.surface = surface;
    }

    /// Serializes surface refreshes so at most one message is posted per guild.
    /// Held across presenter calls, so it lives outside the session lock.
    pub fn surface_gate(&self) -> Arc<AsyncMutex<()>> {
        Arc::clone(&self.surface_gate)
    }

    pub fn enqueue(&mut self, track: QueuedTrack) -> Result<EnqueueReceipt, EnqueueError> {
        if self.torn_down {
            return Err(EnqueueError::SessionEnded);
        }
        if self.queue.len() >= self.max_queue {
            return Err(EnqueueError::QueueFull(self.max_queue));
        }
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        self.queue.push_back(Entry { id: entry_id, track });
        Ok(EnqueueReceipt {
            entry_id,
            position: self.queue.len(),
            was_idle: self.now_playing.is_none(),
        })
    }

    /// One step of the advance protocol.
    ///
    /// Pops the head into `now_playing` with a fresh stream id, or tears the
    /// session down when nothing is left. A no-op while a track is current.
    pub fn begin_next(&mut self) -> AdvanceStep {
        if self.torn_down || self.now_playing.is_some() {
            return AdvanceStep::Busy;
        }

        match self.queue.pop_front() {
            Some(Entry { id, track }) => {
                let stream_id = self.next_stream_id;
                self.next_stream_id += 1;
                self.now_playing = Some(NowPlaying {
                    track: track.clone(),
                    started_at: Utc::now(),
                    preset: self.eq_preset,
                    stream_id,
                    entry_id: id,
                    paused: false,
                });
                AdvanceStep::Start(StreamRequest {
                    guild_id: self.guild_id,
                    generation: self.generation,
                    stream_id,
                    track,
                    preset: self.eq_preset,
                })
            }
            None => {
                self.torn_down = true;
                AdvanceStep::Teardown {
                    surface: self.surface.take(),
                }
            }
        }
    }

    /// Retires the current stream if `stream_id` still names it.
    ///
    /// Returns `false` for stale or duplicate completion signals.
    pub fn finish(&mut self, stream_id: u64) -> bool {
        match &self.now_playing {
            Some(np) if np.stream_id == stream_id && !self.torn_down => {
                self.now_playing = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        !self.torn_down
            && self
                .now_playing
                .as_ref()
                .is_some_and(|np| np.stream_id == stream_id)
    }

    /// Whether the entry enqueued as `entry_id` is the one streaming now.
    pub fn is_current_entry(&self, entry_id: u64) -> bool {
        !self.torn_down
            && self
                .now_playing
                .as_ref()
                .is_some_and(|np| np.entry_id == entry_id)
    }

    pub fn set_paused(&mut self, paused: bool) {
        if let Some(np) = self.now_playing.as_mut() {
            np.paused = paused;
        }
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ShuffleOutcome {
        match self.queue.len() {
            0 if self.now_playing.is_some() => ShuffleOutcome::EmptyButPlaying,
            0 => ShuffleOutcome::NothingQueued,
            1 => ShuffleOutcome::SingleTrack,
            n => {
                self.queue.make_contiguous().shuffle(rng);
                ShuffleOutcome::Shuffled(n)
            }
        }
    }

    /// Clears everything and marks the session torn down. Idempotent.
    pub fn stop(&mut self) -> StopSummary {
        let cleared = self.queue.len();
        self.queue.clear();
        self.torn_down = true;
        StopSummary {
            now_playing: self.now_playing.take().map(|np| np.track),
            cleared,
            surface: self.surface.take(),
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.now_playing.clone(),
            tracks: self.queue.iter().map(|e| e.track.clone()).collect(),
            preset: self.eq_preset,
        }
    }
}

/// Point-in-time copy of a guild's queue for rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueSnapshot {
    pub now_playing: Option<NowPlaying>,
    pub tracks: Vec<QueuedTrack>,
    pub preset: EqPreset,
}

impl QueueSnapshot {
    pub fn total_pages(&self, per_page: usize) -> usize {
        let per_page = per_page.max(1);
        self.tracks.len().div_ceil(per_page).max(1)
    }

    /// Page numbers are 1-based and clamped into range.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage<'_> {
        let per_page = per_page.max(1);
        let total_pages = self.total_pages(per_page);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(self.tracks.len());

        QueuePage {
            items: self.tracks.get(start..end).unwrap_or_default(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct QueuePage<'a> {
    pub items: &'a [QueuedTrack],
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
