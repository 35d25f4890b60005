//! Audio transport boundary.
//!
//! A [`PlaybackDriver`] streams one track per guild into an established voice
//! connection. When that stream ends, for any reason, the driver signals
//! through the [`CompletionTicket`] it was handed: exactly once, eventually,
//! possibly from songbird's own event task. The ticket only enqueues a
//! [`Completion`]; the player drains those on its own task before touching
//! any session state.

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use songbird::{
    input::{ChildContainer, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audio::session::StreamRequest;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no voice connection for this guild")]
    NotConnected,
    #[error("no active stream")]
    NoStream,
    #[error("could not start the audio pipeline: {0}")]
    Spawn(String),
    #[error("track control failed: {0}")]
    Track(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub guild_id: GuildId,
    pub generation: u64,
    pub stream_id: u64,
    pub outcome: StreamOutcome,
}

pub type CompletionSender = mpsc::UnboundedSender<Completion>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

/// One-shot completion signal for a single stream. Clones share the shot.
#[derive(Debug, Clone)]
pub struct CompletionTicket {
    guild_id: GuildId,
    generation: u64,
    stream_id: u64,
    fired: Arc<AtomicBool>,
    tx: CompletionSender,
}

impl CompletionTicket {
    pub fn new(request: &StreamRequest, tx: CompletionSender) -> Self {
        Self {
            guild_id: request.guild_id,
            generation: request.generation,
            stream_id: request.stream_id,
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Returns `false` if this stream already signalled.
    pub fn fire(&self, outcome: StreamOutcome) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let completion = Completion {
            guild_id: self.guild_id,
            generation: self.generation,
            stream_id: self.stream_id,
            outcome,
        };
        if self.tx.send(completion).is_err() {
            debug!("Completion receiver gone, dropping signal for guild {}", self.guild_id);
        }
        true
    }
}

#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    /// Begins streaming `request` and arranges for `ticket` to fire when it ends.
    ///
    /// An `Err` means nothing is streaming and the ticket will never fire.
    async fn start(&self, request: &StreamRequest, ticket: CompletionTicket)
        -> Result<(), PlaybackError>;

    /// Stops the active stream; its ticket fires. Returns `false` if none was active.
    fn stop(&self, guild_id: GuildId) -> bool;

    fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError>;

    fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError>;

    fn is_connected(&self, guild_id: GuildId) -> bool;

    /// Drops the voice connection. Best effort.
    async fn release(&self, guild_id: GuildId);
}

/// Songbird transport: ffmpeg applies the EQ profile and pipes Ogg/Opus in.
pub struct SongbirdDriver {
    manager: Arc<Songbird>,
    ffmpeg_path: String,
    handles: DashMap<GuildId, TrackHandle>,
}

impl SongbirdDriver {
    pub fn new(manager: Arc<Songbird>, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            manager,
            ffmpeg_path: ffmpeg_path.into(),
            handles: DashMap::new(),
        }
    }

    fn spawn_pipeline(&self, request: &StreamRequest) -> Result<Input, PlaybackError> {
        let child = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlaybackError::Spawn(e.to_string()))?;

        Ok(Input::from(ChildContainer::from(child)))
    }

    fn with_handle<F, E>(&self, guild_id: GuildId, f: F) -> Result<(), PlaybackError>
    where
        F: FnOnce(&TrackHandle) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let handle = self.handles.get(&guild_id).ok_or(PlaybackError::NoStream)?;
        f(&handle).map_err(|e| PlaybackError::Track(e.to_string()))
    }
}

/// Full ffmpeg command line for one stream, input reconnects included.
pub fn ffmpeg_args(request: &StreamRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
        "-i",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(request.track.audio_reference().to_string());
    args.extend(request.preset.ffmpeg_output_args());
    args.extend(["-c:a", "libopus", "-f", "ogg", "pipe:1"].map(String::from));
    args
}

#[async_trait]
impl PlaybackDriver for SongbirdDriver {
    async fn start(
        &self,
        request: &StreamRequest,
        ticket: CompletionTicket,
    ) -> Result<(), PlaybackError> {
        let call = self
            .manager
            .get(request.guild_id)
            .ok_or(PlaybackError::NotConnected)?;
        let input = self.spawn_pipeline(request)?;

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        let notifier = StreamNotifier { ticket };
        let registered = handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .and_then(|_| handle.add_event(Event::Track(TrackEvent::Error), notifier));
        if let Err(e) = registered {
            let _ = handle.stop();
            return Err(PlaybackError::Track(e.to_string()));
        }

        self.handles.insert(request.guild_id, handle);
        Ok(())
    }

    fn stop(&self, guild_id: GuildId) -> bool {
        match self.handles.remove(&guild_id) {
            Some((_, handle)) => handle.stop().is_ok(),
            None => false,
        }
    }

    fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.with_handle(guild_id, |h| h.pause())
    }

    fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.with_handle(guild_id, |h| h.play())
    }

    fn is_connected(&self, guild_id: GuildId) -> bool {
        self.manager.get(guild_id).is_some()
    }

    async fn release(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.handles.remove(&guild_id) {
            let _ = handle.stop();
        }
        if let Err(e) = self.manager.remove(guild_id).await {
            debug!("Voice connection for guild {} already gone: {:?}", guild_id, e);
        }
    }
}

/// Bridges songbird's track events to the stream's completion ticket.
#[derive(Clone)]
struct StreamNotifier {
    ticket: CompletionTicket,
}

#[async_trait]
impl VoiceEventHandler for StreamNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(StreamOutcome::Failed(format!("{:?}", e))),
                    _ => None,
                })
                .unwrap_or(StreamOutcome::Finished),
            _ => StreamOutcome::Finished,
        };

        if !self.ticket.fire(outcome) {
            warn!(
                "Duplicate end signal for stream {} ignored",
                self.ticket.stream_id()
            );
        }

        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{preset::EqPreset, track::QueuedTrack};

    fn request(preset: EqPreset) -> StreamRequest {
        StreamRequest {
            guild_id: GuildId::new(1),
            generation: 3,
            stream_id: 9,
            track: QueuedTrack::new("https://cdn.example/audio", "A"),
            preset,
        }
    }

    #[test]
    fn ticket_fires_once_across_clones() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = CompletionTicket::new(&request(EqPreset::Default), tx);
        let twin = ticket.clone();

        assert!(ticket.fire(StreamOutcome::Finished));
        assert!(!twin.fire(StreamOutcome::Failed("late".into())));

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.generation, 3);
        assert_eq!(completion.stream_id, 9);
        assert_eq!(completion.outcome, StreamOutcome::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ffmpeg_args_put_profile_after_input() {
        let args = ffmpeg_args(&request(EqPreset::BassBoost));
        let input_at = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input_at + 1], "https://cdn.example/audio");

        let af_at = args.iter().position(|a| a == "-af").unwrap();
        assert!(af_at > input_at);
        assert!(args[af_at + 1].starts_with("equalizer=f=60"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }
}
