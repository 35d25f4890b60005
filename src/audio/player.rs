//! Per-guild playback orchestration.
//!
//! The [`Player`] is the only thing that mutates sessions. It locks a session
//! for one synchronous transition at a time and does all I/O (resolving,
//! starting streams, editing the now-playing message) between transitions.
//! Stream completions arrive over a channel and are applied from the
//! player's own task, never from the driver's callback context.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::audio::{
    driver::{
        Completion, CompletionReceiver, CompletionSender, CompletionTicket, PlaybackDriver,
        StreamOutcome,
    },
    preset::EqPreset,
    session::{
        AdvanceStep, EnqueueError, PlaybackState, QueueSnapshot, ShuffleOutcome, StopSummary,
        StreamRequest, SurfaceRef,
    },
    store::{SessionStore, SharedSession},
    surface::{NowPlayingView, SurfacePresenter},
    track::{QueuedTrack, TrackDescriptor},
};
use crate::sources::{classify_query, single_descriptor, QueryKind, ResolveError, TrackResolver};

/// A command that does not apply to the guild's current state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    #[error("Nothing is currently playing.")]
    NothingPlaying,
    #[error("Playback is already paused.")]
    AlreadyPaused,
    #[error("I'm not paused right now.")]
    NotPaused,
    #[error("I'm not connected to any voice channel.")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("no tracks found")]
    EmptyExpansion,
    #[error(transparent)]
    Queue(#[from] EnqueueError),
}

/// What a `play` request did, for the command reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayOutcome {
    pub track: QueuedTrack,
    /// The track became current instead of waiting in the queue.
    pub started: bool,
    pub position: usize,
    /// Entries still being resolved in the background.
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentReport {
    pub added: usize,
    pub skipped: usize,
    pub abandoned: bool,
}

pub struct Player {
    store: SessionStore,
    resolver: Arc<dyn TrackResolver>,
    driver: Arc<dyn PlaybackDriver>,
    surfaces: Arc<dyn SurfacePresenter>,
    completions: CompletionSender,
}

impl Player {
    pub fn new(
        store: SessionStore,
        resolver: Arc<dyn TrackResolver>,
        driver: Arc<dyn PlaybackDriver>,
        surfaces: Arc<dyn SurfacePresenter>,
    ) -> (Arc<Self>, CompletionReceiver) {
        let (completions, rx) = mpsc::unbounded_channel();
        let player = Arc::new(Self {
            store,
            resolver,
            driver,
            surfaces,
            completions,
        });
        (player, rx)
    }

    /// Drains stream completions for the life of the process.
    pub fn spawn_completion_loop(self: &Arc<Self>, mut rx: CompletionReceiver) -> JoinHandle<()> {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(completion) = rx.recv().await {
                let player = Arc::clone(&player);
                tokio::spawn(async move { player.handle_completion(completion).await });
            }
            debug!("Completion channel closed");
        })
    }

    pub async fn handle_completion(&self, completion: Completion) {
        let guild_id = completion.guild_id;
        match &completion.outcome {
            StreamOutcome::Finished => {
                info!("✅ Stream {} finished in guild {}", completion.stream_id, guild_id)
            }
            StreamOutcome::Failed(reason) => error!(
                "💥 Stream {} failed in guild {}: {}",
                completion.stream_id, guild_id, reason
            ),
        }

        // Stream ids restart with every session, so the generation must match too.
        let Some(session) = self.store.current(guild_id, completion.generation) else {
            debug!(
                "Completion from ended session {} in guild {} ignored",
                completion.generation, guild_id
            );
            return;
        };
        if !session.lock().finish(completion.stream_id) {
            debug!(
                "Stale completion for stream {} in guild {} ignored",
                completion.stream_id, guild_id
            );
            return;
        }

        self.advance(guild_id).await;
    }

    /// Resolves `query`, queues the first track right away and leaves the rest
    /// of a playlist or album to a background task.
    pub async fn play(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        query: &str,
    ) -> Result<PlayOutcome, PlayError> {
        let kind = classify_query(query);

        let (first, rest) = if kind.is_expansion() {
            if matches!(kind, QueryKind::Catalog(_)) && !self.resolver.catalog_available() {
                return Err(ResolveError::CatalogUnavailable.into());
            }
            let mut descriptors = self.resolver.resolve_expansion(&kind).await.into_iter();
            let first = descriptors.next().ok_or(PlayError::EmptyExpansion)?;
            (first, descriptors.collect::<Vec<_>>())
        } else {
            (single_descriptor(query), Vec::new())
        };

        let track = self.resolver.resolve_single(&first).await.map_err(|e| {
            warn!("❌ Could not resolve '{}' for guild {}: {}", first.label(), guild_id, e);
            e
        })?;

        let session = self.store.get_or_create(guild_id);
        let (receipt, generation) = {
            let mut s = session.lock();
            s.set_announce_channel(channel_id);
            (s.enqueue(track.clone())?, s.generation())
        };
        info!(
            "➕ Queued '{}' for guild {} at position {}",
            track.title(),
            guild_id,
            receipt.position
        );

        let mut started = false;
        if receipt.was_idle {
            self.advance(guild_id).await;
            // A concurrent play may have promoted its own entry first.
            started = session.lock().is_current_entry(receipt.entry_id);
        }

        let pending = rest.len();
        if !rest.is_empty() {
            let player = Arc::clone(self);
            tokio::spawn(async move {
                player.enrich(guild_id, generation, rest).await;
            });
        }

        Ok(PlayOutcome {
            track,
            started,
            position: receipt.position,
            pending,
        })
    }

    /// Resolves and appends `descriptors` one at a time, in order. Stops as
    /// soon as the session it was started for is gone.
    pub async fn enrich(
        &self,
        guild_id: GuildId,
        generation: u64,
        descriptors: Vec<TrackDescriptor>,
    ) -> EnrichmentReport {
        let total = descriptors.len();
        let mut report = EnrichmentReport::default();
        info!("🔄 Resolving {} more tracks for guild {}", total, guild_id);

        for descriptor in descriptors {
            if self.store.current(guild_id, generation).is_none() {
                report.abandoned = true;
                break;
            }

            let track = match self.resolver.resolve_single(&descriptor).await {
                Ok(track) => track,
                Err(e) => {
                    warn!(
                        "⏭️ Skipping '{}' for guild {}: {}",
                        descriptor.label(),
                        guild_id,
                        e
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            let Some(session) = self.store.current(guild_id, generation) else {
                report.abandoned = true;
                break;
            };
            let appended = session.lock().enqueue(track);
            match appended {
                Ok(receipt) => {
                    report.added += 1;
                    if receipt.was_idle {
                        self.advance(guild_id).await;
                    }
                }
                Err(EnqueueError::QueueFull(max)) => {
                    debug!("Queue for guild {} is full ({}), dropping track", guild_id, max);
                    report.skipped += 1;
                }
                Err(EnqueueError::SessionEnded) => {
                    report.abandoned = true;
                    break;
                }
            }
        }

        if report.abandoned {
            info!(
                "🛑 Session for guild {} ended, abandoned background loading after {} of {} tracks",
                guild_id, report.added, total
            );
        } else {
            info!(
                "✅ Background loading for guild {} done: {} added, {} skipped",
                guild_id, report.added, report.skipped
            );
        }
        report
    }

    /// Promotes the next queued track, skipping any the driver cannot start,
    /// or tears the session down when the queue is exhausted.
    async fn advance(&self, guild_id: GuildId) {
        let Some(session) = self.store.get(guild_id) else {
            return;
        };
        let generation = session.lock().generation();

        loop {
            let step = session.lock().begin_next();
            match step {
                AdvanceStep::Busy => return,
                AdvanceStep::Teardown { surface } => {
                    self.teardown(guild_id, generation, surface).await;
                    return;
                }
                AdvanceStep::Start(request) => {
                    let ticket = CompletionTicket::new(&request, self.completions.clone());
                    match self.driver.start(&request, ticket).await {
                        Ok(()) => {
                            info!(
                                "🎵 Now playing '{}' in guild {} ({})",
                                request.track.title(),
                                guild_id,
                                request.preset
                            );
                            if !session.lock().is_current_stream(request.stream_id) {
                                // Stopped while the stream was starting.
                                self.driver.stop(guild_id);
                                return;
                            }
                            self.refresh_surface(&session, &request).await;
                            return;
                        }
                        Err(e) => {
                            warn!(
                                "⚠️ Could not start '{}' in guild {}: {}",
                                request.track.title(),
                                guild_id,
                                e
                            );
                            session.lock().finish(request.stream_id);
                        }
                    }
                }
            }
        }
    }

    async fn teardown(&self, guild_id: GuildId, generation: u64, surface: Option<SurfaceRef>) {
        info!("📭 Queue finished in guild {}, leaving voice", guild_id);
        if let Some(surface) = surface {
            self.surfaces.dispose(surface).await;
        }
        // A newer session may already own the connection.
        if self.store.remove_generation(guild_id, generation) {
            self.driver.release(guild_id).await;
            debug!("{} guilds still have a session", self.store.len());
        }
    }

    async fn refresh_surface(&self, session: &SharedSession, request: &StreamRequest) {
        let gate = session.lock().surface_gate();
        let _guard = gate.lock().await;

        let (channel_id, existing, view) = {
            let s = session.lock();
            if !s.is_current_stream(request.stream_id) {
                return;
            }
            let Some(channel_id) = s.announce_channel() else {
                return;
            };
            let view = NowPlayingView {
                track: request.track.clone(),
                preset: request.preset,
                queue_depth: s.queue_len(),
            };
            (channel_id, s.surface(), view)
        };

        let shown = self.surfaces.show(channel_id, existing, &view).await;

        let orphan = {
            let mut s = session.lock();
            if s.is_torn_down() {
                shown
            } else {
                s.set_surface(shown);
                None
            }
        };
        if let Some(orphan) = orphan {
            self.surfaces.dispose(orphan).await;
        }
    }

    /// Stops the current stream; the completion that follows advances the queue.
    pub fn skip(&self, guild_id: GuildId) -> Result<QueuedTrack, StateViolation> {
        let session = self.store.get(guild_id).ok_or(StateViolation::NothingPlaying)?;
        let current = {
            let s = session.lock();
            match s.state() {
                PlaybackState::Playing | PlaybackState::Paused => {
                    s.now_playing().map(|np| np.track.clone())
                }
                _ => None,
            }
        }
        .ok_or(StateViolation::NothingPlaying)?;

        if !self.driver.stop(guild_id) {
            return Err(StateViolation::NothingPlaying);
        }
        info!("⏭️ Skipped '{}' in guild {}", current.title(), guild_id);
        Ok(current)
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<StopSummary, StateViolation> {
        if !self.driver.is_connected(guild_id) && self.store.get(guild_id).is_none() {
            return Err(StateViolation::NotConnected);
        }
        let summary = self.shutdown(guild_id).await;
        self.driver.release(guild_id).await;
        info!(
            "⏹️ Stopped guild {}: cleared {} queued tracks",
            guild_id, summary.cleared
        );
        Ok(summary)
    }

    /// The voice connection went away underneath us.
    pub async fn disconnected(&self, guild_id: GuildId) {
        let summary = self.shutdown(guild_id).await;
        self.driver.release(guild_id).await;
        if summary.now_playing.is_some() || summary.cleared > 0 {
            info!(
                "🔌 Disconnected from voice in guild {}, dropped {} queued tracks",
                guild_id, summary.cleared
            );
        }
    }

    async fn shutdown(&self, guild_id: GuildId) -> StopSummary {
        let summary = self
            .store
            .remove(guild_id)
            .map(|s| s.lock().stop())
            .unwrap_or_default();
        self.driver.stop(guild_id);
        if let Some(surface) = summary.surface {
            self.surfaces.dispose(surface).await;
        }
        summary
    }

    pub fn pause(&self, guild_id: GuildId) -> Result<QueuedTrack, StateViolation> {
        let session = self.store.get(guild_id).ok_or(StateViolation::NothingPlaying)?;
        let mut s = session.lock();
        match s.state() {
            PlaybackState::Playing => {}
            PlaybackState::Paused => return Err(StateViolation::AlreadyPaused),
            _ => return Err(StateViolation::NothingPlaying),
        }
        self.driver
            .pause(guild_id)
            .map_err(|_| StateViolation::NothingPlaying)?;
        s.set_paused(true);
        s.now_playing()
            .map(|np| np.track.clone())
            .ok_or(StateViolation::NothingPlaying)
    }

    pub fn resume(&self, guild_id: GuildId) -> Result<QueuedTrack, StateViolation> {
        let session = self.store.get(guild_id).ok_or(StateViolation::NothingPlaying)?;
        let mut s = session.lock();
        match s.state() {
            PlaybackState::Paused => {}
            PlaybackState::Playing => return Err(StateViolation::NotPaused),
            _ => return Err(StateViolation::NothingPlaying),
        }
        self.driver
            .resume(guild_id)
            .map_err(|_| StateViolation::NothingPlaying)?;
        s.set_paused(false);
        s.now_playing()
            .map(|np| np.track.clone())
            .ok_or(StateViolation::NothingPlaying)
    }

    pub fn shuffle(&self, guild_id: GuildId) -> ShuffleOutcome {
        match self.store.get(guild_id) {
            Some(session) => session.lock().shuffle(&mut rand::thread_rng()),
            None => ShuffleOutcome::NothingQueued,
        }
    }

    /// Takes effect from the next stream on.
    pub fn set_preset(&self, guild_id: GuildId, preset: EqPreset) {
        info!("🎛️ EQ for guild {} set to {}", guild_id, preset);
        self.store.set_preset(guild_id, preset);
    }

    pub fn preset(&self, guild_id: GuildId) -> EqPreset {
        self.store.preset_for(guild_id)
    }

    pub fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        match self.store.get(guild_id) {
            Some(session) => session.lock().snapshot(),
            None => QueueSnapshot {
                preset: self.store.preset_for(guild_id),
                ..Default::default()
            },
        }
    }

    pub fn state(&self, guild_id: GuildId) -> PlaybackState {
        self.store
            .get(guild_id)
            .map(|s| s.lock().state())
            .unwrap_or(PlaybackState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::driver::PlaybackError;
    use crate::sources::MockTrackResolver;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serenity::model::id::MessageId;
    use std::{
        collections::{HashMap, HashSet},
        sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        time::Duration,
    };

    const GUILD: GuildId = GuildId::new(42);
    const CHANNEL: ChannelId = ChannelId::new(7);

    #[derive(Default)]
    struct FakeDriver {
        started: Mutex<Vec<StreamRequest>>,
        tickets: Mutex<HashMap<GuildId, CompletionTicket>>,
        unplayable: Mutex<HashSet<String>>,
        released: AtomicUsize,
    }

    impl FakeDriver {
        fn started_titles(&self) -> Vec<String> {
            self.started
                .lock()
                .iter()
                .map(|r| r.track.title().to_string())
                .collect()
        }

        /// Lets the active stream run to its natural end.
        fn finish(&self, guild_id: GuildId) {
            if let Some(ticket) = self.tickets.lock().remove(&guild_id) {
                ticket.fire(StreamOutcome::Finished);
            }
        }
    }

    #[async_trait]
    impl PlaybackDriver for FakeDriver {
        async fn start(
            &self,
            request: &StreamRequest,
            ticket: CompletionTicket,
        ) -> Result<(), PlaybackError> {
            if self.unplayable.lock().contains(request.track.title()) {
                return Err(PlaybackError::Spawn("expired locator".into()));
            }
            self.started.lock().push(request.clone());
            self.tickets.lock().insert(request.guild_id, ticket);
            Ok(())
        }

        fn stop(&self, guild_id: GuildId) -> bool {
            match self.tickets.lock().remove(&guild_id) {
                Some(ticket) => {
                    ticket.fire(StreamOutcome::Finished);
                    true
                }
                None => false,
            }
        }

        fn pause(&self, _guild_id: GuildId) -> Result<(), PlaybackError> {
            Ok(())
        }

        fn resume(&self, _guild_id: GuildId) -> Result<(), PlaybackError> {
            Ok(())
        }

        fn is_connected(&self, _guild_id: GuildId) -> bool {
            false
        }

        async fn release(&self, _guild_id: GuildId) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeSurfaces {
        next_id: AtomicU64,
        /// Behave as if every stored message had been deleted.
        lose_existing: AtomicBool,
        shown: Mutex<Vec<NowPlayingView>>,
        disposed: Mutex<Vec<SurfaceRef>>,
    }

    #[async_trait]
    impl SurfacePresenter for FakeSurfaces {
        async fn show(
            &self,
            channel_id: ChannelId,
            existing: Option<SurfaceRef>,
            view: &NowPlayingView,
        ) -> Option<SurfaceRef> {
            self.shown.lock().push(view.clone());
            let existing = existing.filter(|_| !self.lose_existing.load(Ordering::SeqCst));
            existing.or_else(|| {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                Some(SurfaceRef {
                    channel_id,
                    message_id: MessageId::new(id),
                })
            })
        }

        async fn dispose(&self, surface: SurfaceRef) {
            self.disposed.lock().push(surface);
        }
    }

    struct Harness {
        player: Arc<Player>,
        driver: Arc<FakeDriver>,
        surfaces: Arc<FakeSurfaces>,
        rx: CompletionReceiver,
    }

    impl Harness {
        fn new(resolver: MockTrackResolver) -> Self {
            let driver = Arc::new(FakeDriver::default());
            let surfaces = Arc::new(FakeSurfaces::default());
            let (player, rx) = Player::new(
                SessionStore::new(EqPreset::Enhanced, 100),
                Arc::new(resolver),
                driver.clone(),
                surfaces.clone(),
            );
            Self {
                player,
                driver,
                surfaces,
                rx,
            }
        }

        /// Delivers every pending completion, as the completion loop would.
        async fn pump(&mut self) {
            while let Ok(completion) = self.rx.try_recv() {
                self.player.handle_completion(completion).await;
            }
        }

        fn queue_titles(&self) -> Vec<String> {
            self.player
                .snapshot(GUILD)
                .tracks
                .iter()
                .map(|t| t.title().to_string())
                .collect()
        }

        fn surface_id(&self) -> Option<MessageId> {
            self.player
                .store
                .get(GUILD)
                .and_then(|s| s.lock().surface())
                .map(|surface| surface.message_id)
        }

        fn now_playing(&self) -> Option<String> {
            self.player
                .snapshot(GUILD)
                .now_playing
                .map(|np| np.track.title().to_string())
        }
    }

    fn echo_resolver() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_single().returning(|d| {
            Ok(QueuedTrack::new(
                format!("https://cdn/{}", d.query),
                d.query.clone(),
            ))
        });
        resolver.expect_catalog_available().return_const(true);
        resolver
    }

    fn catalog_resolver(titles: &'static [&'static str]) -> MockTrackResolver {
        let mut resolver = echo_resolver();
        resolver
            .expect_resolve_expansion()
            .returning(move |_| titles.iter().map(|t| TrackDescriptor::search(*t)).collect());
        resolver
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never reached");
    }

    async fn queue_up(h: &mut Harness, titles: &[&str]) {
        for title in titles {
            h.player.play(GUILD, CHANNEL, title).await.unwrap();
        }
    }

    #[tokio::test]
    async fn play_on_idle_guild_starts_immediately() {
        let h = Harness::new(echo_resolver());
        let outcome = h.player.play(GUILD, CHANNEL, "Song A").await.unwrap();

        assert!(outcome.started);
        assert_eq!(outcome.pending, 0);
        assert_eq!(h.now_playing().as_deref(), Some("Song A"));
        assert!(h.queue_titles().is_empty());
        assert_eq!(h.driver.started_titles(), vec!["Song A"]);
        assert_eq!(h.surfaces.shown.lock().len(), 1);
    }

    #[tokio::test]
    async fn play_while_busy_only_queues() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["Song A"]).await;
        let outcome = h.player.play(GUILD, CHANNEL, "Song B").await.unwrap();

        assert!(!outcome.started);
        assert_eq!(outcome.position, 1);
        assert_eq!(h.queue_titles(), vec!["Song B"]);
        assert_eq!(h.driver.started_titles(), vec!["Song A"]);
    }

    #[tokio::test]
    async fn skip_advances_through_the_completion() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "B", "C"]).await;
        assert_eq!(h.now_playing().as_deref(), Some("A"));
        assert_eq!(h.queue_titles(), vec!["B", "C"]);

        let skipped = h.player.skip(GUILD).unwrap();
        assert_eq!(skipped.title(), "A");
        h.pump().await;

        assert_eq!(h.now_playing().as_deref(), Some("B"));
        assert_eq!(h.queue_titles(), vec!["C"]);
        // The surface is edited in place, not re-posted.
        assert_eq!(h.surfaces.next_id.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn natural_end_of_last_track_tears_down() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A"]).await;
        h.driver.finish(GUILD);
        h.pump().await;

        assert_eq!(h.player.state(GUILD), PlaybackState::Idle);
        assert_eq!(h.driver.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.surfaces.disposed.lock().len(), 1);

        // A second advance signal on the empty guild is harmless.
        h.driver.finish(GUILD);
        h.pump().await;
        assert_eq!(h.driver.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unplayable_head_is_skipped() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "X", "B", "C"]).await;
        h.driver.unplayable.lock().insert("X".into());

        h.player.skip(GUILD).unwrap();
        h.pump().await;

        assert_eq!(h.now_playing().as_deref(), Some("B"));
        assert_eq!(h.queue_titles(), vec!["C"]);
        assert_eq!(h.driver.started_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn all_unplayable_converges_to_teardown() {
        let mut h = Harness::new(echo_resolver());
        h.driver.unplayable.lock().extend(["X".to_string(), "Y".to_string()]);
        queue_up(&mut h, &["X"]).await;

        assert_eq!(h.player.state(GUILD), PlaybackState::Idle);
        assert!(h.driver.started_titles().is_empty());
        assert_eq!(h.driver.released.load(Ordering::SeqCst), 1);

        // A fresh play after teardown gets a fresh session.
        h.driver.unplayable.lock().clear();
        queue_up(&mut h, &["Z"]).await;
        assert_eq!(h.now_playing().as_deref(), Some("Z"));
    }

    #[tokio::test]
    async fn catalog_expansion_fills_queue_in_background() {
        let h = Harness::new(catalog_resolver(&["S1", "S2", "S3", "S4", "S5"]));
        let outcome = h
            .player
            .play(GUILD, CHANNEL, "https://open.spotify.com/playlist/abc")
            .await
            .unwrap();

        assert_eq!(outcome.track.title(), "S1");
        assert!(outcome.started);
        assert_eq!(outcome.pending, 4);

        wait_until(|| h.player.snapshot(GUILD).tracks.len() == 4).await;
        assert_eq!(h.now_playing().as_deref(), Some("S1"));
        assert_eq!(h.queue_titles(), vec!["S2", "S3", "S4", "S5"]);
    }

    #[tokio::test]
    async fn failed_entries_are_skipped_and_counted() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_single().returning(|d| {
            if d.query == "bad" {
                Err(ResolveError::NoResults)
            } else {
                Ok(QueuedTrack::new("https://cdn/x", d.query.clone()))
            }
        });
        let h = Harness::new(resolver);
        let session = h.player.store.get_or_create(GUILD);
        let generation = session.lock().generation();

        let report = h
            .player
            .enrich(
                GUILD,
                generation,
                vec![
                    TrackDescriptor::search("a"),
                    TrackDescriptor::search("bad"),
                    TrackDescriptor::search("b"),
                ],
            )
            .await;

        assert_eq!(
            report,
            EnrichmentReport {
                added: 2,
                skipped: 1,
                abandoned: false
            }
        );
    }

    #[tokio::test]
    async fn enrichment_stops_after_stop() {
        let h = Harness::new(echo_resolver());
        h.player.play(GUILD, CHANNEL, "A").await.unwrap();
        let generation = h.player.store.get(GUILD).unwrap().lock().generation();

        h.player.stop(GUILD).await.unwrap();
        h.player.play(GUILD, CHANNEL, "fresh").await.unwrap();

        let report = h
            .player
            .enrich(GUILD, generation, vec![TrackDescriptor::search("late")])
            .await;
        assert!(report.abandoned);
        assert_eq!(report.added, 0);
        assert!(h.queue_titles().is_empty());
        assert_eq!(h.now_playing().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn empty_expansion_is_reported() {
        let h = Harness::new(catalog_resolver(&[]));
        let result = h
            .player
            .play(GUILD, CHANNEL, "https://www.youtube.com/playlist?list=PLempty")
            .await;
        assert!(matches!(result, Err(PlayError::EmptyExpansion)));
        assert_eq!(h.player.state(GUILD), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn catalog_links_need_credentials() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_catalog_available().return_const(false);
        let h = Harness::new(resolver);
        let result = h.player.play(GUILD, CHANNEL, "spotify:track:abc").await;
        assert!(matches!(
            result,
            Err(PlayError::Resolve(ResolveError::CatalogUnavailable))
        ));
    }

    #[tokio::test]
    async fn eq_change_applies_to_the_next_stream_only() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "B"]).await;
        h.player.set_preset(GUILD, EqPreset::BassBoost);

        let snapshot = h.player.snapshot(GUILD);
        assert_eq!(snapshot.now_playing.unwrap().preset, EqPreset::Enhanced);

        h.player.skip(GUILD).unwrap();
        h.pump().await;
        let presets: Vec<EqPreset> = h.driver.started.lock().iter().map(|r| r.preset).collect();
        assert_eq!(presets, vec![EqPreset::Enhanced, EqPreset::BassBoost]);
    }

    #[tokio::test]
    async fn stop_clears_everything_and_ignores_the_late_completion() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "B", "C"]).await;

        let summary = h.player.stop(GUILD).await.unwrap();
        assert_eq!(summary.cleared, 2);
        assert_eq!(summary.now_playing.map(|t| t.title().to_string()).as_deref(), Some("A"));
        assert_eq!(h.surfaces.disposed.lock().len(), 1);

        // The stop fired A's completion; it must not start B.
        h.pump().await;
        assert_eq!(h.driver.started_titles(), vec!["A"]);
        assert_eq!(h.player.state(GUILD), PlaybackState::Idle);

        assert_eq!(h.player.stop(GUILD).await, Err(StateViolation::NotConnected));
    }

    #[tokio::test]
    async fn completion_from_a_stopped_session_does_not_touch_the_next_one() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "B"]).await;
        h.player.stop(GUILD).await.unwrap();

        // The new session reuses stream id 1 before A's completion is drained.
        queue_up(&mut h, &["fresh", "fresh2"]).await;
        h.pump().await;

        assert_eq!(h.now_playing().as_deref(), Some("fresh"));
        assert_eq!(h.queue_titles(), vec!["fresh2"]);
        assert_eq!(h.driver.started_titles(), vec!["A", "fresh"]);
        assert_eq!(h.driver.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn play_reports_queued_when_another_entry_was_promoted() {
        let h = Harness::new(echo_resolver());
        // Appended by a concurrent play that has not advanced yet.
        let session = h.player.store.get_or_create(GUILD);
        session
            .lock()
            .enqueue(QueuedTrack::new("https://cdn/other", "other"))
            .unwrap();

        let outcome = h.player.play(GUILD, CHANNEL, "mine").await.unwrap();

        assert!(!outcome.started);
        assert_eq!(outcome.position, 2);
        assert_eq!(h.now_playing().as_deref(), Some("other"));
        assert_eq!(h.queue_titles(), vec!["mine"]);
    }

    #[tokio::test]
    async fn replaced_surface_is_stored_on_the_session() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "B"]).await;
        assert_eq!(h.surface_id(), Some(MessageId::new(1)));

        h.surfaces.lose_existing.store(true, Ordering::SeqCst);
        h.player.skip(GUILD).unwrap();
        h.pump().await;

        assert_eq!(h.now_playing().as_deref(), Some("B"));
        assert_eq!(h.surface_id(), Some(MessageId::new(2)));
    }

    #[tokio::test]
    async fn pause_and_resume_enforce_state() {
        let mut h = Harness::new(echo_resolver());
        assert_eq!(h.player.pause(GUILD), Err(StateViolation::NothingPlaying));
        assert_eq!(h.player.skip(GUILD), Err(StateViolation::NothingPlaying));

        queue_up(&mut h, &["A"]).await;
        assert_eq!(h.player.resume(GUILD), Err(StateViolation::NotPaused));
        assert_eq!(h.player.pause(GUILD).unwrap().title(), "A");
        assert_eq!(h.player.state(GUILD), PlaybackState::Paused);
        assert_eq!(h.player.pause(GUILD), Err(StateViolation::AlreadyPaused));
        assert_eq!(h.player.resume(GUILD).unwrap().title(), "A");
        assert_eq!(h.player.state(GUILD), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn shuffle_leaves_now_playing_alone() {
        let mut h = Harness::new(echo_resolver());
        assert_eq!(h.player.shuffle(GUILD), ShuffleOutcome::NothingQueued);

        queue_up(&mut h, &["A", "B", "C", "D"]).await;
        assert_eq!(h.player.shuffle(GUILD), ShuffleOutcome::Shuffled(3));
        assert_eq!(h.now_playing().as_deref(), Some("A"));
        let mut queued = h.queue_titles();
        queued.sort();
        assert_eq!(queued, vec!["B", "C", "D"]);
    }

    #[tokio::test]
    async fn disconnect_drops_the_session() {
        let mut h = Harness::new(echo_resolver());
        queue_up(&mut h, &["A", "B"]).await;
        h.player.disconnected(GUILD).await;
        h.pump().await;

        assert_eq!(h.player.state(GUILD), PlaybackState::Idle);
        assert!(h.queue_titles().is_empty());
        assert_eq!(h.driver.started_titles(), vec!["A"]);
    }

    #[tokio::test]
    async fn completion_loop_drives_advance() {
        let Harness {
            player, driver, rx, ..
        } = Harness::new(echo_resolver());
        let worker = player.spawn_completion_loop(rx);

        player.play(GUILD, CHANNEL, "A").await.unwrap();
        player.play(GUILD, CHANNEL, "B").await.unwrap();
        driver.finish(GUILD);

        wait_until(|| driver.started_titles().len() == 2).await;
        let current = player.snapshot(GUILD).now_playing;
        assert_eq!(current.map(|np| np.track.title().to_string()).as_deref(), Some("B"));
        worker.abort();
    }
}
