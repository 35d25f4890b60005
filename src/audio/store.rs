use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::debug;

use crate::audio::{preset::EqPreset, session::GuildSession};

pub type SharedSession = Arc<Mutex<GuildSession>>;

/// Process-wide map from guild to its live session.
///
/// Sessions for different guilds never share a lock. The EQ choice of a guild
/// outlives its sessions, so it is kept here and copied into each new one.
pub struct SessionStore {
    sessions: DashMap<GuildId, SharedSession>,
    presets: DashMap<GuildId, EqPreset>,
    generations: AtomicU64,
    default_preset: EqPreset,
    max_queue: usize,
}

impl SessionStore {
    pub fn new(default_preset: EqPreset, max_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            presets: DashMap::new(),
            generations: AtomicU64::new(1),
            default_preset,
            max_queue,
        }
    }

    /// Never fails; creates an empty session when the guild has none, or
    /// replaces one that has already torn down but not yet been removed.
    pub fn get_or_create(&self, guild_id: GuildId) -> SharedSession {
        let mut entry = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| self.fresh(guild_id));
        if entry.lock().is_torn_down() {
            *entry = self.fresh(guild_id);
        }
        entry.clone()
    }

    fn fresh(&self, guild_id: GuildId) -> SharedSession {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        debug!("🆕 Session generation {} for guild {}", generation, guild_id);
        Arc::new(Mutex::new(GuildSession::new(
            guild_id,
            generation,
            self.preset_for(guild_id),
            self.max_queue,
        )))
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedSession> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Idempotent.
    pub fn remove(&self, guild_id: GuildId) -> Option<SharedSession> {
        self.sessions.remove(&guild_id).map(|(_, s)| s)
    }

    /// Removes the guild's session only if it is still `generation`.
    pub fn remove_generation(&self, guild_id: GuildId, generation: u64) -> bool {
        self.sessions
            .remove_if(&guild_id, |_, s| s.lock().generation() == generation)
            .is_some()
    }

    /// The guild's live session, if it is still `generation`.
    pub fn current(&self, guild_id: GuildId, generation: u64) -> Option<SharedSession> {
        self.get(guild_id)
            .filter(|s| s.lock().generation() == generation)
    }

    pub fn preset_for(&self, guild_id: GuildId) -> EqPreset {
        self.presets
            .get(&guild_id)
            .map(|p| *p)
            .unwrap_or(self.default_preset)
    }

    /// Records the guild's choice and applies it to the live session, if any.
    pub fn set_preset(&self, guild_id: GuildId, preset: EqPreset) {
        self.presets.insert(guild_id, preset);
        if let Some(session) = self.get(guild_id) {
            session.lock().set_eq_preset(preset);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
