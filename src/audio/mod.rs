//! # Audio Module
//!
//! Per-guild playback: the queue state machine, the player that drives it,
//! and the boundary to the voice transport.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - Queue, current track and EQ choice of one guild
//! - Synchronous transitions only; never locked across an await
//!
//! ### [`store`] - Session Store
//! - Guild to session map with generation numbers
//! - Remembers each guild's EQ preset between sessions
//!
//! ### [`player`] - Player
//! - Enqueue orchestration and background playlist loading
//! - The advance loop and the completion dispatcher
//! - Skip, stop, pause, resume, shuffle
//!
//! ### [`driver`] - Playback Driver
//! - songbird + ffmpeg transport with one-shot completion tickets
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo
//! - **Encoding**: Opus in Ogg, 256-320kbps depending on the preset

pub mod driver;
pub mod player;
pub mod preset;
pub mod session;
pub mod store;
pub mod surface;
pub mod track;
