//! Audio transport capability
//!
//! One player per loaded file. The playback coordinator drives several
//! players in lockstep through this trait; the platform decides how audio
//! actually reaches the output device.

mod memory;

pub use memory::{MemoryTransport, TransportOp};

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Opaque identifier for a loaded player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerHandle(pub u64);

/// Options applied when a player is created
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Initial volume (0.0 to 1.0)
    pub initial_volume: f32,
    pub looping: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            looping: false,
        }
    }
}

/// Snapshot of one player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStatus {
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub volume: f32,
}

impl PlayerStatus {
    /// Stopped at (or past) the end of the track
    pub fn finished(&self) -> bool {
        !self.is_playing && self.duration_ms > 0 && self.position_ms >= self.duration_ms
    }
}

/// Errors reported by a transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Unknown player handle {0:?}")]
    UnknownHandle(PlayerHandle),

    #[error("Audio device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Per-file audio players
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Create a paused player at position 0
    async fn load(&self, uri: &Path, options: LoadOptions) -> Result<PlayerHandle>;

    async fn play(&self, handle: PlayerHandle) -> Result<()>;

    async fn pause(&self, handle: PlayerHandle) -> Result<()>;

    async fn seek(&self, handle: PlayerHandle, position_ms: u64) -> Result<()>;

    /// Set volume (0.0 to 1.0)
    async fn set_volume(&self, handle: PlayerHandle, volume: f32) -> Result<()>;

    async fn set_loop(&self, handle: PlayerHandle, looping: bool) -> Result<()>;

    async fn status(&self, handle: PlayerHandle) -> Result<PlayerStatus>;

    /// Release the player; the handle is invalid afterwards
    async fn unload(&self, handle: PlayerHandle) -> Result<()>;
}
