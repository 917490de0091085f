//! Clock-driven in-memory transport
//!
//! Players advance with `tokio::time`, so tests running on a paused clock
//! see exact positions. No audio is produced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{AudioTransport, LoadOptions, PlayerHandle, PlayerStatus, Result, TransportError};

/// Default length of a loaded file when none was configured
const DEFAULT_DURATION_MS: u64 = 180_000;

/// Transport operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Load,
    Play,
    Pause,
    Seek,
    SetVolume,
    SetLoop,
    Status,
    Unload,
}

#[derive(Debug)]
struct Player {
    uri: PathBuf,
    /// Position at `started_at` (or the current position when paused)
    base_ms: u64,
    started_at: Option<Instant>,
    duration_ms: u64,
    volume: f32,
    looping: bool,
}

impl Player {
    /// Current position, stopping at the end unless looping
    fn sync(&mut self) -> u64 {
        if let Some(started) = self.started_at {
            let elapsed = started.elapsed().as_millis() as u64;
            let pos = self.base_ms + elapsed;
            if pos >= self.duration_ms {
                if self.looping && self.duration_ms > 0 {
                    self.base_ms = pos % self.duration_ms;
                    self.started_at = Some(Instant::now());
                } else {
                    self.base_ms = self.duration_ms;
                    self.started_at = None;
                }
            } else {
                return pos;
            }
        }
        self.base_ms
    }

    fn status(&mut self) -> PlayerStatus {
        let position_ms = self.sync();
        PlayerStatus {
            position_ms,
            duration_ms: self.duration_ms,
            is_playing: self.started_at.is_some(),
            volume: self.volume,
        }
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    players: HashMap<PlayerHandle, Player>,
    durations: HashMap<PathBuf, u64>,
    failures: Vec<(TransportOp, PathBuf)>,
    ops: u64,
}

/// In-memory [`AudioTransport`]
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration reported for `uri` when it is next loaded
    pub fn set_duration(&self, uri: impl Into<PathBuf>, duration_ms: u64) {
        self.lock().durations.insert(uri.into(), duration_ms);
    }

    /// Make `op` fail for players loaded from `uri`
    pub fn fail_on(&self, op: TransportOp, uri: impl Into<PathBuf>) {
        self.lock().failures.push((op, uri.into()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Status of the live player loaded from `uri`
    pub fn status_of(&self, uri: &Path) -> Option<PlayerStatus> {
        let mut inner = self.lock();
        inner
            .players
            .values_mut()
            .find(|p| p.uri == uri)
            .map(Player::status)
    }

    /// Number of live players
    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    /// Total operations attempted, including failed ones
    pub fn op_count(&self) -> u64 {
        self.lock().ops
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock can't leave players half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` on a player unless a failure is injected for it
    fn with_player<T>(
        &self,
        op: TransportOp,
        handle: PlayerHandle,
        f: impl FnOnce(&mut Player) -> T,
    ) -> Result<T> {
        let mut inner = self.lock();
        inner.ops += 1;
        let Inner {
            players, failures, ..
        } = &mut *inner;
        let player = players
            .get_mut(&handle)
            .ok_or(TransportError::UnknownHandle(handle))?;
        if failures.iter().any(|(o, uri)| *o == op && *uri == player.uri) {
            return Err(TransportError::Device(format!(
                "{:?} failed for {}",
                op,
                player.uri.display()
            )));
        }
        Ok(f(player))
    }
}

#[async_trait]
impl AudioTransport for MemoryTransport {
    async fn load(&self, uri: &Path, options: LoadOptions) -> Result<PlayerHandle> {
        let mut inner = self.lock();
        inner.ops += 1;
        if inner
            .failures
            .iter()
            .any(|(o, u)| *o == TransportOp::Load && u == uri)
        {
            return Err(TransportError::Device(format!(
                "cannot open {}",
                uri.display()
            )));
        }

        inner.next_id += 1;
        let handle = PlayerHandle(inner.next_id);
        let duration_ms = inner
            .durations
            .get(uri)
            .copied()
            .unwrap_or(DEFAULT_DURATION_MS);
        inner.players.insert(
            handle,
            Player {
                uri: uri.to_path_buf(),
                base_ms: 0,
                started_at: None,
                duration_ms,
                volume: options.initial_volume.clamp(0.0, 1.0),
                looping: options.looping,
            },
        );
        Ok(handle)
    }

    async fn play(&self, handle: PlayerHandle) -> Result<()> {
        self.with_player(TransportOp::Play, handle, |p| {
            let pos = p.sync();
            if p.started_at.is_none() && (pos < p.duration_ms || p.looping) {
                p.base_ms = pos;
                p.started_at = Some(Instant::now());
            }
        })
    }

    async fn pause(&self, handle: PlayerHandle) -> Result<()> {
        self.with_player(TransportOp::Pause, handle, |p| {
            p.base_ms = p.sync();
            p.started_at = None;
        })
    }

    async fn seek(&self, handle: PlayerHandle, position_ms: u64) -> Result<()> {
        self.with_player(TransportOp::Seek, handle, |p| {
            p.sync();
            p.base_ms = position_ms.min(p.duration_ms);
            if p.started_at.is_some() {
                p.started_at = Some(Instant::now());
            }
        })
    }

    async fn set_volume(&self, handle: PlayerHandle, volume: f32) -> Result<()> {
        self.with_player(TransportOp::SetVolume, handle, |p| {
            p.volume = volume.clamp(0.0, 1.0);
        })
    }

    async fn set_loop(&self, handle: PlayerHandle, looping: bool) -> Result<()> {
        self.with_player(TransportOp::SetLoop, handle, |p| {
            p.sync();
            p.looping = looping;
        })
    }

    async fn status(&self, handle: PlayerHandle) -> Result<PlayerStatus> {
        self.with_player(TransportOp::Status, handle, Player::status)
    }

    async fn unload(&self, handle: PlayerHandle) -> Result<()> {
        self.with_player(TransportOp::Unload, handle, |_| ())?;
        self.lock().players.remove(&handle);
        Ok(())
    }
}
