//! Playback sync coordinator

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::{PlaybackError, Result};
use super::state::{CoordinatorState, PlaybackAtomics, PlaybackSnapshot, StemPlaybackState};
use super::PlaybackConfig;
use crate::separation::SeparatedTracks;
use crate::transport::{AudioTransport, LoadOptions, PlayerHandle, TransportError};
use crate::types::Stem;

/// Keeps one transport player per stem in lockstep
///
/// The state lock is never held across an `.await`, so calls touching
/// different stems never wait on each other. Concurrent calls on the same
/// stem resolve last-write-wins by completion order.
pub struct PlaybackSyncCoordinator {
    transport: Arc<dyn AudioTransport>,
    config: PlaybackConfig,
    state: Arc<Mutex<CoordinatorState>>,
    atomics: Arc<PlaybackAtomics>,
    drift_task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn transport_err(op: &'static str, stem: Stem) -> impl FnOnce(TransportError) -> PlaybackError {
    move |source| PlaybackError::Transport { op, stem, source }
}

/// First error of a fan-out, after every future has completed
fn first_error(results: Vec<Result<()>>) -> Result<()> {
    results.into_iter().find(|r| r.is_err()).unwrap_or(Ok(()))
}

impl PlaybackSyncCoordinator {
    pub fn new(transport: Arc<dyn AudioTransport>, mut config: PlaybackConfig) -> Self {
        config.validate();
        Self {
            transport,
            config,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            atomics: Arc::new(PlaybackAtomics::default()),
            drift_task: Mutex::new(None),
        }
    }

    /// Lock-free position/playing state for UI reads
    pub fn atomics(&self) -> Arc<PlaybackAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Shared playhead position
    pub fn position_ms(&self) -> u64 {
        self.atomics.position_ms()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).is_playing
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let state = lock(&self.state);
        PlaybackSnapshot {
            position_ms: self.atomics.position_ms(),
            duration_ms: self.atomics.duration_ms(),
            is_playing: state.is_playing,
            reference: state.reference,
            stems: state.stems.values().cloned().collect(),
        }
    }

    /// Load one player per stem, replacing the current stems
    ///
    /// All players are created concurrently, paused at position 0, vocals
    /// at full volume and everything else silent. If any load fails the new
    /// players are released and the previous stems stay in place.
    pub async fn load_stems(&self, tracks: &SeparatedTracks) -> Result<()> {
        if tracks.is_empty() {
            return Err(PlaybackError::NothingLoaded);
        }

        let loads = tracks.iter().map(|(stem, path)| {
            let options = LoadOptions {
                initial_volume: self.config.initial_volume(stem),
                looping: false,
            };
            async move { (stem, self.transport.load(path, options).await) }
        });
        let results = join_all(loads).await;

        let mut loaded = Vec::with_capacity(results.len());
        let mut failure = None;
        for (stem, result) in results {
            match result {
                Ok(handle) => loaded.push((stem, handle)),
                Err(source) if failure.is_none() => failure = Some(PlaybackError::Load { stem, source }),
                Err(e) => log::warn!("Failed to load {} stem: {}", stem, e),
            }
        }
        if let Some(err) = failure {
            self.release(&loaded).await;
            return Err(err);
        }

        let statuses = join_all(loaded.iter().map(|(_, h)| self.transport.status(*h))).await;
        let duration_ms = statuses
            .into_iter()
            .filter_map(|s| s.ok())
            .map(|s| s.duration_ms)
            .max()
            .unwrap_or(0);

        self.stop_drift();
        let previous = {
            let mut state = lock(&self.state);
            let previous = state.handles();
            state.stems = loaded
                .iter()
                .map(|&(stem, handle)| {
                    let volume = self.config.initial_volume(stem);
                    (stem, StemPlaybackState::new(stem, volume, handle))
                })
                .collect();
            state.reference = None;
            state.is_playing = false;
            previous
        };
        self.atomics.reset(duration_ms);
        self.release(&previous).await;

        log::info!("Loaded {} stems ({} ms)", loaded.len(), duration_ms);
        Ok(())
    }

    /// Start every stem from the shared position
    ///
    /// Each player is positioned, given its effective volume and started.
    /// On any failure every stem is paused and playback stays stopped.
    pub async fn play_all(&self) -> Result<()> {
        let (position, players) = {
            let mut state = lock(&self.state);
            if state.stems.is_empty() {
                return Err(PlaybackError::NothingLoaded);
            }
            state.is_playing = true;
            let players: Vec<(Stem, PlayerHandle, f32)> = state
                .stems
                .values()
                .filter_map(|s| s.handle.map(|h| (s.stem, h, s.effective_volume())))
                .collect();
            (self.atomics.position_ms(), players)
        };
        self.atomics.set_playing(true);
        self.atomics.set_finished(false);

        let starts = players.iter().map(|&(stem, handle, volume)| async move {
            self.transport
                .seek(handle, position)
                .await
                .map_err(transport_err("seek", stem))?;
            self.transport
                .set_volume(handle, volume)
                .await
                .map_err(transport_err("set volume of", stem))?;
            self.transport
                .play(handle)
                .await
                .map_err(transport_err("play", stem))
        });

        if let Err(e) = first_error(join_all(starts).await) {
            log::warn!("Playback start failed, pausing all stems: {}", e);
            lock(&self.state).is_playing = false;
            self.atomics.set_playing(false);
            let pauses = players.iter().map(|&(_, h, _)| self.transport.pause(h));
            for result in join_all(pauses).await {
                if let Err(pause_err) = result {
                    log::warn!("Failed to pause after start failure: {}", pause_err);
                }
            }
            return Err(e);
        }

        self.start_drift();
        Ok(())
    }

    /// Pause every stem and settle the shared position on the reference stem
    pub async fn pause_all(&self) -> Result<()> {
        self.stop_drift();
        let players = {
            let mut state = lock(&self.state);
            state.is_playing = false;
            state.handles()
        };
        self.atomics.set_playing(false);

        let pauses = players.iter().map(|&(stem, handle)| async move {
            self.transport
                .pause(handle)
                .await
                .map_err(transport_err("pause", stem))
        });
        let result = first_error(join_all(pauses).await);

        let (reference, generation) = {
            let mut state = lock(&self.state);
            (state.select_reference(&[]), state.seek_generation)
        };
        if let Some((stem, handle)) = reference {
            match self.transport.status(handle).await {
                Ok(status) => {
                    publish(&self.state, &self.atomics, stem, status.position_ms, generation);
                }
                Err(e) => log::warn!("Could not read {} position after pause: {}", stem, e),
            }
        }
        result
    }

    /// Move every stem to `position_ms`
    ///
    /// The shared position changes before any player is touched, so readers
    /// see the new value immediately. Returns once every player has seeked.
    ///
    /// A drift sample already in flight is dropped instead of moving the
    /// playhead back to where it was before the seek.
    pub async fn seek_all(&self, position_ms: u64) -> Result<()> {
        let players = {
            let mut state = lock(&self.state);
            state.seek_generation += 1;
            self.atomics.set_position(position_ms);
            self.atomics.set_finished(false);
            for s in state.stems.values_mut() {
                s.last_known_position_ms = position_ms;
            }
            state.handles()
        };

        let seeks = players.iter().map(|&(stem, handle)| async move {
            self.transport
                .seek(handle, position_ms)
                .await
                .map_err(transport_err("seek", stem))
        });
        first_error(join_all(seeks).await)
    }

    /// Set a stem's volume (clamped to 0.0..=1.0)
    ///
    /// A muted stem stores the value and stays silent until unmuted.
    pub async fn set_stem_volume(&self, stem: Stem, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        let target = {
            let mut state = lock(&self.state);
            let s = state
                .stems
                .get_mut(&stem)
                .ok_or(PlaybackError::UnknownStem(stem))?;
            s.volume = volume;
            if s.muted {
                None
            } else {
                s.handle
            }
        };

        if let Some(handle) = target {
            self.transport
                .set_volume(handle, volume)
                .await
                .map_err(transport_err("set volume of", stem))?;
        }
        Ok(())
    }

    /// Flip a stem's mute, returning the new muted state
    pub async fn toggle_mute(&self, stem: Stem) -> Result<bool> {
        let (muted, effective, handle) = {
            let mut state = lock(&self.state);
            let s = state
                .stems
                .get_mut(&stem)
                .ok_or(PlaybackError::UnknownStem(stem))?;
            s.muted = !s.muted;
            (s.muted, s.effective_volume(), s.handle)
        };

        if let Some(handle) = handle {
            if let Err(source) = self.transport.set_volume(handle, effective).await {
                if let Some(s) = lock(&self.state).stems.get_mut(&stem) {
                    s.muted = !muted;
                }
                return Err(PlaybackError::Transport {
                    op: if muted { "mute" } else { "unmute" },
                    stem,
                    source,
                });
            }
        }
        Ok(muted)
    }

    /// Release every player, e.g. when leaving the separation view
    pub async fn unload_all(&self) {
        self.stop_drift();
        let previous = {
            let mut state = lock(&self.state);
            let previous = state.handles();
            state.stems.clear();
            state.reference = None;
            state.is_playing = false;
            previous
        };
        self.atomics.reset(0);
        self.release(&previous).await;
    }

    /// Unload players best-effort
    async fn release(&self, players: &[(Stem, PlayerHandle)]) {
        let unloads = players.iter().map(|&(_, h)| self.transport.unload(h));
        for (result, (stem, _)) in join_all(unloads).await.into_iter().zip(players) {
            if let Err(e) = result {
                log::warn!("Failed to unload {} stem: {}", stem, e);
            }
        }
    }

    fn start_drift(&self) {
        let interval = Duration::from_millis(self.config.drift_interval_ms);
        let task = tokio::spawn(drift_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.state),
            Arc::clone(&self.atomics),
            interval,
        ));
        if let Some(old) = lock(&self.drift_task).replace(task) {
            old.abort();
        }
    }

    fn stop_drift(&self) {
        if let Some(task) = lock(&self.drift_task).take() {
            task.abort();
        }
    }
}

impl Drop for PlaybackSyncCoordinator {
    fn drop(&mut self) {
        self.stop_drift();
    }
}

/// Store a sampled reference position unless a seek superseded it
fn publish(
    state: &Mutex<CoordinatorState>,
    atomics: &PlaybackAtomics,
    stem: Stem,
    position_ms: u64,
    generation: u64,
) -> bool {
    let mut state = lock(state);
    if !state.record_sample(stem, position_ms, generation) {
        log::debug!("Dropped {} sample of {} ms taken before a seek", stem, position_ms);
        return false;
    }
    atomics.set_position(position_ms);
    true
}

/// Sample the reference stem until playback stops
async fn drift_loop(
    transport: Arc<dyn AudioTransport>,
    state: Arc<Mutex<CoordinatorState>>,
    atomics: Arc<PlaybackAtomics>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failed: Vec<Stem> = Vec::new();

    loop {
        ticker.tick().await;

        let (reference, generation) = {
            let mut s = lock(&state);
            if !s.is_playing {
                break;
            }
            let reference = match s.select_reference(&failed) {
                Some(r) => Some(r),
                None => {
                    // Every stem failed once; give them another chance
                    failed.clear();
                    s.select_reference(&failed)
                }
            };
            (reference, s.seek_generation)
        };
        let Some((stem, handle)) = reference else {
            break;
        };

        match transport.status(handle).await {
            Ok(status) => {
                if !publish(&state, &atomics, stem, status.position_ms, generation) {
                    continue;
                }
                log::debug!("Drift sample from {}: {} ms", stem, status.position_ms);
                if status.finished() {
                    log::info!("Playback reached the end of the track");
                    lock(&state).is_playing = false;
                    atomics.set_playing(false);
                    atomics.set_finished(true);
                    break;
                }
            }
            Err(e) => {
                log::warn!("Reference stem {} stopped responding: {}", stem, e);
                failed.push(stem);
                lock(&state).reference = None;
            }
        }
    }
}
