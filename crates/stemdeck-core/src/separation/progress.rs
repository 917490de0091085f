//! Separation progress reporting
//!
//! Providers report on their own 0-100 scale. The orchestrator hands each
//! provider a [`ProgressSink`] whose window starts at the highest value the
//! caller has seen, so a fallback never moves the bar backwards.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Share of the remaining range a provider may use; the rest is reserved
/// for the orchestrator's completion event
const PROVIDER_SHARE: f32 = 0.95;

/// Progress stage during separation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparationStage {
    /// Sending audio to a backend
    Uploading,
    /// Backend or local processing
    Processing,
    /// Fetching result tracks
    Downloading,
    /// Finished, emitted once per successful call
    Complete,
}

impl fmt::Display for SeparationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Downloading => "downloading",
            Self::Complete => "complete",
        })
    }
}

/// Combined progress info
#[derive(Debug, Clone, PartialEq)]
pub struct SeparationProgress {
    pub stage: SeparationStage,
    /// Overall progress (0.0 to 100.0)
    pub progress: f32,
    /// Human-readable status message
    pub message: String,
}

impl SeparationProgress {
    pub fn new(stage: SeparationStage, progress: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
        }
    }
}

/// Callback for separation progress (uses Arc for cloneability)
pub type ProgressCallback = Arc<dyn Fn(SeparationProgress) + Send + Sync>;

/// Progress callback feeding an unbounded channel
pub fn progress_channel() -> (ProgressCallback, mpsc::UnboundedReceiver<SeparationProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ProgressCallback = Arc::new(move |p| {
        // Receiver gone means nobody is listening any more
        let _ = tx.send(p);
    });
    (callback, rx)
}

struct Shared {
    callback: Option<ProgressCallback>,
    last: Mutex<f32>,
}

/// Progress reporter handed to providers
///
/// Maps local 0-100 values into its window and keeps the caller-visible
/// value monotonic across every sink sharing the same callback.
pub struct ProgressSink {
    shared: Arc<Shared>,
    start: f32,
    end: f32,
    reached: Mutex<Option<SeparationStage>>,
}

impl ProgressSink {
    /// Sink covering the full 0-100 range
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            shared: Arc::new(Shared {
                callback,
                last: Mutex::new(0.0),
            }),
            start: 0.0,
            end: 100.0,
            reached: Mutex::new(None),
        }
    }

    /// Sink that discards everything
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Highest progress value emitted so far
    pub fn last(&self) -> f32 {
        *lock(&self.shared.last)
    }

    /// Last stage reported through this sink
    pub fn stage_reached(&self) -> Option<SeparationStage> {
        *lock(&self.reached)
    }

    /// Window for the next provider: `[floor, floor + (100 - floor) * 0.95]`
    pub fn provider_window(&self) -> ProgressSink {
        let floor = self.last();
        ProgressSink {
            shared: Arc::clone(&self.shared),
            start: floor,
            end: floor + (100.0 - floor) * PROVIDER_SHARE,
            reached: Mutex::new(None),
        }
    }

    /// Report local progress (0-100) within this sink's window
    ///
    /// `Complete` is reported as `Downloading`; only [`ProgressSink::emit`]
    /// may signal completion.
    pub fn report(&self, stage: SeparationStage, local: f32, message: impl Into<String>) {
        let stage = match stage {
            SeparationStage::Complete => SeparationStage::Downloading,
            other => other,
        };
        *lock(&self.reached) = Some(stage);
        let local = local.clamp(0.0, 100.0);
        let value = self.start + (self.end - self.start) * local / 100.0;
        self.emit(stage, value, message);
    }

    /// Emit an absolute progress value, clamped so it never goes backwards
    pub fn emit(&self, stage: SeparationStage, progress: f32, message: impl Into<String>) {
        let progress = {
            let mut last = lock(&self.shared.last);
            // f32::max ignores NaN
            let value = progress.max(*last).min(100.0);
            *last = value;
            value
        };
        let event = SeparationProgress::new(stage, progress, message);
        log::debug!("Separation progress: {:?} {:.1}% {}", event.stage, event.progress, event.message);
        if let Some(ref cb) = self.shared.callback {
            cb(event);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
