//! Time-indexed segment lookup
//!
//! Maps a playback position to the active entry of an ordered list of
//! time-stamped segments. Used for the chord display and for anything else
//! keyed by playback position.
//!
//! Lookups are stateless binary searches, so seeking backwards is as cheap
//! and as correct as playing forwards.

use thiserror::Error;

/// Anything that starts at a fixed position on the playback clock
pub trait TimeStamped {
    /// Start time in milliseconds
    fn time_ms(&self) -> u64;
}

/// A payload that becomes active at `time_ms`
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<T> {
    pub time_ms: u64,
    pub payload: T,
}

impl<T> Segment<T> {
    pub fn new(time_ms: u64, payload: T) -> Self {
        Self { time_ms, payload }
    }
}

impl<T> TimeStamped for Segment<T> {
    fn time_ms(&self) -> u64 {
        self.time_ms
    }
}

/// Index of the segment active at `position_ms`
///
/// Returns the largest `i` with `position_ms >= segments[i].time_ms`, or
/// `None` if the list is empty or the position is before the first segment.
/// `segments` must be sorted ascending by time.
pub fn active_index<S: TimeStamped>(segments: &[S], position_ms: u64) -> Option<usize> {
    // Count of segments starting at or before the position
    let started = segments.partition_point(|s| s.time_ms() <= position_ms);
    started.checked_sub(1)
}

/// Errors building a [`Timeline`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimelineError {
    #[error("Segment {index} at {time_ms}ms is not after the previous segment at {previous_ms}ms")]
    OutOfOrder {
        index: usize,
        time_ms: u64,
        previous_ms: u64,
    },
}

/// Validated, immutable sequence of segments
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline<T> {
    segments: Vec<Segment<T>>,
}

impl<T> Timeline<T> {
    /// Build a timeline, rejecting unsorted or duplicate start times
    pub fn new(segments: Vec<Segment<T>>) -> Result<Self, TimelineError> {
        check_ascending(&segments)?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment<T>] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn active_index(&self, position_ms: u64) -> Option<usize> {
        active_index(&self.segments, position_ms)
    }

    /// Segment active at `position_ms`
    pub fn active(&self, position_ms: u64) -> Option<&Segment<T>> {
        self.active_index(position_ms).map(|i| &self.segments[i])
    }

    /// Up to `count` segments after the active one
    ///
    /// Before the first segment, the upcoming segments start at index 0.
    pub fn upcoming(&self, position_ms: u64, count: usize) -> &[Segment<T>] {
        upcoming(&self.segments, position_ms, count)
    }
}

/// Up to `count` items following the one active at `position_ms`
pub fn upcoming<S: TimeStamped>(items: &[S], position_ms: u64, count: usize) -> &[S] {
    let start = active_index(items, position_ms).map_or(0, |i| i + 1);
    let end = (start + count).min(items.len());
    &items[start..end]
}

/// Verify strictly ascending start times
pub fn check_ascending<S: TimeStamped>(items: &[S]) -> Result<(), TimelineError> {
    for (index, pair) in items.windows(2).enumerate() {
        if pair[1].time_ms() <= pair[0].time_ms() {
            return Err(TimelineError::OutOfOrder {
                index: index + 1,
                time_ms: pair[1].time_ms(),
                previous_ms: pair[0].time_ms(),
            });
        }
    }
    Ok(())
}
