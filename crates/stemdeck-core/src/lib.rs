//! Stemdeck Core - Stem separation, chord timelines and synchronized stem playback

pub mod chords;
pub mod config;
pub mod music;
pub mod playback;
pub mod separation;
pub mod session;
pub mod storage;
pub mod timeline;
pub mod transport;
pub mod types;

pub use types::*;
