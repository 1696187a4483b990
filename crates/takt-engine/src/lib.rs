//! Real-time MIDI track sequencing.
//!
//! An [`Engine`] advances a set of [`Track`]s from the audio callback:
//! each call to [`Engine::process`] converts one buffer's worth of
//! queued musical content into offset-stamped MIDI messages. Content
//! arrives from per-track [`ContentGenerator`]s, which a [`Maintenance`]
//! worker runs off the audio thread whenever a track's queue runs low.

mod buffer;
mod config;
mod engine;
mod error;
mod event;
mod generator;
mod timebase;
mod track;
mod worker;

pub use buffer::EventBuffer;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use event::{compare_events, Event, EventKind, TimedMessage};
pub use generator::ContentGenerator;
pub use timebase::Timebase;
pub use track::{SyncType, TickReport, Track, TrackSpec};
pub use worker::Maintenance;
