//! MIDI 1.0 channel-voice message types for the takt sequencer.
//!
//! The engine materializes musical events into these messages; audio
//! and wire backends consume them. Pure data, `no_std` compatible.

#![cfg_attr(not(feature = "std"), no_std)]

mod message;

pub use message::{status, MidiMessage};
