//! Audio-clock backend for the takt sequencer.

mod clock;
mod error;

pub use clock::CpalClock;
pub use error::AudioError;
