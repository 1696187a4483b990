//! The user-content seam: generators fill buffers on demand.

use crate::buffer::EventBuffer;

/// Supplies one track's musical content, one bar at a time.
///
/// Called only from the engine's maintenance worker, never from the
/// audio callback, so implementations may take their time, run
/// interpreters, wait on channels, and so on. Return `false` to end
/// the track gracefully: queued content plus a closing silence play
/// out, then the track unregisters itself.
pub trait ContentGenerator: Send {
    /// Fill `buffer` with the next bar of content.
    fn fill(&mut self, buffer: &mut EventBuffer) -> bool;
}

impl<F> ContentGenerator for F
where
    F: FnMut(&mut EventBuffer) -> bool + Send,
{
    fn fill(&mut self, buffer: &mut EventBuffer) -> bool {
        self(buffer)
    }
}
