//! One bar of generated content.

use takt_midi::MidiMessage;

use crate::event::{compare_events, Event, EventKind};

/// An ordered batch of events covering one generated bar (or a partial
/// or silence bar).
///
/// A generator fills the buffer through the note methods, the owning
/// track prepares it (frame offsets computed, length frozen, events
/// sorted), and from then on the tick path only reads it. Lengths are
/// immutable after prepare except when a tempo change re-prepares the
/// whole queue.
#[derive(Clone, Debug)]
pub struct EventBuffer {
    events: Vec<Event>,
    /// Declared musical length in bars
    len_bars: f64,
    /// Ending buffers carry an explicit frame length instead of a
    /// bar-derived one
    explicit_frames: Option<i64>,
    /// Frozen on prepare
    length_in_frames: i64,
    /// Nominal full-bar frame length at prepare time
    bar_length_in_frames: i64,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBuffer {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            len_bars: 1.0,
            explicit_frames: None,
            length_in_frames: 0,
            bar_length_in_frames: 0,
        }
    }

    /// Silence buffer that fires the end-of-track trigger within its
    /// final frame. `frames` is clamped to a minimum of 1 so zero-length
    /// content cannot degenerate the queue math.
    pub(crate) fn ending(frames: i64) -> Self {
        let mut buf = Self::new();
        buf.len_bars = 0.0;
        buf.explicit_frames = Some(frames.max(1));
        buf.events.push(Event::new(0.0, EventKind::Finish));
        buf
    }

    // --- generator-facing fill API ---

    /// Declare the buffer's musical length in bars (default 1.0).
    ///
    /// Shorter or longer than a nominal bar is fine; the refill
    /// threshold accumulates this value.
    pub fn set_len_bars(&mut self, bars: f64) {
        self.len_bars = bars.max(0.0);
    }

    /// Append a note-on.
    pub fn note_on(&mut self, bar_offset: f64, channel: u8, key: u8, velocity: u8) {
        self.message(
            bar_offset,
            MidiMessage::NoteOn {
                channel,
                key,
                velocity,
            },
        );
    }

    /// Append a note-off.
    pub fn note_off(&mut self, bar_offset: f64, channel: u8, key: u8) {
        self.message(
            bar_offset,
            MidiMessage::NoteOff {
                channel,
                key,
                velocity: 0,
            },
        );
    }

    /// Append a note-on/note-off pair `length` bars apart.
    pub fn note(&mut self, bar_offset: f64, length: f64, channel: u8, key: u8, velocity: u8) {
        self.note_on(bar_offset, channel, key, velocity);
        self.note_off(bar_offset + length, channel, key);
    }

    /// Append a control change.
    pub fn control_change(&mut self, bar_offset: f64, channel: u8, controller: u8, value: u8) {
        self.message(
            bar_offset,
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            },
        );
    }

    /// Append an arbitrary channel-voice message.
    pub fn message(&mut self, bar_offset: f64, message: MidiMessage) {
        self.events.push(Event::new(bar_offset, EventKind::Midi(message)));
    }

    // --- queries ---

    /// Declared musical length in bars.
    pub fn len_bars(&self) -> f64 {
        self.len_bars
    }

    /// Realized frame length; 0 until the buffer has been prepared.
    pub fn length_in_frames(&self) -> i64 {
        self.length_in_frames
    }

    /// Frame length of the nominal full bar this buffer was prepared
    /// under; the eviction margin derives from it.
    pub fn bar_length_in_frames(&self) -> i64 {
        self.bar_length_in_frames
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in ascending frame-offset order (after prepare).
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // --- lifecycle ---

    /// Compute every event's frame offset and freeze the buffer's
    /// length under the given nominal bar length.
    ///
    /// Calling again with the same bar length is a no-op in effect;
    /// with a different one it rescales offsets and length, which is
    /// exactly the tempo-change path. Events are sorted here so the
    /// tick scan's early exit is valid no matter what order the
    /// generator appended them in.
    pub fn prepare(&mut self, bar_length_in_frames: i64) {
        self.bar_length_in_frames = bar_length_in_frames;
        self.length_in_frames = match self.explicit_frames {
            Some(frames) => frames,
            None => (self.len_bars * bar_length_in_frames as f64) as i64,
        };
        for ev in &mut self.events {
            match ev.kind() {
                // the trigger pins to the final frame regardless of tempo
                EventKind::Finish => ev.frame_offset = self.length_in_frames - 1,
                _ => ev.calc_frame_offset(bar_length_in_frames),
            }
        }
        self.events.sort_by(compare_events);
    }
}
