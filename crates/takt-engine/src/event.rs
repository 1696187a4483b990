//! Scheduled events and their materialized form.

use std::cmp::Ordering;

use takt_midi::MidiMessage;

/// A materialized message: what one tick hands to the consumer.
///
/// `offset` is relative to the start of the tick window, so a consumer
/// can schedule the message sample-accurately within its own period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedMessage {
    /// Frame offset from the start of the tick window
    pub offset: i64,
    pub message: MidiMessage,
}

/// What firing an event does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Emit a MIDI message
    Midi(MidiMessage),
    /// End-of-track trigger: the owning track asks to be unregistered
    Finish,
}

/// One scheduled event inside a buffer.
///
/// The fractional bar offset is authored by a generator; the frame
/// offset is derived when the owning buffer is prepared and only
/// changes if a tempo change re-prepares the buffer.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub(crate) bar_offset: f64,
    pub(crate) frame_offset: i64,
    pub(crate) kind: EventKind,
}

impl Event {
    pub(crate) fn new(bar_offset: f64, kind: EventKind) -> Self {
        Self {
            bar_offset,
            frame_offset: 0,
            kind,
        }
    }

    /// Position within the bar, as authored (nominally in `[0,1)`).
    pub fn bar_offset(&self) -> f64 {
        self.bar_offset
    }

    /// Derived frame position relative to the buffer start.
    pub fn frame_offset(&self) -> i64 {
        self.frame_offset
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Derive the frame offset from the fractional bar offset.
    ///
    /// Truncates toward zero, matching the rest of the frame math.
    pub(crate) fn calc_frame_offset(&mut self, bar_length_in_frames: i64) {
        self.frame_offset = (self.bar_offset * bar_length_in_frames as f64) as i64;
    }

    /// True iff the bar offset lies in `[from, to)`.
    pub fn is_between(&self, from: f64, to: f64) -> bool {
        from <= self.bar_offset && self.bar_offset < to
    }

    /// True iff the frame offset lies in `[from, to)`.
    ///
    /// Half-open on purpose: an event sitting exactly on a window
    /// boundary fires in exactly one window.
    pub fn is_between_in_frames(&self, from: i64, to: i64) -> bool {
        from <= self.frame_offset && self.frame_offset < to
    }

    /// Materialize relative to a window starting at `cursor`.
    ///
    /// Returns `None` for kinds that emit nothing (the end-of-track
    /// trigger acts on the track instead).
    pub fn process(&self, cursor: i64) -> Option<TimedMessage> {
        match self.kind {
            EventKind::Midi(message) => Some(TimedMessage {
                offset: self.frame_offset - cursor,
                message,
            }),
            EventKind::Finish => None,
        }
    }

    /// Rank used to order events sharing a frame offset: note-ons sort
    /// after everything else, so a simultaneous note-off on the same
    /// key reaches the consumer first instead of cutting the new note.
    pub(crate) fn tie_rank(&self) -> u8 {
        match self.kind {
            EventKind::Midi(m) if m.is_note_on() => 1,
            _ => 0,
        }
    }
}

/// Buffer ordering: ascending frame offset, note-on last among equals.
pub fn compare_events(a: &Event, b: &Event) -> Ordering {
    (a.frame_offset, a.tie_rank()).cmp(&(b.frame_offset, b.tie_rank()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midi_event(bar_offset: f64, message: MidiMessage) -> Event {
        Event::new(bar_offset, EventKind::Midi(message))
    }

    fn note_on(bar_offset: f64) -> Event {
        midi_event(
            bar_offset,
            MidiMessage::NoteOn {
                channel: 0,
                key: 60,
                velocity: 100,
            },
        )
    }

    fn note_off(bar_offset: f64) -> Event {
        midi_event(
            bar_offset,
            MidiMessage::NoteOff {
                channel: 0,
                key: 60,
                velocity: 0,
            },
        )
    }

    #[test]
    fn frame_offset_truncates() {
        let mut ev = note_on(0.33);
        ev.calc_frame_offset(1000);
        assert_eq!(ev.frame_offset(), 330);

        let mut ev = note_on(0.9999);
        ev.calc_frame_offset(1000);
        assert_eq!(ev.frame_offset(), 999);
    }

    #[test]
    fn window_is_half_open() {
        let mut ev = note_on(0.5);
        ev.calc_frame_offset(1000);

        assert!(ev.is_between_in_frames(500, 501));
        assert!(ev.is_between_in_frames(0, 1000));
        // exclusive upper bound: a window ending exactly at the event
        // does not contain it
        assert!(!ev.is_between_in_frames(0, 500));
        assert!(!ev.is_between_in_frames(501, 1000));
    }

    #[test]
    fn window_handles_negative_cursor() {
        let mut ev = note_on(0.0);
        ev.calc_frame_offset(1000);
        assert!(ev.is_between_in_frames(-256, 256));
        assert!(!ev.is_between_in_frames(-512, 0));
    }

    #[test]
    fn process_is_window_relative() {
        let mut ev = note_on(0.25);
        ev.calc_frame_offset(1000);
        let msg = ev.process(200).unwrap();
        assert_eq!(msg.offset, 50);

        // pre-roll: a negative cursor pushes the event further out
        let msg = ev.process(-100).unwrap();
        assert_eq!(msg.offset, 350);
    }

    #[test]
    fn finish_materializes_nothing() {
        let ev = Event::new(0.0, EventKind::Finish);
        assert!(ev.process(0).is_none());
    }

    #[test]
    fn note_on_sorts_after_note_off_at_equal_offset() {
        let mut on = note_on(0.5);
        let mut off = note_off(0.5);
        on.calc_frame_offset(1000);
        off.calc_frame_offset(1000);

        assert_eq!(compare_events(&on, &off), Ordering::Greater);
        assert_eq!(compare_events(&off, &on), Ordering::Less);
        // the comparator ranks, it does not invent order between
        // unrelated messages
        assert_eq!(compare_events(&off, &off), Ordering::Equal);
        assert_eq!(compare_events(&on, &off) as i32, 1);
        assert_eq!(compare_events(&off, &on) as i32, -1);
    }

    #[test]
    fn offset_dominates_tie_rank() {
        let mut early_on = note_on(0.25);
        let mut late_off = note_off(0.5);
        early_on.calc_frame_offset(1000);
        late_off.calc_frame_offset(1000);
        assert_eq!(compare_events(&early_on, &late_off), Ordering::Less);
    }
}
