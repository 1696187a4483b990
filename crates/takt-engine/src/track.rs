//! A single sequenced voice: buffer queue, cursor, and refill logic.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, warn};

use crate::buffer::EventBuffer;
use crate::event::TimedMessage;
use crate::generator::ContentGenerator;
use crate::timebase::Timebase;

/// Eviction lookback, in bars: a consumed buffer stays queued until the
/// cursor has moved this many bars past its end, protecting events with
/// slightly negative offsets from losing their buffer. The refill
/// threshold is the square of this.
pub(crate) const MARGIN_LENGTH: f64 = 2.0;

/// Consecutive generator faults tolerated before a track is forced into
/// its ending state.
const GENERATOR_FAILURE_LIMIT: u32 = 8;

/// How a freshly registered track derives its start cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncType {
    /// Start at the sync offset, ignoring other tracks
    Immediate,
    /// Start aligned with the sync track's current position
    Parallel,
    /// Start where the sync track's current head buffer ends
    Serial,
}

/// Everything needed to register a track.
///
/// ```no_run
/// use takt_engine::{EventBuffer, SyncType, TrackSpec};
///
/// let spec = TrackSpec::new("hats", |buf: &mut EventBuffer| {
///     for i in 0..8 {
///         buf.note(i as f64 / 8.0, 0.05, 9, 42, 80);
///     }
///     true
/// })
/// .tag("drums")
/// .sync(SyncType::Parallel, Some("kick"), 0.0);
/// ```
pub struct TrackSpec {
    pub(crate) name: String,
    pub(crate) tags: Vec<String>,
    pub(crate) sync_type: SyncType,
    pub(crate) sync_to: Option<String>,
    pub(crate) sync_offset: f64,
    pub(crate) generator: Box<dyn ContentGenerator>,
}

impl TrackSpec {
    pub fn new(name: impl Into<String>, generator: impl ContentGenerator + 'static) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            sync_type: SyncType::Immediate,
            sync_to: None,
            sync_offset: 0.0,
            generator: Box::new(generator),
        }
    }

    /// Add a tag for group lookup.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Start positioning relative to another track. `sync_offset` is in
    /// bar units; positive values delay the start.
    pub fn sync(mut self, sync_type: SyncType, sync_to: Option<&str>, sync_offset: f64) -> Self {
        self.sync_type = sync_type;
        self.sync_to = sync_to.map(str::to_owned);
        self.sync_offset = sync_offset;
        self
    }
}

/// Summary of one tick for one track.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickReport {
    /// A head buffer was evicted; queued content may be running low
    pub refill_needed: bool,
    /// The ending silence finished; the track wants unregistration
    pub finished: bool,
}

/// Playback state guarded by the track's one lock. Cursor and queue
/// must only ever change together under it.
#[derive(Debug)]
struct TrackState {
    /// Frame position relative to the queue head; negative while a
    /// synced track waits to start
    cursor: i64,
    buffers: VecDeque<EventBuffer>,
    ending: bool,
    ending_enqueued: bool,
    /// Frame length of the final silence, fixed when ending begins
    ending_length: i64,
    finished: bool,
    /// Frame length of the buffer under the cursor after the last tick,
    /// -1 when unknown
    last_length_in_frames: i64,
    last_accumulated_length: i64,
}

struct GeneratorSlot {
    generator: Box<dyn ContentGenerator>,
    /// Consecutive faults; reset by any successful fill
    failures: u32,
}

enum GeneratorRun {
    Filled { more: bool },
    Faulted,
    GaveUp,
}

/// One independently sequenced voice.
///
/// All playback state sits behind a single mutex so cursor and queue
/// updates stay atomic; the generator sits behind its own lock and is
/// only ever exercised by the maintenance worker (plus the initial
/// synchronous fill during registration).
pub struct Track {
    name: String,
    tags: Vec<String>,
    enabled: AtomicBool,
    sync_type: SyncType,
    sync_to: Option<String>,
    sync_offset: f64,
    state: Mutex<TrackState>,
    gen: Mutex<GeneratorSlot>,
}

impl Track {
    pub(crate) fn from_spec(spec: TrackSpec) -> Self {
        Self {
            name: spec.name,
            tags: spec.tags,
            enabled: AtomicBool::new(true),
            sync_type: spec.sync_type,
            sync_to: spec.sync_to,
            sync_offset: spec.sync_offset,
            state: Mutex::new(TrackState {
                cursor: 0,
                buffers: VecDeque::new(),
                ending: false,
                ending_enqueued: false,
                ending_length: 0,
                finished: false,
                last_length_in_frames: -1,
                last_accumulated_length: 0,
            }),
            gen: Mutex::new(GeneratorSlot {
                generator: spec.generator,
                failures: 0,
            }),
        }
    }

    // No panic can originate inside these lock scopes, so a poisoned
    // lock only ever means a caller's unwind already tore through; keep
    // playing rather than spreading the panic to the audio thread.
    fn lock_state(&self) -> MutexGuard<'_, TrackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    pub(crate) fn sync_to(&self) -> Option<&str> {
        self.sync_to.as_deref()
    }

    /// Disabled tracks are skipped by the tick fan-out entirely: the
    /// cursor freezes and resumes in place.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Current frame position relative to the queue head.
    pub fn cursor(&self) -> i64 {
        self.lock_state().cursor
    }

    /// Total queued musical length in bars.
    pub fn queued_bars(&self) -> f64 {
        let st = self.lock_state();
        st.buffers.iter().map(|b| b.len_bars()).sum()
    }

    /// Fractional position inside the buffer currently playing, in
    /// `[0,1)`. Best-effort indicator for control surfaces, not
    /// authoritative timing.
    pub fn position(&self) -> f64 {
        let st = self.lock_state();
        if st.last_length_in_frames <= 0 || st.cursor < 0 {
            return 0.0;
        }
        (st.cursor - st.last_accumulated_length + st.last_length_in_frames) as f64
            / st.last_length_in_frames as f64
    }

    /// Advance the cursor by `nframes`, materializing every event whose
    /// frame offset falls inside the window into `out`.
    ///
    /// This is the real-time critical path: one bounded pass over the
    /// queue under the track lock, no allocation beyond `out`'s spare
    /// capacity, no generator calls. Offsets in `out` are relative to
    /// the window start.
    pub fn progress_cursor(&self, nframes: i64, out: &mut Vec<TimedMessage>) -> TickReport {
        let mut report = TickReport::default();
        let mut st = self.lock_state();
        let st = &mut *st;

        let mut current = st.cursor;
        let mut next = current + nframes;

        // Materialize. Events are offset-sorted per buffer, so once a
        // matching run ends nothing later in that buffer can match.
        let mut cursor_offset: i64 = 0;
        for buf in &st.buffers {
            let actual_cursor = current - cursor_offset;
            let actual_next = next - cursor_offset;
            let mut found = false;
            for ev in buf.events() {
                if ev.is_between_in_frames(actual_cursor, actual_next) {
                    found = true;
                    match ev.process(actual_cursor) {
                        Some(msg) => out.push(msg),
                        None => {
                            st.finished = true;
                            report.finished = true;
                        }
                    }
                } else if found {
                    break;
                }
            }
            cursor_offset += buf.length_in_frames();
        }

        // Evict head buffers the cursor has passed by more than the
        // margin, keeping the cursor relative to the new queue head.
        let mut accumulated: i64 = 0;
        let mut poll_count = 0;
        for buf in &st.buffers {
            accumulated += buf.length_in_frames();
            let margin = (buf.bar_length_in_frames() as f64 * MARGIN_LENGTH) as i64;
            if accumulated < current - margin {
                poll_count += 1;
            }
            if current < accumulated {
                break;
            }
        }
        for _ in 0..poll_count {
            if let Some(removed) = st.buffers.pop_front() {
                let length = removed.length_in_frames();
                current -= length;
                next -= length;
            }
        }
        if poll_count > 0 {
            report.refill_needed = true;
        }

        // Locate the buffer now holding the cursor for position().
        let mut accumulated: i64 = 0;
        let mut length_in_frame: i64 = -1;
        for buf in &st.buffers {
            accumulated += buf.length_in_frames();
            if next < accumulated {
                length_in_frame = buf.length_in_frames();
                break;
            }
        }
        st.last_length_in_frames = length_in_frame;
        st.last_accumulated_length = accumulated;

        st.cursor = next;
        report
    }

    /// Set the start cursor from the sync settings. Called once at
    /// registration, before the track joins the tick fan-out.
    pub(crate) fn prepare(&self, bar_length_in_frames: i64, sync_track: Option<&Track>) {
        let offset = (-self.sync_offset * bar_length_in_frames as f64) as i64;
        let cursor = match self.sync_type {
            SyncType::Immediate => {
                if sync_track.is_some() {
                    warn!(
                        "track {:?}: sync track given but sync type is immediate; ignoring it",
                        self.name
                    );
                }
                offset
            }
            SyncType::Parallel => match sync_track {
                Some(sync) => sync.cursor() + offset,
                None => {
                    warn!(
                        "track {:?}: parallel sync without a sync track; starting immediately",
                        self.name
                    );
                    offset
                }
            },
            SyncType::Serial => match sync_track {
                Some(sync) => {
                    let (sync_cursor, head) = sync.cursor_and_head_length();
                    match head {
                        Some(head_length) => sync_cursor - head_length + offset,
                        None => {
                            warn!(
                                "track {:?}: serial sync target {:?} has nothing queued; \
                                 starting parallel",
                                self.name, sync.name
                            );
                            sync_cursor + offset
                        }
                    }
                }
                None => {
                    warn!(
                        "track {:?}: serial sync without a sync track; starting immediately",
                        self.name
                    );
                    offset
                }
            },
        };
        self.lock_state().cursor = cursor;
    }

    fn cursor_and_head_length(&self) -> (i64, Option<i64>) {
        let st = self.lock_state();
        (
            st.cursor,
            st.buffers.front().map(|b| b.length_in_frames()),
        )
    }

    /// Re-prepare every queued buffer under a new timebase and rescale
    /// the cursor by the head buffer's new/old length ratio, so the
    /// track keeps its fractional position through a tempo change.
    pub fn reprepare(&self, timebase: &Timebase) {
        let bar = timebase.bar_length_in_frames();
        let mut st = self.lock_state();
        let prev_head = st.buffers.front().map(|b| b.length_in_frames());
        for buf in st.buffers.iter_mut() {
            buf.prepare(bar);
        }
        if let (Some(prev), Some(now)) = (prev_head, st.buffers.front().map(|b| b.length_in_frames())) {
            if prev > 0 && now != prev {
                let ratio = now as f64 / prev as f64;
                st.cursor = (st.cursor as f64 * ratio).round() as i64;
            }
        }
    }

    /// Drop all queued content and rewind to frame 0. The ending flag
    /// survives; a pending ending silence gets queued again on the next
    /// maintenance pass.
    pub fn clear_buffer(&self) {
        let mut st = self.lock_state();
        st.buffers.clear();
        st.cursor = 0;
        st.ending_enqueued = false;
        st.last_length_in_frames = -1;
        st.last_accumulated_length = 0;
    }

    /// Begin graceful shutdown: queued content still plays, then the
    /// closing silence, then the track unregisters itself.
    pub(crate) fn mark_ending(&self) {
        let mut st = self.lock_state();
        let length = st
            .buffers
            .back()
            .map(|b| b.length_in_frames())
            .unwrap_or(1);
        begin_ending(&mut st, length);
    }

    pub(crate) fn take_finished(&self) -> bool {
        let mut st = self.lock_state();
        std::mem::take(&mut st.finished)
    }

    /// Refill until roughly `MARGIN_LENGTH²` bars are queued (or the
    /// ending silence is in place). Maintenance-thread only: generator
    /// calls can take arbitrarily long and never hold the state lock.
    pub fn check_buffer(&self, timebase: &Timebase) {
        while self.wants_buffer() {
            if !self.offer_new_buffer(timebase) {
                break;
            }
        }
    }

    fn wants_buffer(&self) -> bool {
        let st = self.lock_state();
        if st.ending {
            !st.ending_enqueued
        } else {
            let queued: f64 = st.buffers.iter().map(|b| b.len_bars()).sum();
            queued < MARGIN_LENGTH * MARGIN_LENGTH
        }
    }

    /// One refill step: enqueue the ending silence if the track is
    /// ending, otherwise run the generator for one new buffer. Returns
    /// whether `check_buffer` should keep going.
    fn offer_new_buffer(&self, timebase: &Timebase) -> bool {
        let bar = timebase.bar_length_in_frames();

        let pending_ending = {
            let st = self.lock_state();
            if st.ending && st.ending_enqueued {
                return false;
            }
            st.ending.then_some(st.ending_length)
        };

        if let Some(length) = pending_ending {
            let mut buf = EventBuffer::ending(length);
            buf.prepare(bar);
            let frames = buf.length_in_frames();
            let queued = {
                let mut st = self.lock_state();
                if st.ending && !st.ending_enqueued {
                    st.buffers.push_back(buf);
                    st.ending_enqueued = true;
                    true
                } else {
                    false
                }
            };
            if queued {
                debug!("track {:?}: queued {frames} frame ending silence", self.name);
            }
            return true;
        }

        // Normal content. The generator runs outside the state lock so
        // a slow fill never stalls the tick.
        let mut buf = EventBuffer::new();
        match self.run_generator(&mut buf) {
            GeneratorRun::Filled { more } => {
                buf.prepare(bar);
                let frames = buf.length_in_frames();
                {
                    let mut st = self.lock_state();
                    st.buffers.push_back(buf);
                    if !more {
                        begin_ending(&mut st, frames);
                    }
                }
                if !more {
                    debug!(
                        "track {:?}: generator done, ending after queued content",
                        self.name
                    );
                }
                true
            }
            // left without a new buffer this cycle; retried on the next
            // maintenance pass
            GeneratorRun::Faulted => false,
            GeneratorRun::GaveUp => {
                warn!(
                    "track {:?}: generator failed {} times in a row; ending track",
                    self.name, GENERATOR_FAILURE_LIMIT
                );
                let mut st = self.lock_state();
                begin_ending(&mut st, bar);
                true
            }
        }
    }

    fn run_generator(&self, buf: &mut EventBuffer) -> GeneratorRun {
        let mut slot = self.gen.lock().unwrap_or_else(PoisonError::into_inner);
        match catch_unwind(AssertUnwindSafe(|| slot.generator.fill(buf))) {
            Ok(more) => {
                slot.failures = 0;
                GeneratorRun::Filled { more }
            }
            Err(_) => {
                slot.failures += 1;
                error!(
                    "track {:?}: generator panicked ({} consecutive)",
                    self.name, slot.failures
                );
                if slot.failures >= GENERATOR_FAILURE_LIMIT {
                    GeneratorRun::GaveUp
                } else {
                    GeneratorRun::Faulted
                }
            }
        }
    }
}

fn begin_ending(st: &mut TrackState, length: i64) {
    if !st.ending {
        st.ending = true;
        st.ending_length = length.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_track(len_bars: f64, notes: &[f64]) -> Track {
        let notes = notes.to_vec();
        let spec = TrackSpec::new("test", move |buf: &mut EventBuffer| {
            buf.set_len_bars(len_bars);
            for &offset in &notes {
                buf.note_on(offset, 0, 60, 100);
            }
            true
        });
        Track::from_spec(spec)
    }

    fn tb() -> Timebase {
        // bar of exactly 4800 frames
        Timebase::new(9_600, 480.0, 4)
    }

    #[test]
    fn empty_queue_still_advances() {
        let track = Track::from_spec(TrackSpec::new("empty", |_: &mut EventBuffer| true));
        let mut out = Vec::new();
        let report = track.progress_cursor(512, &mut out);
        assert!(out.is_empty());
        assert!(!report.refill_needed);
        assert!(!report.finished);
        assert_eq!(track.cursor(), 512);
    }

    #[test]
    fn fills_to_refill_threshold() {
        let track = fixed_track(1.0, &[0.0]);
        track.check_buffer(&tb());
        assert_eq!(track.queued_bars(), 4.0);
    }

    #[test]
    fn scan_crosses_buffer_boundaries() {
        let track = fixed_track(1.0, &[0.0, 0.5]);
        track.check_buffer(&tb());

        // one window spanning the first one and a half buffers
        let mut out = Vec::new();
        track.progress_cursor(7200, &mut out);
        let offsets: Vec<i64> = out.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 2400, 4800]);
    }

    #[test]
    fn eviction_respects_margin() {
        let track = fixed_track(1.0, &[0.0]);
        track.check_buffer(&tb());

        let mut out = Vec::new();
        // cross the first bar plus the two-bar margin; head not yet
        // evictable while accumulated >= cursor - margin
        track.progress_cursor(4800 * 3, &mut out);
        assert_eq!(track.queued_bars(), 4.0);
        assert_eq!(track.cursor(), 14_400);

        // eviction keys off the cursor before the advance, so the head
        // goes one tick after the margin is crossed
        let report = track.progress_cursor(1, &mut out);
        assert!(!report.refill_needed);
        assert_eq!(track.queued_bars(), 4.0);

        let report = track.progress_cursor(1, &mut out);
        assert!(report.refill_needed);
        assert_eq!(track.queued_bars(), 3.0);
        assert_eq!(track.cursor(), 14_402 - 4800);
    }

    #[test]
    fn position_stays_in_unit_range() {
        let track = fixed_track(1.0, &[0.0]);
        track.check_buffer(&tb());
        let mut out = Vec::new();
        for _ in 0..40 {
            track.progress_cursor(997, &mut out);
            track.check_buffer(&tb());
            let pos = track.position();
            assert!((0.0..1.0).contains(&pos), "position {pos} out of range");
        }
    }

    #[test]
    fn graceful_mark_uses_last_buffer_length() {
        let track = fixed_track(0.5, &[0.0]);
        track.check_buffer(&tb());
        track.mark_ending();
        track.check_buffer(&tb());
        {
            let st = track.lock_state();
            assert!(st.ending);
            assert!(st.ending_enqueued);
            assert_eq!(st.ending_length, 2400);
        }
        // no second silence gets queued
        track.check_buffer(&tb());
        let st = track.lock_state();
        assert_eq!(
            st.buffers
                .iter()
                .filter(|b| b.len_bars() == 0.0)
                .count(),
            1
        );
    }
}
