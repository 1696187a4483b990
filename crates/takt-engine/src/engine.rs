//! The transport: active tracks, timebase, and the tick entry point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::TimedMessage;
use crate::timebase::Timebase;
use crate::track::{Track, TrackSpec};

/// The transport: owns the active tracks and the timebase, and drives
/// both from the audio callback via [`Engine::process`].
///
/// Clones are cheap handles onto shared state, so the audio backend,
/// the maintenance worker, and control code can each hold their own.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    timebase: Mutex<Timebase>,
    /// Registration set; mutations republish the snapshot
    registry: Mutex<Vec<Arc<Track>>>,
    /// Read-mostly copy the tick path loads without locking
    snapshot: ArcSwap<Vec<Arc<Track>>>,
    /// Capacity-1 doorbell to the maintenance worker; full just means
    /// a sweep is already pending
    bell_tx: Sender<()>,
    bell_rx: Mutex<Option<Receiver<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let (bell_tx, bell_rx) = crossbeam_channel::bounded(1);
        let timebase = config.timebase();
        Self {
            inner: Arc::new(EngineInner {
                config,
                timebase: Mutex::new(timebase),
                registry: Mutex::new(Vec::new()),
                snapshot: ArcSwap::from_pointee(Vec::new()),
                bell_tx,
                bell_rx: Mutex::new(Some(bell_rx)),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Snapshot of the current timebase.
    pub fn timebase(&self) -> Timebase {
        *lock(&self.inner.timebase)
    }

    pub fn bpm(&self) -> f64 {
        self.timebase().bpm
    }

    pub fn bar_length_in_frames(&self) -> i64 {
        self.timebase().bar_length_in_frames()
    }

    /// Change tempo, re-preparing every registered track so each keeps
    /// its fractional position.
    pub fn set_bpm(&self, bpm: f64) {
        if !(bpm.is_finite() && bpm > 0.0) {
            warn!("ignoring invalid tempo {bpm}");
            return;
        }
        // registry lock first: tempo changes serialize against
        // registration, and the two locks always nest in this order
        let registry = lock(&self.inner.registry);
        let new_timebase = {
            let mut tb = lock(&self.inner.timebase);
            if tb.bpm == bpm {
                return;
            }
            *tb = tb.with_bpm(bpm);
            *tb
        };
        for track in registry.iter() {
            track.reprepare(&new_timebase);
        }
        info!(
            "tempo {} bpm, bar {} frames",
            bpm,
            new_timebase.bar_length_in_frames()
        );
    }

    /// Register a track, replacing any existing track with the same
    /// name. Returns a handle to the registered track.
    ///
    /// The first round of content is generated here, on the calling
    /// thread, so the track enters the tick fan-out with bars queued
    /// and serial-synced followers can measure its head buffer. Later
    /// refills all happen on the maintenance worker.
    pub fn put_track(&self, spec: TrackSpec) -> Arc<Track> {
        let track = Arc::new(Track::from_spec(spec));
        let fill_timebase = self.timebase();
        track.check_buffer(&fill_timebase);

        let mut registry = lock(&self.inner.registry);
        let timebase = *lock(&self.inner.timebase);
        if timebase != fill_timebase {
            // tempo moved while we were filling
            track.reprepare(&timebase);
        }
        let sync_track = track
            .sync_to()
            .and_then(|name| registry.iter().find(|t| t.name() == name).cloned());
        track.prepare(timebase.bar_length_in_frames(), sync_track.as_deref());

        if let Some(pos) = registry.iter().position(|t| t.name() == track.name()) {
            let old = registry.remove(pos);
            debug!("track {:?}: replaced by re-registration", old.name());
        }
        registry.push(track.clone());
        self.publish(&registry);
        drop(registry);

        info!("track {:?} registered", track.name());
        self.ring_doorbell();
        track
    }

    /// Remove a track by name.
    ///
    /// Graceful removal lets queued content and a closing silence play
    /// out before the track unregisters itself; immediate removal drops
    /// the track and its queue at the next safe point.
    pub fn remove_track(&self, name: &str, graceful: bool) -> Result<(), EngineError> {
        if graceful {
            let track = self
                .track_by_name(name)
                .ok_or_else(|| EngineError::TrackNotFound(name.to_owned()))?;
            track.mark_ending();
            // get the silence queued promptly
            self.ring_doorbell();
            Ok(())
        } else {
            let mut registry = lock(&self.inner.registry);
            let pos = registry
                .iter()
                .position(|t| t.name() == name)
                .ok_or_else(|| EngineError::TrackNotFound(name.to_owned()))?;
            let track = registry.remove(pos);
            self.publish(&registry);
            drop(registry);
            info!("track {:?} removed", track.name());
            Ok(())
        }
    }

    pub fn track_by_name(&self, name: &str) -> Option<Arc<Track>> {
        lock(&self.inner.registry)
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn tracks_by_tag(&self, tag: &str) -> Vec<Arc<Track>> {
        lock(&self.inner.registry)
            .iter()
            .filter(|t| t.has_tag(tag))
            .cloned()
            .collect()
    }

    /// All registered tracks, in registration order.
    pub fn tracks(&self) -> Vec<Arc<Track>> {
        lock(&self.inner.registry).clone()
    }

    /// Advance every enabled track by `nframes`, collecting the
    /// materialized messages into `out`, sorted by window offset with
    /// note-ons after any other message at the same offset.
    ///
    /// This is the audio-callback entry point. It takes no lock other
    /// than each track's own, and it never blocks on content
    /// generation; refill requests leave through the doorbell.
    pub fn process(&self, nframes: i64, out: &mut Vec<TimedMessage>) {
        out.clear();
        if nframes <= 0 {
            return;
        }

        let tracks = self.inner.snapshot.load();
        let mut refill_needed = false;
        let mut finished = false;
        for track in tracks.iter() {
            if !track.is_enabled() {
                continue;
            }
            let report = track.progress_cursor(nframes, out);
            refill_needed |= report.refill_needed;
            finished |= report.finished;
        }

        out.sort_unstable_by_key(|m| (m.offset, m.message.is_note_on()));

        if refill_needed {
            self.ring_doorbell();
        }
        if finished {
            self.retire_finished();
        }
    }

    /// One maintenance sweep: refill every track's queue. Called from
    /// the worker loop; also handy for tests and offline rendering.
    pub fn maintain(&self) {
        let timebase = self.timebase();
        for track in self.tracks() {
            track.check_buffer(&timebase);
        }
    }

    /// Drop tracks whose ending silence has been consumed. Runs on the
    /// tick path but only in the tick where a track finishes.
    fn retire_finished(&self) {
        let mut registry = lock(&self.inner.registry);
        let before = registry.len();
        registry.retain(|t| {
            let done = t.take_finished();
            if done {
                info!("track {:?} finished", t.name());
            }
            !done
        });
        if registry.len() != before {
            self.publish(&registry);
        }
    }

    fn publish(&self, registry: &[Arc<Track>]) {
        self.inner.snapshot.store(Arc::new(registry.to_vec()));
    }

    fn ring_doorbell(&self) {
        let _ = self.inner.bell_tx.try_send(());
    }

    /// The worker's end of the doorbell; taken exactly once.
    pub(crate) fn take_doorbell(&self) -> Option<Receiver<()>> {
        lock(&self.inner.bell_rx).take()
    }
}

// Nothing in this crate can panic while holding these locks; recover
// rather than poison the whole transport.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
