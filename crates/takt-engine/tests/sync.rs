//! Integration test: start-position rules for freshly registered tracks.

use takt_engine::{Engine, EngineConfig, EventBuffer, SyncType, TrackSpec};

/// Engine with a 4800-frame bar.
fn small_engine() -> Engine {
    Engine::new(EngineConfig {
        sample_rate: 9_600,
        bpm: 480.0,
        ..EngineConfig::default()
    })
}

fn one_bar_click(name: &str) -> TrackSpec {
    TrackSpec::new(name, |buf: &mut EventBuffer| {
        buf.note_on(0.0, 0, 60, 100);
        true
    })
}

// --- serial ---

#[test]
fn serial_starts_where_the_head_buffer_ends() {
    let engine = small_engine();
    let a = engine.put_track(one_bar_click("a"));

    let mut out = Vec::new();
    engine.process(2_000, &mut out);
    assert_eq!(a.cursor(), 2_000);

    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Serial, Some("a"), 0.0),
    );
    // 2000 into a 4800-frame head leaves 2800 frames to wait
    assert_eq!(b.cursor(), -2_800);
}

#[test]
fn serial_handoff_is_sample_accurate() {
    let engine = small_engine();
    engine.put_track(one_bar_click("a"));

    let mut out = Vec::new();
    engine.process(2_000, &mut out);
    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Serial, Some("a"), 0.0),
    );

    // b stays silent while its cursor is negative
    engine.process(2_800, &mut out);
    assert_eq!(out.len(), 0, "no clicks inside (0.0, 1.0) of either track");
    assert_eq!(b.cursor(), 0);

    // the next window opens on a's second bar and b's first, together
    engine.process(512, &mut out);
    assert_eq!(out.len(), 2, "a and b click the same bar line");
    assert!(out.iter().all(|m| m.offset == 0));
}

#[test]
fn serial_offset_shifts_the_start() {
    let engine = small_engine();
    engine.put_track(one_bar_click("a"));

    let mut out = Vec::new();
    engine.process(2_000, &mut out);
    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Serial, Some("a"), 0.5),
    );
    // half a bar later than the plain serial start
    assert_eq!(b.cursor(), -2_800 - 2_400);
}

#[test]
fn serial_to_an_empty_track_degrades_to_parallel() {
    let engine = small_engine();
    let a = engine.put_track(one_bar_click("a"));

    let mut out = Vec::new();
    engine.process(300, &mut out);
    a.clear_buffer();

    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Serial, Some("a"), 0.0),
    );
    assert_eq!(b.cursor(), a.cursor(), "no head buffer to append after");
}

// --- parallel ---

#[test]
fn parallel_matches_the_sync_cursor() {
    let engine = small_engine();
    engine.put_track(one_bar_click("a"));

    let mut out = Vec::new();
    engine.process(2_000, &mut out);
    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Parallel, Some("a"), 0.0),
    );
    assert_eq!(b.cursor(), 2_000);

    // both tracks then click their shared bar line
    engine.process(2_800, &mut out);
    engine.process(512, &mut out);
    assert_eq!(out.len(), 2);
}

#[test]
fn parallel_with_offset_trails_behind() {
    let engine = small_engine();
    engine.put_track(one_bar_click("a"));

    let mut out = Vec::new();
    engine.process(2_000, &mut out);
    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Parallel, Some("a"), 0.25),
    );
    assert_eq!(b.cursor(), 2_000 - 1_200);
}

#[test]
fn parallel_without_a_target_starts_immediately() {
    let engine = small_engine();
    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Parallel, Some("ghost"), 0.0),
    );
    assert_eq!(b.cursor(), 0);
}

// --- immediate ---

#[test]
fn immediate_starts_at_the_offset() {
    let engine = small_engine();
    let a = engine.put_track(one_bar_click("a"));
    assert_eq!(a.cursor(), 0);

    let b = engine.put_track(
        one_bar_click("b").sync(SyncType::Immediate, None, 0.5),
    );
    assert_eq!(b.cursor(), -2_400, "positive offset delays the start");
}
