use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use takt_engine::{Engine, EngineConfig, EventBuffer, TimedMessage, TrackSpec};

fn grid_track(name: &'static str, channel: u8, key: u8, division: u32) -> TrackSpec {
    TrackSpec::new(name, move |buf: &mut EventBuffer| {
        for i in 0..division {
            let offset = i as f64 / division as f64;
            buf.note(offset, 0.5 / division as f64, channel, key, 100);
        }
        true
    })
}

fn bench_tick(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default());
    engine.put_track(grid_track("kick", 9, 36, 4));
    engine.put_track(grid_track("snare", 9, 38, 8));
    engine.put_track(grid_track("hat", 9, 42, 16));
    engine.put_track(grid_track("bass", 0, 33, 8));
    let mut out: Vec<TimedMessage> = Vec::with_capacity(engine.config().message_capacity);

    // maintain inside the loop keeps the queues primed so every
    // iteration sees a full, steady-state engine
    c.bench_function("tick_512_four_tracks", |b| {
        b.iter(|| {
            engine.process(black_box(512), &mut out);
            engine.maintain();
            black_box(out.len())
        })
    });
}

fn bench_empty_tick(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default());
    let mut out: Vec<TimedMessage> = Vec::with_capacity(engine.config().message_capacity);

    c.bench_function("tick_512_no_tracks", |b| {
        b.iter(|| {
            engine.process(black_box(512), &mut out);
            black_box(out.len())
        })
    });
}

criterion_group!(benches, bench_tick, bench_empty_tick);
criterion_main!(benches);
