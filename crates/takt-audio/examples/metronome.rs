//! Plays a metronome and a walking bass line, printing every MIDI
//! message the engine materializes together with its wire bytes.
//!
//! Usage:
//!   cargo run -p takt-audio --example metronome
//!   cargo run -p takt-audio --example metronome -- 96

use std::time::{Duration, Instant};

use ringbuf::traits::Consumer;
use takt_audio::CpalClock;
use takt_engine::{Engine, EngineConfig, EventBuffer, Maintenance, SyncType, TrackSpec};
use takt_midi::MidiMessage;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let bpm: f64 = match args.get(1) {
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            eprintln!("Usage: metronome [bpm]");
            std::process::exit(1);
        }),
        None => 120.0,
    };

    let engine = Engine::new(EngineConfig {
        bpm,
        ..EngineConfig::default()
    });

    // high wood block on the downbeat, low wood block on the rest
    engine.put_track(TrackSpec::new("metronome", |buf: &mut EventBuffer| {
        for beat in 0..4 {
            let (key, velocity) = if beat == 0 { (76, 127) } else { (77, 80) };
            buf.note(beat as f64 / 4.0, 1.0 / 32.0, 9, key, velocity);
        }
        true
    }));

    // eighth-note bass arpeggio walking a new root every bar
    let roots: [u8; 4] = [36, 36, 39, 43];
    let mut bar = 0usize;
    engine.put_track(
        TrackSpec::new("bass", move |buf: &mut EventBuffer| {
            let root = roots[bar % roots.len()];
            bar += 1;
            for i in 0..8 {
                let key = root + [0, 7, 12, 7][i % 4];
                buf.note(i as f64 / 8.0, 1.0 / 16.0, 0, key, 90);
            }
            true
        })
        .sync(SyncType::Parallel, Some("metronome"), 0.0),
    );

    let worker = Maintenance::spawn(engine.clone()).unwrap_or_else(|e| {
        eprintln!("Failed to start maintenance worker: {}", e);
        std::process::exit(1);
    });

    let (mut clock, mut consumer) = CpalClock::new(&engine).unwrap_or_else(|e| {
        eprintln!("Failed to initialize audio clock: {}", e);
        std::process::exit(1);
    });
    println!("Sample rate: {} Hz", clock.sample_rate());

    clock.build_stream(engine.clone()).unwrap_or_else(|e| {
        eprintln!("Failed to start audio stream: {}", e);
        std::process::exit(1);
    });
    clock.start().unwrap();

    println!("Playing at {} bpm...", bpm);
    println!();

    let started = Instant::now();
    let mut tempo_bumped = false;
    let mut bass_removed = false;
    let mut raw = [0u8; 3];

    while started.elapsed() < Duration::from_secs(8) {
        while let Some(msg) = consumer.try_pop() {
            let n = msg.message.encode(&mut raw);
            println!(
                "{:>8}  {:02X?}  {}",
                msg.offset,
                &raw[..n],
                describe(&msg.message)
            );
        }

        if !tempo_bumped && started.elapsed() >= Duration::from_secs(4) {
            engine.set_bpm(bpm * 1.25);
            println!("-- tempo up --");
            tempo_bumped = true;
        }
        if !bass_removed && started.elapsed() >= Duration::from_secs(6) {
            engine.remove_track("bass", true).unwrap();
            println!("-- bass winding down --");
            bass_removed = true;
        }

        std::thread::sleep(Duration::from_millis(2));
    }

    clock.stop().unwrap();
    worker.stop();
    if clock.dropped_messages() > 0 {
        println!("Dropped {} messages.", clock.dropped_messages());
    }
    println!("Done.");
}

fn describe(message: &MidiMessage) -> String {
    match message {
        MidiMessage::NoteOn {
            channel,
            key,
            velocity,
        } => format!("ch{:<2} note-on  {:>3} vel {}", channel, key, velocity),
        MidiMessage::NoteOff { channel, key, .. } => {
            format!("ch{:<2} note-off {:>3}", channel, key)
        }
        other => format!("{:?}", other),
    }
}
