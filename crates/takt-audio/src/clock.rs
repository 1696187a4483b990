//! CPAL-driven engine clock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use log::error;
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use takt_engine::{Engine, TimedMessage};

use crate::error::AudioError;

/// Drives an [`Engine`] from the system audio clock.
///
/// The stream itself plays silence; each period's callback advances the
/// engine by the period's frame count and pushes the materialized
/// messages into a ring buffer for the caller to drain into a MIDI
/// port. Messages that find the ring buffer full are dropped and
/// counted, never waited on.
pub struct CpalClock {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: Option<HeapProd<TimedMessage>>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl CpalClock {
    /// Create a clock on the default output device, locked to the
    /// engine's sample rate.
    pub fn new(engine: &Engine) -> Result<(Self, HeapCons<TimedMessage>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // The stream is the engine's time source, so the rates must
        // agree; a device that cannot run at this rate fails the build
        config.sample_rate = SampleRate(engine.config().sample_rate);

        let rb = HeapRb::<TimedMessage>::new(engine.config().message_capacity * 8);
        let (producer, consumer) = rb.split();

        let clock = Self {
            device,
            config,
            stream: None,
            producer: Some(producer),
            running: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        };

        Ok((clock, consumer))
    }

    /// Build and start the audio stream around `engine`.
    pub fn build_stream(&mut self, engine: Engine) -> Result<(), AudioError> {
        let mut producer = self
            .producer
            .take()
            .ok_or_else(|| AudioError::StreamCreate("stream already built".into()))?;
        let running = self.running.clone();
        let dropped = self.dropped.clone();
        let channels = self.config.channels as usize;
        let mut scratch: Vec<TimedMessage> =
            Vec::with_capacity(engine.config().message_capacity);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // only the callback cadence is used; the audible
                    // output stays silent
                    for sample in data.iter_mut() {
                        *sample = 0.0;
                    }
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }

                    let nframes = (data.len() / channels) as i64;
                    engine.process(nframes, &mut scratch);
                    for msg in scratch.drain(..) {
                        if producer.try_push(msg).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Messages discarded because the ring buffer was full.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Let the callback start advancing the engine.
    pub fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    /// Freeze the transport; the stream keeps running silently.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
