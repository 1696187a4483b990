//! Background thread that keeps track queues filled.

use std::thread::JoinHandle;

use crossbeam_channel::{select, Sender};
use log::{debug, error};

use crate::engine::Engine;
use crate::error::EngineError;

/// Owns the maintenance thread. Content generation happens here, off
/// the audio thread: the loop sweeps all tracks whenever the engine
/// rings its doorbell, and periodically as a fallback.
///
/// Dropping the handle shuts the thread down.
pub struct Maintenance {
    thread: Option<JoinHandle<()>>,
    shutdown: Sender<()>,
}

impl Maintenance {
    /// Spawn the worker for `engine`. Each engine supports one worker;
    /// a second spawn returns [`EngineError::WorkerAttached`].
    pub fn spawn(engine: Engine) -> Result<Self, EngineError> {
        let bell = engine.take_doorbell().ok_or(EngineError::WorkerAttached)?;
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let interval = engine.config().maintenance_interval;

        let thread = std::thread::Builder::new()
            .name("takt-maintenance".into())
            .spawn(move || {
                debug!("maintenance worker up");
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(bell) -> _ => engine.maintain(),
                        default(interval) => engine.maintain(),
                    }
                }
                debug!("maintenance worker down");
            })?;

        Ok(Self {
            thread: Some(thread),
            shutdown: shutdown_tx,
        })
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("maintenance worker panicked");
            }
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
