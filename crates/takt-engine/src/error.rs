use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no track named {0:?}")]
    TrackNotFound(String),
    #[error("failed to spawn maintenance worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("maintenance worker already attached to this engine")]
    WorkerAttached,
}
