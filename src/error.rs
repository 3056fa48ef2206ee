//! Error types shared by the race core

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    #[error("{pool} pool exhausted, no unique entries left")]
    PoolExhausted { pool: &'static str },

    #[error("result for racer {0} already recorded")]
    AlreadyRecorded(String),

    #[error("racer {0} has no physics body")]
    MissingBody(Uuid),

    #[error("failed to read track file {path}: {source}")]
    TrackIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid track file: {0}")]
    TrackFormat(#[from] serde_json::Error),

    #[error("invalid track: {0}")]
    InvalidTrack(&'static str),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
