use thiserror::Error;




/**
 * Errors raised by mesh construction, adaptation and halo exchange. Geometric
 * precondition violations (malformed intervals, boxes with negative volume)
 * are not represented here: those are programming errors and panic at the
 * point of construction.
 */
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid leaves: {0}")]
    InvalidCells(String),

    #[error("graduation did not reach a fixed point within {iterations} iterations")]
    GraduationDiverged { iterations: usize },

    #[error("payload from rank {rank} at level {level} holds {received} values, expected {expected}")]
    PayloadSize {
        rank: usize,
        level: usize,
        expected: usize,
        received: usize,
    },

    #[error("could not decode message from rank {rank}: {reason}")]
    Decode { rank: usize, reason: String },

    #[error("could not encode message: {0}")]
    Encode(String),

    #[error("transport failure: {0}")]
    Transport(String),
}




pub type Result<T> = std::result::Result<T, Error>;
