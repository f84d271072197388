//! Simulation error types.

use std::path::PathBuf;

use arbiter_io::{Extent, RequestId, ResolverError};

/// Errors surfaced by a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The resolver rejected a call.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Tried to complete a request the disk is not running.
    #[error("request {id} is not in flight")]
    NotInFlight { id: RequestId },

    /// Asked for the result of a request that has not been reported done.
    #[error("request {id} has not completed")]
    NotCompleted { id: RequestId },

    /// A read came back with bytes other than the ones expected.
    #[error("Read returned wrong data for {id}: expected {expected:?}, got {actual:?}")]
    ReadMismatch {
        id: RequestId,
        expected: String,
        actual: String,
    },

    /// A correctness property did not hold.
    #[error("invariant violation ({invariant}): {message}")]
    InvariantViolation { invariant: String, message: String },

    /// Requests are held but nothing is in flight to release them.
    #[error("simulation stalled: {held} requests held with nothing in flight")]
    Stalled { held: usize },

    /// An extent the backing store cannot address.
    #[error("extent not addressable by the backing store: {extent}")]
    InvalidExtent { extent: Extent },

    /// The backing store has no room for the extent.
    #[error("disk full: {extent} exceeds capacity of {capacity} bytes")]
    DiskFull { extent: Extent, capacity: usize },

    /// Configuration values out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`SimConfig`](crate::SimConfig).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
