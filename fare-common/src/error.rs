//! Common error types for the facility aggregation engine

use crate::consensus::UndefinedTransition;
use crate::models::{FacilityId, SpaceId};
use thiserror::Error;

/// Common result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the engine and its storage collaborator
#[derive(Error, Debug)]
pub enum Error {
    /// The consensus fold hit a transition with no defined outcome.
    ///
    /// Aborts recomputation of the whole space. Callers should raise an
    /// operator alert rather than show this to end users.
    #[error("Aggregation inconsistency for space {space_id}, facility {facility_id}: {source}")]
    AggregationInconsistency {
        space_id: SpaceId,
        facility_id: FacilityId,
        #[source]
        source: UndefinedTransition,
    },

    /// Storage collaborator failure (wraps sqlx::Error), never retried here
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// Desired facility filter could not be parsed
    #[error("Invalid filter input: {0}")]
    InvalidFilterInput(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or stored value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
