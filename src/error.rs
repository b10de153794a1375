//! Unified error handling for the peloton library.
//!
//! Every fallible portal operation returns [`RaceError`]. Validation happens
//! before any state is touched, so an `Err` always means nothing changed.

use thiserror::Error;

/// Unified error type for peloton operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RaceError {
    /// Unknown race, stage, checkpoint, team or rider
    #[error("No {entity} found with ID {id}")]
    NotFound { entity: &'static str, id: u32 },

    /// Rider already has a result registered in the stage
    #[error("Rider {rider_id} already has a result registered in stage {stage_id}")]
    DuplicatedResult { stage_id: u32, rider_id: u32 },

    /// Checkpoint times have the wrong length or go backwards
    #[error("Malformed checkpoint times: {message}")]
    MalformedTimes { message: String },

    /// Operation not allowed in the stage's current state
    #[error("Invalid stage state: {message}")]
    InvalidStageState { message: String },

    /// Operation not allowed for the stage type (checkpoints on a time trial)
    #[error("Invalid stage type: {message}")]
    InvalidStageType { message: String },

    /// Checkpoint location outside `(0, stage length]`
    #[error("Location {location} km is outside stage {stage_id} (length {length} km)")]
    InvalidLocation {
        stage_id: u32,
        location: f64,
        length: f64,
    },

    /// Non-positive stage length
    #[error("Invalid stage length: {length} km")]
    InvalidLength { length: f64 },

    /// Name is empty, too long or contains whitespace
    #[error("Illegal name: {message}")]
    IllegalName { message: String },

    /// Name is already in use
    #[error("Name already in use: {name}")]
    InvalidName { name: String },

    /// No race carries the given name
    #[error("No race found with name: {name}")]
    NameNotRecognised { name: String },

    /// Generic argument validation failure
    #[error("Illegal argument: {message}")]
    IllegalArgument { message: String },

    /// Persistence/storage error
    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

/// Result type alias for peloton operations.
pub type Result<T> = std::result::Result<T, RaceError>;

impl RaceError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        RaceError::MalformedTimes {
            message: message.into(),
        }
    }

    pub(crate) fn stage_state(message: impl Into<String>) -> Self {
        RaceError::InvalidStageState {
            message: message.into(),
        }
    }

    pub(crate) fn illegal_name(message: impl Into<String>) -> Self {
        RaceError::IllegalName {
            message: message.into(),
        }
    }

    /// True for the "unknown identifier" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RaceError::NotFound { .. })
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for RaceError {
    fn from(e: rusqlite::Error) -> Self {
        RaceError::Persistence {
            message: e.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::encode::Error> for RaceError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RaceError::Persistence {
            message: e.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::decode::Error> for RaceError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RaceError::Persistence {
            message: e.to_string(),
        }
    }
}

/// Extension trait for converting Option lookups to RaceError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a not-found error for the given entity.
    fn ok_or_not_found(self, entity: &'static str, id: u32) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &'static str, id: u32) -> Result<T> {
        self.ok_or(RaceError::NotFound { entity, id })
    }
}
