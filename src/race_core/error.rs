// race_core/error.rs
use std::error::Error;
use std::fmt;

use crate::race_core::types::VehicleId;

/// Configuration problems that must stop a race before it starts.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupError {
    NoCheckpoints,
    EmptyAiRoute,
    InvalidMaxSpeed(f32),
    InvalidProbeDistance(f32),
    InvalidInterval { what: &'static str, value: f32 },
    InvalidTotalLaps(u32),
    InvalidConstant { what: &'static str, value: f32 },
    DuplicatePlayer,
    MissingPlayer,
    MissingBody(VehicleId),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::NoCheckpoints => write!(f, "track has no checkpoints"),
            SetupError::EmptyAiRoute => write!(f, "AI route has no waypoints"),
            SetupError::InvalidMaxSpeed(v) => write!(f, "max speed must be > 0 (got {v})"),
            SetupError::InvalidProbeDistance(v) => {
                write!(f, "ground probe distance must be > 0 (got {v})")
            }
            SetupError::InvalidInterval { what, value } => {
                write!(f, "{what} must be > 0 (got {value})")
            }
            SetupError::InvalidTotalLaps(v) => write!(f, "total laps must be >= 1 (got {v})"),
            SetupError::InvalidConstant { what, value } => {
                write!(f, "{what} must be finite and >= 0 (got {value})")
            }
            SetupError::DuplicatePlayer => write!(f, "a player vehicle is already registered"),
            SetupError::MissingPlayer => write!(f, "no player vehicle registered"),
            SetupError::MissingBody(id) => write!(f, "{id} has no rigid body in the world"),
        }
    }
}

impl Error for SetupError {}

/// Rejects negative or non-finite tuning constants.
pub(crate) fn ensure_non_negative(what: &'static str, value: f32) -> Result<(), SetupError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SetupError::InvalidConstant { what, value })
    }
}

pub(crate) fn ensure_positive_interval(what: &'static str, value: f32) -> Result<(), SetupError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SetupError::InvalidInterval { what, value })
    }
}
