//! race_core - engine-agnostic arcade drive model and race bookkeeping
//! (ground probe, drive forces, AI driver, laps, ranking, rubber band, countdown).

pub mod types;
pub mod error;
pub mod body;
pub mod ground;
pub mod drive;
pub mod ai;
pub mod checkpoints;
pub mod coordinator;
pub mod start;
pub mod hud;
pub mod race;

#[cfg(test)]
pub(crate) mod testing;

pub use body::{RigidBodyPort, VehicleWorld};
pub use error::SetupError;
pub use ground::{GroundProbe, GroundQuery, GroundSensor};
pub use race::{Race, RaceSettings, RaceSnapshot};
pub use types::*;
