pub mod config;
pub mod net;
pub mod physics;
pub mod race_core;
pub mod spawn;
pub mod state;
