// ==============================================================================
// checkpoints.rs — ORDERED CHECKPOINTS + PER-VEHICLE LAP TRACKER
// ------------------------------------------------------------------------------
// CheckpointSet is fixed at setup; index = array position.
//
// CheckpointTracker:  Racing --(wrap, lap <= total)--> Racing
//                     Racing --(wrap, lap >  total)--> Finished
//
// Only a trigger for exactly next_checkpoint is accepted. Anything else
// (skipping ahead, re-triggering, out-of-range index) is a silent no-op.
// ==============================================================================

use log::info;

use crate::race_core::error::SetupError;
use crate::race_core::types::{Pos3, VehicleId};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSet {
    points: Vec<Pos3>,
}

impl CheckpointSet {
    pub fn new(points: Vec<Pos3>) -> Result<Self, SetupError> {
        if points.is_empty() {
            return Err(SetupError::NoCheckpoints);
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<Pos3> {
        self.points.get(index).copied()
    }

    pub fn positions(&self) -> &[Pos3] {
        &self.points
    }

    /// The checkpoint passed just before `next`, wrapping to the last one.
    pub fn previous(&self, next: usize) -> usize {
        if next == 0 { self.points.len() - 1 } else { (next - 1) % self.points.len() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapProgress {
    pub next_checkpoint: usize,
    pub current_lap: u32, // starts at 1
    pub lap_time: f32,    // s
    pub best_lap: Option<f32>,
}

impl Default for LapProgress {
    fn default() -> Self {
        Self { next_checkpoint: 0, current_lap: 1, lap_time: 0.0, best_lap: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerState {
    Racing,
    Finished,
}

/// What an accepted trigger did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    Advanced { next: usize },
    LapCompleted { lap: u32, lap_time: f32, best_lap: f32 },
    Finished { lap_time: f32, best_lap: f32, race_time: f32 },
}

#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    vehicle: VehicleId,
    progress: LapProgress,
    state: TrackerState,
    checkpoint_count: usize,
    total_laps: u32,
    race_time: f32,
}

impl CheckpointTracker {
    pub fn new(vehicle: VehicleId, checkpoint_count: usize, total_laps: u32) -> Result<Self, SetupError> {
        if checkpoint_count == 0 {
            return Err(SetupError::NoCheckpoints);
        }
        if total_laps == 0 {
            return Err(SetupError::InvalidTotalLaps(total_laps));
        }
        Ok(Self {
            vehicle,
            progress: LapProgress::default(),
            state: TrackerState::Racing,
            checkpoint_count,
            total_laps,
            race_time: 0.0,
        })
    }

    pub fn progress(&self) -> &LapProgress { &self.progress }
    pub fn state(&self) -> TrackerState { self.state }
    pub fn total_laps(&self) -> u32 { self.total_laps }
    pub fn race_time(&self) -> f32 { self.race_time }

    pub fn is_finished(&self) -> bool {
        self.state == TrackerState::Finished
    }

    /// Accumulates lap and race time while racing.
    pub fn tick(&mut self, dt: f32) {
        if self.state == TrackerState::Racing {
            self.progress.lap_time += dt;
            self.race_time += dt;
        }
    }

    pub fn on_checkpoint_triggered(&mut self, index: usize) -> Option<ProgressEvent> {
        if self.state == TrackerState::Finished || index != self.progress.next_checkpoint {
            return None;
        }

        self.progress.next_checkpoint = (self.progress.next_checkpoint + 1) % self.checkpoint_count;
        if self.progress.next_checkpoint != 0 {
            return Some(ProgressEvent::Advanced { next: self.progress.next_checkpoint });
        }
        Some(self.on_lap_completed())
    }

    fn on_lap_completed(&mut self) -> ProgressEvent {
        let lap_time = self.progress.lap_time;
        let best_lap = match self.progress.best_lap {
            Some(best) if best <= lap_time => best,
            _ => lap_time,
        };
        self.progress.best_lap = Some(best_lap);
        self.progress.current_lap += 1;
        self.progress.lap_time = 0.0;

        if self.progress.current_lap > self.total_laps {
            self.state = TrackerState::Finished;
            info!("{} finished: best lap {:.3}s, total {:.3}s", self.vehicle, best_lap, self.race_time);
            ProgressEvent::Finished { lap_time, best_lap, race_time: self.race_time }
        } else {
            info!("{} lap {} done in {:.3}s", self.vehicle, self.progress.current_lap - 1, lap_time);
            ProgressEvent::LapCompleted { lap: self.progress.current_lap, lap_time, best_lap }
        }
    }
}
