// ==============================================================================
// race.rs — RACE CONTEXT (ONE OWNED OBJECT PER RACE)
// ------------------------------------------------------------------------------
// Wires StartSequencer + RaceCoordinator and translates their state changes
// into HUD events. The host calls, strictly in sequence:
//
//   fixed_tick(world, controls, dt)      once per physics step
//   on_checkpoint_triggered(id, index)   for every sensor entry the step saw
//   frame_tick(dt, hud, fx)              once per frame
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::race_core::ai::AiConfig;
use crate::race_core::body::VehicleWorld;
use crate::race_core::checkpoints::{CheckpointSet, ProgressEvent};
use crate::race_core::coordinator::{RaceCoordinator, RubberBandConfig};
use crate::race_core::drive::{DriveConfig, EffectsSink, TickReport};
use crate::race_core::error::SetupError;
use crate::race_core::hud::{
    HudEvent, HudSink, ResultLine, format_lap_counter, format_lap_time, format_position,
};
use crate::race_core::start::{StartConfig, StartEvent, StartSequencer};
use crate::race_core::types::{ControlSource, Pos3, Role, VehicleId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceSettings {
    pub total_laps: u32,
    pub start: StartConfig,
    pub rubber_band: RubberBandConfig,
    pub ai: AiConfig,
    /// Fixed seed for AI jitter and speed personalities.
    pub seed: Option<u64>,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            total_laps: 3,
            start: StartConfig::default(),
            rubber_band: RubberBandConfig::default(),
            ai: AiConfig::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub role: Role,
    pub is_player: bool,
    pub position: [f32; 3],
    pub rotation: [f32; 4], // x, y, z, w
    pub speed: f32,
    pub max_speed: f32,
    pub grounded: bool,
    pub lap: u32,
    pub next_checkpoint: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshot {
    pub live: bool,
    pub player_position: usize,
    pub competitors: usize,
    pub total_laps: u32,
    pub vehicles: Vec<VehicleSnapshot>,
}

pub struct Race {
    coordinator: RaceCoordinator,
    start: StartSequencer,
    announced_position: Option<usize>,
    results_sent: bool,
}

impl Race {
    pub fn new(
        settings: &RaceSettings,
        checkpoints: CheckpointSet,
        ai_route: Option<Vec<Pos3>>,
    ) -> Result<Self, SetupError> {
        Ok(Self {
            coordinator: RaceCoordinator::new(
                checkpoints,
                ai_route,
                settings.total_laps,
                settings.rubber_band,
                settings.ai,
                settings.seed,
            )?,
            start: StartSequencer::new(settings.start)?,
            announced_position: None,
            results_sent: false,
        })
    }

    pub fn register(&mut self, id: VehicleId, role: Role, drive: DriveConfig) -> Result<(), SetupError> {
        self.coordinator.register(id, role, drive)
    }

    pub fn validate<W: VehicleWorld + ?Sized>(&self, world: &W) -> Result<(), SetupError> {
        self.coordinator.validate(world)
    }

    pub fn coordinator(&self) -> &RaceCoordinator {
        &self.coordinator
    }

    pub fn is_live(&self) -> bool {
        self.start.is_live()
    }

    /// Opening HUD state: first countdown digit and lap counter.
    pub fn begin(&self, hud: &mut dyn HudSink) {
        match self.start.initial_event() {
            StartEvent::Count(digit) => hud.hud(HudEvent::Countdown { digit }),
            StartEvent::Go => hud.hud(HudEvent::Go),
        }
        hud.hud(HudEvent::LapCounter { text: format_lap_counter(1, self.coordinator.total_laps()) });
    }

    pub fn fixed_tick<W: VehicleWorld + ?Sized>(
        &mut self,
        world: &mut W,
        controls: &dyn ControlSource,
        dt: f32,
    ) -> Vec<(VehicleId, TickReport)> {
        let live = self.start.is_live();
        self.coordinator.simulate(world, controls, live, dt)
    }

    pub fn on_checkpoint_triggered(&mut self, id: VehicleId, index: usize, hud: &mut dyn HudSink) {
        let Some(event) = self.coordinator.on_checkpoint_triggered(id, index) else {
            return;
        };
        if self.coordinator.player_id() != Some(id) {
            return;
        }

        let total = self.coordinator.total_laps();
        match event {
            ProgressEvent::Advanced { .. } => {}
            ProgressEvent::LapCompleted { lap, best_lap, .. } => {
                hud.hud(HudEvent::LapCounter { text: format_lap_counter(lap, total) });
                hud.hud(HudEvent::BestLapTime { text: format_lap_time(best_lap) });
            }
            ProgressEvent::Finished { best_lap, .. } => {
                hud.hud(HudEvent::BestLapTime { text: format_lap_time(best_lap) });
                self.publish_results(hud);
            }
        }
    }

    fn publish_results(&mut self, hud: &mut dyn HudSink) {
        if self.results_sent {
            return;
        }
        self.results_sent = true;
        let player = self.coordinator.player_id();
        let standings = self
            .coordinator
            .results()
            .into_iter()
            .enumerate()
            .map(|(i, (vehicle, record))| ResultLine {
                place: i + 1,
                vehicle,
                is_player: Some(vehicle) == player,
                race_time: record.map(|r| format_lap_time(r.race_time)).unwrap_or_else(|| "--".into()),
                best_lap: record.map(|r| format_lap_time(r.best_lap)).unwrap_or_else(|| "--".into()),
            })
            .collect();
        hud.hud(HudEvent::Results { standings });
    }

    pub fn frame_tick(&mut self, dt: f32, hud: &mut dyn HudSink, fx: &mut dyn EffectsSink) {
        for ev in self.start.tick(dt) {
            match ev {
                StartEvent::Count(digit) => hud.hud(HudEvent::Countdown { digit }),
                StartEvent::Go => hud.hud(HudEvent::Go),
            }
        }

        if self.start.is_live() {
            self.coordinator.tick_clocks(dt);

            if let Some(player) = self.coordinator.player() {
                if !player.tracker.is_finished() {
                    hud.hud(HudEvent::CurrentLapTime { text: format_lap_time(player.tracker.progress().lap_time) });
                }
            }

            if let Some(position) = self.coordinator.poll_rank(dt) {
                if self.announced_position != Some(position) {
                    self.announced_position = Some(position);
                    hud.hud(HudEvent::Position {
                        text: format_position(position, self.coordinator.competitor_count()),
                    });
                }
            }

            self.coordinator.apply_rubber_band(dt);
        }

        for entry in self.coordinator.entries_mut() {
            fx.vehicle_effects(entry.drive.frame_effects(dt));
        }
    }

    pub fn snapshot<W: VehicleWorld + ?Sized>(&self, world: &W) -> RaceSnapshot {
        let vehicles = self
            .coordinator
            .entries()
            .iter()
            .map(|e| {
                let (position, rotation) = match world.body(e.id) {
                    Some(b) => {
                        let p = b.position();
                        let q = b.rotation();
                        ([p.x, p.y, p.z], [q.i, q.j, q.k, q.w])
                    }
                    None => {
                        let p = e.drive.position();
                        ([p.x, p.y, p.z], [0.0, 0.0, 0.0, 1.0])
                    }
                };
                let progress = e.tracker.progress();
                VehicleSnapshot {
                    id: e.id,
                    role: e.role(),
                    is_player: e.is_player,
                    position,
                    rotation,
                    speed: e.drive.speed(),
                    max_speed: e.drive.max_speed(),
                    grounded: e.drive.is_grounded(),
                    lap: progress.current_lap,
                    next_checkpoint: progress.next_checkpoint,
                    finished: e.tracker.is_finished(),
                }
            })
            .collect();

        RaceSnapshot {
            live: self.start.is_live(),
            player_position: self.coordinator.player_position(),
            competitors: self.coordinator.competitor_count(),
            total_laps: self.coordinator.total_laps(),
            vehicles,
        }
    }
}
