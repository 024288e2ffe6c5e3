// ==============================================================================
// coordinator.rs — RACE ROSTER, RANKING, RUBBER BAND
// ==============================================================================
// Owns every vehicle's drive model, lap tracker and (optional) AI driver.
//
// Fixed tick  : simulate()            : inputs -> ground probe -> drive model
// Frame tick  : tick_clocks()         : lap timers
//               poll_rank()           : every poll_interval, not every frame
//               apply_rubber_band()   : every frame, rate limited
// Events      : on_checkpoint_triggered() -> tracker -> on_vehicle_finished()
//
// Ranking compares each AI against the player only:
//   lap  >  next checkpoint index  >  distance to that checkpoint (closer wins)
// player_position = 1 + number of AI cars ahead.
//
// Rubber band (n = AI count, p = player_position):
//   p == 1 : ai -> ai_default + mod            player -> player_default - mod
//   p >  1 : ai -> ai_default - mod*p/(n+1)    player -> player_default + mod*p/(n+1)
// max_speed moves toward its target by at most accel*dt per frame.
// ==============================================================================

use std::cmp::Ordering;

use log::{info, warn};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::race_core::ai::{AiConfig, AiDriver};
use crate::race_core::body::VehicleWorld;
use crate::race_core::checkpoints::{CheckpointSet, CheckpointTracker, ProgressEvent};
use crate::race_core::drive::{DriveConfig, TickReport, VehicleDriveModel};
use crate::race_core::error::{SetupError, ensure_non_negative, ensure_positive_interval};
use crate::race_core::types::{Control, ControlSource, DriveInput, Pos3, Role, Rot3, Vec3, VehicleId, move_towards};

// ============================================
// ----- ranking ------------------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing {
    pub lap: u32,
    pub next_checkpoint: usize,
    pub distance_to_next: f32, // m
}

impl Standing {
    /// Race order: Greater means further ahead.
    pub fn race_cmp(&self, other: &Standing) -> Ordering {
        self.lap
            .cmp(&other.lap)
            .then(self.next_checkpoint.cmp(&other.next_checkpoint))
            .then_with(|| {
                other
                    .distance_to_next
                    .partial_cmp(&self.distance_to_next)
                    .unwrap_or(Ordering::Equal)
            })
    }

    pub fn is_ahead_of(&self, other: &Standing) -> bool {
        self.race_cmp(other) == Ordering::Greater
    }
}

pub fn player_position<'a>(player: &Standing, ai: impl IntoIterator<Item = &'a Standing>) -> usize {
    1 + ai.into_iter().filter(|s| s.is_ahead_of(player)).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RubberBandConfig {
    pub ai_default_speed: f32,     // m/s
    pub player_default_speed: f32, // m/s
    pub speed_mod: f32,            // m/s
    pub accel: f32,                // m/s per second
    pub poll_interval: f32,        // s between rank checks
}

impl Default for RubberBandConfig {
    fn default() -> Self {
        Self {
            ai_default_speed: 30.0,
            player_default_speed: 30.0,
            speed_mod: 3.5,
            accel: 0.5,
            poll_interval: 0.2,
        }
    }
}

impl RubberBandConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        ensure_positive_interval("rank poll interval", self.poll_interval)?;
        ensure_non_negative("rubber band speed_mod", self.speed_mod)?;
        ensure_non_negative("rubber band accel", self.accel)?;
        // every reachable target must stay a valid max speed
        for v in [
            self.ai_default_speed - self.speed_mod,
            self.player_default_speed - self.speed_mod,
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(SetupError::InvalidMaxSpeed(v));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubberBandTargets {
    pub ai: f32,
    pub player: f32,
}

pub fn rubber_band_targets(cfg: &RubberBandConfig, position: usize, ai_count: usize) -> RubberBandTargets {
    if position <= 1 {
        RubberBandTargets {
            ai: cfg.ai_default_speed + cfg.speed_mod,
            player: cfg.player_default_speed - cfg.speed_mod,
        }
    } else {
        let share = cfg.speed_mod * (position as f32 / (ai_count as f32 + 1.0));
        RubberBandTargets {
            ai: cfg.ai_default_speed - share,
            player: cfg.player_default_speed + share,
        }
    }
}

// ============================================
// ----- roster -------------------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinishRecord {
    pub vehicle: VehicleId,
    pub place: usize,
    pub race_time: f32,
    pub best_lap: f32,
}

pub struct RaceEntry {
    pub id: VehicleId,
    /// The human's car; stays true after an AI takes the wheel.
    pub is_player: bool,
    pub drive: VehicleDriveModel,
    pub tracker: CheckpointTracker,
    pub ai: Option<AiDriver>,
    reset_timer: f32,
}

impl RaceEntry {
    pub fn role(&self) -> Role {
        if self.ai.is_some() { Role::Ai } else { Role::Player }
    }
}

pub struct RaceCoordinator {
    checkpoints: CheckpointSet,
    ai_route: Vec<Pos3>,
    route_is_checkpoints: bool,
    total_laps: u32,
    rubber_band: RubberBandConfig,
    ai_config: AiConfig,
    rng: StdRng,

    entries: Vec<RaceEntry>,
    player: Option<VehicleId>,
    player_position: usize,
    poll_timer: f32,
    finish_order: Vec<FinishRecord>,
}

impl RaceCoordinator {
    /// `ai_route` of None means the AI follows the checkpoints.
    pub fn new(
        checkpoints: CheckpointSet,
        ai_route: Option<Vec<Pos3>>,
        total_laps: u32,
        rubber_band: RubberBandConfig,
        ai_config: AiConfig,
        seed: Option<u64>,
    ) -> Result<Self, SetupError> {
        if total_laps == 0 {
            return Err(SetupError::InvalidTotalLaps(total_laps));
        }
        rubber_band.validate()?;
        ai_config.validate()?;

        let route_is_checkpoints = ai_route.is_none();
        let ai_route = ai_route.unwrap_or_else(|| checkpoints.positions().to_vec());
        if ai_route.is_empty() {
            return Err(SetupError::EmptyAiRoute);
        }

        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            checkpoints,
            ai_route,
            route_is_checkpoints,
            total_laps,
            rubber_band,
            ai_config,
            rng,
            entries: Vec::new(),
            player: None,
            player_position: 1,
            poll_timer: 0.0,
            finish_order: Vec::new(),
        })
    }

    pub fn register(&mut self, id: VehicleId, role: Role, drive: DriveConfig) -> Result<(), SetupError> {
        if role == Role::Player && self.player.is_some() {
            return Err(SetupError::DuplicatePlayer);
        }
        let ai = match role {
            Role::Ai => Some(AiDriver::new(self.ai_config, &self.ai_route, &mut self.rng)?),
            Role::Player => None,
        };
        let entry = RaceEntry {
            id,
            is_player: role == Role::Player,
            drive: VehicleDriveModel::new(id, drive)?,
            tracker: CheckpointTracker::new(id, self.checkpoints.len(), self.total_laps)?,
            ai,
            reset_timer: drive.reset_cooldown,
        };
        if role == Role::Player {
            self.player = Some(id);
        }
        info!("registered {id} as {role:?}");
        self.entries.push(entry);
        Ok(())
    }

    /// Setup check: a player exists and every car has a body in the world.
    pub fn validate<W: VehicleWorld + ?Sized>(&self, world: &W) -> Result<(), SetupError> {
        if self.player.is_none() {
            return Err(SetupError::MissingPlayer);
        }
        for e in &self.entries {
            if world.body(e.id).is_none() {
                return Err(SetupError::MissingBody(e.id));
            }
        }
        Ok(())
    }

    pub fn checkpoints(&self) -> &CheckpointSet { &self.checkpoints }
    pub fn entries(&self) -> &[RaceEntry] { &self.entries }
    pub(crate) fn entries_mut(&mut self) -> &mut [RaceEntry] { &mut self.entries }
    pub fn player_id(&self) -> Option<VehicleId> { self.player }
    pub fn player_position(&self) -> usize { self.player_position }
    pub fn competitor_count(&self) -> usize { self.entries.len() }
    pub fn total_laps(&self) -> u32 { self.total_laps }
    pub fn finish_order(&self) -> &[FinishRecord] { &self.finish_order }

    pub fn entry(&self, id: VehicleId) -> Option<&RaceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn entry_index(&self, id: VehicleId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn player(&self) -> Option<&RaceEntry> {
        self.player.and_then(|id| self.entry(id))
    }

    // ------------------------------------------------------------------
    // fixed tick
    // ------------------------------------------------------------------

    /// One physics step for every vehicle. `live` gates all movement input.
    pub fn simulate<W: VehicleWorld + ?Sized>(
        &mut self,
        world: &mut W,
        controls: &dyn ControlSource,
        live: bool,
        dt: f32,
    ) -> Vec<(VehicleId, TickReport)> {
        let mut reports = Vec::with_capacity(self.entries.len());

        for i in 0..self.entries.len() {
            let id = self.entries[i].id;
            let Some(pose) = world.body(id).map(|b| b.pose()) else {
                warn!("{id}: no rigid body, skipping tick");
                continue;
            };

            if live && self.entries[i].ai.is_none() {
                if controls.button(Control::EnableAi) {
                    self.hand_to_ai(i, pose.translation.vector.into());
                } else {
                    self.handle_reset(i, world, controls, dt);
                }
            }

            let Self { entries, ai_route, rng, .. } = self;
            let entry = &mut entries[i];

            let Some(pose) = world.body(id).map(|b| b.pose()) else { continue };
            let input = if !live {
                DriveInput::idle()
            } else if let Some(ai) = entry.ai.as_mut() {
                ai.steer(&pose, ai_route, rng)
            } else {
                DriveInput::from_controls(controls)
            };

            let probe = entry.drive.sensor().probe(id, &pose, &*world);
            let Some(body) = world.body_mut(id) else { continue };
            let report = entry.drive.fixed_tick(body, probe, input, dt);
            reports.push((id, report));
        }
        reports
    }

    fn handle_reset<W: VehicleWorld + ?Sized>(
        &mut self,
        i: usize,
        world: &mut W,
        controls: &dyn ControlSource,
        dt: f32,
    ) {
        let entry = &mut self.entries[i];
        if entry.reset_timer > 0.0 {
            entry.reset_timer -= dt;
        }
        if !controls.button(Control::Reset) || entry.reset_timer > 0.0 {
            return;
        }

        let next = entry.tracker.progress().next_checkpoint;
        let back_to = self.checkpoints.previous(next);
        let Some(base) = self.checkpoints.position(back_to) else { return };
        let target = base + Vector3::y() * entry.drive.config().reset_height;

        // face the gate the car still has to pass
        let mut ahead = self.checkpoints.position(next).map(|p| p - base).unwrap_or_else(Vector3::z);
        ahead.y = 0.0;
        let facing = ahead.try_normalize(1e-6).map(|d| Rot3::face_towards(&d, &Vector3::y()));

        if let Some(body) = world.body_mut(entry.id) {
            body.teleport(target);
            body.set_linear_velocity(Vec3::zeros());
            if let Some(rot) = facing {
                body.set_rotation(rot);
            }
            entry.drive.observe(body);
        }
        entry.reset_timer = entry.drive.config().reset_cooldown;
        info!("{} reset to checkpoint {}", entry.id, back_to);
    }

    fn nearest_route_point(&self, from: Pos3) -> usize {
        self.ai_route
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                nalgebra::distance_squared(a, &from)
                    .partial_cmp(&nalgebra::distance_squared(b, &from))
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn hand_to_ai(&mut self, i: usize, position: Pos3) {
        let target = if self.route_is_checkpoints {
            self.entries[i].tracker.progress().next_checkpoint
        } else {
            self.nearest_route_point(position)
        };
        match AiDriver::take_over(self.ai_config, &self.ai_route, target, &mut self.rng) {
            Ok(ai) => {
                info!("{} now AI driven (target #{})", self.entries[i].id, ai.current_target());
                self.entries[i].ai = Some(ai);
            }
            Err(e) => warn!("{}: AI take-over failed: {e}", self.entries[i].id),
        }
    }

    // ------------------------------------------------------------------
    // frame tick
    // ------------------------------------------------------------------

    pub fn tick_clocks(&mut self, dt: f32) {
        for e in &mut self.entries {
            e.tracker.tick(dt);
        }
    }

    pub fn standing_of(&self, entry: &RaceEntry) -> Standing {
        let p = entry.tracker.progress();
        let distance_to_next = self
            .checkpoints
            .position(p.next_checkpoint)
            .map(|cp| nalgebra::distance(&entry.drive.position(), &cp))
            .unwrap_or(f32::INFINITY);
        Standing { lap: p.current_lap, next_checkpoint: p.next_checkpoint, distance_to_next }
    }

    pub fn recompute_rank(&mut self) -> usize {
        let Some(player) = self.player() else {
            return self.player_position;
        };
        let me = self.standing_of(player);
        let others: Vec<Standing> = self
            .entries
            .iter()
            .filter(|e| !e.is_player)
            .map(|e| self.standing_of(e))
            .collect();
        self.player_position = player_position(&me, &others);
        self.player_position
    }

    /// Re-ranks once the poll interval has elapsed; returns the new position then.
    pub fn poll_rank(&mut self, dt: f32) -> Option<usize> {
        self.poll_timer -= dt;
        if self.poll_timer > 0.0 {
            return None;
        }
        self.poll_timer = self.rubber_band.poll_interval;
        Some(self.recompute_rank())
    }

    pub fn apply_rubber_band(&mut self, dt: f32) {
        let ai_count = self.entries.iter().filter(|e| !e.is_player).count();
        let targets = rubber_band_targets(&self.rubber_band, self.player_position, ai_count);
        let step = self.rubber_band.accel * dt;
        for e in &mut self.entries {
            let target = if e.is_player { targets.player } else { targets.ai };
            let next = move_towards(e.drive.max_speed(), target, step);
            e.drive.set_max_speed(next);
        }
    }

    // ------------------------------------------------------------------
    // events
    // ------------------------------------------------------------------

    pub fn on_checkpoint_triggered(&mut self, id: VehicleId, index: usize) -> Option<ProgressEvent> {
        let i = self.entry_index(id)?;
        let Self { entries, ai_route, rng, route_is_checkpoints, .. } = self;
        let entry = &mut entries[i];

        if *route_is_checkpoints {
            if let Some(ai) = entry.ai.as_mut() {
                ai.on_checkpoint(index, ai_route, rng);
            }
        }

        let event = entry.tracker.on_checkpoint_triggered(index);
        if let Some(ProgressEvent::Finished { race_time, best_lap, .. }) = event {
            self.on_vehicle_finished(id, race_time, best_lap);
        }
        event
    }

    pub fn on_vehicle_finished(&mut self, id: VehicleId, race_time: f32, best_lap: f32) {
        if self.finish_order.iter().any(|r| r.vehicle == id) {
            return;
        }
        let place = self.finish_order.len() + 1;
        self.finish_order.push(FinishRecord { vehicle: id, place, race_time, best_lap });
        info!("{id} finished in place {place}");

        let Some(i) = self.entry_index(id) else { return };
        if self.entries[i].is_player && self.entries[i].ai.is_none() {
            let position = self.entries[i].drive.position();
            self.hand_to_ai(i, position);
        }
    }

    /// Finishers in order, then everyone else by current race order.
    pub fn results(&self) -> Vec<(VehicleId, Option<FinishRecord>)> {
        let mut out: Vec<(VehicleId, Option<FinishRecord>)> =
            self.finish_order.iter().map(|r| (r.vehicle, Some(*r))).collect();

        let mut running: Vec<(&RaceEntry, Standing)> = self
            .entries
            .iter()
            .filter(|e| !self.finish_order.iter().any(|r| r.vehicle == e.id))
            .map(|e| (e, self.standing_of(e)))
            .collect();
        running.sort_by(|a, b| b.1.race_cmp(&a.1));
        out.extend(running.into_iter().map(|(e, _)| (e.id, None)));
        out
    }
}
