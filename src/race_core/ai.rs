// ==============================================================================
// ai.rs — POINT-SEEK AI DRIVER
// ------------------------------------------------------------------------------
// Produces the same DriveInput a player would, so AI cars run through the exact
// drive model the player does.
//
//   steer    = clamp(signed_bearing_deg / max_turn, -1, 1)
//   throttle = eased toward 1 when the bearing is within max_turn,
//              toward turn_speed otherwise; then scaled by a per-car speed mod
//
// Every new target is the next route point plus a fresh random XZ offset,
// including when the route wraps back to its first point.
// ==============================================================================

use log::debug;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::race_core::error::{SetupError, ensure_non_negative};
use crate::race_core::types::{DriveInput, Pos3, Pose, Vec3, forward_of, move_towards, right_of};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub accelerate_speed: f32, // throttle step per tick
    pub turn_speed: f32,       // throttle held while turning sharply
    pub reach_range: f32,      // m
    pub point_variance: f32,   // m, +/- jitter on X and Z
    pub max_turn: f32,         // deg, bearing for full steer
    pub speed_mod_min: f32,
    pub speed_mod_max: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            accelerate_speed: 1.0,
            turn_speed: 0.8,
            reach_range: 5.0,
            point_variance: 3.0,
            max_turn: 30.0,
            speed_mod_min: 0.8,
            speed_mod_max: 1.1,
        }
    }
}

impl AiConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        ensure_non_negative("ai.accelerate_speed", self.accelerate_speed)?;
        ensure_non_negative("ai.turn_speed", self.turn_speed)?;
        ensure_non_negative("ai.reach_range", self.reach_range)?;
        ensure_non_negative("ai.point_variance", self.point_variance)?;
        ensure_non_negative("ai.speed_mod_min", self.speed_mod_min)?;
        ensure_non_negative("ai.speed_mod_max", self.speed_mod_max)?;
        if !(self.max_turn.is_finite() && self.max_turn > 0.0) {
            return Err(SetupError::InvalidConstant { what: "ai.max_turn", value: self.max_turn });
        }
        if self.speed_mod_max < self.speed_mod_min {
            return Err(SetupError::InvalidConstant { what: "ai.speed_mod_max", value: self.speed_mod_max });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AiDriver {
    config: AiConfig,
    current_target: usize,
    target_point: Pos3,
    speed_input: f32,
    speed_mod: f32,
}

impl AiDriver {
    /// Fresh AI car: draws its speed personality and aims at the first route point.
    pub fn new(config: AiConfig, route: &[Pos3], rng: &mut StdRng) -> Result<Self, SetupError> {
        config.validate()?;
        let speed_mod = if config.speed_mod_max > config.speed_mod_min {
            rng.gen_range(config.speed_mod_min..config.speed_mod_max)
        } else {
            config.speed_mod_min
        };
        Self::targeting(config, route, 0, speed_mod, rng)
    }

    /// Takes over a car that was human driven (finished player or "Enable AI").
    pub fn take_over(config: AiConfig, route: &[Pos3], target: usize, rng: &mut StdRng) -> Result<Self, SetupError> {
        config.validate()?;
        Self::targeting(config, route, target, 1.0, rng)
    }

    fn targeting(
        config: AiConfig,
        route: &[Pos3],
        target: usize,
        speed_mod: f32,
        rng: &mut StdRng,
    ) -> Result<Self, SetupError> {
        if route.is_empty() {
            return Err(SetupError::EmptyAiRoute);
        }
        let current_target = target % route.len();
        let mut driver = Self {
            config,
            current_target,
            target_point: route[current_target],
            speed_input: 0.0,
            speed_mod,
        };
        driver.randomise_target(rng);
        Ok(driver)
    }

    pub fn current_target(&self) -> usize { self.current_target }
    pub fn target_point(&self) -> Pos3 { self.target_point }
    pub fn speed_mod(&self) -> f32 { self.speed_mod }

    fn randomise_target(&mut self, rng: &mut StdRng) {
        let v = self.config.point_variance;
        if v > 0.0 {
            self.target_point.x += rng.gen_range(-v..v);
            self.target_point.z += rng.gen_range(-v..v);
        }
    }

    /// Moves on to the next route point, wrapping at the end.
    pub fn advance(&mut self, route: &[Pos3], rng: &mut StdRng) {
        if route.is_empty() {
            return;
        }
        self.current_target = (self.current_target + 1) % route.len();
        self.target_point = route[self.current_target];
        self.randomise_target(rng);
        debug!("ai target -> #{} at {:?}", self.current_target, self.target_point);
    }

    /// Checkpoint-driven retarget, used when the AI route is the checkpoint list.
    pub fn on_checkpoint(&mut self, index: usize, route: &[Pos3], rng: &mut StdRng) {
        if index == self.current_target {
            self.advance(route, rng);
        }
    }

    /// Signed bearing in degrees from the chassis forward to the target, positive = right.
    pub fn bearing_deg(pose: &Pose, target: Pos3) -> f32 {
        let to_target: Vec3 = target - Pos3::from(pose.translation.vector);
        let forward = forward_of(&pose.rotation);
        if to_target.norm_squared() <= f32::EPSILON {
            return 0.0;
        }
        let angle = forward.angle(&to_target).to_degrees();
        if to_target.dot(&right_of(&pose.rotation)) < 0.0 { -angle } else { angle }
    }

    pub fn steer(&mut self, pose: &Pose, route: &[Pos3], rng: &mut StdRng) -> DriveInput {
        let position = Pos3::from(pose.translation.vector);
        self.target_point.y = position.y;
        if nalgebra::distance(&position, &self.target_point) < self.config.reach_range {
            self.advance(route, rng);
            self.target_point.y = position.y;
        }

        let angle = Self::bearing_deg(pose, self.target_point);
        let steer = (angle / self.config.max_turn).clamp(-1.0, 1.0);

        let goal = if angle.abs() < self.config.max_turn { 1.0 } else { self.config.turn_speed };
        self.speed_input = move_towards(self.speed_input, goal, self.config.accelerate_speed);

        DriveInput {
            throttle: self.speed_input * self.speed_mod,
            steer,
            brake: false,
            handbrake: false,
        }
    }
}
