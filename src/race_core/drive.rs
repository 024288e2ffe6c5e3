// ==============================================================================
// drive.rs — ARCADE VEHICLE DRIVE MODEL (FORCE + YAW, PER FIXED TICK)
// ==============================================================================
// Per fixed tick, in order:
//   1) ground probe result decides Grounded / Airborne
//   2) Grounded: blend chassis up toward the ground normal (shortest arc) and
//      use ground drag. Airborne: low drag + extra downward force.
//   3) forward/reverse force from throttle (reverse uses the weaker constant)
//   4) propulsion only while grounded, applied at centre / front / rear point
//   5) |v| clamped to max_speed (always, grounded or not)
//   6) yaw steering, per SteeringMode and SteeringGate
//   7) lateral friction (scales chassis-local sideways velocity)
//
// Wheel angles, dust emission, engine pitch and skid volume are derived outputs
// computed once per frame in `frame_effects`; they never feed back into physics.
//
// max_speed is written only by the race coordinator (rubber band); this model
// treats it as read-only inside its own tick.
// ==============================================================================

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::race_core::body::RigidBodyPort;
use crate::race_core::error::{SetupError, ensure_non_negative};
use crate::race_core::ground::{GroundProbe, GroundSensor, GroundSensorConfig};
use crate::race_core::types::{
    DriveInput, GroundMask, Pos3, Pose, Rot3, Vec3, VehicleId, forward_of, move_towards, to_pos, up_of,
};

const STEER_MIN_SPEED_SQ: f32 = 0.01; // (m/s)^2
const SIMPLE_STEER_MIN_SPEED: f32 = 1.0; // m/s
const BRAKE_MIN_SPEED_SQ: f32 = 0.01; // (m/s)^2

// ============================================
// ----- options ------------------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringMode {
    /// Fixed yaw rate, only above walking pace and with throttle held.
    Simple,
    /// Yaw scales with speed / inertia_factor, reversed when rolling backwards.
    WithInertia,
    /// Yaw scales with speed / max_speed, reversed when reversing.
    SpeedScaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateralFrictionMode {
    None,
    Clamp50,
    Clamp25,
}

impl LateralFrictionMode {
    pub fn keep_fraction(self) -> f32 {
        match self {
            LateralFrictionMode::None => 1.0,
            LateralFrictionMode::Clamp50 => 0.5,
            LateralFrictionMode::Clamp25 => 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeMode {
    Normal,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveType {
    Center,
    Front,
    Rear,
}

/// Which conditions must hold before steering input turns the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringGate {
    GroundedAndThrottle,
    GroundedOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    // --- Propulsion ---
    pub forward_accel: f32, // accel units per full throttle
    pub reverse_accel: f32, // weaker than forward
    pub force_scale: f32,   // N per accel unit
    pub max_speed: f32,     // m/s, initial value before rubber banding

    // --- Steering ---
    pub turn_strength: f32,  // deg/s at full authority
    pub inertia_factor: f32, // m/s for full authority in WithInertia
    pub max_wheel_turn: f32, // deg, visual only

    // --- Ground / air ---
    pub ground_drag: f32,
    pub air_drag: f32,
    pub air_gravity: f32,       // extra m/s^2 pulling down while airborne
    pub ground_align_rate: f32, // 1/s, blend rate toward the ground normal
    pub sensor: GroundSensorConfig,

    // --- Brakes ---
    pub brake_force: f32,       // N
    pub soft_brake_factor: f32, // 0..1
    pub handbrake_factor: f32,

    // --- Force points (chassis-local) ---
    pub front_force_point: [f32; 3],
    pub rear_force_point: [f32; 3],

    // --- Recovery ---
    pub reset_cooldown: f32, // s between resets to track
    pub reset_height: f32,   // m above the checkpoint a reset drops the car

    // --- Effects ---
    pub max_emission: f32,
    pub emission_fade_speed: f32, // per second
    pub skid_fade_speed: f32,     // per second

    // --- Options ---
    pub steering_mode: SteeringMode,
    pub lateral_friction: LateralFrictionMode,
    pub brake_mode: BrakeMode,
    pub drive_type: DriveType,
    pub steering_gate: SteeringGate,
}

pub const ARCADE: DriveConfig = DriveConfig {
    forward_accel: 8.0,
    reverse_accel: 4.0,
    force_scale: 1000.0,
    max_speed: 30.0,

    turn_strength: 180.0,
    inertia_factor: 10.0,
    max_wheel_turn: 25.0,

    ground_drag: 3.0,
    air_drag: 0.1,
    air_gravity: 10.0,
    ground_align_rate: 15.0,
    sensor: GroundSensorConfig {
        primary_point: [0.0, -0.2, 1.2],
        secondary_point: [0.0, -0.2, 0.0],
        max_distance: 0.75,
        mask: GroundMask(0b0001),
    },

    brake_force: 3000.0,
    soft_brake_factor: 0.9,
    handbrake_factor: 1.2,

    front_force_point: [0.0, -0.2, 1.4],
    rear_force_point: [0.0, -0.2, -1.4],

    reset_cooldown: 2.0,
    reset_height: 1.0,

    max_emission: 25.0,
    emission_fade_speed: 50.0,
    skid_fade_speed: 2.0,

    steering_mode: SteeringMode::SpeedScaled,
    lateral_friction: LateralFrictionMode::Clamp50,
    brake_mode: BrakeMode::Normal,
    drive_type: DriveType::Center,
    steering_gate: SteeringGate::GroundedAndThrottle,
};

/// Rear-driven, looser variant.
pub const DRIFTER: DriveConfig = DriveConfig {
    turn_strength: 150.0,
    ground_drag: 2.0,
    brake_mode: BrakeMode::Soft,
    drive_type: DriveType::Rear,
    lateral_friction: LateralFrictionMode::None,
    steering_mode: SteeringMode::WithInertia,
    steering_gate: SteeringGate::GroundedOnly,
    ..ARCADE
};

impl Default for DriveConfig {
    fn default() -> Self {
        ARCADE
    }
}

impl DriveConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(SetupError::InvalidMaxSpeed(self.max_speed));
        }
        self.sensor.validate()?;
        for (what, value) in [
            ("forward_accel", self.forward_accel),
            ("reverse_accel", self.reverse_accel),
            ("force_scale", self.force_scale),
            ("turn_strength", self.turn_strength),
            ("inertia_factor", self.inertia_factor),
            ("ground_drag", self.ground_drag),
            ("air_drag", self.air_drag),
            ("air_gravity", self.air_gravity),
            ("ground_align_rate", self.ground_align_rate),
            ("brake_force", self.brake_force),
            ("soft_brake_factor", self.soft_brake_factor),
            ("handbrake_factor", self.handbrake_factor),
            ("reset_cooldown", self.reset_cooldown),
            ("reset_height", self.reset_height),
            ("max_emission", self.max_emission),
            ("emission_fade_speed", self.emission_fade_speed),
            ("skid_fade_speed", self.skid_fade_speed),
        ] {
            ensure_non_negative(what, value)?;
        }
        Ok(())
    }
}

// ============================================
// ----- outputs ------------------------------
// ============================================

/// What one fixed tick did to the body (for telemetry and tests).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    pub grounded: bool,
    pub propulsion: Vec3,
    pub air_force: Vec3,
    pub brake_force: Vec3,
    pub drag: f32,
    pub yaw_deg: f32,
    pub clamped: bool,
}

/// Per-frame cosmetic outputs for the audio/VFX collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleFx {
    pub vehicle: VehicleId,
    pub dust_emission: f32,
    pub engine_pitch: f32,
    pub skid_volume: f32,
    pub wheel_left_deg: f32,
    pub wheel_right_deg: f32,
}

pub trait EffectsSink {
    fn vehicle_effects(&mut self, fx: VehicleFx);
}

impl EffectsSink for Vec<VehicleFx> {
    fn vehicle_effects(&mut self, fx: VehicleFx) {
        self.push(fx);
    }
}

// ============================================
// ----- model --------------------------------
// ============================================

pub struct VehicleDriveModel {
    id: VehicleId,
    config: DriveConfig,
    sensor: GroundSensor,

    max_speed: f32,   // m/s, rubber-band controlled
    speed_input: f32, // accel units, signed
    turn_input: f32,  // -1..1
    grounded: bool,
    ground_normal: Option<Vec3>,

    // last observed body state
    position: Pos3,
    speed: f32,

    // effect state
    emission_rate: f32,
    skid_volume: f32,
}

impl VehicleDriveModel {
    pub fn new(id: VehicleId, config: DriveConfig) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self {
            id,
            sensor: GroundSensor::new(config.sensor)?,
            max_speed: config.max_speed,
            config,
            speed_input: 0.0,
            turn_input: 0.0,
            grounded: false,
            ground_normal: None,
            position: Pos3::origin(),
            speed: 0.0,
            emission_rate: 0.0,
            skid_volume: 0.0,
        })
    }

    pub fn id(&self) -> VehicleId { self.id }
    pub fn config(&self) -> &DriveConfig { &self.config }
    pub fn sensor(&self) -> &GroundSensor { &self.sensor }
    pub fn max_speed(&self) -> f32 { self.max_speed }
    pub fn speed_input(&self) -> f32 { self.speed_input }
    pub fn turn_input(&self) -> f32 { self.turn_input }
    pub fn is_grounded(&self) -> bool { self.grounded }
    pub fn ground_normal(&self) -> Option<Vec3> { self.ground_normal }
    pub fn position(&self) -> Pos3 { self.position }
    pub fn speed(&self) -> f32 { self.speed }

    /// Rubber-band write path; only the coordinator calls this.
    pub(crate) fn set_max_speed(&mut self, max_speed: f32) {
        self.max_speed = max_speed;
    }

    /// Records the body's state without simulating (e.g. after a teleport).
    pub fn observe(&mut self, body: &dyn RigidBodyPort) {
        self.position = body.position();
        self.speed = body.linear_velocity().norm();
    }

    /// Signed acceleration demand: forward and reverse use separate constants.
    pub fn speed_input_for(&self, throttle: f32) -> f32 {
        if throttle > 0.0 {
            throttle * self.config.forward_accel
        } else if throttle < 0.0 {
            throttle * self.config.reverse_accel
        } else {
            0.0
        }
    }

    pub fn fixed_tick(
        &mut self,
        body: &mut dyn RigidBodyPort,
        probe: GroundProbe,
        input: DriveInput,
        dt: f32,
    ) -> TickReport {
        let cfg = self.config;
        let mut report = TickReport::default();

        // 1) ground state
        self.grounded = probe.grounded();
        self.ground_normal = probe.normal;
        report.grounded = self.grounded;

        // 2) orientation + drag + air gravity
        if let Some(normal) = probe.normal {
            let rot = body.rotation();
            let aligned = align_to_normal(&rot, &normal, (cfg.ground_align_rate * dt).clamp(0.0, 1.0));
            body.set_rotation(aligned);
            body.set_linear_damping(cfg.ground_drag);
            report.drag = cfg.ground_drag;
        } else {
            body.set_linear_damping(cfg.air_drag);
            let f = -Vector3::y() * cfg.air_gravity * body.mass();
            body.add_force(f);
            report.drag = cfg.air_drag;
            report.air_force = f;
        }

        // 3) force magnitude from throttle
        self.speed_input = self.speed_input_for(input.throttle);
        self.turn_input = input.steer.clamp(-1.0, 1.0);

        let rot = body.rotation();
        let pose = body.pose();
        let forward = forward_of(&rot);

        // 4) propulsion (grounded only)
        if self.grounded && self.speed_input != 0.0 {
            let force = forward * self.speed_input * cfg.force_scale;
            match cfg.drive_type {
                DriveType::Center => body.add_force(force),
                DriveType::Front => body.add_force_at_point(force, pose * to_pos(cfg.front_force_point)),
                DriveType::Rear => body.add_force_at_point(force, pose * to_pos(cfg.rear_force_point)),
            }
            report.propulsion = force;
        }

        if self.grounded {
            report.brake_force = self.apply_brakes(body, input, &pose);
        }

        // 5) speed clamp (always)
        let vel = body.linear_velocity();
        if self.max_speed > 0.0 {
            if vel.norm() > self.max_speed {
                body.set_linear_velocity(vel.normalize() * self.max_speed);
                report.clamped = true;
            }
        } else {
            debug!("{}: max speed {} <= 0, clamp skipped", self.id, self.max_speed);
        }

        // 6) steering
        if self.grounded {
            if let Some(yaw) = self.steering_yaw(body, dt) {
                let turned = body.rotation() * Rot3::from_axis_angle(&Vector3::y_axis(), -yaw.to_radians());
                body.set_rotation(turned);
                report.yaw_deg = yaw;
            }
        }

        // 7) lateral friction
        if self.grounded && cfg.lateral_friction != LateralFrictionMode::None {
            let rot = body.rotation();
            let mut local = rot.inverse() * body.linear_velocity();
            local.x *= cfg.lateral_friction.keep_fraction();
            body.set_linear_velocity(rot * local);
        }

        self.observe(body);
        report
    }

    fn apply_brakes(&self, body: &mut dyn RigidBodyPort, input: DriveInput, pose: &Pose) -> Vec3 {
        let cfg = &self.config;
        let mut total = Vec3::zeros();
        let vel = body.linear_velocity();

        if input.brake && vel.norm_squared() > BRAKE_MIN_SPEED_SQ {
            let factor = match cfg.brake_mode {
                BrakeMode::Normal => 1.0,
                BrakeMode::Soft => cfg.soft_brake_factor,
            };
            let f = -vel.normalize() * cfg.brake_force * factor;
            body.add_force(f);
            total += f;
        }

        if input.handbrake && vel.norm_squared() > BRAKE_MIN_SPEED_SQ {
            let rear = pose * to_pos(cfg.rear_force_point);
            let rear_vel = body.point_velocity(rear);
            if rear_vel.norm_squared() > BRAKE_MIN_SPEED_SQ {
                let f = -rear_vel.normalize() * cfg.brake_force * cfg.handbrake_factor;
                body.add_force_at_point(f, rear);
                total += f;
            }
        }

        total
    }

    /// Yaw in degrees (positive = right), or None when steering is gated off.
    fn steering_yaw(&self, body: &dyn RigidBodyPort, dt: f32) -> Option<f32> {
        let cfg = &self.config;
        if cfg.steering_gate == SteeringGate::GroundedAndThrottle && self.speed_input == 0.0 {
            return None;
        }

        let vel = body.linear_velocity();
        let speed = vel.norm();
        let turn = self.turn_input;

        match cfg.steering_mode {
            SteeringMode::Simple => {
                if speed > SIMPLE_STEER_MIN_SPEED && self.speed_input != 0.0 {
                    Some(turn * cfg.turn_strength * dt)
                } else {
                    None
                }
            }
            SteeringMode::WithInertia => {
                if vel.norm_squared() <= STEER_MIN_SPEED_SQ || cfg.inertia_factor <= 0.0 {
                    return None;
                }
                let direction = vel.dot(&forward_of(&body.rotation())).signum();
                let speed_factor = (speed / cfg.inertia_factor).clamp(0.0, 1.0);
                Some(turn * cfg.turn_strength * dt * speed_factor * direction)
            }
            SteeringMode::SpeedScaled => {
                if self.max_speed <= 0.0 {
                    return None;
                }
                let direction = if self.speed_input != 0.0 {
                    self.speed_input.signum()
                } else {
                    vel.dot(&forward_of(&body.rotation())).signum()
                };
                Some(turn * cfg.turn_strength * dt * direction * (speed / self.max_speed))
            }
        }
    }

    /// Derived, per-frame cosmetic outputs. No physical consequence.
    pub fn frame_effects(&mut self, dt: f32) -> VehicleFx {
        let cfg = &self.config;
        let speed = self.speed;
        let turn = self.turn_input;

        self.emission_rate = move_towards(self.emission_rate, 0.0, cfg.emission_fade_speed * dt);
        if self.grounded && (turn.abs() > 0.5 || (speed < self.max_speed * 0.5 && speed != 0.0)) {
            self.emission_rate = cfg.max_emission;
        }
        if speed < 0.5 {
            self.emission_rate = 0.0;
        }

        if self.grounded && turn.abs() > 0.5 && speed >= 0.5 {
            self.skid_volume = 1.0;
        } else {
            self.skid_volume = move_towards(self.skid_volume, 0.0, cfg.skid_fade_speed * dt);
        }

        let engine_pitch = if self.max_speed > 0.0 {
            1.0 + (speed / self.max_speed) * 1.5
        } else {
            1.0
        };

        VehicleFx {
            vehicle: self.id,
            dust_emission: self.emission_rate,
            engine_pitch,
            skid_volume: self.skid_volume,
            wheel_left_deg: turn * cfg.max_wheel_turn - 180.0,
            wheel_right_deg: turn * cfg.max_wheel_turn,
        }
    }
}

/// Blends `rot` toward the rotation whose up axis matches `normal`.
/// `t` = 1 snaps; degenerate normals leave the rotation untouched.
pub fn align_to_normal(rot: &Rot3, normal: &Vec3, t: f32) -> Rot3 {
    let up = up_of(rot);
    let Some(arc) = Rot3::rotation_between(&up, normal) else {
        return *rot;
    };
    let target = arc * rot;
    rot.try_slerp(&target, t, 1e-6).unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race_core::testing::MockBody;

    const DT: f32 = 1.0 / 60.0;

    fn grounded() -> GroundProbe {
        GroundProbe { normal: Some(Vector3::y()) }
    }

    fn model(config: DriveConfig) -> VehicleDriveModel {
        VehicleDriveModel::new(VehicleId(1), config).unwrap()
    }

    fn throttle(t: f32) -> DriveInput {
        DriveInput { throttle: t, ..DriveInput::idle() }
    }

    #[test]
    fn reverse_is_weaker_than_forward() {
        let m = model(ARCADE);
        assert_eq!(m.speed_input_for(1.0), 8.0);
        assert_eq!(m.speed_input_for(-1.0), -4.0);
        assert_eq!(m.speed_input_for(0.0), 0.0);
    }

    #[test]
    fn speed_never_exceeds_max_after_clamp() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(3.0, 0.0, 70.0);
        for _ in 0..240 {
            m.fixed_tick(&mut body, grounded(), throttle(1.0), DT);
            assert!(body.linvel.norm() <= m.max_speed() + 1e-3, "{}", body.linvel.norm());
            body.integrate(DT);
        }
    }

    #[test]
    fn clamp_keeps_direction() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, -90.0);
        let r = m.fixed_tick(&mut body, GroundProbe::AIRBORNE, DriveInput::idle(), DT);
        assert!(r.clamped);
        assert!((body.linvel - Vector3::new(0.0, 0.0, -30.0)).norm() < 1e-3);
    }

    #[test]
    fn airborne_ticks_never_propel() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::new(0.0, 10.0, 0.0));
        for _ in 0..10 {
            let r = m.fixed_tick(&mut body, GroundProbe::AIRBORNE, throttle(1.0), DT);
            assert!(!r.grounded);
            assert_eq!(r.propulsion, Vec3::zeros());
            assert_eq!(body.damping, ARCADE.air_drag);
            assert!(r.air_force.y < 0.0);
            assert_eq!(body.pending_force().y, -ARCADE.air_gravity * body.mass);
            body.integrate(DT);
        }
    }

    #[test]
    fn grounded_throttle_pushes_forward() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        let r = m.fixed_tick(&mut body, grounded(), throttle(0.5), DT);
        assert_eq!(body.damping, ARCADE.ground_drag);
        assert!((r.propulsion - Vector3::new(0.0, 0.0, 4000.0)).norm() < 1e-3);
        assert_eq!(r.air_force, Vec3::zeros());
    }

    #[test]
    fn rear_drive_applies_at_rear_point() {
        let mut m = model(DriveConfig { drive_type: DriveType::Rear, ..ARCADE });
        let mut body = MockBody::at(Pos3::origin());
        m.fixed_tick(&mut body, grounded(), throttle(1.0), DT);
        let (_, at) = body.forces[0];
        assert_eq!(at, Some(to_pos(ARCADE.rear_force_point)));
    }

    #[test]
    fn steering_needs_speed_and_throttle() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        let input = DriveInput { throttle: 1.0, steer: 1.0, ..DriveInput::idle() };
        // standstill: no authority
        let r = m.fixed_tick(&mut body, grounded(), input, DT);
        assert_eq!(r.yaw_deg, 0.0);

        // moving but no throttle: gated off
        body.linvel = Vector3::new(0.0, 0.0, 15.0);
        let r = m.fixed_tick(&mut body, grounded(), DriveInput { steer: 1.0, ..DriveInput::idle() }, DT);
        assert_eq!(r.yaw_deg, 0.0);

        // half speed, full throttle: half authority
        body.linvel = Vector3::new(0.0, 0.0, 15.0);
        let r = m.fixed_tick(&mut body, grounded(), input, DT);
        let expected = 180.0 * DT * 0.5;
        assert!((r.yaw_deg - expected).abs() < 1e-4, "{}", r.yaw_deg);
    }

    #[test]
    fn steering_reverses_when_reversing() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, -15.0);
        let r = m.fixed_tick(&mut body, grounded(), DriveInput { throttle: -1.0, steer: 1.0, ..DriveInput::idle() }, DT);
        assert!(r.yaw_deg < 0.0);
    }

    #[test]
    fn right_steer_turns_forward_toward_right() {
        let mut m = model(DriveConfig { lateral_friction: LateralFrictionMode::None, ..ARCADE });
        let mut body = MockBody::at(Pos3::origin());
        for _ in 0..30 {
            body.linvel = Vector3::new(0.0, 0.0, 20.0);
            m.fixed_tick(&mut body, grounded(), DriveInput { throttle: 1.0, steer: 1.0, ..DriveInput::idle() }, DT);
        }
        let fwd = forward_of(&body.rotation);
        assert!(fwd.dot(&crate::race_core::types::right_of(&Rot3::identity())) > 0.1);
    }

    #[test]
    fn grounded_only_gate_steers_while_coasting() {
        let mut m = model(DriveConfig { steering_gate: SteeringGate::GroundedOnly, ..ARCADE });
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 15.0);
        let r = m.fixed_tick(&mut body, grounded(), DriveInput { steer: 1.0, ..DriveInput::idle() }, DT);
        assert!(r.yaw_deg > 0.0);
    }

    #[test]
    fn lateral_friction_halves_side_slip() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(4.0, 0.0, 10.0);
        m.fixed_tick(&mut body, grounded(), DriveInput::idle(), DT);
        assert!((body.linvel.x - 2.0).abs() < 1e-4);
        assert!((body.linvel.z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn quarter_clamp_keeps_a_quarter_of_side_slip() {
        let mut m = model(DriveConfig { lateral_friction: LateralFrictionMode::Clamp25, ..ARCADE });
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(4.0, 0.0, 10.0);
        m.fixed_tick(&mut body, grounded(), DriveInput::idle(), DT);
        assert!((body.linvel.x - 1.0).abs() < 1e-4);
        assert!((body.linvel.z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn front_drive_applies_at_front_point() {
        let mut m = model(DriveConfig { drive_type: DriveType::Front, ..ARCADE });
        let mut body = MockBody::at(Pos3::origin());
        m.fixed_tick(&mut body, grounded(), throttle(1.0), DT);
        let (f, at) = body.forces[0];
        assert_eq!(at, Some(to_pos(ARCADE.front_force_point)));
        assert!((f - Vector3::new(0.0, 0.0, 8000.0)).norm() < 1e-2);
    }

    #[test]
    fn simple_steering_is_fixed_rate_above_walking_pace() {
        let mut m = model(DriveConfig { steering_mode: SteeringMode::Simple, ..ARCADE });
        let input = DriveInput { throttle: 1.0, steer: 0.5, ..DriveInput::idle() };

        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 1.0);
        let r = m.fixed_tick(&mut body, grounded(), input, DT);
        assert_eq!(r.yaw_deg, 0.0);

        // rate does not depend on speed
        for speed in [3.0, 25.0] {
            let mut body = MockBody::at(Pos3::origin());
            body.linvel = Vector3::new(0.0, 0.0, speed);
            let r = m.fixed_tick(&mut body, grounded(), input, DT);
            assert!((r.yaw_deg - 0.5 * 180.0 * DT).abs() < 1e-5, "{speed}: {}", r.yaw_deg);
        }
    }

    #[test]
    fn inertia_steering_scales_with_speed() {
        let mut m = model(DRIFTER);
        let input = DriveInput { throttle: 1.0, steer: 1.0, ..DriveInput::idle() };

        // half of inertia_factor: half authority
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 5.0);
        let r = m.fixed_tick(&mut body, grounded(), input, DT);
        assert!((r.yaw_deg - 150.0 * DT * 0.5).abs() < 1e-5, "{}", r.yaw_deg);

        // above inertia_factor: capped at full authority
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 25.0);
        let r = m.fixed_tick(&mut body, grounded(), input, DT);
        assert!((r.yaw_deg - 150.0 * DT).abs() < 1e-5, "{}", r.yaw_deg);
    }

    #[test]
    fn inertia_steering_flips_when_rolling_backwards() {
        let mut m = model(DRIFTER);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, -5.0);
        let r = m.fixed_tick(&mut body, grounded(), DriveInput { steer: 1.0, ..DriveInput::idle() }, DT);
        assert!((r.yaw_deg + 150.0 * DT * 0.5).abs() < 1e-5, "{}", r.yaw_deg);

        // nearly stopped: no authority at all
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 0.05);
        let r = m.fixed_tick(&mut body, grounded(), DriveInput { steer: 1.0, ..DriveInput::idle() }, DT);
        assert_eq!(r.yaw_deg, 0.0);
    }

    #[test]
    fn soft_brake_is_weaker() {
        let mut normal = model(ARCADE);
        let mut soft = model(DriveConfig { brake_mode: BrakeMode::Soft, ..ARCADE });
        let brake = DriveInput { brake: true, ..DriveInput::idle() };

        let mut a = MockBody::at(Pos3::origin());
        a.linvel = Vector3::new(0.0, 0.0, 10.0);
        let mut b = a.clone();

        let ra = normal.fixed_tick(&mut a, grounded(), brake, DT);
        let rb = soft.fixed_tick(&mut b, grounded(), brake, DT);
        assert!((ra.brake_force.z + 3000.0).abs() < 1e-2);
        assert!((rb.brake_force.z + 2700.0).abs() < 1e-2);
    }

    #[test]
    fn handbrake_acts_at_rear() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 10.0);
        m.fixed_tick(&mut body, grounded(), DriveInput { handbrake: true, ..DriveInput::idle() }, DT);
        let rear = to_pos(ARCADE.rear_force_point);
        assert!(body.forces.iter().any(|(f, at)| *at == Some(rear) && f.z < 0.0));
    }

    #[test]
    fn aligns_up_axis_toward_slope() {
        let normal = Vector3::new(0.3, 1.0, 0.0).normalize();
        let snapped = align_to_normal(&Rot3::identity(), &normal, 1.0);
        assert!((up_of(&snapped) - normal).norm() < 1e-5);

        let half = align_to_normal(&Rot3::identity(), &normal, 0.5);
        let angle = up_of(&half).angle(&Vector3::y());
        assert!((angle - normal.angle(&Vector3::y()) * 0.5).abs() < 1e-4);
    }

    #[test]
    fn opposite_normal_leaves_rotation() {
        let r = align_to_normal(&Rot3::identity(), &-Vector3::y(), 1.0);
        assert_eq!(r, Rot3::identity());
    }

    #[test]
    fn non_positive_max_speed_is_setup_error() {
        let err = VehicleDriveModel::new(VehicleId(0), DriveConfig { max_speed: 0.0, ..ARCADE }).err();
        assert_eq!(err, Some(SetupError::InvalidMaxSpeed(0.0)));
    }

    #[test]
    fn zero_max_speed_at_runtime_skips_clamp() {
        let mut m = model(ARCADE);
        m.set_max_speed(0.0);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 50.0);
        let r = m.fixed_tick(&mut body, grounded(), DriveInput { throttle: 1.0, steer: 1.0, ..DriveInput::idle() }, DT);
        assert!(!r.clamped);
        assert_eq!(r.yaw_deg, 0.0);
        assert!(body.linvel.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn effects_follow_speed_and_turn() {
        let mut m = model(ARCADE);
        let mut body = MockBody::at(Pos3::origin());
        body.linvel = Vector3::new(0.0, 0.0, 15.0);
        m.fixed_tick(&mut body, grounded(), DriveInput { throttle: 1.0, steer: 1.0, ..DriveInput::idle() }, DT);

        let fx = m.frame_effects(DT);
        assert_eq!(fx.dust_emission, ARCADE.max_emission);
        assert_eq!(fx.skid_volume, 1.0);
        assert!((fx.engine_pitch - (1.0 + m.speed() / 30.0 * 1.5)).abs() < 1e-5);
        assert_eq!(fx.wheel_right_deg, 25.0);
        assert_eq!(fx.wheel_left_deg, 25.0 - 180.0);

        // standing still: dust off, skid fades
        body.linvel = Vec3::zeros();
        m.fixed_tick(&mut body, grounded(), DriveInput::idle(), DT);
        let fx = m.frame_effects(0.25);
        assert_eq!(fx.dust_emission, 0.0);
        assert!((fx.skid_volume - 0.5).abs() < 1e-5);
    }
}
