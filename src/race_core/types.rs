//! Core shared types for `race_core` (engine-agnostic).
// race_core/types.rs
use std::fmt;

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub type Vec3 = Vector3<f32>;
pub type Pos3 = Point3<f32>;
pub type Rot3 = UnitQuaternion<f32>;
pub type Pose = Isometry3<f32>;

// Chassis-local basis: +Z forward, +Y up, -X right (right-handed, Y up).
#[inline] pub fn local_forward() -> Vec3 { Vector3::z() }
#[inline] pub fn local_up() -> Vec3 { Vector3::y() }
#[inline] pub fn local_right() -> Vec3 { -Vector3::x() }

#[inline] pub fn forward_of(rot: &Rot3) -> Vec3 { rot * local_forward() }
#[inline] pub fn up_of(rot: &Rot3) -> Vec3 { rot * local_up() }
#[inline] pub fn right_of(rot: &Rot3) -> Vec3 { rot * local_right() }

#[inline]
pub fn to_pos(v: [f32; 3]) -> Pos3 {
    Point3::new(v[0], v[1], v[2])
}

/// Moves `current` towards `target` by at most `max_delta`, never past it.
#[inline]
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + delta.signum() * max_delta
    }
}

// ============================================
// Vehicle identification
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Ai,
}

/// Collision-layer bitmask the ground probes are allowed to hit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundMask(pub u32);

impl Default for GroundMask {
    fn default() -> Self {
        GroundMask(0b0001)
    }
}

// ============================================
// ----- input --------------------------------
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    Vertical,
    Horizontal,
    Brake,
    Handbrake,
    Reset,
    EnableAi,
}

/// Logical input device. Axes are in [-1, 1].
pub trait ControlSource {
    fn axis(&self, control: Control) -> f32;
    fn button(&self, control: Control) -> bool;
    fn button_down(&self, control: Control) -> bool;
}

/// Per-tick drive intent, from a player device or an AI driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInput {
    pub throttle: f32, // forward/reverse demand, negative = reverse
    pub steer: f32,    // -1 (left) .. 1 (right)
    pub brake: bool,
    pub handbrake: bool,
}

impl DriveInput {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn from_controls(controls: &dyn ControlSource) -> Self {
        Self {
            throttle: controls.axis(Control::Vertical).clamp(-1.0, 1.0),
            steer: controls.axis(Control::Horizontal).clamp(-1.0, 1.0),
            brake: controls.button(Control::Brake),
            handbrake: controls.button(Control::Handbrake),
        }
    }
}

/// Button/axis snapshot fed by the host; edges are derived per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    pub vertical: f32,
    pub horizontal: f32,
    pub brake: bool,
    pub handbrake: bool,
    pub reset: bool,
    pub enable_ai: bool,
    pub(crate) previous: [bool; 4],
}

impl ControlState {
    fn held(&self) -> [bool; 4] {
        [self.brake, self.handbrake, self.reset, self.enable_ai]
    }

    fn slot(control: Control) -> Option<usize> {
        match control {
            Control::Brake => Some(0),
            Control::Handbrake => Some(1),
            Control::Reset => Some(2),
            Control::EnableAi => Some(3),
            Control::Vertical | Control::Horizontal => None,
        }
    }

    /// Latch the current buttons so the next frame reports fresh edges.
    pub fn end_frame(&mut self) {
        self.previous = self.held();
    }
}

impl ControlSource for ControlState {
    fn axis(&self, control: Control) -> f32 {
        match control {
            Control::Vertical => self.vertical,
            Control::Horizontal => self.horizontal,
            _ => 0.0,
        }
    }

    fn button(&self, control: Control) -> bool {
        Self::slot(control).is_some_and(|i| self.held()[i])
    }

    fn button_down(&self, control: Control) -> bool {
        Self::slot(control).is_some_and(|i| self.held()[i] && !self.previous[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_towards_never_overshoots() {
        assert_eq!(move_towards(0.0, 1.0, 0.25), 0.25);
        assert_eq!(move_towards(0.9, 1.0, 0.25), 1.0);
        assert_eq!(move_towards(1.0, -1.0, 0.5), 0.5);
        assert_eq!(move_towards(3.0, 3.0, 0.0), 3.0);
    }

    #[test]
    fn local_basis_is_right_handed() {
        let f = local_forward();
        let u = local_up();
        assert!((f.cross(&u) - local_right()).norm() < 1e-6);
    }

    #[test]
    fn button_down_fires_once_per_press() {
        let mut c = ControlState::default();
        c.reset = true;
        assert!(c.button_down(Control::Reset));
        c.end_frame();
        assert!(c.button(Control::Reset));
        assert!(!c.button_down(Control::Reset));
        c.reset = false;
        c.end_frame();
        c.reset = true;
        assert!(c.button_down(Control::Reset));
    }

    #[test]
    fn drive_input_clamps_axes() {
        let c = ControlState { vertical: 2.0, horizontal: -3.0, brake: true, ..Default::default() };
        let input = DriveInput::from_controls(&c);
        assert_eq!(input.throttle, 1.0);
        assert_eq!(input.steer, -1.0);
        assert!(input.brake);
        assert!(!input.handbrake);
    }
}
