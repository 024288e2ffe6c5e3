// ==============================================================================
// body.rs — RIGID-BODY PORT (HOST ENGINE BOUNDARY)
// ------------------------------------------------------------------------------
// The race core never integrates motion itself. It reads the pose/velocity of
// an externally owned rigid body and writes forces, rotation, velocity clamps
// and damping back through this trait. The host (rapier in this crate, a mock
// integrator in tests) owns the actual integration step.
// ==============================================================================

use crate::race_core::ground::GroundQuery;
use crate::race_core::types::{Pos3, Pose, Rot3, Vec3, VehicleId};

pub trait RigidBodyPort {
    fn position(&self) -> Pos3;
    fn rotation(&self) -> Rot3;
    fn linear_velocity(&self) -> Vec3;
    fn angular_velocity(&self) -> Vec3;
    fn mass(&self) -> f32;
    /// World-space centre of mass.
    fn center_of_mass(&self) -> Pos3;

    fn add_force(&mut self, force: Vec3);
    fn add_force_at_point(&mut self, force: Vec3, point: Pos3);
    fn set_rotation(&mut self, rotation: Rot3);
    fn set_linear_velocity(&mut self, velocity: Vec3);
    fn set_linear_damping(&mut self, damping: f32);
    /// Moves the body without integrating through the path in between.
    fn teleport(&mut self, position: Pos3);

    fn pose(&self) -> Pose {
        Pose::from_parts(self.position().coords.into(), self.rotation())
    }

    /// v(p) = v_com + ω × (p - com)
    fn point_velocity(&self, point: Pos3) -> Vec3 {
        let r = point - self.center_of_mass();
        self.linear_velocity() + self.angular_velocity().cross(&r)
    }
}

/// Everything the race needs from the host world for one physics tick.
pub trait VehicleWorld: GroundQuery {
    fn body(&self, id: VehicleId) -> Option<&dyn RigidBodyPort>;
    fn body_mut(&mut self, id: VehicleId) -> Option<&mut dyn RigidBodyPort>;
}
