// Test doubles: a point-mass integrator and a flat ground world.
use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::race_core::body::{RigidBodyPort, VehicleWorld};
use crate::race_core::ground::GroundQuery;
use crate::race_core::types::{GroundMask, Pos3, Rot3, Vec3, VehicleId};

#[derive(Debug, Clone)]
pub struct MockBody {
    pub position: Pos3,
    pub rotation: Rot3,
    pub linvel: Vec3,
    pub angvel: Vec3,
    pub mass: f32,
    pub damping: f32,
    pub forces: Vec<(Vec3, Option<Pos3>)>,
}

impl MockBody {
    pub fn at(position: Pos3) -> Self {
        Self {
            position,
            rotation: Rot3::identity(),
            linvel: Vec3::zeros(),
            angvel: Vec3::zeros(),
            mass: 1200.0,
            damping: 0.0,
            forces: Vec::new(),
        }
    }

    pub fn pending_force(&self) -> Vec3 {
        self.forces.iter().fold(Vec3::zeros(), |acc, (f, _)| acc + f)
    }

    /// Semi-implicit Euler with linear damping; torque is ignored.
    pub fn integrate(&mut self, dt: f32) {
        let accel = self.pending_force() / self.mass;
        self.linvel += accel * dt;
        self.linvel *= 1.0 / (1.0 + dt * self.damping);
        self.position += self.linvel * dt;
        self.forces.clear();
    }
}

impl RigidBodyPort for MockBody {
    fn position(&self) -> Pos3 { self.position }
    fn rotation(&self) -> Rot3 { self.rotation }
    fn linear_velocity(&self) -> Vec3 { self.linvel }
    fn angular_velocity(&self) -> Vec3 { self.angvel }
    fn mass(&self) -> f32 { self.mass }
    fn center_of_mass(&self) -> Pos3 { self.position }

    fn add_force(&mut self, force: Vec3) {
        self.forces.push((force, None));
    }
    fn add_force_at_point(&mut self, force: Vec3, point: Pos3) {
        self.forces.push((force, Some(point)));
    }
    fn set_rotation(&mut self, rotation: Rot3) {
        self.rotation = rotation;
    }
    fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linvel = velocity;
    }
    fn set_linear_damping(&mut self, damping: f32) {
        self.damping = damping;
    }
    fn teleport(&mut self, position: Pos3) {
        self.position = position;
    }
}

/// Infinite ground plane at y = 0 (normal +Y) plus mock bodies.
#[derive(Default)]
pub struct FlatWorld {
    pub bodies: BTreeMap<VehicleId, MockBody>,
    /// When set, every ray misses.
    pub no_ground: bool,
}

impl FlatWorld {
    pub fn spawn(&mut self, id: VehicleId, position: Pos3) -> &mut MockBody {
        self.bodies.entry(id).or_insert_with(|| MockBody::at(position))
    }

    pub fn get(&self, id: VehicleId) -> &MockBody {
        &self.bodies[&id]
    }

    pub fn get_mut(&mut self, id: VehicleId) -> &mut MockBody {
        self.bodies.get_mut(&id).expect("body registered")
    }

    pub fn integrate(&mut self, dt: f32) {
        for b in self.bodies.values_mut() {
            b.integrate(dt);
        }
    }
}

impl GroundQuery for FlatWorld {
    fn cast_ground(&self, _: VehicleId, origin: Pos3, dir: Vec3, max: f32, _: GroundMask) -> Option<Vec3> {
        if self.no_ground || dir.y >= 0.0 {
            return None;
        }
        let dist = origin.y / -dir.y;
        (dist >= 0.0 && dist <= max).then(Vector3::y)
    }
}

impl VehicleWorld for FlatWorld {
    fn body(&self, id: VehicleId) -> Option<&dyn RigidBodyPort> {
        self.bodies.get(&id).map(|b| b as &dyn RigidBodyPort)
    }

    fn body_mut(&mut self, id: VehicleId) -> Option<&mut dyn RigidBodyPort> {
        self.bodies.get_mut(&id).map(|b| b as &mut dyn RigidBodyPort)
    }
}
