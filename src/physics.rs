// src/physics.rs
//
// rapier3d host for the race core: owns the rigid bodies, the static track
// (ground + blocks), the checkpoint sensor gates, and answers ground ray casts.

use std::collections::{HashMap, HashSet};

use log::{info, warn};
use rapier3d::prelude::*;

use crate::config::{BlockConfig, CheckpointConfig, TrackConfig};
use crate::race_core::body::{RigidBodyPort, VehicleWorld};
use crate::race_core::ground::GroundQuery;
use crate::race_core::types::{GroundMask, Pos3, Rot3, Vec3, VehicleId};

const GROUP_GROUND: Group     = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group    = Group::from_bits_truncate(0b0010);
const GROUP_CHECKPOINT: Group = Group::from_bits_truncate(0b0100);

const CHASSIS_RADIUS: f32 = 0.5;   // m, sphere the car rides on
const CHASSIS_MASS: f32 = 1200.0;  // kg
const WORLD_LIMIT: f32 = 2_000.0;  // m, anything further is considered lost

#[inline]
fn yaw_pitch(yaw_deg: f32, pitch_deg: f32) -> Rotation<Real> {
    Rotation::from_axis_angle(&Vector::y_axis(), yaw_deg.to_radians())
        * Rotation::from_axis_angle(&Vector::x_axis(), pitch_deg.to_radians())
}

// --------------------------------------------------
// RigidBodyPort for rapier bodies
// --------------------------------------------------
// Inherent rapier methods share names with the port, so they are called
// through the type path.
impl RigidBodyPort for RigidBody {
    fn position(&self) -> Pos3 {
        Pos3::from(*RigidBody::translation(self))
    }

    fn rotation(&self) -> Rot3 {
        *RigidBody::rotation(self)
    }

    fn linear_velocity(&self) -> Vec3 {
        *self.linvel()
    }

    fn angular_velocity(&self) -> Vec3 {
        *self.angvel()
    }

    fn mass(&self) -> f32 {
        RigidBody::mass(self)
    }

    fn center_of_mass(&self) -> Pos3 {
        *RigidBody::center_of_mass(self)
    }

    fn add_force(&mut self, force: Vec3) {
        RigidBody::add_force(self, force, true);
    }

    fn add_force_at_point(&mut self, force: Vec3, point: Pos3) {
        RigidBody::add_force_at_point(self, force, point, true);
    }

    fn set_rotation(&mut self, rotation: Rot3) {
        RigidBody::set_rotation(self, rotation, true);
    }

    fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.set_linvel(velocity, true);
    }

    fn set_linear_damping(&mut self, damping: f32) {
        RigidBody::set_linear_damping(self, damping);
    }

    fn teleport(&mut self, position: Pos3) {
        self.set_translation(position.coords, true);
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,              // gravity vector
    pub pipeline: PhysicsPipeline,          // physics pipeline
    pub island_manager: IslandManager,      // manages islands of bodies
    pub broad_phase: DefaultBroadPhase,     // broad-phase collision detection
    pub narrow_phase: NarrowPhase,          // collision + sensor intersections
    pub bodies: RigidBodySet,               // for rigid bodies
    pub colliders: ColliderSet,             // for collision shapes
    pub joints: ImpulseJointSet,            // unused, required by the pipeline
    pub multibody_joints: MultibodyJointSet,// unused, required by the pipeline
    pub ccd: CCDSolver,                     // continuous collision detection
    pub query_pipeline: QueryPipeline,      // for ground ray casts

    pub vehicles: HashMap<VehicleId, RigidBodyHandle>, // vehicle → body
    vehicle_colliders: HashMap<ColliderHandle, VehicleId>,
    checkpoint_colliders: HashMap<ColliderHandle, usize>,
    spawn_points: HashMap<VehicleId, (Pos3, Rot3)>,
    overlaps: HashSet<(VehicleId, usize)>,  // sensor overlaps seen last step
}

impl PhysicsWorld {
    pub fn new(track: &TrackConfig) -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // === Static ground box, top surface at y = 0 ===
        let [gx, gy, gz] = track.ground_half_extents;
        let ground_handle = bodies.insert(RigidBodyBuilder::fixed().translation(vector![0.0, -gy, 0.0]).build());
        let ground_collider = ColliderBuilder::cuboid(gx, gy, gz)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(0.0)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        let mut world = Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicles: HashMap::new(),
            vehicle_colliders: HashMap::new(),
            checkpoint_colliders: HashMap::new(),
            spawn_points: HashMap::new(),
            overlaps: HashSet::new(),
        };

        for block in &track.blocks {
            world.add_block(block);
        }
        for (index, gate) in track.checkpoints.iter().enumerate() {
            world.add_checkpoint(index, gate, track.gate_yaw_deg(index));
        }

        info!(
            "track built: {} checkpoints, {} blocks, bodies = {}, colliders = {}",
            track.checkpoints.len(),
            track.blocks.len(),
            world.bodies.len(),
            world.colliders.len()
        );
        world
    }

    /// Ramp or wall on the ground layer.
    fn add_block(&mut self, block: &BlockConfig) {
        let [px, py, pz] = block.position;
        let [hx, hy, hz] = block.half_extents;
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![px, py, pz])
            .rotation(yaw_pitch(block.yaw_deg, block.pitch_deg).scaled_axis())
            .build();
        let handle = self.bodies.insert(rb);
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(0.0)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
    }

    /// Sensor gate: reports overlaps, never pushes anything.
    fn add_checkpoint(&mut self, index: usize, gate: &CheckpointConfig, yaw_deg: f32) {
        let [px, py, pz] = gate.position;
        let [hx, hy, hz] = gate.half_extents;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![px, py + hy, pz])
            .rotation(yaw_pitch(yaw_deg, 0.0).scaled_axis())
            .sensor(true)
            .collision_groups(InteractionGroups::new(GROUP_CHECKPOINT, GROUP_CHASSIS))
            .active_collision_types(ActiveCollisionTypes::default() | ActiveCollisionTypes::DYNAMIC_FIXED)
            .build();
        let handle = self.colliders.insert(collider);
        self.checkpoint_colliders.insert(handle, index);
    }

    /// Dynamic sphere-chassis car. Rotations are locked: the drive model owns
    /// orientation and writes it directly every tick.
    pub fn spawn_vehicle(&mut self, id: VehicleId, position: Pos3, rotation: Rot3) -> RigidBodyHandle {
        let rb = RigidBodyBuilder::dynamic()
            .translation(position.coords)
            .rotation(rotation.scaled_axis())
            .lock_rotations()
            .ccd_enabled(true)
            .build();

        let volume = 4.0 / 3.0 * std::f32::consts::PI * CHASSIS_RADIUS.powi(3);
        let collider = ColliderBuilder::ball(CHASSIS_RADIUS)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND | GROUP_CHECKPOINT))
            .density(CHASSIS_MASS / volume)
            .friction(0.0) // IMPORTANT: drag and lateral friction come from the drive model
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        let collider = self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.vehicles.insert(id, handle);
        self.vehicle_colliders.insert(collider, id);
        self.spawn_points.insert(id, (position, rotation));

        info!("spawned {id} at {:?} (body = {:?})", position, handle);
        handle
    }

    /// Steps the simulation and returns every new (vehicle, checkpoint) entry.
    pub fn step(&mut self, dt: Real) -> Vec<(VehicleId, usize)> {
        let hooks = ();
        let events = ();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );

        // forces are persistent in rapier; the drive model re-applies them each tick
        for handle in self.vehicles.values() {
            if let Some(body) = self.bodies.get_mut(*handle) {
                body.reset_forces(true);
            }
        }

        self.recover_lost_vehicles();
        self.checkpoint_entries()
    }

    /// Sensor overlaps that were not present on the previous step.
    fn checkpoint_entries(&mut self) -> Vec<(VehicleId, usize)> {
        let mut current = HashSet::new();
        for (&collider, &vehicle) in &self.vehicle_colliders {
            for (c1, c2, intersecting) in self.narrow_phase.intersection_pairs_with(collider) {
                if !intersecting {
                    continue;
                }
                let other = if c1 == collider { c2 } else { c1 };
                if let Some(&index) = self.checkpoint_colliders.get(&other) {
                    current.insert((vehicle, index));
                }
            }
        }

        let mut entered: Vec<(VehicleId, usize)> = current.difference(&self.overlaps).copied().collect();
        entered.sort();
        self.overlaps = current;
        entered
    }

    // Safety: put bodies that fell off or blew up back on their grid slot.
    fn recover_lost_vehicles(&mut self) {
        for (id, handle) in &self.vehicles {
            let Some(body) = self.bodies.get_mut(*handle) else { continue };
            let pos = *body.translation();
            let bad = !pos.iter().all(|v| v.is_finite()) || pos.iter().any(|v| v.abs() > WORLD_LIMIT);
            if !bad {
                continue;
            }
            if let Some((spawn, rot)) = self.spawn_points.get(id) {
                body.set_translation(spawn.coords, true);
                RigidBody::set_rotation(body, *rot, true);
                body.set_linvel(Vector::zeros(), true);
                warn!("{id}: body lost at {:?}, back to grid slot", pos);
            }
        }
    }
}

impl GroundQuery for PhysicsWorld {
    fn cast_ground(
        &self,
        vehicle: VehicleId,
        origin: Pos3,
        direction: Vec3,
        max_distance: f32,
        mask: GroundMask,
    ) -> Option<Vec3> {
        let mut filter = QueryFilter::default()
            .groups(InteractionGroups::new(GROUP_CHASSIS, Group::from_bits_truncate(mask.0)))
            .exclude_sensors();
        if let Some(handle) = self.vehicles.get(&vehicle) {
            filter = filter.exclude_rigid_body(*handle);
        }

        let ray = Ray::new(origin, direction);
        self.query_pipeline
            .cast_ray_and_get_normal(&self.bodies, &self.colliders, &ray, max_distance, true, filter)
            .map(|(_, hit)| hit.normal)
    }
}

impl VehicleWorld for PhysicsWorld {
    fn body(&self, id: VehicleId) -> Option<&dyn RigidBodyPort> {
        let handle = self.vehicles.get(&id)?;
        self.bodies.get(*handle).map(|b| b as &dyn RigidBodyPort)
    }

    fn body_mut(&mut self, id: VehicleId) -> Option<&mut dyn RigidBodyPort> {
        let handle = self.vehicles.get(&id)?;
        self.bodies.get_mut(*handle).map(|b| b as &mut dyn RigidBodyPort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race_core::types::local_up;

    fn flat_track() -> TrackConfig {
        TrackConfig {
            checkpoints: vec![CheckpointConfig {
                position: [0.0, 0.0, 10.0],
                half_extents: [5.0, 2.0, 0.5],
                yaw_deg: Some(0.0),
            }],
            blocks: Vec::new(),
            ..TrackConfig::default()
        }
    }

    #[test]
    fn ground_ray_hits_the_floor_but_not_the_car() {
        let mut world = PhysicsWorld::new(&flat_track());
        let id = VehicleId(0);
        world.spawn_vehicle(id, Pos3::new(0.0, 0.5, 0.0), Rot3::identity());
        world.step(1.0 / 60.0);

        let down = -local_up();
        let hit = world.cast_ground(id, Pos3::new(0.0, 0.3, 0.0), down, 0.75, GroundMask::default());
        let n = hit.expect("ground below");
        assert!((n - Vector::y()).norm() < 1e-4);

        let miss = world.cast_ground(id, Pos3::new(0.0, 5.0, 0.0), down, 0.75, GroundMask::default());
        assert!(miss.is_none());

        // wrong layer: nothing to hit
        let masked = world.cast_ground(id, Pos3::new(0.0, 0.3, 0.0), down, 0.75, GroundMask(0b1000));
        assert!(masked.is_none());
    }

    #[test]
    fn forces_do_not_accumulate_across_steps() {
        let mut world = PhysicsWorld::new(&flat_track());
        let id = VehicleId(0);
        let h = world.spawn_vehicle(id, Pos3::new(0.0, 0.5, 0.0), Rot3::identity());
        world.body_mut(id).unwrap().add_force(vector![0.0, 0.0, 1200.0]);
        world.step(1.0 / 60.0);
        assert_eq!(world.bodies[h].user_force().norm(), 0.0);
    }

    #[test]
    fn driving_through_a_gate_reports_one_entry() {
        let mut world = PhysicsWorld::new(&flat_track());
        let id = VehicleId(3);
        world.spawn_vehicle(id, Pos3::new(0.0, 0.5, 0.0), Rot3::identity());

        let mut entries = Vec::new();
        for _ in 0..120 {
            world.body_mut(id).unwrap().set_linear_velocity(vector![0.0, 0.0, 10.0]);
            entries.extend(world.step(1.0 / 60.0));
        }
        assert_eq!(entries, vec![(id, 0)]);
        assert!(world.body(id).unwrap().position().z > 11.0);
    }

    #[test]
    fn default_gates_catch_cars_off_the_centre_line() {
        let track = TrackConfig::default();
        let mut world = PhysicsWorld::new(&track);
        let id = VehicleId(1);
        world.spawn_vehicle(id, Pos3::new(0.0, 0.6, -30.0), Rot3::identity());

        let n = track.checkpoints.len();
        for gate in 0..n {
            let prev = Vector::from(track.checkpoints[(gate + n - 1) % n].position);
            let next = Vector::from(track.checkpoints[(gate + 1) % n].position);
            let centre = Vector::from(track.checkpoints[gate].position);
            let mut travel = next - prev;
            travel.y = 0.0;
            let travel = travel.normalize();
            let side = vector![travel.z, 0.0, -travel.x];

            for offset in [-3.0, 0.0, 3.0] {
                let start = centre - travel * 6.0 + side * offset + vector![0.0, 0.6, 0.0];
                let body = world.body_mut(id).unwrap();
                body.teleport(Pos3::from(start));
                body.set_linear_velocity(travel * 20.0);

                let mut entries = Vec::new();
                for _ in 0..40 {
                    world.body_mut(id).unwrap().set_linear_velocity(travel * 20.0);
                    entries.extend(world.step(1.0 / 60.0));
                }
                assert_eq!(entries, vec![(id, gate)], "gate {gate}, offset {offset}");
            }
        }
    }
}
