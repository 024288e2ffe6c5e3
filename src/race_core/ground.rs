// ==============================================================================
// ground.rs — TWO-POINT RAYCAST GROUND PROBE
// ------------------------------------------------------------------------------
// Casts two independent rays along the chassis "down" direction, one from a
// primary (front-ish) probe point and one from a secondary (centre-ish) point.
//
// - grounded  = either ray hit ground within max_distance
// - normal    = the hit normal; the unweighted average when both rays hit
//
// Pure function of world geometry at call time: no side effects. The normal is
// absent when ungrounded and callers must not invent one.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::race_core::error::SetupError;
use crate::race_core::types::{GroundMask, Pos3, Pose, Vec3, VehicleId, local_up, to_pos};

/// Ray-cast service provided by the host world.
pub trait GroundQuery {
    /// Returns the surface normal of the first ground hit within `max_distance`.
    /// The casting vehicle's own body is never reported.
    fn cast_ground(
        &self,
        vehicle: VehicleId,
        origin: Pos3,
        direction: Vec3,
        max_distance: f32,
        mask: GroundMask,
    ) -> Option<Vec3>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundProbe {
    pub normal: Option<Vec3>,
}

impl GroundProbe {
    pub const AIRBORNE: GroundProbe = GroundProbe { normal: None };

    #[inline]
    pub fn grounded(&self) -> bool {
        self.normal.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundSensorConfig {
    pub primary_point: [f32; 3],   // chassis-local, front-ish
    pub secondary_point: [f32; 3], // chassis-local, centre-ish
    pub max_distance: f32,         // m
    pub mask: GroundMask,
}

impl GroundSensorConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(SetupError::InvalidProbeDistance(self.max_distance));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GroundSensor {
    config: GroundSensorConfig,
}

impl GroundSensor {
    pub fn new(config: GroundSensorConfig) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GroundSensorConfig {
        &self.config
    }

    /// Probes from the chassis pose, casting along the chassis' own down axis.
    pub fn probe<Q: GroundQuery + ?Sized>(&self, vehicle: VehicleId, pose: &Pose, query: &Q) -> GroundProbe {
        let primary = pose * to_pos(self.config.primary_point);
        let secondary = pose * to_pos(self.config.secondary_point);
        let down = -(pose.rotation * local_up());

        probe(
            query,
            vehicle,
            primary,
            secondary,
            down,
            self.config.max_distance,
            self.config.mask,
        )
    }
}

pub fn probe<Q: GroundQuery + ?Sized>(
    query: &Q,
    vehicle: VehicleId,
    origin_primary: Pos3,
    origin_secondary: Pos3,
    down: Vec3,
    max_distance: f32,
    mask: GroundMask,
) -> GroundProbe {
    if !(max_distance > 0.0) {
        return GroundProbe::AIRBORNE;
    }

    let a = query.cast_ground(vehicle, origin_primary, down, max_distance, mask);
    let b = query.cast_ground(vehicle, origin_secondary, down, max_distance, mask);

    let normal = match (a, b) {
        (Some(na), Some(nb)) => Some((na + nb) / 2.0),
        (Some(n), None) | (None, Some(n)) => Some(n),
        (None, None) => None,
    };

    GroundProbe { normal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::cell::Cell;

    /// Ground plane at y = 0 whose normal depends on which side of x = 0 the
    /// ray starts. Counts casts so tests can check both rays are fired.
    struct SplitSlope {
        left: Vec3,
        right: Vec3,
        casts: Cell<u32>,
    }

    impl GroundQuery for SplitSlope {
        fn cast_ground(&self, _: VehicleId, origin: Pos3, dir: Vec3, max: f32, _: GroundMask) -> Option<Vec3> {
            self.casts.set(self.casts.get() + 1);
            if dir.y >= 0.0 {
                return None;
            }
            let dist = origin.y / -dir.y;
            if dist < 0.0 || dist > max {
                return None;
            }
            Some(if origin.x < 0.0 { self.left } else { self.right })
        }
    }

    fn slope() -> SplitSlope {
        SplitSlope {
            left: Vector3::new(0.0, 1.0, 0.0),
            right: Vector3::new(1.0, 1.0, 0.0).normalize(),
            casts: Cell::new(0),
        }
    }

    const ID: VehicleId = VehicleId(0);

    #[test]
    fn both_hits_average_normals() {
        let q = slope();
        let down = -Vector3::y();
        let p = probe(&q, ID, Pos3::new(-1.0, 0.5, 0.0), Pos3::new(1.0, 0.5, 0.0), down, 1.0, GroundMask::default());
        let expected = (q.left + q.right) / 2.0;
        assert!(p.grounded());
        assert!((p.normal.unwrap() - expected).norm() < 1e-6);
        assert_eq!(q.casts.get(), 2);
    }

    #[test]
    fn single_hit_uses_that_normal() {
        let q = slope();
        let down = -Vector3::y();
        // Secondary is too high to reach the ground.
        let p = probe(&q, ID, Pos3::new(1.0, 0.5, 0.0), Pos3::new(-1.0, 5.0, 0.0), down, 1.0, GroundMask::default());
        assert_eq!(p.normal, Some(q.right));
    }

    #[test]
    fn no_hit_is_airborne() {
        let q = slope();
        let down = -Vector3::y();
        let p = probe(&q, ID, Pos3::new(0.0, 3.0, 0.0), Pos3::new(0.0, 3.0, 0.0), down, 1.0, GroundMask::default());
        assert!(!p.grounded());
        assert_eq!(p.normal, None);
    }

    #[test]
    fn zero_distance_skips_casting() {
        let q = slope();
        let p = probe(&q, ID, Pos3::origin(), Pos3::origin(), -Vector3::y(), 0.0, GroundMask::default());
        assert!(!p.grounded());
        assert_eq!(q.casts.get(), 0);
    }

    #[test]
    fn sensor_rejects_non_positive_distance() {
        let cfg = GroundSensorConfig {
            primary_point: [0.0, 0.0, 1.0],
            secondary_point: [0.0, 0.0, 0.0],
            max_distance: 0.0,
            mask: GroundMask::default(),
        };
        assert_eq!(GroundSensor::new(cfg).unwrap_err(), SetupError::InvalidProbeDistance(0.0));
    }
}
