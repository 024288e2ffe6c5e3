use nalgebra::Vector3;
use serde::Serialize;

use crate::config::GridConfig;
use crate::race_core::types::{Pos3, Rot3, Vec3, right_of};

// ---------------------------------------------
// GRID SLOT RETURNED TO THE RACE SETUP
// ---------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridSlot {
    pub index: usize,
    pub row: usize,
    pub column: usize,
    pub position: [f32; 3],
    pub rotation: [f32; 4], // x, y, z, w
}

impl GridSlot {
    pub fn pos(&self) -> Pos3 {
        Pos3::new(self.position[0], self.position[1], self.position[2])
    }

    pub fn rot(&self) -> Rot3 {
        let [x, y, z, w] = self.rotation;
        Rot3::new_normalize(nalgebra::Quaternion::new(w, x, y, z))
    }
}

// ---------------------------------------------
// TWO-COLUMN STAGGERED STARTING GRID
// ---------------------------------------------
//   start line  ->  first checkpoint
//
//      [0]
//           [1]
//      [2]
//           [3]
//
// Slots are handed out in order; the player asks first and gets pole.
#[derive(Debug)]
pub struct StartingGrid {
    line: Pos3,
    forward: Vec3,
    rotation: Rot3,
    config: GridConfig,
    allocated: usize,
}

impl StartingGrid {
    /// Grid behind `start_line`, every car facing `toward`.
    pub fn new(start_line: Pos3, toward: Pos3, config: GridConfig) -> Self {
        let mut forward = toward - start_line;
        forward.y = 0.0;
        let forward = forward.try_normalize(1e-6).unwrap_or_else(Vector3::z);
        Self {
            line: start_line,
            forward,
            rotation: Rot3::face_towards(&forward, &Vector3::y()),
            config,
            allocated: 0,
        }
    }

    pub fn slot(&self, index: usize) -> GridSlot {
        let row = index / 2;
        let column = index % 2;
        let cfg = &self.config;

        let back = cfg.setback + row as f32 * cfg.row_spacing + column as f32 * cfg.stagger;
        let side = (if column == 0 { -0.5 } else { 0.5 }) * cfg.column_spacing;

        let p = self.line - self.forward * back
            + right_of(&self.rotation) * side
            + Vector3::y() * cfg.spawn_height;
        let q = self.rotation.quaternion();

        GridSlot {
            index,
            row,
            column,
            position: [p.x, p.y, p.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }

    // ---------------------------------------------------------
    // Full allocation pipeline called from race setup
    // ---------------------------------------------------------
    pub fn allocate(&mut self) -> GridSlot {
        let slot = self.slot(self.allocated);
        self.allocated += 1;
        slot
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }
}
