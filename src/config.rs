// ==============================================================================
// config.rs — SERVER / TRACK / VEHICLE CONFIGURATION
// ------------------------------------------------------------------------------
// Loaded from an optional JSON file (first CLI argument). Every field has a
// default, so `{}` is a valid config and so is no file at all.
// ==============================================================================

use std::fs;
use std::path::Path;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use log::info;
use serde::{Deserialize, Serialize};

use crate::race_core::drive::{ARCADE, DRIFTER, DriveConfig};
use crate::race_core::race::RaceSettings;
use crate::race_core::types::{Pos3, to_pos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivePreset {
    Arcade,
    Drifter,
}

impl DrivePreset {
    pub fn config(self) -> DriveConfig {
        match self {
            DrivePreset::Arcade => ARCADE,
            DrivePreset::Drifter => DRIFTER,
        }
    }
}

/// Either a named preset or a fully spelled out drive config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriveChoice {
    Preset(DrivePreset),
    Custom(Box<DriveConfig>),
}

impl DriveChoice {
    pub fn resolve(&self) -> DriveConfig {
        match self {
            DriveChoice::Preset(p) => p.config(),
            DriveChoice::Custom(c) => **c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub position: [f32; 3],
    #[serde(default = "default_gate_half_extents")]
    pub half_extents: [f32; 3], // m, sensor box
    /// Unset: the gate faces along the line from the previous to the next gate.
    #[serde(default)]
    pub yaw_deg: Option<f32>,
}

fn default_gate_half_extents() -> [f32; 3] {
    [8.0, 3.0, 1.0]
}

/// Static box (ramp, wall) added to the ground layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub position: [f32; 3],
    pub half_extents: [f32; 3],
    #[serde(default)]
    pub pitch_deg: f32,
    #[serde(default)]
    pub yaw_deg: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub ground_half_extents: [f32; 3],
    pub checkpoints: Vec<CheckpointConfig>,
    /// Dedicated AI waypoints; the checkpoints are used when absent.
    pub ai_route: Option<Vec<[f32; 3]>>,
    pub blocks: Vec<BlockConfig>,
}

impl Default for TrackConfig {
    fn default() -> Self {
        // rounded rectangle, 8 gates, counter-clockwise seen from above
        let gates = [
            [0.0, 0.0, 60.0],
            [30.0, 0.0, 110.0],
            [90.0, 0.0, 120.0],
            [140.0, 0.0, 90.0],
            [140.0, 0.0, 20.0],
            [110.0, 0.0, -30.0],
            [50.0, 0.0, -40.0],
            [0.0, 0.0, -10.0],
        ];
        Self {
            ground_half_extents: [400.0, 1.0, 400.0],
            checkpoints: gates
                .iter()
                .map(|&position| CheckpointConfig {
                    position,
                    half_extents: default_gate_half_extents(),
                    yaw_deg: None,
                })
                .collect(),
            ai_route: None,
            blocks: vec![BlockConfig {
                position: [140.0, 0.0, 55.0],
                half_extents: [6.0, 0.5, 8.0],
                pitch_deg: -8.0,
                yaw_deg: 0.0,
            }],
        }
    }
}

impl TrackConfig {
    pub fn checkpoint_positions(&self) -> Vec<Pos3> {
        self.checkpoints.iter().map(|c| to_pos(c.position)).collect()
    }

    pub fn ai_route_points(&self) -> Option<Vec<Pos3>> {
        self.ai_route.as_ref().map(|r| r.iter().copied().map(to_pos).collect())
    }

    /// Yaw of gate `index` so its thin axis lies along the direction of travel.
    pub fn gate_yaw_deg(&self, index: usize) -> f32 {
        let Some(gate) = self.checkpoints.get(index) else { return 0.0 };
        if let Some(yaw) = gate.yaw_deg {
            return yaw;
        }
        let n = self.checkpoints.len();
        if n < 2 {
            return 0.0;
        }
        let prev = to_pos(self.checkpoints[(index + n - 1) % n].position);
        let next = to_pos(self.checkpoints[(index + 1) % n].position);
        let d = next - prev;
        if d.x.abs() < 1e-6 && d.z.abs() < 1e-6 {
            return 0.0;
        }
        d.x.atan2(d.z).to_degrees()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub column_spacing: f32, // m between the two columns
    pub row_spacing: f32,    // m between rows
    pub stagger: f32,        // m the right column sits behind the left
    pub setback: f32,        // m from the start line to the first row
    pub spawn_height: f32,   // m above ground
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { column_spacing: 4.0, row_spacing: 8.0, stagger: 2.0, setback: 6.0, spawn_height: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_hz: u32,
    pub ai_count: usize,
    pub player_drive: DriveChoice,
    pub ai_drive: DriveChoice,
    pub race: RaceSettings,
    pub track: TrackConfig,
    pub grid: GridConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9001".into(),
            tick_hz: 60,
            ai_count: 2,
            player_drive: DriveChoice::Preset(DrivePreset::Arcade),
            ai_drive: DriveChoice::Preset(DrivePreset::Arcade),
            race: RaceSettings::default(),
            track: TrackConfig::default(),
            grid: GridConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("no config file given, using defaults");
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).wrap_err_with(|| format!("parsing {}", path.display()))?;
        info!("loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Fixed step in seconds; never zero.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }
}
