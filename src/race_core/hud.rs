// race_core/hud.rs
use serde::Serialize;

use crate::race_core::types::VehicleId;

/// Everything the UI layer is told. Strings are pre-formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HudEvent {
    Countdown { digit: u32 },
    Go,
    LapCounter { text: String },
    CurrentLapTime { text: String },
    BestLapTime { text: String },
    Position { text: String },
    Results { standings: Vec<ResultLine> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultLine {
    pub place: usize,
    pub vehicle: VehicleId,
    pub is_player: bool,
    pub race_time: String,
    pub best_lap: String,
}

pub trait HudSink {
    fn hud(&mut self, event: HudEvent);
}

impl HudSink for Vec<HudEvent> {
    fn hud(&mut self, event: HudEvent) {
        self.push(event);
    }
}

/// `mm:ss.mmm`; minutes keep counting past 59.
pub fn format_lap_time(seconds: f32) -> String {
    let total_ms = (seconds.max(0.0) as f64 * 1000.0).round() as u64;
    let minutes = total_ms / 60_000;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{minutes:02}:{secs:02}.{millis:03}")
}

/// `rank/total`
pub fn format_position(rank: usize, total: usize) -> String {
    format!("{rank}/{total}")
}

pub fn format_lap_counter(lap: u32, total_laps: u32) -> String {
    format!("{}/{}", lap.min(total_laps), total_laps)
}
