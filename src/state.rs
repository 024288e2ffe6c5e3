use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::race_core::drive::{EffectsSink, VehicleFx};
use crate::race_core::hud::{HudEvent, HudSink};
use crate::race_core::race::RaceSnapshot;
use crate::race_core::types::ControlState;

/// Raw controls as sent by the driving client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFrame {
    pub throttle: f32,
    pub steer: f32,
    pub brake: bool,
    pub handbrake: bool,
    pub reset: bool,
    pub enable_ai: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Driver,
    Spectator,
}

/// HUD and FX produced during one tick, flushed with the frame broadcast.
#[derive(Debug, Default)]
pub struct FrameOutbox {
    pub hud: Vec<HudEvent>,
    pub fx: Vec<VehicleFx>,
}

impl HudSink for FrameOutbox {
    fn hud(&mut self, event: HudEvent) {
        self.hud.push(event);
    }
}

impl EffectsSink for FrameOutbox {
    fn vehicle_effects(&mut self, fx: VehicleFx) {
        self.fx.push(fx);
    }
}

#[derive(Serialize)]
struct Frame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    tick: u64,
    race: &'a RaceSnapshot,
    hud: &'a [HudEvent],
    fx: &'a [VehicleFx],
}

pub struct SharedGameState {
    pub tick: u64,
    pub clients: HashMap<Uuid, UnboundedSender<String>>,
    pub driver: Option<Uuid>,
    pub controls: ControlState,
    /// HUD events every newcomer needs (countdown digit, lap counter, ...).
    pub hud_history: Vec<HudEvent>,
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
            driver: None,
            controls: ControlState::default(),
            hud_history: Vec::new(),
        }
    }

    /// First client in drives the player car, everyone after spectates.
    pub fn register_client(&mut self, tx: UnboundedSender<String>) -> (Uuid, ClientRole) {
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        let role = if self.driver.is_none() {
            self.driver = Some(id);
            ClientRole::Driver
        } else {
            ClientRole::Spectator
        };
        info!("client {id} joined as {role:?} ({} connected)", self.clients.len());
        (id, role)
    }

    pub fn remove_client(&mut self, id: &Uuid) {
        self.clients.remove(id);
        if self.driver == Some(*id) {
            // the car coasts until someone else takes over
            self.driver = None;
            self.controls = ControlState::default();
            info!("driver {id} left, controls released");
        }
    }

    /// Only the driver's input reaches the player car.
    pub fn update_input(&mut self, client: &Uuid, input: InputFrame) -> bool {
        if self.driver != Some(*client) {
            return false;
        }
        let c = &mut self.controls;
        c.vertical = input.throttle.clamp(-1.0, 1.0);
        c.horizontal = input.steer.clamp(-1.0, 1.0);
        c.brake = input.brake;
        c.handbrake = input.handbrake;
        c.reset = input.reset;
        c.enable_ai = input.enable_ai;
        true
    }

    /// Keeps the HUD lines a late joiner needs to draw a complete screen.
    pub fn remember_hud(&mut self, events: &[HudEvent]) {
        for ev in events {
            if matches!(ev, HudEvent::CurrentLapTime { .. }) {
                continue;
            }
            let same_kind = std::mem::discriminant(ev);
            self.hud_history.retain(|old| std::mem::discriminant(old) != same_kind);
            self.hud_history.push(ev.clone());
        }
    }

    /// Build and send one frame (race snapshot + this tick's HUD/FX) to all clients.
    pub fn broadcast_frame(&mut self, race: &RaceSnapshot, outbox: &FrameOutbox) {
        let frame = Frame { kind: "frame", tick: self.tick, race, hud: &outbox.hud, fx: &outbox.fx };
        let json = match serde_json::to_string(&frame) {
            Ok(j) => j,
            Err(e) => {
                warn!("frame {} not serialisable: {e}", self.tick);
                return;
            }
        };

        self.clients.retain(|id, tx| {
            let alive = tx.send(json.clone()).is_ok();
            if !alive {
                info!("dropping closed client {id}");
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn first_client_drives_rest_spectate() {
        let mut s = SharedGameState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (a, ra) = s.register_client(tx.clone());
        let (b, rb) = s.register_client(tx);
        assert_eq!(ra, ClientRole::Driver);
        assert_eq!(rb, ClientRole::Spectator);

        let input = InputFrame { throttle: 3.0, reset: true, ..Default::default() };
        assert!(!s.update_input(&b, input));
        assert!(s.update_input(&a, input));
        assert_eq!(s.controls.vertical, 1.0);
        assert!(s.controls.reset);

        s.remove_client(&a);
        assert_eq!(s.driver, None);
        assert_eq!(s.controls, ControlState::default());
    }

    #[test]
    fn hud_history_keeps_latest_of_each_kind() {
        let mut s = SharedGameState::new();
        s.remember_hud(&[
            HudEvent::Countdown { digit: 3 },
            HudEvent::LapCounter { text: "1/3".into() },
            HudEvent::CurrentLapTime { text: "00:01.000".into() },
        ]);
        s.remember_hud(&[HudEvent::Countdown { digit: 2 }]);
        assert_eq!(
            s.hud_history,
            vec![HudEvent::LapCounter { text: "1/3".into() }, HudEvent::Countdown { digit: 2 }]
        );
    }

    #[test]
    fn closed_clients_are_dropped_on_broadcast() {
        let mut s = SharedGameState::new();
        let (tx, rx) = mpsc::unbounded_channel();
        s.register_client(tx);
        drop(rx);
        let snapshot = RaceSnapshot { live: false, player_position: 1, competitors: 1, total_laps: 3, vehicles: vec![] };
        s.broadcast_frame(&snapshot, &FrameOutbox::default());
        assert!(s.clients.is_empty());
    }
}
