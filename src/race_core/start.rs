// race_core/start.rs
// Countdown gate: Counting(3) -> Counting(2) -> Counting(1) -> Live.
// Nobody consumes movement input until Live.

use log::info;
use serde::{Deserialize, Serialize};

use crate::race_core::error::{SetupError, ensure_positive_interval};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartConfig {
    pub countdown_from: u32,
    pub interval: f32, // s per count
}

impl Default for StartConfig {
    fn default() -> Self {
        Self { countdown_from: 3, interval: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartState {
    Counting(u32),
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartEvent {
    Count(u32),
    Go,
}

#[derive(Debug, Clone)]
pub struct StartSequencer {
    state: StartState,
    interval: f32,
    timer: f32,
}

impl StartSequencer {
    pub fn new(config: StartConfig) -> Result<Self, SetupError> {
        ensure_positive_interval("start interval", config.interval)?;
        let state = if config.countdown_from == 0 { StartState::Live } else { StartState::Counting(config.countdown_from) };
        Ok(Self { state, interval: config.interval, timer: config.interval })
    }

    pub fn state(&self) -> StartState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == StartState::Live
    }

    /// The digit to show before the first tick, if still counting.
    pub fn initial_event(&self) -> StartEvent {
        match self.state {
            StartState::Counting(n) => StartEvent::Count(n),
            StartState::Live => StartEvent::Go,
        }
    }

    /// Advances by `dt`; a long frame can cross several intervals at once.
    pub fn tick(&mut self, dt: f32) -> Vec<StartEvent> {
        let mut events = Vec::new();
        let StartState::Counting(_) = self.state else {
            return events;
        };

        self.timer -= dt;
        while self.timer <= 0.0 {
            let StartState::Counting(n) = self.state else { break };
            let remaining = n - 1;
            self.timer += self.interval;
            if remaining == 0 {
                self.state = StartState::Live;
                info!("race is live");
                events.push(StartEvent::Go);
                break;
            }
            self.state = StartState::Counting(remaining);
            events.push(StartEvent::Count(remaining));
        }
        events
    }
}
