//! HUD events emitted by the race session.
//!
//! The session never renders anything; it pushes `HudEvent`s into a sink. The
//! server drains `BufferedHud` once per tick and broadcasts the events as JSON.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::lap::LapTint;
use crate::results::{LapRow, LeaderboardEntry};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HudEvent {
    /// Race-wide countdown text ("5".."1", "GO!")
    Countdown { text: String, visible: bool },
    /// Lap counter and timer block of one racer
    LapHud { racer: Uuid, visible: bool },
    LapCounter { racer: Uuid, current: u32, total: u32, text: String },
    CurrentLapTime { racer: Uuid, text: String },
    CompletedLap { racer: Uuid, text: String, tint: LapTint, visible: bool },
    RaceFinished { racer: Uuid, total_time: String, visible: bool },
    Leaderboard {
        racer: Uuid,
        entries: Vec<LeaderboardEntry>,
        laps: Vec<LapRow>,
    },
}

impl HudEvent {
    pub fn lap_counter(racer: Uuid, current: u32, total: u32) -> Self {
        HudEvent::LapCounter {
            racer,
            current,
            total,
            text: format!("Laps: {current}/{total}"),
        }
    }
}

pub trait HudSink {
    fn emit(&mut self, event: HudEvent);
}

/// Collects events until the tick loop drains them.
#[derive(Debug, Default)]
pub struct BufferedHud {
    events: Vec<HudEvent>,
}

impl BufferedHud {
    #[cfg(test)]
    pub fn events(&self) -> &[HudEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<HudEvent> {
        std::mem::take(&mut self.events)
    }
}

impl HudSink for BufferedHud {
    fn emit(&mut self, event: HudEvent) {
        // per-frame timer text would flood the log
        if !matches!(event, HudEvent::CurrentLapTime { .. }) {
            debug!(?event, "hud");
        }
        self.events.push(event);
    }
}
