//! Per-racer lap progress: Countdown -> Racing -> Finished

use std::collections::HashSet;

use serde::Serialize;

use crate::timing::format_time;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    Countdown,
    Racing,
    Finished,
}

/// Colour of the completed-lap banner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LapTint {
    /// First lap, nothing to compare with
    Neutral,
    Improved,
    Regressed,
}

/// A committed lap compared with the previous one
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LapSplit {
    pub lap: u32,
    pub time: f32,
    pub delta: Option<f32>,
}

impl LapSplit {
    pub fn tint(&self) -> LapTint {
        match self.delta {
            None => LapTint::Neutral,
            Some(d) if d < 0.0 => LapTint::Improved,
            Some(_) => LapTint::Regressed,
        }
    }

    /// `Lap Time: MM:SS:CC (+d.dd)`
    pub fn banner_text(&self) -> String {
        let delta = match self.delta {
            Some(d) if d > 0.0 => format!(" (+{d:.2})"),
            Some(d) => format!(" ({d:.2})"),
            None => String::new(),
        };
        format!("Lap Time: {}{}", format_time(self.time), delta)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FinishOutcome {
    /// Not racing, or checkpoints missing this lap
    Ignored,
    LapCompleted(LapSplit),
    RaceFinished(LapSplit),
}

#[derive(Debug, Clone)]
pub struct LapProgress {
    phase: RacePhase,
    current_lap: u32,
    total_laps: u32,
    lap_start: f32,
    passed: HashSet<usize>,
    lap_times: Vec<f32>,
    total_time: f32,
}

impl LapProgress {
    pub fn new(total_laps: u32) -> Self {
        Self {
            phase: RacePhase::Countdown,
            current_lap: 1,
            total_laps: total_laps.max(1),
            lap_start: 0.0,
            passed: HashSet::new(),
            lap_times: Vec::new(),
            total_time: 0.0,
        }
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn current_lap(&self) -> u32 {
        self.current_lap
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    pub fn lap_times(&self) -> &[f32] {
        &self.lap_times
    }

    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RacePhase::Finished
    }

    pub fn checkpoints_passed(&self) -> usize {
        self.passed.len()
    }

    /// Countdown over: start the lap clock
    pub fn start(&mut self, now: f32) {
        if self.phase == RacePhase::Countdown {
            self.phase = RacePhase::Racing;
            self.lap_start = now;
        }
    }

    /// Elapsed time on the running lap
    pub fn current_lap_time(&self, now: f32) -> f32 {
        match self.phase {
            RacePhase::Racing => (now - self.lap_start).max(0.0),
            _ => 0.0,
        }
    }

    /// Returns true when the checkpoint is newly recorded this lap
    pub fn on_checkpoint(&mut self, checkpoint: usize) -> bool {
        self.phase == RacePhase::Racing && self.passed.insert(checkpoint)
    }

    pub fn on_finish_line(&mut self, now: f32, total_checkpoints: usize) -> FinishOutcome {
        if self.phase != RacePhase::Racing || self.passed.len() != total_checkpoints {
            return FinishOutcome::Ignored;
        }

        let time = now - self.lap_start;
        let delta = self.lap_times.last().map(|prev| time - prev);
        self.lap_times.push(time);
        self.total_time += time;

        let split = LapSplit { lap: self.current_lap, time, delta };

        if self.current_lap < self.total_laps {
            self.current_lap += 1;
            self.lap_start = now;
            self.passed.clear();
            FinishOutcome::LapCompleted(split)
        } else {
            self.phase = RacePhase::Finished;
            FinishOutcome::RaceFinished(split)
        }
    }
}
