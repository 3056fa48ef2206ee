//! Session-wide race results and leaderboard construction

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::error::RaceError;
use crate::timing::{format_leaderboard_time, format_time};

/// Total time given to racers that have not finished; sorts last
pub const DID_NOT_FINISH: f32 = f32::MAX;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceResult {
    pub lap_times: Vec<f32>,
    pub total_time: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub position: usize,
    pub name: String,
    pub total_time: f32,
    pub display_time: String,
    pub finished: bool,
}

/// One row of a racer's own lap breakdown (`Lap 2  01:02:03`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapRow {
    pub label: String,
    pub time: String,
}

pub fn lap_rows(lap_times: &[f32]) -> Vec<LapRow> {
    lap_times
        .iter()
        .enumerate()
        .map(|(i, t)| LapRow {
            label: format!("Lap {}", i + 1),
            time: format_time(*t),
        })
        .collect()
}

/// Results keyed by racer name, written once per racer at its finish.
#[derive(Debug, Default)]
pub struct RaceResults {
    by_name: HashMap<String, RaceResult>,
}

impl RaceResults {
    pub fn record(&mut self, name: &str, lap_times: &[f32], total_time: f32) -> Result<(), RaceError> {
        if self.by_name.contains_key(name) {
            return Err(RaceError::AlreadyRecorded(name.to_string()));
        }

        info!(racer = %name, laps = lap_times.len(), total = %format_time(total_time), "result recorded");
        self.by_name.insert(
            name.to_string(),
            RaceResult {
                lap_times: lap_times.to_vec(),
                total_time,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RaceResult> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// One entry per racer name, ascending by total time, DNF last.
    pub fn leaderboard<'a>(&self, racers: impl IntoIterator<Item = &'a str>) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(String, f32, bool)> = racers
            .into_iter()
            .map(|name| match self.by_name.get(name) {
                Some(result) => (name.to_string(), result.total_time, true),
                None => (name.to_string(), DID_NOT_FINISH, false),
            })
            .collect();

        rows.sort_by(|a, b| a.1.total_cmp(&b.1));

        rows.into_iter()
            .enumerate()
            .map(|(i, (name, total_time, finished))| LeaderboardEntry {
                position: i + 1,
                name,
                total_time,
                display_time: format_leaderboard_time(total_time),
                finished,
            })
            .collect()
    }
}
