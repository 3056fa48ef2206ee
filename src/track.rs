//! Track layout: trigger volumes, waypoint route and start grid.
//!
//! Trigger volumes are axis-aligned boxes evaluated against each racer's
//! reference point after every physics step. `TriggerTracker` turns the
//! per-tick overlap state into one `Enter` per overlap start and one `Exit`
//! per overlap end.

use std::collections::HashSet;
use std::path::Path;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::RaceError;
use crate::route::WaypointRoute;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerVolume {
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

impl TriggerVolume {
    pub fn new(center: [f32; 3], half_extents: [f32; 3]) -> Self {
        Self { center, half_extents }
    }

    pub fn contains(&self, p: &Point3<f32>) -> bool {
        (p.x - self.center[0]).abs() <= self.half_extents[0]
            && (p.y - self.center[1]).abs() <= self.half_extents[1]
            && (p.z - self.center[2]).abs() <= self.half_extents[2]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TriggerKind {
    Checkpoint(usize),
    Finish,
    BrakingZone(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub transition: Transition,
}

/// Start grid placement
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    /// Pole position slot
    pub origin: [f32; 3],
    /// Distance between the two columns
    pub column_gap: f32,
    /// Distance between rows, measured back along +Z
    pub row_gap: f32,
}

/// On-disk track description (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFile {
    pub name: String,
    pub checkpoints: Vec<TriggerVolume>,
    pub finish: TriggerVolume,
    #[serde(default)]
    pub braking_zones: Vec<TriggerVolume>,
    pub waypoints: Vec<[f32; 3]>,
    pub grid: GridLayout,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    checkpoints: Vec<TriggerVolume>,
    finish: TriggerVolume,
    braking_zones: Vec<TriggerVolume>,
    route: WaypointRoute,
    pub grid: GridLayout,
}

impl Track {
    pub fn from_track_file(file: TrackFile) -> Result<Self, RaceError> {
        if file.checkpoints.is_empty() {
            return Err(RaceError::InvalidTrack("track needs at least one checkpoint"));
        }
        if file.grid.row_gap <= 0.0 || file.grid.column_gap < 0.0 {
            return Err(RaceError::InvalidTrack("grid gaps must be positive"));
        }
        Ok(Self::build(file))
    }

    fn build(file: TrackFile) -> Self {
        let route = WaypointRoute::new(
            file.waypoints
                .iter()
                .map(|[x, y, z]| Point3::new(*x, *y, *z))
                .collect(),
        );

        Self {
            name: file.name,
            checkpoints: file.checkpoints,
            finish: file.finish,
            braking_zones: file.braking_zones,
            route,
            grid: file.grid,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, RaceError> {
        let file: TrackFile = serde_json::from_str(raw)?;
        Self::from_track_file(file)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RaceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RaceError::TrackIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Built-in loop: start/finish on the z axis heading -Z, turning left.
    pub fn default_oval() -> Self {
        let file = TrackFile {
            name: "Default Oval".to_string(),
            checkpoints: vec![
                TriggerVolume::new([0.0, 1.0, -120.0], [14.0, 4.0, 3.0]),
                TriggerVolume::new([-120.0, 1.0, -100.0], [14.0, 4.0, 3.0]),
                TriggerVolume::new([-70.0, 1.0, 38.0], [3.0, 4.0, 14.0]),
            ],
            finish: TriggerVolume::new([0.0, 1.0, 0.0], [14.0, 4.0, 2.0]),
            braking_zones: vec![
                TriggerVolume::new([0.0, 1.0, -175.0], [14.0, 4.0, 15.0]),
                TriggerVolume::new([-120.0, 1.0, -20.0], [14.0, 4.0, 15.0]),
            ],
            waypoints: vec![
                [0.0, 0.0, -80.0],
                [0.0, 0.0, -160.0],
                [-30.0, 0.0, -200.0],
                [-90.0, 0.0, -200.0],
                [-120.0, 0.0, -160.0],
                [-120.0, 0.0, -40.0],
                [-100.0, 0.0, 30.0],
                [-40.0, 0.0, 40.0],
                [0.0, 0.0, 20.0],
            ],
            grid: GridLayout {
                origin: [0.0, 0.0, -30.0],
                column_gap: 7.0,
                row_gap: 8.0,
            },
        };

        Self::build(file)
    }

    pub fn route(&self) -> &WaypointRoute {
        &self.route
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    #[cfg(test)]
    pub fn finish(&self) -> &TriggerVolume {
        &self.finish
    }

    /// Every trigger volume tagged with its kind
    pub fn volumes(&self) -> impl Iterator<Item = (TriggerKind, &TriggerVolume)> {
        self.checkpoints
            .iter()
            .enumerate()
            .map(|(i, v)| (TriggerKind::Checkpoint(i), v))
            .chain(std::iter::once((TriggerKind::Finish, &self.finish)))
            .chain(
                self.braking_zones
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (TriggerKind::BrakingZone(i), v)),
            )
    }
}

/// Per-racer overlap state; emits transitions only.
#[derive(Debug, Clone, Default)]
pub struct TriggerTracker {
    inside: HashSet<TriggerKind>,
}

impl TriggerTracker {
    pub fn update(&mut self, track: &Track, position: &Point3<f32>) -> Vec<TriggerEvent> {
        let mut events = Vec::new();

        for (kind, volume) in track.volumes() {
            let now_inside = volume.contains(position);
            let was_inside = self.inside.contains(&kind);

            if now_inside && !was_inside {
                self.inside.insert(kind);
                events.push(TriggerEvent { kind, transition: Transition::Enter });
            } else if !now_inside && was_inside {
                self.inside.remove(&kind);
                events.push(TriggerEvent { kind, transition: Transition::Exit });
            }
        }

        events
    }

    /// Still overlapping at least one braking zone
    pub fn in_braking_zone(&self) -> bool {
        self.inside.iter().any(|k| matches!(k, TriggerKind::BrakingZone(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_contains_is_inclusive_box() {
        let v = TriggerVolume::new([0.0, 0.0, 0.0], [2.0, 1.0, 2.0]);
        assert!(v.contains(&Point3::new(2.0, 0.0, -2.0)));
        assert!(!v.contains(&Point3::new(2.1, 0.0, 0.0)));
        assert!(!v.contains(&Point3::new(0.0, 1.5, 0.0)));
    }

    #[test]
    fn tracker_emits_one_enter_and_one_exit_per_overlap() {
        let track = Track::default_oval();
        let mut tracker = TriggerTracker::default();
        let finish = Point3::new(0.0, 0.5, 0.0);

        assert!(tracker.update(&track, &Point3::new(0.0, 0.5, 10.0)).is_empty());

        let enter = tracker.update(&track, &finish);
        assert_eq!(
            enter,
            vec![TriggerEvent { kind: TriggerKind::Finish, transition: Transition::Enter }]
        );
        assert!(tracker.update(&track, &finish).is_empty());
        assert!(!tracker.in_braking_zone());

        let exit = tracker.update(&track, &Point3::new(0.0, 0.5, -10.0));
        assert_eq!(
            exit,
            vec![TriggerEvent { kind: TriggerKind::Finish, transition: Transition::Exit }]
        );
    }

    #[test]
    fn overlapping_braking_zones_hold_until_the_last_exit() {
        let track = Track::from_track_file(TrackFile {
            name: "Chicane".to_string(),
            checkpoints: vec![TriggerVolume::new([0.0, 0.0, -200.0], [5.0, 2.0, 2.0])],
            finish: TriggerVolume::new([0.0, 0.0, 0.0], [5.0, 2.0, 2.0]),
            braking_zones: vec![
                TriggerVolume::new([0.0, 0.0, -50.0], [5.0, 2.0, 10.0]),
                TriggerVolume::new([0.0, 0.0, -65.0], [5.0, 2.0, 10.0]),
            ],
            waypoints: Vec::new(),
            grid: GridLayout { origin: [0.0, 0.0, -10.0], column_gap: 4.0, row_gap: 6.0 },
        })
        .unwrap();
        let mut tracker = TriggerTracker::default();

        tracker.update(&track, &Point3::new(0.0, 0.0, -45.0));
        assert!(tracker.in_braking_zone());

        // overlap of both zones, then out of the first only
        tracker.update(&track, &Point3::new(0.0, 0.0, -58.0));
        let events = tracker.update(&track, &Point3::new(0.0, 0.0, -70.0));
        assert_eq!(
            events,
            vec![TriggerEvent { kind: TriggerKind::BrakingZone(0), transition: Transition::Exit }]
        );
        assert!(tracker.in_braking_zone());

        tracker.update(&track, &Point3::new(0.0, 0.0, -90.0));
        assert!(!tracker.in_braking_zone());
    }

    #[test]
    fn default_oval_grid_clears_finish_volume() {
        let track = Track::default_oval();
        let [x, y, z] = track.grid.origin;
        assert!(!track.finish().contains(&Point3::new(x, y, z)));
        assert_eq!(track.checkpoint_count(), 3);
        assert_eq!(track.route().len(), 9);
    }

    #[test]
    fn parses_track_json() {
        let raw = r#"{
            "name": "Test Strip",
            "checkpoints": [{ "center": [0, 0, -50], "half_extents": [5, 2, 2] }],
            "finish": { "center": [0, 0, 0], "half_extents": [5, 2, 2] },
            "waypoints": [[0, 0, -50], [0, 0, 0]],
            "grid": { "origin": [0, 0, -10], "column_gap": 4, "row_gap": 6 }
        }"#;
        let track = Track::from_json(raw).unwrap();
        assert_eq!(track.name, "Test Strip");
        assert_eq!(track.checkpoint_count(), 1);
        assert_eq!(track.volumes().count(), 2);
    }

    #[test]
    fn rejects_track_without_checkpoints() {
        let raw = r#"{
            "name": "Broken",
            "checkpoints": [],
            "finish": { "center": [0, 0, 0], "half_extents": [5, 2, 2] },
            "waypoints": [],
            "grid": { "origin": [0, 0, -10], "column_gap": 4, "row_gap": 6 }
        }"#;
        assert!(matches!(Track::from_json(raw), Err(RaceError::InvalidTrack(_))));
    }
}
