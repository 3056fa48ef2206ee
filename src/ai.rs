// ==============================================================================
// ai.rs — AI WAYPOINT PURSUIT + STUCK RECOVERY
// ------------------------------------------------------------------------------
// Two modes:
// - Pursuing:  steer toward the current waypoint, full throttle until inside
//              the waypoint range, then advance (wrapping). Braking zones
//              override throttle by speed tier. A stuck timer runs while the
//              car is asked to move but does not.
// - Recovering: timed manoeuvre on the simulation clock
//              Reversing -> Settling -> Realigning -> Holding -> Pursuing
//              Realigning re-targets the NEAREST waypoint, not the next one.
//
// The driver only produces a ControlCommand; VehicleController applies it.
// ==============================================================================

use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::route::{WaypointRoute, signed_angle_deg, up};
use crate::vehicle::{ChassisBody, ControlCommand};

#[derive(Clone, Copy, Debug)]
pub struct AiTuning {
    pub waypoint_range: f32,    // m, advance when strictly closer than this
    pub steer_speed: f32,       // degrees of heading error mapped to full lock

    // --- braking zone speed tiers (m/s) ---
    pub brake_high_speed: f32,  // above: full reverse
    pub brake_mid_speed: f32,   // above: half reverse
    pub crawl_speed: f32,       // below: forced forward

    // --- stuck detection ---
    pub min_velocity: f32,      // m/s
    pub stuck_time: f32,        // s of low speed under throttle before recovering

    // --- recovery stage durations (s) ---
    pub reverse_time: f32,
    pub settle_time: f32,
    pub realign_time: f32,
    pub hold_time: f32,
}

pub const CAUTIOUS: AiTuning = AiTuning {
    waypoint_range: 8.0,
    steer_speed: 30.0,
    brake_high_speed: 22.0,
    brake_mid_speed: 14.0,
    crawl_speed: 1.0,
    min_velocity: 1.0,
    stuck_time: 3.0,
    reverse_time: 1.5,
    settle_time: 0.5,
    realign_time: 1.0,
    hold_time: 0.5,
};

pub const AGGRESSIVE: AiTuning = AiTuning {
    waypoint_range: 10.0,
    steer_speed: 25.0,
    brake_high_speed: 28.0,
    brake_mid_speed: 18.0,
    crawl_speed: 1.5,
    min_velocity: 1.5,
    stuck_time: 2.0,
    reverse_time: 1.0,
    settle_time: 0.3,
    realign_time: 0.8,
    hold_time: 0.3,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryStage {
    Reversing,
    Settling,
    Realigning,
    Holding,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AiMode {
    Pursuing,
    Recovering { stage: RecoveryStage, until: f32 },
}

/// What the driver reads from the chassis each tick
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub position: Point3<f32>,
    pub forward: Vector3<f32>,
    pub velocity: Vector3<f32>,
}

impl Observation {
    pub fn of(body: &dyn ChassisBody) -> Self {
        Self {
            position: body.position(),
            forward: body.forward(),
            velocity: body.linear_velocity(),
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.norm()
    }
}

#[derive(Debug, Clone)]
pub struct AiDriver {
    tuning: AiTuning,
    waypoint: usize,
    braking_zone: bool,
    stuck_timer: f32,
    mode: AiMode,
    recoveries: u32,
}

impl AiDriver {
    pub fn new(tuning: AiTuning) -> Self {
        Self {
            tuning,
            waypoint: 0,
            braking_zone: false,
            stuck_timer: 0.0,
            mode: AiMode::Pursuing,
            recoveries: 0,
        }
    }

    #[cfg(test)]
    pub fn current_waypoint(&self) -> usize {
        self.waypoint
    }

    #[cfg(test)]
    pub fn mode(&self) -> AiMode {
        self.mode
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.mode, AiMode::Recovering { .. })
    }

    /// Number of recoveries started since spawn
    #[cfg(test)]
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    #[cfg(test)]
    pub fn stuck_timer(&self) -> f32 {
        self.stuck_timer
    }

    #[cfg(test)]
    pub fn in_braking_zone(&self) -> bool {
        self.braking_zone
    }

    /// Toggled by braking-zone enter/exit events
    pub fn set_braking_zone(&mut self, inside: bool) {
        self.braking_zone = inside;
    }

    /// Produce this tick's command. `None` when the route is empty.
    pub fn tick(
        &mut self,
        route: &WaypointRoute,
        obs: &Observation,
        now: f32,
        dt: f32,
    ) -> Option<ControlCommand> {
        if route.is_empty() {
            return None;
        }
        if self.waypoint >= route.len() {
            self.waypoint = 0;
        }

        match self.mode {
            AiMode::Pursuing => Some(self.pursue(route, obs, now, dt)),
            AiMode::Recovering { stage, until } => Some(self.recover(route, obs, now, stage, until)),
        }
    }

    fn steer_toward(&self, target: &Point3<f32>, obs: &Observation) -> f32 {
        let to_target = target - obs.position;
        let angle = signed_angle_deg(&obs.forward, &to_target, &up());
        (angle / self.tuning.steer_speed).clamp(-1.0, 1.0)
    }

    /// Throttle inside a braking zone, by speed tier
    pub fn braking_zone_throttle(&self, speed: f32) -> f32 {
        let t = &self.tuning;
        if speed > t.brake_high_speed {
            -1.0
        } else if speed > t.brake_mid_speed {
            -0.5
        } else if speed < t.crawl_speed {
            1.0
        } else {
            0.0
        }
    }

    fn pursue(&mut self, route: &WaypointRoute, obs: &Observation, now: f32, dt: f32) -> ControlCommand {
        let Some(target) = route.get(self.waypoint).copied() else {
            return ControlCommand::default();
        };

        let distance = nalgebra::distance(&target, &obs.position);
        let steer = self.steer_toward(&target, obs);
        let mut throttle = if distance > self.tuning.waypoint_range { 1.0 } else { 0.0 };

        if self.braking_zone {
            throttle = self.braking_zone_throttle(obs.speed());
        }

        if distance < self.tuning.waypoint_range {
            self.waypoint = route.next_index(self.waypoint);
            debug!(waypoint = self.waypoint, "waypoint reached, advancing");
        }

        // --- stuck detection ---
        if throttle > 0.0 && obs.speed() < self.tuning.min_velocity {
            self.stuck_timer += dt;
        } else {
            self.stuck_timer = 0.0;
        }

        if self.stuck_timer >= self.tuning.stuck_time {
            self.recoveries += 1;
            self.mode = AiMode::Recovering {
                stage: RecoveryStage::Reversing,
                until: now + self.tuning.reverse_time,
            };
            info!(
                waypoint = self.waypoint,
                stuck_for = self.stuck_timer,
                attempt = self.recoveries,
                "AI stuck, starting recovery"
            );
            return self.stage_command(route, obs, RecoveryStage::Reversing);
        }

        ControlCommand::new(throttle, steer, false)
    }

    fn recover(
        &mut self,
        route: &WaypointRoute,
        obs: &Observation,
        now: f32,
        stage: RecoveryStage,
        until: f32,
    ) -> ControlCommand {
        if now < until {
            return self.stage_command(route, obs, stage);
        }

        // deadline passed: resume with the next stage
        let t = self.tuning;
        let next = match stage {
            RecoveryStage::Reversing => Some((RecoveryStage::Settling, t.settle_time)),
            RecoveryStage::Settling => {
                if let Some(nearest) = route.nearest_index(&obs.position) {
                    self.waypoint = nearest;
                }
                Some((RecoveryStage::Realigning, t.realign_time))
            }
            RecoveryStage::Realigning => Some((RecoveryStage::Holding, t.hold_time)),
            RecoveryStage::Holding => None,
        };

        match next {
            Some((stage, duration)) => {
                self.mode = AiMode::Recovering { stage, until: now + duration };
                debug!(?stage, "recovery stage");
                self.stage_command(route, obs, stage)
            }
            None => {
                self.mode = AiMode::Pursuing;
                self.stuck_timer = 0.0;
                info!(waypoint = self.waypoint, "recovery finished, resuming pursuit");
                ControlCommand::default()
            }
        }
    }

    fn stage_command(&self, route: &WaypointRoute, obs: &Observation, stage: RecoveryStage) -> ControlCommand {
        let steer = route
            .get(self.waypoint)
            .map(|target| self.steer_toward(target, obs))
            .unwrap_or(0.0);

        match stage {
            RecoveryStage::Reversing => ControlCommand::new(-1.0, -steer, false),
            RecoveryStage::Settling | RecoveryStage::Holding => ControlCommand::default(),
            RecoveryStage::Realigning => ControlCommand::new(1.0, steer, false),
        }
    }
}
