// ==============================================================================
// session.rs — RACE SESSION (SPAWN, COUNTDOWN, TICK, LAPS, RESULTS)
// ------------------------------------------------------------------------------
// Owns everything that used to be process-wide: track, name/skin pools, grid,
// racers, results and the timed HUD tasks. The tick loop is the only writer.
//
// Per tick:
//   1) advance the sim clock, run due tasks (countdown, banner hides, reveals)
//   2) drivers -> ControlCommand -> VehicleController -> wheel actuators
//   3) physics step
//   4) trigger volumes -> checkpoint / finish / braking zone handling
//   5) per-frame HUD text (current lap time)
// ==============================================================================

use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::{AiDriver, AiTuning, Observation};
use crate::error::RaceError;
use crate::hud::{HudEvent, HudSink};
use crate::lap::{FinishOutcome, LapProgress, LapTint, RacePhase};
use crate::results::{LeaderboardEntry, RaceResults, lap_rows};
use crate::roster::Roster;
use crate::spawn::SpawnGrid;
use crate::timing::{SimClock, Timeline, format_time};
use crate::track::{Track, TriggerEvent, TriggerKind, TriggerTracker, Transition};
use crate::vehicle::{ChassisBody, ControlCommand, PLAYER_CAR, VehicleController, VehicleTuning};

// --------------------------------------------------
// HUD timings (seconds)
// --------------------------------------------------
pub const COUNTDOWN_FROM: u32 = 5;
pub const GO_VISIBLE: f32 = 1.0;
pub const LAP_BANNER_VISIBLE: f32 = 2.0;
pub const LEADERBOARD_DELAY: f32 = 3.0;

/// The physics side of the session: one chassis per racer id.
pub trait VehicleWorld {
    fn spawn_vehicle(&mut self, id: Uuid, position: Point3<f32>);
    fn despawn_vehicle(&mut self, id: Uuid);
    fn chassis(&self, id: Uuid) -> Option<&dyn ChassisBody>;
    fn chassis_mut(&mut self, id: Uuid) -> Option<&mut dyn ChassisBody>;
    fn step(&mut self, dt: f32);
}

#[derive(Debug)]
pub enum Driver {
    /// Latest input received from the player's client
    Player { input: ControlCommand },
    Ai(AiDriver),
}

#[derive(Debug)]
pub struct Racer {
    pub id: Uuid,
    pub name: String,
    pub skin: String,
    pub slot: usize,
    pub driver: Driver,
    pub controller: VehicleController,
    pub lap: LapProgress,
    triggers: TriggerTracker,
}

impl Racer {
    pub fn is_player(&self) -> bool {
        matches!(self.driver, Driver::Player { .. })
    }
}

/// Deferred session work, resumed once the sim clock passes its deadline
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionTask {
    CountdownTick(u32),
    Go,
    HideCountdown,
    HideLapBanner { racer: Uuid },
    RevealLeaderboard { racer: Uuid },
}

/// Per-racer state broadcast to clients
#[derive(Debug, Clone, Serialize)]
pub struct RacerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub skin: String,
    pub player: bool,
    pub slot: usize,
    pub position: [f32; 3],
    pub lap: u32,
    pub phase: RacePhase,
    pub recovering: bool,
}

pub struct RaceSession {
    track: Track,
    roster: Roster,
    grid: SpawnGrid,
    racers: Vec<Racer>,
    results: RaceResults,
    timeline: Timeline<SessionTask>,
    clock: SimClock,
    total_laps: u32,
    started: bool,
}

impl RaceSession {
    pub fn new(track: Track, roster: Roster, total_laps: u32) -> Self {
        let grid = SpawnGrid::new(track.grid);
        Self {
            track,
            roster,
            grid,
            racers: Vec::new(),
            results: RaceResults::default(),
            timeline: Timeline::default(),
            clock: SimClock::default(),
            total_laps: total_laps.max(1),
            started: false,
        }
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn track(&self) -> &Track {
        &self.track
    }

    #[cfg(test)]
    pub fn racers(&self) -> &[Racer] {
        &self.racers
    }

    pub fn racer(&self, id: Uuid) -> Option<&Racer> {
        self.racers.iter().find(|r| r.id == id)
    }

    pub fn results(&self) -> &RaceResults {
        &self.results
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    /// Every racer finished
    pub fn is_complete(&self) -> bool {
        !self.racers.is_empty() && self.racers.iter().all(|r| r.lap.is_finished())
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.results.leaderboard(self.racers.iter().map(|r| r.name.as_str()))
    }

    pub fn snapshot<W: VehicleWorld>(&self, world: &W) -> Vec<RacerSnapshot> {
        self.racers
            .iter()
            .filter_map(|r| {
                let p = world.chassis(r.id)?.position();
                Some(RacerSnapshot {
                    id: r.id,
                    name: r.name.clone(),
                    skin: r.skin.clone(),
                    player: r.is_player(),
                    slot: r.slot,
                    position: [p.x, p.y, p.z],
                    lap: r.lap.current_lap(),
                    phase: r.lap.phase(),
                    recovering: matches!(&r.driver, Driver::Ai(ai) if ai.is_recovering()),
                })
            })
            .collect()
    }

    // ==========================================================================
    // Spawning
    // ==========================================================================

    /// Human-driven car; named `Player N`, outside the AI name pool.
    pub fn spawn_player<W: VehicleWorld>(&mut self, world: &mut W) -> Result<Uuid, RaceError> {
        let number = self.racers.iter().filter(|r| r.is_player()).count() + 1;
        let name = format!("Player {number}");
        let skin = self.roster.assign_skin()?;
        self.spawn(
            world,
            name,
            skin,
            Driver::Player { input: ControlCommand::default() },
            PLAYER_CAR,
        )
    }

    /// AI car with a unique name and a skin from the session pools.
    pub fn spawn_ai<W: VehicleWorld>(
        &mut self,
        world: &mut W,
        driving: AiTuning,
        car: VehicleTuning,
    ) -> Result<Uuid, RaceError> {
        let identity = self.roster.assign()?;
        self.spawn(world, identity.name, identity.skin, Driver::Ai(AiDriver::new(driving)), car)
    }

    fn spawn<W: VehicleWorld>(
        &mut self,
        world: &mut W,
        name: String,
        skin: String,
        driver: Driver,
        tuning: VehicleTuning,
    ) -> Result<Uuid, RaceError> {
        let id = Uuid::new_v4();
        world.spawn_vehicle(id, self.grid.peek().position);
        if world.chassis(id).is_none() {
            // drop anything the world kept; the slot stays free
            world.despawn_vehicle(id);
            return Err(RaceError::MissingBody(id));
        }

        let slot = self.grid.allocate();
        let body = world.chassis_mut(id).ok_or(RaceError::MissingBody(id))?;
        let mut controller = VehicleController::new(tuning, body);
        // held on the grid until GO
        controller.toggle_engine(body, false);

        info!(
            racer = %name,
            %id,
            skin = %skin,
            slot = slot.slot,
            "racer spawned at ({:.1}, {:.1}, {:.1})",
            slot.position.x, slot.position.y, slot.position.z
        );

        self.racers.push(Racer {
            id,
            name,
            skin,
            slot: slot.slot,
            driver,
            controller,
            lap: LapProgress::new(self.total_laps),
            triggers: TriggerTracker::default(),
        });
        Ok(id)
    }

    // ==========================================================================
    // Inputs
    // ==========================================================================

    /// Store a player's latest input. Unknown or AI ids are logged and ignored.
    pub fn set_player_input(&mut self, id: Uuid, command: ControlCommand) -> bool {
        match self.racers.iter_mut().find(|r| r.id == id) {
            Some(Racer { driver: Driver::Player { input }, .. }) => {
                *input = ControlCommand::new(command.throttle, command.steer, command.handbrake);
                true
            }
            Some(racer) => {
                warn!(racer = %racer.name, "input for an AI racer ignored");
                false
            }
            None => {
                warn!(%id, "input for unknown racer ignored");
                false
            }
        }
    }

    // ==========================================================================
    // Countdown
    // ==========================================================================

    /// Schedule 5..1, GO! and the countdown hide. Engines stay off until GO.
    pub fn start(&mut self, hud: &mut dyn HudSink) {
        if self.started {
            warn!("race already started");
            return;
        }
        self.started = true;

        let now = self.clock.now();
        for (i, n) in (1..=COUNTDOWN_FROM).rev().enumerate() {
            self.timeline.schedule(now + i as f32, SessionTask::CountdownTick(n));
        }
        let go_at = now + COUNTDOWN_FROM as f32;
        self.timeline.schedule(go_at, SessionTask::Go);
        self.timeline.schedule(go_at + GO_VISIBLE, SessionTask::HideCountdown);

        for racer in self.racers.iter().filter(|r| r.is_player()) {
            hud.emit(HudEvent::LapHud { racer: racer.id, visible: false });
        }
        info!(racers = self.racers.len(), laps = self.total_laps, "countdown started");
    }

    fn run_task<W: VehicleWorld>(&mut self, task: SessionTask, world: &mut W, hud: &mut dyn HudSink) {
        let now = self.clock.now();

        match task {
            SessionTask::CountdownTick(n) => {
                debug!(n, "countdown");
                hud.emit(HudEvent::Countdown { text: n.to_string(), visible: true });
            }
            SessionTask::Go => {
                hud.emit(HudEvent::Countdown { text: "GO!".to_string(), visible: true });
                for racer in &mut self.racers {
                    match world.chassis_mut(racer.id) {
                        Some(body) => racer.controller.toggle_engine(body, true),
                        None => warn!(racer = %racer.name, "no physics body, engine left off"),
                    }
                    racer.lap.start(now);

                    if racer.is_player() {
                        hud.emit(HudEvent::LapHud { racer: racer.id, visible: true });
                        hud.emit(HudEvent::lap_counter(racer.id, 1, self.total_laps));
                    }
                }
                info!("GO!");
            }
            SessionTask::HideCountdown => {
                hud.emit(HudEvent::Countdown { text: String::new(), visible: false });
            }
            SessionTask::HideLapBanner { racer } => {
                hud.emit(HudEvent::CompletedLap {
                    racer,
                    text: String::new(),
                    tint: LapTint::Neutral,
                    visible: false,
                });
            }
            SessionTask::RevealLeaderboard { racer } => {
                let Some(r) = self.racer(racer) else {
                    warn!(%racer, "leaderboard reveal for unknown racer");
                    return;
                };
                hud.emit(HudEvent::RaceFinished {
                    racer,
                    total_time: format_time(r.lap.total_time()),
                    visible: false,
                });
                hud.emit(HudEvent::Leaderboard {
                    racer,
                    entries: self.leaderboard(),
                    laps: lap_rows(r.lap.lap_times()),
                });
            }
        }
    }

    // ==========================================================================
    // Tick
    // ==========================================================================

    pub fn tick<W: VehicleWorld>(&mut self, world: &mut W, dt: f32, hud: &mut dyn HudSink) {
        self.clock.advance(dt);
        let now = self.clock.now();

        // 1) timed tasks
        for task in self.timeline.drain_due(now) {
            self.run_task(task, world, hud);
        }

        // 2) drivers -> controllers -> wheels
        let route = self.track.route();
        for racer in &mut self.racers {
            let Some(body) = world.chassis_mut(racer.id) else {
                warn!(racer = %racer.name, "no physics body, skipping control");
                continue;
            };

            if racer.controller.is_engine_enabled() {
                let command = match &mut racer.driver {
                    Driver::Player { input } => Some(*input),
                    Driver::Ai(ai) => ai.tick(route, &Observation::of(body), now, dt),
                };
                if let Some(c) = command {
                    racer.controller.set_inputs(c.throttle, c.steer, c.handbrake);
                }
            }

            racer.controller.fixed_update(body);
        }

        // 3) physics
        world.step(dt);

        // 4) trigger volumes
        let mut events: Vec<(usize, TriggerEvent)> = Vec::new();
        for (i, racer) in self.racers.iter_mut().enumerate() {
            if let Some(body) = world.chassis(racer.id) {
                let position = body.position();
                events.extend(racer.triggers.update(&self.track, &position).into_iter().map(|e| (i, e)));
            }
        }
        for (i, event) in events {
            self.handle_trigger(i, event, world, hud);
        }

        // 5) per-frame HUD
        for racer in self.racers.iter().filter(|r| r.is_player()) {
            if racer.lap.phase() == RacePhase::Racing {
                hud.emit(HudEvent::CurrentLapTime {
                    racer: racer.id,
                    text: format!("Time: {}", format_time(racer.lap.current_lap_time(now))),
                });
            }
        }
    }

    fn handle_trigger<W: VehicleWorld>(
        &mut self,
        index: usize,
        event: TriggerEvent,
        world: &mut W,
        hud: &mut dyn HudSink,
    ) {
        if event.kind == TriggerKind::Finish {
            if event.transition == Transition::Enter {
                self.cross_finish(index, world, hud);
            }
            return;
        }

        let racer = &mut self.racers[index];
        match (event.kind, event.transition) {
            (TriggerKind::Checkpoint(cp), Transition::Enter) => {
                if racer.lap.on_checkpoint(cp) {
                    debug!(racer = %racer.name, checkpoint = cp, "checkpoint passed");
                }
            }
            (TriggerKind::BrakingZone(zone), transition) => {
                // braking zones steer AI throttle only
                if let Driver::Ai(ai) = &mut racer.driver {
                    let inside = racer.triggers.in_braking_zone();
                    ai.set_braking_zone(inside);
                    debug!(racer = %racer.name, zone, ?transition, inside, "braking zone");
                }
            }
            _ => {}
        }
    }

    fn cross_finish<W: VehicleWorld>(&mut self, index: usize, world: &mut W, hud: &mut dyn HudSink) {
        let now = self.clock.now();
        let required = self.track.checkpoint_count();
        let racer = &mut self.racers[index];
        let is_player = racer.is_player();

        match racer.lap.on_finish_line(now, required) {
            FinishOutcome::Ignored => {
                if racer.lap.phase() == RacePhase::Racing {
                    warn!(
                        racer = %racer.name,
                        passed = racer.lap.checkpoints_passed(),
                        required,
                        "finish line crossed with checkpoints missing, lap ignored"
                    );
                }
            }
            FinishOutcome::LapCompleted(split) => {
                info!(racer = %racer.name, lap = split.lap, time = %format_time(split.time), "lap completed");
                if is_player {
                    hud.emit(HudEvent::CompletedLap {
                        racer: racer.id,
                        text: split.banner_text(),
                        tint: split.tint(),
                        visible: true,
                    });
                    hud.emit(HudEvent::lap_counter(racer.id, racer.lap.current_lap(), self.total_laps));
                    self.timeline
                        .schedule(now + LAP_BANNER_VISIBLE, SessionTask::HideLapBanner { racer: racer.id });
                }
            }
            FinishOutcome::RaceFinished(split) => {
                match world.chassis_mut(racer.id) {
                    Some(body) => racer.controller.toggle_engine(body, false),
                    None => warn!(racer = %racer.name, "no physics body, engine not stopped"),
                }

                let total = racer.lap.total_time();
                if let Err(err) = self.results.record(&racer.name, racer.lap.lap_times(), total) {
                    warn!(racer = %racer.name, %err, "result not recorded");
                }

                info!(racer = %racer.name, total = %format_time(total), "race finished");

                if is_player {
                    hud.emit(HudEvent::CompletedLap {
                        racer: racer.id,
                        text: split.banner_text(),
                        tint: split.tint(),
                        visible: true,
                    });
                    self.timeline
                        .schedule(now + LAP_BANNER_VISIBLE, SessionTask::HideLapBanner { racer: racer.id });
                    hud.emit(HudEvent::LapHud { racer: racer.id, visible: false });
                    hud.emit(HudEvent::RaceFinished {
                        racer: racer.id,
                        total_time: format_time(total),
                        visible: true,
                    });
                    self.timeline
                        .schedule(now + LEADERBOARD_DELAY, SessionTask::RevealLeaderboard { racer: racer.id });
                }

                if self.is_complete() {
                    self.announce_final_standings(hud);
                }
            }
        }
    }

    /// Last racer home: log the standings and refresh every player's board.
    fn announce_final_standings(&self, hud: &mut dyn HudSink) {
        let board = self.leaderboard();
        for entry in &board {
            info!(position = entry.position, racer = %entry.name, time = %entry.display_time, "final standings");
        }

        for racer in self.racers.iter().filter(|r| r.is_player()) {
            hud.emit(HudEvent::Leaderboard {
                racer: racer.id,
                entries: board.clone(),
                laps: lap_rows(racer.lap.lap_times()),
            });
        }
    }
}

// ==============================================================================
// Tests
// ==============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ai::{AGGRESSIVE, CAUTIOUS};
    use crate::hud::BufferedHud;
    use crate::track::{GridLayout, TrackFile, TriggerVolume};
    use crate::vehicle::{AI_CAR, AI_HATCHBACK, WheelId};
    use crate::vehicle::testing::ScriptedBody;

    const DT: f32 = 1.0 / 60.0;

    #[derive(Default)]
    struct ScriptedWorld {
        bodies: HashMap<Uuid, ScriptedBody>,
        steps: usize,
        refuse_spawns: bool,
    }

    impl ScriptedWorld {
        fn place(&mut self, id: Uuid, p: Point3<f32>) {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.position = p;
            }
        }
    }

    impl VehicleWorld for ScriptedWorld {
        fn spawn_vehicle(&mut self, id: Uuid, position: Point3<f32>) {
            if !self.refuse_spawns {
                self.bodies.insert(id, ScriptedBody::at(position));
            }
        }

        fn despawn_vehicle(&mut self, id: Uuid) {
            self.bodies.remove(&id);
        }

        fn chassis(&self, id: Uuid) -> Option<&dyn ChassisBody> {
            self.bodies.get(&id).map(|b| b as &dyn ChassisBody)
        }

        fn chassis_mut(&mut self, id: Uuid) -> Option<&mut dyn ChassisBody> {
            self.bodies.get_mut(&id).map(|b| b as &mut dyn ChassisBody)
        }

        fn step(&mut self, _dt: f32) {
            self.steps += 1;
        }
    }

    fn session(laps: u32) -> RaceSession {
        let roster = Roster::new(vec!["red".into(), "blue".into()], Some(3));
        RaceSession::new(Track::default_oval(), roster, laps)
    }

    fn run_for(s: &mut RaceSession, world: &mut ScriptedWorld, hud: &mut BufferedHud, seconds: f32) {
        let ticks = (seconds / DT).round() as usize;
        for _ in 0..ticks {
            s.tick(world, DT, hud);
        }
    }

    fn checkpoint_centers(track: &Track) -> Vec<Point3<f32>> {
        track
            .volumes()
            .filter(|(kind, _)| matches!(kind, TriggerKind::Checkpoint(_)))
            .map(|(_, v)| Point3::new(v.center[0], 0.5, v.center[2]))
            .collect()
    }

    fn finish_center(track: &Track) -> Point3<f32> {
        let c = track.finish().center;
        Point3::new(c[0], 0.5, c[2])
    }

    fn countdown_texts(hud: &BufferedHud) -> Vec<String> {
        hud.events()
            .iter()
            .filter_map(|e| match e {
                HudEvent::Countdown { text, visible: true } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn spawn_assigns_unique_names_and_grid_slots() {
        let mut s = session(3);
        let mut world = ScriptedWorld::default();
        let player = s.spawn_player(&mut world).unwrap();
        let a = s.spawn_ai(&mut world, CAUTIOUS, AI_CAR).unwrap();
        let b = s.spawn_ai(&mut world, AGGRESSIVE, AI_HATCHBACK).unwrap();

        assert_eq!(s.racer(player).unwrap().name, "Player 1");
        assert_ne!(s.racer(a).unwrap().name, s.racer(b).unwrap().name);

        let slots: Vec<_> = s.racers().iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_ne!(world.bodies[&a].position, world.bodies[&b].position);

        for r in s.racers() {
            assert!(!r.controller.is_engine_enabled());
            assert_eq!(r.lap.phase(), RacePhase::Countdown);
        }
    }

    #[test]
    fn failed_spawn_leaves_the_grid_slot_free() {
        let mut s = session(1);
        let mut world = ScriptedWorld { refuse_spawns: true, ..Default::default() };

        assert!(matches!(s.spawn_player(&mut world), Err(RaceError::MissingBody(_))));
        assert!(s.racers().is_empty());
        assert!(world.bodies.is_empty());

        world.refuse_spawns = false;
        let player = s.spawn_player(&mut world).unwrap();
        assert_eq!(s.racer(player).unwrap().slot, 0);
        assert_eq!(world.bodies[&player].position, SpawnGrid::new(s.track().grid).peek().position);
    }

    #[test]
    fn countdown_runs_five_to_go_and_enables_engines() {
        let mut s = session(3);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();
        let player = s.spawn_player(&mut world).unwrap();
        s.spawn_ai(&mut world, CAUTIOUS, AI_CAR).unwrap();

        s.start(&mut hud);
        run_for(&mut s, &mut world, &mut hud, 4.5);
        assert_eq!(countdown_texts(&hud), vec!["5", "4", "3", "2", "1"]);
        assert!(s.racers().iter().all(|r| !r.controller.is_engine_enabled()));

        // held in place while counting down
        s.set_player_input(player, ControlCommand::new(1.0, 0.0, false));
        s.tick(&mut world, DT, &mut hud);
        assert_eq!(world.bodies[&player].wheel(WheelId::FL).motor_torque, 0.0);

        run_for(&mut s, &mut world, &mut hud, 1.0);
        assert_eq!(countdown_texts(&hud).last().map(String::as_str), Some("GO!"));
        assert!(s.racers().iter().all(|r| r.controller.is_engine_enabled()));
        assert!(s.racers().iter().all(|r| r.lap.phase() == RacePhase::Racing));
        assert_eq!(world.bodies[&player].wheel(WheelId::FL).motor_torque, PLAYER_CAR.drive_speed);

        run_for(&mut s, &mut world, &mut hud, 1.0);
        assert!(hud.events().iter().any(|e| matches!(e, HudEvent::Countdown { visible: false, .. })));
    }

    #[test]
    fn finish_without_checkpoints_is_ignored() {
        let mut s = session(3);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();
        let player = s.spawn_player(&mut world).unwrap();
        s.start(&mut hud);
        run_for(&mut s, &mut world, &mut hud, 6.0);

        let track = Track::default_oval();
        let cps = checkpoint_centers(&track);
        world.place(player, cps[0]);
        s.tick(&mut world, DT, &mut hud);
        world.place(player, finish_center(&track));
        s.tick(&mut world, DT, &mut hud);

        let lap = &s.racer(player).unwrap().lap;
        assert_eq!(lap.current_lap(), 1);
        assert!(lap.lap_times().is_empty());
        assert!(!hud.events().iter().any(|e| matches!(e, HudEvent::CompletedLap { .. })));
    }

    #[test]
    fn input_for_ai_or_unknown_racer_is_rejected() {
        let mut s = session(1);
        let mut world = ScriptedWorld::default();
        let ai = s.spawn_ai(&mut world, CAUTIOUS, AI_CAR).unwrap();
        let cmd = ControlCommand::new(1.0, 0.0, false);
        assert!(!s.set_player_input(ai, cmd));
        assert!(!s.set_player_input(Uuid::new_v4(), cmd));
    }

    #[test]
    fn braking_zone_reaches_ai_only() {
        let mut s = session(1);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();
        let ai = s.spawn_ai(&mut world, CAUTIOUS, AI_CAR).unwrap();

        let zone = s
            .track()
            .volumes()
            .find(|(k, _)| matches!(k, TriggerKind::BrakingZone(_)))
            .map(|(_, v)| Point3::new(v.center[0], 0.5, v.center[2]))
            .unwrap();

        world.place(ai, zone);
        s.tick(&mut world, DT, &mut hud);
        match &s.racer(ai).unwrap().driver {
            Driver::Ai(driver) => assert!(driver.in_braking_zone()),
            _ => unreachable!(),
        }

        world.place(ai, Point3::new(0.0, 0.5, -60.0));
        s.tick(&mut world, DT, &mut hud);
        match &s.racer(ai).unwrap().driver {
            Driver::Ai(driver) => assert!(!driver.in_braking_zone()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn overlapping_braking_zones_keep_the_ai_braking() {
        let track = Track::from_track_file(TrackFile {
            name: "Chicane".to_string(),
            checkpoints: vec![TriggerVolume::new([0.0, 0.0, -200.0], [5.0, 2.0, 2.0])],
            finish: TriggerVolume::new([0.0, 0.0, 0.0], [5.0, 2.0, 2.0]),
            braking_zones: vec![
                TriggerVolume::new([0.0, 0.0, -50.0], [5.0, 2.0, 10.0]),
                TriggerVolume::new([0.0, 0.0, -65.0], [5.0, 2.0, 10.0]),
            ],
            waypoints: vec![[0.0, 0.0, -100.0]],
            grid: GridLayout { origin: [0.0, 0.0, -10.0], column_gap: 4.0, row_gap: 6.0 },
        })
        .unwrap();
        let mut s = RaceSession::new(track, Roster::new(vec!["red".into()], Some(5)), 1);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();
        let ai = s.spawn_ai(&mut world, CAUTIOUS, AI_CAR).unwrap();

        let braking = |s: &RaceSession| match &s.racer(ai).unwrap().driver {
            Driver::Ai(driver) => driver.in_braking_zone(),
            _ => unreachable!(),
        };

        for (z, expected) in [(-45.0, true), (-58.0, true), (-70.0, true), (-90.0, false)] {
            world.place(ai, Point3::new(0.0, 0.0, z));
            s.tick(&mut world, DT, &mut hud);
            assert_eq!(braking(&s), expected, "at z = {z}");
        }
    }

    #[test]
    fn final_lap_banner_is_hidden_after_finishing() {
        let mut s = session(1);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();
        let player = s.spawn_player(&mut world).unwrap();
        s.start(&mut hud);
        run_for(&mut s, &mut world, &mut hud, 6.0);

        let track = Track::default_oval();
        for cp in checkpoint_centers(&track) {
            world.place(player, cp);
            s.tick(&mut world, DT, &mut hud);
        }
        world.place(player, finish_center(&track));
        s.tick(&mut world, DT, &mut hud);
        assert!(s.racer(player).unwrap().lap.is_finished());

        run_for(&mut s, &mut world, &mut hud, 10.0);
        let banners: Vec<bool> = hud
            .events()
            .iter()
            .filter_map(|e| match e {
                HudEvent::CompletedLap { racer, visible, .. } if *racer == player => Some(*visible),
                _ => None,
            })
            .collect();
        assert_eq!(banners, vec![true, false]);
    }

    #[test]
    fn full_race_one_player_two_ai() {
        let mut s = session(3);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();

        let ids = vec![
            s.spawn_player(&mut world).unwrap(),
            s.spawn_ai(&mut world, CAUTIOUS, AI_CAR).unwrap(),
            s.spawn_ai(&mut world, AGGRESSIVE, AI_HATCHBACK).unwrap(),
        ];
        s.start(&mut hud);
        run_for(&mut s, &mut world, &mut hud, 6.0);

        let track = Track::default_oval();
        let checkpoints = checkpoint_centers(&track);
        let finish = finish_center(&track);

        for _lap in 0..3 {
            for (k, id) in ids.iter().enumerate() {
                for cp in &checkpoints {
                    world.place(*id, *cp);
                    s.tick(&mut world, DT, &mut hud);
                }
                // stagger so every racer has a distinct total
                run_for(&mut s, &mut world, &mut hud, 0.5 * (k + 1) as f32);
                world.place(*id, finish);
                s.tick(&mut world, DT, &mut hud);
            }
        }

        assert!(s.is_complete());
        assert_eq!(s.results().len(), 3);
        for r in s.racers() {
            assert_eq!(r.lap.lap_times().len(), 3);
            assert!(!r.controller.is_engine_enabled());
            let result = s.results().get(&r.name).unwrap();
            assert_eq!(result.lap_times.len(), 3);
        }

        let board = s.leaderboard();
        assert_eq!(board.len(), 3);
        assert!(board.iter().all(|e| e.finished));
        assert!(board.windows(2).all(|w| w[0].total_time <= w[1].total_time));
        assert_eq!(board[0].name, "Player 1");

        // the player's banner, finish and leaderboard reveal
        let player = ids[0];
        run_for(&mut s, &mut world, &mut hud, LEADERBOARD_DELAY + 0.1);
        let events = hud.events();
        assert!(events.iter().any(|e| matches!(e, HudEvent::RaceFinished { racer, visible: true, .. } if *racer == player)));
        assert!(events.iter().any(|e| matches!(e, HudEvent::Leaderboard { racer, laps, .. } if *racer == player && laps.len() == 3)));
        assert!(events.iter().any(|e| matches!(e, HudEvent::LapCounter { text, .. } if text == "Laps: 3/3")));
    }

    #[test]
    fn finished_racer_ignores_further_crossings() {
        let mut s = session(1);
        let mut world = ScriptedWorld::default();
        let mut hud = BufferedHud::default();
        let player = s.spawn_player(&mut world).unwrap();
        s.start(&mut hud);
        run_for(&mut s, &mut world, &mut hud, 6.0);

        let track = Track::default_oval();
        for _ in 0..2 {
            for cp in checkpoint_centers(&track) {
                world.place(player, cp);
                s.tick(&mut world, DT, &mut hud);
            }
            world.place(player, finish_center(&track));
            s.tick(&mut world, DT, &mut hud);
        }

        assert_eq!(s.results().len(), 1);
        assert_eq!(s.racer(player).unwrap().lap.lap_times().len(), 1);
    }
}
