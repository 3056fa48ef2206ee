// ==============================================================================
// vehicle.rs — DRIVETRAIN CONTROL (INPUTS -> WHEEL ACTUATOR COMMANDS)
// ------------------------------------------------------------------------------
// Converts normalized driver intent (throttle, steer, handbrake) into per-wheel
// motor torque, steer angle, brake torque and rear lateral stiffness, plus one
// chassis force while drifting. Reads only position/forward/velocity back from
// the body. Integration and collision belong to the physics world.
// ==============================================================================

use nalgebra::{Point3, Vector3};
use serde::Serialize;
use std::fmt;

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelId { FL, FR, RL, RR }

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn index(&self) -> usize {
        match self {
            WheelId::FL => 0,
            WheelId::FR => 1,
            WheelId::RL => 2,
            WheelId::RR => 3,
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        };
        f.write_str(s)
    }
}

/// Command block of one wheel, written by the controller, read by physics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelActuator {
    pub motor_torque: f32,      // N*m, signed
    pub steer_angle: f32,       // degrees, positive = right
    pub brake_torque: f32,      // N*m, never negative
    pub lateral_stiffness: f32, // sideways grip multiplier (1.0 = nominal)
}

impl Default for WheelActuator {
    fn default() -> Self {
        Self {
            motor_torque: 0.0,
            steer_angle: 0.0,
            brake_torque: 0.0,
            lateral_stiffness: 1.0,
        }
    }
}

/// The chassis as seen by the control loop. Implemented by the rapier rig and
/// by test doubles.
pub trait ChassisBody {
    fn position(&self) -> Point3<f32>;
    fn forward(&self) -> Vector3<f32>;
    fn linear_velocity(&self) -> Vector3<f32>;
    fn wheel(&self, id: WheelId) -> &WheelActuator;
    fn wheel_mut(&mut self, id: WheelId) -> &mut WheelActuator;
    /// Continuous force on the chassis for the next physics step (N)
    fn add_force(&mut self, force: Vector3<f32>);
}

/// Normalized driver intent for one tick, produced by player or AI control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ControlCommand {
    pub throttle: f32,  // -1.0 (full reverse) .. 1.0 (full forward)
    pub steer: f32,     // -1.0 (full left) .. 1.0 (full right)
    pub handbrake: bool,
}

impl ControlCommand {
    pub fn new(throttle: f32, steer: f32, handbrake: bool) -> Self {
        Self {
            throttle: throttle.clamp(-1.0, 1.0),
            steer: steer.clamp(-1.0, 1.0),
            handbrake,
        }
    }
}

// --------------------------------------------------
// Tuning tables
// --------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Drivetrain {
    AllWheel,
    FrontWheel,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BrakePolicy {
    /// Base torque whenever braking applies
    Flat,
    /// Base torque, multiplied by `factor` above `threshold` m/s
    SpeedScaled { threshold: f32, factor: f32 },
    /// 1.5x when reversing direction, 0.5x on neutral input
    ReversalScaled,
}

#[derive(Clone, Copy, Debug)]
pub struct VehicleTuning {
    pub drive_speed: f32,       // motor torque at full throttle (N*m)
    pub steer_speed: f32,       // front steer angle at full lock (degrees)
    pub brake_torque: f32,      // base brake torque (N*m)
    pub drift_factor: f32,      // rear lateral stiffness multiplier under handbrake
    pub forward_boost: f32,     // chassis force at full throttle while drifting (N)
    pub handbrake_ratio: f32,   // rear brake torque share under handbrake
    pub parking_brake: f32,     // brake torque holding the car while the engine is off
    pub drivetrain: Drivetrain,
    pub brake_policy: BrakePolicy,
}

pub const PLAYER_CAR: VehicleTuning = VehicleTuning {
    drive_speed: 450.0,
    steer_speed: 30.0,
    brake_torque: 900.0,
    drift_factor: 0.5,
    forward_boost: 400.0,
    handbrake_ratio: 0.1,
    parking_brake: 5000.0,
    drivetrain: Drivetrain::AllWheel,
    brake_policy: BrakePolicy::Flat,
};

pub const AI_CAR: VehicleTuning = VehicleTuning {
    drive_speed: 420.0,
    steer_speed: 30.0,
    brake_torque: 900.0,
    drift_factor: 0.5,
    forward_boost: 400.0,
    handbrake_ratio: 0.5,
    parking_brake: 5000.0,
    drivetrain: Drivetrain::AllWheel,
    brake_policy: BrakePolicy::SpeedScaled { threshold: 20.0, factor: 1.5 },
};

/// Lighter front-driven AI car; sharper on direction changes, softer when coasting
pub const AI_HATCHBACK: VehicleTuning = VehicleTuning {
    drive_speed: 380.0,
    steer_speed: 34.0,
    brake_torque: 800.0,
    drift_factor: 0.6,
    forward_boost: 300.0,
    handbrake_ratio: 0.5,
    parking_brake: 5000.0,
    drivetrain: Drivetrain::FrontWheel,
    brake_policy: BrakePolicy::ReversalScaled,
};

/// Brake torque for a commanded throttle against the current forward speed.
///
/// Braking applies when the throttle is neutral or its sign disagrees with the
/// sign of the forward speed; a throttle that agrees with the motion never
/// brakes. Zero speed counts as positive.
pub fn brake_torque_for(tuning: &VehicleTuning, throttle: f32, forward_speed: f32) -> f32 {
    let neutral = throttle == 0.0;
    let reversing = !neutral && throttle.signum() != forward_speed.signum();

    if !neutral && !reversing {
        return 0.0;
    }

    let base = tuning.brake_torque.max(0.0);
    match tuning.brake_policy {
        BrakePolicy::Flat => base,
        BrakePolicy::SpeedScaled { threshold, factor } => {
            if forward_speed.abs() > threshold { base * factor } else { base }
        }
        BrakePolicy::ReversalScaled => {
            if neutral { base * 0.5 } else { base * 1.5 }
        }
    }
}

// ==============================================================================
// Controller
// ==============================================================================

#[derive(Debug)]
pub struct VehicleController {
    tuning: VehicleTuning,
    throttle: f32,
    steer: f32,
    handbrake: bool,
    engine_enabled: bool,
    rear_friction: [f32; 2], // RL, RR stiffness cached at construction
}

impl VehicleController {
    /// Build a controller for `body`, caching the rear lateral stiffness once.
    pub fn new(tuning: VehicleTuning, body: &dyn ChassisBody) -> Self {
        Self {
            tuning,
            throttle: 0.0,
            steer: 0.0,
            handbrake: false,
            engine_enabled: true,
            rear_friction: [
                body.wheel(WheelId::RL).lateral_stiffness,
                body.wheel(WheelId::RR).lateral_stiffness,
            ],
        }
    }

    pub fn is_engine_enabled(&self) -> bool {
        self.engine_enabled
    }

    pub fn set_inputs(&mut self, throttle: f32, steer: f32, handbrake: bool) {
        self.throttle = throttle.clamp(-1.0, 1.0);
        self.steer = steer.clamp(-1.0, 1.0);
        self.handbrake = handbrake;
    }

    pub fn apply_throttle(&mut self, body: &mut dyn ChassisBody, throttle: f32) {
        let motor = if self.engine_enabled {
            throttle.clamp(-1.0, 1.0) * self.tuning.drive_speed
        } else {
            0.0
        };

        for id in WheelId::ALL {
            let driven = match self.tuning.drivetrain {
                Drivetrain::AllWheel => true,
                Drivetrain::FrontWheel => id.is_front(),
            };
            body.wheel_mut(id).motor_torque = if driven { motor } else { 0.0 };
        }
    }

    pub fn apply_steer(&mut self, body: &mut dyn ChassisBody, steer: f32) {
        let angle = steer.clamp(-1.0, 1.0) * self.tuning.steer_speed;
        body.wheel_mut(WheelId::FL).steer_angle = angle;
        body.wheel_mut(WheelId::FR).steer_angle = angle;
        body.wheel_mut(WheelId::RL).steer_angle = 0.0;
        body.wheel_mut(WheelId::RR).steer_angle = 0.0;
    }

    /// Brake decision for `throttle` against the body's forward speed.
    pub fn apply_brake(&mut self, body: &mut dyn ChassisBody, throttle: f32) {
        let forward_speed = body.linear_velocity().dot(&body.forward());
        let torque = brake_torque_for(&self.tuning, throttle, forward_speed);
        for id in WheelId::ALL {
            body.wheel_mut(id).brake_torque = torque;
        }
    }

    pub fn apply_handbrake(&mut self, body: &mut dyn ChassisBody, engaged: bool) {
        self.handbrake = engaged;

        if engaged {
            let rear_brake = self.tuning.brake_torque.max(0.0) * self.tuning.handbrake_ratio;
            for (slot, id) in [WheelId::RL, WheelId::RR].into_iter().enumerate() {
                let wheel = body.wheel_mut(id);
                wheel.brake_torque = rear_brake;
                wheel.motor_torque = 0.0;
                // always derived from the cached value, never from the current one
                wheel.lateral_stiffness = self.rear_friction[slot] * self.tuning.drift_factor;
            }

            let boost = body.forward() * (self.tuning.forward_boost * self.throttle);
            body.add_force(boost);
        } else {
            body.wheel_mut(WheelId::RL).lateral_stiffness = self.rear_friction[0];
            body.wheel_mut(WheelId::RR).lateral_stiffness = self.rear_friction[1];
        }
    }

    /// Enable or disable the drivetrain. Disabled: no motor torque, every wheel
    /// held by the parking brake, `fixed_update` does nothing.
    pub fn toggle_engine(&mut self, body: &mut dyn ChassisBody, enabled: bool) {
        self.engine_enabled = enabled;

        let (motor, brake) = if enabled {
            (self.throttle * self.tuning.drive_speed, 0.0)
        } else {
            (0.0, self.tuning.parking_brake.max(0.0))
        };

        for id in WheelId::ALL {
            let wheel = body.wheel_mut(id);
            wheel.motor_torque = motor;
            wheel.brake_torque = brake;
        }

        if enabled {
            // re-run the drivetrain rule so a front-wheel car keeps idle rear wheels
            self.apply_throttle(body, self.throttle);
        }
    }

    /// One physics tick with the currently stored inputs.
    pub fn fixed_update(&mut self, body: &mut dyn ChassisBody) {
        if !self.engine_enabled {
            return;
        }

        let (throttle, steer, handbrake) = (self.throttle, self.steer, self.handbrake);
        self.apply_throttle(body, throttle);
        self.apply_steer(body, steer);
        self.apply_brake(body, throttle);
        self.apply_handbrake(body, handbrake);
    }
}

// ==============================================================================
// Test double
// ==============================================================================

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Body with externally scripted motion; records everything written to it.
    #[derive(Debug, Clone)]
    pub struct ScriptedBody {
        pub position: Point3<f32>,
        pub forward: Vector3<f32>,
        pub velocity: Vector3<f32>,
        pub wheels: [WheelActuator; 4],
        pub forces: Vec<Vector3<f32>>,
    }

    impl ScriptedBody {
        pub fn at(position: Point3<f32>) -> Self {
            Self {
                position,
                forward: Vector3::new(0.0, 0.0, -1.0),
                velocity: Vector3::zeros(),
                wheels: [WheelActuator::default(); 4],
                forces: Vec::new(),
            }
        }
    }

    impl ChassisBody for ScriptedBody {
        fn position(&self) -> Point3<f32> {
            self.position
        }

        fn forward(&self) -> Vector3<f32> {
            self.forward
        }

        fn linear_velocity(&self) -> Vector3<f32> {
            self.velocity
        }

        fn wheel(&self, id: WheelId) -> &WheelActuator {
            &self.wheels[id.index()]
        }

        fn wheel_mut(&mut self, id: WheelId) -> &mut WheelActuator {
            &mut self.wheels[id.index()]
        }

        fn add_force(&mut self, force: Vector3<f32>) {
            self.forces.push(force);
        }
    }
}
