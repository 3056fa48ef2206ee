// ==============================================================================
// physics.rs — RAPIER WORLD + RAYCAST WHEEL RIGS
// ------------------------------------------------------------------------------
// Flat ground, one dynamic chassis per racer, four raycast wheels per chassis.
// The session writes WheelActuator commands through ChassisBody; each step
// turns them into impulses:
//   - suspension: spring + damper along the ground normal
//   - drive:      motor torque / radius along the (steered) wheel forward
//   - brake:      brake torque / radius against the rolling direction, never
//                 strong enough to reverse it
//   - lateral:    cancels sideways slip, scaled by lateral stiffness and
//                 limited by mu * N
// ==============================================================================

use std::collections::HashMap;

use rapier3d::na::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::VehicleWorld;
use crate::vehicle::{ChassisBody, WheelActuator, WheelId};

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

const WORLD_LIMIT: f32 = 1_000.0;   // beyond this a body counts as exploded
const SPAWN_HEIGHT: f32 = 1.0;      // drop height above the grid slot

pub struct ChassisConfig {
    pub mass: f32,                      // kg
    pub half_extents: [f32; 3],         // [hx, hy, hz] meters
    pub com_offset: [f32; 3],           // collider offset from body origin
    pub linear_damping: f32,
    pub angular_damping: f32,

    // --- wheels ---
    pub wheel_radius: f32,              // m
    pub rest_length: f32,               // suspension neutral length (m)
    pub sag: f32,                       // static compression under own weight (m)
    pub damping_ratio: f32,             // zeta, 0.7..1.0
    pub max_normal_force: f32,          // N
    pub mu: f32,                        // tyre friction coefficient
    pub wheel_x: f32,                   // half track width (m)
    pub wheel_z: f32,                   // half wheelbase (m)
    pub wheel_y: f32,                   // mount height below body origin (m)
}

pub const RACE_CAR: ChassisConfig = ChassisConfig {
    mass: 1200.0,
    half_extents: [0.9, 0.35, 2.0],
    com_offset: [0.0, -0.1, 0.0],
    linear_damping: 0.1,
    angular_damping: 0.8,

    wheel_radius: 0.35,
    rest_length: 0.5,
    sag: 0.05,
    damping_ratio: 0.9,
    max_normal_force: 25_000.0,
    mu: 1.1,
    wheel_x: 0.8,
    wheel_z: 1.3,
    wheel_y: 0.3,
};

// --------------------------------------------------
// Per-wheel geometry (chassis local space)
// --------------------------------------------------
#[derive(Clone, Copy, Debug)]
pub struct WheelMount {
    pub id: WheelId,
    pub offset: Point3<f32>,
    pub rest_length: f32,
    pub radius: f32,
    pub stiffness: f32,     // N/m
    pub damping: f32,       // N*s/m
}

/// k from static sag, c from the damping ratio
fn suspension_from_sag(mass: f32, wheels: usize, sag: f32, zeta: f32) -> (f32, f32) {
    let m = mass / wheels as f32;
    let k = m * 9.81 / sag.max(1e-3);
    let c = 2.0 * zeta * (k * m).sqrt();
    (k, c)
}

fn wheel_mounts(config: &ChassisConfig) -> [WheelMount; 4] {
    let (k, c) = suspension_from_sag(config.mass, 4, config.sag, config.damping_ratio);

    // forward is -Z, right is +X
    WheelId::ALL.map(|id| {
        let x = if matches!(id, WheelId::FL | WheelId::RL) { -config.wheel_x } else { config.wheel_x };
        let z = if id.is_front() { -config.wheel_z } else { config.wheel_z };
        WheelMount {
            id,
            offset: Point3::new(x, -config.wheel_y, z),
            rest_length: config.rest_length,
            radius: config.wheel_radius,
            stiffness: k,
            damping: c,
        }
    })
}

// ==============================================================================
// Rig: the ChassisBody the session drives
// ==============================================================================

pub struct VehicleRig {
    pub body: RigidBodyHandle,
    spawn: Point3<f32>,

    // refreshed after every step
    position: Point3<f32>,
    forward: Vector3<f32>,
    velocity: Vector3<f32>,

    wheels: [WheelActuator; 4],
    mounts: [WheelMount; 4],
    pending_force: Vector3<f32>,
}

impl VehicleRig {
    fn refresh(&mut self, body: &RigidBody) {
        let iso = body.position();
        self.position = Point3::from(iso.translation.vector);
        self.forward = iso.rotation * Vector3::new(0.0, 0.0, -1.0);
        self.velocity = *body.linvel();
    }
}

impl ChassisBody for VehicleRig {
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
        self.pending_force += force;
    }
}

// ==============================================================================
// World
// ==============================================================================

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    rigs: HashMap<Uuid, VehicleRig>,     // racer id -> rig
    config: ChassisConfig,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(RACE_CAR)
    }
}

impl PhysicsWorld {
    pub fn new(config: ChassisConfig) -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Thin static ground box, top surface at y = 0
        let ground = bodies.insert(
            RigidBodyBuilder::fixed()
                .translation(vector![0.0, -0.1, 0.0])
                .build(),
        );
        let ground_collider = ColliderBuilder::cuboid(500.0, 0.1, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground, &mut bodies);

        debug!(bodies = bodies.len(), colliders = colliders.len(), "ground inserted");

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            rigs: HashMap::new(),
            config,
        }
    }

    #[cfg(test)]
    pub fn rig(&self, id: Uuid) -> Option<&VehicleRig> {
        self.rigs.get(&id)
    }

    fn insert_chassis(&mut self, position: Point3<f32>) -> RigidBodyHandle {
        let c = &self.config;
        let [hx, hy, hz] = c.half_extents;
        let [cx, cy, cz] = c.com_offset;
        let density = c.mass / (8.0 * hx * hy * hz); // rho = m / V

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![position.x, position.y, position.z])
            .linear_damping(c.linear_damping)
            .angular_damping(c.angular_damping)
            .ccd_enabled(true)
            .build();

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![cx, cy, cz])
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .active_events(ActiveEvents::empty())
            .density(density)
            .friction(0.0) // grip comes from the wheels only
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    // --------------------------------------------------
    // Wheels -> impulses
    // --------------------------------------------------
    fn apply_wheels(&mut self, dt: Real) {
        self.query_pipeline.update(&self.colliders);

        let ground_n: Vector<Real> = vector![0.0, 1.0, 0.0];
        let dir: Vector<Real> = vector![0.0, -1.0, 0.0];
        let mu = self.config.mu;
        let max_normal = self.config.max_normal_force;

        for rig in self.rigs.values_mut() {
            let Some(body) = self.bodies.get(rig.body) else { continue };

            let pos = *body.position();
            let rot = pos.rotation;
            let mass = body.mass();
            let share = mass / rig.mounts.len() as Real; // mass carried by each wheel
            let filter = QueryFilter::default().exclude_rigid_body(rig.body);

            let mut impulses: Vec<(Vector<Real>, Point<Real>)> = Vec::new();

            for mount in &rig.mounts {
                let cmd = rig.wheels[mount.id.index()];
                let origin = pos * mount.offset;
                let max_dist = mount.rest_length + mount.radius;
                let ray = Ray::new(origin, dir);

                let Some((_, toi)) = self.query_pipeline.cast_ray(
                    &self.bodies,
                    &self.colliders,
                    &ray,
                    max_dist,
                    true,
                    filter,
                ) else {
                    continue; // airborne
                };

                let hit_point = origin + dir * toi;
                let compression = (max_dist - toi).clamp(0.0, mount.rest_length);
                if compression <= 0.0 {
                    continue;
                }

                // --- suspension ---
                let point_vel = body.velocity_at_point(&hit_point);
                let spring = mount.stiffness * compression;
                let damper = (-mount.damping * point_vel.dot(&ground_n)).clamp(-spring * 0.6, spring * 0.6);
                let normal_force = (spring + damper).clamp(0.0, max_normal);
                impulses.push((ground_n * (normal_force * dt), hit_point));

                // --- wheel basis (front wheels rotated by steer, positive = right) ---
                let steer = if mount.id.is_front() { cmd.steer_angle.to_radians() } else { 0.0 };
                let steer_rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), -steer);
                let forward = steer_rot * (rot * vector![0.0, 0.0, -1.0]);
                let wheel_forward = {
                    let v = forward - ground_n * forward.dot(&ground_n);
                    v.try_normalize(1e-6).unwrap_or_else(|| vector![0.0, 0.0, -1.0])
                };
                let wheel_side = wheel_forward.cross(&ground_n);

                let v_long = point_vel.dot(&wheel_forward);
                let v_lat = point_vel.dot(&wheel_side);
                let grip = mu * normal_force * dt; // impulse capacity this step
                let apply_point = hit_point + ground_n * mount.radius;

                // --- drive ---
                let drive = (cmd.motor_torque / mount.radius * dt).clamp(-grip, grip);

                // --- brake: stop the rolling, never reverse it ---
                let brake_cap = v_long.abs() * share;
                let brake = (cmd.brake_torque.max(0.0) / mount.radius * dt).min(brake_cap);
                let brake = -v_long.signum() * brake;

                impulses.push((wheel_forward * (drive + brake), apply_point));

                // --- lateral grip ---
                let lat_cap = grip * cmd.lateral_stiffness;
                let lateral = (-v_lat * share * cmd.lateral_stiffness).clamp(-lat_cap, lat_cap);
                impulses.push((wheel_side * lateral, apply_point));
            }

            let chassis_impulse = rig.pending_force * dt;
            rig.pending_force = Vector3::zeros();

            let Some(body) = self.bodies.get_mut(rig.body) else { continue };
            for (impulse, point) in impulses {
                body.apply_impulse_at_point(impulse, point, true);
            }
            if chassis_impulse.norm_squared() > 0.0 {
                body.apply_impulse(chassis_impulse, true);
            }
        }
    }

    /// Kill residual spin when nearly stopped so parked cars settle
    fn apply_velocity_damping(&mut self, dt: Real) {
        for rig in self.rigs.values() {
            if let Some(body) = self.bodies.get_mut(rig.body) {
                if body.linvel().magnitude() < 1.0 {
                    let factor = (-6.0 * dt).exp();
                    let angvel = *body.angvel();
                    body.set_angvel(angvel * factor, true);
                }
            }
        }
    }

    fn reset_exploded(&mut self) {
        for (id, rig) in self.rigs.iter_mut() {
            let Some(body) = self.bodies.get_mut(rig.body) else { continue };
            let pos = *body.translation();

            let bad = !pos.x.is_finite()
                || !pos.y.is_finite()
                || !pos.z.is_finite()
                || pos.x.abs() > WORLD_LIMIT
                || pos.y.abs() > WORLD_LIMIT
                || pos.z.abs() > WORLD_LIMIT;

            if bad {
                let spawn = rig.spawn;
                body.set_translation(vector![spawn.x, spawn.y, spawn.z], true);
                body.set_rotation(UnitQuaternion::identity(), true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                warn!(racer = %id, "reset exploding body back to spawn");
            }
        }
    }
}

impl VehicleWorld for PhysicsWorld {
    fn spawn_vehicle(&mut self, id: Uuid, position: Point3<f32>) {
        let spawn = Point3::new(position.x, position.y + SPAWN_HEIGHT, position.z);
        let handle = self.insert_chassis(spawn);

        self.rigs.insert(
            id,
            VehicleRig {
                body: handle,
                spawn,
                position: spawn,
                forward: Vector3::new(0.0, 0.0, -1.0),
                velocity: Vector3::zeros(),
                wheels: [WheelActuator::default(); 4],
                mounts: wheel_mounts(&self.config),
                pending_force: Vector3::zeros(),
            },
        );

        debug!(racer = %id, body = ?handle, "vehicle spawned");
    }

    fn despawn_vehicle(&mut self, id: Uuid) {
        let Some(rig) = self.rigs.remove(&id) else { return };
        self.bodies.remove(
            rig.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        debug!(racer = %id, body = ?rig.body, "vehicle despawned");
    }

    fn chassis(&self, id: Uuid) -> Option<&dyn ChassisBody> {
        self.rigs.get(&id).map(|r| r as &dyn ChassisBody)
    }

    fn chassis_mut(&mut self, id: Uuid) -> Option<&mut dyn ChassisBody> {
        self.rigs.get_mut(&id).map(|r| r as &mut dyn ChassisBody)
    }

    fn step(&mut self, dt: Real) {
        let hooks = ();
        let events = ();

        self.apply_wheels(dt);
        self.apply_velocity_damping(dt);

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );

        self.reset_exploded();

        for rig in self.rigs.values_mut() {
            if let Some(body) = self.bodies.get(rig.body) {
                rig.refresh(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn settle(world: &mut PhysicsWorld, seconds: f32) {
        for _ in 0..(seconds / DT) as usize {
            world.step(DT);
        }
    }

    #[test]
    fn stiffness_from_sag_carries_static_load() {
        let (k, c) = suspension_from_sag(1200.0, 4, 0.05, 0.9);
        assert!((k * 0.05 - 300.0 * 9.81).abs() < 1.0);
        assert!(c > 0.0);
    }

    #[test]
    fn mounts_put_front_wheels_ahead_along_minus_z() {
        let mounts = wheel_mounts(&RACE_CAR);
        assert!(mounts[WheelId::FL.index()].offset.z < 0.0);
        assert!(mounts[WheelId::RR.index()].offset.z > 0.0);
        assert!(mounts[WheelId::FL.index()].offset.x < 0.0);
        assert!(mounts[WheelId::FR.index()].offset.x > 0.0);
    }

    #[test]
    fn parked_car_settles_on_its_wheels() {
        let mut world = PhysicsWorld::default();
        let id = Uuid::new_v4();
        world.spawn_vehicle(id, Point3::new(0.0, 0.0, -30.0));
        for wheel in WheelId::ALL {
            world.chassis_mut(id).unwrap().wheel_mut(wheel).brake_torque = 5000.0;
        }

        settle(&mut world, 3.0);

        let body = world.chassis(id).unwrap();
        let p = body.position();
        assert!(p.y > 0.3 && p.y < 2.0, "chassis height {}", p.y);
        assert!(p.x.abs() < 0.5 && (p.z + 30.0).abs() < 0.5);
        assert!(body.linear_velocity().norm() < 0.5);
    }

    #[test]
    fn motor_torque_drives_forward() {
        let mut world = PhysicsWorld::default();
        let id = Uuid::new_v4();
        world.spawn_vehicle(id, Point3::origin());
        settle(&mut world, 1.0);
        let start = world.chassis(id).unwrap().position();

        for _ in 0..120 {
            let body = world.chassis_mut(id).unwrap();
            for wheel in WheelId::ALL {
                body.wheel_mut(wheel).motor_torque = 450.0;
            }
            world.step(DT);
        }

        let end = world.chassis(id).unwrap().position();
        assert!(start.z - end.z > 1.0, "moved {}", start.z - end.z);
    }

    #[test]
    fn exploded_body_returns_to_spawn() {
        let mut world = PhysicsWorld::default();
        let id = Uuid::new_v4();
        world.spawn_vehicle(id, Point3::new(10.0, 0.0, 0.0));

        let handle = world.rig(id).unwrap().body;
        world.bodies[handle].set_translation(vector![5_000.0, 1.0, 0.0], true);
        world.step(DT);

        let p = world.chassis(id).unwrap().position();
        assert!((p.x - 10.0).abs() < 0.5);
    }

    #[test]
    fn despawn_removes_body_and_colliders() {
        let mut world = PhysicsWorld::default();
        let bodies = world.bodies.len();
        let colliders = world.colliders.len();
        let id = Uuid::new_v4();

        world.spawn_vehicle(id, Point3::origin());
        assert_eq!(world.bodies.len(), bodies + 1);

        world.despawn_vehicle(id);
        assert!(world.chassis(id).is_none());
        assert_eq!(world.bodies.len(), bodies);
        assert_eq!(world.colliders.len(), colliders);
        world.step(DT);
    }
}
