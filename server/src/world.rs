//! Asteroid-field generation and the per-tick physics pass.
//!
//! Generation is deterministic per seed so clients handed the seed at
//! connect time can reproduce cosmetic randomness locally, and so tests
//! get reproducible fixtures.

use glam::{Quat, Vec3};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{resolve_pair, resolve_sphere_sphere, RigidBody};
use std::f32::consts::{PI, TAU};

use crate::session::SessionTable;

/// Inner and outer radius of the spherical shell asteroids spawn in.
const FIELD_MIN_RADIUS: f32 = 50.0;
const FIELD_MAX_RADIUS: f32 = 1000.0;

const ASTEROID_MIN_RADIUS: f32 = 0.05;
const ASTEROID_MAX_RADIUS: f32 = 40.0;

/// Mass per unit volume; keeps the big asteroids ponderous without making
/// impulses against cameras explosive.
const ASTEROID_DENSITY: f32 = 1.0 / 3000.0;

const ASTEROID_MAX_SPEED: f32 = 20.0;
const ASTEROID_MAX_SPIN: f32 = 1.0;

/// Impact speeds above this get reported; mirrors the old audio trigger
/// threshold.
const IMPACT_REPORT_THRESHOLD: f32 = 1.0;

fn random_unit(rng: &mut impl Rng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen::<f32>() * 2.0 - 1.0,
            rng.gen::<f32>() * 2.0 - 1.0,
            rng.gen::<f32>() * 2.0 - 1.0,
        );
        let length_sq = v.length_squared();
        if length_sq > 1e-4 && length_sq <= 1.0 {
            return v / length_sq.sqrt();
        }
    }
}

/// The shared physical world: the asteroid body set plus its seed.
pub struct World {
    seed: u32,
    target_count: usize,
    bodies: Vec<RigidBody>,
}

impl World {
    /// Generates `count` asteroids with non-overlapping placement inside
    /// the spawn shell. The retry budget is quadratic in `count`; if it
    /// runs out (densely packed small fields) the world simply ends up
    /// with fewer bodies.
    pub fn generate(seed: u32, count: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        let mut bodies: Vec<RigidBody> = Vec::with_capacity(count);
        let budget = count.saturating_mul(count).max(1024);
        let mut tries = 0usize;

        while bodies.len() < count && tries < budget {
            tries += 1;

            let direction = random_unit(&mut rng);
            let distance = rng.gen_range(FIELD_MIN_RADIUS..FIELD_MAX_RADIUS);
            let radius = rng.gen_range(ASTEROID_MIN_RADIUS..ASTEROID_MAX_RADIUS);
            let position = direction * distance;

            let overlapping = bodies.iter().any(|other| {
                let clearance = radius + other.shape.bounding_radius();
                position.distance_squared(other.position) < clearance * clearance
            });
            if overlapping {
                continue;
            }

            let mass = ASTEROID_DENSITY * (4.0 / 3.0) * PI * radius.powi(3);
            let mut body = RigidBody::sphere(position, radius, mass);
            body.velocity = random_unit(&mut rng) * (rng.gen::<f32>() * ASTEROID_MAX_SPEED);
            body.angular_velocity = random_unit(&mut rng) * (rng.gen::<f32>() * ASTEROID_MAX_SPIN);
            body.orientation = Quat::from_axis_angle(random_unit(&mut rng), rng.gen_range(0.0..TAU));
            bodies.push(body);
        }

        if bodies.len() < count {
            warn!(
                "placed {} of {} asteroids before exhausting the retry budget",
                bodies.len(),
                count
            );
        }

        World {
            seed,
            target_count: count,
            bodies,
        }
    }

    /// Replaces the body set with a freshly generated field.
    pub fn regenerate(&mut self, seed: u32) {
        *self = World::generate(seed, self.target_count);
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// One physics tick: integrate every world body and every connected
    /// camera, then resolve all pairs (asteroid/asteroid, camera/asteroid,
    /// camera/camera). Narrow phase only; at this scale the O(n^2) pass is
    /// cheaper than maintaining a broad phase.
    pub fn step(&mut self, dt: f32, sessions: &mut SessionTable) {
        for body in &mut self.bodies {
            body.integrate(dt);
        }
        for session in sessions.iter_connected_mut() {
            session.camera.integrate(dt);
        }

        let mut hardest = 0.0f32;

        for i in 0..self.bodies.len() {
            let (head, tail) = self.bodies.split_at_mut(i + 1);
            let a = &mut head[i];
            for b in tail.iter_mut() {
                hardest = hardest.max(resolve_pair(a, b, false));
            }
        }

        for session in sessions.iter_connected_mut() {
            for body in &mut self.bodies {
                hardest = hardest.max(resolve_pair(&mut session.camera, body, false));
            }
        }

        let slots = sessions.slots_mut();
        for i in 0..slots.len() {
            let (head, tail) = slots.split_at_mut(i + 1);
            if let Some(a) = head[i].as_mut() {
                for b in tail.iter_mut().flatten() {
                    hardest = hardest.max(resolve_sphere_sphere(&mut a.camera, &mut b.camera));
                }
            }
        }

        if hardest > IMPACT_REPORT_THRESHOLD {
            debug!("hardest impact this tick: {:.1}", hardest);
        }
    }
}
