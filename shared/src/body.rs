//! Rigid-body state and the fixed-timestep integrator.
//!
//! A body is either a sphere or an axis-aligned box, chosen at creation
//! time; collision dispatch keys off the shape tag. Inertia is a scalar
//! (isotropic) approximation, which keeps the angular response cheap and
//! is plenty for tumbling asteroids.

use glam::{Quat, Vec3};

use crate::{MAX_TIMESTEP, MAX_VELOCITY, SPIN_DAMPING, WORLD_RADIUS};

/// Collision shape, fixed for the lifetime of the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    Cuboid { half_extent: Vec3 },
}

impl Shape {
    /// Radius of the smallest origin-centered sphere enclosing the shape.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Shape::Sphere { radius } => radius,
            Shape::Cuboid { half_extent } => half_extent.length(),
        }
    }
}

/// One simulated body: an asteroid or a connected client's camera.
#[derive(Debug, Clone, Copy)]
pub struct RigidBody {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Accumulated external force, consumed and zeroed by [`integrate`](Self::integrate).
    pub force: Vec3,
    pub mass: f32,
    /// `1/mass`, or 0 for an immovable body.
    pub inv_mass: f32,
    pub orientation: Quat,
    pub angular_velocity: Vec3,
    pub inertia: f32,
    pub inv_inertia: f32,
    pub shape: Shape,
}

fn invert(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        1.0 / value
    } else {
        0.0
    }
}

impl RigidBody {
    /// Creates a sphere body at rest. A non-positive `mass` makes it immovable.
    pub fn sphere(position: Vec3, radius: f32, mass: f32) -> Self {
        // Solid sphere: I = 2/5 m r^2
        let inertia = 0.4 * mass * radius * radius;
        Self::with_shape(position, Shape::Sphere { radius }, mass, inertia)
    }

    /// Creates an axis-aligned box body at rest.
    pub fn cuboid(position: Vec3, half_extent: Vec3, mass: f32) -> Self {
        // Isotropic approximation of the box inertia tensor
        let inertia = mass * half_extent.length_squared() / 3.0;
        Self::with_shape(position, Shape::Cuboid { half_extent }, mass, inertia)
    }

    fn with_shape(position: Vec3, shape: Shape, mass: f32, inertia: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            mass,
            inv_mass: invert(mass),
            orientation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
            inertia,
            inv_inertia: invert(inertia),
            shape,
        }
    }

    /// Accumulates an external force for the next integration step.
    pub fn apply_force(&mut self, force: Vec3) {
        self.force += force;
    }

    /// Advances the body one timestep.
    ///
    /// Semi-implicit Euler for the linear state (velocity first, then
    /// position), a two-stage midpoint step for the orientation quaternion,
    /// then boundary constraints. The force accumulator is consumed; forces
    /// that should persist must be re-applied every tick.
    pub fn integrate(&mut self, dt: f32) {
        let dt = dt.min(MAX_TIMESTEP);

        self.velocity += self.force * (self.inv_mass * dt);
        self.position += self.velocity * dt;
        self.force = Vec3::ZERO;

        // dq/dt = 0.5 * q * (0, w), evaluated at the half step, then
        // renormalized to keep drift out of the orientation.
        let spin = Quat::from_xyzw(
            self.angular_velocity.x,
            self.angular_velocity.y,
            self.angular_velocity.z,
            0.0,
        );
        let k1 = (self.orientation * spin) * 0.5;
        let midpoint = self.orientation + k1 * (dt * 0.5);
        let k2 = (midpoint * spin) * 0.5;
        self.orientation = (self.orientation + k2 * dt).normalize();

        self.apply_constraints();
    }

    /// Velocity clamp plus the soft containment wall around the origin.
    fn apply_constraints(&mut self) {
        self.velocity = self
            .velocity
            .clamp(Vec3::splat(-MAX_VELOCITY), Vec3::splat(MAX_VELOCITY));

        let radius = self.shape.bounding_radius();
        let limit_sq = WORLD_RADIUS * WORLD_RADIUS - radius * radius;
        let distance_sq = self.position.length_squared();

        if distance_sq > limit_sq && distance_sq > 0.0 {
            let normal = self.position / distance_sq.sqrt();
            let outward = self.velocity.dot(normal);

            // Reflect only the outward component so an inbound body is not
            // bounced back out of the world.
            if outward > 0.0 {
                self.velocity -= normal * (2.0 * outward);
            }
            self.angular_velocity *= SPIN_DAMPING;
        }
    }
}
