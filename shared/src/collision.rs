//! Narrow-phase collision tests and impulse-based response.
//!
//! Both entry points return a non-negative "impact speed" (the square root
//! of the approach speed along the contact normal) so callers can drive
//! gameplay feedback from it; zero means no contact, or a pair that was
//! already separating.

use glam::Vec3;

use crate::body::{RigidBody, Shape};
use crate::{FRICTION, RESTITUTION};

/// Degenerate-contact guard: squared distances at or below this are treated
/// as no collision instead of producing a NaN normal.
const MIN_DISTANCE_SQ: f32 = 1e-9;

/// Dispatches on the pair of shape tags. Box/box pairs are not simulated.
///
/// `box_is_static` reproduces the static-geometry special case: the box
/// still receives velocity and angular response, but all positional
/// correction is applied to the sphere.
pub fn resolve_pair(a: &mut RigidBody, b: &mut RigidBody, box_is_static: bool) -> f32 {
    match (a.shape, b.shape) {
        (Shape::Sphere { .. }, Shape::Sphere { .. }) => resolve_sphere_sphere(a, b),
        (Shape::Sphere { .. }, Shape::Cuboid { .. }) => resolve_sphere_cuboid(a, b, box_is_static),
        (Shape::Cuboid { .. }, Shape::Sphere { .. }) => resolve_sphere_cuboid(b, a, box_is_static),
        (Shape::Cuboid { .. }, Shape::Cuboid { .. }) => 0.0,
    }
}

/// Sphere/sphere contact. Mutates both bodies in place.
pub fn resolve_sphere_sphere(a: &mut RigidBody, b: &mut RigidBody) -> f32 {
    let (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) = (a.shape, b.shape) else {
        return 0.0;
    };

    let delta = b.position - a.position;
    let distance_sq = delta.length_squared();
    let radius_sum = ra + rb;

    if distance_sq >= radius_sum * radius_sum || distance_sq <= MIN_DISTANCE_SQ {
        return 0.0;
    }

    let distance = distance_sq.sqrt();
    let normal = delta / distance;
    let contact = a.position + normal * ra;

    respond(a, b, normal, radius_sum - distance, contact, true)
}

/// Sphere/axis-aligned-box contact. The contact point is the closest point
/// on the box to the sphere center; a sphere whose center sits inside the
/// box is treated as no contact.
pub fn resolve_sphere_cuboid(sphere: &mut RigidBody, cuboid: &mut RigidBody, box_is_static: bool) -> f32 {
    let (Shape::Sphere { radius }, Shape::Cuboid { half_extent }) = (sphere.shape, cuboid.shape)
    else {
        return 0.0;
    };

    let min = cuboid.position - half_extent;
    let max = cuboid.position + half_extent;
    let closest = sphere.position.clamp(min, max);

    let delta = closest - sphere.position;
    let distance_sq = delta.length_squared();

    if distance_sq >= radius * radius || distance_sq <= MIN_DISTANCE_SQ {
        return 0.0;
    }

    let distance = distance_sq.sqrt();
    let normal = delta / distance;

    respond(
        sphere,
        cuboid,
        normal,
        radius - distance,
        closest,
        !box_is_static,
    )
}

/// Shared impulse response. `normal` points from `a` toward `b`;
/// `correct_b` selects symmetric positional correction versus pushing only
/// `a` out by the full penetration.
fn respond(
    a: &mut RigidBody,
    b: &mut RigidBody,
    normal: Vec3,
    penetration: f32,
    contact: Vec3,
    correct_b: bool,
) -> f32 {
    let arm_a = contact - a.position;
    let arm_b = contact - b.position;

    // Relative velocity at the contact point, angular contribution included.
    let contact_velocity = (b.velocity + b.angular_velocity.cross(arm_b))
        - (a.velocity + a.angular_velocity.cross(arm_a));
    let relative_speed = contact_velocity.dot(normal);

    // Already separating, let them go.
    if relative_speed > 0.0 {
        return 0.0;
    }

    // Effective inverse mass seen by the normal impulse: linear terms plus
    // the torque-arm contribution scaled by each body's inverse inertia.
    let angular_a = arm_a.cross(normal).length_squared() * a.inv_inertia;
    let angular_b = arm_b.cross(normal).length_squared() * b.inv_inertia;
    let inv_mass_sum = a.inv_mass + b.inv_mass + angular_a + angular_b;
    if inv_mass_sum <= 0.0 {
        return 0.0;
    }

    let j = -(1.0 + RESTITUTION) * relative_speed / inv_mass_sum;
    let impulse = normal * j;
    a.velocity -= impulse * a.inv_mass;
    b.velocity += impulse * b.inv_mass;
    a.angular_velocity -= arm_a.cross(impulse) * a.inv_inertia;
    b.angular_velocity += arm_b.cross(impulse) * b.inv_inertia;

    // Coulomb friction along the contact tangent, clamped to +-mu*j.
    let tangential = contact_velocity - normal * relative_speed;
    if tangential.length_squared() > MIN_DISTANCE_SQ {
        let tangent = tangential.normalize();
        let jt = (-contact_velocity.dot(tangent) / inv_mass_sum).clamp(-FRICTION * j, FRICTION * j);
        let friction = tangent * jt;
        a.velocity -= friction * a.inv_mass;
        b.velocity += friction * b.inv_mass;
        a.angular_velocity -= arm_a.cross(friction) * a.inv_inertia;
        b.angular_velocity += arm_b.cross(friction) * b.inv_inertia;
    }

    // Positional correction so resting contacts don't sink into each other.
    if correct_b {
        let total = a.inv_mass + b.inv_mass;
        if total > 0.0 {
            let correction = normal * (penetration * 0.5 / total);
            a.position -= correction * a.inv_mass;
            b.position += correction * b.inv_mass;
        }
    } else {
        a.position -= normal * penetration;
    }

    (-relative_speed).sqrt()
}
