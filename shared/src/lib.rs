//! Types shared between the asteroid-field server and its clients: the
//! rigid-body physics core, pairwise collision response, and the UDP wire
//! protocol. Nothing in this crate touches a socket; the server crate (and
//! any client binary) drives these pieces.

pub mod body;
pub mod collision;
pub mod protocol;

pub use body::{RigidBody, Shape};
pub use collision::{resolve_pair, resolve_sphere_cuboid, resolve_sphere_sphere};
pub use protocol::{BodyState, CameraState, ClientPacket, ServerPacket, StatusEntry, WireError};

/// Session table capacity. Status broadcasts carry at most this many entries.
pub const MAX_CLIENTS: usize = 16;

/// Well-known UDP port the server listens on.
pub const DEFAULT_PORT: u16 = 4545;

/// Integration never steps further than this, no matter how late a tick runs.
pub const MAX_TIMESTEP: f32 = 0.016;

/// Componentwise linear velocity clamp applied after every integration step.
pub const MAX_VELOCITY: f32 = 500.0;

/// Radius of the soft containment wall around the world origin.
pub const WORLD_RADIUS: f32 = 2000.0;

/// Angular velocity damping applied while a body presses on the containment wall.
pub const SPIN_DAMPING: f32 = 0.998;

/// Collision elasticity: separation speed relative to approach speed.
pub const RESTITUTION: f32 = 0.8;

/// Coulomb friction coefficient for the tangential collision impulse.
pub const FRICTION: f32 = 0.707;

/// Mass of the sphere standing in for a connected client's viewpoint.
pub const CAMERA_MASS: f32 = 100.0;

/// Collision radius of a client's camera body.
pub const CAMERA_RADIUS: f32 = 5.0;
