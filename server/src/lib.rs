//! # Asteroid-Field Server Library
//!
//! Authoritative server for a small multiplayer space simulation. It owns
//! the shared physical world (a field of asteroid rigid bodies plus one
//! camera body per connected client), advances it on a fixed timestep,
//! resolves collisions among all bodies, and synchronizes the result to
//! every connected client over best-effort UDP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive version of the physics. Clients report
//! their camera state and receive the server's view of everyone else and
//! of the asteroid field; their cameras participate in collision response
//! like any other body.
//!
//! ### Session Management
//! A fixed-capacity table tracks connected clients. Slots are assigned
//! first-free, ids stay stable for a session's lifetime, and sessions are
//! aged out once their time-to-live lapses without inbound status traffic.
//!
//! ### State Broadcasting
//! At the tick rate the server broadcasts two snapshots to all connected
//! clients: a status packet carrying every connected camera, and a field
//! packet carrying every asteroid. Both are idempotent per tick, so lost
//! datagrams cost nothing but latency.
//!
//! ## Architecture
//!
//! One task owns the session table and the world and drives the whole
//! tick (receive, integrate, resolve, broadcast, sweep) from a
//! `tokio::select!` loop; small helper tasks feed it inbound datagrams
//! and drain its outbound queue so the tick never blocks on the socket.
//!
//! ## Module Organization
//!
//! - [`session`]: the fixed-capacity session table and TTL tracking.
//! - [`world`]: asteroid-field generation and the per-tick physics pass.
//! - [`network`]: the UDP server loop, packet dispatch, and broadcasting.

pub mod network;
pub mod session;
pub mod world;
