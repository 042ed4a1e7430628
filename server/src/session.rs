//! Fixed-capacity session registry for connected clients.
//!
//! Each occupied slot binds a transport endpoint to one camera rigid body
//! and a liveness deadline. Slot indices double as client ids: they stay
//! stable for the session's lifetime and are reused only after removal.

use glam::Vec3;
use log::info;
use shared::protocol::CameraState;
use shared::{RigidBody, CAMERA_MASS, CAMERA_RADIUS};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One connected client.
#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub addr: SocketAddr,
    /// Evicted once the current time passes this; renewed by status packets.
    pub deadline: Instant,
    /// Authoritative physical stand-in for the client's viewpoint.
    pub camera: RigidBody,
}

impl Session {
    fn new(id: u32, addr: SocketAddr, ttl: Duration) -> Self {
        Self {
            id,
            addr,
            deadline: Instant::now() + ttl,
            camera: RigidBody::sphere(Vec3::ZERO, CAMERA_RADIUS, CAMERA_MASS),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }
}

/// Slot-indexed table of sessions with a fixed capacity.
pub struct SessionTable {
    slots: Vec<Option<Session>>,
    connected: usize,
    ttl: Duration,
}

impl SessionTable {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            connected: 0,
            ttl,
        }
    }

    /// Claims the first free slot for `addr`. Returns `None` when the table
    /// is full; the caller rejects the connect by not acknowledging it.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        let slot = self.slots.iter().position(|slot| slot.is_none())?;
        let id = slot as u32;
        self.slots[slot] = Some(Session::new(id, addr, self.ttl));
        self.connected += 1;
        info!("client {} connected from {}", id, addr);
        Some(id)
    }

    /// Clears the slot. Returns false if the id was out of range or vacant.
    pub fn remove_client(&mut self, id: u32) -> bool {
        match self.slots.get_mut(id as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.connected -= 1;
                info!("client {} disconnected", id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.slots.get(id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.slots.get_mut(id as usize)?.as_mut()
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.iter_connected()
            .find(|session| session.addr == addr)
            .map(|session| session.id)
    }

    /// True when `id` names a live session bound to exactly this endpoint.
    /// Packets referencing someone else's id are dropped on this check.
    pub fn addr_matches(&self, id: u32, addr: SocketAddr) -> bool {
        self.get(id).map_or(false, |session| session.addr == addr)
    }

    /// Renews the session's time-to-live.
    pub fn touch(&mut self, id: u32) {
        let deadline = Instant::now() + self.ttl;
        if let Some(session) = self.get_mut(id) {
            session.deadline = deadline;
        }
    }

    /// Overwrites the camera body from an inbound status packet and renews
    /// the TTL. Returns false for a vacant id.
    pub fn apply_status(&mut self, id: u32, camera: &CameraState) -> bool {
        match self.get_mut(id) {
            Some(session) => {
                session.camera.position = camera.position;
                session.camera.velocity = camera.velocity;
                session.camera.orientation = camera.orientation;
            }
            None => return false,
        }
        self.touch(id);
        true
    }

    /// Evicts every session whose deadline has passed; returns their ids.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<u32> {
        let mut evicted = Vec::new();
        for slot in &mut self.slots {
            if slot.as_ref().map_or(false, |session| session.is_expired(now)) {
                if let Some(session) = slot.take() {
                    evicted.push(session.id);
                    self.connected -= 1;
                }
            }
        }
        evicted
    }

    pub fn iter_connected(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten()
    }

    pub fn iter_connected_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().flatten()
    }

    /// Raw slot access for pairwise camera/camera collision passes.
    pub fn slots_mut(&mut self) -> &mut [Option<Session>] {
        &mut self.slots
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.iter_connected().map(|session| session.addr).collect()
    }

    pub fn len(&self) -> usize {
        self.connected
    }

    pub fn is_empty(&self) -> bool {
        self.connected == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
