//! Wire protocol for the UDP session layer.
//!
//! Every datagram starts with a 4-byte ASCII magic tag; the payload behind
//! it is a flat little-endian run of fixed-width fields (bincode with
//! explicit little-endian, fixed-int options — vectors and quaternions
//! serialize as bare `f32` runs). Packets are split by direction:
//! [`ClientPacket`] is what the server parses, [`ServerPacket`] is what it
//! emits. Decoding tolerates trailing bytes, since historical senders
//! padded datagrams out to fixed-size zeroed buffers.

use bincode::Options;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::body::RigidBody;
use crate::MAX_CLIENTS;

/// Client connect request / server connect acknowledgement.
pub const CONNECT_MAGIC: [u8; 4] = *b"Conn";
/// Client disconnect notice.
pub const DISCONNECT_MAGIC: [u8; 4] = *b"DisC";
/// Camera status, both directions.
pub const STATUS_MAGIC: [u8; 4] = *b"Stat";
/// Bulk world snapshot, server to client.
pub const FIELD_MAGIC: [u8; 4] = *b"Feld";

/// Sanity cap on the body count of an inbound field snapshot.
const MAX_FIELD_BODIES: u32 = 65_535;

fn wire_options() -> impl Options {
    bincode::options()
        .with_little_endian()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// One camera's kinematic state as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
}

impl From<&RigidBody> for CameraState {
    fn from(body: &RigidBody) -> Self {
        Self {
            position: body.position,
            velocity: body.velocity,
            orientation: body.orientation,
        }
    }
}

/// Per-client entry in a status broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub client_id: u32,
    pub camera: CameraState,
}

/// Per-body entry in a field snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub radius: f32,
}

impl From<&RigidBody> for BodyState {
    fn from(body: &RigidBody) -> Self {
        Self {
            position: body.position,
            velocity: body.velocity,
            orientation: body.orientation,
            radius: body.shape.bounding_radius(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ConnectAckPayload {
    client_id: u32,
    seed: u32,
    port: u16,
}

/// Packets the server accepts from clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    Connect,
    Disconnect { client_id: u32 },
    Status { client_id: u32, camera: CameraState },
}

/// Packets the server sends to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    ConnectAck {
        client_id: u32,
        seed: u32,
        /// The client's source port, echoed back so it can spot NAT rewrites.
        port: u16,
    },
    Status {
        entries: Vec<StatusEntry>,
    },
    Field {
        bodies: Vec<BodyState>,
    },
}

/// Wire-level failure; the server logs these and drops the datagram.
#[derive(Debug)]
pub enum WireError {
    /// Datagram shorter than the 4-byte magic tag.
    Truncated,
    /// Magic tag not part of this protocol version.
    UnknownMagic([u8; 4]),
    /// A count field that no well-formed sender would produce.
    BadCount(u32),
    /// Payload failed to (de)serialize.
    Codec(bincode::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated => write!(f, "datagram shorter than the magic tag"),
            WireError::UnknownMagic(magic) => write!(f, "unknown packet magic {:02x?}", magic),
            WireError::BadCount(count) => write!(f, "implausible element count {}", count),
            WireError::Codec(err) => write!(f, "payload codec error: {}", err),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<bincode::Error> for WireError {
    fn from(err: bincode::Error) -> Self {
        WireError::Codec(err)
    }
}

fn read_magic(buffer: &[u8]) -> Result<[u8; 4], WireError> {
    if buffer.len() < 4 {
        return Err(WireError::Truncated);
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buffer[..4]);
    Ok(magic)
}

impl ClientPacket {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buffer = Vec::with_capacity(64);
        match self {
            ClientPacket::Connect => buffer.extend_from_slice(&CONNECT_MAGIC),
            ClientPacket::Disconnect { client_id } => {
                buffer.extend_from_slice(&DISCONNECT_MAGIC);
                wire_options().serialize_into(&mut buffer, client_id)?;
            }
            ClientPacket::Status { client_id, camera } => {
                buffer.extend_from_slice(&STATUS_MAGIC);
                wire_options().serialize_into(&mut buffer, client_id)?;
                wire_options().serialize_into(&mut buffer, camera)?;
            }
        }
        Ok(buffer)
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, WireError> {
        let magic = read_magic(buffer)?;
        let mut rest = &buffer[4..];
        match magic {
            CONNECT_MAGIC => Ok(ClientPacket::Connect),
            DISCONNECT_MAGIC => {
                let client_id = wire_options().deserialize_from(&mut rest)?;
                Ok(ClientPacket::Disconnect { client_id })
            }
            STATUS_MAGIC => {
                let client_id = wire_options().deserialize_from(&mut rest)?;
                let camera = wire_options().deserialize_from(&mut rest)?;
                Ok(ClientPacket::Status { client_id, camera })
            }
            other => Err(WireError::UnknownMagic(other)),
        }
    }
}

impl ServerPacket {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buffer = Vec::with_capacity(128);
        match self {
            ServerPacket::ConnectAck {
                client_id,
                seed,
                port,
            } => {
                buffer.extend_from_slice(&CONNECT_MAGIC);
                let payload = ConnectAckPayload {
                    client_id: *client_id,
                    seed: *seed,
                    port: *port,
                };
                wire_options().serialize_into(&mut buffer, &payload)?;
            }
            ServerPacket::Status { entries } => {
                buffer.extend_from_slice(&STATUS_MAGIC);
                wire_options().serialize_into(&mut buffer, &(entries.len() as u32))?;
                for entry in entries {
                    wire_options().serialize_into(&mut buffer, entry)?;
                }
            }
            ServerPacket::Field { bodies } => {
                buffer.extend_from_slice(&FIELD_MAGIC);
                wire_options().serialize_into(&mut buffer, &(bodies.len() as u32))?;
                for body in bodies {
                    wire_options().serialize_into(&mut buffer, body)?;
                }
            }
        }
        Ok(buffer)
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, WireError> {
        let magic = read_magic(buffer)?;
        let mut rest = &buffer[4..];
        match magic {
            CONNECT_MAGIC => {
                let payload: ConnectAckPayload = wire_options().deserialize_from(&mut rest)?;
                Ok(ServerPacket::ConnectAck {
                    client_id: payload.client_id,
                    seed: payload.seed,
                    port: payload.port,
                })
            }
            STATUS_MAGIC => {
                let count: u32 = wire_options().deserialize_from(&mut rest)?;
                if count > MAX_CLIENTS as u32 {
                    return Err(WireError::BadCount(count));
                }
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push(wire_options().deserialize_from(&mut rest)?);
                }
                Ok(ServerPacket::Status { entries })
            }
            FIELD_MAGIC => {
                let count: u32 = wire_options().deserialize_from(&mut rest)?;
                if count > MAX_FIELD_BODIES {
                    return Err(WireError::BadCount(count));
                }
                let mut bodies = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    bodies.push(wire_options().deserialize_from(&mut rest)?);
                }
                Ok(ServerPacket::Field { bodies })
            }
            other => Err(WireError::UnknownMagic(other)),
        }
    }
}
