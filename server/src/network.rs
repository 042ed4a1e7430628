//! UDP server loop: packet dispatch, the fixed tick, and broadcasting.

use log::{debug, error, info, warn};
use shared::protocol::{BodyState, CameraState, StatusEntry};
use shared::{ClientPacket, ServerPacket, WireError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::session::SessionTable;
use crate::world::World;

/// Upper bound on inbound packets handled per tick, so a flood cannot
/// starve the physics step.
const MAX_PACKETS_PER_TICK: usize = 256;

/// Messages sent from auxiliary tasks (and operator controls) to the loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: ClientPacket,
        addr: SocketAddr,
    },
    /// Operator request: re-randomize the asteroid field.
    Regenerate,
    Shutdown,
}

/// Outbound work handed to the send task.
#[derive(Debug)]
enum Outbound {
    Send {
        payload: Vec<u8>,
        addr: SocketAddr,
    },
    Broadcast {
        payload: Vec<u8>,
        addrs: Vec<SocketAddr>,
    },
}

/// Server startup parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Grace period a session survives without inbound status traffic.
    pub client_ttl: Duration,
    pub asteroid_count: usize,
    pub seed: u32,
}

/// Main server: owns the session table and the world, drives the tick.
pub struct Server {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    sessions: SessionTable,
    world: World,
    tick_duration: Duration,
    tick: u64,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    /// Binds the UDP socket and generates the world. A bind failure here is
    /// the one fatal transport error; everything later is logged and absorbed.
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.addr).await?);
        let local_addr = socket.local_addr()?;
        info!("listening on {}", local_addr);

        let world = World::generate(config.seed, config.asteroid_count);
        info!(
            "generated {} asteroids from seed {}",
            world.len(),
            config.seed
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            local_addr,
            sessions: SessionTable::new(config.max_clients, config.client_ttl),
            world,
            tick_duration: config.tick_duration,
            tick: 0,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for feeding operator commands (regenerate, shutdown) into the loop.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns the task that continuously listens for inbound datagrams.
    fn spawn_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match ClientPacket::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        // Forward tolerance: anything we don't speak is dropped
                        // without touching state.
                        Err(WireError::UnknownMagic(magic)) => {
                            debug!("ignoring magic {:02x?} from {}", magic, addr)
                        }
                        Err(err) => debug!("dropping malformed datagram from {}: {}", addr, err),
                    },
                    Err(err) => {
                        error!("error receiving datagram: {}", err);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue. Send failures are
    /// per-recipient: one dead client never blocks the rest of a broadcast.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    Outbound::Send { payload, addr } => {
                        if let Err(err) = socket.send_to(&payload, addr).await {
                            error!("failed to send to {}: {}", addr, err);
                        }
                    }
                    Outbound::Broadcast { payload, addrs } => {
                        for addr in addrs {
                            if let Err(err) = socket.send_to(&payload, addr).await {
                                error!("failed to send to {}: {}", addr, err);
                            }
                        }
                    }
                }
            }
        });
    }

    fn queue_send(&self, packet: &ServerPacket, addr: SocketAddr) {
        match packet.encode() {
            Ok(payload) => {
                let _ = self.out_tx.send(Outbound::Send { payload, addr });
            }
            Err(err) => error!("failed to encode packet for {}: {}", addr, err),
        }
    }

    fn queue_broadcast(&self, packet: &ServerPacket) {
        let addrs = self.sessions.addrs();
        if addrs.is_empty() {
            return;
        }
        match packet.encode() {
            Ok(payload) => {
                let _ = self.out_tx.send(Outbound::Broadcast { payload, addrs });
            }
            Err(err) => error!("failed to encode broadcast: {}", err),
        }
    }

    /// Decodes one inbound packet into session-table mutations.
    fn handle_packet(&mut self, packet: ClientPacket, addr: SocketAddr) {
        match packet {
            ClientPacket::Connect => {
                // A reconnect from the same endpoint replaces the old session.
                if let Some(existing) = self.sessions.find_by_addr(addr) {
                    info!("replacing existing session {} for {}", existing, addr);
                    self.sessions.remove_client(existing);
                }

                match self.sessions.add_client(addr) {
                    Some(client_id) => {
                        let ack = ServerPacket::ConnectAck {
                            client_id,
                            seed: self.world.seed(),
                            port: addr.port(),
                        };
                        self.queue_send(&ack, addr);
                    }
                    None => {
                        // Rejected by omission: no ack, client retries or gives up.
                        warn!("session table full, ignoring connect from {}", addr);
                    }
                }
            }

            ClientPacket::Disconnect { client_id } => {
                if self.sessions.addr_matches(client_id, addr) {
                    self.sessions.remove_client(client_id);
                } else {
                    debug!("stale disconnect for id {} from {}", client_id, addr);
                }
            }

            ClientPacket::Status { client_id, camera } => {
                if self.sessions.addr_matches(client_id, addr) {
                    self.sessions.apply_status(client_id, &camera);
                } else {
                    debug!("status for unknown session {} from {}", client_id, addr);
                }
            }
        }
    }

    /// Drains queued inbound messages, bounded so a backlog cannot delay
    /// the physics step indefinitely. Returns true if shutdown was requested.
    fn drain_inbound(&mut self) -> bool {
        let mut handled = 0;
        while handled < MAX_PACKETS_PER_TICK {
            match self.server_rx.try_recv() {
                Ok(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr);
                    handled += 1;
                }
                Ok(ServerMessage::Regenerate) => self.regenerate_world(),
                Ok(ServerMessage::Shutdown) => return true,
                Err(_) => break,
            }
        }
        false
    }

    /// Re-randomizes the asteroid field from a time-derived seed. Clients
    /// learn the new layout from the next field snapshot.
    fn regenerate_world(&mut self) {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or_else(|_| std::process::id());
        self.world.regenerate(seed);
        info!(
            "world regenerated: {} asteroids from seed {}",
            self.world.len(),
            seed
        );
    }

    /// Serializes every connected camera and sends it to every session.
    fn broadcast_status(&self) {
        if self.sessions.is_empty() {
            return;
        }

        let entries: Vec<StatusEntry> = self
            .sessions
            .iter_connected()
            .map(|session| StatusEntry {
                client_id: session.id,
                camera: CameraState::from(&session.camera),
            })
            .collect();

        for entry in &entries {
            debug!(
                "status #{} pos {:.1} {:.1} {:.1} vel {:.1} {:.1} {:.1}",
                entry.client_id,
                entry.camera.position.x,
                entry.camera.position.y,
                entry.camera.position.z,
                entry.camera.velocity.x,
                entry.camera.velocity.y,
                entry.camera.velocity.z,
            );
        }

        self.queue_broadcast(&ServerPacket::Status { entries });
    }

    /// Serializes the whole asteroid field and sends it to every session.
    fn broadcast_field(&self) {
        if self.sessions.is_empty() {
            return;
        }

        let bodies: Vec<BodyState> = self.world.bodies().iter().map(BodyState::from).collect();
        self.queue_broadcast(&ServerPacket::Field { bodies });
    }

    /// Evicts sessions whose TTL lapsed. Runs after the status broadcast so
    /// a client's final state still goes out once.
    fn sweep(&mut self, now: Instant) {
        for client_id in self.sessions.sweep_expired(now) {
            info!("client {} timed out", client_id);
        }
    }

    /// One full tick: drain inbound, integrate and resolve, broadcast
    /// status and field, sweep. Returns true if shutdown was requested.
    fn run_tick(&mut self, dt: f32) -> bool {
        if self.drain_inbound() {
            return true;
        }

        self.world.step(dt, &mut self.sessions);
        self.broadcast_status();
        self.broadcast_field();
        self.sweep(Instant::now());

        self.tick += 1;
        if self.tick % 600 == 0 && !self.sessions.is_empty() {
            debug!(
                "tick {}: {} clients, {} bodies",
                self.tick,
                self.sessions.len(),
                self.world.len()
            );
        }
        false
    }

    /// Main server loop coordinating all operations.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_receiver();
        self.spawn_sender();

        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("server started");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => match message {
                    Some(ServerMessage::PacketReceived { packet, addr }) => {
                        self.handle_packet(packet, addr);
                    }
                    Some(ServerMessage::Regenerate) => self.regenerate_world(),
                    Some(ServerMessage::Shutdown) | None => {
                        info!("server shutting down");
                        break;
                    }
                },

                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    if self.run_tick(dt) {
                        info!("server shutting down");
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}
