//! Integration tests for the networked simulation server
//!
//! These tests spin up a real server on an ephemeral UDP port and talk to it
//! over the wire, validating the handshake, broadcasting, and eviction.

use glam::{Quat, Vec3};
use server::network::{Server, ServerConfig, ServerMessage};
use shared::protocol::CameraState;
use shared::{ClientPacket, ServerPacket};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// Tests that a connect datagram yields an ack with a valid session id,
    /// the world seed, and the observed source port.
    #[tokio::test]
    async fn connect_returns_session_and_seed() {
        let (server_addr, _commands) = start_server(16, 30_000, 8, 99).await;
        let socket = client_socket().await;

        let (client_id, seed, port) = connect(&socket, server_addr).await;

        assert!(client_id < 16);
        assert_eq!(seed, 99);
        assert_eq!(port, socket.local_addr().unwrap().port());
    }

    /// Tests that two clients receive distinct session ids.
    #[tokio::test]
    async fn concurrent_clients_get_distinct_ids() {
        let (server_addr, _commands) = start_server(16, 30_000, 8, 7).await;
        let first = client_socket().await;
        let second = client_socket().await;

        let (id_a, _, _) = connect(&first, server_addr).await;
        let (id_b, _, _) = connect(&second, server_addr).await;

        assert_ne!(id_a, id_b);
    }

    /// Tests that a full session table rejects a connect by staying silent.
    #[tokio::test]
    async fn full_table_ignores_connect() {
        let (server_addr, _commands) = start_server(2, 30_000, 4, 7).await;
        let first = client_socket().await;
        let second = client_socket().await;
        let third = client_socket().await;

        connect(&first, server_addr).await;
        connect(&second, server_addr).await;

        let payload = ClientPacket::Connect.encode().unwrap();
        third.send_to(&payload, server_addr).await.unwrap();

        let mut buffer = [0u8; 2048];
        let reply = timeout(Duration::from_millis(300), third.recv_from(&mut buffer)).await;
        assert!(reply.is_err(), "rejected client should get no datagram");
    }
}

/// BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    /// Tests that a reported camera position comes back in a status broadcast.
    #[tokio::test]
    async fn status_report_is_echoed_to_clients() {
        let (server_addr, _commands) = start_server(16, 30_000, 0, 7).await;
        let socket = client_socket().await;
        let (client_id, _, _) = connect(&socket, server_addr).await;

        let report = ClientPacket::Status {
            client_id,
            camera: CameraState {
                position: Vec3::new(100.0, 200.0, 300.0),
                velocity: Vec3::ZERO,
                orientation: Quat::IDENTITY,
            },
        };
        socket
            .send_to(&report.encode().unwrap(), server_addr)
            .await
            .unwrap();

        let entry = wait_for_status_entry(&socket, client_id).await;
        // The server keeps integrating the camera, so allow some drift.
        assert!((entry.position - Vec3::new(100.0, 200.0, 300.0)).length() < 5.0);
    }

    /// Tests that field snapshots carry the full asteroid population with
    /// radii inside the generation bounds.
    #[tokio::test]
    async fn field_snapshot_carries_every_asteroid() {
        let (server_addr, _commands) = start_server(16, 30_000, 32, 7).await;
        let socket = client_socket().await;
        connect(&socket, server_addr).await;

        let bodies = wait_for_field(&socket).await;

        assert_eq!(bodies.len(), 32);
        for body in &bodies {
            assert!(body.radius >= 0.05 && body.radius <= 40.0);
            assert!(body.position.length() < 2000.0);
        }
    }

    /// Tests that a regenerate command reshuffles the broadcast field.
    #[tokio::test]
    async fn regenerate_changes_the_field() {
        let (server_addr, commands) = start_server(16, 30_000, 32, 7).await;
        let socket = client_socket().await;
        connect(&socket, server_addr).await;

        let before = wait_for_field(&socket).await;
        commands.send(ServerMessage::Regenerate).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after = wait_for_field(&socket).await;

        let moved = before
            .iter()
            .zip(&after)
            .any(|(a, b)| (a.position - b.position).length() > 10.0);
        assert!(moved, "field should change after regeneration");
    }
}

/// SESSION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Tests that a disconnected client disappears from status broadcasts.
    #[tokio::test]
    async fn disconnect_removes_the_session() {
        let (server_addr, _commands) = start_server(16, 30_000, 0, 7).await;
        let watcher = client_socket().await;
        let leaver = client_socket().await;

        let (watcher_id, _, _) = connect(&watcher, server_addr).await;
        let (leaver_id, _, _) = connect(&leaver, server_addr).await;

        wait_for_status_entry(&watcher, leaver_id).await;

        let bye = ClientPacket::Disconnect {
            client_id: leaver_id,
        };
        leaver
            .send_to(&bye.encode().unwrap(), server_addr)
            .await
            .unwrap();

        wait_until_status_lacks(&watcher, watcher_id, leaver_id).await;
    }

    /// Tests that a silent client is evicted once its TTL lapses while an
    /// active client keeps its session by reporting status.
    #[tokio::test]
    async fn silent_client_times_out() {
        let (server_addr, _commands) = start_server(16, 200, 0, 7).await;
        let keeper = client_socket().await;
        let idler = client_socket().await;

        let (keeper_id, _, _) = connect(&keeper, server_addr).await;
        let (idler_id, _, _) = connect(&idler, server_addr).await;

        wait_for_status_entry(&keeper, idler_id).await;

        // The keeper reports continuously; the idler goes quiet.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            let report = ClientPacket::Status {
                client_id: keeper_id,
                camera: CameraState {
                    position: Vec3::ZERO,
                    velocity: Vec3::ZERO,
                    orientation: Quat::IDENTITY,
                },
            };
            keeper
                .send_to(&report.encode().unwrap(), server_addr)
                .await
                .unwrap();

            if let Some(entries) = try_recv_status(&keeper).await {
                let keeper_alive = entries.iter().any(|e| e.client_id == keeper_id);
                let idler_alive = entries.iter().any(|e| e.client_id == idler_id);
                if keeper_alive && !idler_alive {
                    return;
                }
            }

            if tokio::time::Instant::now() > deadline {
                panic!("idler was never evicted");
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// PROTOCOL ROBUSTNESS TESTS
mod robustness_tests {
    use super::*;

    /// Tests that garbage datagrams neither crash the server nor allocate
    /// sessions.
    #[tokio::test]
    async fn garbage_datagrams_are_ignored() {
        let (server_addr, _commands) = start_server(16, 30_000, 4, 7).await;
        let socket = client_socket().await;

        socket.send_to(b"Junk!!!", server_addr).await.unwrap();
        socket.send_to(&[0u8; 3], server_addr).await.unwrap();
        socket.send_to(&[0xFF; 512], server_addr).await.unwrap();

        // The server must still answer a well-formed connect afterwards.
        let (client_id, _, _) = connect(&socket, server_addr).await;
        assert!(client_id < 16);
    }
}

// HELPER FUNCTIONS

/// Boots a server on an ephemeral port and drives its loop in a task.
async fn start_server(
    max_clients: usize,
    ttl_ms: u64,
    asteroids: usize,
    seed: u32,
) -> (SocketAddr, mpsc::UnboundedSender<ServerMessage>) {
    let config = ServerConfig {
        addr: "127.0.0.1:0".to_string(),
        tick_duration: Duration::from_millis(16),
        max_clients,
        client_ttl: Duration::from_millis(ttl_ms),
        asteroid_count: asteroids,
        seed,
    };

    let mut server = Server::new(config).await.expect("failed to start server");
    let addr = server.local_addr();
    let commands = server.command_sender();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, commands)
}

async fn client_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind client socket")
}

/// Sends a connect and waits for the ack, returning (id, seed, port).
async fn connect(socket: &UdpSocket, server_addr: SocketAddr) -> (u32, u32, u16) {
    let payload = ClientPacket::Connect.encode().unwrap();
    socket.send_to(&payload, server_addr).await.unwrap();

    let mut buffer = [0u8; 65536];
    loop {
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for connect ack")
            .unwrap();

        if let Ok(ServerPacket::ConnectAck {
            client_id,
            seed,
            port,
        }) = ServerPacket::decode(&buffer[..len])
        {
            return (client_id, seed, port);
        }
    }
}

/// Receives broadcasts until a status packet mentions `client_id`.
async fn wait_for_status_entry(socket: &UdpSocket, client_id: u32) -> CameraState {
    let mut buffer = [0u8; 65536];
    loop {
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for status broadcast")
            .unwrap();

        if let Ok(ServerPacket::Status { entries }) = ServerPacket::decode(&buffer[..len]) {
            if let Some(entry) = entries.iter().find(|e| e.client_id == client_id) {
                return entry.camera.clone();
            }
        }
    }
}

/// Receives broadcasts until a status packet includes `present_id` but not
/// `absent_id`.
async fn wait_until_status_lacks(socket: &UdpSocket, present_id: u32, absent_id: u32) {
    let mut buffer = [0u8; 65536];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for status broadcast")
            .unwrap();

        if let Ok(ServerPacket::Status { entries }) = ServerPacket::decode(&buffer[..len]) {
            let present = entries.iter().any(|e| e.client_id == present_id);
            let absent = entries.iter().any(|e| e.client_id == absent_id);
            if present && !absent {
                return;
            }
        }

        if tokio::time::Instant::now() > deadline {
            panic!("session {} never left the status broadcast", absent_id);
        }
    }
}

/// Receives one broadcast window's worth of datagrams, returning the first
/// status payload if any arrived.
async fn try_recv_status(socket: &UdpSocket) -> Option<Vec<shared::protocol::StatusEntry>> {
    let mut buffer = [0u8; 65536];
    for _ in 0..8 {
        let received = timeout(Duration::from_millis(100), socket.recv_from(&mut buffer)).await;
        let Ok(Ok((len, _))) = received else {
            return None;
        };
        if let Ok(ServerPacket::Status { entries }) = ServerPacket::decode(&buffer[..len]) {
            return Some(entries);
        }
    }
    None
}

/// Receives broadcasts until a field snapshot arrives.
async fn wait_for_field(socket: &UdpSocket) -> Vec<shared::protocol::BodyState> {
    let mut buffer = [0u8; 65536];
    loop {
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for field broadcast")
            .unwrap();

        if let Ok(ServerPacket::Field { bodies }) = ServerPacket::decode(&buffer[..len]) {
            return bodies;
        }
    }
}
