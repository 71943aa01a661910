use kestrel_common::ConnectionState;
use kestrel_logger::log::log;
use kestrel_logger::severity::LogSeverity::{Error, Info, Warning};
use kestrel_net::{Connection, InboundPacket, PacketHandler};
use kestrel_protocol::handshake::HandshakePacket;
use kestrel_protocol::keep_alive::KeepAliveResponsePacket;
use kestrel_protocol::status::{PingPacket, StatusRequestPacket};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::timeout;

const DEFAULT_ADDRESS: &str = "127.0.0.1:25565";

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Status-ping handler: prints the server's status document, measures
/// round-trip time with a ping, and echoes keep-alives should the
/// connection ever reach the Play state.
struct StatusPinger {
    done: mpsc::UnboundedSender<()>,
}

impl PacketHandler for StatusPinger {
    fn handle_status(&self, connection: &Connection, packet: InboundPacket) {
        match packet {
            InboundPacket::StatusResponse(response) => {
                match response.info() {
                    Ok(info) => log(
                        format!(
                            "Server: {} (protocol {}), players {}/{}",
                            info.version.name,
                            info.version.protocol,
                            info.players.online,
                            info.players.max
                        ),
                        Info,
                    ),
                    Err(err) => log(format!("Unreadable status document: {}", err), Warning),
                }
                if let Err(err) = connection.send(PingPacket {
                    payload: now_millis(),
                }) {
                    log(format!("Failed to send ping: {}", err), Error);
                    let _ = self.done.send(());
                }
            }
            InboundPacket::Pong(pong) => {
                log(
                    format!("Ping: {} ms", now_millis() - pong.payload),
                    Info,
                );
                let _ = self.done.send(());
            }
            _ => {}
        }
    }

    fn handle_play(&self, connection: &Connection, packet: InboundPacket) {
        if let InboundPacket::KeepAlive(keep_alive) = packet {
            let _ = connection.send(KeepAliveResponsePacket {
                keep_alive_id: keep_alive.keep_alive_id,
            });
        }
    }
}

/// Connects to the server named on the command line (or localhost) and
/// runs one status-ping exchange.
pub async fn run() {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_owned());
    let address: SocketAddr = match address.parse() {
        Ok(address) => address,
        Err(_) => {
            log(format!("Invalid server address: {}", address), Error);
            return;
        }
    };

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let connection = Connection::new(address, Arc::new(StatusPinger { done: done_tx }));

    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    connection.on_closed(move |_notified| {
        let _ = closed_tx.send(());
    });

    if let Err(err) = connection.initialize().await {
        log(format!("Connection failed: {}", err), Error);
        return;
    }

    let handshake = HandshakePacket::status(address.ip().to_string(), address.port());
    let result = connection
        .send(handshake)
        .and_then(|_| connection.set_state(ConnectionState::Status))
        .and_then(|_| connection.send(StatusRequestPacket));
    if let Err(err) = result {
        log(format!("Status request failed: {}", err), Error);
        connection.stop();
        return;
    }

    if timeout(Duration::from_secs(10), done_rx.recv()).await.is_err() {
        log("Timed out waiting for the server.".to_owned(), Warning);
    }

    connection.stop();
    let _ = closed_rx.await;

    log(
        format!(
            "Session: {} packets out ({} bytes), {} packets in ({} bytes).",
            connection.packets_out(),
            connection.bytes_out(),
            connection.packets_in(),
            connection.bytes_in()
        ),
        Info,
    );
}
