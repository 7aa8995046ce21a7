pub mod engine;
pub mod monitor;

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::protocol::MAX_DATAGRAM_SIZE;
use crate::server::engine::Engine;
use crate::util::loss::LossSimulator;


/// The UDP front of the reservation service: one socket, one task. Receive a datagram, let the
///  [Engine] process it, transmit whatever it produced (monitor updates, then the reply), and
///  go back to receiving. Nothing here is concurrent, so the engine needs no locking.
pub struct Server {
    socket: UdpSocket,
    engine: Engine,
    loss: LossSimulator,
    cancel_sender: broadcast::Sender<()>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Server> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port)).await?;
        let (cancel_sender, _) = broadcast::channel(1);

        info!(
            addr = ?socket.local_addr()?,
            semantics = %config.semantics,
            loss_rate = config.loss_rate,
            "server listening"
        );

        Ok(Server {
            socket,
            engine: Engine::new(&config),
            loss: LossSimulator::new(config.loss_rate, config.loss_seed),
            cancel_sender,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping [Server::run] from another task.
    pub fn cancel_sender(&self) -> broadcast::Sender<()> {
        self.cancel_sender.clone()
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let mut cancel_receiver = self.cancel_sender.subscribe();

        trace!("starting receive loop");

        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => {
                            if len == MAX_DATAGRAM_SIZE {
                                warn!(?from, "received a datagram at or beyond {} bytes, possibly truncated - skipping", MAX_DATAGRAM_SIZE);
                                continue;
                            }
                            for outbound in self.engine.on_datagram(&buf[..len], from) {
                                if self.loss.should_drop() {
                                    info!(to = ?outbound.to, len = outbound.bytes.len(), "dropping outbound datagram (loss simulation)");
                                    continue;
                                }
                                if let Err(e) = self.socket.send_to(&outbound.bytes, outbound.to).await {
                                    error!(to = ?outbound.to, error = ?e, "error sending datagram");
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e.into());
                        }
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        debug!("receive loop canceled");
        Ok(())
    }
}
