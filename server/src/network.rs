//! Server network layer handling UDP communication and task coordination

use crate::broadcast::{Datagram, Outbox};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::liveness::LivenessMonitor;
use log::{debug, error, info};
use shared::{decode_datagram, BUFFER_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived { text: String, addr: SocketAddr },
    ReceiveFailed { reason: String },
}

/// Clears the server's running flag from outside the run loop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.send_replace(false);
    }
}

/// Chat server coordinating request handling and liveness monitoring
pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    clients: Arc<RwLock<ClientManager>>,
    running: Arc<watch::Sender<bool>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, BoxError> {
        config.validate()?;
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Chat server listening on {}", socket.local_addr()?);

        let (running, _) = watch::channel(true);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            config,
            running: Arc::new(running),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Shared client registry, mainly for inspection
    pub fn clients(&self) -> Arc<RwLock<ClientManager>> {
        Arc::clone(&self.clients)
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(
        &self,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let mut running = self.running.subscribe();

        tokio::spawn(async move {
            let mut buffer = [0u8; BUFFER_SIZE];

            loop {
                let message = tokio::select! {
                    result = socket.recv_from(&mut buffer) => match result {
                        Ok((len, addr)) => ServerMessage::DatagramReceived {
                            text: decode_datagram(&buffer[..len]),
                            addr,
                        },
                        Err(e) => ServerMessage::ReceiveFailed {
                            reason: e.to_string(),
                        },
                    },
                    changed = running.changed() => {
                        if changed.is_err() || !*running.borrow() {
                            break;
                        }
                        continue;
                    }
                };

                let fatal = matches!(message, ServerMessage::ReceiveFailed { .. });
                if server_tx.send(message).is_err() || fatal {
                    break;
                }
            }

            debug!("Network receiver stopped");
        })
    }

    /// Spawns task that writes queued datagrams to the socket
    ///
    /// The task ends once every `Outbox` is dropped and the queue is drained.
    fn spawn_network_sender(
        &self,
        mut outbound_rx: mpsc::UnboundedReceiver<Datagram>,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(datagram) = outbound_rx.recv().await {
                if let Err(e) = socket.send_to(datagram.text.as_bytes(), datagram.addr).await {
                    error!("Failed to send to {}: {}", datagram.addr, e);
                }
            }

            debug!("Network sender stopped");
        })
    }

    /// Spawns task that probes and evicts silent clients
    fn spawn_liveness_monitor(&self, outbox: Outbox) -> JoinHandle<()> {
        let monitor = LivenessMonitor::new(Arc::clone(&self.clients), outbox, &self.config);
        tokio::spawn(monitor.run(self.running.subscribe()))
    }

    /// Main server loop
    ///
    /// Returns when the running flag is cleared, or with an error when the
    /// socket can no longer be read. Background tasks are joined before
    /// returning, so every queued reply has been written by then.
    pub async fn run(&self) -> Result<(), BoxError> {
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        let (outbox, outbound_rx) = Outbox::channel();

        let receiver = self.spawn_network_receiver(server_tx);
        let sender = self.spawn_network_sender(outbound_rx);
        let monitor = self.spawn_liveness_monitor(outbox.clone());

        let mut dispatcher = Dispatcher::new(Arc::clone(&self.clients), outbox, &self.config);
        let mut running = self.running.subscribe();
        let mut result = Ok(());

        info!("Chat server started");

        while *running.borrow() {
            tokio::select! {
                message = server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { text, addr }) => {
                            dispatcher.handle_datagram(addr, &text, Instant::now()).await;
                        }
                        Some(ServerMessage::ReceiveFailed { reason }) => {
                            error!("Error receiving datagram: {}", reason);
                            result = Err(reason.into());
                            break;
                        }
                        None => break,
                    }
                }
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Chat server shutting down");
        self.running.send_replace(false);

        // The sender stops only after the last outbox is gone
        drop(dispatcher);
        join_task("liveness monitor", monitor).await;
        join_task("network receiver", receiver).await;
        join_task("network sender", sender).await;

        result
    }
}

async fn join_task(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!("Task {} failed: {}", name, e);
    }
}
