//! Outgoing message delivery and mute-aware fan-out

use crate::client_manager::ClientManager;
use log::{debug, warn};
use shared::{truncate_utf8, BUFFER_SIZE};
use std::net::SocketAddr;
use tokio::sync::{mpsc, RwLock};

/// A text datagram waiting to be written to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub addr: SocketAddr,
    pub text: String,
}

/// Queue feeding the network sender task
///
/// Queued datagrams are written in order; a failed write only affects the
/// datagram it belongs to.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Datagram>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Datagram>) -> Self {
        Self { tx }
    }

    /// Creates an outbox together with the receiving end of its queue
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Datagram>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queues `text` for `addr`, truncated to fit a datagram
    pub fn send(&self, addr: SocketAddr, text: &str) {
        let text = truncate_utf8(text, BUFFER_SIZE - 1).to_string();
        if let Err(e) = self.tx.send(Datagram { addr, text }) {
            warn!("Dropping message to {}: sender task gone ({})", addr, e);
        }
    }
}

/// Sends `message` to every registered client
///
/// When `sender` is given, clients that muted that name are skipped.
/// Announcements without a sender reach everyone.
pub async fn broadcast(
    clients: &RwLock<ClientManager>,
    outbox: &Outbox,
    sender: Option<&str>,
    message: &str,
) {
    let clients = clients.read().await;
    let mut delivered = 0;

    for client in clients.clients() {
        if let Some(sender) = sender {
            if client.is_muted(sender) {
                continue;
            }
        }
        outbox.send(client.addr, message);
        delivered += 1;
    }

    debug!(
        "Broadcast from {} delivered to {}/{} clients",
        sender.unwrap_or("server"),
        delivered,
        clients.len()
    );
}
