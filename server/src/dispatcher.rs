//! Request handling for the chat server
//!
//! Each inbound datagram is parsed, counted as activity for its sender and
//! routed to the handler for its command. Handlers never fail: unknown
//! targets and unregistered senders are ignored, and the only errors a
//! client ever sees are plain-text replies.

use crate::broadcast::{broadcast, Outbox};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::history::ReplayBuffer;
use log::{debug, info, warn};
use shared::{
    chat_line, goodbye, greeting, invalid_command, kicked_announcement, parse_request, renamed,
    Command, KICK_NOTICE, KICK_UNAUTHORIZED,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Name used for messages from addresses that never connected
const UNKNOWN_SENDER: &str = "Unknown";

/// Routes parsed requests to their handlers
///
/// Owns the replay buffer, which is only ever touched from the
/// request-handling task.
pub struct Dispatcher {
    clients: Arc<RwLock<ClientManager>>,
    history: ReplayBuffer,
    outbox: Outbox,
    admin_port: u16,
}

impl Dispatcher {
    pub fn new(clients: Arc<RwLock<ClientManager>>, outbox: Outbox, config: &ServerConfig) -> Self {
        Self {
            clients,
            history: ReplayBuffer::new(config.history_size),
            outbox,
            admin_port: config.admin_port,
        }
    }

    /// Handles one raw request line received from `addr` at `now`
    pub async fn handle_datagram(&mut self, addr: SocketAddr, line: &str, now: Instant) {
        let request = match parse_request(line) {
            Some(request) => request,
            None => {
                debug!("Dropping request without command from {}", addr);
                return;
            }
        };

        debug!("Request '{}' from {}", request.command, addr);

        // Any traffic counts as liveness, even an invalid command
        self.clients.write().await.touch(addr, now);

        match Command::from_token(request.command) {
            Some(Command::Connect) => self.handle_connect(addr, request.content, now).await,
            Some(Command::Say) => self.handle_say(addr, request.content).await,
            Some(Command::SayTo) => self.handle_say_to(addr, request.content).await,
            Some(Command::Disconnect) => self.handle_disconnect(addr).await,
            Some(Command::Rename) => self.handle_rename(addr, request.content).await,
            Some(Command::Mute) => {
                self.clients.write().await.add_mute(addr, request.content);
            }
            Some(Command::Unmute) => {
                self.clients.write().await.remove_mute(addr, request.content);
            }
            Some(Command::Kick) => self.handle_kick(addr, request.content).await,
            Some(Command::RetPing) => self.handle_ret_ping(addr, now).await,
            None => {
                warn!("Invalid command '{}' from {}", request.command, addr);
                self.outbox.send(addr, &invalid_command(request.command));
            }
        }
    }

    /// Registers the sender, greets it and replays recent chat
    async fn handle_connect(&mut self, addr: SocketAddr, name: &str, now: Instant) {
        let name = self.clients.write().await.connect(name, addr, now);

        self.outbox.send(addr, &greeting(&name));
        for line in self.history.iter() {
            self.outbox.send(addr, line);
        }
    }

    async fn handle_say(&mut self, addr: SocketAddr, message: &str) {
        let sender = self.sender_name(addr).await;
        let line = chat_line(sender.as_deref().unwrap_or(UNKNOWN_SENDER), message);

        self.history.push(line.clone());
        broadcast(&self.clients, &self.outbox, sender.as_deref(), &line).await;
    }

    /// Delivers `<recipient> <message>` to a single client
    async fn handle_say_to(&self, addr: SocketAddr, content: &str) {
        let (recipient_name, message) = match content.split_once(' ') {
            Some(parts) => parts,
            None => return,
        };

        let sender = self.sender_name(addr).await;
        let sender = sender.as_deref().unwrap_or(UNKNOWN_SENDER);

        let recipient = {
            let clients = self.clients.read().await;
            match clients.find_by_name(recipient_name) {
                Some(recipient) if !recipient.is_muted(sender) => recipient.addr,
                _ => return,
            }
        };

        self.outbox.send(recipient, &chat_line(sender, message));
    }

    async fn handle_disconnect(&self, addr: SocketAddr) {
        let removed = self.clients.write().await.remove(addr);

        if let Some(client) = removed {
            self.outbox.send(addr, &goodbye(&client.name));
        }
    }

    async fn handle_rename(&self, addr: SocketAddr, new_name: &str) {
        let name = {
            let mut clients = self.clients.write().await;
            clients.rename(addr, new_name).map(|client| client.name.clone())
        };

        if let Some(name) = name {
            self.outbox.send(addr, &renamed(&name));
        }
    }

    /// Removes a client by name when asked from the admin port
    ///
    /// The source port is the only credential checked, so any peer able to
    /// bind that port can kick.
    async fn handle_kick(&self, addr: SocketAddr, name: &str) {
        if addr.port() != self.admin_port {
            warn!("Rejected kick of '{}' from non-admin {}", name, addr);
            self.outbox.send(addr, KICK_UNAUTHORIZED);
            return;
        }

        let kicked = self.clients.write().await.remove_by_name(name);

        if let Some(client) = kicked {
            info!("Admin {} kicked {} ({})", addr, client.name, client.addr);
            self.outbox.send(client.addr, KICK_NOTICE);
            broadcast(
                &self.clients,
                &self.outbox,
                None,
                &kicked_announcement(&client.name),
            )
            .await;
        }
    }

    async fn handle_ret_ping(&self, addr: SocketAddr, now: Instant) {
        if self.clients.write().await.touch(addr, now) {
            debug!("Probe answered by {}", addr);
        }
    }

    async fn sender_name(&self, addr: SocketAddr) -> Option<String> {
        let clients = self.clients.read().await;
        clients.find_by_address(addr).map(|client| client.name.clone())
    }

    pub fn clients(&self) -> &Arc<RwLock<ClientManager>> {
        &self.clients
    }

    pub fn history(&self) -> &ReplayBuffer {
        &self.history
    }
}
