//! Client registry for the chat server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client lifecycle (connect, rename, disconnect, kick, eviction)
//! - Per-client mute lists
//! - Last-activity tracking through the [`ActivityHeap`]
//!
//! Registry and heap are kept in one struct so that a single lock guards
//! both; every structural change updates the two together.

use crate::activity_heap::ActivityHeap;
use log::{debug, info};
use shared::{bounded_name, MAX_MUTED};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected chat client
#[derive(Debug, Clone)]
pub struct Client {
    /// Display name, not required to be unique
    pub name: String,
    /// Network address, the client's identity
    pub addr: SocketAddr,
    /// Names this client does not want to hear from
    pub muted: Vec<String>,
    /// Last time we received any request from this client
    pub last_active: Instant,
    /// Whether a liveness probe is outstanding
    pub awaiting_probe: bool,
    /// When the outstanding probe was sent
    pub probe_sent: Option<Instant>,
    /// Registration order, used to pick between clients sharing a name
    pub joined: u64,
}

impl Client {
    pub fn new(name: &str, addr: SocketAddr, now: Instant, joined: u64) -> Self {
        Self {
            name: bounded_name(name),
            addr,
            muted: Vec::new(),
            last_active: now,
            awaiting_probe: false,
            probe_sent: None,
            joined,
        }
    }

    pub fn is_muted(&self, sender_name: &str) -> bool {
        self.muted.iter().any(|name| name == sender_name)
    }

    /// Adds a name to the mute list
    ///
    /// Duplicates and requests beyond [`MAX_MUTED`] entries are ignored.
    pub fn add_mute(&mut self, name: &str) {
        let name = bounded_name(name);
        if self.muted.len() >= MAX_MUTED || self.is_muted(&name) {
            return;
        }
        self.muted.push(name);
    }

    pub fn remove_mute(&mut self, name: &str) {
        let name = bounded_name(name);
        if let Some(idx) = self.muted.iter().position(|muted| *muted == name) {
            self.muted.remove(idx);
        }
    }

    /// Clears probe state after hearing from the client
    fn mark_active(&mut self, now: Instant) {
        self.last_active = now;
        self.awaiting_probe = false;
        self.probe_sent = None;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }
}

/// Registry of all live clients keyed by network address
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<SocketAddr, Client>,
    activity: ActivityHeap<SocketAddr>,
    next_join: u64,
}

impl ClientManager {
    /// Creates an empty registry whose activity heap tracks at most
    /// `max_clients` entries.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            activity: ActivityHeap::new(max_clients),
            next_join: 1,
        }
    }

    pub fn find_by_address(&self, addr: SocketAddr) -> Option<&Client> {
        self.clients.get(&addr)
    }

    /// Finds a client by display name
    ///
    /// Names may repeat; the most recently joined match wins.
    pub fn find_by_name(&self, name: &str) -> Option<&Client> {
        self.clients
            .values()
            .filter(|client| client.name == name)
            .max_by_key(|client| client.joined)
    }

    /// Registers a new client and starts tracking its activity
    ///
    /// When the activity heap is full the client is still registered but is
    /// never probed for liveness.
    pub fn insert(&mut self, name: &str, addr: SocketAddr, now: Instant) -> &Client {
        let client = Client::new(name, addr, now, self.next_join);
        self.next_join += 1;

        if !self.activity.insert(addr, now) {
            debug!("Activity heap full, {} will not be monitored", addr);
        }

        info!("Client {} connected from {}", client.name, addr);
        self.clients.entry(addr).or_insert(client)
    }

    /// Connects a client, or renames and refreshes an existing one
    ///
    /// Returns the display name stored for the client.
    pub fn connect(&mut self, name: &str, addr: SocketAddr, now: Instant) -> String {
        if let Some(client) = self.clients.get_mut(&addr) {
            client.name = bounded_name(name);
            client.last_active = now;
            info!("Client {} reconnected as {}", addr, client.name);
            let stored = client.name.clone();

            if !self.activity.update(&addr, now) && !self.activity.insert(addr, now) {
                debug!("Activity heap full, {} will not be monitored", addr);
            }
            return stored;
        }

        self.insert(name, addr, now).name.clone()
    }

    /// Removes a client from the registry and the activity heap
    pub fn remove(&mut self, addr: SocketAddr) -> Option<Client> {
        let client = self.clients.remove(&addr)?;
        self.activity.remove(&addr);
        info!("Client {} ({}) removed", client.name, addr);
        Some(client)
    }

    /// Removes the client that `find_by_name` would return
    pub fn remove_by_name(&mut self, name: &str) -> Option<Client> {
        let addr = self.find_by_name(name)?.addr;
        self.remove(addr)
    }

    /// Refreshes a client's activity and cancels any outstanding probe
    ///
    /// Returns false when no client is registered at `addr`.
    pub fn touch(&mut self, addr: SocketAddr, now: Instant) -> bool {
        match self.clients.get_mut(&addr) {
            Some(client) => {
                client.mark_active(now);
                self.activity.update(&addr, now);
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, addr: SocketAddr, new_name: &str) -> Option<&Client> {
        let client = self.clients.get_mut(&addr)?;
        let new_name = bounded_name(new_name);
        info!("Client {} renamed from {} to {}", addr, client.name, new_name);
        client.name = new_name;
        Some(client)
    }

    pub fn add_mute(&mut self, addr: SocketAddr, name: &str) -> bool {
        match self.clients.get_mut(&addr) {
            Some(client) => {
                client.add_mute(name);
                true
            }
            None => false,
        }
    }

    pub fn remove_mute(&mut self, addr: SocketAddr, name: &str) -> bool {
        match self.clients.get_mut(&addr) {
            Some(client) => {
                client.remove_mute(name);
                true
            }
            None => false,
        }
    }

    /// Returns the least recently active monitored client
    pub fn least_active(&self) -> Option<&Client> {
        self.activity
            .peek()
            .and_then(|addr| self.clients.get(&addr))
    }

    /// Marks the client at `addr` as probed
    pub fn mark_probed(&mut self, addr: SocketAddr, now: Instant) {
        if let Some(client) = self.clients.get_mut(&addr) {
            client.awaiting_probe = true;
            client.probe_sent = Some(now);
        }
    }

    /// Iterates over all registered clients in no particular order
    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn activity(&self) -> &ActivityHeap<SocketAddr> {
        &self.activity
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn test_addr3() -> SocketAddr {
        "127.0.0.2:8080".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let now = Instant::now();
        let client = Client::new("alice", test_addr(), now, 1);

        assert_eq!(client.name, "alice");
        assert_eq!(client.addr, test_addr());
        assert!(client.muted.is_empty());
        assert!(!client.awaiting_probe);
        assert!(client.probe_sent.is_none());
    }

    #[test]
    fn test_client_name_is_bounded() {
        let long = "n".repeat(200);
        let client = Client::new(&long, test_addr(), Instant::now(), 1);
        assert_eq!(client.name.len(), shared::MAX_NAME_LEN - 1);
    }

    #[test]
    fn test_mute_list_dedup_and_cap() {
        let mut client = Client::new("alice", test_addr(), Instant::now(), 1);

        client.add_mute("bob");
        client.add_mute("bob");
        assert_eq!(client.muted, vec!["bob".to_string()]);

        for i in 0..40 {
            client.add_mute(&format!("user{}", i));
        }
        assert_eq!(client.muted.len(), MAX_MUTED);
        assert!(client.is_muted("bob"));
        assert!(!client.is_muted("user39"));
    }

    #[test]
    fn test_remove_mute_preserves_order() {
        let mut client = Client::new("alice", test_addr(), Instant::now(), 1);
        client.add_mute("a");
        client.add_mute("b");
        client.add_mute("c");

        client.remove_mute("b");
        assert_eq!(client.muted, vec!["a".to_string(), "c".to_string()]);

        client.remove_mute("missing");
        assert_eq!(client.muted.len(), 2);
    }

    #[test]
    fn test_manager_creation() {
        let manager = ClientManager::new(5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
        assert_eq!(manager.activity().capacity(), 5);
    }

    #[test]
    fn test_insert_and_find() {
        let mut manager = ClientManager::new(4);
        let now = Instant::now();

        manager.insert("alice", test_addr(), now);
        manager.insert("bob", test_addr2(), now);

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.find_by_address(test_addr()).unwrap().name, "alice");
        assert_eq!(manager.find_by_name("bob").unwrap().addr, test_addr2());
        assert!(manager.find_by_address(test_addr3()).is_none());
        assert!(manager.find_by_name("carol").is_none());
    }

    #[test]
    fn test_find_by_name_prefers_latest_join() {
        let mut manager = ClientManager::new(4);
        let now = Instant::now();

        manager.insert("sam", test_addr(), now);
        manager.insert("sam", test_addr2(), now);

        assert_eq!(manager.find_by_name("sam").unwrap().addr, test_addr2());
    }

    #[test]
    fn test_registry_not_capped_by_heap() {
        let mut manager = ClientManager::new(1);
        let now = Instant::now();

        manager.insert("alice", test_addr(), now);
        manager.insert("bob", test_addr2(), now);

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.activity().len(), 1);
        assert!(!manager.activity().contains(&test_addr2()));
    }

    #[test]
    fn test_connect_existing_renames_and_refreshes() {
        let mut manager = ClientManager::new(4);
        let start = Instant::now();
        let later = start + Duration::from_secs(30);

        manager.insert("alice", test_addr(), start);
        manager.insert("bob", test_addr2(), start + Duration::from_secs(1));
        manager.connect("alicia", test_addr(), later);

        assert_eq!(manager.len(), 2);
        let client = manager.find_by_address(test_addr()).unwrap();
        assert_eq!(client.name, "alicia");
        assert_eq!(client.last_active, later);
        assert_eq!(manager.least_active().unwrap().name, "bob");
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(4);
        let now = Instant::now();
        manager.insert("alice", test_addr(), now);

        let removed = manager.remove(test_addr()).unwrap();
        assert_eq!(removed.name, "alice");
        assert!(manager.is_empty());
        assert!(manager.activity().is_empty());
        assert!(manager.remove(test_addr()).is_none());
    }

    #[test]
    fn test_remove_by_name() {
        let mut manager = ClientManager::new(4);
        let now = Instant::now();
        manager.insert("alice", test_addr(), now);
        manager.insert("bob", test_addr2(), now);

        let removed = manager.remove_by_name("bob").unwrap();
        assert_eq!(removed.addr, test_addr2());
        assert_eq!(manager.len(), 1);
        assert!(manager.remove_by_name("bob").is_none());
    }

    #[test]
    fn test_touch_clears_probe_and_rekeys() {
        let mut manager = ClientManager::new(4);
        let start = Instant::now();

        manager.insert("alice", test_addr(), start);
        manager.insert("bob", test_addr2(), start + Duration::from_secs(5));
        manager.mark_probed(test_addr(), start + Duration::from_secs(120));

        let client = manager.find_by_address(test_addr()).unwrap();
        assert!(client.awaiting_probe);

        assert!(manager.touch(test_addr(), start + Duration::from_secs(125)));
        let client = manager.find_by_address(test_addr()).unwrap();
        assert!(!client.awaiting_probe);
        assert!(client.probe_sent.is_none());
        assert_eq!(manager.least_active().unwrap().name, "bob");

        assert!(!manager.touch(test_addr3(), start));
    }

    #[test]
    fn test_rename_and_mutes_for_unknown_client() {
        let mut manager = ClientManager::new(4);
        assert!(manager.rename(test_addr(), "x").is_none());
        assert!(!manager.add_mute(test_addr(), "x"));
        assert!(!manager.remove_mute(test_addr(), "x"));
    }

    #[test]
    fn test_registry_size_tracks_distinct_addresses() {
        let mut manager = ClientManager::new(16);
        let now = Instant::now();
        let addrs: Vec<SocketAddr> = (0..6)
            .map(|i| format!("10.0.0.1:{}", 7000 + i).parse().unwrap())
            .collect();

        for addr in &addrs {
            manager.connect("user", *addr, now);
        }
        // Reconnecting from a known address does not add an entry
        manager.connect("again", addrs[0], now);
        assert_eq!(manager.len(), 6);

        manager.remove(addrs[1]);
        manager.remove(addrs[2]);
        assert_eq!(manager.len(), 4);
        assert_eq!(manager.activity().len(), 4);
    }
}
