//! Background liveness monitoring
//!
//! Once per tick the monitor looks at the least recently active client only.
//! Any other client has been heard from more recently, so it cannot be due
//! for a probe before the heap minimum is.
//!
//! Per client the monitor walks a small state machine:
//! - active: silent for `inactivity_threshold` → send `ping$`, start probing
//! - probing: any request from the client → back to active (done by the
//!   dispatcher's activity refresh)
//! - probing: no answer within `probe_timeout` → evicted and announced

use crate::broadcast::{broadcast, Outbox};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use log::{debug, info};
use shared::{inactivity_announcement, PING_MESSAGE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Outcome of one monitor tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessAction {
    /// Nothing is due
    Idle,
    /// A probe was sent to the least active client
    Probe { addr: SocketAddr, name: String },
    /// The least active client missed its probe and was removed
    Evict { addr: SocketAddr, name: String },
}

/// Evaluates the least active client and updates registry state
///
/// Must be called with exclusive access to the registry. The caller is
/// responsible for delivering the probe or announcing the eviction.
pub fn check_least_active(
    clients: &mut ClientManager,
    now: Instant,
    inactivity_threshold: Duration,
    probe_timeout: Duration,
) -> LivenessAction {
    let least = match clients.least_active() {
        Some(client) => client,
        None => return LivenessAction::Idle,
    };
    let addr = least.addr;
    let probe_sent = least.probe_sent.filter(|_| least.awaiting_probe);

    match probe_sent {
        Some(sent) => {
            if now.saturating_duration_since(sent) < probe_timeout {
                return LivenessAction::Idle;
            }
            match clients.remove(addr) {
                Some(client) => LivenessAction::Evict {
                    addr,
                    name: client.name,
                },
                None => LivenessAction::Idle,
            }
        }
        None => {
            if least.idle_for(now) < inactivity_threshold {
                return LivenessAction::Idle;
            }
            let name = least.name.clone();
            clients.mark_probed(addr, now);
            LivenessAction::Probe { addr, name }
        }
    }
}

/// Periodic task probing and evicting silent clients
pub struct LivenessMonitor {
    clients: Arc<RwLock<ClientManager>>,
    outbox: Outbox,
    inactivity_threshold: Duration,
    probe_timeout: Duration,
    tick_interval: Duration,
}

impl LivenessMonitor {
    pub fn new(clients: Arc<RwLock<ClientManager>>, outbox: Outbox, config: &ServerConfig) -> Self {
        Self {
            clients,
            outbox,
            inactivity_threshold: config.inactivity_threshold,
            probe_timeout: config.probe_timeout,
            tick_interval: config.monitor_interval,
        }
    }

    /// Runs a single monitor step at time `now`
    pub async fn tick(&self, now: Instant) -> LivenessAction {
        let action = {
            let mut clients = self.clients.write().await;
            check_least_active(
                &mut clients,
                now,
                self.inactivity_threshold,
                self.probe_timeout,
            )
        };

        // The write lock is released here; broadcast takes a read lock
        match &action {
            LivenessAction::Idle => {}
            LivenessAction::Probe { addr, name } => {
                info!("Probing inactive client {} ({})", name, addr);
                self.outbox.send(*addr, PING_MESSAGE);
            }
            LivenessAction::Evict { addr, name } => {
                info!("Evicting {} ({}): no reply to probe", name, addr);
                broadcast(&self.clients, &self.outbox, None, &inactivity_announcement(name))
                    .await;
            }
        }

        action
    }

    /// Ticks repeatedly at `now` while clients keep getting evicted
    ///
    /// An eviction exposes a new heap minimum that may be overdue as well.
    pub async fn sweep(&self, now: Instant) -> Vec<LivenessAction> {
        let mut actions = Vec::new();
        loop {
            let action = self.tick(now).await;
            let evicted = matches!(action, LivenessAction::Evict { .. });
            actions.push(action);
            if !evicted {
                return actions;
            }
        }
    }

    /// Ticks until the running flag is cleared
    pub async fn run(self, mut running: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while *running.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(Instant::now()).await;
                }
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Liveness monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Datagram;
    use tokio::sync::mpsc;

    const THRESHOLD: Duration = Duration::from_secs(120);
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn secs(base: Instant, n: u64) -> Instant {
        base + Duration::from_secs(n)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Datagram>) -> Vec<Datagram> {
        let mut out = Vec::new();
        while let Ok(datagram) = rx.try_recv() {
            out.push(datagram);
        }
        out
    }

    #[test]
    fn test_empty_registry_is_idle() {
        let mut manager = ClientManager::new(4);
        let action = check_least_active(&mut manager, Instant::now(), THRESHOLD, TIMEOUT);
        assert_eq!(action, LivenessAction::Idle);
    }

    #[test]
    fn test_recent_client_is_not_probed() {
        let base = Instant::now();
        let mut manager = ClientManager::new(4);
        manager.insert("alice", addr(1), base);

        let action = check_least_active(&mut manager, secs(base, 119), THRESHOLD, TIMEOUT);
        assert_eq!(action, LivenessAction::Idle);
    }

    #[test]
    fn test_probe_sent_exactly_once() {
        let base = Instant::now();
        let mut manager = ClientManager::new(4);
        manager.insert("alice", addr(1), base);

        let action = check_least_active(&mut manager, secs(base, 120), THRESHOLD, TIMEOUT);
        assert_eq!(
            action,
            LivenessAction::Probe {
                addr: addr(1),
                name: "alice".to_string()
            }
        );
        let client = manager.find_by_address(addr(1)).unwrap();
        assert!(client.awaiting_probe);
        assert_eq!(client.probe_sent, Some(secs(base, 120)));

        for t in 121..130 {
            let action = check_least_active(&mut manager, secs(base, t), THRESHOLD, TIMEOUT);
            assert_eq!(action, LivenessAction::Idle);
        }
    }

    #[test]
    fn test_eviction_after_probe_timeout() {
        let base = Instant::now();
        let mut manager = ClientManager::new(4);
        manager.insert("alice", addr(1), base);
        manager.insert("bob", addr(2), secs(base, 100));

        check_least_active(&mut manager, secs(base, 120), THRESHOLD, TIMEOUT);
        let action = check_least_active(&mut manager, secs(base, 130), THRESHOLD, TIMEOUT);

        assert_eq!(
            action,
            LivenessAction::Evict {
                addr: addr(1),
                name: "alice".to_string()
            }
        );
        assert!(manager.find_by_address(addr(1)).is_none());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.least_active().unwrap().name, "bob");
    }

    #[test]
    fn test_reply_cancels_eviction() {
        let base = Instant::now();
        let mut manager = ClientManager::new(4);
        manager.insert("alice", addr(1), base);

        check_least_active(&mut manager, secs(base, 120), THRESHOLD, TIMEOUT);
        manager.touch(addr(1), secs(base, 125));

        let action = check_least_active(&mut manager, secs(base, 140), THRESHOLD, TIMEOUT);
        assert_eq!(action, LivenessAction::Idle);
        assert_eq!(manager.len(), 1);

        // Silent again for a full threshold: probed a second time
        let action = check_least_active(&mut manager, secs(base, 245), THRESHOLD, TIMEOUT);
        assert!(matches!(action, LivenessAction::Probe { .. }));
    }

    #[tokio::test]
    async fn test_tick_sends_probe_and_announces_eviction() {
        let base = Instant::now();
        let mut manager = ClientManager::new(4);
        manager.insert("alice", addr(1), base);
        manager.insert("bob", addr(2), secs(base, 115));
        let clients = Arc::new(RwLock::new(manager));

        let (outbox, mut rx) = Outbox::channel();
        let monitor = LivenessMonitor::new(Arc::clone(&clients), outbox, &ServerConfig::default());

        monitor.tick(secs(base, 120)).await;
        let sent = drain(&mut rx);
        assert_eq!(
            sent,
            vec![Datagram {
                addr: addr(1),
                text: "ping$".to_string()
            }]
        );

        monitor.tick(secs(base, 125)).await;
        assert!(drain(&mut rx).is_empty());

        let action = monitor.tick(secs(base, 130)).await;
        assert!(matches!(action, LivenessAction::Evict { .. }));

        let sent = drain(&mut rx);
        assert_eq!(
            sent,
            vec![Datagram {
                addr: addr(2),
                text: "alice has been removed due to inactivity".to_string()
            }]
        );
        assert_eq!(clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_checks_next_client_after_eviction() {
        let base = Instant::now();
        let mut manager = ClientManager::new(4);
        manager.insert("alice", addr(1), base);
        manager.insert("bob", addr(2), secs(base, 1));
        let clients = Arc::new(RwLock::new(manager));

        let (outbox, mut rx) = Outbox::channel();
        let monitor = LivenessMonitor::new(Arc::clone(&clients), outbox, &ServerConfig::default());

        let actions = monitor.sweep(secs(base, 120)).await;
        assert_eq!(
            actions,
            vec![LivenessAction::Probe {
                addr: addr(1),
                name: "alice".to_string()
            }]
        );

        // alice times out and bob is already overdue: both happen in one sweep
        let actions = monitor.sweep(secs(base, 130)).await;
        assert_eq!(
            actions,
            vec![
                LivenessAction::Evict {
                    addr: addr(1),
                    name: "alice".to_string()
                },
                LivenessAction::Probe {
                    addr: addr(2),
                    name: "bob".to_string()
                },
            ]
        );

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].text, "alice has been removed due to inactivity");
        assert_eq!(sent[2].text, "ping$");

        let actions = monitor.sweep(secs(base, 140)).await;
        assert_eq!(actions.len(), 2);
        assert!(clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_when_flag_cleared() {
        let clients = Arc::new(RwLock::new(ClientManager::new(4)));
        let (outbox, _rx) = Outbox::channel();
        let config = ServerConfig {
            monitor_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        let monitor = LivenessMonitor::new(clients, outbox, &config);

        let (running_tx, running_rx) = watch::channel(true);
        let handle = tokio::spawn(monitor.run(running_rx));

        running_tx.send(false).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        let joined = tokio_test::assert_ok!(result);
        assert!(joined.is_ok());
    }
}
