//! Server configuration

use shared::{ADMIN_PORT, DEFAULT_SERVER_PORT};
use std::time::Duration;

/// Runtime settings for a chat server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub bind_addr: String,
    /// Source port whose requests are allowed to kick users
    pub admin_port: u16,
    /// Silence after which a client gets probed
    pub inactivity_threshold: Duration,
    /// How long a probed client has to answer
    pub probe_timeout: Duration,
    /// How often the liveness monitor wakes up
    pub monitor_interval: Duration,
    /// Number of chat lines replayed to joining clients
    pub history_size: usize,
    /// Upper bound on clients tracked for liveness
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_SERVER_PORT),
            admin_port: ADMIN_PORT,
            inactivity_threshold: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(10),
            monitor_interval: Duration::from_secs(1),
            history_size: 15,
            max_clients: 100,
        }
    }
}

impl ServerConfig {
    /// Default settings bound to the given address
    pub fn with_bind_addr(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    /// Rejects settings the liveness monitor cannot run with
    pub fn validate(&self) -> Result<(), String> {
        let durations = [
            ("inactivity threshold", self.inactivity_threshold),
            ("probe timeout", self.probe_timeout),
            ("monitor interval", self.monitor_interval),
        ];

        for (what, value) in durations {
            if value.is_zero() {
                return Err(format!("{} must be greater than zero", what));
            }
        }
        Ok(())
    }
}
