//! # Chat Relay Server Library
//!
//! This library provides a connectionless chat relay over UDP. A single
//! server tracks a dynamic set of named clients, routes broadcast and direct
//! messages between them, honors per-client mute lists, replays recent chat
//! to newly joined clients and evicts clients that stop answering.
//!
//! ## Core Responsibilities
//!
//! ### Client Tracking
//! Clients are identified by their peer address (IP and port). The first
//! `conn` request from an unseen address registers a client; every later
//! request from that address counts as proof of life, whatever the command.
//!
//! ### Message Routing
//! `say` messages fan out to every registered client except those who muted
//! the sender, and are kept in a bounded replay buffer. `sayto` messages go
//! to a single named client and are never replayed. System announcements
//! (kicks, evictions) reach everyone.
//!
//! ### Liveness
//! A background task watches the least recently active client. After a
//! period of silence it sends a `ping$` probe; if the probe goes unanswered
//! the client is removed and the removal is announced.
//!
//! ## Architecture Design
//!
//! ### Tasks
//! - **Network Receiver**: reads datagrams and forwards them to the run loop
//! - **Run Loop**: handles one request at a time through the [`dispatcher`]
//! - **Network Sender**: drains the outbound queue onto the socket
//! - **Liveness Monitor**: ticks once per interval, see [`liveness`]
//!
//! ### Shared State
//! The client registry and its activity heap form one aggregate behind a
//! single `tokio::sync::RwLock`. Lookups and fan-out take the read side,
//! every mutation takes the write side. The replay buffer belongs to the run
//! loop and needs no lock.
//!
//! ### Delivery
//! Delivery is best effort. Datagrams lost on the network are not retried,
//! and a failed write to one client never stops a broadcast to the others.
//!
//! ## Security Considerations
//!
//! `kick` is honored only when it arrives from the configured admin source
//! port. The port is not a credential: any peer that can bind it can kick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new(ServerConfig::with_bind_addr("0.0.0.0:12000")).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod activity_heap;
pub mod broadcast;
pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod history;
pub mod liveness;
pub mod network;
