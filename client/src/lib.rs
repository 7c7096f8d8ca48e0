//! # Chat Client Library
//!
//! Line-mode front end for the UDP chat relay. Every line typed on stdin is
//! sent to the server verbatim as a `<command>$<content>` request, and every
//! datagram from the server is printed with a `[SERVER]` prefix.
//!
//! ## Liveness Probes
//!
//! The server probes quiet clients with `ping$`. The client answers these
//! with `ret-ping$` on its own and does not print them, so an idle but
//! running client is never evicted.
//!
//! ## Admin Mode
//!
//! The server only honors `kick` requests that come from its admin source
//! port. Binding the client to that port (see the `--admin` flag of the
//! binary) is all it takes to act as the administrator.

pub mod network;
