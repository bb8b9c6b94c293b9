//! Rendezvous relay for two-party session negotiation.
//!
//! Clients claim a name over a WebSocket, see a roster of everyone else
//! online, and exchange opaque offer/answer/candidate payloads with one
//! named counterpart until they can talk directly. The relay routes and
//! forgets; it never inspects payloads and keeps no state beyond the live
//! connections.

pub mod config;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

#[cfg(test)]
mod registry_props;

pub use server::RelayServer;
