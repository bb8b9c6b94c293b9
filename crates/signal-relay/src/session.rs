//! Per-connection session state and disconnect handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::protocol::ServerMessage;
use crate::server::RelayState;

pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Ephemeral per-socket state. `name` is set once login succeeds and is
/// immutable afterwards; `peer_name` tracks the counterpart this side last
/// sent an offer or answer to.
///
/// The peer bookkeeping is deliberately asymmetric, matching the historical
/// protocol: only the side that initiates an offer or answer records its
/// counterpart, and `leave` clears the *target's* slot using whatever name
/// the sender supplied. Stale values on one side of a pair are expected and
/// harmless; `peer_name` is advisory, used only for the close notification.
#[derive(Debug, Default, Clone)]
pub struct Session {
    pub name: Option<String>,
    pub peer_name: Option<String>,
}

/// Side-table of live sessions keyed by connection identity.
pub type SessionMap = Arc<DashMap<ConnId, Session>>;

/// Transport-close cleanup. Removing the session first makes the cleanup
/// run at most once even if called again for the same id. Only sockets that
/// completed login have registry state to tear down.
pub fn handle_disconnect(state: &RelayState, conn: ConnId) {
    let Some((_, session)) = state.sessions.remove(&conn) else {
        return;
    };
    state.metrics.disconnects_total.inc();

    let Some(name) = session.name else {
        debug!(conn, "anonymous socket closed");
        return;
    };

    state.registry.remove(&name);
    state.metrics.active_users.set(state.registry.len() as f64);
    info!(name = %name, conn, "user disconnected");

    if let Some(peer_name) = session.peer_name {
        if let Some(peer) = state.registry.lookup(&peer_name) {
            if let Some(mut peer_session) = state.sessions.get_mut(&peer.conn) {
                peer_session.peer_name = None;
            }
            debug!(name = %name, peer = %peer_name, "notifying peer of disconnect");
            let _ = peer.tx.send(ServerMessage::Leave);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::{connect, login, test_state};
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn disconnect_removes_name_and_notifies_peer() {
        let state = test_state();
        let (alice, alice_tx, mut alice_rx) = connect(&state);
        let (bob, bob_tx, mut bob_rx) = connect(&state);
        login(&state, alice, &alice_tx, "alice");
        login(&state, bob, &bob_tx, "bob");
        // Both sides negotiated at some point and recorded each other.
        state.sessions.get_mut(&bob).unwrap().peer_name = Some("alice".into());
        state.sessions.get_mut(&alice).unwrap().peer_name = Some("bob".into());
        while bob_rx.try_recv().is_ok() {}
        while alice_rx.try_recv().is_ok() {}

        handle_disconnect(&state, bob);

        assert!(state.registry.lookup("bob").is_none());
        assert_eq!(state.registry.len(), 1);
        assert_eq!(alice_rx.try_recv().unwrap(), ServerMessage::Leave);
        assert_eq!(alice_rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(state.sessions.get(&alice).unwrap().peer_name, None);
    }

    #[test]
    fn disconnect_before_login_leaves_registry_alone() {
        let state = test_state();
        let (alice, alice_tx, _alice_rx) = connect(&state);
        login(&state, alice, &alice_tx, "alice");
        let (anon, _anon_tx, _anon_rx) = connect(&state);

        handle_disconnect(&state, anon);

        assert_eq!(state.registry.len(), 1);
        assert!(state.sessions.get(&anon).is_none());
    }

    #[test]
    fn disconnect_runs_cleanup_exactly_once() {
        let state = test_state();
        let (alice, alice_tx, mut alice_rx) = connect(&state);
        let (bob, bob_tx, _bob_rx) = connect(&state);
        login(&state, alice, &alice_tx, "alice");
        login(&state, bob, &bob_tx, "bob");
        state.sessions.get_mut(&bob).unwrap().peer_name = Some("alice".into());
        while alice_rx.try_recv().is_ok() {}

        handle_disconnect(&state, bob);
        handle_disconnect(&state, bob);

        assert_eq!(alice_rx.try_recv().unwrap(), ServerMessage::Leave);
        assert_eq!(alice_rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn disconnect_with_departed_peer_is_silent() {
        let state = test_state();
        let (alice, alice_tx, _alice_rx) = connect(&state);
        login(&state, alice, &alice_tx, "alice");
        state.sessions.get_mut(&alice).unwrap().peer_name = Some("ghost".into());

        handle_disconnect(&state, alice);

        assert!(state.registry.is_empty());
    }
}
