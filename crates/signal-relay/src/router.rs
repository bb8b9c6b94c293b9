//! Inbound message dispatch.
//!
//! One entry point, [`handle`], called once per received frame. Routing runs
//! to completion without suspending: registry access is a short critical
//! section and every outbound send is a fire-and-forget push onto the
//! recipient's queue.

use tracing::{debug, info};

use crate::protocol::{self, ClientMessage, ServerMessage, UserEntry};
use crate::registry::{OutboundSender, RegistryError, UserHandle};
use crate::server::RelayState;
use crate::session::ConnId;

/// Route one raw frame from `conn`. Malformed input and unknown types
/// produce an error reply to the sender only; nothing here can fail the
/// connection.
pub fn handle(state: &RelayState, conn: ConnId, tx: &OutboundSender, raw: &str) {
    debug!(conn, msg = raw, "received message");

    match protocol::parse_client_message(raw) {
        Ok(ClientMessage::Login { name }) => handle_login(state, conn, tx, name),
        Ok(ClientMessage::Offer { name, offer }) => handle_offer(state, conn, name, offer),
        Ok(ClientMessage::Answer { name, answer }) => handle_answer(state, conn, name, answer),
        Ok(ClientMessage::Candidate { name, candidate }) => {
            handle_candidate(state, name, candidate)
        }
        Ok(ClientMessage::Leave { name }) => handle_leave(state, name),
        Err(declared) => {
            state.metrics.errors_total.inc();
            debug!(conn, declared = %declared, "unknown command");
            let _ = tx.send(ServerMessage::Error {
                message: format!("Command not found: {declared}"),
            });
        }
    }
}

fn handle_login(state: &RelayState, conn: ConnId, tx: &OutboundSender, name: String) {
    let handle = UserHandle { conn, tx: tx.clone() };
    match state.registry.register(&name, handle) {
        Err(RegistryError::NameTaken) => {
            state.metrics.login_failures_total.inc();
            info!(name = %name, conn, "login rejected: name taken");
            let _ = tx.send(ServerMessage::Login {
                success: false,
                message: Some("Username is unavailable".to_string()),
                users: None,
            });
        }
        Ok(roster) => {
            if let Some(mut session) = state.sessions.get_mut(&conn) {
                session.name = Some(name.clone());
            }
            state.metrics.logins_total.inc();
            state.metrics.active_users.set(state.registry.len() as f64);
            info!(name = %name, conn, "user logged in");

            let users = roster
                .into_iter()
                .map(|user_name| UserEntry { user_name })
                .collect();
            let _ = tx.send(ServerMessage::Login {
                success: true,
                message: None,
                users: Some(users),
            });
            broadcast_roster(state);
        }
    }
}

/// Push a fresh roster to every registered connection, each excluding its
/// own name.
fn broadcast_roster(state: &RelayState) {
    for (name, tx) in state.registry.roster_targets() {
        let users = state
            .registry
            .snapshot_names(&name)
            .into_iter()
            .map(|user_name| UserEntry { user_name })
            .collect();
        let _ = tx.send(ServerMessage::UpdateUsers { users });
    }
}

fn handle_offer(state: &RelayState, conn: ConnId, target: String, offer: serde_json::Value) {
    let Some(recipient) = state.registry.lookup(&target) else {
        return drop_for_unknown(state, "offer", &target);
    };

    // The initiating side records its counterpart; the recipient's slot is
    // left alone until it answers.
    let from = state.sessions.get_mut(&conn).map(|mut session| {
        session.peer_name = Some(target.clone());
        session.name.clone()
    });

    state.metrics.messages_forwarded_total.inc();
    debug!(target = %target, "forwarding offer");
    let _ = recipient.tx.send(ServerMessage::Offer {
        offer,
        name: from.flatten(),
    });
}

fn handle_answer(state: &RelayState, conn: ConnId, target: String, answer: serde_json::Value) {
    let Some(recipient) = state.registry.lookup(&target) else {
        return drop_for_unknown(state, "answer", &target);
    };

    if let Some(mut session) = state.sessions.get_mut(&conn) {
        session.peer_name = Some(target.clone());
    }

    state.metrics.messages_forwarded_total.inc();
    debug!(target = %target, "forwarding answer");
    let _ = recipient.tx.send(ServerMessage::Answer { answer });
}

fn handle_candidate(state: &RelayState, target: String, candidate: serde_json::Value) {
    let Some(recipient) = state.registry.lookup(&target) else {
        return drop_for_unknown(state, "candidate", &target);
    };

    state.metrics.messages_forwarded_total.inc();
    let _ = recipient.tx.send(ServerMessage::Candidate { candidate });
}

/// `target` is whatever peer name the sender declares, not a registry-
/// verified relation; clearing the recipient's slot from here is part of
/// the protocol's asymmetric bookkeeping.
fn handle_leave(state: &RelayState, target: String) {
    let Some(recipient) = state.registry.lookup(&target) else {
        return drop_for_unknown(state, "leave", &target);
    };

    if let Some(mut session) = state.sessions.get_mut(&recipient.conn) {
        session.peer_name = None;
    }

    state.metrics.messages_forwarded_total.inc();
    debug!(target = %target, "forwarding leave");
    let _ = recipient.tx.send(ServerMessage::Leave);
}

// Unknown recipients are dropped without telling the sender. Login is the
// only operation with an explicit failure reply; see the protocol notes in
// the crate docs before changing this.
fn drop_for_unknown(state: &RelayState, kind: &str, target: &str) {
    state.metrics.messages_dropped_total.inc();
    debug!(kind, target = %target, "dropped: unknown recipient");
}
