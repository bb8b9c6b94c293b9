use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use futures::{SinkExt, StreamExt};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::metrics::RelayMetrics;
use crate::registry::Registry;
use crate::router;
use crate::session::{self, Session, SessionMap};

/// Shared handles every request and socket task works against. The registry
/// is the only source of truth for who is online; the session map carries
/// per-socket state keyed by connection id.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<Registry>,
    pub sessions: SessionMap,
    pub metrics: Arc<RelayMetrics>,
    pub config: ServerConfig,
}

pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    sessions: SessionMap,
    metrics: Arc<RelayMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let registry = Arc::new(Registry::new());
        let sessions = Arc::new(dashmap::DashMap::new());
        let metrics = Arc::new(RelayMetrics::new()?);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            sessions,
            metrics,
            shutdown_tx,
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let state = RelayState {
            registry: self.registry.clone(),
            sessions: self.sessions.clone(),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        };

        let app = Router::new()
            .route("/ws", axum::routing::get(ws_handler))
            .route("/health", axum::routing::get(get_health))
            .route("/metrics", axum::routing::get(get_metrics))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state);

        let shutdown_rx = self.shutdown_tx.subscribe();

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("signal-relay listening on {}", self.config.bind_addr);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(Self::shutdown_signal(shutdown_rx))
            .await?;

        Ok(())
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<RelayState>,
) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// One task per socket. Inbound frames are routed in arrival order; outbound
/// traffic goes through an unbounded queue drained by a writer task, so the
/// router never waits on a slow receiver.
async fn handle_socket(socket: WebSocket, state: RelayState, addr: SocketAddr) {
    let conn = session::next_conn_id();
    state.sessions.insert(conn, Session::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    debug!(conn, %addr, "socket connected");
    let _ = tx.send(crate::protocol::ServerMessage::Connect {
        message: state.config.greeting.clone(),
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => router::handle(&state, conn, &tx, &raw),
            Ok(Message::Binary(bytes)) => {
                // JSON only; binary frames take the same parse path.
                let raw = String::from_utf8(bytes.to_vec()).unwrap_or_default();
                router::handle(&state, conn, &tx, &raw);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong are answered by axum
            Err(e) => {
                debug!(conn, error = %e, "socket error");
                break;
            }
        }
    }

    session::handle_disconnect(&state, conn);
    drop(tx);
    let _ = writer.await;
    debug!(conn, "socket closed");
}

// GET /health
async fn get_health(State(state): State<RelayState>) -> Response {
    use serde_json::json;

    let response = json!({
        "status": "healthy",
        "active_users": state.registry.len(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, axum::Json(response)).into_response()
}

// GET /metrics
async fn get_metrics(State(state): State<RelayState>) -> Response {
    let prometheus = state.metrics.export_prometheus();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus,
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::registry::OutboundSender;
    use crate::session::ConnId;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub fn test_state() -> RelayState {
        RelayState {
            registry: Arc::new(Registry::new()),
            sessions: Arc::new(dashmap::DashMap::new()),
            metrics: Arc::new(RelayMetrics::new().unwrap()),
            config: ServerConfig::default(),
        }
    }

    /// Stand-in for an upgraded socket: a fresh conn id, its session entry
    /// and both ends of the outbound queue.
    pub fn connect(state: &RelayState) -> (ConnId, OutboundSender, UnboundedReceiver<ServerMessage>) {
        let conn = session::next_conn_id();
        state.sessions.insert(conn, Session::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (conn, tx, rx)
    }

    pub fn login(state: &RelayState, conn: ConnId, tx: &OutboundSender, name: &str) {
        router::handle(
            state,
            conn,
            tx,
            &format!(r#"{{"type":"login","name":"{name}"}}"#),
        );
    }

    #[test]
    fn server_construction_validates_config() {
        assert!(RelayServer::new(ServerConfig::default()).is_ok());

        let bad = ServerConfig { max_message_size: 0, ..Default::default() };
        assert!(RelayServer::new(bad).is_err());
    }
}
