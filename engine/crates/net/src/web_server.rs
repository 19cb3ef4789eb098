use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use session::SessionId;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::{ServeDir, ServeFile};

use crate::channels::{NetHandles, NetToTick, RegisterSession, SessionWriteRx};
use crate::protocol::{parse_client_message, ServerMessage};
use crate::rate_limiter::{
    CommandThrottle, ConnectionLimiter, ConnectionSlot, RateLimitConfig, SharedLimiter,
};

/// How long a closing session may take to flush its final frames.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub addr: String,
    /// Served with SPA fallback to index.html when present.
    pub static_dir: Option<PathBuf>,
    pub limits: RateLimitConfig,
}

/// Shared state for the axum WebSocket handler.
#[derive(Clone)]
struct AppState {
    next_session_id: Arc<AtomicU64>,
    handles: NetHandles,
    limiter: SharedLimiter,
    limits: RateLimitConfig,
}

/// Serve on an already-bound listener until the shutdown flag flips to true.
/// The `/ws` route handles WebSocket upgrades.
pub async fn serve_on_listener(
    listener: TcpListener,
    config: WebServerConfig,
    handles: NetHandles,
    shutdown_rx: Option<watch::Receiver<bool>>,
) -> Result<(), std::io::Error> {
    let state = AppState {
        next_session_id: Arc::new(AtomicU64::new(1)),
        handles,
        limiter: ConnectionLimiter::shared(config.limits.clone()),
        limits: config.limits,
    };

    let mut app = Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state);

    if let Some(dir) = config.static_dir {
        let index_path = dir.join("index.html");
        let serve_dir = ServeDir::new(&dir).not_found_service(ServeFile::new(index_path));
        app = app.fallback_service(serve_dir);
        tracing::info!(dir = %dir.display(), "serving static files");
    }

    tracing::info!(addr = %listener.local_addr()?, "web server listening");

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let serve = axum::serve(listener, service);
    match shutdown_rx {
        Some(mut rx) => serve
            .with_graceful_shutdown(async move {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
                tracing::info!("web server shutting down gracefully");
            })
            .await
            .map_err(std::io::Error::other),
        None => serve.await.map_err(std::io::Error::other),
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let slot = match ConnectionSlot::acquire(&state.limiter, peer.ip()) {
        Ok(slot) => slot,
        Err(reason) => {
            tracing::warn!(%peer, %reason, "connection rejected");
            return (StatusCode::SERVICE_UNAVAILABLE, reason.to_string()).into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, slot, peer))
}

async fn handle_ws_connection(
    socket: WebSocket,
    state: AppState,
    _slot: ConnectionSlot,
    peer: SocketAddr,
) {
    let session_id = SessionId(state.next_session_id.fetch_add(1, Ordering::Relaxed));
    tracing::info!(?session_id, %peer, "new WebSocket connection");

    let (mut ws_writer, mut ws_reader) = socket.split();
    let (write_tx, mut write_rx): (_, SessionWriteRx) = tokio::sync::mpsc::unbounded_channel();
    // Weak, so the router dropping its sender after a final frame closes the socket.
    let local_tx = write_tx.downgrade();

    let _ = state.handles.register_tx.send(RegisterSession {
        session_id,
        write_tx,
    });
    let _ = state
        .handles
        .player_tx
        .send(NetToTick::NewConnection { session_id });

    // Ends once every sender is gone, after flushing what was queued.
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = write_rx.recv().await {
            if ws_writer.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = ws_writer.send(Message::Close(None)).await;
    });

    let mut throttle = CommandThrottle::new(state.limits.max_commands_per_second);
    while let Some(result) = ws_reader.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !throttle.try_consume() {
                    tracing::debug!(?session_id, "command throttled");
                    continue;
                }
                match parse_client_message(text.as_str(), state.limits.max_input_length) {
                    Ok(request) => {
                        let _ = state.handles.player_tx.send(NetToTick::Message {
                            session_id,
                            request,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(?session_id, error = %e, "protocol violation, closing");
                        if let Some(tx) = local_tx.upgrade() {
                            let _ = tx.send(ServerMessage::error(e.to_string()).to_json());
                        }
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(?session_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    let _ = state
        .handles
        .player_tx
        .send(NetToTick::Disconnected { session_id });
    let _ = state.handles.unregister_tx.send(session_id);

    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer_handle)
        .await
        .is_err()
    {
        tracing::debug!(?session_id, "writer did not flush in time");
    }
    tracing::info!(?session_id, "WebSocket session ended");
}
