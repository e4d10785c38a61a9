use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use woz_store::SessionStore;

use crate::client::{self, ClientId, ClientRegistry};
use crate::config::ServerConfig;
use crate::http;
use crate::router::{self, RouterState};
use crate::rpc::ClientFrame;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
    pub max_payload_bytes: usize,
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    match config
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(http::health))
        .route("/session/create", post(http::create_session))
        .route("/session/{id}/state", get(http::session_state))
        .route("/session/{id}/reset", post(http::reset_session))
        .route("/session/{id}/export.csv", get(http::export_csv))
        .route("/sessions", get(http::list_sessions))
        .layer(DefaultBodyLimit::max(config.max_payload_bytes))
        .layer(cors_layer(config))
        .with_state(state)
}

/// Create and start the server. Returns a handle that keeps its
/// background tasks alive.
pub async fn start(
    config: ServerConfig,
    store: Arc<SessionStore>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    let _cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        std::time::Duration::from_secs(60),
    );

    let (message_tx, message_rx) = mpsc::channel::<(ClientId, String)>(1024);

    let router_state = Arc::new(RouterState::new(Arc::clone(&store), Arc::clone(&registry)));
    let frames_handle = tokio::spawn(process_frames(message_rx, router_state));

    let app_state = AppState {
        store,
        registry,
        message_tx,
        max_payload_bytes: config.max_payload_bytes,
    };

    let app = build_router(app_state, &config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Relay server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _frames: frames_handle,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _frames: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler. The message-size cap is the transport
/// layer's enforcement of the payload limit.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let ws = ws.max_message_size(state.max_payload_bytes);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    client::handle_ws_connection(socket, client_id, rx, state.registry, state.message_tx).await;
}

/// Process inbound frames from all WebSocket clients, one at a time.
///
/// The single consumer is what serializes protocol operations: an event
/// is fully handled, broadcasts enqueued, before the next is dequeued.
async fn process_frames(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<RouterState>,
) {
    while let Some((client_id, raw)) = rx.recv().await {
        let frame: ClientFrame = match serde_json::from_str(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "unparseable frame dropped");
                continue;
            }
        };

        if let Some(ack) = router::dispatch(&state, &client_id, frame) {
            if let Ok(json) = serde_json::to_string(&ack) {
                state.registry.send_to(&client_id, json);
            }
        }
    }
}
