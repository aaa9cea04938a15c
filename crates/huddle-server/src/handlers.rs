//! HTTP and WebSocket handlers for the Huddle server.
//!
//! The upgrade endpoint registers a client with the hub and hands the socket
//! to the connection pumps. The remaining routes expose hub state.

use crate::auth::{IdentityProvider, TrustedHeaderIdentity};
use crate::config::Config;
use crate::error::{ok, ApiBody, ApiError};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{future, SinkExt, StreamExt};
use huddle_core::{direct_room, validate_room_id, Hub, HubError, HubHandle, RoomId};
use huddle_transport::{websocket, Connection, PumpConfig, TransportError, WireFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the running hub.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Config,
    /// Resolves the verified user of a request.
    pub identity: Arc<dyn IdentityProvider>,
    pump: PumpConfig,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, hub: HubHandle, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            hub,
            pump: config.pump_config(),
            config,
            identity,
        }
    }
}

/// Query parameters of the upgrade endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ChatParams {
    /// Room to join.
    pub room_id: Option<String>,
    /// Peer user id; joins the direct room shared with that user.
    pub peer: Option<String>,
}

/// Members of a room.
#[derive(Debug, Serialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub client_count: usize,
    pub clients: Vec<String>,
}

/// Hub-wide counts.
#[derive(Debug, Serialize)]
pub struct HubSummary {
    pub room_count: usize,
    pub client_count: usize,
}

/// Result of a logout.
#[derive(Debug, Serialize)]
pub struct Logout {
    pub disconnected: usize,
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.websocket.path, get(ws_handler))
        .route("/api/ws/room/:room_id", get(room_info_handler))
        .route("/api/ws/stats", get(stats_handler))
        .route("/api/ws/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let identity = Arc::new(TrustedHeaderIdentity::new(&config.auth.user_header)?);
    let hub = Hub::spawn(config.hub_config());

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
        metrics::spawn_hub_sampler(hub.clone());
    }

    let state = Arc::new(AppState::new(config.clone(), hub, identity));
    let app = build_router(state);

    // Bind and serve
    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, config.websocket.path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Pick the room a connection joins.
fn resolve_room(user_id: &str, params: &ChatParams) -> Result<RoomId, ApiError> {
    if let Some(room) = params.room_id.as_deref().filter(|r| !r.is_empty()) {
        validate_room_id(room).map_err(HubError::InvalidRoom)?;
        return Ok(room.to_string());
    }

    match params.peer.as_deref().map(str::trim) {
        Some(peer) if !peer.is_empty() => {
            let room = direct_room(user_id, peer);
            validate_room_id(&room).map_err(HubError::InvalidRoom)?;
            Ok(room)
        }
        _ => Err(ApiError::BadRequest("room_id is required".into())),
    }
}

/// Check identity, room and hub before upgrading.
async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    params: &ChatParams,
) -> Result<(String, RoomId), ApiError> {
    let user_id = state.identity.verify(headers).await?;
    let room = resolve_room(&user_id, params)?;
    if state.hub.is_closed() {
        return Err(ApiError::Unavailable);
    }
    Ok((user_id, room))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChatParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let (user_id, room) = match admit(&state, &headers, &params).await {
        Ok(admitted) => admitted,
        Err(e) => {
            debug!(error = %e, "Upgrade rejected");
            metrics::record_error("upgrade_rejected");
            return Err(e);
        }
    };

    debug!(user = %user_id, room = %room, "Upgrading connection");
    Ok(ws
        .max_message_size(state.config.websocket.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, user_id, room))
        .into_response())
}

/// Attach an upgraded socket to the hub.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, user_id: String, room: RoomId) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let session = match state.hub.join(user_id.clone(), room.clone()).await {
        Ok(session) => session,
        Err(e) => {
            error!(user = %user_id, room = %room, error = %e, "Failed to join hub");
            metrics::record_error("join");
            return;
        }
    };

    let key = session.key;
    debug!(client = %key, user = %user_id, room = %room, "WebSocket connected");

    let (sink, stream) = websocket::split(socket);
    let sink = sink.with(|frame: WireFrame| {
        if let WireFrame::Text(text) = &frame {
            metrics::record_message(text.len(), "outbound");
        }
        future::ready(Ok::<_, TransportError>(frame))
    });
    let stream = stream.inspect(|item| match item {
        Ok(WireFrame::Text(text)) => metrics::record_message(text.len(), "inbound"),
        Ok(WireFrame::Binary(data)) => metrics::record_message(data.len(), "inbound"),
        Ok(_) => {}
        Err(_) => metrics::record_error("websocket"),
    });

    let connection = Connection::new(session, state.hub.clone(), state.pump.clone());
    let reason = connection.run(sink, stream).await;

    debug!(client = %key, user = %user_id, reason = %reason, "WebSocket disconnected");
}

/// Members of a room.
async fn room_info_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<ApiBody<RoomInfo>>, ApiError> {
    state.identity.verify(&headers).await?;

    let clients = state.hub.roster(&room_id);
    Ok(ok(RoomInfo {
        room_id,
        client_count: clients.len(),
        clients,
    }))
}

/// Hub-wide counts.
async fn stats_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiBody<HubSummary>>, ApiError> {
    state.identity.verify(&headers).await?;

    let stats = state.hub.stats();
    Ok(ok(HubSummary {
        room_count: stats.room_count,
        client_count: stats.client_count,
    }))
}

/// Close every connection of the calling user.
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiBody<Logout>>, ApiError> {
    let user_id = state.identity.verify(&headers).await?;

    let disconnected = state.hub.disconnect_user(&user_id);
    if disconnected > 0 {
        info!(user = %user_id, connections = disconnected, "User logged out");
    } else {
        warn!(user = %user_id, "Logout without open connections");
    }

    Ok(ok(Logout { disconnected }))
}
