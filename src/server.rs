use axum::{
    extract::{ws::{WebSocket, WebSocketUpgrade}, Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::connection::Endpoint;
use crate::hooks::Hook;
use crate::hub::Hub;

/// Room relay server
///
/// # Flexible mounting
/// ```no_run
/// use physalia::Server;
/// use axum::Router;
///
/// // Option 1: `/ws/{room}/{secret}`, `/games` and `/health` at the root
/// let app = Server::new().into_router();
///
/// // Option 2: same routes under a prefix
/// let app = Server::new().into_router_at("/relay");
///
/// // Option 3: compose with other routes
/// let server = Server::new();
/// let hub = server.hub();
/// let app = Router::new()
///     .merge(server.into_router_at("/relay"))
///     .route("/rooms/count", axum::routing::get(move || {
///         let hub = hub.clone();
///         async move { hub.list_room_ids().await.len().to_string() }
///     }));
/// ```
#[derive(Clone)]
pub struct Server {
    hub: Hub,
    config: Arc<Config>,
}

#[derive(Serialize)]
struct GamesResponse {
    games: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    games: usize,
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// `config` is used as given; check it with [`Config::validate`] first.
    pub fn with_config(config: Config) -> Self {
        Self::with_hooks(config, vec![])
    }

    pub fn with_hooks(config: Config, hooks: Vec<Box<dyn Hook>>) -> Self {
        let config = Arc::new(config);
        let hub = Hub::with_hooks(Arc::clone(&config), hooks);
        Self { hub, config }
    }

    /// Get a hub handle for use in other HTTP handlers
    pub fn hub(&self) -> Hub {
        self.hub.clone()
    }

    pub fn into_router(self) -> Router {
        self.into_router_at("")
    }

    /// Mount the WebSocket and status routes under `prefix`.
    pub fn into_router_at(self, prefix: &str) -> Router {
        let prefix = prefix.trim_end_matches('/');
        Router::new()
            .route(&format!("{prefix}/ws/{{room}}/{{secret}}"), get(ws_handler))
            .route(&format!("{prefix}/games"), get(list_games))
            .route(&format!("{prefix}/health"), get(health))
            .with_state(self)
    }

    /// Start the server on the given address
    pub async fn serve(self, addr: &str) -> io::Result<()> {
        let app = self.into_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, app).await
    }

    /// Resolve the room and hand the socket to a new endpoint. Any failure
    /// just drops the socket; the peer is not told why.
    async fn accept(self, socket: WebSocket, room_id: String, secret: String) {
        let room = match self.hub.create_or_join_room(&room_id, &secret).await {
            Ok(room) => room,
            Err(err) => {
                info!(room = %room_id, error = %err, "admission rejected");
                return;
            }
        };
        let (sink, stream) = socket.split();
        match Endpoint::new(room, Arc::clone(&self.config)).connect(&self.hub, stream, sink).await {
            Ok(client) => debug!(room = %room_id, %client, "endpoint started"),
            Err(err) => info!(room = %room_id, error = %err, "admission rejected"),
        }
    }
}

impl Default for Server { fn default() -> Self { Self::new() } }

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(server): State<Server>,
    Path((room, secret)): Path<(String, String)>,
) -> Response {
    let max_message_size = server.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| server.accept(socket, room, secret))
}

async fn list_games(State(server): State<Server>) -> Json<GamesResponse> {
    let games = server.hub.list_room_ids().await;
    info!(?games, "current games");
    Json(GamesResponse { games })
}

async fn health(State(server): State<Server>) -> Json<HealthResponse> {
    let games = server.hub.list_room_ids().await;
    info!(total = games.len(), ?games, "health check");
    Json(HealthResponse { status: "ok", games: games.len() })
}
