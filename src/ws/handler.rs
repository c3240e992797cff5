//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use super::session::Session;
use crate::app_state::AppState;
use crate::domain::OutboundPort;
use crate::error::GatewayError;

/// `GET <ws_path_prefix>...` — upgrade to a counting websocket session.
///
/// A plain HTTP request on this path is not ours to answer and gets the
/// same 404 as any unknown route.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
    State(state): State<AppState>,
) -> Response {
    let Ok(ws) = ws else {
        return GatewayError::NotFound(uri.path().to_string()).into_response();
    };
    ws.on_upgrade(move |socket| serve_socket(socket, client, state))
}

async fn serve_socket(socket: WebSocket, client: SocketAddr, state: AppState) {
    let (sink, stream) = socket.split();
    let port = Arc::new(OutboundPort::new(sink));
    let summary = Session::new(state.registry, port, state.settings.farewell_timeout)
        .with_client(client)
        .run(stream)
        .await;
    tracing::debug!(conn_id = %summary.id, reason = ?summary.reason, "ws session finished");
}
