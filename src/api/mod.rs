//! Router composition: websocket upgrades, system endpoints and fallback.

pub mod handlers;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the full router. Websocket upgrades are accepted at
/// `ws_path_prefix` and anything below it; every other unknown path falls
/// through to the 404 handler.
///
/// `ws_path_prefix` must start and end with `/`
/// (see [`crate::config::normalize_prefix`]).
pub fn build_router(ws_path_prefix: &str) -> Router<AppState> {
    let mut router = Router::new().merge(handlers::system::routes());
    if ws_path_prefix != "/" {
        router = router.route(ws_path_prefix, get(ws_handler));
    }
    router
        .route(&format!("{ws_path_prefix}{{*rest}}"), get(ws_handler))
        .fallback(handlers::system::not_found_handler)
}
