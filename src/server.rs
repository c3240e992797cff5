//! Serving the router until a stop signal, then draining.
//!
//! When `signal` resolves, readiness is withdrawn first so `/ready` answers
//! 503 for as long as axum's graceful phase keeps in-flight requests alive.
//! Once the listener is gone the [`Lifecycle`] shutdown drains every
//! websocket still open.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::lifecycle::{Lifecycle, ShutdownReport};

/// Serves `app` on `listener` until `signal` resolves, then shuts `lifecycle`
/// down.
///
/// # Errors
///
/// Returns the I/O error that ended the accept loop, if any. The lifecycle
/// is still shut down in that case.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    lifecycle: Lifecycle,
    signal: F,
) -> std::io::Result<ShutdownReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let readiness = lifecycle.readiness_token();
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        signal.await;
        readiness.cancel();
        tracing::info!("stop requested, readiness withdrawn");
    })
    .await;

    let report = lifecycle.shutdown().await;
    served.map(|()| report)
}
