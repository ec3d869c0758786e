//! Helpers shared by the HTTP client tests.

use std::net::SocketAddr;

use axum::Router;

/// Serve `app` on an ephemeral localhost port.
pub(crate) async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
