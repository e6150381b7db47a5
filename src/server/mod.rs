pub mod assets;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};
use tokio::sync::watch;

use crate::media::Transcoder;
use crate::store::MediaStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MediaStore>,
    pub transcoder: Arc<Transcoder>,
}

/// Run the HTTP server.
pub async fn run_server(
    addr: SocketAddr,
    store: Arc<MediaStore>,
    transcoder: Arc<Transcoder>,
    max_upload_bytes: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState { store, transcoder };

    let app = Router::new()
        .route("/", get(routes::index))
        .route("/compress", get(routes::compress_page).post(routes::compress))
        .route("/convert", get(routes::convert_page).post(routes::convert))
        .route("/merge", get(routes::merge_page).post(routes::merge))
        .route("/download/{filename}", get(routes::download))
        .route("/static/{*path}", get(routes::static_asset))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
