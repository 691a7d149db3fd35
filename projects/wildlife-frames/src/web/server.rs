use crate::relabel::RelabelSession;
use crate::web::api::{get_frame, get_frame_image, index_handler, post_event, RelabelState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: Arc<RelabelState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/frame", get(get_frame))
        .route("/api/frame/image", get(get_frame_image))
        .route("/api/event/:event", post(post_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves one relabel session until the process is stopped. Toggles that
/// were never saved are lost with the session.
pub async fn run_relabel_server(
    host: IpAddr,
    port: u16,
    session: RelabelSession,
    dataset_dir: PathBuf,
    ledger_path: PathBuf,
) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port.wrapping_add(1);
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    };

    let video_name = session.video_name().to_string();
    let state = Arc::new(RelabelState {
        session: Mutex::new(session),
        dataset_dir,
        ledger_path,
    });

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Relabeling {} on http://{:?}",
        video_name,
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, router(state)).await?;

    Ok(())
}
