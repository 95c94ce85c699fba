use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::meet::{MeetingProvider, UnconfiguredProvider, ZoomClient};
use parley_api::middleware::require_auth;
use parley_api::{connections, credits, files, meetings, messages, threads};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    if jwt_secret == "dev-secret-change-me" {
        warn!("PARLEY_JWT_SECRET not set; using the development secret");
    }
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let upload_dir = std::env::var("PARLEY_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = parley_db::Database::open(&PathBuf::from(&db_path))?;

    // Meeting provider
    let meet: Arc<dyn MeetingProvider> = match ZoomClient::from_env() {
        Some(client) => Arc::new(client),
        None => {
            info!("Meeting provider credentials not set; meeting creation will be rejected");
            Arc::new(UnconfiguredProvider)
        }
    };

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        upload_dir: PathBuf::from(upload_dir),
        meet,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/threads", get(threads::list_threads))
        .route("/threads/{thread_id}/messages", get(messages::poll_messages))
        .route("/threads/{thread_id}/meeting", post(meetings::create_or_reuse_meeting))
        .route("/messages", post(messages::send_message))
        .route("/connections", get(connections::list_connections))
        .route("/connections/{receiver_id}", post(connections::send_connection_request))
        .route("/connections/{request_id}/respond", post(connections::respond_connection_request))
        .route("/credits", get(credits::get_credits))
        .route("/files", post(files::upload_file))
        .route("/files/{file_id}", get(files::download_file))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
