use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};
use kernel::MAX_RANGE_SIZE;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
mod copy;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod ranges;
pub mod sqlite;
pub mod validation;

use crate::config::ServerConfig;
use crate::domain::{Storage, StorageError};
use crate::sqlite::{Mode, Sqlite};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared by every handler and by background copy tasks.
pub struct AppState {
    pub db: PathBuf,
    pub copy_delay: Duration,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_shares,
        handlers::get_service_properties,
        handlers::set_service_properties,
        handlers::create_share,
        handlers::get_share,
        handlers::delete_share,
        handlers::set_share_quota,
        handlers::get_share_metadata,
        handlers::set_share_metadata,
        handlers::get_share_stats,
        handlers::create_directory,
        handlers::get_directory,
        handlers::delete_directory,
        handlers::get_directory_metadata,
        handlers::set_directory_metadata,
        handlers::list_directory,
        handlers::create_file,
        handlers::download_file,
        handlers::delete_file,
        handlers::get_file_properties,
        handlers::set_file_headers,
        handlers::get_file_metadata,
        handlers::set_file_metadata,
        handlers::upload_range,
        handlers::clear_range,
        handlers::list_ranges,
        handlers::start_copy,
        handlers::abort_copy,
    ),
    components(schemas(
        kernel::ShareItem,
        kernel::ShareProperties,
        kernel::ShareStats,
        kernel::CreateShareRequest,
        kernel::QuotaRequest,
        kernel::MetadataBody,
        kernel::DirectoryProperties,
        kernel::ItemKind,
        kernel::ListItem,
        kernel::ListPage,
        kernel::FileHeaders,
        kernel::FileProperties,
        kernel::CreateFileRequest,
        kernel::FileRange,
        kernel::CopySource,
        kernel::CopyState,
        kernel::CopyStatus,
        kernel::StartCopyRequest,
        kernel::ServiceProperties,
        kernel::MetricsProperties,
        kernel::MetricsLevel,
        kernel::ErrorBody,
        kernel::ErrorCode,
    )),
    tags(
        (name = "service", description = "Account level settings"),
        (name = "shares", description = "Share management"),
        (name = "directories", description = "Directory management and listing"),
        (name = "files", description = "File management"),
        (name = "ranges", description = "Sparse range I/O"),
        (name = "copy", description = "Server-side copy"),
    )
)]
pub struct ApiDoc;

pub async fn run() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "server=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            return;
        }
    };

    let db = config.database_path();
    if let Err(e) = init_database(&db) {
        tracing::error!("database {} cannot be initialized: {e}", db.display());
        return;
    }

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("port {} cannot be bound: {e}", config.port);
            return;
        }
    };
    tracing::debug!("listening on {}", config.port);

    if let Err(e) = serve(listener, &config, shutdown_signal()).await {
        tracing::error!("server error: {e}");
    }
}

/// Creates the schema when missing. Safe to call on an existing database.
pub fn init_database(db: &std::path::Path) -> Result<(), StorageError> {
    if let Some(dir) = db.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Sqlite::open(db, Mode::ReadWrite)?.new_database()
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState {
        db: config.database_path(),
        copy_delay: config.copy_delay,
    };
    let app = create_routes(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/:account", get(handlers::list_shares))
        .route(
            "/api/:account/properties",
            get(handlers::get_service_properties).put(handlers::set_service_properties),
        )
        .route(
            "/api/:account/shares/:share",
            put(handlers::create_share)
                .get(handlers::get_share)
                .delete(handlers::delete_share),
        )
        .route(
            "/api/:account/shares/:share/quota",
            put(handlers::set_share_quota),
        )
        .route(
            "/api/:account/shares/:share/metadata",
            get(handlers::get_share_metadata).put(handlers::set_share_metadata),
        )
        .route(
            "/api/:account/shares/:share/stats",
            get(handlers::get_share_stats),
        )
        .route(
            "/api/:account/shares/:share/directory",
            put(handlers::create_directory)
                .get(handlers::get_directory)
                .delete(handlers::delete_directory),
        )
        .route(
            "/api/:account/shares/:share/directory/metadata",
            get(handlers::get_directory_metadata).put(handlers::set_directory_metadata),
        )
        .route(
            "/api/:account/shares/:share/list",
            get(handlers::list_directory),
        )
        .route(
            "/api/:account/shares/:share/file",
            put(handlers::create_file)
                .get(handlers::download_file)
                .delete(handlers::delete_file),
        )
        .route(
            "/api/:account/shares/:share/file/properties",
            get(handlers::get_file_properties).put(handlers::set_file_headers),
        )
        .route(
            "/api/:account/shares/:share/file/metadata",
            get(handlers::get_file_metadata).put(handlers::set_file_metadata),
        )
        .route(
            "/api/:account/shares/:share/file/range",
            put(handlers::upload_range).delete(handlers::clear_range),
        )
        .route(
            "/api/:account/shares/:share/file/ranges",
            get(handlers::list_ranges),
        )
        .route(
            "/api/:account/shares/:share/file/copy",
            put(handlers::start_copy).delete(handlers::abort_copy),
        )
        .with_state(Arc::new(state));

    // Range bodies are capped by the handler; the layer only guards against
    // clients streaming far more than one range.
    let body_limit = usize::try_from(2 * MAX_RANGE_SIZE).unwrap_or(usize::MAX);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit))
                .into_inner(),
        )
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
