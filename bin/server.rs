// MST Integration Engine - Web Server
// REST API with Axum over the synchronous pipeline

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use mst_integration::{
    IntegrationConfig, IntegrationEngine, IntegrationError, SessionStatistics, View, VERSION,
};
use serde::{Deserialize, Serialize};
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<IntegrationEngine>,
    stats: Arc<SessionStatistics>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    fn failed(kind: &'static str, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_kind: Some(kind),
        }
    }
}

#[derive(Deserialize)]
struct ViewQuery {
    view: Option<String>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(Health {
        status: "OK",
        version: VERSION,
    }))
}

/// GET /api/mst/:mst?view= - Run the integration pipeline for one MST
async fn get_mst(
    State(state): State<AppState>,
    Path(mst): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Response {
    let view = match query.view.as_deref().map(str::parse::<View>).transpose() {
        Ok(view) => view.unwrap_or_default(),
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::failed("invalid_view", message)),
            )
                .into_response()
        }
    };

    let worker = state.clone();
    let joined = tokio::task::spawn_blocking(move || {
        worker.engine.process(&mst, &worker.stats, view)
    })
    .await;

    match joined {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(ApiResponse::ok(outcome.to_json(view)))).into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(join_err) => {
            error!(error = %join_err, "pipeline task failed");
            error_response(&IntegrationError::Internal(join_err.to_string()))
        }
    }
}

/// GET /api/stats - Session statistics
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.stats.snapshot()))
}

fn error_response(err: &IntegrationError) -> Response {
    let status = if err.is_user_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::<()>::failed(err.kind(), err.to_string()))).into_response()
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/mst/:mst", get(get_mst))
        .route("/stats", get(get_stats))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mst_integration=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("🌐 MST Integration Engine - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match std::env::var_os("MST_CONFIG") {
        Some(path) => IntegrationConfig::load(std::path::Path::new(&path)),
        None => Ok(IntegrationConfig::default()),
    };

    // The blocking HTTP clients must be built outside the async runtime
    let engine = match config.and_then(|c| IntegrationEngine::from_config(&c)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::from(mst_integration::exit_codes::EXIT_INTERNAL_FAULT);
        }
    };

    let state = AppState {
        engine: Arc::new(engine),
        stats: Arc::new(SessionStatistics::new()),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {}", e);
            return ExitCode::from(mst_integration::exit_codes::EXIT_INTERNAL_FAULT);
        }
    };

    let addr = std::env::var("MST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let served = runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        println!("\n🚀 Server running on http://{}", addr);
        println!("   API: http://{}/api/mst/0101234567?view=summary", addr);
        println!("\n   Press Ctrl+C to stop\n");
        info!(%addr, "listening");

        axum::serve(listener, router(state)).await
    });

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Server error: {}", e);
            ExitCode::from(mst_integration::exit_codes::EXIT_INTERNAL_FAULT)
        }
    }
}
