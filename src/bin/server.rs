use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sheet_optimizer::{CancelToken, Error, Optimized, Optimizer, OptimizerConfig, Part, SheetType};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize, Serialize)]
struct OptimizeRequest {
    parts: Vec<Part>,
    sheets: Vec<SheetType>,
    #[serde(default)]
    config: OptimizerConfig,
}

const MAX_POPULATION: usize = 500;
const MAX_GENERATIONS: usize = 5_000;
/// Applied when the request sets no time limit, and the most it may ask for.
const MAX_TIME_LIMIT_MS: u64 = 30_000;

/// Rejects requests that would tie up a blocking thread for too long and
/// caps the run time.
fn bounded(mut config: OptimizerConfig) -> Result<OptimizerConfig, String> {
    if config.population_size > MAX_POPULATION {
        return Err(format!(
            "population size must be at most {MAX_POPULATION}, got {}",
            config.population_size
        ));
    }
    if config.generations > MAX_GENERATIONS {
        return Err(format!(
            "generations must be at most {MAX_GENERATIONS}, got {}",
            config.generations
        ));
    }
    config.time_limit_ms = Some(
        config
            .time_limit_ms
            .map_or(MAX_TIME_LIMIT_MS, |ms| ms.min(MAX_TIME_LIMIT_MS)),
    );
    Ok(config)
}

/// Stops the run once the request is gone, e.g. when the client hangs up.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Unpackable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    }
}

async fn optimize_handler(
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<Optimized>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /optimize"
    );

    let config = bounded(req.config).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let optimizer = Optimizer::new(config).map_err(|e| (status_for(&e), e.to_string()))?;
    let _guard = CancelOnDrop(optimizer.cancel_token());

    let (parts, sheets) = (req.parts, req.sheets);
    let result = tokio::task::spawn_blocking(move || optimizer.run(&parts, &sheets))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    result
        .map(Json)
        .map_err(|e| (status_for(&e), e.to_string()))
}

#[tokio::main]
async fn main() {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/optimize", post(optimize_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}
