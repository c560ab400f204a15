use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_assignment_routes;
use assignment_engine::config::AppConfig;
use assignment_engine::error::AppError;
use assignment_engine::telemetry;
use assignment_engine::workflows::assignments::{AssignmentServices, Database};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.database.take() {
        config.database.path = path;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let db = Database::open(&config.database)?;
    info!(
        path = %config.database.path,
        schema_version = ?db.schema_version()?,
        "assignment database opened"
    );
    let services = AssignmentServices::new(db, &config.reports);

    let app = with_assignment_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "faculty assignment engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
