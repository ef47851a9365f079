use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use patient_cell::{create_patient_router, SharedPatientService};
use shared_config::AppConfig;

pub const PATIENTS_BASE_PATH: &str = "/api/v1/patients";

pub fn create_router(config: Arc<AppConfig>, patient_service: SharedPatientService) -> Router {
    // Any origin may call the API
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Patient API is running!" }))
        .nest(PATIENTS_BASE_PATH, create_patient_router(patient_service, config))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
}
