use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;
use crate::services::SharedPatientService;

/// Routes relative to the patients base path. Only the password change
/// requires a bearer token.
pub fn create_patient_router(service: SharedPatientService, config: Arc<AppConfig>) -> Router {
    let change_password_route =
        patch(change_password).route_layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .route(
            "/",
            get(list_patients)
                .post(create_patient)
                .merge(change_password_route),
        )
        .route(
            "/{id}",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .with_state(service)
}
