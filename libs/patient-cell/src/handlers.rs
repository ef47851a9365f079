use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{ValidatedJson, ValidatedPath};

use crate::models::{ChangePasswordRequest, NewPatient, Patient, PatientPayload};
use crate::services::SharedPatientService;

#[axum::debug_handler]
pub async fn list_patients(
    State(service): State<SharedPatientService>,
) -> Result<Json<Vec<Patient>>, AppError> {
    let patients = service.list().await?;
    debug!("Listing {} patients", patients.len());
    Ok(Json(patients))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(service): State<SharedPatientService>,
    ValidatedPath(patient_id): ValidatedPath<i64>,
) -> Result<Json<Patient>, AppError> {
    let patient = service.get_by_id(patient_id).await?;
    Ok(Json(patient))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(service): State<SharedPatientService>,
    ValidatedJson(NewPatient(payload)): ValidatedJson<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    let patient = service.create(payload).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(service): State<SharedPatientService>,
    ValidatedPath(patient_id): ValidatedPath<i64>,
    ValidatedJson(payload): ValidatedJson<PatientPayload>,
) -> Result<Json<Patient>, AppError> {
    let patient = service.update(patient_id, payload).await?;
    Ok(Json(patient))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(service): State<SharedPatientService>,
    ValidatedPath(patient_id): ValidatedPath<i64>,
) -> Result<StatusCode, AppError> {
    service.delete_by_id(patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Runs behind the auth middleware, which supplies the caller.
#[axum::debug_handler]
pub async fn change_password(
    State(service): State<SharedPatientService>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    service.change_password(request, &user).await?;
    Ok(StatusCode::OK)
}
