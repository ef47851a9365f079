pub mod memory;
pub mod password;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use shared_config::{AppConfig, PatientStoreKind};
use shared_models::auth::User;

use crate::models::{ChangePasswordRequest, Patient, PatientError, PatientPayload};

pub use memory::InMemoryPatientService;
pub use supabase::SupabasePatientService;

/// Patient lifecycle operations consumed by the HTTP handlers.
///
/// Implementations own consistency of the underlying store; handlers call
/// exactly one method per request.
#[async_trait]
pub trait PatientService: Send + Sync {
    async fn list(&self) -> Result<Vec<Patient>, PatientError>;

    async fn get_by_id(&self, id: i64) -> Result<Patient, PatientError>;

    async fn create(&self, payload: PatientPayload) -> Result<Patient, PatientError>;

    /// Replaces the mutable attributes of an existing patient.
    async fn update(&self, id: i64, payload: PatientPayload) -> Result<Patient, PatientError>;

    async fn delete_by_id(&self, id: i64) -> Result<(), PatientError>;

    /// Changes the password of the patient the caller authenticated as.
    async fn change_password(&self, request: ChangePasswordRequest, caller: &User) -> Result<(), PatientError>;
}

pub type SharedPatientService = Arc<dyn PatientService>;

/// Email claim that ties a caller to a patient record.
pub(crate) fn caller_email(caller: &User) -> Result<String, PatientError> {
    caller
        .email
        .as_deref()
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .ok_or_else(|| PatientError::Unauthorized("Token does not identify a patient".to_string()))
}

pub fn build_patient_service(config: &AppConfig) -> SharedPatientService {
    match config.patient_store {
        PatientStoreKind::Supabase if config.is_supabase_configured() => {
            info!("Using Supabase patient store at {}", config.supabase_url);
            Arc::new(SupabasePatientService::new(config))
        }
        PatientStoreKind::Supabase => {
            warn!("PATIENT_STORE=supabase but Supabase is not configured, falling back to memory");
            Arc::new(InMemoryPatientService::new())
        }
        PatientStoreKind::Memory => {
            info!("Using in-memory patient store");
            Arc::new(InMemoryPatientService::new())
        }
    }
}
