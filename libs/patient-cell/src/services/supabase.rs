use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{ChangePasswordRequest, Patient, PatientError, PatientPayload};
use crate::services::password::{hash_password, rehash_for_change};
use crate::services::{caller_email, PatientService};

const PATIENTS_PATH: &str = "/rest/v1/patients";

#[derive(Debug, Deserialize)]
struct CredentialRow {
    id: i64,
    password_hash: Option<String>,
}

fn store_error(err: anyhow::Error) -> PatientError {
    PatientError::DatabaseError(err.to_string())
}

fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<SupabaseError>(), Some(SupabaseError::Conflict(_)))
}

/// Patient store backed by the PostgREST `patients` table.
pub struct SupabasePatientService {
    supabase: SupabaseClient,
    api_token: String,
}

impl SupabasePatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            api_token: config.supabase_anon_key.clone(),
        }
    }

    async fn select_rows<T: serde::de::DeserializeOwned>(&self, query: &str) -> Result<Vec<T>, PatientError> {
        let path = format!("{}?{}", PATIENTS_PATH, query);
        self.supabase
            .request(Method::GET, &path, Some(&self.api_token), None)
            .await
            .map_err(store_error)
    }

    async fn email_owner(&self, email: &str) -> Result<Option<i64>, PatientError> {
        let rows: Vec<CredentialRow> = self
            .select_rows(&format!("select=id&email=eq.{}", urlencoding::encode(email)))
            .await?;
        Ok(rows.first().map(|row| row.id))
    }

    fn row_body(payload: &PatientPayload, email: &str) -> serde_json::Map<String, Value> {
        let mut body = serde_json::Map::new();
        body.insert("first_name".to_string(), json!(payload.first_name.trim()));
        body.insert("last_name".to_string(), json!(payload.last_name.trim()));
        body.insert("email".to_string(), json!(email));
        body.insert("phone_number".to_string(), json!(payload.phone_number));
        body.insert("date_of_birth".to_string(), json!(payload.date_of_birth));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        body
    }

    async fn write_rows(&self, method: Method, query: &str, body: Option<Value>) -> Result<Vec<Patient>, anyhow::Error> {
        let path = match query {
            "" => PATIENTS_PATH.to_string(),
            query => format!("{}?{}", PATIENTS_PATH, query),
        };

        self.supabase
            .request_with_headers(
                method,
                &path,
                Some(&self.api_token),
                body,
                Some(SupabaseClient::return_representation()),
            )
            .await
    }
}

#[async_trait]
impl PatientService for SupabasePatientService {
    async fn list(&self) -> Result<Vec<Patient>, PatientError> {
        let rows: Vec<Patient> = self.select_rows("select=*&order=id.asc").await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: i64) -> Result<Patient, PatientError> {
        debug!("Fetching patient {}", id);

        let rows: Vec<Patient> = self.select_rows(&format!("select=*&id=eq.{}", id)).await?;
        rows.into_iter()
            .next()
            .ok_or(PatientError::NotFound(id))
    }

    async fn create(&self, payload: PatientPayload) -> Result<Patient, PatientError> {
        let email = payload.normalized_email();
        debug!("Creating new patient for: {}", email);

        if self.email_owner(&email).await?.is_some() {
            return Err(PatientError::EmailAlreadyExists { email });
        }

        let password = payload
            .password
            .as_deref()
            .ok_or_else(|| PatientError::ValidationError("password is required".to_string()))?;

        let mut body = Self::row_body(&payload, &email);
        body.insert("password_hash".to_string(), json!(hash_password(password)?));
        body.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));

        let rows = self
            .write_rows(Method::POST, "", Some(Value::Object(body)))
            .await
            .map_err(|e| {
                if is_conflict(&e) {
                    PatientError::EmailAlreadyExists { email: email.clone() }
                } else {
                    store_error(e)
                }
            })?;

        let patient = rows
            .into_iter()
            .next()
            .ok_or_else(|| PatientError::DatabaseError("Insert returned no rows".to_string()))?;

        debug!("Patient created with ID: {}", patient.id);
        Ok(patient)
    }

    async fn update(&self, id: i64, payload: PatientPayload) -> Result<Patient, PatientError> {
        debug!("Updating patient {}", id);

        self.get_by_id(id).await?;

        let email = payload.normalized_email();
        if matches!(self.email_owner(&email).await?, Some(owner) if owner != id) {
            return Err(PatientError::EmailAlreadyExists { email });
        }

        let mut body = Self::row_body(&payload, &email);
        if let Some(password) = payload.password.as_deref() {
            body.insert("password_hash".to_string(), json!(hash_password(password)?));
        }

        let rows = self
            .write_rows(Method::PATCH, &format!("id=eq.{}", id), Some(Value::Object(body)))
            .await
            .map_err(|e| {
                if is_conflict(&e) {
                    PatientError::EmailAlreadyExists { email: email.clone() }
                } else {
                    store_error(e)
                }
            })?;

        rows.into_iter()
            .next()
            .ok_or(PatientError::NotFound(id))
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), PatientError> {
        debug!("Deleting patient {}", id);

        let rows = self
            .write_rows(Method::DELETE, &format!("id=eq.{}", id), None)
            .await
            .map_err(store_error)?;

        if rows.is_empty() {
            return Err(PatientError::NotFound(id));
        }
        Ok(())
    }

    async fn change_password(&self, request: ChangePasswordRequest, caller: &User) -> Result<(), PatientError> {
        let email = caller_email(caller)?;

        let rows: Vec<CredentialRow> = self
            .select_rows(&format!("select=id,password_hash&email=eq.{}", urlencoding::encode(&email)))
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| PatientError::Unauthorized("No patient matches the authenticated caller".to_string()))?;

        let stored_hash = row
            .password_hash
            .ok_or_else(|| PatientError::DatabaseError(format!("Patient {} has no stored password", row.id)))?;
        let new_hash = rehash_for_change(&request, &stored_hash)?;

        let body = json!({
            "password_hash": new_hash,
            "updated_at": Utc::now().to_rfc3339()
        });
        self.write_rows(Method::PATCH, &format!("id=eq.{}", row.id), Some(body))
            .await
            .map_err(store_error)?;

        debug!("Changed password for patient {}", row.id);
        Ok(())
    }
}
