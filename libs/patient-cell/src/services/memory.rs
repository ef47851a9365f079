use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use shared_models::auth::User;

use crate::models::{ChangePasswordRequest, Patient, PatientError, PatientPayload};
use crate::services::password::{hash_password, rehash_for_change};
use crate::services::{caller_email, PatientService};

struct StoredPatient {
    patient: Patient,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    patients: BTreeMap<i64, StoredPatient>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.patients
            .values()
            .any(|stored| stored.patient.email == email && Some(stored.patient.id) != except)
    }
}

/// Process-local store. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct InMemoryPatientService {
    inner: RwLock<Inner>,
}

impl InMemoryPatientService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatientService for InMemoryPatientService {
    async fn list(&self) -> Result<Vec<Patient>, PatientError> {
        let inner = self.inner.read().await;
        Ok(inner.patients.values().map(|stored| stored.patient.clone()).collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Patient, PatientError> {
        let inner = self.inner.read().await;
        inner
            .patients
            .get(&id)
            .map(|stored| stored.patient.clone())
            .ok_or(PatientError::NotFound(id))
    }

    async fn create(&self, payload: PatientPayload) -> Result<Patient, PatientError> {
        let email = payload.normalized_email();
        let password = payload
            .password
            .as_deref()
            .ok_or_else(|| PatientError::ValidationError("password is required".to_string()))?;
        let password_hash = hash_password(password)?;

        let mut inner = self.inner.write().await;
        if inner.email_taken(&email, None) {
            return Err(PatientError::EmailAlreadyExists { email });
        }

        inner.next_id += 1;
        let now = Utc::now();
        let patient = Patient {
            id: inner.next_id,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email,
            phone_number: payload.phone_number,
            date_of_birth: payload.date_of_birth,
            created_at: now,
            updated_at: now,
        };

        debug!("Created patient {} ({})", patient.id, patient.full_name());
        inner.patients.insert(
            patient.id,
            StoredPatient {
                patient: patient.clone(),
                password_hash,
            },
        );

        Ok(patient)
    }

    async fn update(&self, id: i64, payload: PatientPayload) -> Result<Patient, PatientError> {
        let email = payload.normalized_email();
        let password_hash = payload.password.as_deref().map(hash_password).transpose()?;

        let mut inner = self.inner.write().await;
        if !inner.patients.contains_key(&id) {
            return Err(PatientError::NotFound(id));
        }
        if inner.email_taken(&email, Some(id)) {
            return Err(PatientError::EmailAlreadyExists { email });
        }

        let stored = inner.patients.get_mut(&id).ok_or(PatientError::NotFound(id))?;
        stored.patient.first_name = payload.first_name.trim().to_string();
        stored.patient.last_name = payload.last_name.trim().to_string();
        stored.patient.email = email;
        stored.patient.phone_number = payload.phone_number;
        stored.patient.date_of_birth = payload.date_of_birth;
        stored.patient.updated_at = Utc::now();
        if let Some(hash) = password_hash {
            stored.password_hash = hash;
        }

        debug!("Updated patient {}", id);
        Ok(stored.patient.clone())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), PatientError> {
        let mut inner = self.inner.write().await;
        if inner.patients.remove(&id).is_none() {
            return Err(PatientError::NotFound(id));
        }

        debug!("Deleted patient {}", id);
        Ok(())
    }

    async fn change_password(&self, request: ChangePasswordRequest, caller: &User) -> Result<(), PatientError> {
        let email = caller_email(caller)?;

        let (id, verified_hash) = {
            let inner = self.inner.read().await;
            let stored = inner
                .patients
                .values()
                .find(|stored| stored.patient.email == email)
                .ok_or_else(|| PatientError::Unauthorized("No patient matches the authenticated caller".to_string()))?;
            (stored.patient.id, stored.password_hash.clone())
        };

        // Argon2 runs without holding the store lock.
        let new_hash = rehash_for_change(&request, &verified_hash)?;

        let mut inner = self.inner.write().await;
        let stored = inner
            .patients
            .get_mut(&id)
            .filter(|stored| stored.patient.email == email)
            .ok_or_else(|| PatientError::Unauthorized("No patient matches the authenticated caller".to_string()))?;

        if stored.password_hash != verified_hash {
            return Err(PatientError::CredentialsChanged);
        }

        stored.password_hash = new_hash;
        stored.patient.updated_at = Utc::now();

        debug!("Changed password for patient {}", stored.patient.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    use crate::services::password::verify_password;

    fn payload(email: &str) -> PatientPayload {
        PatientPayload {
            first_name: "Ana".to_string(),
            last_name: "Rojas".to_string(),
            email: email.to_string(),
            phone_number: None,
            date_of_birth: None,
            password: Some("initial-password".to_string()),
        }
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let service = InMemoryPatientService::new();
        let first = service.create(payload("a@example.com")).await.unwrap();
        let second = service.create(payload("b@example.com")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        service.delete_by_id(2).await.unwrap();
        let third = service.create(payload("c@example.com")).await.unwrap();
        assert_eq!(third.id, 3);

        let ids: Vec<i64> = service.list().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn rejects_duplicate_email() {
        let service = InMemoryPatientService::new();
        service.create(payload("dup@example.com")).await.unwrap();

        let result = service.create(payload("DUP@example.com")).await;
        assert_matches!(result, Err(PatientError::EmailAlreadyExists { .. }));
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_identity_and_creation_time() {
        let service = InMemoryPatientService::new();
        let created = service.create(payload("ana@example.com")).await.unwrap();

        let mut changes = payload("ana.rojas@example.com");
        changes.first_name = "Anita".to_string();
        changes.password = None;
        let updated = service.update(created.id, changes).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.first_name, "Anita");
        assert_eq!(updated.email, "ana.rojas@example.com");
    }

    #[tokio::test]
    async fn update_unknown_id_mutates_nothing() {
        let service = InMemoryPatientService::new();
        service.create(payload("ana@example.com")).await.unwrap();

        let result = service.update(42, payload("other@example.com")).await;
        assert_matches!(result, Err(PatientError::NotFound(42)));
        assert_eq!(service.list().await.unwrap()[0].email, "ana@example.com");
    }

    #[tokio::test]
    async fn change_password_for_caller() {
        let service = InMemoryPatientService::new();
        service.create(payload("ana@example.com")).await.unwrap();
        let caller = TestUser::patient("ana@example.com").to_user();

        let wrong = ChangePasswordRequest {
            current_password: "not-the-password".to_string(),
            new_password: "replacement-pw".to_string(),
            confirmation_password: "replacement-pw".to_string(),
        };
        assert_matches!(
            service.change_password(wrong, &caller).await,
            Err(PatientError::WrongPassword)
        );

        let right = ChangePasswordRequest {
            current_password: "initial-password".to_string(),
            new_password: "replacement-pw".to_string(),
            confirmation_password: "replacement-pw".to_string(),
        };
        service.change_password(right, &caller).await.unwrap();

        let inner = service.inner.read().await;
        let stored = inner.patients.get(&1).unwrap();
        assert!(verify_password("replacement-pw", &stored.password_hash).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn change_password_does_not_block_readers() {
        let service = Arc::new(InMemoryPatientService::new());
        service.create(payload("ana@example.com")).await.unwrap();
        let caller = TestUser::patient("ana@example.com").to_user();

        let changing = {
            let service = service.clone();
            tokio::spawn(async move {
                let request = ChangePasswordRequest {
                    current_password: "initial-password".to_string(),
                    new_password: "replacement-pw".to_string(),
                    confirmation_password: "replacement-pw".to_string(),
                };
                service.change_password(request, &caller).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let listed = tokio::time::timeout(Duration::from_millis(250), service.list()).await;
        assert_eq!(listed.expect("list waited on the password change").unwrap().len(), 1);

        changing.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn change_password_needs_known_caller() {
        let service = InMemoryPatientService::new();
        let request = ChangePasswordRequest {
            current_password: "initial-password".to_string(),
            new_password: "replacement-pw".to_string(),
            confirmation_password: "replacement-pw".to_string(),
        };

        let stranger = TestUser::patient("nobody@example.com").to_user();
        assert_matches!(
            service.change_password(request.clone(), &stranger).await,
            Err(PatientError::Unauthorized(_))
        );

        let anonymous = TestUser::anonymous().to_user();
        assert_matches!(
            service.change_password(request, &anonymous).await,
            Err(PatientError::Unauthorized(_))
        );
    }
}
