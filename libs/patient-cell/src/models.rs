use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use shared_models::error::AppError;
use shared_utils::extractor::Validate;

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_NAME_LENGTH: usize = 100;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("email pattern is valid")
});

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\- ]{6,20}$").expect("phone pattern is valid"));

/// Patient record as returned to API clients. Credentials never leave the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Body of `POST /` and `PUT /{id}`.
///
/// Required strings default to empty so that a missing field surfaces as a
/// validation message instead of a decoding failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPayload {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub password: Option<String>,
}

impl PatientPayload {
    /// Create additionally requires an initial password.
    pub fn validate_for_create(&self) -> Result<(), Vec<String>> {
        let mut issues = self.validate().err().unwrap_or_default();
        if self.password.is_none() {
            issues.push("password is required".to_string());
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

/// Create body: a `PatientPayload` that must also carry an initial password.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewPatient(pub PatientPayload);

impl Validate for NewPatient {
    fn validate(&self) -> Result<(), Vec<String>> {
        self.0.validate_for_create()
    }
}

fn check_name(field: &str, value: &str, issues: &mut Vec<String>) {
    if value.trim().is_empty() {
        issues.push(format!("{} is required", field));
    } else if value.chars().count() > MAX_NAME_LENGTH {
        issues.push(format!("{} must be at most {} characters", field, MAX_NAME_LENGTH));
    }
}

impl Validate for PatientPayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        check_name("first_name", &self.first_name, &mut issues);
        check_name("last_name", &self.last_name, &mut issues);

        if self.email.trim().is_empty() {
            issues.push("email is required".to_string());
        } else if !EMAIL_PATTERN.is_match(self.email.trim()) {
            issues.push("email is not a valid address".to_string());
        }

        if let Some(phone) = &self.phone_number {
            if !PHONE_PATTERN.is_match(phone) {
                issues.push("phone_number must be 6-20 digits, spaces, '+' or '-'".to_string());
            }
        }

        if let Some(password) = &self.password {
            if password.chars().count() < MIN_PASSWORD_LENGTH {
                issues.push(format!("password must be at least {} characters", MIN_PASSWORD_LENGTH));
            }
        }

        if let Some(dob) = self.date_of_birth {
            if dob > Utc::now().date_naive() {
                issues.push("date_of_birth cannot be in the future".to_string());
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Body of `PATCH /`. Applies to the authenticated caller's own record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirmation_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.current_password.is_empty() {
            issues.push("current_password is required".to_string());
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            issues.push(format!("new_password must be at least {} characters", MIN_PASSWORD_LENGTH));
        }
        if self.new_password != self.confirmation_password {
            issues.push("Passwords are not the same".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatientError {
    #[error("Patient {0} not found")]
    NotFound(i64),

    #[error("Patient with email {email} already exists")]
    EmailAlreadyExists { email: String },

    #[error("Wrong password")]
    WrongPassword,

    #[error("Password was changed by another request, retry")]
    CredentialsChanged,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        let message = err.to_string();
        match err {
            PatientError::NotFound(_) => AppError::NotFound(message),
            PatientError::EmailAlreadyExists { .. } => AppError::Conflict(message),
            PatientError::WrongPassword => AppError::BadRequest(message),
            PatientError::CredentialsChanged => AppError::Conflict(message),
            PatientError::Unauthorized(reason) => AppError::Auth(reason),
            PatientError::ValidationError(reason) => AppError::ValidationError(reason),
            PatientError::DatabaseError(reason) => AppError::Database(reason),
        }
    }
}
