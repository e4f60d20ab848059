use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::Validate;

// --- Actors ---

/// Role
///
/// The kind of authenticated caller. Serialized lowercase on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Patient,
    Doctor,
    Receptionist,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Patient, Role::Doctor, Role::Receptionist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Receptionist => "receptionist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Actor
///
/// The resolved identity of an authenticated request. Inserted into the request
/// extensions by the role guard and read back by handlers as an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    /// Patients are confined to their own records; every other role sees all patients.
    pub fn patient_scope(&self) -> Option<&str> {
        match self.role {
            Role::Patient => Some(self.id.as_str()),
            Role::Doctor | Role::Receptionist => None,
        }
    }

    pub fn can_access_patient(&self, patient_id: &str) -> bool {
        self.patient_scope().is_none_or(|own| own == patient_id)
    }
}

// --- Actions ---

/// Action
///
/// A medical action recorded against a patient (`public.actions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Action {
    pub id: String,
    pub patient_id: String,
    // Doctor who carried out the action, when known.
    pub performed_by: Option<String>,
    // Free-form category, e.g. "consultation", "prescription", "lab-test".
    pub kind: String,
    pub description: String,
    #[ts(type = "string")]
    pub performed_at: DateTime<Utc>,
    // Actor who recorded the action.
    pub created_by: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// NewAction
///
/// A fully resolved insert, built by the create handler from the request and the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub patient_id: String,
    pub performed_by: Option<String>,
    pub kind: String,
    pub description: String,
    pub performed_at: DateTime<Utc>,
    pub created_by: String,
}

/// --- Request Payloads ---

/// CreateActionRequest
///
/// Input payload for POST /actions. Patients may omit `patient_id`; doctors must set it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateActionRequest {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[validate(length(min = 1, max = 120, message = "kind must be between 1 and 120 characters"))]
    pub kind: String,
    #[serde(default)]
    #[validate(length(max = 4000, message = "description is too long"))]
    pub description: Option<String>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub performed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub performed_by: Option<String>,
}

/// UpdateActionRequest
///
/// Partial update payload for PUT /actions/{id}. Absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateActionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 120, message = "kind must be between 1 and 120 characters"))]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 4000, message = "description is too long"))]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub performed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<String>,
}
