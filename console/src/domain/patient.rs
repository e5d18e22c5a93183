//! Patient records and the approval status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PatientId;

/// Approval status of a patient.
///
/// The only transition is [`PatientStatus::toggled`]; the server applies it
/// and the console observes the result by refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatientStatus {
    /// Approved for care.
    #[serde(alias = "approved")]
    Approved,
    /// Awaiting approval.
    #[serde(alias = "unapproved")]
    Unapproved,
}

impl PatientStatus {
    /// Status after one toggle.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Approved => Self::Unapproved,
            Self::Unapproved => Self::Approved,
        }
    }

    /// Lower-case form used by the list filter query parameter.
    #[must_use]
    pub const fn as_query_param(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Unapproved => "unapproved",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approved => "Approved",
            Self::Unapproved => "Unapproved",
        })
    }
}

/// Patient as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PatientPayload")]
pub struct Patient {
    /// Record identifier.
    pub id: PatientId,
    /// Display name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone.
    pub phone: String,
    /// Approval status.
    pub status: PatientStatus,
    /// Link to the signed agreement, when one exists.
    pub agreement_link: Option<String>,
}

#[derive(Deserialize)]
struct PatientPayload {
    id: PatientId,
    #[serde(default, alias = "name")]
    full_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default = "unapproved")]
    status: PatientStatus,
    #[serde(default, rename = "agreementLink", alias = "agreement_link")]
    agreement_link: Option<String>,
}

const fn unapproved() -> PatientStatus {
    PatientStatus::Unapproved
}

impl From<PatientPayload> for Patient {
    fn from(payload: PatientPayload) -> Self {
        let full_name = payload
            .full_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                [payload.first_name, payload.last_name]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ")
            });
        Self {
            id: payload.id,
            full_name,
            email: payload.email.unwrap_or_default(),
            phone: payload.phone.unwrap_or_default(),
            status: payload.status,
            agreement_link: payload.agreement_link.filter(|link| !link.is_empty()),
        }
    }
}

/// Filter for one patients list tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientListQuery {
    /// Status tab.
    pub status: PatientStatus,
    /// Free-text search; empty means no filter.
    pub search: String,
}

impl PatientListQuery {
    /// Query for `status` with the search term trimmed.
    pub fn new(status: PatientStatus, search: impl Into<String>) -> Self {
        Self {
            status,
            search: search.into().trim().to_owned(),
        }
    }
}
