//! Patient list reads and the mutations that change them.
//!
//! Lists are cached per status tab and search term. Every successful
//! mutation invalidates the whole `patients` resource so all tabs refetch;
//! a failed mutation leaves cached lists exactly as they were.

use std::sync::Arc;

use query_cache::MutationGate;
use serde::Deserialize;
use tracing::{info, warn};

use super::ports::ApiRequest;
use super::query_keys::{Resource, patient_documents_prefix, patients_key};
use super::{
    ApiClient, AuthService, ConsoleCache, Error, Patient, PatientId, PatientListQuery,
    Registration, RegisteredAccount, Role,
};

/// What a mutation targets; one mutation per target may be in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PatientMutation {
    Status(PatientId),
    Record(PatientId),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatientEnvelope {
    Bare(Patient),
    Wrapped { patient: Patient },
}

fn updated_patient(body: &[u8]) -> Option<Patient> {
    serde_json::from_slice::<PatientEnvelope>(body)
        .ok()
        .map(|envelope| match envelope {
            PatientEnvelope::Bare(patient) | PatientEnvelope::Wrapped { patient } => patient,
        })
}

/// Staff view over patient records.
#[derive(Debug, Clone)]
pub struct PatientDirectory {
    api: ApiClient,
    cache: ConsoleCache,
    pending: MutationGate<PatientMutation>,
}

impl PatientDirectory {
    /// Read through `api`, caching in `cache`.
    #[must_use]
    pub fn new(api: ApiClient, cache: ConsoleCache) -> Self {
        Self {
            api,
            cache,
            pending: MutationGate::new(),
        }
    }

    /// Patients matching `query`, served from cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure; any previously cached list is kept.
    pub async fn list(&self, query: &PatientListQuery) -> Result<Arc<Vec<Patient>>, Error> {
        let api = self.api.clone();
        let request = ApiRequest::get("patients")
            .with_query("status", query.status.as_query_param())
            .with_query("search", query.search.as_str());
        self.cache
            .fetch(&patients_key(query), move || async move {
                api.json::<Vec<Patient>>(request).await
            })
            .await
            .map_err(Error::from)
    }

    /// Last list fetched for `query`, without any network activity.
    #[must_use]
    pub fn cached(&self, query: &PatientListQuery) -> Option<Arc<Vec<Patient>>> {
        self.cache.peek(&patients_key(query))
    }

    /// Whether a status toggle for `id` is in flight; the toggle control is
    /// disabled while this holds.
    #[must_use]
    pub fn is_toggle_pending(&self, id: &PatientId) -> bool {
        self.pending.is_pending(&PatientMutation::Status(id.clone()))
    }

    /// Flip the approval status of `id`.
    ///
    /// Returns the updated patient when the server echoes it back.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Busy`](super::ErrorCode::Busy) while a toggle
    /// for the same patient is pending, or the server's rejection.
    pub async fn toggle_status(&self, id: &PatientId) -> Result<Option<Patient>, Error> {
        let request = ApiRequest::patch(format!("patients/{id}/status"));
        let response = self
            .mutate(
                PatientMutation::Status(id.clone()),
                vec![Resource::Patients.prefix()],
                request,
            )
            .await?;
        info!(patient_id = %id, "patient status toggled");
        Ok(updated_patient(&response))
    }

    /// Change the phone number of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Busy`](super::ErrorCode::Busy) while another edit
    /// of the same record is pending, or the server's rejection.
    pub async fn update_phone(&self, id: &PatientId, phone: &str) -> Result<Option<Patient>, Error> {
        let request = ApiRequest::patch(format!("patients/{id}"))
            .with_json(serde_json::json!({ "phone": phone.trim() }));
        let response = self
            .mutate(
                PatientMutation::Record(id.clone()),
                vec![Resource::Patients.prefix()],
                request,
            )
            .await?;
        info!(patient_id = %id, "patient phone updated");
        Ok(updated_patient(&response))
    }

    /// Delete `id` and forget its cached documents.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Busy`](super::ErrorCode::Busy) while another edit
    /// of the same record is pending, or the server's rejection.
    pub async fn delete(&self, id: &PatientId) -> Result<(), Error> {
        let request = ApiRequest::delete(format!("patients/{id}"));
        self.mutate(
            PatientMutation::Record(id.clone()),
            vec![Resource::Patients.prefix(), patient_documents_prefix(id)],
            request,
        )
        .await?;
        info!(patient_id = %id, "patient deleted");
        Ok(())
    }

    /// Create a patient account on behalf of staff.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `registration` is not for a patient,
    /// or the server's rejection.
    pub async fn register_patient(
        &self,
        registration: Registration,
    ) -> Result<RegisteredAccount, Error> {
        if registration.role() != Role::Patient {
            return Err(Error::validation("registration must be for a patient"));
        }
        let auth = AuthService::new(self.api.clone());
        let account = self
            .cache
            .run_mutation(
                (),
                vec![Resource::Patients.prefix()],
                async move { auth.register(&registration).await },
            )
            .await
            .map_err(Error::from)?;
        Ok(account)
    }

    async fn mutate(
        &self,
        target: PatientMutation,
        invalidates: Vec<query_cache::QueryPrefix>,
        request: ApiRequest,
    ) -> Result<Vec<u8>, Error> {
        let Some(permit) = self.pending.try_acquire(target.clone()) else {
            return Err(Error::busy("a change to this patient is already in progress"));
        };
        let api = self.api.clone();
        self.cache
            .run_mutation(permit, invalidates, async move {
                api.send(request).await.map(|response| response.body)
            })
            .await
            .map_err(|failure| {
                let error = Error::from(failure);
                warn!(mutation = ?target, %error, "patient mutation failed");
                error
            })
    }
}
