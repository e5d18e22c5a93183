//! Cache keys for every list the console reads.
//!
//! Mutations invalidate by [`Resource::prefix`], which covers every search
//! term and status tab of that resource at once.

use query_cache::{QueryKey, QueryPrefix};

use super::{PatientId, PatientListQuery};

/// Cached resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Patient lists, keyed by status and search term.
    Patients,
    /// Administrator lists, keyed by search term.
    Admins,
    /// Documents of one patient.
    PatientDocuments,
}

impl Resource {
    /// Resource name used as the first key segment.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::Admins => "admins",
            Self::PatientDocuments => "patient-documents",
        }
    }

    /// Prefix selecting every cached query of this resource.
    #[must_use]
    pub const fn prefix(self) -> QueryPrefix {
        QueryPrefix::resource(self.name())
    }
}

/// Key for one patients tab.
#[must_use]
pub fn patients_key(query: &PatientListQuery) -> QueryKey {
    QueryKey::new(Resource::Patients.name())
        .with(query.status.as_query_param())
        .with(query.search.as_str())
}

/// Key for an admin search.
#[must_use]
pub fn admins_key(search: &str) -> QueryKey {
    QueryKey::new(Resource::Admins.name()).with(search)
}

/// Key for one patient's document list.
#[must_use]
pub fn patient_documents_key(patient: &PatientId) -> QueryKey {
    QueryKey::new(Resource::PatientDocuments.name()).with(patient.as_str())
}

/// Prefix covering only `patient`'s documents.
#[must_use]
pub fn patient_documents_prefix(patient: &PatientId) -> QueryPrefix {
    Resource::PatientDocuments.prefix().with(patient.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PatientStatus;

    #[test]
    fn resource_prefix_covers_every_tab_and_search() {
        let prefix = Resource::Patients.prefix();
        for status in [PatientStatus::Approved, PatientStatus::Unapproved] {
            for search in ["", "ann"] {
                let key = patients_key(&PatientListQuery::new(status, search));
                assert!(key.matches(&prefix));
            }
        }
        assert!(!admins_key("").matches(&prefix));
    }

    #[test]
    fn document_prefix_is_scoped_to_one_patient() {
        let prefix = patient_documents_prefix(&PatientId::from(42));
        assert!(patient_documents_key(&PatientId::from(42)).matches(&prefix));
        assert!(!patient_documents_key(&PatientId::from(43)).matches(&prefix));
    }
}
