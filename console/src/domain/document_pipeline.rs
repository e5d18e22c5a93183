//! Document transfer pipeline for one patient.
//!
//! Uploads run validate, then a multipart POST with progress, then a refetch
//! of the patient's documents. Downloads and generated summaries are handed
//! to the [`ArtifactStore`] and the buffer is released once saved.

use std::sync::Arc;

use query_cache::MutationGate;
use serde::Deserialize;
use thiserror::Error as ThisError;
use tokio::sync::watch;
use tracing::{info, warn};

use super::ports::{
    ApiRequest, ApiResponse, Artifact, ArtifactStore, FilePart, MultipartForm, ProgressReporter,
    SavedArtifact,
};
use super::query_keys::{patient_documents_key, patient_documents_prefix};
use super::{
    ApiClient, ConsoleCache, Document, DocumentId, Error, PatientId, UploadCandidate,
    UploadProgress, UploadRejection, document_file_name, summary_file_name, validate_upload,
};

/// Failure of a transfer, with a message distinct per operation.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum TransferError {
    /// The file was refused before any request was made.
    #[error("{0}")]
    Rejected(#[from] UploadRejection),
    /// Another upload for this patient has not finished.
    #[error("An upload is already in progress")]
    UploadInProgress,
    /// The upload request failed.
    #[error("Upload failed: {0}")]
    Upload(Error),
    /// The upload succeeded but the document list could not be reloaded.
    #[error("Document uploaded, but the list could not be refreshed: {0}")]
    Refresh(Error),
    /// Fetching or saving a document failed.
    #[error("Failed to download document")]
    Download(Error),
    /// There is nothing to summarise yet.
    #[error("No documents uploaded yet")]
    NoDocuments,
    /// Another summary for this patient has not finished.
    #[error("A summary is already being generated")]
    SummaryInProgress,
    /// Generating or saving the summary failed.
    #[error("Error generating summary. Please try again.")]
    Summary(Error),
}

impl TransferError {
    /// Underlying request error, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&Error> {
        match self {
            Self::Upload(error) | Self::Refresh(error) | Self::Download(error) | Self::Summary(error) => {
                Some(error)
            }
            Self::Rejected(_) | Self::UploadInProgress | Self::NoDocuments | Self::SummaryInProgress => {
                None
            }
        }
    }

    /// Text for the dismissible notice; `None` once the session has ended.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        match self.cause() {
            Some(error) if error.is_unauthorized() => None,
            _ => Some(self.to_string()),
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Created document, when the server echoed it back.
    pub created: Option<Document>,
    /// The patient's documents after the refetch.
    pub documents: Arc<Vec<Document>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedEnvelope {
    Wrapped { document: Document },
    Bare(Document),
}

fn created_document(body: &[u8]) -> Option<Document> {
    serde_json::from_slice::<CreatedEnvelope>(body)
        .ok()
        .map(|envelope| match envelope {
            CreatedEnvelope::Wrapped { document } | CreatedEnvelope::Bare(document) => document,
        })
}

/// In-flight markers shared by every pipeline the console opens, so two
/// views of the same patient cannot start overlapping transfers.
#[derive(Debug, Clone, Default)]
pub struct TransferGates {
    uploads: MutationGate<PatientId>,
    summaries: MutationGate<PatientId>,
}

/// Transfers scoped to one patient.
#[derive(Clone)]
pub struct DocumentPipeline {
    patient: PatientId,
    api: ApiClient,
    cache: ConsoleCache,
    artifacts: Arc<dyn ArtifactStore>,
    gates: TransferGates,
    progress: Arc<watch::Sender<UploadProgress>>,
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("patient", &self.patient)
            .field("progress", &*self.progress.borrow())
            .finish_non_exhaustive()
    }
}

impl DocumentPipeline {
    /// Open the pipeline for `patient`.
    #[must_use]
    pub fn new(
        patient: PatientId,
        api: ApiClient,
        cache: ConsoleCache,
        artifacts: Arc<dyn ArtifactStore>,
        gates: TransferGates,
    ) -> Self {
        let (progress, _) = watch::channel(UploadProgress::default());
        Self {
            patient,
            api,
            cache,
            artifacts,
            gates,
            progress: Arc::new(progress),
        }
    }

    /// Patient this pipeline serves.
    #[must_use]
    pub const fn patient_id(&self) -> &PatientId {
        &self.patient
    }

    /// The patient's documents, served from cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure; any previously cached list is kept.
    pub async fn documents(&self) -> Result<Arc<Vec<Document>>, Error> {
        let api = self.api.clone();
        let request = ApiRequest::get(format!("documents/patients/{}/documents", self.patient));
        self.cache
            .fetch(&patient_documents_key(&self.patient), move || async move {
                api.json::<Vec<Document>>(request).await
            })
            .await
            .map_err(Error::from)
    }

    /// Observe upload progress as integer percentages.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    /// Whether an upload for this patient is in flight; the upload control
    /// is disabled while this holds.
    #[must_use]
    pub fn is_uploading(&self) -> bool {
        self.gates.uploads.is_pending(&self.patient)
    }

    /// Whether a summary for this patient is being generated.
    #[must_use]
    pub fn is_summarising(&self) -> bool {
        self.gates.summaries.is_pending(&self.patient)
    }

    /// Whether the summary action should be offered: documents are known to
    /// exist and no summary is already running.
    #[must_use]
    pub fn can_generate_summary(&self) -> bool {
        let has_documents = self
            .cache
            .peek::<Vec<Document>>(&patient_documents_key(&self.patient))
            .is_some_and(|documents| !documents.is_empty());
        has_documents && !self.is_summarising()
    }

    /// Validate and upload `candidate`, then refetch the document list.
    ///
    /// The candidate is consumed whatever the outcome, so a failed upload
    /// needs a fresh selection. `title` defaults to the file name.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Rejected`] before any request when the file fails
    ///   validation.
    /// - [`TransferError::UploadInProgress`] while another upload runs.
    /// - [`TransferError::Upload`] when the server refuses the file.
    /// - [`TransferError::Refresh`] when the upload worked but the refetch
    ///   failed.
    pub async fn upload(
        &self,
        candidate: UploadCandidate,
        title: Option<&str>,
    ) -> Result<UploadOutcome, TransferError> {
        let upload = validate_upload(candidate)?;
        let Some(permit) = self.gates.uploads.try_acquire(self.patient.clone()) else {
            return Err(TransferError::UploadInProgress);
        };
        self.progress.send_replace(UploadProgress::default());

        let size = upload.size();
        let (file_name, content_type, bytes) = upload.into_parts();
        let title = title
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map_or_else(|| file_name.clone(), str::to_owned);
        let form = MultipartForm {
            fields: vec![
                ("title".to_owned(), title),
                ("patient_id".to_owned(), self.patient.to_string()),
            ],
            file: FilePart {
                field: "file".to_owned(),
                file_name,
                content_type: content_type.mime().to_owned(),
                bytes,
            },
        };
        let request = ApiRequest::post("documents/upload")
            .with_multipart(form)
            .with_progress(ProgressReporter::new(Arc::clone(&self.progress)));

        let api = self.api.clone();
        let sent = self
            .cache
            .run_mutation(
                permit,
                vec![patient_documents_prefix(&self.patient)],
                async move { api.send(request).await.map(|response| response.body) },
            )
            .await;
        let body = match sent {
            Ok(body) => body,
            Err(failure) => {
                self.progress.send_replace(UploadProgress::default());
                let error = Error::from(failure);
                warn!(patient_id = %self.patient, %error, "document upload failed");
                return Err(TransferError::Upload(error));
            }
        };
        self.progress.send_replace(UploadProgress::COMPLETE);
        info!(patient_id = %self.patient, size, "document uploaded");

        let created = created_document(&body);
        let documents = self.documents().await.map_err(TransferError::Refresh)?;
        Ok(UploadOutcome { created, documents })
    }

    /// Download document `id` and save it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Download`] when the request or the save fails.
    pub async fn download(&self, id: &DocumentId) -> Result<SavedArtifact, TransferError> {
        let response = self
            .api
            .send(ApiRequest::get(format!("documents/{id}")))
            .await
            .map_err(TransferError::Download)?;
        let saved = self
            .save(response, document_file_name(id))
            .await
            .map_err(TransferError::Download)?;
        info!(document_id = %id, location = %saved.location.display(), "document saved");
        Ok(saved)
    }

    /// Generate a summary of every document of the patient and save it.
    ///
    /// # Errors
    ///
    /// - [`TransferError::NoDocuments`] when the patient has no documents.
    /// - [`TransferError::SummaryInProgress`] while another summary runs.
    /// - [`TransferError::Summary`] when generation or saving fails.
    pub async fn generate_summary(&self) -> Result<SavedArtifact, TransferError> {
        let documents = self.documents().await.map_err(TransferError::Summary)?;
        if documents.is_empty() {
            return Err(TransferError::NoDocuments);
        }
        let Some(_permit) = self.gates.summaries.try_acquire(self.patient.clone()) else {
            return Err(TransferError::SummaryInProgress);
        };

        let request = ApiRequest::post(format!("documents/patients/{}/analyze", self.patient));
        let outcome = match self.api.send(request).await {
            Ok(response) => self.save(response, summary_file_name(&self.patient)).await,
            Err(error) => Err(error),
        };
        match outcome {
            Ok(saved) => {
                info!(patient_id = %self.patient, location = %saved.location.display(), "summary saved");
                Ok(saved)
            }
            Err(error) => {
                warn!(patient_id = %self.patient, %error, "summary generation failed");
                Err(TransferError::Summary(error))
            }
        }
    }

    async fn save(&self, response: ApiResponse, fallback_name: String) -> Result<SavedArtifact, Error> {
        let artifact = Artifact {
            file_name: response.file_name.unwrap_or(fallback_name),
            content_type: response.content_type,
            bytes: response.body,
        };
        self.artifacts.save(artifact).await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    //! Validation ordering, upload gating, and per-operation failures.

    use std::path::PathBuf;

    use super::*;
    use crate::domain::ports::{
        ArtifactStoreError, MockArtifactStore, MockHttpTransport, MockSignOutListener,
        RequestBody,
    };
    use crate::domain::{AccessToken, ErrorCode, Role, SessionGuard, SessionUser, UserId};
    use serde_json::json;

    fn pipeline(transport: MockHttpTransport, store: MockArtifactStore) -> DocumentPipeline {
        let mut listener = MockSignOutListener::new();
        listener.expect_signed_out().return_const(());
        let session = Arc::new(SessionGuard::new(Arc::new(listener)));
        session.set_auth(
            AccessToken::new("tok").expect("token"),
            SessionUser::new(UserId::from(1), "Sam", Role::Staff),
        );
        DocumentPipeline::new(
            PatientId::from(42),
            ApiClient::new(Arc::new(transport), session),
            ConsoleCache::new(),
            Arc::new(store),
            TransferGates::default(),
        )
    }

    fn document(id: u32, title: &str) -> serde_json::Value {
        json!({ "id": id, "title": title, "file_path": "s3://x", "uploaded_at": "2024-05-01T10:30:00" })
    }

    #[tokio::test]
    async fn rejected_files_never_reach_the_network() {
        let pipeline = pipeline(MockHttpTransport::new(), MockArtifactStore::new());
        let err = pipeline
            .upload(UploadCandidate::new("a.gif", "image/gif", vec![1]), None)
            .await
            .expect_err("rejected");
        assert_eq!(err.notice().as_deref(), Some("Only PDF, DOCX, JPG, and PNG files are allowed"));
        assert!(!pipeline.is_uploading());
    }

    #[tokio::test]
    async fn upload_posts_form_then_refetches() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| request.path == "documents/upload")
            .times(1)
            .returning(|request| {
                let RequestBody::Multipart(form) = &request.body else {
                    return Ok(ApiResponse::json(400, &json!({ "msg": "No file provided" })));
                };
                assert_eq!(form.field("title"), Some("Scan"));
                assert_eq!(form.file.file_name, "scan.png");
                assert_eq!(form.file.content_type, "image/png");
                Ok(ApiResponse::json(
                    201,
                    &json!({ "msg": "Document uploaded successfully", "document": document(3, "Scan") }),
                ))
            });
        transport
            .expect_execute()
            .withf(|request| request.path == "documents/patients/42/documents")
            .times(1)
            .returning(|_| Ok(ApiResponse::json(200, &json!([document(3, "Scan")]))));
        let pipeline = pipeline(transport, MockArtifactStore::new());
        let progress = pipeline.progress();

        let outcome = pipeline
            .upload(UploadCandidate::new("scan.png", "image/png", vec![7; 64]), Some(" Scan "))
            .await
            .expect("upload");

        assert_eq!(outcome.created.map(|d| d.title), Some("Scan".to_owned()));
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(progress.borrow().percent(), 100);
        assert!(!pipeline.is_uploading());
    }

    #[tokio::test]
    async fn failed_upload_reports_server_message_and_resets_progress() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Ok(ApiResponse::json(500, &json!({ "msg": "Error uploading file" }))));
        let pipeline = pipeline(transport, MockArtifactStore::new());

        let err = pipeline
            .upload(UploadCandidate::new("a.pdf", "application/pdf", vec![1]), None)
            .await
            .expect_err("server failure");

        assert_eq!(err.notice().as_deref(), Some("Upload failed: Error uploading file"));
        assert_eq!(pipeline.progress().borrow().percent(), 0);
    }

    #[tokio::test]
    async fn download_falls_back_to_document_file_name() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| request.path == "documents/9")
            .returning(|_| Ok(ApiResponse::new(200, b"%PDF".to_vec())));
        let mut store = MockArtifactStore::new();
        store
            .expect_save()
            .withf(|artifact| artifact.file_name == "document_9.pdf" && artifact.bytes == b"%PDF")
            .times(1)
            .returning(|artifact| {
                Ok(SavedArtifact {
                    location: PathBuf::from("/downloads").join(&artifact.file_name),
                    file_name: artifact.file_name,
                    size: 4,
                })
            });
        let pipeline = pipeline(transport, store);

        let saved = pipeline.download(&DocumentId::from(9)).await.expect("download");
        assert_eq!(saved.location, PathBuf::from("/downloads/document_9.pdf"));
    }

    #[tokio::test]
    async fn save_failures_surface_as_download_errors() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Ok(ApiResponse::new(200, b"%PDF".to_vec())));
        let mut store = MockArtifactStore::new();
        store
            .expect_save()
            .returning(|_| Err(ArtifactStoreError::write("disk full")));
        let pipeline = pipeline(transport, store);

        let err = pipeline.download(&DocumentId::from(9)).await.expect_err("save failed");
        assert_eq!(err.notice().as_deref(), Some("Failed to download document"));
        assert_eq!(err.cause().map(Error::code), Some(ErrorCode::Internal));
    }

    #[tokio::test]
    async fn summary_is_unavailable_without_documents() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| request.path == "documents/patients/42/documents")
            .times(1)
            .returning(|_| Ok(ApiResponse::json(200, &json!([]))));
        let pipeline = pipeline(transport, MockArtifactStore::new());

        let err = pipeline.generate_summary().await.expect_err("no documents");
        assert_eq!(err, TransferError::NoDocuments);
        assert!(!pipeline.can_generate_summary());
    }

    #[tokio::test]
    async fn summary_failure_has_its_own_message() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| request.path == "documents/patients/42/documents")
            .returning(|_| Ok(ApiResponse::json(200, &json!([document(1, "Labs")]))));
        transport
            .expect_execute()
            .withf(|request| request.path == "documents/patients/42/analyze")
            .returning(|_| Ok(ApiResponse::json(500, &json!({ "error": "model offline" }))));
        let pipeline = pipeline(transport, MockArtifactStore::new());
        pipeline.documents().await.expect("documents");
        assert!(pipeline.can_generate_summary());

        let err = pipeline.generate_summary().await.expect_err("failed");
        assert_eq!(
            err.notice().as_deref(),
            Some("Error generating summary. Please try again.")
        );
        assert!(!pipeline.is_summarising());
    }
}
