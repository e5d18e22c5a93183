//! Patient documents and the upload validation rules.
//!
//! [`validate_upload`] is the single gate every upload passes through before
//! any network activity: the MIME type must be on the allow-list and the
//! file must not exceed [`MAX_UPLOAD_BYTES`].

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use super::{DocumentId, PatientId};

/// Largest accepted upload, 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Document stored for a patient.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Document {
    /// Record identifier.
    pub id: DocumentId,
    /// Owning patient, when the server reports it.
    #[serde(default)]
    pub patient_id: Option<PatientId>,
    /// Display title.
    pub title: String,
    /// Server-side storage path.
    #[serde(default)]
    pub file_path: String,
    /// Upload time.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub uploaded_at: DateTime<Utc>,
    /// Generated summary text, if the server produced one.
    #[serde(default)]
    pub summary: Option<String>,
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
}

/// MIME types accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceptedContentType {
    /// `application/pdf`
    Pdf,
    /// `image/jpeg`
    Jpeg,
    /// `image/png`
    Png,
    /// `application/msword`
    Msword,
    /// Office Open XML word processing document.
    Docx,
}

impl AcceptedContentType {
    const ALL: [Self; 5] = [Self::Pdf, Self::Jpeg, Self::Png, Self::Msword, Self::Docx];

    /// Canonical MIME string.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Msword => "application/msword",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }

    /// Match a MIME string, ignoring case and parameters such as `charset`.
    #[must_use]
    pub fn from_mime(raw: &str) -> Option<Self> {
        let essence = raw.split(';').next().unwrap_or_default().trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.mime().eq_ignore_ascii_case(essence))
    }

    /// Guess the type from a file name extension.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "doc" => Some(Self::Msword),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

impl fmt::Display for AcceptedContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A file the user picked, before validation.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    /// File name as selected.
    pub file_name: String,
    /// MIME type reported for the file.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCandidate")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadCandidate {
    /// Describe a selected file.
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }
}

/// Why a selected file was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    /// MIME type outside the allow-list.
    #[error("Only PDF, DOCX, JPG, and PNG files are allowed")]
    UnsupportedType {
        /// Type the file reported.
        content_type: String,
    },
    /// File larger than [`MAX_UPLOAD_BYTES`].
    #[error("File size exceeds 10MB limit")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
    },
}

impl From<UploadRejection> for super::Error {
    fn from(value: UploadRejection) -> Self {
        Self::validation(value.to_string())
    }
}

/// A file that passed [`validate_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    file_name: String,
    content_type: AcceptedContentType,
    bytes: Vec<u8>,
}

impl ValidatedUpload {
    /// File name as selected.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file_name.as_str()
    }

    /// Accepted MIME type.
    #[must_use]
    pub const fn content_type(&self) -> AcceptedContentType {
        self.content_type
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }

    pub(crate) fn into_parts(self) -> (String, AcceptedContentType, Vec<u8>) {
        (self.file_name, self.content_type, self.bytes)
    }
}

/// Check `candidate` against the type allow-list and size limit.
///
/// # Errors
///
/// Returns [`UploadRejection`] when the type is not accepted or the file is
/// larger than [`MAX_UPLOAD_BYTES`]. The type is checked first.
///
/// # Examples
/// ```
/// use clinic_console::domain::{validate_upload, UploadCandidate, UploadRejection};
///
/// let gif = UploadCandidate::new("scan.gif", "image/gif", vec![0; 16]);
/// assert!(matches!(
///     validate_upload(gif),
///     Err(UploadRejection::UnsupportedType { .. })
/// ));
/// ```
pub fn validate_upload(candidate: UploadCandidate) -> Result<ValidatedUpload, UploadRejection> {
    let Some(content_type) = AcceptedContentType::from_mime(&candidate.content_type) else {
        return Err(UploadRejection::UnsupportedType {
            content_type: candidate.content_type,
        });
    };
    let size = candidate.size();
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadRejection::TooLarge { size });
    }
    Ok(ValidatedUpload {
        file_name: candidate.file_name,
        content_type,
        bytes: candidate.bytes,
    })
}

/// Upload progress as an integer percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UploadProgress {
    percent: u8,
}

impl UploadProgress {
    /// Completed upload.
    pub const COMPLETE: Self = Self { percent: 100 };

    /// Progress for `sent` of `total` bytes, rounded down and capped at 100.
    /// An empty body counts as complete.
    #[must_use]
    pub fn from_bytes(sent: u64, total: u64) -> Self {
        if total == 0 {
            return Self::COMPLETE;
        }
        let scaled = u128::from(sent.min(total)) * 100 / u128::from(total);
        Self {
            percent: u8::try_from(scaled).unwrap_or(100),
        }
    }

    /// Percentage in `0..=100`.
    #[must_use]
    pub const fn percent(self) -> u8 {
        self.percent
    }
}

/// File name used when saving a downloaded document.
#[must_use]
pub fn document_file_name(id: &DocumentId) -> String {
    format!("document_{id}.pdf")
}

/// File name used when saving a generated summary.
#[must_use]
pub fn summary_file_name(patient: &PatientId) -> String {
    format!("patient_{patient}_medical_summary.pdf")
}
