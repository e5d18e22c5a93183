//! Executes parsed commands against a [`ClinicConsole`].

use std::io::Write;
use std::path::Path;

use cap_std::{ambient_authority, fs::Dir};
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use tracing::info;

use super::args::{AdminsCommand, Command, DocumentsCommand, LoginArgs, PatientsCommand};
use crate::domain::{
    AcceptedContentType, AccessToken, AdminId, ClinicConsole, DocumentId, Error, LoginCredentials,
    MAX_UPLOAD_BYTES, PatientId, PatientListQuery, Registration, Role, TransferError,
    UploadCandidate, UploadRejection,
};

fn notice(error: &Error) -> Report {
    match error.notice() {
        Some(text) => eyre!(text),
        None => eyre!("session expired; sign in again"),
    }
}

fn transfer_notice(error: &TransferError) -> Report {
    match error.notice() {
        Some(text) => eyre!(text),
        None => eyre!("session expired; sign in again"),
    }
}

fn patient_id(raw: &str) -> Result<PatientId> {
    PatientId::new(raw).wrap_err("invalid patient id")
}

/// Run `command`, writing human-readable results to `out`.
///
/// Commands other than `login` need `token`; it is exchanged for the
/// signed-in profile before anything else runs.
///
/// # Errors
///
/// Returns the operation's user-facing notice as the error message.
pub async fn run(
    console: &ClinicConsole,
    command: Command,
    token: Option<AccessToken>,
    out: &mut impl Write,
) -> Result<()> {
    if let Command::Login(args) = command {
        return login(console, &args, out).await;
    }
    let token = token.ok_or_else(|| {
        eyre!("not signed in; run `clinic-console login` or set CLINIC_CONSOLE_TOKEN")
    })?;
    console.auth().resume(token).await.map_err(|err| notice(&err))?;

    match command {
        Command::Login(_) => Ok(()),
        Command::Logout => {
            console.auth().logout().await;
            writeln!(out, "signed out")?;
            Ok(())
        }
        Command::Whoami => {
            let user = console.auth().profile().await.map_err(|err| notice(&err))?;
            writeln!(out, "{}\t{}\t{}", user.id(), user.name(), user.role())?;
            Ok(())
        }
        Command::Patients(patients) => run_patients(console, patients, out).await,
        Command::Admins(admins) => run_admins(console, admins, out).await,
        Command::Documents(documents) => run_documents(console, documents, out).await,
    }
}

async fn login(console: &ClinicConsole, args: &LoginArgs, out: &mut impl Write) -> Result<()> {
    let credentials = LoginCredentials::try_from_parts(&args.email, &args.password)?;
    let user = console
        .auth()
        .login(&credentials)
        .await
        .map_err(|err| notice(&err))?;
    let token = console
        .session()
        .current_token()
        .ok_or_else(|| eyre!("signed out during login"))?;
    writeln!(out, "signed in as {} ({})", user.name(), user.role())?;
    writeln!(out, "CLINIC_CONSOLE_TOKEN={}", token.expose())?;
    Ok(())
}

async fn run_patients(
    console: &ClinicConsole,
    command: PatientsCommand,
    out: &mut impl Write,
) -> Result<()> {
    let patients = console.patients();
    match command {
        PatientsCommand::List { status, search } => {
            let query = PatientListQuery::new(status.into(), search);
            let rows = patients.list(&query).await.map_err(|err| notice(&err))?;
            for patient in rows.iter() {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    patient.id, patient.full_name, patient.email, patient.phone, patient.status
                )?;
            }
        }
        PatientsCommand::Toggle { id } => {
            let id = patient_id(&id)?;
            let updated = patients.toggle_status(&id).await.map_err(|err| notice(&err))?;
            match updated {
                Some(patient) => writeln!(out, "patient {id} is now {}", patient.status)?,
                None => writeln!(out, "patient {id} status toggled")?,
            }
        }
        PatientsCommand::UpdatePhone { id, phone } => {
            let id = patient_id(&id)?;
            patients
                .update_phone(&id, &phone)
                .await
                .map_err(|err| notice(&err))?;
            writeln!(out, "patient {id} phone updated")?;
        }
        PatientsCommand::Delete { id } => {
            let id = patient_id(&id)?;
            patients.delete(&id).await.map_err(|err| notice(&err))?;
            writeln!(out, "patient {id} deleted")?;
        }
        PatientsCommand::Register {
            email,
            password,
            name,
        } => {
            let registration = Registration::try_new(&email, &password, &name, Role::Patient)?;
            let account = patients
                .register_patient(registration)
                .await
                .map_err(|err| notice(&err))?;
            match account.user {
                Some(user) => writeln!(out, "registered patient {} ({})", user.name(), user.id())?,
                None => writeln!(out, "registered patient {email}")?,
            }
        }
    }
    Ok(())
}

async fn run_admins(
    console: &ClinicConsole,
    command: AdminsCommand,
    out: &mut impl Write,
) -> Result<()> {
    let admins = console.admins();
    match command {
        AdminsCommand::List { search } => {
            let rows = admins.list(&search).await.map_err(|err| notice(&err))?;
            for admin in rows.iter() {
                writeln!(out, "{}\t{}\t{}\t{}", admin.id, admin.full_name, admin.email, admin.phone)?;
            }
        }
        AdminsCommand::Delete { id } => {
            let id = AdminId::new(&id).wrap_err("invalid admin id")?;
            admins.delete(&id).await.map_err(|err| notice(&err))?;
            writeln!(out, "administrator {id} deleted")?;
        }
    }
    Ok(())
}

async fn run_documents(
    console: &ClinicConsole,
    command: DocumentsCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        DocumentsCommand::List { patient } => {
            let pipeline = console.documents(patient_id(&patient)?);
            let documents = pipeline.documents().await.map_err(|err| notice(&err))?;
            if documents.is_empty() {
                writeln!(out, "No documents uploaded yet.")?;
            }
            for document in documents.iter() {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    document.id,
                    document.title,
                    document.uploaded_at.to_rfc3339()
                )?;
            }
        }
        DocumentsCommand::Upload {
            patient,
            file,
            title,
            content_type,
        } => {
            let pipeline = console.documents(patient_id(&patient)?);
            let candidate = read_candidate(&file, content_type)?;
            let mut progress = pipeline.progress();
            let reporter = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let percent = progress.borrow_and_update().percent();
                    info!(percent, "upload progress");
                }
            });
            let outcome = pipeline.upload(candidate, title.as_deref()).await;
            reporter.abort();
            let outcome = outcome.map_err(|err| transfer_notice(&err))?;
            writeln!(out, "uploaded; {} document(s) on file", outcome.documents.len())?;
        }
        DocumentsCommand::Download { patient, document } => {
            let pipeline = console.documents(patient_id(&patient)?);
            let id = DocumentId::new(&document).wrap_err("invalid document id")?;
            let saved = pipeline
                .download(&id)
                .await
                .map_err(|err| transfer_notice(&err))?;
            writeln!(out, "saved {}", saved.location.display())?;
        }
        DocumentsCommand::Summary { patient } => {
            let pipeline = console.documents(patient_id(&patient)?);
            let saved = pipeline
                .generate_summary()
                .await
                .map_err(|err| transfer_notice(&err))?;
            writeln!(out, "saved {}", saved.location.display())?;
        }
    }
    Ok(())
}

fn read_candidate(path: &Path, content_type: Option<String>) -> Result<UploadCandidate> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| eyre!("Please select a file"))?;
    let content_type = content_type
        .or_else(|| AcceptedContentType::from_file_name(&file_name).map(|ty| ty.mime().to_owned()))
        .unwrap_or_else(|| "application/octet-stream".to_owned());
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let size = dir
        .metadata(&file_name)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?
        .len();
    if size > MAX_UPLOAD_BYTES {
        let rejection = if AcceptedContentType::from_mime(&content_type).is_some() {
            UploadRejection::TooLarge { size }
        } else {
            UploadRejection::UnsupportedType { content_type }
        };
        return Err(Report::new(rejection));
    }
    let bytes = dir
        .read(&file_name)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    Ok(UploadCandidate::new(file_name, content_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let handle = Dir::open_ambient_dir(dir.path(), ambient_authority()).expect("open dir");
        handle.write(name, bytes).expect("write file");
        dir.path().join(name)
    }

    #[rstest]
    #[case::pdf("report.pdf", None, "application/pdf")]
    #[case::upper_case_jpeg("SCAN.JPG", None, "image/jpeg")]
    #[case::unknown_extension("notes.txt", None, "application/octet-stream")]
    #[case::explicit_override("scan.bin", Some("image/png"), "image/png")]
    fn candidate_content_type(
        #[case] name: &str,
        #[case] explicit: Option<&str>,
        #[case] expected: &str,
    ) {
        let dir = TempDir::new().expect("temp dir");
        let path = write(&dir, name, b"%PDF-1.7");
        let candidate =
            read_candidate(&path, explicit.map(str::to_owned)).expect("candidate");
        assert_eq!(candidate.file_name, name);
        assert_eq!(candidate.content_type, expected);
        assert_eq!(candidate.bytes, b"%PDF-1.7");
    }

    #[rstest]
    #[case::accepted_type("huge.pdf", "application/pdf", "File size exceeds 10MB limit")]
    #[case::type_checked_first(
        "huge.gif",
        "image/gif",
        "Only PDF, DOCX, JPG, and PNG files are allowed"
    )]
    fn oversized_files_are_refused_before_reading(
        #[case] name: &str,
        #[case] content_type: &str,
        #[case] expected: &str,
    ) {
        let dir = TempDir::new().expect("temp dir");
        let handle = Dir::open_ambient_dir(dir.path(), ambient_authority()).expect("open dir");
        handle
            .create(name)
            .and_then(|file| file.set_len(MAX_UPLOAD_BYTES + 1))
            .expect("sparse file");

        let err = read_candidate(&dir.path().join(name), Some(content_type.to_owned()))
            .expect_err("too large");

        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn file_at_the_limit_is_read() {
        let dir = TempDir::new().expect("temp dir");
        let handle = Dir::open_ambient_dir(dir.path(), ambient_authority()).expect("open dir");
        handle
            .create("limit.png")
            .and_then(|file| file.set_len(MAX_UPLOAD_BYTES))
            .expect("sparse file");

        let candidate = read_candidate(&dir.path().join("limit.png"), None).expect("candidate");

        assert_eq!(candidate.size(), MAX_UPLOAD_BYTES);
        assert_eq!(candidate.content_type, "image/png");
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let err = read_candidate(&dir.path().join("absent.pdf"), None).expect_err("missing");
        assert!(err.to_string().contains("failed to read"));
    }
}
