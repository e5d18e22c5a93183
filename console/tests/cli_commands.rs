//! Command-line driver tests against a scripted server.

use clap::Parser;
use clinic_console::domain::AccessToken;
use clinic_console::domain::ports::HttpMethod;
use clinic_console::inbound::cli::{Cli, run};
use clinic_console::test_support::ScriptedConsole;
use rstest::{fixture, rstest};
use serde_json::json;

#[allow(dead_code, reason = "helpers are shared with the other suites")]
mod support;

use support::{document_json, patient_json};

#[fixture]
fn scripted() -> ScriptedConsole {
    let harness = ScriptedConsole::new();
    harness.transport.respond_json(
        HttpMethod::Get,
        "auth/me",
        200,
        json!({ "id": 1, "name": "Dana Staff", "email": "dana@clinic.test", "role": "staff" }),
    );
    harness
}

fn token() -> Option<AccessToken> {
    AccessToken::new("cli-token")
}

async fn execute(
    harness: &ScriptedConsole,
    argv: &[&str],
    token: Option<AccessToken>,
) -> Result<String, String> {
    let cli = Cli::try_parse_from(argv).expect("arguments parse");
    let mut out = Vec::new();
    run(&harness.console, cli.command, token, &mut out)
        .await
        .map_err(|err| err.to_string())?;
    Ok(String::from_utf8(out).expect("utf-8 output"))
}

#[rstest]
#[tokio::test]
async fn commands_require_a_token(scripted: ScriptedConsole) {
    let err = execute(&scripted, &["clinic-console", "whoami"], None)
        .await
        .expect_err("no token");
    assert!(err.contains("not signed in"));
    assert!(scripted.transport.requests().is_empty());
}

#[rstest]
#[tokio::test]
async fn whoami_resumes_the_session(scripted: ScriptedConsole) {
    let out = execute(&scripted, &["clinic-console", "whoami"], token())
        .await
        .expect("whoami");
    assert_eq!(out.trim(), "1\tDana Staff\tstaff");
    let profile = scripted.transport.requests_to(HttpMethod::Get, "auth/me");
    assert!(
        profile
            .iter()
            .all(|request| request.bearer.as_ref().map(|held| held.expose()) == Some("cli-token"))
    );
}

#[rstest]
#[tokio::test]
async fn patients_list_prints_one_row_per_patient(scripted: ScriptedConsole) {
    scripted.transport.respond_json(
        HttpMethod::Get,
        "patients",
        200,
        json!([patient_json(5, "Ann Lee", "unapproved"), patient_json(6, "Bo Chen", "unapproved")]),
    );
    let out = execute(
        &scripted,
        &["clinic-console", "patients", "list", "--status", "unapproved", "--search", "  "],
        token(),
    )
    .await
    .expect("list");
    assert_eq!(out.lines().count(), 2);
    assert!(out.starts_with("5\tAnn Lee\t"));

    let request = &scripted.transport.requests_to(HttpMethod::Get, "patients")[0];
    assert_eq!(
        request.query,
        [
            ("status".to_owned(), "unapproved".to_owned()),
            ("search".to_owned(), String::new()),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn admins_delete_reports_the_server_message(scripted: ScriptedConsole) {
    scripted.transport.respond_json(
        HttpMethod::Delete,
        "admins/7",
        404,
        json!({ "message": "Admin not found" }),
    );
    let err = execute(&scripted, &["clinic-console", "admins", "delete", "7"], token())
        .await
        .expect_err("delete fails");
    assert_eq!(err, "Admin not found");
}

#[rstest]
#[tokio::test]
async fn summary_without_documents_is_refused(scripted: ScriptedConsole) {
    scripted.transport.respond_json(
        HttpMethod::Get,
        "documents/patients/42/documents",
        200,
        json!([]),
    );
    let err = execute(&scripted, &["clinic-console", "documents", "summary", "42"], token())
        .await
        .expect_err("no documents");
    assert_eq!(err, "No documents uploaded yet");
    assert_eq!(scripted.transport.count(HttpMethod::Post, "documents/patients/42/analyze"), 0);
}

#[rstest]
#[tokio::test]
async fn documents_list_prints_titles(scripted: ScriptedConsole) {
    scripted.transport.respond_json(
        HttpMethod::Get,
        "documents/patients/42/documents",
        200,
        json!([document_json(3, 42, "referral.pdf")]),
    );
    let out = execute(&scripted, &["clinic-console", "documents", "list", "42"], token())
        .await
        .expect("list");
    assert!(out.starts_with("3\treferral.pdf\t2024-05-01T10:30:00"));
}

#[tokio::test]
async fn rejected_token_reports_the_server_message() {
    let harness = ScriptedConsole::new();
    harness
        .transport
        .respond_json(HttpMethod::Get, "auth/me", 401, json!({ "message": "Token expired" }));
    let err = execute(&harness, &["clinic-console", "whoami"], token())
        .await
        .expect_err("rejected");
    assert_eq!(err, "Token expired");
    assert!(harness.redirects.reasons().is_empty());
}
