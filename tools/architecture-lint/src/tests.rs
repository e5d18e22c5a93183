//! Unit tests for the layer rules and the path collector.

use std::path::PathBuf;

use rstest::rstest;

use super::*;

fn source(file: &str, contents: &str) -> LintSource {
    LintSource {
        file: PathBuf::from(file),
        contents: contents.to_owned(),
    }
}

/// Messages reported for a single file; empty when it passes.
fn messages(file: &str, contents: &str) -> Vec<String> {
    match lint_sources(&[source(file, contents)]) {
        Ok(()) => Vec::new(),
        Err(ArchitectureLintError::Violations(found)) => {
            found.into_iter().map(|violation| violation.message).collect()
        }
        Err(other) => panic!("lint could not run: {other}"),
    }
}

#[rstest]
#[case::domain_types("use crate::domain::PatientId; fn run() { let _ = PatientId::new(\"5\"); }")]
#[case::cap_std_handles("use cap_std::fs::Dir; fn run() { let _ = Dir::open_ambient_dir; }")]
#[case::clap_parser("use clap::Parser; #[derive(Parser)] struct Cli;")]
fn inbound_may_use(#[case] contents: &str) {
    assert_eq!(messages("inbound/cli/commands.rs", contents), Vec::<String>::new());
}

#[rstest]
#[case::outbound_module(
    "use crate::outbound::http::ReqwestTransport; fn run() {}",
    "inbound layer imports crate::outbound"
)]
#[case::outbound_through_crate_name(
    "use clinic_console::outbound::artifacts::DirectoryArtifactStore; fn run() {}",
    "inbound layer imports crate::outbound"
)]
#[case::http_client(
    "fn run() { let _ = reqwest::Client::new(); }",
    "inbound layer uses external crate `reqwest`"
)]
fn inbound_may_not_use(#[case] contents: &str, #[case] expected: &str) {
    assert_eq!(messages("inbound/cli/commands.rs", contents), vec![expected.to_owned()]);
}

#[rstest]
#[case::tracing("use tracing::info; fn thing() { info!(\"ok\"); }", &[])]
#[case::inbound("use crate::inbound::cli; fn thing() {}", &["domain layer imports crate::inbound"])]
#[case::relative_outbound(
    "use self::super::outbound as adapters; fn thing() {}",
    &["domain layer imports crate::outbound"]
)]
#[case::http_client_in_expression(
    "fn thing() { let _ = reqwest::Client::new(); }",
    &["domain layer uses external crate `reqwest`"]
)]
#[case::tokio_fs(
    "use tokio::fs::File; fn thing() {}",
    &["domain layer touches the filesystem ambiently through `tokio::fs`"]
)]
#[case::nested_group(
    "use std::{io, fs::{self, File}}; fn thing() {}",
    &["domain layer touches the filesystem ambiently through `std::fs`"]
)]
#[case::config_and_fs(
    "use ortho_config::OrthoConfig; fn load() { let _ = std::fs::read(\"x\"); }",
    &[
        "domain layer touches the filesystem ambiently through `std::fs`",
        "domain layer uses external crate `ortho_config`",
    ]
)]
fn domain_rules(#[case] contents: &str, #[case] expected: &[&str]) {
    assert_eq!(messages("domain/document_pipeline.rs", contents), expected);
}

#[rstest]
#[case::multipart("use reqwest::multipart::Form; fn thing() { let _ = Form::new(); }", &[])]
#[case::domain_by_crate_name(
    "fn thing() -> clinic_console::domain::PatientId { todo!() }",
    &[]
)]
#[case::cli("use crate::inbound::cli::Cli; fn thing() {}", &["outbound layer imports crate::inbound"])]
#[case::parser("use clap::Parser; fn thing() {}", &["outbound layer uses external crate `clap`"])]
#[case::std_fs(
    "fn thing() { let _ = std::fs::read(\"x\"); }",
    &["outbound layer touches the filesystem ambiently through `std::fs`"]
)]
fn outbound_rules(#[case] contents: &str, #[case] expected: &[&str]) {
    assert_eq!(messages("outbound/http/reqwest_transport.rs", contents), expected);
}

#[test]
fn files_outside_the_layers_cannot_be_linted() {
    let result = lint_sources(&[source("bootstrap.rs", "fn wire() {}")]);
    assert!(matches!(result, Err(ArchitectureLintError::Parse { .. })));
}

#[test]
fn invalid_rust_cannot_be_linted() {
    let result = lint_sources(&[source("domain/ids.rs", "fn broken( {")]);
    let Err(ArchitectureLintError::Parse { file, .. }) = result else {
        panic!("expected a parse failure");
    };
    assert_eq!(file, PathBuf::from("domain/ids.rs"));
}

#[test]
fn report_lists_every_file_in_path_order() {
    let result = lint_sources(&[
        source("outbound/redirect.rs", "use clap::Parser; fn f() {}"),
        source("domain/bad.rs", "use crate::inbound::cli; fn f() {}"),
    ]);
    let Err(err) = result else {
        panic!("expected violations");
    };
    let text = err.to_string();
    let domain = text.find("domain/bad.rs").expect("domain listed");
    let outbound = text.find("outbound/redirect.rs").expect("outbound listed");
    assert!(domain < outbound, "report: {text}");
    assert!(text.starts_with("layer boundary violations:"));
}

#[test]
fn use_trees_expand_to_each_leaf() {
    let tree: syn::ItemUse = syn::parse_str("use a::{b, c::{self, d as e}, f::*};").expect("use item");
    let mut leaves = flatten_use(&tree.tree);
    leaves.sort();
    let expected: Vec<Vec<String>> = [
        vec!["a", "b"],
        vec!["a", "c", "d"],
        vec!["a", "c", "self"],
        vec!["a", "f", "*"],
    ]
    .into_iter()
    .map(|path| path.into_iter().map(str::to_owned).collect())
    .collect();
    assert_eq!(leaves, expected);
}
