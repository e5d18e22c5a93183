//! Behaviour tests for the patient approval toggle.

use std::sync::Arc;
use std::time::Duration;

use clinic_console::domain::ports::HttpMethod;
use clinic_console::domain::{
    Error, ErrorCode, Patient, PatientId, PatientListQuery, PatientStatus, Role,
};
use clinic_console::test_support::ScriptedConsole;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then, when};
use serde_json::json;
use tokio::sync::Notify;

#[allow(dead_code, reason = "helpers are shared with the other suites")]
mod support;

use support::{RuntimeHandle, patient_json, unquote};

const LIST_PATH: &str = "patients";

#[derive(Default, ScenarioState)]
struct PatientWorld {
    runtime: Slot<RuntimeHandle>,
    harness: Slot<ScriptedConsole>,
    name: Slot<String>,
    release: Slot<Arc<Notify>>,
    toggled: Slot<Result<Option<Patient>, Error>>,
    second_toggle: Slot<Result<Option<Patient>, Error>>,
}

impl PatientWorld {
    fn runtime(&self) -> RuntimeHandle {
        self.runtime.get().expect("runtime should be set")
    }

    fn harness(&self) -> ScriptedConsole {
        self.harness.get().expect("console should be set")
    }
}

#[fixture]
fn world() -> PatientWorld {
    PatientWorld::default()
}

fn status_path(patient: u32) -> String {
    format!("patients/{patient}/status")
}

fn unapproved_tab() -> PatientListQuery {
    PatientListQuery::new(PatientStatus::Unapproved, "")
}

#[given("a signed-in staff console")]
fn a_signed_in_staff_console(world: &PatientWorld) {
    let harness = ScriptedConsole::new();
    harness.sign_in("staff-token", Role::Staff);
    world.runtime.set(RuntimeHandle::new());
    world.harness.set(harness);
}

#[given("patient {patient} {name} is awaiting approval")]
fn patient_is_awaiting_approval(world: &PatientWorld, patient: u32, name: String) {
    let name = unquote(&name).to_owned();
    world.harness().transport.respond_json(
        HttpMethod::Get,
        LIST_PATH,
        200,
        json!([patient_json(patient, &name, "unapproved")]),
    );
    world.name.set(name);
}

#[given("the unapproved tab has been loaded")]
fn the_unapproved_tab_has_been_loaded(world: &PatientWorld) {
    let patients = world
        .runtime()
        .block_on(world.harness().console.patients().list(&unapproved_tab()))
        .expect("unapproved tab");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].status, PatientStatus::Unapproved);
}

#[given("the server approves patient {patient}")]
fn the_server_approves_patient(world: &PatientWorld, patient: u32) {
    let name = world.name.get().expect("patient name");
    let transport = world.harness().transport;
    transport.respond_json(
        HttpMethod::Patch,
        &status_path(patient),
        200,
        json!({
            "message": "Status updated",
            "patient": patient_json(patient, &name, "approved"),
        }),
    );
    transport.respond_json(HttpMethod::Get, LIST_PATH, 200, json!([]));
}

#[given("the server holds status changes for patient {patient}")]
fn the_server_holds_status_changes(world: &PatientWorld, patient: u32) {
    let release = world
        .harness()
        .transport
        .hold(HttpMethod::Patch, &status_path(patient));
    world.release.set(release);
}

#[when("staff toggle patient {patient:u32} once")]
fn staff_toggle_patient(world: &PatientWorld, patient: u32) {
    let outcome = world.runtime().block_on(
        world
            .harness()
            .console
            .patients()
            .toggle_status(&PatientId::from(patient)),
    );
    world.toggled.set(outcome);
}

#[when("staff toggle patient {patient:u32} twice before the server answers")]
fn staff_toggle_patient_twice(world: &PatientWorld, patient: u32) {
    let harness = world.harness();
    let release = world.release.get().expect("held route");
    let directory = harness.console.patients().clone();
    let transport = Arc::clone(&harness.transport);
    let id = PatientId::from(patient);
    let path = status_path(patient);

    let (first, second) = world.runtime().block_on(async move {
        let task = {
            let directory = directory.clone();
            let id = id.clone();
            tokio::spawn(async move { directory.toggle_status(&id).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.count(HttpMethod::Patch, &path) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("first toggle reaches the server");
        assert!(directory.is_toggle_pending(&id));

        let second = directory.toggle_status(&id).await;
        release.notify_one();
        let first = task.await.expect("toggle task");
        assert!(!directory.is_toggle_pending(&id));
        (first, second)
    });
    world.toggled.set(first);
    world.second_toggle.set(second);
}

#[then("one status request was sent for patient {patient}")]
fn one_status_request_was_sent(world: &PatientWorld, patient: u32) {
    let requests = world
        .harness()
        .transport
        .requests_to(HttpMethod::Patch, &status_path(patient));
    assert_eq!(requests.len(), 1);
}

#[then("patient {patient} is reported as approved")]
fn patient_is_reported_as_approved(world: &PatientWorld, patient: u32) {
    let updated = world
        .toggled
        .get()
        .expect("toggle attempted")
        .expect("toggle succeeded")
        .expect("server echoed the patient");
    assert_eq!(updated.id, PatientId::from(patient));
    assert_eq!(updated.status, PatientStatus::Approved);
}

#[then("the unapproved tab is refetched without patient {patient}")]
fn the_unapproved_tab_is_refetched(world: &PatientWorld, patient: u32) {
    let patients = world
        .runtime()
        .block_on(world.harness().console.patients().list(&unapproved_tab()))
        .expect("refetched tab");
    assert!(
        patients
            .iter()
            .all(|listed| listed.id != PatientId::from(patient))
    );
    assert_eq!(world.harness().transport.count(HttpMethod::Get, LIST_PATH), 2);
}

#[then("the second toggle was refused as busy")]
fn the_second_toggle_was_refused_as_busy(world: &PatientWorld) {
    let error = world
        .second_toggle
        .get()
        .expect("second toggle attempted")
        .expect_err("second toggle should be refused");
    assert_eq!(error.code(), ErrorCode::Busy);
}

#[scenario(
    path = "tests/features/patient_status.feature",
    name = "Toggling an unapproved patient approves them"
)]
fn toggling_approves_patient(world: PatientWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/patient_status.feature",
    name = "A second toggle while the first is pending is ignored"
)]
fn second_toggle_is_ignored(world: PatientWorld) {
    drop(world);
}
