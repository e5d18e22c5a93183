//! Helpers shared by the console behaviour suites.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::runtime::Runtime;

/// Multi-threaded runtime shared by the steps of one scenario.
#[derive(Clone)]
pub struct RuntimeHandle(Arc<Runtime>);

impl RuntimeHandle {
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("create runtime");
        Self(Arc::new(runtime))
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

/// Strip the quotes a step placeholder captured.
pub fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

/// Document record as the server lists it.
pub fn document_json(id: u32, patient: u32, title: &str) -> Value {
    json!({
        "id": id,
        "patient_id": patient,
        "title": title,
        "file_path": format!("uploads/{patient}/{title}"),
        "uploaded_at": "2024-05-01T10:30:00"
    })
}

/// Patient record as the server lists it.
pub fn patient_json(id: u32, name: &str, status: &str) -> Value {
    json!({
        "id": id,
        "full_name": name,
        "email": format!("patient{id}@clinic.test"),
        "phone": "555-0100",
        "status": status
    })
}

/// Administrator record as the server lists it.
pub fn admin_json(id: u32, name: &str) -> Value {
    json!({
        "id": id,
        "full_name": name,
        "email": format!("admin{id}@clinic.test"),
        "phone": "555-0199"
    })
}
