//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **http**: reqwest client for the clinic API
//! - **artifacts**: download directory written through `cap-std`
//! - **redirect**: terminal stand-in for the login redirect
//!
//! Adapters are thin translators between domain types and infrastructure.
//! They contain no business logic.

pub mod artifacts;
pub mod http;
pub mod redirect;
