//! Reqwest-backed implementation of the HTTP transport port.

mod reqwest_transport;
mod upload_body;

pub use reqwest_transport::ReqwestTransport;
