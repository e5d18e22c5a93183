//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod artifact_store;
mod http_transport;
mod sign_out_listener;

#[cfg(test)]
pub use artifact_store::MockArtifactStore;
pub use artifact_store::{Artifact, ArtifactStore, ArtifactStoreError, SavedArtifact};
#[cfg(test)]
pub use http_transport::MockHttpTransport;
pub use http_transport::{
    ApiRequest, ApiResponse, FilePart, HttpMethod, HttpTransport, MultipartForm,
    ProgressReporter, RequestBody, TransportError,
};
#[cfg(test)]
pub use sign_out_listener::MockSignOutListener;
pub use sign_out_listener::{SignOutListener, SignOutReason};
