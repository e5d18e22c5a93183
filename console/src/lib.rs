//! Client core for the clinic management console.
//!
//! The crate keeps a signed-in session, caches patient, admin, and document
//! lists with prefix invalidation, and moves documents to and from the
//! clinic API. [`domain`] holds the rules; [`outbound`] adapts reqwest and
//! the filesystem; [`inbound`] drives everything from the command line.

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;
#[cfg(feature = "test-support")]
pub mod test_support;

pub use bootstrap::build_console;
pub use config::{ConsoleSettings, SettingsError};
pub use domain::{ClinicConsole, Error, ErrorCode};
