//! Record identifiers returned by the clinic API.
//!
//! The server emits identifiers as strings (UUIDs) but older records and test
//! fixtures use bare integers, so every identifier accepts either on decode.
//! Identifiers are interpolated into request paths, so each must be exactly
//! one path segment.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Raised when raw text cannot be used as an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidIdentifier {
    /// Blank after trimming.
    #[error("identifier must not be empty")]
    Empty,
    /// Would address a different path than the record's own.
    #[error("identifier must be a single path segment")]
    NotASegment,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdentifier {
    Text(String),
    Number(i64),
}

fn parse_identifier(raw: &str) -> Result<String, InvalidIdentifier> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvalidIdentifier::Empty);
    }
    let dot_segment = trimmed.chars().all(|c| c == '.');
    let reserved = trimmed
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control());
    if dot_segment || reserved {
        return Err(InvalidIdentifier::NotASegment);
    }
    Ok(trimmed.to_owned())
}

macro_rules! define_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            ///
            /// # Errors
            ///
            /// Returns [`InvalidIdentifier`] when `raw` is blank or is not a
            /// single path segment.
            pub fn new(raw: impl AsRef<str>) -> Result<Self, InvalidIdentifier> {
                parse_identifier(raw.as_ref()).map(Self)
            }

            /// Borrow the identifier as sent on the wire.
            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value.to_string())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidIdentifier;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Self::new(raw)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                match RawIdentifier::deserialize(deserializer)? {
                    RawIdentifier::Text(text) => {
                        Self::new(text).map_err(serde::de::Error::custom)
                    }
                    RawIdentifier::Number(number) => Ok(Self(number.to_string())),
                }
            }
        }
    };
}

define_identifier!(
    /// Identifier of any user account.
    UserId
);
define_identifier!(
    /// Identifier of a patient record.
    PatientId
);
define_identifier!(
    /// Identifier of an administrator account.
    AdminId
);
define_identifier!(
    /// Identifier of an uploaded document.
    DocumentId
);
