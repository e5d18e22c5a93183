//! Credentials and registration payloads.
//!
//! Values are validated on construction so services never send a request the
//! server would reject for an empty field.

use std::fmt;

use serde::Serialize;
use zeroize::Zeroizing;

use super::session::Role;

/// Error returned when credential or registration fields are blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsValidationError {
    /// Email was missing or blank once trimmed.
    EmptyEmail,
    /// Password was blank.
    EmptyPassword,
    /// Display name was missing or blank once trimmed.
    EmptyName,
}

impl fmt::Display for CredentialsValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEmail => write!(f, "email must not be empty"),
            Self::EmptyPassword => write!(f, "password must not be empty"),
            Self::EmptyName => write!(f, "name must not be empty"),
        }
    }
}

impl std::error::Error for CredentialsValidationError {}

impl From<CredentialsValidationError> for super::Error {
    fn from(value: CredentialsValidationError) -> Self {
        Self::validation(value.to_string())
    }
}

fn required_trimmed(
    value: &str,
    missing: CredentialsValidationError,
) -> Result<String, CredentialsValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(missing);
    }
    Ok(trimmed.to_owned())
}

fn required_password(password: &str) -> Result<Zeroizing<String>, CredentialsValidationError> {
    if password.is_empty() {
        return Err(CredentialsValidationError::EmptyPassword);
    }
    Ok(Zeroizing::new(password.to_owned()))
}

/// Validated login credentials.
///
/// ## Invariants
/// - `email` is trimmed and non-empty.
/// - `password` is non-empty and keeps caller whitespace.
///
/// # Examples
/// ```
/// use clinic_console::domain::LoginCredentials;
///
/// let creds = LoginCredentials::try_from_parts(" staff@clinic.test ", "pw").unwrap();
/// assert_eq!(creds.email(), "staff@clinic.test");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    email: String,
    password: Zeroizing<String>,
}

impl LoginCredentials {
    /// Construct credentials from raw form inputs.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsValidationError`] for blank fields.
    pub fn try_from_parts(email: &str, password: &str) -> Result<Self, CredentialsValidationError> {
        Ok(Self {
            email: required_trimmed(email, CredentialsValidationError::EmptyEmail)?,
            password: required_password(password)?,
        })
    }

    /// Account email.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Password as typed.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.as_str()
    }

    pub(crate) fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "email": self.email, "password": self.password.as_str() })
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account registration payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    email: String,
    password: Zeroizing<String>,
    name: String,
    role: Role,
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
    role: Role,
}

impl Registration {
    /// Validate a registration for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsValidationError`] for blank fields.
    pub fn try_new(
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<Self, CredentialsValidationError> {
        Ok(Self {
            email: required_trimmed(email, CredentialsValidationError::EmptyEmail)?,
            password: required_password(password)?,
            name: required_trimmed(name, CredentialsValidationError::EmptyName)?,
            role,
        })
    }

    /// Account email.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Requested role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn to_body(&self) -> serde_json::Value {
        let body = RegistrationBody {
            email: &self.email,
            password: self.password.as_str(),
            name: &self.name,
            role: self.role,
        };
        serde_json::to_value(body).unwrap_or_default()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish()
    }
}
