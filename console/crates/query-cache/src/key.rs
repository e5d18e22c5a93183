//! Query keys and invalidation prefixes.

use std::fmt;

/// One positional parameter of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyParam {
    /// Free-form text such as a search term or a record identifier.
    Text(String),
    /// Signed integer parameter.
    Number(i64),
    /// Boolean flag.
    Flag(bool),
    /// Explicitly absent parameter; keeps later positions stable.
    Missing,
}

impl From<&str> for KeyParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for KeyParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeyParam {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for KeyParam {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl<T> From<Option<T>> for KeyParam
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Into::into)
    }
}

impl fmt::Display for KeyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Number(number) => write!(f, "{number}"),
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Missing => f.write_str("-"),
        }
    }
}

/// Cache key: a resource name plus an ordered parameter tuple.
///
/// Two keys are equal only when the resource and every parameter match in
/// order, so `(patients, "approved", "")` and `(patients, "approved", "ann")`
/// are distinct cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: &'static str,
    params: Vec<KeyParam>,
}

impl QueryKey {
    /// Start a key for `resource` with no parameters.
    #[must_use]
    pub const fn new(resource: &'static str) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter.
    #[must_use]
    pub fn with(mut self, param: impl Into<KeyParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Resource name this key belongs to.
    #[must_use]
    pub const fn resource(&self) -> &'static str {
        self.resource
    }

    /// Ordered parameter tuple.
    #[must_use]
    pub fn params(&self) -> &[KeyParam] {
        &self.params
    }

    /// Return whether this key falls under `prefix`.
    #[must_use]
    pub fn matches(&self, prefix: &QueryPrefix) -> bool {
        self.resource == prefix.resource && self.params.starts_with(&prefix.params)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource)?;
        for param in &self.params {
            write!(f, "/{param}")?;
        }
        Ok(())
    }
}

/// Selects every key under a resource, optionally narrowed by leading
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPrefix {
    resource: &'static str,
    params: Vec<KeyParam>,
}

impl QueryPrefix {
    /// Prefix covering every key of `resource`.
    #[must_use]
    pub const fn resource(resource: &'static str) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    /// Narrow the prefix with the next leading parameter.
    #[must_use]
    pub fn with(mut self, param: impl Into<KeyParam>) -> Self {
        self.params.push(param.into());
        self
    }
}

impl From<&QueryKey> for QueryPrefix {
    fn from(key: &QueryKey) -> Self {
        Self {
            resource: key.resource,
            params: key.params.clone(),
        }
    }
}

impl fmt::Display for QueryPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource)?;
        for param in &self.params {
            write!(f, "/{param}")?;
        }
        f.write_str("/*")
    }
}
