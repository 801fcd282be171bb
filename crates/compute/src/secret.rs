//! Secret values and the store they are resolved from.
//!
//! [`SecretString`] never shows its value in `Debug`, `Display` or serialized
//! output. Reading it requires an explicit [`SecretString::expose`].

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The actual value. Only pass it straight to the client that needs it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "\"\"")
        } else {
            write!(f, "\"[REDACTED]\"")
        }
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, "[REDACTED]")
        }
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Resolves secret references at invocation time.
pub trait SecretStore: Send + Sync + fmt::Debug {
    fn resolve(&self, secret_id: &str) -> Option<SecretString>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, SecretString>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret_id: impl Into<String>, value: impl Into<SecretString>) -> Self {
        self.secrets.insert(secret_id.into(), value.into());
        self
    }
}

impl SecretStore for InMemorySecretStore {
    fn resolve(&self, secret_id: &str) -> Option<SecretString> {
        self.secrets.get(secret_id).cloned()
    }
}
