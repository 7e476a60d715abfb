// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Opaque identifiers for sessions and process instances.
//!
//! Only non-emptiness is checked here. Whatever format the capture side picks
//! (uuid, hex, ...) is stored and compared verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Textual identifier of one app-usage session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionIdentifier(String);

impl SessionIdentifier {
    pub fn new(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(StoreError::InvalidIdentifier("session"));
        }
        Ok(Self(value))
    }

    /// Generates a fresh identifier backed by a v4 uuid.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded identifier of one process instance.
///
/// Every launch of the host application gets a new value, which is how spans
/// and metadata left behind by a previous (possibly crashed) launch are told
/// apart from the ones owned by the running process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessIdentifier(String);

impl ProcessIdentifier {
    pub fn new(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(StoreError::InvalidIdentifier("process"));
        }
        Ok(Self(value))
    }

    pub fn random() -> Self {
        Self(format!("{:08X}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_identifiers_are_rejected() {
        assert!(matches!(
            SessionIdentifier::new(""),
            Err(StoreError::InvalidIdentifier("session"))
        ));
        assert!(matches!(
            ProcessIdentifier::new("  "),
            Err(StoreError::InvalidIdentifier("process"))
        ));
    }

    #[test]
    fn test_identifiers_are_not_format_checked() {
        let session = SessionIdentifier::new("not-a-uuid").unwrap();
        assert_eq!(session.as_str(), "not-a-uuid");
        let process = ProcessIdentifier::new("xyz").unwrap();
        assert_eq!(process.to_string(), "xyz");
    }

    #[test]
    fn test_random_process_identifier_is_hex() {
        let process = ProcessIdentifier::random();
        assert_eq!(process.as_str().len(), 8);
        assert!(process.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(SessionIdentifier::random(), SessionIdentifier::random());
    }
}
