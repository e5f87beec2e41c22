//! Identifier types for bus participants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{BusError, IdValidationError};

/// Longest accepted identifier
pub const MAX_ID_LEN: usize = 128;

/// Identifier of a bus participant
///
/// Agents, chat clients and any other sender share this namespace. A
/// participant does not have to own a mailbox to send.
///
/// ## Validation
/// Valid IDs are non-empty, carry no leading/trailing whitespace, are at
/// most [`MAX_ID_LEN`] characters, and use only alphanumerics, hyphens,
/// underscores, and dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Parse and validate an agent ID from a string
    ///
    /// # Examples
    ///
    /// ```
    /// use troupe_bus::AgentId;
    ///
    /// assert!(AgentId::parse("agent-1").is_ok());
    /// assert!(AgentId::parse("chat-client.42").is_ok());
    ///
    /// assert!(AgentId::parse("").is_err());
    /// assert!(AgentId::parse(" agent").is_err());
    /// assert!(AgentId::parse("agent/path").is_err());
    /// ```
    pub fn parse(id: impl AsRef<str>) -> Result<Self, BusError> {
        let s = id.as_ref();
        validate(s).map_err(|source| BusError::InvalidId {
            id: s.to_string(),
            source,
        })?;
        Ok(Self(s.to_string()))
    }

    /// Fresh random identifier (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Fresh identifier with a readable prefix, e.g. `chat-client-<uuid>`
    ///
    /// The prefix is not validated beyond the character rules applied to
    /// the whole result, so callers should pass a constant.
    pub fn generate_with_prefix(prefix: &str) -> Result<Self, BusError> {
        Self::parse(format!("{prefix}-{}", Uuid::new_v4()))
    }

    /// Get the agent ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(s: &str) -> Result<(), IdValidationError> {
    if s.is_empty() {
        return Err(IdValidationError::Empty);
    }
    if s.trim().is_empty() {
        return Err(IdValidationError::WhitespaceOnly);
    }
    if s != s.trim() {
        return Err(IdValidationError::LeadingTrailingWhitespace);
    }
    let len = s.chars().count();
    if len > MAX_ID_LEN {
        return Err(IdValidationError::TooLong {
            len,
            max: MAX_ID_LEN,
        });
    }
    if !s
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(IdValidationError::InvalidCharacters);
    }
    Ok(())
}

impl FromStr for AgentId {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = BusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_validation() {
        assert!(AgentId::parse("agent-1").is_ok());
        assert!(AgentId::parse("my_agent").is_ok());
        assert!(AgentId::parse("agent.123").is_ok());

        let cases = [
            ("", IdValidationError::Empty),
            ("   ", IdValidationError::WhitespaceOnly),
            (" agent", IdValidationError::LeadingTrailingWhitespace),
            ("agent/path", IdValidationError::InvalidCharacters),
        ];
        for (input, expected) in cases {
            match AgentId::parse(input) {
                Err(BusError::InvalidId { source, .. }) => assert_eq!(source, expected),
                other => panic!("expected {expected:?} for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_agent_id_too_long() {
        let long = "a".repeat(MAX_ID_LEN + 1);
        assert!(matches!(
            AgentId::parse(&long),
            Err(BusError::InvalidId {
                source: IdValidationError::TooLong { .. },
                ..
            })
        ));
        assert!(AgentId::parse("a".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = AgentId::generate();
        let b = AgentId::generate();
        assert_ne!(a, b);
        assert!(AgentId::parse(a.as_str()).is_ok());

        let client = AgentId::generate_with_prefix("chat-client").unwrap();
        assert!(client.as_str().starts_with("chat-client-"));
    }

    #[test]
    fn test_serde_rejects_invalid_ids() {
        let ok: AgentId = serde_json::from_str("\"agent-1\"").unwrap();
        assert_eq!(ok.as_str(), "agent-1");
        assert!(serde_json::from_str::<AgentId>("\"bad id\"").is_err());
    }
}
