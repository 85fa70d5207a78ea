//! Identifier newtypes for normalized records.
//!
//! A [`DataId`] addresses exactly one record. Server identifiers come from
//! the server's global object identification field and are stable; client
//! identifiers are generated locally by [`ClientIdGenerator`] and always
//! carry the client prefix so the two kinds can never collide.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix carried by every locally generated identifier.
pub const CLIENT_ID_PREFIX: &str = "client:";

/// Identifier of a normalized record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(String);

impl DataId {
    /// Wraps a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        DataId(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this identifier was generated on the client.
    pub fn is_client_id(&self) -> bool {
        self.0.starts_with(CLIENT_ID_PREFIX)
    }
}

impl Borrow<str> for DataId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DataId {
    fn from(id: &str) -> Self {
        DataId(id.to_string())
    }
}

impl From<String> for DataId {
    fn from(id: String) -> Self {
        DataId(id)
    }
}

/// Identifier of a client-side mutation, echoed back by the server as
/// `clientMutationId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMutationId(String);

impl ClientMutationId {
    pub fn new(id: impl Into<String>) -> Self {
        ClientMutationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientMutationId {
    fn from(id: &str) -> Self {
        ClientMutationId(id.to_string())
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClientMutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates client identifiers for records with no server identity.
///
/// Each store owns one generator, so identifiers are unique per store and
/// deterministic for a given sequence of writes.
#[derive(Debug, Clone)]
pub struct ClientIdGenerator {
    prefix: String,
    next: u64,
}

impl ClientIdGenerator {
    /// Creates a generator using [`CLIENT_ID_PREFIX`].
    pub fn new() -> Self {
        Self::with_prefix(CLIENT_ID_PREFIX)
    }

    /// Creates a generator with a custom prefix.
    ///
    /// Identifiers produced with a prefix other than [`CLIENT_ID_PREFIX`]
    /// are not recognized by [`DataId::is_client_id`].
    pub fn with_prefix(prefix: &str) -> Self {
        ClientIdGenerator {
            prefix: prefix.to_string(),
            next: 0,
        }
    }

    /// Returns a fresh client identifier.
    pub fn generate(&mut self) -> DataId {
        let id = DataId(format!("{}{}", self.prefix, self.next));
        self.next += 1;
        id
    }

    /// Moves the counter past `id` if it is one this generator could have
    /// produced. Edge ids and foreign ids are ignored.
    pub fn reserve(&mut self, id: &DataId) {
        let counter = id
            .as_str()
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.parse::<u64>().ok());
        if let Some(n) = counter {
            self.next = self.next.max(n.saturating_add(1));
        }
    }

    /// Returns the deterministic identifier of the edge joining `connection`
    /// to `node`.
    pub fn edge_id(&self, connection: &DataId, node: &DataId) -> DataId {
        DataId(format!("{}{}:{}", self.prefix, connection, node))
    }
}

impl Default for ClientIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_recognized() {
        let mut ids = ClientIdGenerator::new();
        let first = ids.generate();
        let second = ids.generate();
        assert_eq!(first.as_str(), "client:0");
        assert_eq!(second.as_str(), "client:1");
        assert!(first.is_client_id());
        assert!(!DataId::from("4").is_client_id());
    }

    #[test]
    fn edge_ids_are_deterministic() {
        let ids = ClientIdGenerator::new();
        let edge = ids.edge_id(&"client:3".into(), &"node1".into());
        assert_eq!(edge.as_str(), "client:client:3:node1");
        assert_eq!(edge, ids.edge_id(&"client:3".into(), &"node1".into()));
    }

    #[test]
    fn reserving_moves_past_the_highest_counter() {
        let mut ids = ClientIdGenerator::new();
        ids.reserve(&"client:7".into());
        ids.reserve(&"client:2".into());
        ids.reserve(&"client:client:9:4".into());
        ids.reserve(&"42".into());
        assert_eq!(ids.generate().as_str(), "client:8");
    }

    #[test]
    fn serde_is_transparent() {
        let id = DataId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: DataId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }
}
