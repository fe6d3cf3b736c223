//! Record identity and client-side identifier generation.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every locally generated record identifier.
pub const LOCAL_ID_PREFIX: &str = "local_";

const SUFFIX_LEN: usize = 9;

/// How a cached record is identified.
///
/// A record created while offline carries a `Pending` placeholder id until
/// the server confirms it; from then on it is keyed by the server id only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordIdentity {
    /// Server-issued identifier.
    Confirmed(String),
    /// Client-generated placeholder, not yet known to the server.
    Pending(String),
}

impl RecordIdentity {
    /// Returns the identifier string regardless of state.
    pub fn as_str(&self) -> &str {
        match self {
            RecordIdentity::Confirmed(id) | RecordIdentity::Pending(id) => id,
        }
    }

    /// Returns true for a placeholder identity.
    pub fn is_pending(&self) -> bool {
        matches!(self, RecordIdentity::Pending(_))
    }

    /// Returns the server id, if confirmed.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            RecordIdentity::Confirmed(id) => Some(id),
            RecordIdentity::Pending(_) => None,
        }
    }

    /// Returns the local placeholder id, if pending.
    pub fn local_id(&self) -> Option<&str> {
        match self {
            RecordIdentity::Pending(id) => Some(id),
            RecordIdentity::Confirmed(_) => None,
        }
    }

    /// Returns true if `identifier` names this record.
    pub fn matches(&self, identifier: &str) -> bool {
        self.as_str() == identifier
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIdentity::Confirmed(id) => write!(f, "{id}"),
            RecordIdentity::Pending(id) => write!(f, "{id} (pending)"),
        }
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Generates a placeholder record id: `local_<millis>_<suffix>`.
pub fn generate_local_id() -> String {
    format!(
        "{LOCAL_ID_PREFIX}{}_{}",
        Utc::now().timestamp_millis(),
        random_suffix()
    )
}

/// Generates a queue-internal mutation id: `<millis>-<suffix>`.
pub fn generate_mutation_id() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_accessors() {
        let confirmed = RecordIdentity::Confirmed("abc".into());
        assert_eq!(confirmed.server_id(), Some("abc"));
        assert_eq!(confirmed.local_id(), None);
        assert!(!confirmed.is_pending());

        let pending = RecordIdentity::Pending("local_1_x".into());
        assert_eq!(pending.local_id(), Some("local_1_x"));
        assert_eq!(pending.server_id(), None);
        assert!(pending.is_pending());
        assert!(pending.matches("local_1_x"));
    }

    #[test]
    fn identity_serializes_tagged() {
        let json = serde_json::to_string(&RecordIdentity::Pending("local_9".into())).unwrap();
        assert_eq!(json, r#"{"pending":"local_9"}"#);

        let back: RecordIdentity = serde_json::from_str(r#"{"confirmed":"srv-1"}"#).unwrap();
        assert_eq!(back, RecordIdentity::Confirmed("srv-1".into()));
    }

    #[test]
    fn generated_ids_are_unique() {
        let local: HashSet<String> = (0..200).map(|_| generate_local_id()).collect();
        assert_eq!(local.len(), 200);
        assert!(local.iter().all(|id| id.starts_with(LOCAL_ID_PREFIX)));

        let queued: HashSet<String> = (0..200).map(|_| generate_mutation_id()).collect();
        assert_eq!(queued.len(), 200);
        assert!(queued.iter().all(|id| !id.starts_with(LOCAL_ID_PREFIX)));
    }
}
