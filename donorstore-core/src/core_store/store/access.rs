/*
    access.rs - Write access policy of a store

    Wildcard admits every peer's writes without checking anything. An
    identity set admits only the listed origins; entries from anyone else
    are dropped at merge time and refused at put time.
*/

use crate::core_store::model::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Configuration token meaning "anyone may write"
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPolicy {
    Wildcard,
    Identities(BTreeSet<PeerId>),
}

impl AccessPolicy {
    /// Build from a `write` list as found in configuration.
    ///
    /// Any `"*"` in the list makes the policy a wildcard.
    pub fn from_write_list<I, S>(list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut identities = BTreeSet::new();
        for item in list {
            let item = item.as_ref().trim();
            if item == WILDCARD {
                return AccessPolicy::Wildcard;
            }
            if !item.is_empty() {
                identities.insert(PeerId::new(item));
            }
        }
        AccessPolicy::Identities(identities)
    }

    pub fn permits(&self, peer: &PeerId) -> bool {
        match self {
            AccessPolicy::Wildcard => true,
            AccessPolicy::Identities(set) => set.contains(peer),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, AccessPolicy::Wildcard)
    }

    /// Canonical text form, part of the store address
    pub fn fingerprint(&self) -> String {
        match self {
            AccessPolicy::Wildcard => WILDCARD.to_string(),
            AccessPolicy::Identities(set) => {
                set.iter().map(PeerId::as_str).collect::<Vec<_>>().join(",")
            }
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy::Wildcard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_from_list() {
        let policy = AccessPolicy::from_write_list(["peer-a", "*"]);
        assert!(policy.is_wildcard());
        assert!(policy.permits(&PeerId::new("anyone")));
        assert_eq!(policy.fingerprint(), "*");
    }

    #[test]
    fn test_identity_set() {
        let policy = AccessPolicy::from_write_list(vec![" peer-b ".to_string(), "peer-a".to_string()]);
        assert!(!policy.is_wildcard());
        assert!(policy.permits(&PeerId::new("peer-a")));
        assert!(policy.permits(&PeerId::new("peer-b")));
        assert!(!policy.permits(&PeerId::new("peer-c")));
        assert_eq!(policy.fingerprint(), "peer-a,peer-b");
    }

    #[test]
    fn test_empty_list_admits_nobody() {
        let policy = AccessPolicy::from_write_list(Vec::<String>::new());
        assert!(!policy.permits(&PeerId::new("peer-a")));
    }
}
