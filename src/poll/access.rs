// src/poll/access.rs

//! Authorization Set: the canonical addresses allowed to issue commands.

use std::collections::BTreeMap;

use tracing::info;

use crate::errors::{ChatShellError, Result};
use crate::transport::ChatTransport;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSet {
    /// Lower-cased address -> canonical address as the transport reports it.
    members: BTreeMap<String, String>,
}

impl AuthorizationSet {
    /// Resolve every configured address once. Any failure is fatal.
    pub async fn resolve(transport: &dyn ChatTransport, addresses: &[String]) -> Result<Self> {
        let mut set = Self::default();
        for address in addresses {
            let canonical = transport.resolve_identity(address).await.map_err(|e| {
                ChatShellError::Authorization(format!("could not resolve '{address}': {e}"))
            })?;
            info!(configured = %address, canonical = %canonical, "authorized sender resolved");
            set.insert(canonical);
        }

        if set.is_empty() {
            return Err(ChatShellError::Authorization(
                "no authorized senders configured".to_string(),
            ));
        }
        Ok(set)
    }

    /// Build from addresses that are already canonical.
    pub fn from_canonical<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for a in addresses {
            set.insert(a.into());
        }
        set
    }

    fn insert(&mut self, canonical: String) {
        self.members.insert(canonical.to_lowercase(), canonical);
    }

    /// The canonical form of `sender`, if authorized.
    pub fn authorize(&self, sender: &str) -> Option<&str> {
        self.members
            .get(&sender.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Comma separated canonical addresses, for the help text.
    pub fn describe(&self) -> String {
        self.members
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ignores_case() {
        let set = AuthorizationSet::from_canonical(["Ops@Example.com"]);
        assert_eq!(set.authorize("ops@example.com"), Some("Ops@Example.com"));
        assert_eq!(set.authorize(" OPS@EXAMPLE.COM "), Some("Ops@Example.com"));
        assert_eq!(set.authorize("intruder@example.com"), None);
    }

    #[test]
    fn describe_lists_members() {
        let set = AuthorizationSet::from_canonical(["b@example.com", "a@example.com"]);
        assert_eq!(set.describe(), "a@example.com, b@example.com");
        assert_eq!(set.len(), 2);
    }
}
