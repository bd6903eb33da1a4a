// src/poll/dedup.rs

use std::collections::HashSet;

/// Message IDs that have already been dispatched.
///
/// Grows for the lifetime of the process, like the registry.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`. Returns true the first time an ID is seen.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_is_rejected() {
        let mut d = DedupSet::new();
        assert!(d.insert("m1"));
        assert!(!d.insert("m1"));
        assert!(d.insert("m2"));
        assert_eq!(d.len(), 2);
    }
}
