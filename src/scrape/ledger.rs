//! Run-scoped record of admitted item identifiers.

use std::collections::HashSet;

/// Set of item ids admitted so far in this run, across every category
/// and page. The single source of truth for "already seen".
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    seen: HashSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Register an id. Returns true if it was not already present.
    pub fn register(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    /// Pre-load ids, e.g. from rows a previous run left in the sink.
    /// Returns how many were new.
    pub fn seed<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter(|id| self.register(id.as_ref()))
            .count()
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
    fn register_is_idempotent() {
        let mut ledger = Ledger::new();
        assert!(ledger.register("B001"));
        assert!(!ledger.register("B001"));
        assert!(ledger.contains("B001"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn seed_counts_only_new_ids() {
        let mut ledger = Ledger::new();
        ledger.register("B001");
        let added = ledger.seed(["B001", "B002", "B003", "B002"]);
        assert_eq!(added, 2);
        assert_eq!(ledger.len(), 3);
    }
}
