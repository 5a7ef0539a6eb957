//! Header allow/deny filtering.
//!
//! # Responsibilities
//! - Decide whether a header name crosses the proxy boundary
//! - Support a `*` wildcard meaning "all headers"
//!
//! # Design Decisions
//! - Matching is case-insensitive (header names are)
//! - Deny wins over allow on overlap
//! - Default posture is allow-everything, narrowed by configuration

use std::collections::HashSet;

/// One side of the filter: either "everything" or an explicit name set.
#[derive(Debug, Clone, Default)]
struct HeaderSet {
    all: bool,
    names: HashSet<String>,
}

impl HeaderSet {
    fn clear(&mut self) {
        self.all = false;
        self.names.clear();
    }

    fn add(&mut self, name: &str) {
        if name == "*" {
            self.all = true;
        } else {
            self.names.insert(name.to_ascii_lowercase());
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.all || self.names.contains(&name.to_ascii_lowercase())
    }
}

/// Ordered allow/deny rule set over header names.
#[derive(Debug, Clone, Default)]
pub struct FilterList {
    allowed: HeaderSet,
    denied: HeaderSet,
}

impl FilterList {
    /// A filter that lets every header through.
    pub fn allow_all() -> Self {
        let mut list = FilterList::default();
        list.allowed.add("*");
        list
    }

    /// Replace the allow side with the given names.
    ///
    /// An empty list leaves the current allow side untouched, so the
    /// allow-everything default survives an absent `forward` setting.
    pub fn set_forwarded<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut replaced = false;
        for name in names {
            if !replaced {
                self.allowed.clear();
                replaced = true;
            }
            self.allowed.add(name.as_ref());
        }
    }

    /// Add names to the deny side. Deny wins over allow.
    pub fn set_discarded<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.denied.add(name.as_ref());
        }
    }

    /// Whether `name` is allowed across the boundary.
    pub fn contains(&self, name: &str) -> bool {
        self.allowed.matches(name) && !self.denied.matches(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_everything() {
        let list = FilterList::allow_all();
        assert!(list.contains("User-Agent"));
        assert!(list.contains("x-custom"));
    }

    #[test]
    fn test_forward_narrows_the_allow_side() {
        let mut list = FilterList::allow_all();
        list.set_forwarded(["Accept", "User-Agent"]);
        assert!(list.contains("accept"));
        assert!(list.contains("USER-AGENT"));
        assert!(!list.contains("Cookie"));
    }

    #[test]
    fn test_discard_wins_on_overlap() {
        let mut list = FilterList::allow_all();
        list.set_forwarded(["Accept", "Cookie"]);
        list.set_discarded(["Cookie"]);
        assert!(list.contains("Accept"));
        assert!(!list.contains("Cookie"));
    }

    #[test]
    fn test_discard_wildcard_blocks_all() {
        let mut list = FilterList::allow_all();
        list.set_discarded(["*"]);
        assert!(!list.contains("Accept"));
    }

    #[test]
    fn test_empty_forward_keeps_allow_all() {
        let mut list = FilterList::allow_all();
        list.set_forwarded(Vec::<String>::new());
        assert!(list.contains("Anything"));
    }
}
