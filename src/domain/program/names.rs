//! Identifier allocation.

use std::collections::{HashMap, HashSet};

/// Hands out unique identifiers for inputs and globals.
///
/// The first request for a base name gets it unchanged; later requests get
/// `_2`, `_3`, ... in request order. Allocation order is emission order, so
/// the same graph always yields the same names.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    taken: HashSet<String>,
    next_suffix: HashMap<String, usize>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let suffix = self.next_suffix.entry(base.to_string()).or_insert(2);
        loop {
            let candidate = format!("{}_{}", base, suffix);
            *suffix += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Mark a fixed identifier as used so later allocations avoid it.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_in_request_order() {
        let mut names = NameRegistry::new();
        assert_eq!(names.allocate("InpPartialClosePercent"), "InpPartialClosePercent");
        assert_eq!(names.allocate("InpPartialClosePercent"), "InpPartialClosePercent_2");
        assert_eq!(names.allocate("InpPartialClosePercent"), "InpPartialClosePercent_3");
    }

    #[test]
    fn skips_suffix_already_taken() {
        let mut names = NameRegistry::new();
        names.reserve("x_2");
        assert_eq!(names.allocate("x"), "x");
        assert_eq!(names.allocate("x"), "x_3");
    }

    #[test]
    fn reserved_base_is_suffixed() {
        let mut names = NameRegistry::new();
        names.reserve("trade");
        assert_eq!(names.allocate("trade"), "trade_2");
        assert_eq!(names.allocate("trade"), "trade_3");
    }
}
