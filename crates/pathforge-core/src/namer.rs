//! Binding-variable names for generated queries.
//!
//! Names are positional: `prefix_0_id, prefix_1_id, …, prefix_id`. The namer
//! records every name it hands out so a projection can report names that were
//! allocated more than once, but it does not rename to avoid them.

use std::collections::BTreeMap;

/// `n` names for one node: `n - 1` indexed ones followed by `{prefix}_{postfix}`.
pub fn create_names(prefix: &str, postfix: &str, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    (0..n - 1)
        .map(|i| format!("{prefix}_{i}_{postfix}"))
        .chain(std::iter::once(format!("{prefix}_{postfix}")))
        .collect()
}

/// Accumulator of the names used within one projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingNamer {
    used: BTreeMap<String, usize>,
}

impl BindingNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, prefix: &str, postfix: &str, n: usize) -> Vec<String> {
        let names = create_names(prefix, postfix, n);
        for name in &names {
            *self.used.entry(name.clone()).or_default() += 1;
        }
        names
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Names handed out more than once, with how often.
    pub fn collisions(&self) -> impl Iterator<Item = (&str, usize)> {
        self.used
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(name, count)| (name.as_str(), *count))
    }
}
