//! Per-source line breakpoints.

use std::collections::{HashMap, HashSet};

/// Line breakpoints keyed by normalized source id.
///
/// Callers must normalize source ids before touching the set; an
/// unnormalized key would silently never match the hook's lookups.
#[derive(Debug, Default)]
pub struct BreakpointSet {
    sources: HashMap<String, HashSet<u32>>,
}

impl BreakpointSet {
    /// Replace all breakpoints of `source` atomically.
    pub fn set(&mut self, source: String, lines: impl IntoIterator<Item = u32>) {
        let lines: HashSet<u32> = lines.into_iter().collect();
        if lines.is_empty() {
            self.sources.remove(&source);
        } else {
            self.sources.insert(source, lines);
        }
    }

    /// Membership probe on the hook's hot path.
    pub fn contains(&self, source: &str, line: u32) -> bool {
        self.sources
            .get(source)
            .is_some_and(|lines| lines.contains(&line))
    }

    /// Fast guard for the common case of a breakpoint-free run.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }
}
