//! Address-keyed breakpoint set.

use std::collections::BTreeMap;

/// One breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Breakpoint {
    /// Code address the breakpoint fires at.
    pub address: u16,
    /// Disabled breakpoints stay in the set but never fire.
    pub enabled: bool,
}

impl Breakpoint {
    /// An enabled breakpoint at `address`.
    #[must_use]
    pub const fn at(address: u16) -> Self {
        Self {
            address,
            enabled: true,
        }
    }
}

/// Breakpoints ordered by address, at most one per address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BreakpointSet {
    entries: BTreeMap<u16, bool>,
}

impl BreakpointSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Inserts or replaces the breakpoint at `breakpoint.address`.
    pub fn insert(&mut self, breakpoint: Breakpoint) {
        self.entries.insert(breakpoint.address, breakpoint.enabled);
    }

    /// Removes the breakpoint at `address`; returns false if there was none.
    pub fn remove(&mut self, address: u16) -> bool {
        self.entries.remove(&address).is_some()
    }

    /// Enables or disables an existing breakpoint; returns false if there is none.
    pub fn set_enabled(&mut self, address: u16, enabled: bool) -> bool {
        match self.entries.get_mut(&address) {
            Some(slot) => {
                *slot = enabled;
                true
            }
            None => false,
        }
    }

    /// Breakpoint at `address`, if any.
    #[must_use]
    pub fn get(&self, address: u16) -> Option<Breakpoint> {
        self.entries
            .get(&address)
            .map(|&enabled| Breakpoint { address, enabled })
    }

    /// Returns true when an enabled breakpoint sits at `address`.
    #[must_use]
    pub fn is_hit(&self, address: u16) -> bool {
        self.entries.get(&address).copied().unwrap_or(false)
    }

    /// Breakpoints in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = Breakpoint> + '_ {
        self.entries
            .iter()
            .map(|(&address, &enabled)| Breakpoint { address, enabled })
    }

    /// Number of breakpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<Breakpoint> for BreakpointSet {
    fn from_iter<T: IntoIterator<Item = Breakpoint>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Breakpoint> for BreakpointSet {
    fn extend<T: IntoIterator<Item = Breakpoint>>(&mut self, iter: T) {
        for breakpoint in iter {
            self.insert(breakpoint);
        }
    }
}
