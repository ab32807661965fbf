//! Synchronous hooks the machine calls on the execution thread.
//!
//! PC listeners see the address following each retired instruction. When an
//! interrupt is accepted at that boundary they are called a second time
//! with the vector target.

use std::collections::BTreeMap;
use std::fmt;

/// Called with the new program counter.
pub type PcListener = Box<dyn FnMut(u16) + Send>;

/// Which program-counter values a [`PcListener`] is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Scope {
    /// Every PC change.
    All,
    /// Only changes that land on this address.
    Address(u16),
}

/// Handle returned by [`PcListeners::add`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// PC listeners grouped by scope.
#[derive(Default)]
pub struct PcListeners {
    next_id: u64,
    by_scope: BTreeMap<Scope, Vec<(ListenerId, PcListener)>>,
}

impl fmt::Debug for PcListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcListeners")
            .field("scopes", &self.by_scope.keys().collect::<Vec<_>>())
            .field("len", &self.len())
            .finish()
    }
}

impl PcListeners {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `scope`.
    pub fn add(&mut self, scope: Scope, listener: PcListener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.by_scope.entry(scope).or_default().push((id, listener));
        id
    }

    /// Removes a listener; returns false when `id` is not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let mut emptied = None;
        let mut found = false;
        for (scope, listeners) in &mut self.by_scope {
            if let Some(index) = listeners.iter().position(|(entry, _)| *entry == id) {
                listeners.remove(index);
                found = true;
                if listeners.is_empty() {
                    emptied = Some(*scope);
                }
                break;
            }
        }
        if let Some(scope) = emptied {
            self.by_scope.remove(&scope);
        }
        found
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_scope.values().map(Vec::len).sum()
    }

    /// Returns true when no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_scope.is_empty()
    }

    /// Calls the global listeners, then those scoped to `pc`.
    pub fn notify(&mut self, pc: u16) {
        for scope in [Scope::All, Scope::Address(pc)] {
            if let Some(listeners) = self.by_scope.get_mut(&scope) {
                for (_, listener) in listeners.iter_mut() {
                    listener(pc);
                }
            }
        }
    }
}
