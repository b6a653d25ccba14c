//! Spine - Symbol Registry
//!
//! Process-wide mapping between symbol strings and dense `u32` ids.
//!
//! Ids are assigned in first-seen order starting at 1; id 0 is reserved as
//! invalid. Once assigned an id never changes and is never reused, so ids
//! can be embedded in wire frames and recorded segments. The registry is
//! read-mostly: lookups take a shared lock, only the first sighting of a
//! symbol takes the exclusive lock.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Reserved invalid id
pub const INVALID_SYMBOL_ID: u32 = 0;

#[derive(Debug, Default)]
struct Inner {
    by_name: HashMap<String, u32>,
    /// Indexed by id; slot 0 holds the reserved empty name
    names: Vec<String>,
}

/// Thread-safe string ⇆ dense-id mapping
#[derive(Debug)]
pub struct SymbolRegistry {
    inner: RwLock<Inner>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_name: HashMap::new(),
                names: vec![String::new()],
            }),
        }
    }

    /// Look up `symbol`, assigning the next dense id on first sight
    ///
    /// Concurrent callers racing on a new symbol all receive the same id;
    /// the id sequence is gap-free for returned ids.
    pub fn get_or_add(&self, symbol: &str) -> u32 {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.by_name.get(symbol) {
                return id;
            }
        }

        let mut inner = self.inner.write();
        // Double-check: another writer may have won the race
        if let Some(&id) = inner.by_name.get(symbol) {
            return id;
        }

        let id = inner.names.len() as u32;
        inner.names.push(symbol.to_owned());
        inner.by_name.insert(symbol.to_owned(), id);
        id
    }

    /// Reverse lookup; `None` for id 0 or ids never assigned
    pub fn by_id(&self, id: u32) -> Option<String> {
        if id == INVALID_SYMBOL_ID {
            return None;
        }
        self.inner.read().names.get(id as usize).cloned()
    }

    /// All registered `(id, name)` pairs in id order
    pub fn snapshot(&self) -> Vec<(u32, String)> {
        let inner = self.inner.read();
        inner
            .names
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, name)| (id as u32, name.clone()))
            .collect()
    }

    /// Number of registered symbols
    pub fn len(&self) -> usize {
        self.inner.read().names.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
