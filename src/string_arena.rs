//! String interning arenas
//!
//! Decoded messages cross a thread boundary by value, so they cannot own
//! heap strings. Instead every string payload is interned into an arena and
//! the message carries a [`Symbol`] handle.
//!
//! Two kinds of arena exist at runtime:
//!
//! - one [`SharedArena`] per capture, written by that capture's decode thread
//!   and read by the aggregator while draining;
//! - one plain [`StringArena`] owned by the data model, into which strings are
//!   copied at aggregation time. Model records never hold a symbol from a
//!   capture arena, so capture arenas can be dropped with their worker.

use fnv::FnvHashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Handle to a string interned in a specific arena
///
/// A symbol is only meaningful together with the arena that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Append-only string interner
#[derive(Debug, Default)]
pub struct StringArena {
    strings: Vec<Box<str>>,
    lookup: FnvHashMap<Box<str>, Symbol>,
}

impl StringArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning the existing symbol if it was seen before
    pub fn intern(&mut self, value: &str) -> Symbol {
        if let Some(&symbol) = self.lookup.get(value) {
            return symbol;
        }
        let symbol = Symbol(self.strings.len() as u32);
        self.strings.push(value.into());
        self.lookup.insert(value.into(), symbol);
        symbol
    }

    pub fn get(&self, value: &str) -> Option<Symbol> {
        self.lookup.get(value).copied()
    }

    pub fn resolve(&self, symbol: Symbol) -> Option<&str> {
        self.strings.get(symbol.0 as usize).map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Capture-scoped arena shared between a decode thread and the aggregator
///
/// Cloning yields another handle to the same arena.
#[derive(Debug, Clone, Default)]
pub struct SharedArena {
    inner: Arc<RwLock<StringArena>>,
}

impl SharedArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, value: &str) -> Symbol {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .intern(value)
    }

    /// Copy the string behind `symbol` into `target`, returning the target's symbol
    pub fn copy_into(&self, symbol: Symbol, target: &mut StringArena) -> Option<Symbol> {
        let arena = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        arena.resolve(symbol).map(|value| target.intern(value))
    }

    pub fn resolve_owned(&self, symbol: Symbol) -> Option<String> {
        let arena = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        arena.resolve(symbol).map(str::to_owned)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
