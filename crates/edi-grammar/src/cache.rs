//! Cache of compiled grammars
//!
//! Each key gets one slot that is filled at most once. Concurrent requests
//! for a key that is being compiled wait for that compilation instead of
//! starting their own; a failed compilation is remembered and every later
//! request gets the same error.

use crate::editype::Editype;
use crate::model::{Grammar, GrammarKind};
use crate::Result;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Identity of a compiled grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub editype: Editype,
    pub name: String,
    pub kind: GrammarKind,
}

impl CacheKey {
    pub fn new(editype: Editype, name: impl Into<String>, kind: GrammarKind) -> Self {
        Self {
            editype,
            name: name.into(),
            kind,
        }
    }
}

type Slot = Arc<OnceLock<Result<Arc<Grammar>>>>;

/// Thread-safe, compile-once grammar cache.
#[derive(Debug, Default)]
pub struct GrammarCache {
    slots: DashMap<CacheKey, Slot>,
}

impl GrammarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `key`, running `compile` when there is
    /// none yet.
    ///
    /// # Errors
    ///
    /// Returns the compilation error, now or as remembered from an earlier
    /// attempt.
    pub fn get_or_compile<F>(&self, key: &CacheKey, compile: F) -> Result<Arc<Grammar>>
    where
        F: FnOnce() -> Result<Arc<Grammar>>,
    {
        // The shard lock is released before compiling; only the slot blocks.
        let slot: Slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());
        let mut compiled = false;
        let result = slot.get_or_init(|| {
            compiled = true;
            debug!(editype = %key.editype, name = %key.name, kind = %key.kind, "compiling grammar");
            compile()
        });
        if !compiled {
            trace!(editype = %key.editype, name = %key.name, kind = %key.kind, "grammar cache hit");
        }
        result.clone()
    }

    /// Cached result for `key`, when compilation has finished.
    pub fn get(&self, key: &CacheKey) -> Option<Result<Arc<Grammar>>> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Forget every entry, including remembered failures.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SplitCriteria;
    use crate::syntax::{RawSyntax, Syntax};
    use crate::Error;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_grammar(name: &str) -> Arc<Grammar> {
        Arc::new(Grammar {
            editype: Editype::Csv,
            name: name.to_string(),
            kind: GrammarKind::Partner,
            syntax: Syntax::default(),
            declared_syntax: RawSyntax::default(),
            root: None,
            recorddefs: BTreeMap::new(),
            split: SplitCriteria::None,
            record_id_span: None,
        })
    }

    #[test]
    fn compiles_once_per_key() {
        let cache = GrammarCache::new();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new(Editype::Csv, "orders", GrammarKind::Message);
        for _ in 0..3 {
            let grammar = cache
                .get_or_compile(&key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(empty_grammar("orders"))
                })
                .unwrap();
            assert_eq!(grammar.name, "orders");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(&key));
    }

    #[test]
    fn failure_is_replayed() {
        let cache = GrammarCache::new();
        let key = CacheKey::new(Editype::Csv, "broken", GrammarKind::Message);
        let first = cache
            .get_or_compile(&key, || Err(Error::syntax("broken", "bad separator")))
            .unwrap_err();
        let second = cache
            .get_or_compile(&key, || Ok(empty_grammar("broken")))
            .unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn kinds_are_cached_apart() {
        let cache = GrammarCache::new();
        let message = CacheKey::new(Editype::Csv, "x", GrammarKind::Message);
        let partner = CacheKey::new(Editype::Csv, "x", GrammarKind::Partner);
        cache.get_or_compile(&message, || Ok(empty_grammar("x"))).unwrap();
        assert!(!cache.contains(&partner));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_requests_share_one_compilation() {
        let cache = Arc::new(GrammarCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(Editype::Csv, "shared", GrammarKind::Message);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let key = key.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_compile(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(empty_grammar("shared"))
                        })
                        .map(|g| g.name.clone())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
