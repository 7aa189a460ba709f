//! Process-wide compile cache keyed by selector text.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::error::SelectorResult;
use crate::program::Program;

/// Hit/miss counters and size of a [`SelectorCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Cache of compiled programs.
///
/// Only successful compilations are cached. Compilation happens outside the
/// lock; two threads racing on the same text both compile and the first
/// insert wins.
#[derive(Debug, Default)]
pub struct SelectorCache {
    programs: RwLock<HashMap<String, Arc<Program>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide cache.
    pub fn global() -> &'static SelectorCache {
        static GLOBAL: OnceLock<SelectorCache> = OnceLock::new();
        GLOBAL.get_or_init(SelectorCache::new)
    }

    /// Compiled program for `source`, plus whether it came from the cache.
    pub fn get_or_compile(&self, source: &str) -> SelectorResult<(Arc<Program>, bool)> {
        let cached = self
            .programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned();
        if let Some(program) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((program, true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let program = Arc::new(Program::compile(source)?);
        debug!(selector = %source, "compiled selector");

        let mut programs = self.programs.write().unwrap_or_else(PoisonError::into_inner);
        let entry = programs.entry(source.to_string()).or_insert(program);
        Ok((Arc::clone(entry), false))
    }

    pub fn compile(&self, source: &str) -> SelectorResult<Arc<Program>> {
        self.get_or_compile(source).map(|(program, _)| program)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.programs.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    pub fn clear(&self) {
        self.programs.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
