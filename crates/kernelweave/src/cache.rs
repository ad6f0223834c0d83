//! In-memory cache of compiled programs.
//!
//! Kernels built from identical source share one program. Entries are keyed
//! by backend name, the SHA-256 of the composed source, and the compiler
//! options, so changing any of them forces a recompile.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};

use crate::backend::Backend;
use crate::error::Result;

/// Cache key of one compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    /// Backend name.
    pub backend: String,
    /// Lowercase hex SHA-256 of the source.
    pub source_hash: String,
    /// Compiler options, joined by spaces.
    pub options: String,
}

impl ProgramKey {
    /// Build the key for `source` compiled by `backend` with `options`.
    pub fn new(backend: &str, source: &str, options: &[String]) -> Self {
        Self {
            backend: backend.to_string(),
            source_hash: ProgramCache::hash_source(source),
            options: options.join(" "),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that compiled.
    pub misses: u64,
    /// Programs held.
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared cache of compiled programs.
///
/// Programs of different backends can live in one cache; each entry is
/// stored type-erased and recovered by the backend's program type.
#[derive(Default)]
pub struct ProgramCache {
    entries: RwLock<HashMap<ProgramKey, Arc<dyn Any + Send + Sync>>>,
    /// One guard per key being compiled; concurrent misses wait on it.
    compiling: Mutex<HashMap<ProgramKey, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ProgramCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ProgramCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache behind an `Arc`, ready to share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Computes the SHA-256 hash of kernel source, as lowercase hex.
    #[must_use]
    pub fn hash_source(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a program.
    pub fn get<P>(&self, key: &ProgramKey) -> Option<Arc<P>>
    where
        P: Send + Sync + 'static,
    {
        let entry = self.entries.read().get(key).cloned()?;
        entry.downcast::<P>().ok()
    }

    /// Store a program, replacing any previous entry for `key`.
    pub fn insert<P>(&self, key: ProgramKey, program: Arc<P>)
    where
        P: Send + Sync + 'static,
    {
        self.entries.write().insert(key, program);
    }

    /// Return the cached program for `source`, compiling it on a miss.
    ///
    /// Compile failures are not cached. Concurrent misses on one key compile
    /// once; the other callers wait and count as hits.
    pub fn get_or_compile<B>(
        &self,
        backend: &B,
        source: &str,
        kernel_name: &str,
        options: &[String],
    ) -> Result<Arc<B::Program>>
    where
        B: Backend,
    {
        let key = ProgramKey::new(backend.name(), source, options);

        if let Some(program) = self.get::<B::Program>(&key) {
            self.record_hit(kernel_name, &key);
            return Ok(program);
        }

        let guard = Arc::clone(self.compiling.lock().entry(key.clone()).or_default());
        let _compiling = guard.lock();

        // Another caller may have finished while this one waited.
        if let Some(program) = self.get::<B::Program>(&key) {
            self.record_hit(kernel_name, &key);
            return Ok(program);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kernel = kernel_name, hash = &key.source_hash[..8], "Program cache miss, compiling");

        let compiled = backend.compile(source, kernel_name, options).map(Arc::new);
        if let Ok(program) = &compiled {
            self.insert(key.clone(), Arc::clone(program));
        }
        self.compiling.lock().remove(&key);
        compiled
    }

    fn record_hit(&self, kernel_name: &str, key: &ProgramKey) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kernel = kernel_name, hash = &key.source_hash[..8], "Program cache hit");
    }

    /// Drop every entry. Statistics are kept.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordingBackend, RecordingProgram};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_hash_source() {
        let hash = ProgramCache::hash_source("__kernel void k() {}");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, ProgramCache::hash_source("__kernel void k() {}"));
        assert_ne!(hash, ProgramCache::hash_source("__kernel void j() {}"));
    }

    #[test]
    fn test_same_source_compiles_once() {
        let cache = ProgramCache::new();
        let backend = RecordingBackend::new();

        let first = cache.get_or_compile(&backend, "src", "k", &[]).unwrap();
        let second = cache.get_or_compile(&backend, "src", "k", &[]).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.compile_count(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_options_are_part_of_key() {
        let cache = ProgramCache::new();
        let backend = RecordingBackend::new();

        cache.get_or_compile(&backend, "src", "k", &[]).unwrap();
        cache
            .get_or_compile(&backend, "src", "k", &["-cl-mad-enable".to_string()])
            .unwrap();
        assert_eq!(backend.compile_count(), 2);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = ProgramCache::new();
        let backend = RecordingBackend::new();
        backend.fail_next_compile("boom");

        assert!(cache.get_or_compile(&backend, "src", "k", &[]).is_err());
        assert!(cache.get_or_compile(&backend, "src", "k", &[]).is_ok());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_concurrent_misses_compile_once() {
        let cache = &ProgramCache::new();
        let backend = &RecordingBackend::new();
        let barrier = &Barrier::new(8);

        let programs: Vec<Arc<RecordingProgram>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        barrier.wait();
                        cache.get_or_compile(backend, "src", "k", &[]).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(backend.compile_count(), 1);
        assert!(programs.iter().all(|p| Arc::ptr_eq(p, &programs[0])));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (7, 1, 1));
        assert!(cache.compiling.lock().is_empty());
    }

    #[test]
    fn test_wrong_program_type_reads_as_absent() {
        let cache = ProgramCache::new();
        let key = ProgramKey::new("recording", "src", &[]);
        cache.insert(key.clone(), Arc::new(7u32));
        assert!(cache.get::<String>(&key).is_none());
        assert_eq!(cache.get::<u32>(&key).as_deref(), Some(&7));
    }
}
