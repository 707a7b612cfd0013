//! Process-wide rule cache.
//!
//! # State Machine
//! ```text
//! Unloaded → (ensure_loaded succeeds) → Loaded
//! Loaded   → (clear)                  → Unloaded
//! Unloaded → (source error / empty)   → Unloaded, retried on next request
//! ```
//!
//! # Design Decisions
//! - Readers get immutable `Arc` snapshots via `arc-swap`, never a lock
//! - Loads are single-flight: a mutex serialises loaders, the snapshot is
//!   re-checked after acquiring it
//! - Fetch, validation and classification happen on an unpublished copy;
//!   publishing is a compare-and-swap, so a `clear` that lands mid-load
//!   wins and the stale result is never published
//! - Exceptions have their own snapshot and loaded state

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics;
use crate::rules::model::{
    HostNameRewriteRule, RawRuleRecord, RuleKind, TypeException, TypeExceptionDocument,
    UrlRewriteRule,
};
use crate::rules::source::{RuleSource, SourceError};

/// Errors from populating the cache. All of them are recoverable.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("rule source returned no rules")]
    EmptyRuleSet,
}

/// Validated rules in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    url_rules: Vec<UrlRewriteRule>,
    host_rules: Vec<HostNameRewriteRule>,
}

impl RuleSet {
    /// Validate and classify raw records, dropping invalid ones.
    pub fn from_records(records: &[RawRuleRecord]) -> Self {
        let mut set = Self::default();

        for record in records {
            let added = record.rule_kind().and_then(|kind| match kind {
                RuleKind::Url => UrlRewriteRule::from_record(record).map(|r| set.url_rules.push(r)),
                RuleKind::HostName => {
                    HostNameRewriteRule::from_record(record).map(|r| set.host_rules.push(r))
                }
            });

            if let Err(e) = added {
                tracing::warn!(rule_id = %record.id, error = %e, "Dropping invalid rewrite rule");
            }
        }

        set
    }

    pub fn url_rules(&self) -> &[UrlRewriteRule] {
        &self.url_rules
    }

    pub fn host_rules(&self) -> &[HostNameRewriteRule] {
        &self.host_rules
    }

    pub fn is_empty(&self) -> bool {
        self.url_rules.is_empty() && self.host_rules.is_empty()
    }
}

/// Usable type exceptions in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSet {
    exceptions: Vec<TypeException>,
}

impl ExceptionSet {
    pub fn from_document(document: TypeExceptionDocument) -> Self {
        let exceptions = document
            .type_exceptions
            .into_iter()
            .filter(|e| {
                let usable = e.is_usable();
                if !usable {
                    tracing::warn!(name = %e.name, "Ignoring type exception without name or subtypes");
                }
                usable
            })
            .collect();
        Self { exceptions }
    }

    pub fn as_slice(&self) -> &[TypeException] {
        &self.exceptions
    }

    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }
}

/// Counts reported by the admin API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub rules_loaded: bool,
    pub url_rules: usize,
    pub host_rules: usize,
    pub exceptions_loaded: bool,
    pub type_exceptions: usize,
}

enum Fetched<T> {
    /// Already loaded before this call.
    Cached(Arc<T>),
    /// Loaded by this call and published.
    Published(Arc<T>),
    /// Loaded by this call, but a clear happened meanwhile.
    Superseded(Arc<T>),
}

/// A lazily populated snapshot with single-flight loading.
struct SingleFlight<T> {
    slot: ArcSwap<Option<Arc<T>>>,
    load_lock: Mutex<()>,
}

impl<T> SingleFlight<T> {
    fn new() -> Self {
        Self {
            slot: ArcSwap::from_pointee(None),
            load_lock: Mutex::new(()),
        }
    }

    fn get(&self) -> Option<Arc<T>> {
        Option::clone(&self.slot.load())
    }

    fn get_or_load<E>(&self, load: impl FnOnce() -> Result<T, E>) -> Result<Fetched<T>, E> {
        if let Some(value) = self.get() {
            return Ok(Fetched::Cached(value));
        }

        // The lock guards no data; a panic in another loader leaves nothing torn.
        let _lock = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let observed = self.slot.load_full();
        if let Some(value) = &*observed {
            return Ok(Fetched::Cached(value.clone()));
        }

        let value = Arc::new(load()?);
        let previous = self
            .slot
            .compare_and_swap(&observed, Arc::new(Some(value.clone())));

        if Arc::ptr_eq(&*previous, &observed) {
            Ok(Fetched::Published(value))
        } else {
            Ok(Fetched::Superseded(value))
        }
    }

    /// Drop the snapshot. Returns true if something was loaded.
    fn clear(&self) -> bool {
        self.slot.swap(Arc::new(None)).is_some()
    }
}

/// Thread-safe store of validated rules and type exceptions.
pub struct RuleCache {
    source: Arc<dyn RuleSource>,
    rules: SingleFlight<RuleSet>,
    exceptions: SingleFlight<ExceptionSet>,
}

impl RuleCache {
    pub fn new(source: Arc<dyn RuleSource>) -> Self {
        Self {
            source,
            rules: SingleFlight::new(),
            exceptions: SingleFlight::new(),
        }
    }

    /// Load rules if not loaded yet and return the current snapshot.
    ///
    /// Concurrent callers wait for the in-flight load and share its result.
    pub fn ensure_loaded(&self) -> Result<Arc<RuleSet>, CacheError> {
        let fetched = self.rules.get_or_load(|| -> Result<RuleSet, CacheError> {
            let records = self.source.fetch_rules().inspect_err(|_| {
                metrics::record_cache_load("rules", "error");
            })?;
            if records.is_empty() {
                metrics::record_cache_load("rules", "empty");
                return Err(CacheError::EmptyRuleSet);
            }
            Ok(RuleSet::from_records(&records))
        })?;

        Ok(match fetched {
            Fetched::Cached(rules) => rules,
            Fetched::Published(rules) => {
                tracing::info!(
                    url_rules = rules.url_rules().len(),
                    host_rules = rules.host_rules().len(),
                    "Cached URL rewrite rules"
                );
                metrics::record_cache_load("rules", "loaded");
                metrics::record_rule_counts(rules.url_rules().len(), rules.host_rules().len());
                rules
            }
            Fetched::Superseded(rules) => {
                tracing::debug!("Rule cache cleared during load, result not published");
                rules
            }
        })
    }

    /// Load type exceptions if not loaded yet and return the current snapshot.
    pub fn ensure_exceptions_loaded(&self) -> Result<Arc<ExceptionSet>, CacheError> {
        let fetched = self.exceptions.get_or_load(|| -> Result<ExceptionSet, CacheError> {
            let document = self.source.fetch_exceptions().inspect_err(|_| {
                metrics::record_cache_load("exceptions", "error");
            })?;
            Ok(ExceptionSet::from_document(document))
        })?;

        Ok(match fetched {
            Fetched::Cached(exceptions) | Fetched::Superseded(exceptions) => exceptions,
            Fetched::Published(exceptions) => {
                tracing::info!(type_exceptions = exceptions.len(), "Cached type exceptions");
                metrics::record_cache_load("exceptions", "loaded");
                exceptions
            }
        })
    }

    /// Current rules, without loading.
    pub fn snapshot(&self) -> Option<Arc<RuleSet>> {
        self.rules.get()
    }

    /// Current type exceptions, without loading.
    pub fn exceptions(&self) -> Option<Arc<ExceptionSet>> {
        self.exceptions.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.rules.get().is_some()
    }

    pub fn exceptions_loaded(&self) -> bool {
        self.exceptions.get().is_some()
    }

    /// Drop cached rules; the next request reloads them.
    pub fn clear(&self) {
        let was_loaded = self.rules.clear();
        metrics::record_cache_clear("rules");
        metrics::record_rule_counts(0, 0);
        tracing::info!(was_loaded, "Cleared rewrite rules cache");
    }

    /// Drop cached type exceptions; the next request reloads them.
    pub fn clear_exceptions(&self) {
        let was_loaded = self.exceptions.clear();
        metrics::record_cache_clear("exceptions");
        tracing::info!(was_loaded, "Cleared type exceptions cache");
    }

    pub fn clear_all(&self) {
        self.clear();
        self.clear_exceptions();
    }

    pub fn status(&self) -> CacheStatus {
        let rules = self.snapshot();
        let exceptions = self.exceptions();
        CacheStatus {
            rules_loaded: rules.is_some(),
            url_rules: rules.as_ref().map_or(0, |r| r.url_rules().len()),
            host_rules: rules.as_ref().map_or(0, |r| r.host_rules().len()),
            exceptions_loaded: exceptions.is_some(),
            type_exceptions: exceptions.as_ref().map_or(0, |e| e.len()),
        }
    }
}

impl std::fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCache").field("status", &self.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn url_record(id: &str, source: &str, target: &str) -> RawRuleRecord {
        RawRuleRecord {
            id: id.into(),
            kind: "url".into(),
            source: Some(source.into()),
            target: Some(target.into()),
            ..Default::default()
        }
    }

    fn host_record(id: &str, from: &str, to: &str) -> RawRuleRecord {
        RawRuleRecord {
            id: id.into(),
            kind: "hostname".into(),
            source_host_name: Some(from.into()),
            target_host_name: Some(to.into()),
            ..Default::default()
        }
    }

    /// Counts fetches and sleeps to widen the race window.
    struct CountingSource {
        records: Vec<RawRuleRecord>,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(records: Vec<RawRuleRecord>, delay: Duration) -> Self {
            Self {
                records,
                fetches: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl RuleSource for CountingSource {
        fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(self.records.clone())
        }

        fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError> {
            Ok(TypeExceptionDocument::default())
        }
    }

    struct FailingSource;

    impl RuleSource for FailingSource {
        fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError> {
            Err(SourceError::NotConfigured)
        }

        fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError> {
            Err(SourceError::NotConfigured)
        }
    }

    #[test]
    fn test_from_records_classifies_and_drops_invalid() {
        let records = vec![
            url_record("a", "/a", "/b"),
            url_record("bad-target", "/c", ""),
            host_record("h", "old.example.com", "new.example.com"),
            RawRuleRecord {
                id: "unknown".into(),
                kind: "regex".into(),
                source: Some("/x".into()),
                target: Some("/y".into()),
                ..Default::default()
            },
            url_record("bad-source", "", "/d"),
            url_record("z", "/z", "/y"),
        ];

        let set = RuleSet::from_records(&records);
        let ids: Vec<_> = set.url_rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z"]);
        assert_eq!(set.host_rules().len(), 1);
    }

    #[test]
    fn test_ensure_loaded_fetches_once() {
        let source = Arc::new(CountingSource::new(vec![url_record("a", "/a", "/b")], Duration::ZERO));
        let cache = RuleCache::new(source.clone());

        assert!(!cache.is_loaded());
        cache.ensure_loaded().unwrap();
        cache.ensure_loaded().unwrap();
        assert!(cache.is_loaded());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_ensure_loaded_is_single_flight() {
        let records: Vec<_> = (0..50)
            .map(|i| url_record(&format!("r{i}"), &format!("/old/{i}"), &format!("/new/{i}")))
            .collect();
        let source = Arc::new(CountingSource::new(records, Duration::from_millis(100)));
        let cache = Arc::new(RuleCache::new(source.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.ensure_loaded().unwrap().url_rules().len())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 50);
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_then_reload_is_identical() {
        let records = vec![
            url_record("specific", "/a?x=1", "/b"),
            url_record("general", "/a", "/c"),
            host_record("h", "old.example.com", "new.example.com"),
        ];
        let source = Arc::new(CountingSource::new(records, Duration::ZERO));
        let cache = RuleCache::new(source.clone());

        let first = cache.ensure_loaded().unwrap();
        cache.clear();
        assert!(!cache.is_loaded());
        assert!(cache.snapshot().is_none());

        let second = cache.ensure_loaded().unwrap();
        assert_eq!(*first, *second);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_source_error_leaves_cache_unloaded() {
        let cache = RuleCache::new(Arc::new(FailingSource));

        assert!(matches!(cache.ensure_loaded(), Err(CacheError::Source(_))));
        assert!(!cache.is_loaded());
        assert!(cache.ensure_exceptions_loaded().is_err());
        assert!(!cache.exceptions_loaded());
    }

    #[test]
    fn test_empty_rule_set_is_retried() {
        let source = Arc::new(CountingSource::new(Vec::new(), Duration::ZERO));
        let cache = RuleCache::new(source.clone());

        assert!(matches!(cache.ensure_loaded(), Err(CacheError::EmptyRuleSet)));
        assert!(matches!(cache.ensure_loaded(), Err(CacheError::EmptyRuleSet)));
        assert!(!cache.is_loaded());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_all_invalid_records_still_mark_loaded() {
        let source = Arc::new(CountingSource::new(vec![url_record("bad", "", "")], Duration::ZERO));
        let cache = RuleCache::new(source);

        let rules = cache.ensure_loaded().unwrap();
        assert!(rules.is_empty());
        assert!(cache.is_loaded());
    }

    /// Blocks inside `fetch_rules` until released.
    struct GatedSource {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl RuleSource for GatedSource {
        fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(vec![url_record("a", "/a", "/b")])
        }

        fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError> {
            Ok(TypeExceptionDocument::default())
        }
    }

    #[test]
    fn test_clear_during_load_discards_stale_result() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let cache = Arc::new(RuleCache::new(Arc::new(GatedSource {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        })));

        let loader = {
            let cache = cache.clone();
            thread::spawn(move || cache.ensure_loaded().unwrap())
        };

        started_rx.recv().unwrap();
        cache.clear();
        release_tx.send(()).unwrap();

        let rules = loader.join().unwrap();
        assert_eq!(rules.url_rules().len(), 1);
        assert!(!cache.is_loaded());
    }

    #[test]
    fn test_exceptions_are_independent_of_rules() {
        let source = StaticExceptions;
        let cache = RuleCache::new(Arc::new(source));

        let exceptions = cache.ensure_exceptions_loaded().unwrap();
        assert_eq!(exceptions.len(), 1);

        cache.clear();
        assert!(cache.exceptions_loaded());

        cache.clear_all();
        assert!(!cache.exceptions_loaded());
    }

    struct StaticExceptions;

    impl RuleSource for StaticExceptions {
        fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError> {
            Ok(vec![url_record("a", "/a", "/b")])
        }

        fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError> {
            Ok(TypeExceptionDocument {
                type_exceptions: vec![
                    TypeException {
                        name: "pdf".into(),
                        sub_types: vec!["pdf".into()],
                    },
                    TypeException {
                        name: "".into(),
                        sub_types: vec!["x".into()],
                    },
                ],
            })
        }
    }

    #[test]
    fn test_status() {
        let cache = RuleCache::new(Arc::new(StaticExceptions));
        assert_eq!(cache.status(), CacheStatus::default());

        cache.ensure_loaded().unwrap();
        cache.ensure_exceptions_loaded().unwrap();
        let status = cache.status();
        assert!(status.rules_loaded);
        assert_eq!(status.url_rules, 1);
        assert_eq!(status.type_exceptions, 1);
    }
}
