//! Retrieval cache with time-based expiry and single-flight builds.
//!
//! Each key holds either a ready value with its creation time or the one build
//! currently producing it. Callers that find a pending build await it instead
//! of starting their own. Builds run as spawned tasks, so they finish and fill
//! the cache even when the caller that started them goes away.
//!
//! Failed builds are reported to every waiter and leave nothing behind; the
//! next lookup builds again. Over capacity, the oldest ready entries are
//! evicted first.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use docqa_core::config::CacheSettings;
use docqa_core::{AppError, AppResult, ErrorKind};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{AnswerSet, IndexedDocument};

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Whether a freshly built value may be stored.
pub trait Cacheable {
    fn is_cacheable(&self) -> bool {
        true
    }
}

impl Cacheable for IndexedDocument {}

impl Cacheable for AnswerSet {
    /// Sets with fallback answers are served once and rebuilt next time.
    fn is_cacheable(&self) -> bool {
        self.fallback_count() == 0
    }
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// A fresh ready entry
    Hit,
    /// Waited for a build another caller started
    Joined,
    /// This caller started the build
    Built,
}

impl CacheStatus {
    /// Whether the value was produced by someone else's work.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit | Self::Joined)
    }
}

/// Build failure shared with every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl BuildFailure {
    fn from_error(error: &AppError) -> Self {
        match error {
            AppError::CacheBuild { kind, message } => Self {
                kind: *kind,
                message: message.clone(),
            },
            other => Self {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }

    fn into_error(self) -> AppError {
        AppError::CacheBuild {
            kind: self.kind,
            message: self.message,
        }
    }
}

type BuildFuture<V> = Shared<BoxFuture<'static, Result<Arc<V>, BuildFailure>>>;

enum Slot<V> {
    Ready { value: Arc<V>, created_at: Instant },
    Pending { build: BuildFuture<V>, id: u64 },
}

struct Inner<V> {
    slots: HashMap<String, Slot<V>>,
    next_build_id: u64,
    hits: u64,
    misses: u64,
    builds_started: u64,
}

impl<V> Inner<V> {
    fn owns(&self, key: &str, build_id: u64) -> bool {
        matches!(self.slots.get(key), Some(Slot::Pending { id, .. }) if *id == build_id)
    }

    /// Drop the oldest ready entries until at most `capacity` remain.
    fn evict_over(&mut self, capacity: usize) {
        let mut ready: Vec<(Instant, String)> = self
            .slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready { created_at, .. } => Some((*created_at, key.clone())),
                Slot::Pending { .. } => None,
            })
            .collect();

        if ready.len() <= capacity {
            return;
        }

        ready.sort();
        let excess = ready.len() - capacity;
        for (_, key) in ready.into_iter().take(excess) {
            tracing::debug!(key = %key, "Evicting oldest cache entry");
            self.slots.remove(&key);
        }
    }
}

enum Lookup<V> {
    Hit(Arc<V>),
    Join(BuildFuture<V>),
    Miss,
}

/// Counters and sizes for one cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub ready: usize,
    pub pending: usize,
    pub hits: u64,
    pub misses: u64,
    pub builds_started: u64,
    pub ttl_secs: u64,
    pub capacity: usize,
}

/// Keyed cache of shared values with TTL, capacity and single-flight builds.
pub struct TtlCache<V> {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner<V>>>,
}

fn lock<V>(inner: &Mutex<Inner<V>>) -> MutexGuard<'_, Inner<V>> {
    inner.lock().unwrap_or_else(|p| p.into_inner())
}

impl<V> TtlCache<V>
where
    V: Cacheable + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            clock,
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::new(),
                next_build_id: 0,
                hits: 0,
                misses: 0,
                builds_started: 0,
            })),
        }
    }

    /// Return the cached value for `key`, or build it.
    ///
    /// A ready entry is used only while younger than the TTL. Otherwise the
    /// caller joins the pending build for `key`, or starts one with `build`.
    ///
    /// # Errors
    /// * `AppError::CacheBuild` - If the build failed, for every waiter
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> AppResult<(Arc<V>, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<V>> + Send + 'static,
    {
        let (pending, status) = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;
            let now = self.clock.now();

            let lookup = match inner.slots.get(key) {
                Some(Slot::Ready { value, created_at })
                    if now.saturating_duration_since(*created_at) < self.ttl =>
                {
                    Lookup::Hit(Arc::clone(value))
                }
                Some(Slot::Pending { build, .. }) => Lookup::Join(build.clone()),
                _ => Lookup::Miss,
            };

            match lookup {
                Lookup::Hit(value) => {
                    inner.hits += 1;
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok((value, CacheStatus::Hit));
                }
                Lookup::Join(pending) => {
                    inner.hits += 1;
                    tracing::debug!(key = %key, "Joining in-flight build");
                    (pending, CacheStatus::Joined)
                }
                Lookup::Miss => {
                    inner.misses += 1;
                    inner.builds_started += 1;
                    inner.next_build_id += 1;
                    let id = inner.next_build_id;
                    tracing::debug!(key = %key, build = id, "Cache miss, starting build");

                    let pending = self.spawn_build(key.to_string(), id, build());
                    inner.slots.insert(
                        key.to_string(),
                        Slot::Pending {
                            build: pending.clone(),
                            id,
                        },
                    );
                    (pending, CacheStatus::Built)
                }
            }
        };

        pending
            .await
            .map(|value| (value, status))
            .map_err(BuildFailure::into_error)
    }

    fn spawn_build<Fut>(&self, key: String, id: u64, build: Fut) -> BuildFuture<V>
    where
        Fut: Future<Output = AppResult<V>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        let capacity = self.capacity;
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = build.await;

            let mut guard = lock(&inner);
            let owned = guard.owns(&task_key, id);
            match result {
                Ok(value) => {
                    let value = Arc::new(value);
                    if owned {
                        if value.is_cacheable() {
                            guard.slots.insert(
                                task_key,
                                Slot::Ready {
                                    value: Arc::clone(&value),
                                    created_at: clock.now(),
                                },
                            );
                            guard.evict_over(capacity);
                        } else {
                            guard.slots.remove(&task_key);
                        }
                    }
                    Ok(value)
                }
                Err(e) => {
                    tracing::warn!(key = %task_key, "Cache build failed: {}", e);
                    if owned {
                        guard.slots.remove(&task_key);
                    }
                    Err(BuildFailure::from_error(&e))
                }
            }
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    let mut guard = lock(&inner);
                    if guard.owns(&key, id) {
                        guard.slots.remove(&key);
                    }
                    Err(BuildFailure {
                        kind: ErrorKind::Other,
                        message: format!("build task failed: {}", join_error),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drop every entry. Builds in flight still reach their waiters.
    pub fn clear(&self) {
        lock(&self.inner).slots.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        let pending = inner
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count();

        CacheStats {
            ready: inner.slots.len() - pending,
            pending,
            hits: inner.hits,
            misses: inner.misses,
            builds_started: inner.builds_started,
            ttl_secs: self.ttl.as_secs(),
            capacity: self.capacity,
        }
    }
}

/// Statistics for both retrieval caches.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalCacheStats {
    pub indexes: CacheStats,
    pub answers: CacheStats,
}

/// Process-wide cache of document indexes and answer sets.
pub struct RetrievalCache {
    indexes: TtlCache<IndexedDocument>,
    answers: TtlCache<AnswerSet>,
}

impl RetrievalCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let ttl = Duration::from_secs(settings.ttl_secs);
        Self {
            indexes: TtlCache::new(ttl, settings.capacity, Arc::clone(&clock)),
            answers: TtlCache::new(ttl, settings.capacity, clock),
        }
    }

    /// Cached index for `reference`, built at most once at a time.
    pub async fn get_or_build_index<F, Fut>(
        &self,
        reference: &str,
        build: F,
    ) -> AppResult<(Arc<IndexedDocument>, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<IndexedDocument>> + Send + 'static,
    {
        self.indexes.get_or_build(&index_key(reference), build).await
    }

    /// Cached answers for `questions` about `reference`.
    pub async fn get_or_compute_answers<F, Fut>(
        &self,
        reference: &str,
        questions: &[String],
        compute: F,
    ) -> AppResult<(Arc<AnswerSet>, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<AnswerSet>> + Send + 'static,
    {
        self.answers
            .get_or_build(&answers_key(reference, questions), compute)
            .await
    }

    pub fn clear(&self) {
        self.indexes.clear();
        self.answers.clear();
        tracing::info!("Retrieval cache cleared");
    }

    pub fn stats(&self) -> RetrievalCacheStats {
        RetrievalCacheStats {
            indexes: self.indexes.stats(),
            answers: self.answers.stats(),
        }
    }
}

/// Cache key for a document index.
pub fn index_key(reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"index\0");
    hasher.update(reference.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache key for an ordered question list about a document.
///
/// Questions are compared case-insensitively with whitespace collapsed.
pub fn answers_key(reference: &str, questions: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"answers\0");
    hasher.update(reference.trim().as_bytes());
    for question in questions {
        hasher.update(b"\0");
        hasher.update(normalize_question(question).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
