//! Short-lived response cache in front of a gateway.
//!
//! Entries are keyed by descriptor name; selectors are evaluated locally, so
//! one answer serves every label combination of a checkpoint.
//!
//! At most one refresh per name is in flight. Callers arriving during a
//! refresh get the stale list instead of stacking another network call. When
//! there is nothing stale yet (cold start) they wait for the running refresh
//! and share its answer; if that refresh fails they get
//! [`GatewayError::RefreshInFlight`], which the evaluator treats as fail-open.
//! Refreshes run on the caller's task and are bounded by the wrapped
//! gateway's own timeout.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use faultline_core::FlagDescriptor;

use super::{Experiments, Gateway};
use crate::error::{GatewayError, GatewayResult};

/// Default bound on the number of distinct checkpoint names cached.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Default)]
struct CacheEntry {
    experiments: Option<Experiments>,
    fetched_at: Option<Instant>,
    /// Closed when the running refresh finishes, whatever its result.
    refreshing: Option<watch::Receiver<()>>,
}

impl CacheEntry {
    fn fresh(&self, ttl: Duration, now: Instant) -> Option<&Experiments> {
        match (&self.experiments, self.fetched_at) {
            (Some(experiments), Some(at)) if now.saturating_duration_since(at) < ttl => {
                Some(experiments)
            }
            _ => None,
        }
    }
}

/// What a caller should do for a given lookup.
enum Plan {
    /// Serve this list without touching the network.
    Serve(Experiments),
    /// Fetch; the optional list is the stale fallback.
    Refresh(Option<Experiments>, watch::Sender<()>),
    /// Someone else is fetching and there is nothing to serve yet.
    Wait(watch::Receiver<()>),
    /// The cache is full and has no entry for this name.
    Bypass,
}

/// Clears the refreshing mark and wakes waiters, even if the refreshing
/// caller is cancelled.
struct RefreshGuard<'a> {
    entries: &'a DashMap<String, CacheEntry>,
    name: &'a str,
    _done: watch::Sender<()>,
}

impl RefreshGuard<'_> {
    fn complete(self, experiments: Experiments) {
        if let Some(mut entry) = self.entries.get_mut(self.name) {
            entry.experiments = Some(experiments);
            entry.fetched_at = Some(Instant::now());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.entries.get_mut(self.name) {
            entry.refreshing = None;
        }
        // `_done` is dropped after this, closing the channel for waiters.
    }
}

/// TTL cache wrapping another [`Gateway`].
#[derive(Debug)]
pub struct CachedGateway<G> {
    inner: G,
    ttl: Duration,
    max_entries: usize,
    entries: DashMap<String, CacheEntry>,
}

impl<G: Gateway> CachedGateway<G> {
    /// Cache answers from `inner` for `ttl`.
    pub fn new(inner: G, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Cache at most `max_entries` distinct names; further names bypass the cache.
    pub fn with_capacity(inner: G, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries,
            entries: DashMap::new(),
        }
    }

    /// Time-to-live of a cached answer.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the cached answer for `name`.
    pub fn invalidate(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Wrapped gateway.
    pub fn inner(&self) -> &G {
        &self.inner
    }

    fn plan(&self, name: &str) -> Plan {
        let now = Instant::now();

        // Fast path under a shared shard lock.
        if let Some(entry) = self.entries.get(name) {
            if let Some(experiments) = entry.fresh(self.ttl, now) {
                return Plan::Serve(experiments.clone());
            }
        } else if self.entries.len() >= self.max_entries {
            return Plan::Bypass;
        }

        let mut entry = self.entries.entry(name.to_string()).or_default();
        if let Some(experiments) = entry.fresh(self.ttl, now) {
            return Plan::Serve(experiments.clone());
        }
        if let Some(refreshing) = &entry.refreshing {
            return match &entry.experiments {
                Some(stale) => Plan::Serve(stale.clone()),
                None => Plan::Wait(refreshing.clone()),
            };
        }
        let (done, refreshing) = watch::channel(());
        entry.refreshing = Some(refreshing);
        Plan::Refresh(entry.experiments.clone(), done)
    }

    /// Whatever the entry holds once a refresh has finished.
    fn settled(&self, name: &str) -> Option<Experiments> {
        self.entries
            .get(name)
            .and_then(|entry| entry.experiments.clone())
    }
}

#[async_trait]
impl<G: Gateway> Gateway for CachedGateway<G> {
    async fn lookup(&self, flag: &FlagDescriptor) -> GatewayResult<Experiments> {
        let name = flag.name();

        let (stale, done) = match self.plan(name) {
            Plan::Serve(experiments) => return Ok(experiments),
            Plan::Bypass => return self.inner.lookup(flag).await,
            Plan::Wait(mut refreshing) => {
                // The sender never sends; `changed` resolves once it is dropped.
                let _ = refreshing.changed().await;
                return self.settled(name).ok_or(GatewayError::RefreshInFlight);
            }
            Plan::Refresh(stale, done) => (stale, done),
        };

        let guard = RefreshGuard {
            entries: &self.entries,
            name,
            _done: done,
        };

        match self.inner.lookup(flag).await {
            Ok(experiments) => {
                tracing::debug!(flag = %name, count = experiments.len(), "cache refreshed");
                guard.complete(experiments.clone());
                Ok(experiments)
            }
            Err(error) => {
                drop(guard);
                match stale {
                    Some(stale) => {
                        tracing::warn!(
                            flag = %name, %error,
                            "refresh failed, serving stale experiments"
                        );
                        Ok(stale)
                    }
                    None => Err(error),
                }
            }
        }
    }
}
