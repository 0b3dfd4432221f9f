use crate::metrics_defs::{CACHE_COALESCED, CACHE_HIT, CACHE_MISS};
use crate::types::{ProjectId, Resolution, ResolveError};
use crate::upstream::UpstreamResolver;
use parking_lot::Mutex;
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// How long a resolution outcome, successful or not, is served from the cache.
pub const TTL: Duration = Duration::from_secs(5 * 60);

type Pending = watch::Receiver<Option<Resolution>>;

#[derive(Clone, Debug)]
struct CacheEntry {
    outcome: Resolution,
    computed_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.computed_at) <= TTL
    }
}

enum Slot {
    Ready(CacheEntry),
    // An upstream fetch is in flight; the outcome is published on this channel.
    Pending(Pending),
}

enum Lookup {
    Hit(Resolution),
    Wait(Pending),
}

struct CacheInner {
    upstream: Arc<dyn UpstreamResolver>,
    slots: Mutex<HashMap<ProjectId, Slot>>,
}

/// Caches the latest asset URL per project for [`TTL`].
///
/// At most one upstream fetch per project is in flight at any time. Callers
/// that miss while a fetch is running wait for it and receive the same
/// outcome. Failures are cached exactly like successes.
///
/// The map lock is only held to inspect or update slots. Fetches run on their
/// own task, so a slow project never blocks lookups for other projects and a
/// fetch still completes and fills the cache if every waiting caller goes away.
#[derive(Clone)]
pub struct ResolutionCache {
    inner: Arc<CacheInner>,
}

impl ResolutionCache {
    pub fn new(upstream: Arc<dyn UpstreamResolver>) -> Self {
        ResolutionCache {
            inner: Arc::new(CacheInner {
                upstream,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn resolve(&self, project: &ProjectId) -> Resolution {
        match self.lookup(project) {
            Lookup::Hit(outcome) => outcome,
            Lookup::Wait(pending) => self.wait(project, pending).await,
        }
    }

    fn lookup(&self, project: &ProjectId) -> Lookup {
        let now = Instant::now();
        let mut slots = self.inner.slots.lock();

        match slots.get(project) {
            Some(Slot::Ready(entry)) if entry.is_fresh(now) => {
                counter!(CACHE_HIT).increment(1);
                return Lookup::Hit(entry.outcome.clone());
            }
            // A closed channel means the fetch task died with nobody waiting on it
            Some(Slot::Pending(pending)) if pending.has_changed().is_ok() => {
                counter!(CACHE_COALESCED).increment(1);
                return Lookup::Wait(pending.clone());
            }
            // Absent, stale and orphaned slots are all misses
            _ => {}
        }

        counter!(CACHE_MISS).increment(1);
        tracing::debug!(%project, "Cache miss, fetching latest release");

        let (tx, rx) = watch::channel(None);
        slots.insert(project.clone(), Slot::Pending(rx.clone()));
        drop(slots);

        let inner = self.inner.clone();
        let project = project.clone();
        tokio::spawn(async move {
            let outcome = inner
                .upstream
                .fetch_latest_asset_url(&project)
                .await
                .map(Arc::from);

            let entry = CacheEntry {
                outcome: outcome.clone(),
                computed_at: Instant::now(),
            };
            inner.slots.lock().insert(project, Slot::Ready(entry));

            // No receivers left is fine, the entry above serves later callers.
            let _ = tx.send(Some(outcome));
        });

        Lookup::Wait(rx)
    }

    async fn wait(&self, project: &ProjectId, mut pending: Pending) -> Resolution {
        let published = match pending.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        match published {
            Some(outcome) => outcome,
            None => {
                // The fetch task ended without publishing (it panicked). Drop its
                // placeholder so the next caller starts over instead of waiting forever.
                tracing::error!(%project, "Release fetch ended without an outcome");
                let mut slots = self.inner.slots.lock();
                if let Some(Slot::Pending(current)) = slots.get(project)
                    && current.same_channel(&pending)
                {
                    slots.remove(project);
                }
                Err(ResolveError::Aborted)
            }
        }
    }
}
