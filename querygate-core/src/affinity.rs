use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default period of the background expiry sweep.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(30);

/// One sticky binding: routing key -> previously chosen server.
#[derive(Debug, Clone)]
struct AffinityEntry {
    server_id: String,
    first_bound: Instant,
    last_touched: Instant,
}

impl AffinityEntry {
    /// Total age since first binding. Not idle time: refreshing an entry
    /// moves `last_touched` but never `first_bound`.
    fn age(&self) -> Duration {
        self.last_touched.saturating_duration_since(self.first_bound)
    }
}

/// Sticky-affinity table pinning repeated requests to one server.
///
/// Keys are `"<user>_<project>"` for BI traffic, or the client host for
/// everything else. Entries are evicted only by the periodic sweep, which
/// bounds cache growth and bounds how long a session can pin traffic to a
/// server that may have gone bad.
#[derive(Debug)]
pub struct AffinityCache {
    entries: DashMap<String, AffinityEntry>,
    cache_time: Duration,
}

impl AffinityCache {
    pub fn new(cache_time: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cache_time,
        }
    }

    /// Look up the server bound to `key`, refreshing the entry's
    /// last-touched timestamp on a hit.
    ///
    /// Expiry is checked only by the background sweep: an entry whose age
    /// already exceeds the cache time still hits here until the next
    /// sweep removes it. That is intentional — expiry is sweep-driven,
    /// not read-driven.
    pub fn lookup_and_refresh(&self, key: &str) -> Option<String> {
        let mut entry = self.entries.get_mut(key)?;
        entry.last_touched = Instant::now();
        Some(entry.server_id.clone())
    }

    /// Bind `key` to `server_id`, resetting the binding's age.
    pub fn bind(&self, key: &str, server_id: &str) {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            AffinityEntry {
                server_id: server_id.to_string(),
                first_bound: now,
                last_touched: now,
            },
        );
    }

    /// Drop every binding that points at a decommissioned server, plus
    /// any binding keyed by the server id itself (host-affinity keys can
    /// collide with server ids).
    pub fn remove_by_server(&self, server_id: &str) {
        self.entries
            .retain(|key, entry| entry.server_id != server_id && key != server_id);
    }

    /// One expiry pass: entries whose total age since first binding
    /// exceeds the cache time are removed. A key in continuous use still
    /// expires once old enough, then is silently rebound on its next
    /// lookup miss.
    pub fn sweep_once(&self) {
        let before = self.entries.len();
        let cache_time = self.cache_time;
        self.entries.retain(|_, entry| entry.age() <= cache_time);

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "affinity sweep evicted expired bindings");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, first_bound_ago: Duration, last_touched_ago: Duration) {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(key).unwrap();
        entry.first_bound = now.checked_sub(first_bound_ago).unwrap();
        entry.last_touched = now.checked_sub(last_touched_ago).unwrap();
    }
}

/// Spawn the dedicated eviction task: one sweep immediately, then one
/// every `period`. The task runs fully decoupled from request traffic —
/// requests never wait on it and it never waits on them.
pub fn spawn_sweeper(cache: Arc<AffinityCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            cache.sweep_once();
        }
    })
}
