use dashmap::DashMap;
use tracing::trace;

/// Weights for the composite node-load score.
#[derive(Debug, Clone, Copy)]
pub struct LoadWeights {
    pub mem_weight: f64,
    pub query_weight: f64,
    /// Normalization divisor applied to the in-flight query count.
    pub server_size: f64,
}

impl LoadWeights {
    fn node_load(&self, mem_load: f64, query_load: f64) -> f64 {
        mem_load * self.mem_weight + query_load / self.server_size * self.query_weight
    }
}

/// Load picture for one backend server, keyed by its `host:port` id.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServerLoadMetric {
    /// Externally reported memory pressure.
    pub mem_load: f64,
    /// In-flight request count. Never negative.
    pub query_load: f64,
    /// Composite score; lower is preferred. Recomputed on every mutation.
    pub node_load: f64,
}

/// Process-wide table of per-server load metrics (hot path).
///
/// Metrics are created lazily on first reference to a server id and live
/// until the server is removed from the pool.
#[derive(Debug)]
pub struct LoadTracker {
    metrics: DashMap<String, ServerLoadMetric>,
    weights: LoadWeights,
}

impl LoadTracker {
    pub fn new(weights: LoadWeights) -> Self {
        Self {
            metrics: DashMap::new(),
            weights,
        }
    }

    /// Set the externally reported memory load for a server, recomputing
    /// its node load. Blank server ids are ignored.
    pub fn record_memory_load(&self, server_id: &str, mem_load: f64) {
        if server_id.trim().is_empty() {
            return;
        }

        let mut metric = self.metrics.entry(server_id.to_string()).or_default();
        metric.mem_load = mem_load;
        metric.node_load = self.weights.node_load(metric.mem_load, metric.query_load);
    }

    /// Add `delta` to a server's in-flight query count: +1 on dispatch,
    /// -1 on completion. A delta that would push the count below zero is
    /// rejected and the metric stays unchanged. Blank server ids are
    /// ignored.
    ///
    /// The read-modify-write runs entirely under the map's entry guard,
    /// so concurrent adjustments on the same server never lose updates.
    pub fn adjust_query_count(&self, server_id: &str, delta: f64) {
        if server_id.trim().is_empty() {
            return;
        }

        let mut metric = self.metrics.entry(server_id.to_string()).or_default();
        let next = metric.query_load + delta;
        if next < 0.0 {
            trace!(server = server_id, delta, "rejected query count underflow");
            return;
        }

        metric.query_load = next;
        metric.node_load = self.weights.node_load(metric.mem_load, metric.query_load);
    }

    /// Server id with the minimum node load, or `None` when nothing is
    /// tracked yet.
    ///
    /// Ties go to the first minimum encountered in a single pass; the
    /// iteration order of the underlying concurrent map is
    /// implementation-defined, so the tie-break is not a stable priority.
    /// The result is best-effort: it may race against concurrent
    /// increments on the very server it returns.
    pub fn pick_least_loaded(&self) -> Option<String> {
        let mut best: Option<(String, f64)> = None;

        for entry in self.metrics.iter() {
            match &best {
                Some((_, low)) if *low <= entry.node_load => {}
                _ => best = Some((entry.key().clone(), entry.node_load)),
            }
        }

        best.map(|(server_id, _)| server_id)
    }

    /// Drop the metric for a server that left the pool.
    pub fn remove_server(&self, server_id: &str) {
        self.metrics.remove(server_id);
    }

    /// Copy of the current metric, for tests and observability.
    pub fn metric(&self, server_id: &str) -> Option<ServerLoadMetric> {
        self.metrics.get(server_id).map(|m| *m)
    }

    pub fn query_load(&self, server_id: &str) -> f64 {
        self.metric(server_id).map(|m| m.query_load).unwrap_or(0.0)
    }

    pub fn node_load(&self, server_id: &str) -> f64 {
        self.metric(server_id).map(|m| m.node_load).unwrap_or(0.0)
    }

    pub fn tracked_servers(&self) -> usize {
        self.metrics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn tracker() -> LoadTracker {
        LoadTracker::new(LoadWeights {
            mem_weight: 0.5,
            query_weight: 0.5,
            server_size: 10.0,
        })
    }

    #[test]
    fn node_load_follows_formula_across_mutations() {
        let tracker = tracker();

        tracker.record_memory_load("a:1", 0.4);
        assert_eq!(tracker.node_load("a:1"), 0.4 * 0.5);

        tracker.adjust_query_count("a:1", 1.0);
        tracker.adjust_query_count("a:1", 1.0);
        tracker.adjust_query_count("a:1", 1.0);
        assert_eq!(tracker.node_load("a:1"), 0.4 * 0.5 + 3.0 / 10.0 * 0.5);

        tracker.record_memory_load("a:1", 0.8);
        assert_eq!(tracker.node_load("a:1"), 0.8 * 0.5 + 3.0 / 10.0 * 0.5);

        tracker.adjust_query_count("a:1", -1.0);
        assert_eq!(tracker.node_load("a:1"), 0.8 * 0.5 + 2.0 / 10.0 * 0.5);
    }

    #[test]
    fn metric_is_created_lazily_on_first_reference() {
        let tracker = tracker();
        assert_eq!(tracker.metric("a:1"), None);

        tracker.adjust_query_count("a:1", 1.0);
        let metric = tracker.metric("a:1").unwrap();
        assert_eq!(metric.mem_load, 0.0);
        assert_eq!(metric.query_load, 1.0);
    }

    #[test]
    fn blank_server_id_is_a_no_op() {
        let tracker = tracker();
        tracker.record_memory_load("", 0.9);
        tracker.record_memory_load("   ", 0.9);
        tracker.adjust_query_count("", 1.0);
        assert_eq!(tracker.tracked_servers(), 0);
    }

    #[test]
    fn query_load_never_goes_negative() {
        let tracker = tracker();
        tracker.adjust_query_count("a:1", -1.0);
        assert_eq!(tracker.query_load("a:1"), 0.0);

        tracker.adjust_query_count("a:1", 1.0);
        tracker.adjust_query_count("a:1", -1.0);
        tracker.adjust_query_count("a:1", -1.0);
        assert_eq!(tracker.query_load("a:1"), 0.0);
    }

    #[test]
    fn rejected_underflow_leaves_node_load_unchanged() {
        let tracker = tracker();
        tracker.record_memory_load("a:1", 0.6);
        let before = tracker.node_load("a:1");

        tracker.adjust_query_count("a:1", -1.0);
        assert_eq!(tracker.node_load("a:1"), before);
    }

    #[test]
    fn least_loaded_returns_minimum_node_load() {
        let tracker = tracker();
        tracker.record_memory_load("a:1", 0.9);
        tracker.record_memory_load("b:2", 0.2);
        tracker.record_memory_load("c:3", 0.5);

        let picked = tracker.pick_least_loaded().unwrap();
        let picked_load = tracker.node_load(&picked);
        for server in ["a:1", "b:2", "c:3"] {
            assert!(picked_load <= tracker.node_load(server));
        }
        assert_eq!(picked, "b:2");
    }

    #[test]
    fn least_loaded_on_empty_table_is_none() {
        assert_eq!(tracker().pick_least_loaded(), None);
    }

    #[test]
    fn removed_server_is_no_longer_tracked() {
        let tracker = tracker();
        tracker.record_memory_load("a:1", 0.3);
        tracker.remove_server("a:1");
        assert_eq!(tracker.metric("a:1"), None);
        assert_eq!(tracker.pick_least_loaded(), None);
    }

    #[test]
    fn concurrent_dispatch_and_completion_balance_to_zero() {
        let tracker = Arc::new(tracker());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let tracker = tracker.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    tracker.adjust_query_count("a:1", 1.0);
                    tracker.adjust_query_count("a:1", -1.0);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.query_load("a:1"), 0.0);
    }
}
