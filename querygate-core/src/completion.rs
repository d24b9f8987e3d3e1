use crate::load::LoadTracker;
use std::sync::Arc;
use tracing::warn;

/// Terminal hook on the response path: settles the in-flight count for
/// the server a request was dispatched to.
#[derive(Debug, Clone)]
pub struct CompletionAccountant {
    load: Arc<LoadTracker>,
}

impl CompletionAccountant {
    pub fn new(load: Arc<LoadTracker>) -> Self {
        Self { load }
    }

    /// Invoked once per dispatched request when its response stream
    /// finishes, whether or not the downstream body read succeeded.
    pub fn on_request_complete(&self, server_id: &str) {
        self.load.adjust_query_count(server_id, -1.0);
    }

    /// Once-only handle for wiring into a response path that may have
    /// several exit points.
    pub fn hook(&self, server_id: impl Into<String>) -> CompletionHook {
        CompletionHook {
            accountant: self.clone(),
            server_id: server_id.into(),
            completed: false,
        }
    }
}

/// Decrements its server's in-flight count at most once.
///
/// Dropping the hook without completing leaks one unit of query load for
/// that server — a known accounting gap for requests whose response never
/// finishes. The drop logs it; it does not guess a completion.
#[derive(Debug)]
pub struct CompletionHook {
    accountant: CompletionAccountant,
    server_id: String,
    completed: bool,
}

impl CompletionHook {
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.accountant.on_request_complete(&self.server_id);
    }
}

impl Drop for CompletionHook {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                server = %self.server_id,
                "request dropped without completion; one query-load unit leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::LoadWeights;
    use pretty_assertions::assert_eq;

    fn accountant() -> (Arc<LoadTracker>, CompletionAccountant) {
        let load = Arc::new(LoadTracker::new(LoadWeights {
            mem_weight: 0.5,
            query_weight: 0.5,
            server_size: 10.0,
        }));
        let accountant = CompletionAccountant::new(load.clone());
        (load, accountant)
    }

    #[test]
    fn completion_decrements_in_flight_count() {
        let (load, accountant) = accountant();
        load.adjust_query_count("a:1", 1.0);

        accountant.on_request_complete("a:1");
        assert_eq!(load.query_load("a:1"), 0.0);
    }

    #[test]
    fn hook_completes_at_most_once() {
        let (load, accountant) = accountant();
        load.adjust_query_count("a:1", 2.0);

        let mut hook = accountant.hook("a:1");
        hook.complete();
        hook.complete();

        assert_eq!(load.query_load("a:1"), 1.0);
    }

    #[test]
    fn dropped_hook_leaks_the_unit() {
        let (load, accountant) = accountant();
        load.adjust_query_count("a:1", 1.0);

        drop(accountant.hook("a:1"));

        assert_eq!(load.query_load("a:1"), 1.0);
    }
}
