use crate::affinity::AffinityCache;
use crate::load::LoadTracker;
use crate::registry::ResourceGroupRegistry;
use crate::routing::{RouteDecision, RouteError, RouteReason, RoutingSignals, ServerAddr};
use std::sync::Arc;
use tracing::{debug, trace};

/// Multi-stage routing decision: diagnostic override, then affinity
/// reuse, then load-based fallback.
///
/// The engine holds no per-request state of its own; all shared state
/// lives behind the three handles, each safe for unsynchronized
/// concurrent use from any number of request paths.
#[derive(Debug)]
pub struct RoutingEngine {
    load: Arc<LoadTracker>,
    affinity: Arc<AffinityCache>,
    registry: Arc<ResourceGroupRegistry>,
}

impl RoutingEngine {
    pub fn new(
        load: Arc<LoadTracker>,
        affinity: Arc<AffinityCache>,
        registry: Arc<ResourceGroupRegistry>,
    ) -> Self {
        Self {
            load,
            affinity,
            registry,
        }
    }

    /// Pick exactly one backend server for a request.
    ///
    /// Stage order: operator-specified diagnostic target, then
    /// user+project affinity, then client-host affinity, then
    /// least-loaded / resource-group fallback. The chosen server's
    /// in-flight count is incremented before returning; the caller must
    /// settle it through the completion accountant once the response
    /// stream finishes.
    pub fn decide(&self, signals: &RoutingSignals<'_>) -> Result<RouteDecision, RouteError> {
        // Diagnostic pack requests go to the exact operator-specified
        // node, bypassing affinity and load entirely.
        if let Some(server) = self.diagnostic_target(signals) {
            self.load.adjust_query_count(&server.id(), 1.0);
            debug!(server = %server, host = ?signals.host_header, "diagnostic override route");
            return Ok(RouteDecision {
                server,
                reason: RouteReason::DiagnosticOverride,
            });
        }

        // BI requests stick by user and project.
        let mut affinity_key: Option<String> = None;
        if let (Some(user), Some(project)) = (nonblank(signals.user), nonblank(signals.project)) {
            let key = format!("{user}_{project}");
            if let Some(server) = self.affinity_target(&key) {
                self.load.adjust_query_count(&server.id(), 1.0);
                trace!(key = %key, server = %server, "user/project affinity hit");
                return Ok(RouteDecision {
                    server,
                    reason: RouteReason::BiAffinity,
                });
            }
            affinity_key = Some(key);
        }

        // Everything else sticks by client host — but only when no
        // user/project key could be formed at all.
        if affinity_key.is_none()
            && let Some(remote) = nonblank(signals.remote_host)
        {
            if let Some(server) = self.affinity_target(remote) {
                self.load.adjust_query_count(&server.id(), 1.0);
                trace!(key = %remote, server = %server, "client host affinity hit");
                return Ok(RouteDecision {
                    server,
                    reason: RouteReason::HostAffinity,
                });
            }
            affinity_key = Some(remote.to_string());
        }

        self.balance(signals, affinity_key.as_deref())
    }

    /// The exact server named by the diagnostic header pair. Both headers
    /// must be present, non-blank and parseable; otherwise the signal is
    /// unavailable and normal routing applies.
    fn diagnostic_target(&self, signals: &RoutingSignals<'_>) -> Option<ServerAddr> {
        let host = nonblank(signals.diag_host)?;
        let port = nonblank(signals.diag_port)?;
        let port: u16 = port.parse().ok()?;
        Some(ServerAddr::new(host, port))
    }

    /// Affinity hit that also parses as `host:port`. A malformed binding
    /// counts as a miss and falls through to load-based selection.
    fn affinity_target(&self, key: &str) -> Option<ServerAddr> {
        let bound = self.affinity.lookup_and_refresh(key)?;
        ServerAddr::parse(&bound)
    }

    /// Load-based fallback: the least-loaded tracked server first, then
    /// the resource group's own policy for the service id. The winner is
    /// bound to the affinity key (when one was formed) and charged one
    /// in-flight query. Binding and charging are two independent
    /// operations; a reader observing one without the other is a benign
    /// transient.
    fn balance(
        &self,
        signals: &RoutingSignals<'_>,
        affinity_key: Option<&str>,
    ) -> Result<RouteDecision, RouteError> {
        let (server, reason) = match self
            .load
            .pick_least_loaded()
            .and_then(|id| ServerAddr::parse(&id))
        {
            Some(server) => (server, RouteReason::LeastLoaded),
            None => {
                let hint = signals.hint.unwrap_or("default");
                let server = self
                    .registry
                    .get(signals.service_id)
                    .and_then(|group| group.choose(hint))
                    .ok_or_else(|| RouteError::NoServerAvailable {
                        service_id: signals.service_id.to_string(),
                    })?;
                (server, RouteReason::GroupFallback)
            }
        };

        if let Some(key) = affinity_key {
            self.affinity.bind(key, &server.id());
        }
        self.load.adjust_query_count(&server.id(), 1.0);

        debug!(server = %server, reason = ?reason, service = signals.service_id, "load-based route");
        Ok(RouteDecision { server, reason })
    }
}

fn nonblank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
