use crate::routing::ServerAddr;
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{info, trace};

/// One generation of the backend pool registered under a logical service
/// id. Generations carry a monotonic version ("mvcc"); only the highest
/// registered generation is live.
#[derive(Debug)]
pub struct ResourceGroup {
    service_id: String,
    servers: Vec<ServerAddr>,
    version: u64,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl ResourceGroup {
    pub fn new(service_id: impl Into<String>, servers: Vec<ServerAddr>, version: u64) -> Self {
        Self {
            service_id: service_id.into(),
            servers,
            version,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn servers(&self) -> &[ServerAddr] {
        &self.servers
    }

    /// The group's own selection policy: round-robin over the member
    /// list. Returns `None` once the group is shut down or has no
    /// members. The hint is opaque; callers pass `"default"` when they
    /// have none.
    pub fn choose(&self, hint: &str) -> Option<ServerAddr> {
        if self.closed.load(Ordering::Acquire) || self.servers.is_empty() {
            return None;
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.servers.len();
        trace!(service = %self.service_id, hint, "resource group fallback selection");
        Some(self.servers[idx].clone())
    }

    /// Release the group's background resources. Idempotent; shutting
    /// down one group never blocks another.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(service = %self.service_id, version = self.version, "resource group shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `[host:port, host:port]` member view for status endpoints.
    fn member_list(&self) -> String {
        let members = self
            .servers
            .iter()
            .map(ServerAddr::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{members}]")
    }
}

/// serviceId -> live ResourceGroup table.
///
/// Replacement is a single atomic pointer swap: readers never observe a
/// partially updated table.
#[derive(Debug, Default)]
pub struct ResourceGroupRegistry {
    groups: ArcSwap<HashMap<String, Arc<ResourceGroup>>>,
}

impl ResourceGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a whole new table. Every replaced group whose version is
    /// strictly lower than `version` is shut down after the swap.
    pub fn replace_all(&self, groups: Vec<Arc<ResourceGroup>>, version: u64) {
        let mut table = HashMap::with_capacity(groups.len());
        for group in groups {
            table.insert(group.service_id().to_string(), group);
        }

        let old = self.groups.swap(Arc::new(table));
        for group in old.values() {
            if group.version() < version {
                group.shutdown();
            }
        }

        for group in self.groups.load().values() {
            info!(
                service = %group.service_id(),
                version = group.version(),
                servers = %group.member_list(),
                "registered resource group"
            );
        }
    }

    /// Insert groups whose service id is not present yet; existing groups
    /// are left untouched.
    pub fn add_if_absent(&self, groups: Vec<Arc<ResourceGroup>>) {
        self.groups.rcu(|table| {
            let mut table = HashMap::clone(table);
            for group in &groups {
                table
                    .entry(group.service_id().to_string())
                    .or_insert_with(|| group.clone());
            }
            table
        });
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<ResourceGroup>> {
        self.groups.load().get(service_id).cloned()
    }

    /// Human-readable serviceId -> member-list view for health/status
    /// endpoints.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.groups
            .load()
            .iter()
            .map(|(service_id, group)| (service_id.clone(), group.member_list()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn group(service_id: &str, ports: &[u16], version: u64) -> Arc<ResourceGroup> {
        let servers = ports
            .iter()
            .map(|p| ServerAddr::new("10.0.0.1", *p))
            .collect();
        Arc::new(ResourceGroup::new(service_id, servers, version))
    }

    #[test]
    fn choose_round_robins_over_members() {
        let group = group("svc", &[1, 2, 3], 1);
        let picks: Vec<u16> = (0..4).map(|_| group.choose("default").unwrap().port).collect();
        assert_eq!(picks, vec![1, 2, 3, 1]);
    }

    #[test]
    fn choose_on_empty_or_closed_group_is_none() {
        let empty = group("svc", &[], 1);
        assert_eq!(empty.choose("default"), None);

        let closed = group("svc", &[1], 1);
        closed.shutdown();
        assert_eq!(closed.choose("default"), None);
    }

    #[test]
    fn replace_shuts_down_strictly_older_generations() {
        let registry = ResourceGroupRegistry::new();
        let v1 = group("svcA", &[1], 1);
        registry.replace_all(vec![v1.clone()], 1);

        let v2 = group("svcA", &[2], 2);
        registry.replace_all(vec![v2.clone()], 2);

        assert!(v1.is_closed());
        assert!(!v2.is_closed());
        assert_eq!(registry.get("svcA").unwrap().version(), 2);
    }

    #[test]
    fn replace_keeps_same_version_groups_alive() {
        let registry = ResourceGroupRegistry::new();
        let first = group("svcA", &[1], 2);
        registry.replace_all(vec![first.clone()], 2);

        // Re-registering at the same version replaces the table entry but
        // does not shut the displaced group down (not strictly lower).
        let second = group("svcA", &[2], 2);
        registry.replace_all(vec![second], 2);

        assert!(!first.is_closed());
    }

    #[test]
    fn add_if_absent_never_overwrites() {
        let registry = ResourceGroupRegistry::new();
        registry.replace_all(vec![group("svcA", &[1], 1)], 1);

        registry.add_if_absent(vec![group("svcA", &[9], 2), group("svcB", &[2], 2)]);

        assert_eq!(registry.get("svcA").unwrap().version(), 1);
        assert_eq!(registry.get("svcB").unwrap().version(), 2);
    }

    #[test]
    fn get_unknown_service_is_none() {
        assert!(ResourceGroupRegistry::new().get("missing").is_none());
    }

    #[test]
    fn snapshot_formats_member_lists() {
        let registry = ResourceGroupRegistry::new();
        registry.replace_all(vec![group("svcA", &[1, 2], 1)], 1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot["svcA"], "[10.0.0.1:1, 10.0.0.1:2]");
    }
}
