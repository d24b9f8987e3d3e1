use std::fmt;

/// Backend server identity. Its canonical `host:port` string form is the
/// key used by the load tracker and the affinity cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` string. Anything else — wrong part count,
    /// empty host, unparseable port — is not an address; callers treat
    /// that as "signal not available", never as an error.
    pub fn parse(raw: &str) -> Option<ServerAddr> {
        let mut parts = raw.split(':');
        let host = parts.next()?;
        let port = parts.next()?;
        if parts.next().is_some() || host.is_empty() {
            return None;
        }

        Some(ServerAddr::new(host, port.trim().parse().ok()?))
    }

    /// Canonical id string, as used for load and affinity keys.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which routing stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    DiagnosticOverride,
    BiAffinity,
    HostAffinity,
    LeastLoaded,
    GroupFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub server: ServerAddr,
    pub reason: RouteReason,
}

/// Terminal routing failures. Absence of a route is a normal,
/// representable outcome for the HTTP layer to map to a client-visible
/// response; it never aborts the request pipeline.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no server available for service '{service_id}'")]
    NoServerAvailable { service_id: String },
}
