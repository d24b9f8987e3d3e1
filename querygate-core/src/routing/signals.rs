/// Diagnostic override header: exact target host.
pub const X_HOST: &str = "X-Host";

/// Diagnostic override header: exact target port.
pub const X_PORT: &str = "X-Port";

/// Parsed request signals handed in by the surrounding HTTP layer.
///
/// Everything except the logical service id is optional; a missing or
/// malformed signal degrades the decision to the next routing stage and
/// is never surfaced as an error.
#[derive(Debug, Default)]
pub struct RoutingSignals<'a> {
    /// `X-Host` header value, when present.
    pub diag_host: Option<&'a str>,
    /// `X-Port` header value, when present.
    pub diag_port: Option<&'a str>,
    /// First value of the `Host` header.
    pub host_header: Option<&'a str>,
    /// Remote client host string.
    pub remote_host: Option<&'a str>,
    /// Project name, when the external extraction step succeeded.
    pub project: Option<&'a str>,
    /// User name, when the external extraction step succeeded.
    pub user: Option<&'a str>,
    /// Logical service id for resource-group fallback.
    pub service_id: &'a str,
    /// Opaque routing hint for the group's own selection policy.
    pub hint: Option<&'a str>,
}
