//! Server configuration.

/// Path of the namespace every server creates up front.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Default bound on packets buffered for one pre-handshake connection.
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 16;

/// Default bound on ghost connections per namespace.
pub const DEFAULT_MAX_GHOSTS: usize = 1024;

/// Server-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Namespace used when a call does not name one.
    pub default_namespace: String,
    /// Packets kept per ghost connection while its handshake is pending.
    /// Later packets are dropped.
    pub max_pending_packets: usize,
    /// Ghost connections kept per namespace. Packets from further peers
    /// whose handshake is pending are dropped.
    pub max_ghosts: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
            max_ghosts: DEFAULT_MAX_GHOSTS,
        }
    }
}

impl ServerConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for [`ServerConfig`].
///
/// # Example
/// ```ignore
/// let config = ServerConfig::builder()
///     .default_namespace("chat")
///     .max_pending_packets(4)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the default namespace. A leading `/` is added if missing.
    pub fn default_namespace(mut self, path: impl AsRef<str>) -> Self {
        self.config.default_namespace = normalize_path(path.as_ref());
        self
    }

    /// Set the per-ghost packet buffer bound.
    pub fn max_pending_packets(mut self, max: usize) -> Self {
        self.config.max_pending_packets = max;
        self
    }

    /// Set the per-namespace ghost bound.
    pub fn max_ghosts(mut self, max: usize) -> Self {
        self.config.max_ghosts = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Normalize a namespace path so it starts with `/`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("chat"), "/chat");
        assert_eq!(normalize_path("/chat"), "/chat");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .default_namespace("lobby")
            .max_pending_packets(2)
            .max_ghosts(8)
            .build();
        assert_eq!(config.default_namespace, "/lobby");
        assert_eq!(config.max_pending_packets, 2);
        assert_eq!(config.max_ghosts, 8);
        assert_eq!(ServerConfig::default().default_namespace, "/");
    }
}
