//! The server: a registry of namespaces bound to one transport.

use crate::{
    config::{ServerConfig, normalize_path},
    context::Context,
    error::{Error, Result},
    namespace::Namespace,
};
use sockway_core::{BoxHandler, Handler, HandlerId, Payload, Transport};
use sockway_std::MemoryTransport;
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::{Arc, RwLock},
};
use tracing::{debug, info};

/// Owns every namespace and starts them on a transport.
///
/// # Example
///
/// ```rust,ignore
/// let server = Server::new(ServerConfig::default());
/// server.on("message", handler(|ctx, _next| Box::pin(async move {
///     ctx.emit("echo", ctx.data.clone());
///     Ok(())
/// })), None);
/// server.start(None)?;
/// ```
pub struct Server {
    config: Arc<ServerConfig>,
    namespaces: RwLock<HashMap<String, Namespace>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Server {
    /// Create a server. The default namespace exists immediately.
    pub fn new(config: ServerConfig) -> Self {
        let server = Self {
            config: Arc::new(config),
            namespaces: RwLock::new(HashMap::new()),
            transport: RwLock::new(None),
        };
        server.namespace(None);
        server
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The transport, once started.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().unwrap().clone()
    }

    /// Whether `start` has been called.
    pub fn is_started(&self) -> bool {
        self.transport.read().unwrap().is_some()
    }

    /// Bind to `transport` (an in-process [`MemoryTransport`] when `None`)
    /// and start every namespace. Namespaces created later start on
    /// creation. Returns the transport in use.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] on a second call.
    pub fn start(&self, transport: Option<Arc<dyn Transport>>) -> Result<Arc<dyn Transport>> {
        let transport = {
            let mut slot = self.transport.write().unwrap();
            if slot.is_some() {
                return Err(Error::AlreadyStarted("server".to_string()));
            }
            let transport = match transport {
                Some(transport) => transport,
                None => {
                    info!("no transport supplied; using the in-process transport");
                    Arc::new(MemoryTransport::new()) as Arc<dyn Transport>
                }
            };
            *slot = Some(transport.clone());
            transport
        };

        for namespace in self.namespaces() {
            namespace.try_start(transport.as_ref());
        }
        info!(namespaces = self.namespace_count(), "server started");
        Ok(transport)
    }

    /// Get the namespace at `path` (the default namespace when `None`),
    /// creating it if needed. A leading `/` is added if missing.
    ///
    /// Namespaces created after `start` are started immediately.
    pub fn namespace(&self, path: Option<&str>) -> Namespace {
        let path = normalize_path(path.unwrap_or(&self.config.default_namespace));
        if let Some(namespace) = self.namespaces.read().unwrap().get(&path) {
            return namespace.clone();
        }

        let namespace = match self.namespaces.write().unwrap().entry(path) {
            Entry::Occupied(entry) => return entry.get().clone(),
            Entry::Vacant(entry) => {
                let namespace = Namespace::new(entry.key().clone(), self.config.clone());
                entry.insert(namespace.clone());
                namespace
            }
        };
        debug!(namespace = %namespace.id(), "namespace created");

        if let Some(transport) = self.transport() {
            namespace.try_start(transport.as_ref());
        }
        namespace
    }

    /// All namespaces.
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.namespaces.read().unwrap().values().cloned().collect()
    }

    /// Number of namespaces.
    pub fn namespace_count(&self) -> usize {
        self.namespaces.read().unwrap().len()
    }

    fn targets(&self, namespace: Option<&str>) -> Vec<Namespace> {
        match namespace {
            Some(path) => vec![self.namespace(Some(path))],
            None => self.namespaces(),
        }
    }

    /// Add middleware to one namespace, or to every existing namespace
    /// when `namespace` is `None`. All of them share the returned id.
    pub fn middleware(&self, handler: impl Handler<Context>, namespace: Option<&str>) -> HandlerId {
        let id = HandlerId::next();
        let handler: BoxHandler<Context> = Arc::new(handler);
        for ns in self.targets(namespace) {
            ns.insert_middleware(id, handler.clone());
        }
        id
    }

    /// Add postware, scoped like [`Server::middleware`].
    pub fn post(&self, handler: impl Handler<Context>, namespace: Option<&str>) -> HandlerId {
        let id = HandlerId::next();
        let handler: BoxHandler<Context> = Arc::new(handler);
        for ns in self.targets(namespace) {
            ns.insert_post(id, handler.clone());
        }
        id
    }

    /// Remove middleware or postware from one namespace, or from all.
    pub fn remove_middleware(&self, id: HandlerId, namespace: Option<&str>) -> bool {
        let mut removed = false;
        for ns in self.targets(namespace) {
            removed |= ns.remove_middleware(id);
        }
        removed
    }

    /// Add a listener, scoped like [`Server::middleware`].
    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Handler<Context>,
        namespace: Option<&str>,
    ) -> HandlerId {
        let event = event.into();
        let id = HandlerId::next();
        let handler: BoxHandler<Context> = Arc::new(handler);
        for ns in self.targets(namespace) {
            ns.insert_listener(event.clone(), id, handler.clone());
        }
        id
    }

    /// Remove listeners, scoped like [`Server::middleware`].
    pub fn off(&self, event: &str, id: Option<HandlerId>, namespace: Option<&str>) {
        for ns in self.targets(namespace) {
            ns.off(event, id);
        }
    }

    /// Broadcast an event through the transport. Does nothing before
    /// `start`.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) {
        match self.transport() {
            Some(transport) => transport.emit(event, payload.into()),
            None => debug!(event, "server not started; emit ignored"),
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("started", &self.is_started())
            .field("namespaces", &self.namespace_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_namespace_exists() {
        let server = Server::default();
        assert_eq!(server.namespace_count(), 1);
        assert_eq!(server.namespace(None).id(), "/");
    }

    #[test]
    fn test_namespace_path_is_normalized() {
        let server = Server::default();
        let a = server.namespace(Some("chat"));
        let b = server.namespace(Some("/chat"));
        assert!(a.ptr_eq(&b));
        assert_eq!(a.id(), "/chat");
    }

    #[test]
    fn test_custom_default_namespace() {
        let config = ServerConfig::builder().default_namespace("lobby").build();
        let server = Server::new(config);
        assert_eq!(server.namespace(None).id(), "/lobby");
    }
}
