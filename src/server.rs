//! Servers: named containers of services, subject to crash and reboot.
//!
//! A server groups several services behind one name on the network, so one
//! process-like unit can answer both `"Raft.append"` and `"Store.get"`.
//! Handles are cheap clones of a shared core; the network compares handle
//! identity to decide whether the server at a name has been replaced, which
//! is how a reboot invalidates in-flight calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::codec::{JsonCodec, MessageCodec};
use crate::service::Service;

/// A named container of [`Service`]s with a dispatch-attempt counter.
///
/// Register it with [`Network::add_server`](crate::Network::add_server);
/// replace it at the same name to simulate a reboot, or delete it to
/// simulate a crash.
pub struct Server<C: MessageCodec = JsonCodec> {
    core: Arc<ServerCore<C>>,
}

struct ServerCore<C: MessageCodec> {
    inner: Mutex<ServerInner<C>>,
}

struct ServerInner<C: MessageCodec> {
    services: HashMap<String, Service<C>>,
    dispatch_count: u64,
}

impl<C: MessageCodec> Clone for Server<C> {
    fn clone(&self) -> Self {
        Server {
            core: Arc::clone(&self.core),
        }
    }
}

impl<C: MessageCodec> Default for Server<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: MessageCodec> Server<C> {
    /// Create an empty server.
    ///
    /// The codec type parameter is pinned by the services registered on it
    /// (and by the network it is added to), so mismatched codecs fail to
    /// compile rather than fail to decode.
    pub fn new() -> Self {
        Server {
            core: Arc::new(ServerCore {
                inner: Mutex::new(ServerInner {
                    services: HashMap::new(),
                    dispatch_count: 0,
                }),
            }),
        }
    }

    /// Register `service` under its name, replacing any prior entry.
    pub fn add_service(&self, service: Service<C>) {
        let mut inner = self.core.inner.lock().expect("server state poisoned");
        inner.services.insert(service.name().to_string(), service);
    }

    /// Names of the registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let inner = self.core.inner.lock().expect("server state poisoned");
        let mut names: Vec<String> = inner.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// How many dispatches this server has been asked to attempt.
    ///
    /// Counts attempts, not completions: the counter moves before the
    /// service lookup, so a misdialed call still counts.
    pub fn dispatch_count(&self) -> u64 {
        let inner = self.core.inner.lock().expect("server state poisoned");
        inner.dispatch_count
    }

    /// Route one call to the owning service.
    ///
    /// `method` is `"Service.method"`, split at the last dot.
    ///
    /// # Panics
    ///
    /// Panics on a malformed method name or an unknown service, naming the
    /// registered services. Both are harness bugs, not network conditions.
    pub(crate) fn dispatch(&self, method: &str, payload: &[u8]) -> Vec<u8> {
        let (service, known) = {
            let mut inner = self.core.inner.lock().expect("server state poisoned");
            // Attempts are counted before the lookup can miss.
            inner.dispatch_count += 1;
            let service = method
                .rsplit_once('.')
                .and_then(|(service_name, _)| inner.services.get(service_name).cloned());
            let mut known: Vec<String> = inner.services.keys().cloned().collect();
            known.sort();
            (service, known)
        };

        match (method.rsplit_once('.'), service) {
            (Some((_, method_name)), Some(service)) => service.dispatch(method_name, payload),
            (Some((service_name, _)), None) => panic!(
                "unknown service '{}' in '{}'; expecting one of {:?}",
                service_name, method, known
            ),
            (None, _) => panic!(
                "malformed method '{}'; expected \"Service.method\"",
                method
            ),
        }
    }

    /// Whether `other` is the same server instance, not merely a clone-equal
    /// configuration. The network uses this to detect reboots.
    pub(crate) fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<C: MessageCodec> std::fmt::Debug for Server<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("services", &self.service_names())
            .field("dispatch_count", &self.dispatch_count())
            .finish()
    }
}
