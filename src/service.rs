//! Services: named bundles of handlers bound to a receiver object.
//!
//! A service captures one receiver value (the state the handlers operate
//! on) and a table of methods. Each registered method is a plain closure of
//! shape `Fn(&Receiver, Args, &mut Reply)`: the fabric decodes the argument
//! bytes into a fresh `Args`, hands the handler a zeroed `Reply` slot, and
//! encodes whatever the handler wrote there. Handlers never see bytes and
//! never return errors; application-level failure goes in the reply payload.
//!
//! By default a service is named after its receiver type, so a `Raft`
//! receiver answers `"Raft.request_vote"`. Use [`ServiceBuilder::named`] to
//! override.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{JsonCodec, MessageCodec};

/// An erased handler: argument bytes in, reply bytes out.
type Handler = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// A named, immutable table of handlers sharing one receiver.
///
/// Built with [`ServiceBuilder`]; registered on a
/// [`Server`](crate::Server). Cloning is cheap and clones share the
/// receiver.
pub struct Service<C: MessageCodec = JsonCodec> {
    inner: Arc<ServiceInner>,
    _codec: PhantomData<C>,
}

struct ServiceInner {
    name: String,
    methods: HashMap<String, Handler>,
}

impl<C: MessageCodec> Clone for Service<C> {
    fn clone(&self) -> Self {
        Service {
            inner: Arc::clone(&self.inner),
            _codec: PhantomData,
        }
    }
}

impl Service<JsonCodec> {
    /// Start building a JSON-codec service around `receiver`.
    ///
    /// Shorthand for [`ServiceBuilder::new`].
    pub fn builder<R: Send + Sync + 'static>(receiver: R) -> ServiceBuilder<R, JsonCodec> {
        ServiceBuilder::new(receiver)
    }
}

impl<C: MessageCodec> Service<C> {
    /// The service name; the part before the dot in `"Service.method"`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Decode, invoke, encode for one call.
    ///
    /// # Panics
    ///
    /// Panics if `method` is not registered, naming the known methods. A
    /// miss means the harness dialed a method the service never had, which
    /// is a bug in the test, not a network condition.
    pub(crate) fn dispatch(&self, method: &str, payload: &[u8]) -> Vec<u8> {
        match self.inner.methods.get(method) {
            Some(handler) => handler(payload),
            None => panic!(
                "service '{}' has no method '{}'; expecting one of {:?}",
                self.inner.name,
                method,
                self.method_names()
            ),
        }
    }
}

impl<C: MessageCodec> std::fmt::Debug for Service<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.inner.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Builder registering typed handlers on a receiver.
///
/// # Examples
///
/// ```
/// use simrpc::ServiceBuilder;
///
/// struct Counter;
///
/// let svc = ServiceBuilder::new(Counter)
///     .method("bump", |_recv: &Counter, amount: i64, reply: &mut i64| {
///         *reply = amount + 1;
///     })
///     .build();
///
/// assert_eq!(svc.name(), "Counter");
/// assert_eq!(svc.method_names(), vec!["bump".to_string()]);
/// ```
pub struct ServiceBuilder<R, C: MessageCodec = JsonCodec> {
    receiver: Arc<R>,
    name: String,
    codec: C,
    methods: HashMap<String, Handler>,
}

impl<R: Send + Sync + 'static> ServiceBuilder<R, JsonCodec> {
    /// Start a JSON-codec service around `receiver`, named after its type.
    pub fn new(receiver: R) -> Self {
        Self::with_codec(receiver, JsonCodec)
    }
}

impl<R: Send + Sync + 'static, C: MessageCodec> ServiceBuilder<R, C> {
    /// Start a service around `receiver` with an explicit codec.
    ///
    /// The codec must match the one the rest of the network uses; the type
    /// parameter threads that requirement through
    /// [`Server`](crate::Server) and [`Network`](crate::Network).
    pub fn with_codec(receiver: R, codec: C) -> Self {
        ServiceBuilder {
            receiver: Arc::new(receiver),
            name: receiver_type_name::<R>(),
            codec,
            methods: HashMap::new(),
        }
    }

    /// Override the service name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a handler under `method`.
    ///
    /// On dispatch the argument bytes are decoded into a fresh `Args`, the
    /// handler runs against the shared receiver with a `Reply::default()`
    /// slot, and the slot is encoded as the reply. Registering the same
    /// method twice keeps the later handler.
    ///
    /// The erased handler panics if the argument bytes do not decode as
    /// `Args` or the reply fails to encode; both mean the caller and the
    /// service disagree about types, which no amount of retrying fixes.
    pub fn method<Args, Reply, F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        Args: DeserializeOwned + 'static,
        Reply: Serialize + Default + 'static,
        F: Fn(&R, Args, &mut Reply) + Send + Sync + 'static,
    {
        let method = method.into();
        let receiver = Arc::clone(&self.receiver);
        let codec = self.codec.clone();
        let label = format!("{}.{}", self.name, method);

        self.methods.insert(
            method,
            Box::new(move |payload: &[u8]| {
                let args: Args = match codec.decode(payload) {
                    Ok(args) => args,
                    Err(e) => panic!("{}: failed to decode argument: {}", label, e),
                };
                let mut reply = Reply::default();
                handler(&receiver, args, &mut reply);
                match codec.encode(&reply) {
                    Ok(bytes) => bytes,
                    Err(e) => panic!("{}: failed to encode reply: {}", label, e),
                }
            }),
        );
        self
    }

    /// Finish the service.
    pub fn build(self) -> Service<C> {
        Service {
            inner: Arc::new(ServiceInner {
                name: self.name,
                methods: self.methods,
            }),
            _codec: PhantomData,
        }
    }
}

/// Last path segment of a type name, generics stripped.
fn receiver_type_name<R>() -> String {
    let full = std::any::type_name::<R>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
