//! The virtual network: delivery tables plus a fault-injection dispatcher.
//!
//! A [`Network`] owns the authoritative view of the world behind a single
//! mutex: which endpoints exist, which are enabled, what they connect to,
//! and which server currently lives at each server name. A background
//! consumer drains the shared ingress channel and spawns one worker task per
//! request; the worker snapshots policy once, then walks the request through
//! the fault model:
//!
//! 1. Not wired up (disabled, unconnected, or dead server): sleep a random
//!    delay (long if [`Network::set_long_delays`] is on) and fail.
//! 2. Unreliable: a short jitter, then a coin that may drop the request.
//! 3. Dispatch on its own task, watched every
//!    [`NetworkTuning::watchdog_interval`] for the server dying or being
//!    replaced out from under the call.
//! 4. On completion: a dead-server verdict fails the call; otherwise an
//!    unreliable coin may drop the reply, and a reordering coin may park it
//!    for a while before delivery.
//!
//! Every request gets exactly one reply envelope, so callers always
//! unblock. A worker abandoned by the watchdog does not cancel its handler;
//! the handler runs to completion and its effects on the receiver stand,
//! just as a rebooting server in the real world cannot un-happen a write
//! that was already in flight.
//!
//! Workers and dispatch tasks are spawned without bound; the harness is
//! expected to keep workloads finite. There is no backpressure on ingress.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::client::ClientEnd;
use crate::codec::{JsonCodec, MessageCodec};
use crate::envelope::{ReplyEnvelope, RequestEnvelope};
use crate::node_id::NodeId;
use crate::rng;
use crate::server::Server;

/// Knobs of the fault model.
///
/// The defaults are the canonical values the fabric has always used; chaos
/// tests that want a harsher or tamer network pass their own via
/// [`Network::with_tuning`]. Probabilities are in `[0, 1]`; duration fields
/// are exclusive upper bounds unless noted.
#[derive(Debug, Clone)]
pub struct NetworkTuning {
    /// Jitter slept before every request on an unreliable network.
    pub unreliable_jitter: Duration,
    /// Probability an unreliable network drops a request before dispatch.
    pub drop_request_ratio: f64,
    /// Probability an unreliable network drops a reply after dispatch.
    pub drop_reply_ratio: f64,
    /// Probability a reply is parked for a reordering delay.
    pub reorder_ratio: f64,
    /// Fixed floor of the reordering delay.
    pub reorder_base_delay: Duration,
    /// Random spread added on top of the floor. The spread is sampled in
    /// two stages, biasing reordering toward short delays.
    pub reorder_spread: Duration,
    /// How often an in-flight call re-checks that its server is alive.
    pub watchdog_interval: Duration,
    /// Failure delay for calls on endpoints that are not wired up.
    pub unwired_quick_delay: Duration,
    /// Same, when long delays are enabled; models a timeout against a
    /// dead peer.
    pub unwired_long_delay: Duration,
}

impl Default for NetworkTuning {
    fn default() -> Self {
        NetworkTuning {
            unreliable_jitter: Duration::from_millis(27),
            drop_request_ratio: 0.1,
            drop_reply_ratio: 0.1,
            reorder_ratio: 600.0 / 900.0,
            reorder_base_delay: Duration::from_millis(200),
            reorder_spread: Duration::from_millis(2000),
            watchdog_interval: Duration::from_millis(100),
            unwired_quick_delay: Duration::from_millis(100),
            unwired_long_delay: Duration::from_millis(7000),
        }
    }
}

/// The tables every worker consults, guarded by one mutex.
struct NetworkState<C: MessageCodec> {
    reliable: bool,
    long_delays: bool,
    long_reordering: bool,
    /// Every endpoint name ever registered; enforces uniqueness.
    ends: HashSet<NodeId>,
    enabled: HashMap<NodeId, bool>,
    connections: HashMap<NodeId, Option<NodeId>>,
    /// `None` marks a crashed server that still occupies its name.
    servers: HashMap<NodeId, Option<Server<C>>>,
}

/// One consistent read of everything a worker needs to route a request.
struct EndpointSnapshot<C: MessageCodec> {
    enabled: bool,
    server_name: Option<NodeId>,
    server: Option<Server<C>>,
    reliable: bool,
    long_delays: bool,
    long_reordering: bool,
}

struct NetworkCore<C: MessageCodec> {
    state: Mutex<NetworkState<C>>,
    tuning: NetworkTuning,
    codec: C,
    total_rpcs: AtomicU64,
}

/// The simulated network.
///
/// Owns the endpoint/server/connection tables and the fault policy, and
/// answers every submitted request exactly once: with the handler's reply,
/// or with a synthetic failure when the fault model says so.
///
/// Cloning yields another handle to the same network. Construction spawns
/// the ingress consumer, so a `Network` must be created inside a tokio
/// runtime.
///
/// # Examples
///
/// ```
/// use simrpc::{Network, Server, ServiceBuilder};
///
/// struct Echo;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() {
/// let net = Network::new();
/// let end = net.make_end("client-0");
///
/// let server = Server::new();
/// server.add_service(
///     ServiceBuilder::new(Echo)
///         .method("shout", |_e: &Echo, s: String, reply: &mut String| {
///             *reply = s.to_uppercase();
///         })
///         .build(),
/// );
/// net.add_server("server-0", server);
/// net.connect("client-0", "server-0");
/// net.enable("client-0", true);
///
/// let mut reply = String::new();
/// assert!(end.call("Echo.shout", &"hi".to_string(), &mut reply).await);
/// assert_eq!(reply, "HI");
/// # }
/// ```
pub struct Network<C: MessageCodec = JsonCodec> {
    core: Arc<NetworkCore<C>>,
    ingress: mpsc::UnboundedSender<RequestEnvelope>,
}

impl<C: MessageCodec> Clone for Network<C> {
    fn clone(&self) -> Self {
        Network {
            core: Arc::clone(&self.core),
            ingress: self.ingress.clone(),
        }
    }
}

impl Network<JsonCodec> {
    /// Create a reliable JSON-codec network with default tuning.
    pub fn new() -> Self {
        Self::with_codec_and_tuning(JsonCodec, NetworkTuning::default())
    }

    /// Create a JSON-codec network with custom fault tuning.
    pub fn with_tuning(tuning: NetworkTuning) -> Self {
        Self::with_codec_and_tuning(JsonCodec, tuning)
    }
}

impl Default for Network<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: MessageCodec> Network<C> {
    /// Create a network speaking a custom codec.
    pub fn with_codec(codec: C) -> Self {
        Self::with_codec_and_tuning(codec, NetworkTuning::default())
    }

    /// Create a network with both a custom codec and custom tuning.
    pub fn with_codec_and_tuning(codec: C, tuning: NetworkTuning) -> Self {
        let (ingress, mut requests) = mpsc::unbounded_channel::<RequestEnvelope>();
        let core = Arc::new(NetworkCore {
            state: Mutex::new(NetworkState {
                reliable: true,
                long_delays: false,
                long_reordering: false,
                ends: HashSet::new(),
                enabled: HashMap::new(),
                connections: HashMap::new(),
                servers: HashMap::new(),
            }),
            tuning,
            codec,
            total_rpcs: AtomicU64::new(0),
        });

        // Ingress consumer: FIFO acceptance, then every request is on its
        // own. Exits when the last sender (network handle or client end)
        // is gone.
        let consumer = Arc::clone(&core);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                tokio::spawn(process_request(Arc::clone(&consumer), request));
            }
        });

        Network { core, ingress }
    }

    /// Register a new endpoint, initially disabled and unconnected.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn make_end(&self, name: impl Into<NodeId>) -> ClientEnd<C> {
        let name = name.into();
        let mut state = self.lock_state();
        if !state.ends.insert(name.clone()) {
            panic!("endpoint '{}' is already registered", name);
        }
        state.enabled.insert(name.clone(), false);
        state.connections.insert(name.clone(), None);
        tracing::debug!("endpoint {} registered", name);
        ClientEnd::new(name, self.ingress.clone(), self.core.codec.clone())
    }

    /// Install `server` at `name`, replacing any prior instance.
    ///
    /// In-flight calls dispatched to the prior instance fail once the
    /// watchdog notices the replacement.
    pub fn add_server(&self, name: impl Into<NodeId>, server: Server<C>) {
        let name = name.into();
        let mut state = self.lock_state();
        state.servers.insert(name.clone(), Some(server));
        tracing::debug!("server {} installed", name);
    }

    /// Crash the server at `name`: the name stays known but dead.
    pub fn delete_server(&self, name: impl Into<NodeId>) {
        let name = name.into();
        let mut state = self.lock_state();
        state.servers.insert(name.clone(), None);
        tracing::debug!("server {} removed", name);
    }

    /// Point `end_name` at `server_name`.
    ///
    /// Reassigning an endpoint silently overwrites the old connection.
    pub fn connect(&self, end_name: impl Into<NodeId>, server_name: impl Into<NodeId>) {
        let end_name = end_name.into();
        let server_name = server_name.into();
        let mut state = self.lock_state();
        state
            .connections
            .insert(end_name.clone(), Some(server_name.clone()));
        tracing::debug!("endpoint {} connected to server {}", end_name, server_name);
    }

    /// Enable or disable an endpoint.
    pub fn enable(&self, end_name: impl Into<NodeId>, enabled: bool) {
        let end_name = end_name.into();
        let mut state = self.lock_state();
        state.enabled.insert(end_name.clone(), enabled);
        tracing::debug!(
            "endpoint {} {}",
            end_name,
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Toggle drops and jitter. Reliable networks deliver everything.
    pub fn set_reliable(&self, reliable: bool) {
        self.lock_state().reliable = reliable;
        tracing::debug!("network reliable = {}", reliable);
    }

    /// Toggle long failure delays for calls that reach nothing.
    pub fn set_long_delays(&self, long_delays: bool) {
        self.lock_state().long_delays = long_delays;
        tracing::debug!("network long_delays = {}", long_delays);
    }

    /// Toggle reply reordering: most replies get parked for a while.
    pub fn set_long_reordering(&self, long_reordering: bool) {
        self.lock_state().long_reordering = long_reordering;
        tracing::debug!("network long_reordering = {}", long_reordering);
    }

    /// Dispatch attempts seen by the live server at `name`.
    ///
    /// # Panics
    ///
    /// Panics if no live server is installed at `name`.
    pub fn dispatch_count(&self, name: impl Into<NodeId>) -> u64 {
        let name = name.into();
        let state = self.lock_state();
        match state.servers.get(&name) {
            Some(Some(server)) => server.dispatch_count(),
            _ => panic!("no live server '{}' to count dispatches for", name),
        }
    }

    /// Total requests accepted by the fabric, across all servers and
    /// including ones that never reached a server.
    pub fn total_rpc_count(&self) -> u64 {
        self.core.total_rpcs.load(Ordering::Relaxed)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, NetworkState<C>> {
        self.core.state.lock().expect("network state poisoned")
    }
}

impl<C: MessageCodec> NetworkCore<C> {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, NetworkState<C>> {
        self.state.lock().expect("network state poisoned")
    }

    /// One consistent read of routing and policy for `origin`.
    fn snapshot(&self, origin: &NodeId) -> EndpointSnapshot<C> {
        let state = self.lock_state();
        let server_name = state.connections.get(origin).cloned().flatten();
        let server = server_name
            .as_ref()
            .and_then(|name| state.servers.get(name).cloned().flatten());
        EndpointSnapshot {
            enabled: state.enabled.get(origin).copied().unwrap_or(false),
            server_name,
            server,
            reliable: state.reliable,
            long_delays: state.long_delays,
            long_reordering: state.long_reordering,
        }
    }

    /// Whether the call from `origin` to `server` should be considered
    /// dead: endpoint disabled, or the name no longer holds that instance.
    fn server_dead(&self, origin: &NodeId, server_name: &NodeId, server: &Server<C>) -> bool {
        let state = self.lock_state();
        let enabled = state.enabled.get(origin).copied().unwrap_or(false);
        let current_holds_instance = matches!(
            state.servers.get(server_name),
            Some(Some(current)) if current.same_instance(server)
        );
        !enabled || !current_holds_instance
    }
}

/// Walk one request through the fault model. Exactly one reply envelope is
/// sent in every path.
async fn process_request<C: MessageCodec>(core: Arc<NetworkCore<C>>, request: RequestEnvelope) {
    core.total_rpcs.fetch_add(1, Ordering::Relaxed);
    let RequestEnvelope {
        origin,
        method,
        payload,
        reply_tx,
    } = request;

    let snapshot = core.snapshot(&origin);
    let tuning = &core.tuning;

    let (server_name, server) = match (snapshot.enabled, snapshot.server_name, snapshot.server) {
        (true, Some(server_name), Some(server)) => (server_name, server),
        _ => {
            // Nothing on the other side. Simulate the caller waiting out a
            // timeout before learning that.
            let limit = if snapshot.long_delays {
                tuning.unwired_long_delay
            } else {
                tuning.unwired_quick_delay
            };
            let delay = rng::random_delay(limit);
            tracing::debug!(
                "call {} from {}: not wired up, failing after {:?}",
                method,
                origin,
                delay
            );
            tokio::time::sleep(delay).await;
            let _ = reply_tx.send(ReplyEnvelope::failure());
            return;
        }
    };

    if !snapshot.reliable {
        tokio::time::sleep(rng::random_delay(tuning.unreliable_jitter)).await;
        if rng::random_ratio() < tuning.drop_request_ratio {
            tracing::debug!("call {} from {}: request dropped", method, origin);
            let _ = reply_tx.send(ReplyEnvelope::failure());
            return;
        }
    }

    // Run the handler on its own task so the watchdog can stop waiting on
    // it. The task itself is never cancelled; a handler that loses the race
    // still runs to completion and its writes to the receiver stand.
    let (done_tx, mut done_rx) = oneshot::channel();
    let mut dispatch_task = Some(tokio::spawn({
        let server = server.clone();
        let method = method.clone();
        async move {
            let _ = done_tx.send(server.dispatch(&method, &payload));
        }
    }));

    let mut outcome: Option<Vec<u8>> = None;
    loop {
        match tokio::time::timeout(tuning.watchdog_interval, &mut done_rx).await {
            Ok(Ok(reply)) => {
                outcome = Some(reply);
                break;
            }
            Ok(Err(_)) => {
                // The dispatch task died without answering; surface its
                // panic instead of inventing a network failure.
                if let Some(task) = dispatch_task.take() {
                    if let Err(join_error) = task.await {
                        if join_error.is_panic() {
                            std::panic::resume_unwind(join_error.into_panic());
                        }
                    }
                }
                break;
            }
            Err(_elapsed) => {
                if core.server_dead(&origin, &server_name, &server) {
                    tracing::debug!(
                        "call {} from {}: server {} died mid-call",
                        method,
                        origin,
                        server_name
                    );
                    break;
                }
            }
        }
    }
    drop(dispatch_task);

    // The server may have been replaced between the handler finishing and
    // this point; a reply from a dead server must not reach the caller.
    let dead = core.server_dead(&origin, &server_name, &server);

    match outcome {
        Some(reply) if !dead => {
            if !snapshot.reliable && rng::random_ratio() < tuning.drop_reply_ratio {
                tracing::debug!("call {} from {}: reply dropped", method, origin);
                let _ = reply_tx.send(ReplyEnvelope::failure());
            } else if snapshot.long_reordering && rng::random_ratio() < tuning.reorder_ratio {
                let spread_ms = tuning.reorder_spread.as_millis() as u64;
                let upper_ms = 1 + rng::random_range_or_default(0..spread_ms);
                let delay =
                    tuning.reorder_base_delay + Duration::from_millis(rng::random_range(0..upper_ms));
                tracing::debug!(
                    "call {} from {}: reply parked {:?} for reordering",
                    method,
                    origin,
                    delay
                );
                tokio::time::sleep(delay).await;
                let _ = reply_tx.send(ReplyEnvelope::success(reply));
            } else {
                let _ = reply_tx.send(ReplyEnvelope::success(reply));
            }
        }
        _ => {
            let _ = reply_tx.send(ReplyEnvelope::failure());
        }
    }
}
