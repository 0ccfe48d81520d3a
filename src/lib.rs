//! # simrpc
//!
//! A simulated, in-process RPC fabric for exercising distributed algorithms
//! (consensus protocols, replicated key/value stores) under controlled,
//! adversarial network conditions, without sockets.
//!
//! A test harness builds a [`Network`], attaches [`Server`]s exposing
//! handler methods through [`Service`]s, hands out named [`ClientEnd`]s,
//! and then turns the dials: reliability, long delays, reply reordering,
//! endpoint enable/disable, server crash and reboot. The system under test
//! only ever sees `call` succeed or fail.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Network`] | Routing tables, fault-injection policy, per-request workers |
//! | [`Server`] | Named container of services; crash/reboot target |
//! | [`Service`] / [`ServiceBuilder`] | Typed handlers bound to a receiver object |
//! | [`ClientEnd`] | Named caller handle; `call("Service.method", …)` |
//! | [`MessageCodec`] / [`JsonCodec`] | Pluggable argument/reply serialization |
//! | [`NetworkTuning`] | Fault-model knobs (drop ratios, delays, watchdog) |
//!
//! ## Fault model
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | Endpoint disabled / unconnected / server dead | Fail after up to 100 ms (7 s with long delays) |
//! | Unreliable | 0–27 ms jitter, 10% request drop, 10% reply drop |
//! | Long reordering | ~2/3 of replies parked 200–2200 ms |
//! | Server replaced or deleted mid-call | In-flight calls fail within the 100 ms watchdog |
//!
//! Randomness is seedable per thread via [`set_rng_seed`] for reproducible
//! runs.
//!
//! ## Quick start
//!
//! ```
//! use simrpc::{Network, Server, ServiceBuilder};
//!
//! struct Calculator;
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() {
//! let net = Network::new();
//! let end = net.make_end("client");
//!
//! let server = Server::new();
//! server.add_service(
//!     ServiceBuilder::new(Calculator)
//!         .method("square", |_c: &Calculator, n: i64, reply: &mut i64| {
//!             *reply = n * n;
//!         })
//!         .build(),
//! );
//! net.add_server("backend", server);
//! net.connect("client", "backend");
//! net.enable("client", true);
//!
//! let mut reply = 0i64;
//! assert!(end.call("Calculator.square", &12i64, &mut reply).await);
//! assert_eq!(reply, 144);
//! # }
//! ```
//!
//! ## Scope
//!
//! Everything is in-process: no sockets, no cross-process transport, no
//! authentication, no durable storage. Handlers are user code and never
//! return engine-level errors; application failure travels inside the reply
//! payload.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod client;
mod codec;
mod envelope;
mod network;
mod node_id;
mod rng;
mod server;
mod service;

// Codec exports
pub use codec::{CodecError, JsonCodec, MessageCodec};

// Identity exports
pub use node_id::NodeId;

// Fabric exports
pub use client::ClientEnd;
pub use network::{Network, NetworkTuning};
pub use server::Server;
pub use service::{Service, ServiceBuilder};

// Determinism exports
pub use rng::{rng_seed, set_rng_seed};
