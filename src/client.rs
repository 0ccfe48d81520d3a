//! Client ends: named handles that issue calls into the fabric.
//!
//! A [`ClientEnd`] is one end of a logical connection. It holds no state
//! beyond its name, a clone of the network's ingress channel and a codec;
//! clones are interchangeable and calls from any number of tasks race
//! freely. Whether a call reaches anything is decided entirely by the
//! network's tables and fault policy at the moment the request is processed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};

use crate::codec::{JsonCodec, MessageCodec};
use crate::envelope::{ReplyEnvelope, RequestEnvelope};
use crate::node_id::NodeId;

/// A named client handle attached to a [`Network`](crate::Network).
///
/// Created by [`Network::make_end`](crate::Network::make_end). Starts
/// disabled and unconnected; wire it up with
/// [`Network::connect`](crate::Network::connect) and
/// [`Network::enable`](crate::Network::enable).
pub struct ClientEnd<C: MessageCodec = JsonCodec> {
    name: NodeId,
    ingress: mpsc::UnboundedSender<RequestEnvelope>,
    codec: C,
}

impl<C: MessageCodec> Clone for ClientEnd<C> {
    fn clone(&self) -> Self {
        ClientEnd {
            name: self.name.clone(),
            ingress: self.ingress.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<C: MessageCodec> ClientEnd<C> {
    pub(crate) fn new(
        name: NodeId,
        ingress: mpsc::UnboundedSender<RequestEnvelope>,
        codec: C,
    ) -> Self {
        ClientEnd {
            name,
            ingress,
            codec,
        }
    }

    /// The endpoint name this handle was registered under.
    pub fn name(&self) -> &NodeId {
        &self.name
    }

    /// Send one RPC and wait for its outcome.
    ///
    /// `method` is `"Service.method"`. On success the decoded reply is
    /// written into `reply_slot` and `true` is returned. On any simulated
    /// failure (endpoint disabled or unconnected, server dead or replaced
    /// mid-call, request or reply dropped) `false` is returned and
    /// `reply_slot` is left exactly as the caller set it.
    ///
    /// There is no timeout here: the network guarantees every request is
    /// eventually answered, even if only with a synthetic failure.
    ///
    /// # Panics
    ///
    /// Panics if the arguments fail to encode, if a successful reply fails
    /// to decode as `R`, or if the reply channel is closed without an
    /// answer (a handler panicked). All three are harness bugs.
    pub async fn call<A, R>(&self, method: &str, args: &A, reply_slot: &mut R) -> bool
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let payload = match self.codec.encode(args) {
            Ok(payload) => payload,
            Err(e) => panic!("call {}: failed to encode arguments: {}", method, e),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = RequestEnvelope {
            origin: self.name.clone(),
            method: method.to_string(),
            payload,
            reply_tx,
        };

        if self.ingress.send(envelope).is_err() {
            // The network (and its ingress consumer) is gone; indistinguishable
            // from an unreachable peer as far as the caller cares.
            tracing::debug!("call {} from {}: network is shut down", method, self.name);
            return false;
        }

        match reply_rx.await {
            Ok(ReplyEnvelope { ok: true, payload }) => {
                match self.codec.decode(&payload) {
                    Ok(reply) => *reply_slot = reply,
                    Err(e) => panic!("call {}: failed to decode reply: {}", method, e),
                }
                true
            }
            Ok(ReplyEnvelope { ok: false, .. }) => {
                tracing::trace!("call {} from {} failed", method, self.name);
                false
            }
            Err(_) => panic!(
                "call {}: reply channel closed before a reply was delivered",
                method
            ),
        }
    }
}

impl<C: MessageCodec> std::fmt::Debug for ClientEnd<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEnd").field("name", &self.name).finish()
    }
}
