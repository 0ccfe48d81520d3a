//! Transient request and reply messages.
//!
//! A request envelope is created by a client end for each call and consumed
//! by the network; the reply comes back on a one-shot channel owned by the
//! caller. The network writes that channel exactly once per request
//! (success, drop, or synthetic timeout), so a caller is always unblocked.

use tokio::sync::oneshot;

use crate::node_id::NodeId;

/// A single in-flight request travelling from a client end to the network.
#[derive(Debug)]
pub(crate) struct RequestEnvelope {
    /// Name of the endpoint that issued the call.
    pub(crate) origin: NodeId,
    /// Fully-qualified `"Service.method"` target.
    pub(crate) method: String,
    /// Encoded argument bytes.
    pub(crate) payload: Vec<u8>,
    /// Where the network delivers the outcome. Consumed on send.
    pub(crate) reply_tx: oneshot::Sender<ReplyEnvelope>,
}

/// The outcome of one request.
#[derive(Debug)]
pub(crate) struct ReplyEnvelope {
    /// Whether the call reached a handler and its reply survived the trip.
    pub(crate) ok: bool,
    /// Encoded reply bytes; empty unless `ok`.
    pub(crate) payload: Vec<u8>,
}

impl ReplyEnvelope {
    /// A delivered reply carrying the handler's encoded output.
    pub(crate) fn success(payload: Vec<u8>) -> Self {
        ReplyEnvelope { ok: true, payload }
    }

    /// A synthetic failure: drop, disconnection, or dead server.
    pub(crate) fn failure() -> Self {
        ReplyEnvelope {
            ok: false,
            payload: Vec::new(),
        }
    }
}
