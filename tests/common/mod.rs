//! Shared fixture: a junk server with a handful of handler shapes.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simrpc::{Server, Service, ServiceBuilder};

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct JunkArgs {
    pub x: i64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct JunkReply {
    pub x: String,
}

/// Receiver shared by all junk handlers; the logs let tests observe which
/// handlers actually ran.
#[derive(Default)]
pub struct JunkServer {
    pub log1: Mutex<Vec<String>>,
    pub log2: Mutex<Vec<i64>>,
}

/// How long `slow_echo` blocks before writing its reply.
pub const SLOW_HANDLER_DELAY: Duration = Duration::from_millis(600);

/// Build the junk service around `receiver`.
///
/// The service is named after the receiver type, so calls dial
/// `"JunkServer.…"`.
pub fn junk_service(receiver: JunkServer) -> Service {
    ServiceBuilder::new(receiver)
        .method(
            "parse",
            |recv: &JunkServer, args: String, reply: &mut i64| {
                recv.log1.lock().expect("log1").push(args.clone());
                *reply = args.parse().unwrap_or(0);
            },
        )
        .method(
            "handler2",
            |recv: &JunkServer, args: i64, reply: &mut String| {
                recv.log2.lock().expect("log2").push(args);
                *reply = format!("handler2-{}", args);
            },
        )
        .method(
            "slow_echo",
            |recv: &JunkServer, args: i64, reply: &mut i64| {
                std::thread::sleep(SLOW_HANDLER_DELAY);
                recv.log2.lock().expect("log2").push(args);
                *reply = -args;
            },
        )
        .method(
            "by_ref",
            |_recv: &JunkServer, _args: JunkArgs, reply: &mut JunkReply| {
                reply.x = "pointer".to_string();
            },
        )
        .method(
            "by_value",
            |_recv: &JunkServer, _args: JunkArgs, reply: &mut JunkReply| {
                reply.x = "no pointer".to_string();
            },
        )
        .build()
}

/// A fresh server carrying the junk service.
pub fn junk_server() -> Server {
    let server = Server::new();
    server.add_service(junk_service(JunkServer::default()));
    server
}
