//! End-to-end request/reply behavior on a healthy network.

mod common;

use common::{JunkArgs, JunkReply, JunkServer, junk_server, junk_service};
use simrpc::{Network, Server};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_call_reaches_handler_and_returns_reply() {
    let net = Network::new();
    let end = net.make_end("end1-99");
    net.add_server("server99", junk_server());
    net.connect("end1-99", "server99");
    net.enable("end1-99", true);

    let mut reply = String::new();
    assert!(end.call("JunkServer.handler2", &111i64, &mut reply).await);
    assert_eq!(reply, "handler2-111");

    let mut parsed = 0i64;
    assert!(
        end.call("JunkServer.parse", &"9090".to_string(), &mut parsed)
            .await
    );
    assert_eq!(parsed, 9090);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_both_handler_shapes_see_the_same_value() {
    let net = Network::new();
    let end = net.make_end("end1-99");
    net.add_server("server99", junk_server());
    net.connect("end1-99", "server99");
    net.enable("end1-99", true);

    let args = JunkArgs { x: 1 };

    let mut reply = JunkReply::default();
    assert!(end.call("JunkServer.by_ref", &args, &mut reply).await);
    assert_eq!(reply.x, "pointer");

    let mut reply = JunkReply::default();
    assert!(end.call("JunkServer.by_value", &args, &mut reply).await);
    assert_eq!(reply.x, "no pointer");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disabled_endpoint_fails_and_leaves_slot_untouched() {
    let net = Network::new();
    let end = net.make_end("end1-99");
    net.add_server("server99", junk_server());
    net.connect("end1-99", "server99");
    // Never enabled.

    let mut reply = "sentinel".to_string();
    assert!(!end.call("JunkServer.handler2", &7i64, &mut reply).await);
    assert_eq!(reply, "sentinel");

    net.enable("end1-99", true);
    assert!(end.call("JunkServer.handler2", &7i64, &mut reply).await);
    assert_eq!(reply, "handler2-7");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_counter_tracks_sequential_calls() {
    let net = Network::new();
    let end = net.make_end("end1-99");
    net.add_server("server99", junk_server());
    net.connect("end1-99", "server99");
    net.enable("end1-99", true);

    for i in 0..17i64 {
        let mut reply = String::new();
        assert!(end.call("JunkServer.handler2", &i, &mut reply).await);
        assert_eq!(reply, format!("handler2-{}", i));
    }

    assert_eq!(net.dispatch_count("server99"), 17);
    assert_eq!(net.total_rpc_count(), 17);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_endpoints_all_get_correct_replies() {
    let net = Network::new();
    net.add_server("server99", junk_server());

    let mut tasks = JoinSet::new();
    for client in 0..20u64 {
        let end_name = format!("end-{}", client);
        let end = net.make_end(end_name.clone());
        net.connect(end_name.clone(), "server99");
        net.enable(end_name, true);

        tasks.spawn(async move {
            for call in 0..10i64 {
                let args = client as i64 * 100 + call;
                let mut reply = String::new();
                assert!(end.call("JunkServer.handler2", &args, &mut reply).await);
                assert_eq!(reply, format!("handler2-{}", args));
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("caller task");
    }

    assert_eq!(net.dispatch_count("server99"), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rebooted_server_starts_with_fresh_state() {
    let net = Network::new();
    let end = net.make_end("end1-99");
    net.add_server("server99", junk_server());
    net.connect("end1-99", "server99");
    net.enable("end1-99", true);

    let mut reply = String::new();
    assert!(end.call("JunkServer.handler2", &1i64, &mut reply).await);
    assert_eq!(net.dispatch_count("server99"), 1);

    // Reboot: a fresh instance takes over the name.
    net.add_server("server99", junk_server());
    assert_eq!(net.dispatch_count("server99"), 0);

    assert!(end.call("JunkServer.handler2", &2i64, &mut reply).await);
    assert_eq!(reply, "handler2-2");
    assert_eq!(net.dispatch_count("server99"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_services_share_one_server() {
    struct Greeter;

    let net = Network::new();
    let end = net.make_end("end1-99");

    let server = Server::new();
    server.add_service(junk_service(JunkServer::default()));
    server.add_service(
        simrpc::ServiceBuilder::new(Greeter)
            .method("hello", |_g: &Greeter, name: String, reply: &mut String| {
                *reply = format!("hello, {}", name);
            })
            .build(),
    );
    net.add_server("server99", server);
    net.connect("end1-99", "server99");
    net.enable("end1-99", true);

    let mut reply = String::new();
    assert!(
        end.call("Greeter.hello", &"raft".to_string(), &mut reply)
            .await
    );
    assert_eq!(reply, "hello, raft");
    assert!(end.call("JunkServer.handler2", &3i64, &mut reply).await);
    assert_eq!(reply, "handler2-3");
    assert_eq!(net.dispatch_count("server99"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[should_panic(expected = "reply channel closed")]
async fn test_unknown_method_is_fatal() {
    let net = Network::new();
    let end = net.make_end("end1-99");
    net.add_server("server99", junk_server());
    net.connect("end1-99", "server99");
    net.enable("end1-99", true);

    let mut reply = String::new();
    end.call("JunkServer.no_such_method", &1i64, &mut reply)
        .await;
}
