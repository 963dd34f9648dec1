//! Integration tests for the distribution layer: publish/connect,
//! remote request/response with message-id correlation, proxy interning,
//! and peer-death propagation through links and monitors.
//!
//! Each test runs two complete runtimes in one process, talking BASP over
//! loopback TCP.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use hive_rt::prelude::*;

fn networked_system() -> ActorSystem {
    let config = SystemConfig::new()
        .set(keys::MIDDLEMAN_HEARTBEAT_INTERVAL, "100ms")
        .set(keys::MIDDLEMAN_CONNECTION_TIMEOUT, "2s");
    ActorSystem::new(config).unwrap()
}

// ============================================================================
// Remote roundtrip
// ============================================================================

struct Ponger;

impl Actor for Ponger {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|_state: &mut Ponger, _ctx, (text,): (String,)| {
            if text == "ping" {
                Some(payload!("pong".to_string()))
            } else {
                Some(payload!("what?".to_string()))
            }
        })
    }

    fn name(&self) -> &'static str {
        "test.ponger"
    }
}

#[test]
fn test_remote_request_roundtrip() {
    let n1 = networked_system();
    let n2 = networked_system();

    let ponger = n1.spawn(Ponger);
    let port = n1
        .middleman()
        .unwrap()
        .publish(&ponger, 0, Some("127.0.0.1"), true)
        .unwrap();

    let remote = n2.middleman().unwrap().remote_actor("127.0.0.1", port).unwrap();
    assert_eq!(remote.addr().node(), n1.node());
    assert_eq!(remote.addr().actor(), ponger.addr().actor());

    let mut scoped = n2.scoped();
    let reply = scoped
        .request(&remote, payload!("ping".to_string()), Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.get::<String>(0).map(String::as_str), Some("pong"));

    drop(scoped);
    n2.shutdown();
    n1.shutdown();
}

#[test]
fn test_remote_sends_preserve_sender_order() {
    let n1 = networked_system();
    let n2 = networked_system();

    #[derive(Default)]
    struct Collector {
        seen: Vec<i64>,
    }

    impl Actor for Collector {
        fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
            Behavior::new()
                .on(|state: &mut Collector, _ctx, (n,): (i64,)| {
                    state.seen.push(n);
                })
                .on(|state: &mut Collector, _ctx, (_q,): (bool,)| {
                    let ordered = state.seen.windows(2).all(|w| w[0] < w[1]);
                    payload!(ordered, state.seen.len() as i64)
                })
        }
    }

    let collector = n1.spawn(Collector::default());
    let port = n1
        .middleman()
        .unwrap()
        .publish(&collector, 0, Some("127.0.0.1"), true)
        .unwrap();
    let remote = n2.middleman().unwrap().remote_actor("127.0.0.1", port).unwrap();

    let mut scoped = n2.scoped();
    for n in 0..200i64 {
        scoped.send(&remote, payload!(n));
    }
    let reply = scoped
        .request(&remote, payload!(true), Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.get::<bool>(0), Some(&true));
    assert_eq!(reply.get::<i64>(1), Some(&200));

    drop(scoped);
    n2.shutdown();
    n1.shutdown();
}

// ============================================================================
// Proxy interning
// ============================================================================

#[test]
fn test_proxies_are_interned_per_address() {
    let n1 = networked_system();
    let n2 = networked_system();

    let ponger = n1.spawn(Ponger);
    let port = n1
        .middleman()
        .unwrap()
        .publish(&ponger, 0, Some("127.0.0.1"), true)
        .unwrap();

    let first = n2.middleman().unwrap().remote_actor("127.0.0.1", port).unwrap();
    let second = n2.middleman().unwrap().remote_actor("127.0.0.1", port).unwrap();
    assert_eq!(first.addr(), second.addr());
    assert_eq!(n2.middleman().unwrap().proxy_count(), 1);

    n2.shutdown();
    n1.shutdown();
}

// ============================================================================
// Remote termination propagation
// ============================================================================

#[test]
fn test_remote_actor_death_kills_the_proxy() {
    let n1 = networked_system();
    let n2 = networked_system();

    let ponger = n1.spawn(Ponger);
    let port = n1
        .middleman()
        .unwrap()
        .publish(&ponger, 0, Some("127.0.0.1"), true)
        .unwrap();
    let remote = n2.middleman().unwrap().remote_actor("127.0.0.1", port).unwrap();

    // A roundtrip guarantees the proxy announcement reached the peer.
    let mut scoped = n2.scoped();
    let _ = scoped
        .request(&remote, payload!("ping".to_string()), Duration::from_secs(2))
        .unwrap();
    scoped.monitor(&remote);

    // Kill the published actor on its home node.
    ponger.anon_send(payload!(ExitMsg {
        source: ActorAddr::default(),
        reason: ExitReason::Kill,
    }));

    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    assert_eq!(down.source, remote.addr());
    assert_eq!(down.reason, ExitReason::Kill);

    drop(scoped);
    n2.shutdown();
    n1.shutdown();
}

struct LinksBack;

impl Actor for LinksBack {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|_state: &mut LinksBack, ctx, (text,): (String,)| {
            if text == "link-me" {
                if let Some(sender) = ctx.sender().cloned() {
                    ctx.link_to(&sender);
                }
            }
            payload!("linked".to_string())
        })
    }
}

#[test]
fn test_peer_death_propagates_through_links() {
    let n1 = networked_system();
    let n2 = networked_system();

    let linker = n1.spawn(LinksBack);
    let port = n1
        .middleman()
        .unwrap()
        .publish(&linker, 0, Some("127.0.0.1"), true)
        .unwrap();

    // Observe the linking actor from its own node.
    let mut observer = n1.scoped();
    observer.monitor(&linker);

    // From the second node: link a scoped actor to the remote.
    let remote = n2.middleman().unwrap().remote_actor("127.0.0.1", port).unwrap();
    let mut scoped = n2.scoped();
    let reply = scoped
        .request(&remote, payload!("link-me".to_string()), Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.get::<String>(0).map(String::as_str), Some("linked"));

    // Tear the second node down while the scoped actor is still alive:
    // the connection closes abruptly, the proxy for the scoped actor dies
    // on node one, and the link delivers the exit. (Dropping the scoped
    // actor first would be a *normal* exit, which links ignore.)
    n2.shutdown();
    drop(scoped);

    let element = observer.receive_raw(Duration::from_secs(4)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    assert_eq!(down.source, linker.addr());
    let err = down.reason.as_error().expect("abnormal exit expected");
    assert!(
        matches!(
            err.code(),
            ErrorCode::SocketDisconnected | ErrorCode::SocketOperationFailed
        ),
        "unexpected reason: {err}"
    );

    drop(observer);
    n1.shutdown();
}

// ============================================================================
// Handshake validation
// ============================================================================

#[test]
fn test_mismatched_app_identifiers_refuse_to_connect() {
    let n1 = networked_system();
    let config = SystemConfig::new()
        .set(keys::MIDDLEMAN_APP_IDENTIFIERS, vec!["other-app".to_string()]);
    let n2 = ActorSystem::new(config).unwrap();

    let ponger = n1.spawn(Ponger);
    let port = n1
        .middleman()
        .unwrap()
        .publish(&ponger, 0, Some("127.0.0.1"), true)
        .unwrap();

    let err = n2
        .middleman()
        .unwrap()
        .remote_actor("127.0.0.1", port)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    n2.shutdown();
    n1.shutdown();
}

#[test]
fn test_connect_reports_peer_node_id() {
    let n1 = networked_system();
    let n2 = networked_system();

    let ponger = n1.spawn(Ponger);
    let port = n1
        .middleman()
        .unwrap()
        .publish(&ponger, 0, Some("127.0.0.1"), true)
        .unwrap();

    let node = n2.middleman().unwrap().connect("127.0.0.1", port).unwrap();
    assert_eq!(node, n1.node());

    n2.shutdown();
    n1.shutdown();
}

// ============================================================================
// Unpublish
// ============================================================================

#[test]
fn test_unpublish_stops_new_connections() {
    let n1 = networked_system();
    let n2 = networked_system();

    let ponger = n1.spawn(Ponger);
    let middleman = n1.middleman().unwrap();
    let port = middleman.publish(&ponger, 0, Some("127.0.0.1"), true).unwrap();
    middleman.unpublish(&ponger, port).unwrap();

    // Give the reactor a moment to drop the listener.
    let deadline = Instant::now() + Duration::from_secs(2);
    let refused = loop {
        match n2.middleman().unwrap().connect("127.0.0.1", port) {
            Err(_) => break true,
            Ok(_) if Instant::now() > deadline => break false,
            Ok(_) => std::thread::sleep(Duration::from_millis(20)),
        }
    };
    assert!(refused, "listener still accepting after unpublish");

    n2.shutdown();
    n1.shutdown();
}
