//! Integration tests for local messaging: request/response correlation,
//! timeouts, stash discipline, linking, and monitoring.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use hive_rt::prelude::*;

fn local_system() -> ActorSystem {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    ActorSystem::new(config).unwrap()
}

// ============================================================================
// Request / response
// ============================================================================

struct Adder;

impl Actor for Adder {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|_state: &mut Adder, _ctx, (n,): (i64,)| payload!(n + 1))
    }

    fn name(&self) -> &'static str {
        "test.adder"
    }
}

#[test]
fn test_local_ping_pong() {
    let system = local_system();
    let adder = system.spawn(Adder);

    let mut scoped = system.scoped();
    let reply = scoped
        .request(&adder, payload!(1i64), Duration::from_secs(1))
        .unwrap();
    assert_eq!(reply.get::<i64>(0), Some(&2));

    drop(scoped);
    system.shutdown();
}

#[test]
fn test_many_requests_correlate() {
    let system = local_system();
    let adder = system.spawn(Adder);

    let mut scoped = system.scoped();
    for n in 0..100i64 {
        let reply = scoped
            .request(&adder, payload!(n), Duration::from_secs(1))
            .unwrap();
        assert_eq!(reply.get::<i64>(0), Some(&(n + 1)));
    }

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Request timeout
// ============================================================================

struct Silent;

impl Actor for Silent {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        // Consumes requests without answering.
        Behavior::new().on(|_state: &mut Silent, _ctx, (_n,): (i64,)| ())
    }
}

#[test]
fn test_request_timeout_is_honored() {
    let system = local_system();
    let silent = system.spawn(Silent);

    let mut scoped = system.scoped();
    let started = Instant::now();
    let err = scoped
        .request(&silent, payload!(1i64), Duration::from_millis(100))
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.code(), ErrorCode::RequestTimeout);
    assert!(elapsed >= Duration::from_millis(100), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "fired late: {elapsed:?}");

    drop(scoped);
    system.shutdown();
}

struct Requester {
    target: ActorRef,
    outcome: Option<Result<(), ErrorCode>>,
}

impl Actor for Requester {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new()
            .on(|state: &mut Requester, ctx, (_go,): (String,)| {
                let target = state.target.clone();
                let rid = ctx.request(&target, payload!(7i64), Some(Duration::from_millis(100)));
                ctx.on_response(rid, |state: &mut Requester, _ctx, result| {
                    state.outcome = Some(result.map(|_| ()).map_err(|err| err.code()));
                });
            })
            .on(|state: &mut Requester, _ctx, (_probe,): (i64,)| {
                let text = match &state.outcome {
                    None => "pending",
                    Some(Ok(())) => "ok",
                    Some(Err(ErrorCode::RequestTimeout)) => "timeout",
                    Some(Err(ErrorCode::RequestReceiverDown)) => "down",
                    Some(Err(_)) => "other",
                };
                payload!(text.to_string())
            })
    }
}

fn poll_outcome(scoped: &mut ScopedActor, requester: &ActorRef) -> String {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let reply = scoped
            .request(requester, payload!(0i64), Duration::from_secs(1))
            .unwrap();
        let text = reply.get::<String>(0).unwrap().clone();
        if text != "pending" || Instant::now() > deadline {
            return text;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_actor_side_request_timeout() {
    let system = local_system();
    let silent = system.spawn(Silent);
    let requester = system.spawn(Requester {
        target: silent,
        outcome: None,
    });

    let mut scoped = system.scoped();
    scoped.send(&requester, payload!("go".to_string()));
    assert_eq!(poll_outcome(&mut scoped, &requester), "timeout");

    drop(scoped);
    system.shutdown();
}

#[test]
fn test_actor_side_response_arrives() {
    let system = local_system();
    let adder = system.spawn(Adder);
    let requester = system.spawn(Requester {
        target: adder,
        outcome: None,
    });

    let mut scoped = system.scoped();
    scoped.send(&requester, payload!("go".to_string()));
    assert_eq!(poll_outcome(&mut scoped, &requester), "ok");

    drop(scoped);
    system.shutdown();
}

#[test]
fn test_request_to_dead_actor_reports_receiver_down() {
    let system = local_system();
    let victim = system.spawn(Adder);

    // Kill and wait for the mailbox to close.
    victim.anon_send(payload!(ExitMsg {
        source: ActorAddr::default(),
        reason: ExitReason::Kill,
    }));
    let deadline = Instant::now() + Duration::from_secs(2);
    while !victim.is_terminated() {
        assert!(Instant::now() < deadline, "victim never terminated");
        std::thread::sleep(Duration::from_millis(5));
    }

    let requester = system.spawn(Requester {
        target: victim,
        outcome: None,
    });
    let mut scoped = system.scoped();
    scoped.send(&requester, payload!("go".to_string()));
    assert_eq!(poll_outcome(&mut scoped, &requester), "down");

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Stash discipline
// ============================================================================

#[derive(Default)]
struct Stasher {
    seen: Vec<String>,
}

fn string_mode() -> Behavior<Stasher> {
    Behavior::new()
        .on(|state: &mut Stasher, _ctx, (text,): (String,)| {
            state.seen.push(text);
        })
        .on(|state: &mut Stasher, _ctx, (_a, _b): (i64, i64)| payload!(state.seen.join(",")))
}

impl Actor for Stasher {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        // Initially only handles the switch command.
        Behavior::new().on(|_state: &mut Stasher, ctx, (_switch,): (i64,)| {
            ctx.replace_behavior(string_mode());
        })
    }

    fn unmatched(&mut self, _ctx: &mut ActorContext<Self>, _payload: &Payload) -> Unmatched {
        Unmatched::Skip
    }
}

#[test]
fn test_stashed_messages_replay_in_order() {
    let system = local_system();
    let stasher = system.spawn(Stasher::default());

    let mut scoped = system.scoped();
    // Neither string matches the initial behavior: both go to the stash.
    scoped.send(&stasher, payload!("x".to_string()));
    scoped.send(&stasher, payload!("y".to_string()));
    // The switch unstashes; x and y must replay before the drain request.
    scoped.send(&stasher, payload!(1i64));
    let reply = scoped
        .request(&stasher, payload!(0i64, 0i64), Duration::from_secs(1))
        .unwrap();
    assert_eq!(reply.get::<String>(0).map(String::as_str), Some("x,y"));

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Unexpected messages
// ============================================================================

#[test]
fn test_unmatched_request_yields_unexpected_message() {
    let system = local_system();
    let adder = system.spawn(Adder);

    let mut scoped = system.scoped();
    let err = scoped
        .request(
            &adder,
            payload!("not a number".to_string()),
            Duration::from_secs(1),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnexpectedMessage);

    drop(scoped);
    system.shutdown();
}

#[test]
fn test_sys_info_request_is_answered_by_the_runtime() {
    let system = local_system();
    let adder = system.spawn(Adder);

    let mut scoped = system.scoped();
    let reply = scoped
        .request(&adder, (SysInfoRequest,), Duration::from_secs(1))
        .unwrap();
    let info = reply.get::<SysInfoReply>(0).unwrap();
    assert_eq!(info.addr, adder.addr());
    assert_eq!(info.name, "test.adder");

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Receive timeout on a behavior
// ============================================================================

struct Impatient;

impl Actor for Impatient {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new()
            .on(|_state: &mut Impatient, _ctx, (_n,): (i64,)| ())
            .with_timeout(Duration::from_millis(50), |_state, ctx| {
                ctx.quit_normal();
            })
    }
}

#[test]
fn test_receive_timeout_fires_when_idle() {
    let system = local_system();
    let actor = system.spawn(Impatient);

    let mut scoped = system.scoped();
    scoped.monitor(&actor);
    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    assert_eq!(down.source, actor.addr());
    assert_eq!(down.reason, ExitReason::Normal);

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Linking and monitoring
// ============================================================================

struct Doomed;

impl Actor for Doomed {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|_state: &mut Doomed, ctx, (_n,): (i64,)| {
            ctx.quit(ExitReason::Abnormal(Error::with_context(
                ErrorCode::RuntimeError,
                "told to fail",
            )));
        })
    }
}

#[test]
fn test_monitor_receives_down_msg() {
    let system = local_system();
    let doomed = system.spawn(Doomed);

    let mut scoped = system.scoped();
    scoped.monitor(&doomed);
    scoped.send(&doomed, payload!(1i64));

    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    assert_eq!(down.source, doomed.addr());
    assert_eq!(
        down.reason.as_error().map(|err| err.code()),
        Some(ErrorCode::RuntimeError)
    );

    drop(scoped);
    system.shutdown();
}

#[test]
fn test_monitoring_a_dead_actor_fires_immediately() {
    let system = local_system();
    let doomed = system.spawn(Doomed);
    doomed.anon_send(payload!(1i64));
    let deadline = Instant::now() + Duration::from_secs(2);
    while !doomed.is_terminated() {
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(5));
    }

    let mut scoped = system.scoped();
    scoped.monitor(&doomed);
    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    assert!(element.payload.get::<DownMsg>(0).is_some());

    drop(scoped);
    system.shutdown();
}

struct Follower {
    observed: ActorRef,
}

impl Actor for Follower {
    fn make_behavior(&mut self, ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        let observed = self.observed.clone();
        ctx.link_to(&observed);
        Behavior::new().on(|_state: &mut Follower, _ctx, (_n,): (i64,)| ())
    }
}

#[test]
fn test_linked_actor_dies_with_its_peer() {
    let system = local_system();
    let doomed = system.spawn(Doomed);
    let follower = system.spawn(Follower {
        observed: doomed.clone(),
    });

    let mut scoped = system.scoped();
    scoped.monitor(&follower);
    scoped.send(&doomed, payload!(1i64));

    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    assert_eq!(down.source, follower.addr());
    assert!(down.reason.as_error().is_some());

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Panic containment
// ============================================================================

struct Panicker;

impl Actor for Panicker {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on::<_, (), _>(|_state: &mut Panicker, _ctx, (_n,): (i64,)| {
            panic!("boom");
        })
    }
}

#[test]
fn test_panic_becomes_exit_reason() {
    let system = local_system();
    let panicker = system.spawn(Panicker);

    let mut scoped = system.scoped();
    scoped.monitor(&panicker);
    scoped.send(&panicker, payload!(1i64));

    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    let err = down.reason.as_error().unwrap();
    assert_eq!(err.code(), ErrorCode::RuntimeError);
    assert!(err.context().unwrap_or("").contains("boom"));

    drop(scoped);
    system.shutdown();
}
