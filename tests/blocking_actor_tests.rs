//! Integration tests for blocking actors: synchronous receive, the stash
//! discipline, synchronous requests, and kill handling.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use hive_rt::prelude::*;

fn local_system() -> ActorSystem {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    ActorSystem::new(config).unwrap()
}

// ============================================================================
// Synchronous receive loop
// ============================================================================

struct Doubler;

impl BlockingActor for Doubler {
    fn act(&mut self, ctx: &mut BlockingContext<Self>) -> Result<(), Error> {
        loop {
            ctx.receive(
                self,
                Behavior::new()
                    .on(|_state: &mut Doubler, _ctx, (n,): (i64,)| payload!(n * 2))
                    .on(|_state: &mut Doubler, ctx, (_stop,): (String,)| {
                        ctx.quit_normal();
                    }),
            )?;
        }
    }

    fn name(&self) -> &'static str {
        "test.doubler"
    }
}

#[test]
fn test_blocking_actor_answers_requests() {
    let system = local_system();
    let doubler = system.spawn_blocking(Doubler).unwrap();

    let mut scoped = system.scoped();
    for n in 1..20i64 {
        let reply = scoped
            .request(&doubler, payload!(n), Duration::from_secs(1))
            .unwrap();
        assert_eq!(reply.get::<i64>(0), Some(&(n * 2)));
    }

    scoped.send(&doubler, payload!("stop".to_string()));
    let deadline = Instant::now() + Duration::from_secs(2);
    while !doubler.is_terminated() {
        assert!(Instant::now() < deadline, "doubler never stopped");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(doubler.exit_reason(), Some(ExitReason::Normal));

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Stash discipline in blocking receive
// ============================================================================

struct TwoPhase;

impl BlockingActor for TwoPhase {
    fn act(&mut self, ctx: &mut BlockingContext<Self>) -> Result<(), Error> {
        // Phase one: wait for the integer trigger, stashing strings.
        ctx.receive(
            self,
            Behavior::new().on(|_state: &mut TwoPhase, _ctx, (_go,): (i64,)| ()),
        )?;
        // Phase two: the stashed strings replay in order.
        let mut collected = Vec::new();
        for _ in 0..2 {
            let element = ctx.receive_raw(Duration::from_secs(1))?;
            collected.push(element.payload.get::<String>(0).unwrap().clone());
        }
        // Report back to whoever asks.
        ctx.receive(
            self,
            Behavior::new().on(move |_state: &mut TwoPhase, _ctx, (_q,): (bool,)| {
                payload!(collected.join(","))
            }),
        )?;
        Ok(())
    }
}

#[test]
fn test_blocking_stash_replays_in_order() {
    let system = local_system();
    let actor = system.spawn_blocking(TwoPhase).unwrap();

    let mut scoped = system.scoped();
    scoped.send(&actor, payload!("x".to_string()));
    scoped.send(&actor, payload!("y".to_string()));
    scoped.send(&actor, payload!(1i64));
    let reply = scoped
        .request(&actor, payload!(true), Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.get::<String>(0).map(String::as_str), Some("x,y"));

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Synchronous request out of a blocking actor
// ============================================================================

struct Adder;

impl Actor for Adder {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|_state: &mut Adder, _ctx, (n,): (i64,)| payload!(n + 1))
    }
}

struct Relay {
    target: ActorRef,
}

impl BlockingActor for Relay {
    fn act(&mut self, ctx: &mut BlockingContext<Self>) -> Result<(), Error> {
        // Forward one request synchronously, then report the answer.
        let target = self.target.clone();
        let reply = ctx.request(&target, payload!(41i64), Duration::from_secs(1))?;
        let value = *reply.get::<i64>(0).unwrap_or(&0);
        ctx.receive(
            self,
            Behavior::new().on(move |_state: &mut Relay, _ctx, (_q,): (bool,)| payload!(value)),
        )?;
        Ok(())
    }
}

#[test]
fn test_blocking_request_roundtrip() {
    let system = local_system();
    let adder = system.spawn(Adder);
    let relay = system.spawn_blocking(Relay { target: adder }).unwrap();

    let mut scoped = system.scoped();
    let reply = scoped
        .request(&relay, payload!(true), Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.get::<i64>(0), Some(&42));

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Kill handling
// ============================================================================

struct Sleeper;

impl BlockingActor for Sleeper {
    fn act(&mut self, ctx: &mut BlockingContext<Self>) -> Result<(), Error> {
        loop {
            ctx.receive(
                self,
                Behavior::new().on(|_state: &mut Sleeper, _ctx, (_n,): (i64,)| ()),
            )?;
        }
    }
}

#[test]
fn test_kill_unwinds_a_parked_blocking_actor() {
    let system = local_system();
    let sleeper = system.spawn_blocking(Sleeper).unwrap();

    let mut scoped = system.scoped();
    scoped.monitor(&sleeper);
    sleeper.anon_send(payload!(ExitMsg {
        source: ActorAddr::default(),
        reason: ExitReason::Kill,
    }));

    let element = scoped.receive_raw(Duration::from_secs(2)).unwrap();
    let down = element.payload.get::<DownMsg>(0).unwrap();
    assert_eq!(down.source, sleeper.addr());
    assert_eq!(down.reason, ExitReason::Kill);

    drop(scoped);
    system.shutdown();
}

// ============================================================================
// Blocking receive deadline
// ============================================================================

struct Waiter;

impl BlockingActor for Waiter {
    fn act(&mut self, ctx: &mut BlockingContext<Self>) -> Result<(), Error> {
        let got_message = ctx.receive_for(
            self,
            Behavior::new().on(|_state: &mut Waiter, _ctx, (_n,): (i64,)| ()),
            Duration::from_millis(50),
        )?;
        // Nobody sends anything: the deadline elapses.
        assert!(!got_message);
        Ok(())
    }
}

#[test]
fn test_receive_for_times_out() {
    let system = local_system();
    let waiter = system.spawn_blocking(Waiter).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while !waiter.is_terminated() {
        assert!(Instant::now() < deadline, "waiter never finished");
        std::thread::sleep(Duration::from_millis(5));
    }
    system.shutdown();
}
