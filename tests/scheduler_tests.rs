//! Integration tests for the work-stealing scheduler: bounded throughput,
//! fairness between actors, and detached/blocking execution paths.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hive_rt::prelude::*;

struct Counter {
    hits: Arc<AtomicUsize>,
}

impl Actor for Counter {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|state: &mut Counter, _ctx, (_n,): (i64,)| {
            state.hits.fetch_add(1, Ordering::Relaxed);
        })
    }
}

fn await_count(counter: &Arc<AtomicUsize>, expected: usize, deadline: Duration) {
    let until = Instant::now() + deadline;
    while counter.load(Ordering::Relaxed) < expected {
        assert!(
            Instant::now() < until,
            "only {} of {expected} messages arrived",
            counter.load(Ordering::Relaxed)
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Throughput fairness
// ============================================================================

#[test]
fn test_no_message_lost_under_bounded_throughput() {
    // One worker with a 100-message budget: draining 10_000 messages
    // requires at least 100 re-enqueues.
    let config = SystemConfig::new()
        .set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled")
        .set(keys::SCHEDULER_MAX_THREADS, 1usize)
        .set(keys::SCHEDULER_MAX_THROUGHPUT, 100usize);
    let system = ActorSystem::new(config).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = system.spawn(Counter {
        hits: Arc::clone(&hits),
    });
    for n in 0..10_000i64 {
        counter.anon_send(payload!(n));
    }
    await_count(&hits, 10_000, Duration::from_secs(10));
    assert_eq!(hits.load(Ordering::Relaxed), 10_000);

    system.shutdown();
}

#[test]
fn test_actors_share_a_single_worker_fairly() {
    // Two flooded actors on one worker: neither may starve the other,
    // because each yields after its budget.
    let config = SystemConfig::new()
        .set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled")
        .set(keys::SCHEDULER_MAX_THREADS, 1usize)
        .set(keys::SCHEDULER_MAX_THROUGHPUT, 50usize);
    let system = ActorSystem::new(config).unwrap();

    let hits_a = Arc::new(AtomicUsize::new(0));
    let hits_b = Arc::new(AtomicUsize::new(0));
    let a = system.spawn(Counter {
        hits: Arc::clone(&hits_a),
    });
    let b = system.spawn(Counter {
        hits: Arc::clone(&hits_b),
    });

    for n in 0..2_000i64 {
        a.anon_send(payload!(n));
        b.anon_send(payload!(n));
    }
    await_count(&hits_a, 2_000, Duration::from_secs(10));
    await_count(&hits_b, 2_000, Duration::from_secs(10));

    system.shutdown();
}

#[test]
fn test_work_spreads_across_many_actors() {
    let config = SystemConfig::new()
        .set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled")
        .set(keys::SCHEDULER_MAX_THREADS, 4usize);
    let system = ActorSystem::new(config).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let actors: Vec<ActorRef> = (0..32)
        .map(|_| {
            system.spawn(Counter {
                hits: Arc::clone(&hits),
            })
        })
        .collect();
    for round in 0..100i64 {
        for actor in &actors {
            actor.anon_send(payload!(round));
        }
    }
    await_count(&hits, 32 * 100, Duration::from_secs(10));

    system.shutdown();
}

// ============================================================================
// Detached actors
// ============================================================================

#[test]
fn test_detached_actor_runs_on_private_thread() {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    let system = ActorSystem::new(config).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let detached = system
        .spawn_opts(
            Counter {
                hits: Arc::clone(&hits),
            },
            SpawnOptions::new().detached(),
        )
        .unwrap();
    for n in 0..500i64 {
        detached.anon_send(payload!(n));
    }
    await_count(&hits, 500, Duration::from_secs(5));

    system.shutdown();
}

#[test]
fn test_lazy_actor_initializes_on_first_message() {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    let system = ActorSystem::new(config).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let lazy = system
        .spawn_opts(
            Counter {
                hits: Arc::clone(&hits),
            },
            SpawnOptions::new().lazy(),
        )
        .unwrap();
    // Nothing happens until the first send.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::Relaxed), 0);

    lazy.anon_send(payload!(1i64));
    await_count(&hits, 1, Duration::from_secs(2));

    system.shutdown();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_terminates_idle_actors() {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    let system = ActorSystem::new(config).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..8 {
        system.spawn(Counter {
            hits: Arc::clone(&hits),
        });
    }
    assert_eq!(system.running_actors(), 8);
    system.shutdown();
    assert_eq!(system.running_actors(), 0);
}
