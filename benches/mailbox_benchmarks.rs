//! Mailbox hot-path benchmarks: enqueue/pop cycles and request/response
//! roundtrips through a live system.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use hive_rt::prelude::*;

struct Echo;

impl Actor for Echo {
    fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
        Behavior::new().on(|_state: &mut Echo, _ctx, (n,): (i64,)| payload!(n))
    }
}

fn bench_anon_send(c: &mut Criterion) {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    let system = ActorSystem::new(config).expect("system");
    let echo = system.spawn(Echo);

    c.bench_function("anon_send", |b| {
        b.iter(|| {
            echo.anon_send(payload!(1i64));
        })
    });

    system.shutdown();
}

fn bench_request_roundtrip(c: &mut Criterion) {
    let config = SystemConfig::new().set(keys::MIDDLEMAN_NETWORK_BACKEND, "disabled");
    let system = ActorSystem::new(config).expect("system");
    let echo = system.spawn(Echo);
    let mut scoped = system.scoped();

    c.bench_function("request_roundtrip", |b| {
        b.iter(|| {
            scoped
                .request(&echo, payload!(1i64), Duration::from_secs(1))
                .expect("reply")
        })
    });

    drop(scoped);
    system.shutdown();
}

criterion_group!(benches, bench_anon_send, bench_request_roundtrip);
criterion_main!(benches);
