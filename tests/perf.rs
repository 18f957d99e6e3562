#![cfg(feature = "memory-store")]

use futures::executor::block_on;
use rs_rbac::{
    Assignments, Decision, Email, Engine, EngineBuilder, IdentityStore, MemoryStore, NewPrincipal,
    NoopSink, Principal, ProfileUpdate, RoleRegistry, TokenService,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

const REPEATS: usize = 5;

fn report(name: &str, samples: &mut [Duration], ops: usize, detail: &str) {
    samples.sort_unstable();
    let median = samples[REPEATS / 2].as_secs_f64();
    println!(
        "{name}: median={:.3} ms, ns/op={:.1}, ops/s={:.0} ({detail}, repeats={REPEATS})",
        median * 1_000.0,
        median * 1_000_000_000.0 / ops as f64,
        ops as f64 / median,
    );
}

fn benchmark_sync<F>(name: &str, iterations: usize, mut op: F)
where
    F: FnMut(),
{
    let mut samples: Vec<Duration> = (0..REPEATS)
        .map(|_| {
            let start = Instant::now();
            (0..iterations).for_each(|_| op());
            start.elapsed()
        })
        .collect();
    report(name, &mut samples, iterations, &format!("iters={iterations}"));
}

fn benchmark_parallel<F>(name: &str, threads: usize, iterations_per_thread: usize, op_factory: F)
where
    F: Fn() -> Box<dyn FnMut() + Send> + Send + Sync + 'static,
{
    let op_factory = Arc::new(op_factory);
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                let factory = Arc::clone(&op_factory);
                std::thread::spawn(move || {
                    let mut op = factory();
                    (0..iterations_per_thread).for_each(|_| op());
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        samples.push(start.elapsed());
    }

    let total_ops = threads * iterations_per_thread;
    report(
        name,
        &mut samples,
        total_ops,
        &format!("threads={threads}, total_ops={total_ops}"),
    );
}

fn setup_store(role_count: usize) -> (MemoryStore, Principal) {
    let store = MemoryStore::new();
    let roles = RoleRegistry::new(store.clone()).with_events(Arc::new(NoopSink));
    let assignments = Assignments::new(store.clone()).with_events(Arc::new(NoopSink));
    let principal = block_on(store.insert_principal(NewPrincipal {
        email: Email::new("perf@example.com").unwrap(),
        password_hash: None,
        is_privileged: false,
        profile: ProfileUpdate::default(),
    }))
    .unwrap();

    for i in 0..role_count {
        let role = block_on(roles.create_role(&format!("role_{i}"), "")).unwrap();
        block_on(roles.grant_permission_by_names(role.id, &format!("invoice_{i}"), "read"))
            .unwrap();
        block_on(assignments.assign_role(principal.id, role.id)).unwrap();
    }

    (store, principal)
}

fn build_engine(store: MemoryStore) -> Engine<MemoryStore> {
    EngineBuilder::new(store).events(Arc::new(NoopSink)).build()
}

#[test]
#[ignore = "manual performance test; run with --ignored --nocapture"]
fn perf_authorize_and_resolve() {
    let iterations = 200_000;

    let (store, principal) = setup_store(1);
    let engine = build_engine(store.clone());
    let warm = block_on(engine.authorize(Some(&principal), "invoice_0", "read")).unwrap();
    assert_eq!(warm, Decision::Allow);
    benchmark_sync("authorize_single_role", iterations, || {
        let result = block_on(engine.authorize(Some(&principal), "invoice_0", "read")).unwrap();
        black_box(result);
    });
    benchmark_sync("authorize_unknown_permission", iterations, || {
        let result = block_on(engine.authorize(Some(&principal), "missing", "read")).unwrap();
        black_box(result);
    });

    let (store, principal) = setup_store(64);
    let engine = build_engine(store.clone());
    benchmark_sync("authorize_fanout64_last_role", iterations / 4, || {
        let result = block_on(engine.authorize(Some(&principal), "invoice_63", "read")).unwrap();
        black_box(result);
    });

    let tokens = TokenService::new(store.clone()).with_events(Arc::new(NoopSink));
    let token = block_on(tokens.issue(&principal, 24)).unwrap();
    benchmark_sync("token_resolve", iterations, || {
        let result = block_on(tokens.resolve(token.value.as_str())).unwrap();
        black_box(result);
    });
    benchmark_sync("token_issue", iterations / 10, || {
        let result = block_on(tokens.issue(&principal, 24)).unwrap();
        black_box(result);
    });

    let threads = std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4);
    let iterations_per_thread = 50_000;

    let (store, principal) = setup_store(8);
    let engine = Arc::new(build_engine(store));
    benchmark_parallel(
        "authorize_fanout8_parallel",
        threads,
        iterations_per_thread,
        move || {
            let engine = Arc::clone(&engine);
            let principal = principal.clone();
            Box::new(move || {
                let result =
                    block_on(engine.authorize(Some(&principal), "invoice_7", "read")).unwrap();
                black_box(result);
            })
        },
    );
}
