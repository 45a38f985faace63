//! Throughput benchmarks
//!
//! - Demand stream delivery: items/sec through the synchronous trampoline
//! - Bus publish: single-entity and two-entity (footprint) commands/sec
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use demandbus_core::{
    CommandHandler, Demand, DemandStream, Effect, Routed, RoutingKey, SmallVec, Subscriber,
    smallvec,
};
use demandbus_runtime::KeyedBus;

struct Counter {
    seen: u64,
}

impl Subscriber<u64> for Counter {
    fn on_subscribe(&mut self, demand: &mut Demand) {
        demand.request(1);
    }

    fn on_next(&mut self, item: u64, demand: &mut Demand) {
        self.seen = self.seen.wrapping_add(item);
        demand.request(1);
    }

    fn on_complete(&mut self) {}
}

#[derive(Clone, Debug)]
enum BenchCommand {
    Bump(RoutingKey),
    Move(RoutingKey, RoutingKey),
}

impl Routed for BenchCommand {
    fn routing_key(&self) -> &RoutingKey {
        match self {
            Self::Bump(key) | Self::Move(key, _) => key,
        }
    }

    fn footprint(&self) -> SmallVec<[RoutingKey; 2]> {
        match self {
            Self::Bump(key) => smallvec![key.clone()],
            Self::Move(from, to) => smallvec![from.clone(), to.clone()],
        }
    }
}

struct BenchHandler;

impl CommandHandler for BenchHandler {
    type State = u64;
    type Command = BenchCommand;
    type Report = ();

    fn handle(&self, state: &mut u64, command: BenchCommand) -> SmallVec<[Effect<BenchCommand, ()>; 4]> {
        *state += 1;
        match command {
            BenchCommand::Bump(_) => smallvec![Effect::None],
            BenchCommand::Move(_, to) => smallvec![Effect::Publish(BenchCommand::Bump(to))],
        }
    }
}

/// Benchmark one-at-a-time demand against a large backlog
fn benchmark_demand_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("demand_stream");
    let size = 10_000_u64;
    group.throughput(Throughput::Elements(size));

    group.bench_function("request_one_per_item", |b| {
        b.iter_batched(
            || DemandStream::new(0..size),
            |stream| {
                let subscription = stream.subscribe(Counter { seen: 0 });
                black_box(subscription.subscriber().seen)
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark bus publish round trips
fn benchmark_bus_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let bus = KeyedBus::new(BenchHandler);
    runtime.block_on(async {
        bus.register("a".into(), 0).await.expect("register a");
        bus.register("b".into(), 0).await.expect("register b");
    });

    group.bench_function("single_entity", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(bus.publish(BenchCommand::Bump("a".into())).await);
        });
    });

    group.bench_function("two_entity_footprint", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(bus.publish(BenchCommand::Move("a".into(), "b".into())).await);
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_demand_stream, benchmark_bus_publish);
criterion_main!(benches);
