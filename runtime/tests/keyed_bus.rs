//! Integration tests for the keyed command bus
//!
//! A small ledger handler exercises routing, chained publications, footprints
//! and the concurrency guarantees.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use demandbus_core::{
    BusError, CommandBus, CommandHandler, Effect, Notice, Routed, RoutingKey, SmallVec, smallvec,
};
use demandbus_runtime::{BusConfig, KeyedBus};
use demandbus_testing::init_test_tracing;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum LedgerCommand {
    /// Add to one balance
    Credit { key: RoutingKey, amount: i64 },
    /// Debit `from` and credit `to` under both locks
    Move {
        from: RoutingKey,
        to: RoutingKey,
        amount: i64,
    },
    /// Debit `from` and credit `to` as a separate hop
    Hop {
        from: RoutingKey,
        to: RoutingKey,
        amount: i64,
    },
    /// Re-publish itself `remaining` more times
    Echo { key: RoutingKey, remaining: u32 },
    /// Credit every target by one, in order
    Fanout {
        key: RoutingKey,
        targets: Vec<RoutingKey>,
    },
}

impl Routed for LedgerCommand {
    fn routing_key(&self) -> &RoutingKey {
        match self {
            Self::Credit { key, .. } | Self::Echo { key, .. } | Self::Fanout { key, .. } => key,
            Self::Move { from, .. } | Self::Hop { from, .. } => from,
        }
    }

    fn footprint(&self) -> SmallVec<[RoutingKey; 2]> {
        match self {
            Self::Move { from, to, .. } => smallvec![from.clone(), to.clone()],
            Self::Fanout { key, targets } => {
                let mut keys: SmallVec<[RoutingKey; 2]> = smallvec![key.clone()];
                keys.extend(targets.iter().cloned());
                keys
            }
            _ => smallvec![self.routing_key().clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LedgerReport {
    Balance(RoutingKey, i64),
    Insufficient(RoutingKey),
}

struct Ledger;

impl CommandHandler for Ledger {
    type State = i64;
    type Command = LedgerCommand;
    type Report = LedgerReport;

    fn handle(
        &self,
        balance: &mut i64,
        command: LedgerCommand,
    ) -> SmallVec<[Effect<LedgerCommand, LedgerReport>; 4]> {
        match command {
            LedgerCommand::Credit { key, amount } => {
                *balance += amount;
                smallvec![Effect::Report(LedgerReport::Balance(key, *balance))]
            }
            LedgerCommand::Move { from, to, amount } | LedgerCommand::Hop { from, to, amount } => {
                if *balance < amount {
                    return smallvec![Effect::Report(LedgerReport::Insufficient(from))];
                }
                *balance -= amount;
                smallvec![Effect::Publish(LedgerCommand::Credit { key: to, amount })]
            }
            LedgerCommand::Echo { key, remaining } => {
                *balance += 1;
                if remaining == 0 {
                    return smallvec![Effect::None];
                }
                smallvec![Effect::Publish(LedgerCommand::Echo {
                    key,
                    remaining: remaining - 1,
                })]
            }
            LedgerCommand::Fanout { targets, .. } => targets
                .into_iter()
                .map(|key| Effect::Publish(LedgerCommand::Credit { key, amount: 1 }))
                .collect(),
        }
    }
}

fn credit(key: &str, amount: i64) -> LedgerCommand {
    LedgerCommand::Credit {
        key: key.into(),
        amount,
    }
}

async fn ledger(accounts: &[(&str, i64)]) -> KeyedBus<Ledger> {
    init_test_tracing();
    let bus = KeyedBus::new(Ledger);
    for (key, balance) in accounts {
        bus.register((*key).into(), *balance).await.unwrap();
    }
    bus
}

async fn balance(bus: &KeyedBus<Ledger>, key: &str) -> i64 {
    bus.inspect(&key.into(), |b| *b).await.unwrap()
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn commands_reach_exactly_their_entity() {
    let bus = ledger(&[("a", 0), ("b", 0)]).await;

    let delivery = bus.publish(credit("a", 5)).await;
    assert_eq!(delivery.applied, 1);
    assert_eq!(delivery.reports, vec![LedgerReport::Balance("a".into(), 5)]);

    assert_eq!(balance(&bus, "a").await, 5);
    assert_eq!(balance(&bus, "b").await, 0);
}

#[tokio::test]
async fn per_entity_order_follows_publication_order() {
    let bus = ledger(&[("a", 0)]).await;

    let mut seen = Vec::new();
    for amount in 1..=5 {
        let delivery = bus.publish(credit("a", amount)).await;
        seen.extend(delivery.reports);
    }

    let running: Vec<i64> = seen
        .into_iter()
        .map(|r| match r {
            LedgerReport::Balance(_, b) => b,
            other => panic!("unexpected report {other:?}"),
        })
        .collect();
    assert_eq!(running, vec![1, 3, 6, 10, 15]);
}

#[tokio::test]
async fn unregistered_target_is_dropped_silently() {
    let bus = ledger(&[("a", 0)]).await;

    let delivery = bus.publish(credit("ghost", 5)).await;
    assert_eq!(delivery.applied, 0);
    assert_eq!(delivery.dropped, 1);
    assert!(delivery.reports.is_empty());
    assert!(!delivery.is_applied());
}

#[tokio::test]
async fn duplicate_registration_fails_and_keeps_original() {
    let bus = ledger(&[("a", 10)]).await;

    let err = bus.register("a".into(), 99).await.unwrap_err();
    assert_eq!(err, BusError::AlreadyExists("a".into()));
    assert_eq!(balance(&bus, "a").await, 10);
}

#[tokio::test]
async fn entity_lookup_reports_unknown_keys() {
    let bus = ledger(&[("a", 1)]).await;

    assert_eq!(bus.entity(&"a".into()).await.unwrap().key().as_str(), "a");
    assert_eq!(
        bus.entity(&"z".into()).await.unwrap_err(),
        BusError::UnknownKey("z".into())
    );
    assert_eq!(bus.inspect(&"z".into(), |b| *b).await, None);
}

// ============================================================================
// Chained publications
// ============================================================================

#[tokio::test]
async fn chained_publish_lands_before_publish_returns() {
    let bus = ledger(&[("a", 100), ("b", 50)]).await;

    let delivery = bus
        .publish(LedgerCommand::Move {
            from: "a".into(),
            to: "b".into(),
            amount: 30,
        })
        .await;

    assert_eq!(delivery.applied, 2);
    assert_eq!(delivery.reports, vec![LedgerReport::Balance("b".into(), 80)]);
    assert_eq!(balance(&bus, "a").await, 70);
    assert_eq!(balance(&bus, "b").await, 80);
}

#[tokio::test]
async fn domain_failure_is_a_report() {
    let bus = ledger(&[("a", 10), ("b", 0)]).await;

    let delivery = bus
        .publish(LedgerCommand::Move {
            from: "a".into(),
            to: "b".into(),
            amount: 1000,
        })
        .await;

    assert_eq!(delivery.applied, 1);
    assert_eq!(delivery.reports, vec![LedgerReport::Insufficient("a".into())]);
    assert_eq!(balance(&bus, "a").await, 10);
    assert_eq!(balance(&bus, "b").await, 0);
}

#[tokio::test]
async fn unregistered_footprint_key_only_drops_its_follow_up() {
    let bus = ledger(&[("a", 100)]).await;

    let delivery = bus
        .publish(LedgerCommand::Move {
            from: "a".into(),
            to: "ghost".into(),
            amount: 30,
        })
        .await;

    assert_eq!(delivery.applied, 1);
    assert_eq!(delivery.dropped, 1);
    assert_eq!(balance(&bus, "a").await, 70);
    assert!(bus.inspect(&"ghost".into(), |b| *b).await.is_none());
}

#[tokio::test]
async fn unregistered_routing_key_drops_before_applying() {
    let bus = ledger(&[("b", 100)]).await;

    let delivery = bus
        .publish(LedgerCommand::Move {
            from: "ghost".into(),
            to: "b".into(),
            amount: 30,
        })
        .await;

    assert_eq!(delivery.applied, 0);
    assert_eq!(delivery.dropped, 1);
    assert_eq!(balance(&bus, "b").await, 100);
}

#[tokio::test]
async fn follow_up_outside_footprint_is_still_applied() {
    let bus = ledger(&[("a", 100), ("b", 0)]).await;

    let delivery = bus
        .publish(LedgerCommand::Hop {
            from: "a".into(),
            to: "b".into(),
            amount: 40,
        })
        .await;

    assert_eq!(delivery.applied, 2);
    assert_eq!(balance(&bus, "a").await, 60);
    assert_eq!(balance(&bus, "b").await, 40);
}

#[tokio::test]
async fn follow_ups_run_depth_first_in_emission_order() {
    let bus = ledger(&[("hub", 0), ("x", 0), ("y", 0)]).await;

    let delivery = bus
        .publish(LedgerCommand::Fanout {
            key: "hub".into(),
            targets: vec!["y".into(), "x".into()],
        })
        .await;

    assert_eq!(delivery.applied, 3);
    assert_eq!(
        delivery.reports,
        vec![
            LedgerReport::Balance("y".into(), 1),
            LedgerReport::Balance("x".into(), 1),
        ]
    );
}

#[tokio::test]
async fn chains_deeper_than_the_limit_are_cut() {
    init_test_tracing();
    let bus = KeyedBus::with_config(Ledger, BusConfig::default().with_max_chain_depth(4));
    bus.register("echo".into(), 0).await.unwrap();

    let delivery = bus
        .publish(LedgerCommand::Echo {
            key: "echo".into(),
            remaining: 100,
        })
        .await;

    assert_eq!(delivery.applied, 5);
    assert_eq!(delivery.dropped, 1);
    assert_eq!(balance(&bus, "echo").await, 5);
}

// ============================================================================
// Observation
// ============================================================================

#[tokio::test]
async fn observers_receive_tagged_notices() {
    let bus = ledger(&[("a", 100), ("b", 0)]).await;
    let mut notices = bus.observe();

    bus.publish(LedgerCommand::Move {
        from: "a".into(),
        to: "b".into(),
        amount: 25,
    })
    .await;

    let notice = tokio::time::timeout(Duration::from_secs(1), notices.recv())
        .await
        .expect("notice should arrive")
        .unwrap();
    assert_eq!(
        notice,
        Notice {
            key: "b".into(),
            report: LedgerReport::Balance("b".into(), 25),
        }
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_conserve_money_without_deadlock() {
    let bus = ledger(&[("a", 1_000), ("b", 1_000), ("c", 1_000)]).await;

    let routes = [("a", "b"), ("b", "a"), ("c", "a"), ("b", "c")];
    let mut tasks = Vec::new();
    for (from, to) in routes {
        for _ in 0..50 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                bus.publish(LedgerCommand::Move {
                    from: from.into(),
                    to: to.into(),
                    amount: 3,
                })
                .await
            }));
        }
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        for task in tasks {
            task.await.unwrap();
        }
    })
    .await
    .expect("transfers should not deadlock");

    // 50 moves of 3 per route: a gains from b and c, b pays a and c
    assert_eq!(balance(&bus, "a").await, 1_150);
    assert_eq!(balance(&bus, "b").await, 850);
    assert_eq!(balance(&bus, "c").await, 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_a_move_half_applied() {
    let bus = ledger(&[("a", 500), ("b", 500)]).await;
    let pair: Vec<RoutingKey> = vec!["a".into(), "b".into()];

    let mut writers = Vec::new();
    for (from, to) in [("a", "b"), ("b", "a")] {
        let bus = bus.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..200 {
                bus.publish(LedgerCommand::Move {
                    from: from.into(),
                    to: to.into(),
                    amount: 1,
                })
                .await;
                tokio::task::yield_now().await;
            }
        }));
    }

    let reader = {
        let bus = bus.clone();
        tokio::spawn(async move {
            for _ in 0..400 {
                let total = bus
                    .inspect_many(&pair, |states| states.iter().map(|b| **b).sum::<i64>())
                    .await
                    .unwrap();
                assert_eq!(total, 1_000, "observed a move between debit and credit");
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();
    })
    .await
    .expect("reads and moves should not deadlock");

    assert_eq!(balance(&bus, "a").await, 500);
    assert_eq!(balance(&bus, "b").await, 500);
}

#[tokio::test]
async fn inspect_many_follows_key_order() {
    let bus = ledger(&[("a", 1), ("b", 2)]).await;

    let read = bus
        .inspect_many(&["b".into(), "a".into(), "b".into()], |states| {
            states.iter().map(|b| **b).collect::<Vec<_>>()
        })
        .await
        .unwrap();
    assert_eq!(read, vec![2, 1, 2]);

    let missing = bus
        .inspect_many(&["a".into(), "ghost".into()], |states| states.len())
        .await;
    assert_eq!(missing, Err(BusError::UnknownKey("ghost".into())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_credits_to_one_entity_are_serialised() {
    let bus = ledger(&[("a", 0)]).await;

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let bus = bus.clone();
            tokio::spawn(async move { bus.publish(credit("a", 1)).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().applied, 1);
    }

    assert_eq!(balance(&bus, "a").await, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_admits_one() {
    let bus = ledger(&[]).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let bus = bus.clone();
            tokio::spawn(async move { bus.register("same".into(), i).await.is_ok() })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(bus.registry().len().await, 1);
}

// ============================================================================
// Trait object use
// ============================================================================

#[tokio::test]
async fn usable_as_a_command_bus_trait_object() {
    init_test_tracing();
    let bus: Arc<dyn CommandBus<Command = LedgerCommand, State = i64, Report = LedgerReport>> =
        Arc::new(KeyedBus::new(Ledger));

    bus.register("a".into(), 1).await.unwrap();
    assert!(bus.register("a".into(), 2).await.is_err());

    let delivery = bus.publish(credit("a", 1)).await.unwrap();
    assert_eq!(delivery.reports, vec![LedgerReport::Balance("a".into(), 2)]);
}
