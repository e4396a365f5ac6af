//! # Runtime Integration Tests
//!
//! The runtime, resolver, local shard and liveness tracker wired together
//! the way the server wires them.

use shardgate_core::{
    Account, Assignment, EmbeddedRuntime, Keyed, LivenessTracker, MemoryShard, MetadataResolver,
    NodeAddress, Record, RecordKey, RedbShard, RuntimeState, ShardStorage, ShardgateError,
    StateListener, StreamsRuntime, partition_for,
};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const PARTITIONS: u32 = 8;

fn node(name: &str) -> NodeAddress {
    NodeAddress::new(name, 8080)
}

fn account(id: u64) -> Account {
    Account {
        id,
        owner: format!("owner-{}", id),
        email: format!("{}@example.com", id),
        tier: "gold".to_string(),
    }
}

fn load(storage: &dyn ShardStorage, ids: impl IntoIterator<Item = u64>) {
    for id in ids {
        let acc = account(id);
        let key = acc.record_key();
        let bytes = Record::from_keyed(&acc).expect("encode").to_vec().expect("bytes");
        storage
            .put("accountStore", partition_for(&key, PARTITIONS), &key, &bytes)
            .expect("put");
    }
}

/// Records every transition it is told about.
#[derive(Default)]
struct Recorder(Mutex<Vec<(RuntimeState, RuntimeState)>>);

impl StateListener for Recorder {
    fn on_state_change(&self, previous: RuntimeState, current: RuntimeState) {
        if let Ok(mut seen) = self.0.lock() {
            seen.push((previous, current));
        }
    }
}

// =============================================================================
// LIVENESS
// =============================================================================

#[test]
fn liveness_follows_startup_and_rebalance() {
    let me = node("a");
    let rt = EmbeddedRuntime::new(me.clone(), ["accountStore"], Arc::new(MemoryShard::new()));
    let liveness = LivenessTracker::new();
    rt.register_state_listener(Arc::new(liveness.clone()));

    assert!(!liveness.is_live());
    rt.start(std::slice::from_ref(&me), PARTITIONS).expect("start");
    assert!(liveness.is_live(), "REBALANCING -> RUNNING sets live");

    rt.begin_rebalance().expect("rebalance");
    assert!(!liveness.is_live(), "RUNNING -> REBALANCING clears live");

    rt.complete_rebalance(Assignment::round_robin(PARTITIONS, &[me]).expect("assign"))
        .expect("complete");
    assert!(liveness.is_live());

    rt.shutdown().expect("shutdown");
    assert!(!liveness.is_live());
}

#[test]
fn listener_sees_every_transition_in_order() {
    let me = node("a");
    let rt = EmbeddedRuntime::new(me.clone(), ["accountStore"], Arc::new(MemoryShard::new()));
    let recorder = Arc::new(Recorder::default());
    rt.register_state_listener(recorder.clone());

    rt.start(&[me], PARTITIONS).expect("start");
    rt.shutdown().expect("shutdown");

    let seen = recorder.0.lock().expect("lock").clone();
    assert_eq!(
        seen,
        vec![
            (RuntimeState::Created, RuntimeState::Rebalancing),
            (RuntimeState::Rebalancing, RuntimeState::Running),
            (RuntimeState::Running, RuntimeState::PendingShutdown),
            (RuntimeState::PendingShutdown, RuntimeState::NotRunning),
        ]
    );
}

#[test]
fn registering_again_replaces_listener() {
    let me = node("a");
    let rt = EmbeddedRuntime::new(me.clone(), ["accountStore"], Arc::new(MemoryShard::new()));
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    rt.register_state_listener(first.clone());
    rt.register_state_listener(second.clone());

    rt.start(&[me], PARTITIONS).expect("start");
    assert!(first.0.lock().expect("lock").is_empty());
    assert_eq!(second.0.lock().expect("lock").len(), 2);
}

// =============================================================================
// OWNERSHIP + LOCAL SHARD
// =============================================================================

#[test]
fn two_nodes_split_the_keyspace() {
    let (a, b) = (node("a"), node("b"));
    let storage = Arc::new(MemoryShard::new());
    load(storage.as_ref(), 0..100);

    let rt_a = Arc::new(EmbeddedRuntime::new(a.clone(), ["accountStore"], storage.clone()));
    let rt_b = Arc::new(EmbeddedRuntime::new(b.clone(), ["accountStore"], storage));
    rt_a.start(&[a.clone(), b.clone()], PARTITIONS).expect("start a");
    rt_b.start(&[b.clone(), a.clone()], PARTITIONS).expect("start b");

    let resolver_a = MetadataResolver::new(rt_a.clone(), a, PARTITIONS);
    let store_a = rt_a.local_store("accountStore").expect("store a");
    let store_b = rt_b.local_store("accountStore").expect("store b");

    for id in 0..100u64 {
        let key = RecordKey::from(id);
        let owner = resolver_a.resolve_owner("accountStore", &key).expect("owner");
        let from_a = store_a.get(&key).expect("get a");
        let from_b = store_b.get(&key).expect("get b");
        if resolver_a.is_local(&owner) {
            assert!(from_a.is_some() && from_b.is_none(), "key {} belongs to a", id);
        } else {
            assert!(from_b.is_some() && from_a.is_none(), "key {} belongs to b", id);
        }
    }

    let total = store_a.scan_all().count() + store_b.scan_all().count();
    assert_eq!(total, 100, "local scans partition the dataset");
}

#[test]
fn resolver_fails_during_rebalance_instead_of_guessing() {
    let me = node("a");
    let rt = Arc::new(EmbeddedRuntime::new(
        me.clone(),
        ["accountStore"],
        Arc::new(MemoryShard::new()),
    ));
    let resolver = MetadataResolver::new(rt.clone(), me.clone(), PARTITIONS);

    assert!(matches!(
        resolver.resolve_owner("accountStore", &RecordKey::from(1)),
        Err(ShardgateError::AssignmentUnavailable(_))
    ));

    rt.start(std::slice::from_ref(&me), PARTITIONS).expect("start");
    assert_eq!(
        resolver.resolve_owner("accountStore", &RecordKey::from(1)).expect("owner"),
        me
    );

    rt.begin_rebalance().expect("rebalance");
    assert!(matches!(
        resolver.owners("accountStore"),
        Err(ShardgateError::AssignmentUnavailable(_))
    ));
}

#[test]
fn redb_shard_serves_through_runtime() {
    let dir = tempdir().expect("tempdir");
    let storage = Arc::new(
        RedbShard::open(dir.path().join("shard.redb"), &["accountStore"]).expect("open"),
    );
    load(storage.as_ref(), [42]);

    let me = node("a");
    let rt = EmbeddedRuntime::new(me.clone(), ["accountStore"], storage);
    rt.start(&[me], PARTITIONS).expect("start");

    let store = rt.local_store("accountStore").expect("store");
    let record = store.get(&RecordKey::from(42)).expect("get").expect("present");
    assert_eq!(record.decode::<Account>().expect("decode"), account(42));
    assert!(store.get(&RecordKey::from(99)).expect("get").is_none());
}
