use std::sync::Arc;

use agent_adapters::{default_registry, MISSING_TRANSFER};
use agent_core::{CaseRegistry, FlowMachine, FlowMode, Metadata, StaticCaseRegistry, StepStatus};
use agent_persistence::{FileKeyValueStore, FlowSnapshot, InMemoryKeyValueStore, KeyValueStore, PersistenceError,
                        SnapshotStore, SCHEMA_VERSION};

fn progressed_flow(registry: &StaticCaseRegistry) -> agent_core::Flow {
    let mut m = FlowMachine::from_registry(registry, MISSING_TRANSFER, FlowMode::Autoplay).unwrap();
    m.start(0).unwrap();
    m.resolve_automatic(0).unwrap();
    m.start(1).unwrap();
    m.pause(1, Metadata::new()).unwrap();
    m.into_flow()
}

#[test]
fn file_store_round_trip_restores_flow() {
    let dir = tempfile::tempdir().unwrap();
    let registry = default_registry().unwrap();
    let flow = progressed_flow(&registry);

    let snapshots = SnapshotStore::new(Arc::new(FileKeyValueStore::new(dir.path())), "agent_flow_v1");
    snapshots.save(&flow).unwrap();
    assert!(dir.path().join("agent_flow_v1.json").exists());
    assert!(!dir.path().join("agent_flow_v1.json.tmp").exists());

    let restored = snapshots.load(&registry).unwrap().expect("snapshot present");
    assert_eq!(restored, flow);
    assert_eq!(restored.current_index(), Some(1));
    assert_eq!(restored.steps[1].status, StepStatus::Paused);
    assert_eq!(restored.mode, FlowMode::Autoplay);
}

#[test]
fn missing_snapshot_is_none() {
    let registry = default_registry().unwrap();
    let snapshots = SnapshotStore::new(Arc::new(InMemoryKeyValueStore::new()), "empty");
    assert!(snapshots.load(&registry).unwrap().is_none());
}

#[test]
fn garbage_and_tampering_are_corrupt() {
    let registry = default_registry().unwrap();
    let store = Arc::new(InMemoryKeyValueStore::new());
    let snapshots = SnapshotStore::new(store.clone(), "s");

    store.set("s", "{not json").unwrap();
    assert!(snapshots.load(&registry).unwrap_err().is_corrupt());

    let flow = progressed_flow(&registry);
    let mut value = serde_json::to_value(FlowSnapshot::capture(&flow).unwrap()).unwrap();
    value["flow"]["steps"][0]["status"] = "planned".into();
    store.set("s", &value.to_string()).unwrap();
    match snapshots.load(&registry) {
        Err(PersistenceError::Corrupt(msg)) => assert!(msg.contains("checksum"), "{msg}"),
        other => panic!("expected corrupt, got {other:?}"),
    }

    let mut future = serde_json::to_value(FlowSnapshot::capture(&flow).unwrap()).unwrap();
    future["schema_version"] = (SCHEMA_VERSION + 1).into();
    store.set("s", &future.to_string()).unwrap();
    assert!(snapshots.load(&registry).unwrap_err().is_corrupt());
}

#[test]
fn invariant_violation_with_valid_checksum_is_corrupt() {
    let registry = default_registry().unwrap();
    let mut flow = progressed_flow(&registry);
    // two active steps, consistently checksummed
    flow.steps[2].status = StepStatus::Working;
    let store = Arc::new(InMemoryKeyValueStore::new());
    let snapshots = SnapshotStore::new(store, "s");
    snapshots.save(&flow).unwrap();
    assert!(snapshots.load(&registry).unwrap_err().is_corrupt());
}

#[test]
fn definition_drift_is_corrupt() {
    let registry = default_registry().unwrap();
    let mut flow = progressed_flow(&registry);
    flow.definition_hash = "stale".into();
    let snapshots = SnapshotStore::new(Arc::new(InMemoryKeyValueStore::new()), "s");
    snapshots.save(&flow).unwrap();
    assert!(snapshots.load(&registry).unwrap_err().is_corrupt());

    let empty = StaticCaseRegistry::new();
    assert!(empty.definition(MISSING_TRANSFER).is_none());
    let good = progressed_flow(&registry);
    snapshots.save(&good).unwrap();
    assert!(snapshots.load(&empty).unwrap_err().is_corrupt());
    snapshots.clear().unwrap();
    assert!(snapshots.load(&registry).unwrap().is_none());
}
