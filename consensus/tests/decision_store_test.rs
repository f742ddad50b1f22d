//! File-backed decision store lifecycle.

use jury_consensus::{
    normalize, AgentRoster, ConsensusEngine, ConsensusResult, Criterion, DecisionStats,
    DecisionStore, JsonFileStore, RawSubmission, ScoreVector, StoreError,
};
use tempfile::tempdir;

fn decision(id: &str, score: f64) -> ConsensusResult {
    let engine = ConsensusEngine::new(
        AgentRoster::new("store-v1")
            .with_member("quality", 1.0)
            .with_member("market", 0.85),
    )
    .unwrap();
    let submission = normalize(
        RawSubmission::new(id, "Low Tide", "A marine biologist maps a vanishing reef.")
            .genre("Documentary")
            .runtime(84.0),
    )
    .unwrap();
    let vectors: Vec<ScoreVector> = ["quality", "market"]
        .iter()
        .map(|agent| {
            Criterion::all()
                .iter()
                .fold(ScoreVector::new(*agent, 0.8), |v, c| v.with_score(*c, score))
        })
        .collect();
    engine.aggregate(&submission, &vectors).unwrap()
}

#[test]
fn test_open_creates_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("decisions.json");
    let store = JsonFileStore::open(&path).unwrap();
    assert!(path.exists());
    assert!(store.list().unwrap().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
}

#[test]
fn test_open_existing_requires_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("decisions.json");
    match JsonFileStore::open_existing(&path) {
        Err(StoreError::Io { path: reported, source }) => {
            assert_eq!(reported, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected io error, got {:?}", other.map(|s| s.path().to_path_buf())),
    }
    assert!(!path.exists());
    assert!(!dir.path().join("nested").exists());

    let store = JsonFileStore::open(&path).unwrap();
    store.append(&decision("s1", 70.0)).unwrap();
    let existing = JsonFileStore::open_existing(&path).unwrap();
    assert_eq!(existing.list().unwrap().len(), 1);
}

#[test]
fn test_decisions_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("decisions.json");

    let store = JsonFileStore::open(&path).unwrap();
    let first = decision("s1", 70.0);
    let second = decision("s2", 55.0);
    store.append(&first).unwrap();
    store.append(&second).unwrap();
    store.close().unwrap();

    let reopened = JsonFileStore::open(&path).unwrap();
    let listed = reopened.list().unwrap();
    assert_eq!(listed, vec![first.clone(), second]);
    assert_eq!(reopened.get(&first.key()).unwrap(), Some(first));

    let stats = DecisionStats::from_results(&listed);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.mean_overall_score, 62.5);
}

#[test]
fn test_append_is_write_through() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("decisions.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.append(&decision("s1", 70.0)).unwrap();

    // Readable by a second handle without closing the first.
    let other = JsonFileStore::open(&path).unwrap();
    assert_eq!(other.list().unwrap().len(), 1);
    assert!(!dir.path().join("decisions.json.tmp").exists());
}

#[test]
fn test_duplicate_append_rejected() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::open(dir.path().join("decisions.json")).unwrap();
    let d = decision("s1", 70.0);
    store.append(&d).unwrap();
    match store.append(&d) {
        Err(StoreError::Duplicate(key)) => assert_eq!(key, d.key()),
        other => panic!("expected duplicate error, got {:?}", other),
    }
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_closed_store_rejects_operations() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::open(dir.path().join("decisions.json")).unwrap();
    store.close().unwrap();
    assert!(matches!(store.list(), Err(StoreError::Closed)));
    assert!(matches!(
        store.append(&decision("s1", 70.0)),
        Err(StoreError::Closed)
    ));
    assert!(store.close().is_ok());
}

#[test]
fn test_corrupt_file_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("decisions.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        JsonFileStore::open(&path),
        Err(StoreError::Deserialization(_))
    ));
}
