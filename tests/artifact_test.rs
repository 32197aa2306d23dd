use ndarray::{array, Array2};
use skillswap::index::store::{ArtifactError, ArtifactStore, INDEX_FILE, MANIFEST_FILE};
use skillswap::index::FlatIndex;
use tempfile::TempDir;

fn index(rows: Array2<f32>) -> FlatIndex {
    FlatIndex::build(rows).expect("non-empty matrix")
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn save_then_load_round_trips() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    let built = index(array![[3.0, 4.0, 0.0], [0.0, 0.0, 2.0]]);

    let meta = store.save(&built, &names(&["Python", "SQL"])).unwrap();
    assert_eq!(meta.rows, 2);
    assert_eq!(meta.dimension, 3);
    assert_eq!(meta.manifest_digest.len(), 64);

    let loaded = store.load().unwrap();
    assert_eq!(loaded.manifest, vec!["Python", "SQL"]);
    assert_eq!(loaded.index.rows(), built.rows());
    assert_eq!(loaded.meta.manifest_digest, meta.manifest_digest);
    assert_eq!(loaded.meta.built_at.timestamp_millis(), meta.built_at.timestamp_millis());
}

#[test]
fn manifest_is_a_plain_json_array() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store
        .save(&index(array![[1.0, 0.0], [0.0, 1.0]]), &names(&["Go", "Rust"]))
        .unwrap();

    let raw = std::fs::read_to_string(tmp.path().join(MANIFEST_FILE)).unwrap();
    let manifest: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest, vec!["Go", "Rust"]);
    assert!(tmp.path().join(INDEX_FILE).exists());
}

#[test]
fn missing_pair_reports_missing() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path().join("never-written"));
    assert!(matches!(store.load(), Err(ArtifactError::Missing(_))));
}

#[test]
fn missing_manifest_reports_missing() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.save(&index(array![[1.0, 0.0]]), &names(&["Go"])).unwrap();
    std::fs::remove_file(store.manifest_path()).unwrap();

    assert!(matches!(store.load(), Err(ArtifactError::Missing(_))));
}

#[test]
fn manifest_from_another_build_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());

    store
        .save(&index(array![[1.0, 0.0], [0.0, 1.0]]), &names(&["Go", "Rust"]))
        .unwrap();
    let stale_manifest = std::fs::read(store.manifest_path()).unwrap();

    store
        .save(&index(array![[1.0, 0.0], [0.0, 1.0]]), &names(&["Rust", "Go"]))
        .unwrap();
    std::fs::write(store.manifest_path(), stale_manifest).unwrap();

    assert!(matches!(store.load(), Err(ArtifactError::Mismatch(_))));
}

#[test]
fn row_count_mismatch_is_refused_and_keeps_previous_pair() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.save(&index(array![[1.0, 0.0]]), &names(&["Go"])).unwrap();

    let err = store
        .save(&index(array![[1.0, 0.0], [0.0, 1.0]]), &names(&["Rust"]))
        .unwrap_err();
    assert!(matches!(err, ArtifactError::Mismatch(_)));

    let loaded = store.load().unwrap();
    assert_eq!(loaded.manifest, vec!["Go"]);
}

#[test]
fn save_leaves_no_staging_directories() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.save(&index(array![[1.0, 2.0]]), &names(&["Go"])).unwrap();
    store.save(&index(array![[2.0, 1.0]]), &names(&["Rust"])).unwrap();

    let mut entries: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec![INDEX_FILE.to_string(), MANIFEST_FILE.to_string()]);
}

#[test]
fn truncated_index_file_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store
        .save(&index(array![[1.0, 0.0], [0.0, 1.0]]), &names(&["Go", "Rust"]))
        .unwrap();

    let bytes = std::fs::read(store.index_path()).unwrap();
    std::fs::write(store.index_path(), &bytes[..bytes.len() - 4]).unwrap();

    assert!(matches!(store.load(), Err(ArtifactError::Corrupt(_))));
}

#[test]
fn stale_staging_directories_are_swept_on_save() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    let stale = tmp.path().join(".staging-interrupted");
    std::fs::create_dir(&stale).unwrap();
    std::fs::write(stale.join(INDEX_FILE), b"half written").unwrap();

    store.save(&index(array![[1.0, 0.0]]), &names(&["Go"])).unwrap();

    assert!(!stale.exists());
    assert_eq!(store.load().unwrap().manifest, vec!["Go"]);
}

#[test]
fn failed_manifest_rename_restores_previous_index() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.save(&index(array![[1.0, 0.0]]), &names(&["Go"])).unwrap();
    let previous_index = std::fs::read(store.index_path()).unwrap();

    // a non-empty directory where the manifest belongs makes its rename fail
    std::fs::remove_file(store.manifest_path()).unwrap();
    std::fs::create_dir(store.manifest_path()).unwrap();
    std::fs::write(store.manifest_path().join("keep"), b"x").unwrap();

    let err = store
        .save(&index(array![[0.0, 1.0], [1.0, 1.0]]), &names(&["Rust", "Zig"]))
        .unwrap_err();
    assert!(matches!(err, ArtifactError::Io { .. }));

    assert_eq!(std::fs::read(store.index_path()).unwrap(), previous_index);
    let staging_left = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with(".staging-"));
    assert!(!staging_left);
}

#[test]
fn failed_first_save_leaves_no_unpaired_index() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path());
    std::fs::create_dir(store.manifest_path()).unwrap();
    std::fs::write(store.manifest_path().join("keep"), b"x").unwrap();

    assert!(store.save(&index(array![[1.0, 0.0]]), &names(&["Go"])).is_err());
    assert!(!store.index_path().exists());
}
