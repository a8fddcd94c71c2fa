//! Tests for the disk render cache.

use imagery_common::RASTER_BPP;
use storage::{CacheKey, RenderCache};

fn key(tokens: &[&str]) -> CacheKey {
    let mut k = CacheKey::new();
    for t in tokens {
        k.push_node(*t);
    }
    k
}

fn pixels(width: u32, height: u32, seed: u8) -> Vec<u8> {
    (0..width as usize * height as usize * RASTER_BPP)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

fn open(dir: &std::path::Path) -> RenderCache {
    RenderCache::open_for_process(dir, 4242, 1, true).unwrap()
}

#[test]
fn test_store_then_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = open(dir.path());
    let k = key(&["1.1"]);
    let data = pixels(37, 11, 3);

    cache.store(&k, 37, 11, &data).unwrap();
    assert!(cache.contains(&k));
    assert_eq!(cache.try_load(&k, 37, 11).unwrap(), Some(data));
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_dimension_mismatch_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = open(dir.path());
    let k = key(&["1.1"]);
    cache.store(&k, 10, 10, &pixels(10, 10, 0)).unwrap();

    assert_eq!(cache.try_load(&k, 10, 11).unwrap(), None);
    assert_eq!(cache.try_load(&k, 11, 10).unwrap(), None);
    // Artifact survives a mismatch
    assert!(cache.contains(&k));
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn test_missing_artifact_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = open(dir.path());
    assert_eq!(cache.try_load(&key(&["9.9"]), 5, 5).unwrap(), None);
}

#[test]
fn test_corrupt_artifact_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = open(dir.path());
    let k = key(&["1.1"]);
    std::fs::write(cache.artifact_path(&k), b"ISC1 not really").unwrap();

    assert_eq!(cache.try_load(&k, 4, 4).unwrap(), None);
    assert!(!cache.contains(&k));
}

#[test]
fn test_file_name_embeds_process_id() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(dir.path());
    let path = cache.artifact_path(&key(&["3.1", "1.1"]));
    let name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("i4242_"), "unexpected name {}", name);
    assert!(name.ends_with("-3.1-1.1"), "unexpected name {}", name);
}

#[test]
fn test_caches_in_one_process_do_not_share_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = open(dir.path());
    let mut second = open(dir.path());
    let k = key(&["0.1"]);
    first.store(&k, 3, 3, &pixels(3, 3, 10)).unwrap();
    second.store(&k, 3, 3, &pixels(3, 3, 250)).unwrap();

    assert_ne!(first.artifact_path(&k), second.artifact_path(&k));
    assert_eq!(first.try_load(&k, 3, 3).unwrap(), Some(pixels(3, 3, 10)));

    assert_eq!(second.purge_all(), 1);
    assert!(first.contains(&k));
}

#[test]
fn test_purge_token_removes_every_artifact_naming_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = open(dir.path());
    let leaf = key(&["1.1"]);
    let mut parent = key(&["3.1"]);
    parent.push_child_count(2);
    parent.push_node("1.1");
    parent.push_node("2.1");
    let other = key(&["2.1"]);
    let similar = key(&["1.10"]);

    for k in [&leaf, &parent, &other, &similar] {
        cache.store(k, 3, 3, &pixels(3, 3, 1)).unwrap();
    }

    assert_eq!(cache.purge_token("1.1"), 2);
    assert!(!cache.contains(&leaf));
    assert!(!cache.contains(&parent));
    assert!(cache.contains(&other));
    assert!(cache.contains(&similar));
}

#[test]
fn test_purge_all_leaves_other_caches_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut ours = open(dir.path());
    let mut theirs = RenderCache::open_for_process(dir.path(), 7, 1, true).unwrap();
    let k = key(&["1.1"]);
    ours.store(&k, 3, 3, &pixels(3, 3, 0)).unwrap();
    theirs.store(&k, 3, 3, &pixels(3, 3, 0)).unwrap();

    assert_eq!(ours.purge_all(), 1);
    assert!(theirs.contains(&k));
}

#[test]
fn test_disabled_cache_never_hits() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = RenderCache::open_for_process(dir.path(), 1, 1, false).unwrap();
    let k = key(&["1.1"]);
    cache.store(&k, 3, 3, &pixels(3, 3, 0)).unwrap();
    assert_eq!(cache.try_load(&k, 3, 3).unwrap(), None);
}

#[test]
fn test_store_into_missing_directory_fails_softly() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = open(&dir.path().join("cache"));
    std::fs::remove_dir_all(cache.directory()).unwrap();
    let err = cache.store(&key(&["1.1"]), 3, 3, &pixels(3, 3, 0)).unwrap_err();
    assert!(err.is_node_scoped());
    assert_eq!(cache.stats().store_failures, 1);
}
