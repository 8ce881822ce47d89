//! Full sync pipeline flow against temp files, with a fake encoder so no
//! model download is needed.

use std::path::Path;

use crate::catalog::Product;
use crate::pipeline::{
    classify, content_hash, embed_products, load_snapshot, merge, prior_map, save_snapshot,
};

const DIMS: usize = 4;

fn product(id: &str, name: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("{name} description"),
        category: "Gadgets".to_string(),
        price: Some(42.0),
        image_url: format!("https://example.com/{id}.jpg"),
        content_hash: None,
        embedding: None,
    }
}

/// Deterministic stand-in for the model: a vector derived from the batch
/// position, which also makes misalignment visible.
fn fake_encode(texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
    Ok(texts
        .iter()
        .enumerate()
        .map(|(i, _)| vec![i as f32 + 1.0; DIMS])
        .collect())
}

/// Run classify -> embed -> merge -> save against the snapshot at `path`.
fn sync_once(raw: Vec<Product>, path: &Path) -> (usize, usize, usize) {
    let prior = prior_map(load_snapshot(path));
    let changes = classify(raw, &prior);
    let counts = (changes.kept.len(), changes.updated.len(), changes.new.len());

    let mut pending = changes.updated;
    pending.extend(changes.new);
    let embedded = embed_products(pending, DIMS, fake_encode).unwrap();

    let snapshot = merge(changes.kept, embedded);
    save_snapshot(path, &snapshot).unwrap();

    counts
}

#[test]
fn first_run_embeds_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("snapshot.json");

    let (kept, updated, new) = sync_once(vec![product("2", "b"), product("1", "a")], &path);
    assert_eq!((kept, updated, new), (0, 0, 2));

    let snapshot = load_snapshot(&path);
    assert_eq!(snapshot.len(), 2);
    // sorted by id regardless of input order
    assert_eq!(snapshot[0].id, "1");
    assert_eq!(snapshot[1].id, "2");
    assert!(snapshot.iter().all(|p| p.embedding.is_some()));
    assert!(snapshot.iter().all(|p| p.content_hash.is_some()));
}

#[test]
fn rerun_with_unchanged_catalog_is_a_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("snapshot.json");

    let raw = vec![product("1", "a"), product("2", "b")];
    sync_once(raw.clone(), &path);
    let first = std::fs::read(&path).unwrap();

    let (kept, updated, new) = sync_once(raw, &path);
    assert_eq!((kept, updated, new), (2, 0, 0));

    // byte-for-byte identical snapshot on an unchanged catalog
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn changed_product_is_reembedded_others_keep_their_vectors() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("snapshot.json");

    sync_once(vec![product("1", "a"), product("2", "b")], &path);
    let before = load_snapshot(&path);
    let unchanged_vector = before.iter().find(|p| p.id == "2").unwrap().embedding.clone();

    let mut modified = product("1", "a");
    modified.price = Some(99.0);

    let (kept, updated, new) = sync_once(vec![modified, product("2", "b")], &path);
    assert_eq!((kept, updated, new), (1, 1, 0));

    let after = load_snapshot(&path);
    let p2 = after.iter().find(|p| p.id == "2").unwrap();
    assert_eq!(p2.embedding, unchanged_vector);

    let p1 = after.iter().find(|p| p.id == "1").unwrap();
    assert_eq!(p1.content_hash.as_deref(), Some(content_hash(&{
        let mut m = product("1", "a");
        m.price = Some(99.0);
        m
    }).as_str()));
}

#[test]
fn removed_product_vanishes_from_the_next_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("snapshot.json");

    sync_once(vec![product("1", "a"), product("2", "b")], &path);
    sync_once(vec![product("1", "a")], &path);

    let snapshot = load_snapshot(&path);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "1");
}

#[test]
fn kept_and_new_scenario_end_to_end() {
    // prior snapshot: A only; raw catalog: unchanged A plus new B.
    // A must keep its cached vector, B must get a fresh one, and the
    // snapshot must come out sorted as [A, B].
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("snapshot.json");

    let a = product("1", "a");
    let mut cached_a = a.clone();
    cached_a.content_hash = Some(content_hash(&a));
    cached_a.embedding = Some(vec![9.0; DIMS]);
    save_snapshot(&path, &[cached_a]).unwrap();

    let (kept, updated, new) = sync_once(vec![a, product("2", "b")], &path);
    assert_eq!((kept, updated, new), (1, 0, 1));

    let snapshot = load_snapshot(&path);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].id, "1");
    assert_eq!(snapshot[0].embedding, Some(vec![9.0; DIMS]));
    assert_eq!(snapshot[1].id, "2");
    assert!(snapshot[1].embedding.is_some());
    assert_ne!(snapshot[1].embedding, Some(vec![9.0; DIMS]));
}

#[test]
fn malformed_records_do_not_abort_the_pass() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("snapshot.json");

    let raw = vec![
        product("", "orphan"),
        product("1", "a"),
        product("1", "a-duplicate"),
        product("2", "b"),
    ];

    let (kept, updated, new) = sync_once(raw, &path);
    assert_eq!((kept, updated, new), (0, 0, 2));
    assert_eq!(load_snapshot(&path).len(), 2);
}
