//! Optimistic concurrency: version checks on update and patch.

mod common;

use bson::Bson;
use bson::oid::ObjectId;
use common::*;
use docmap::backends::memory::MemoryStore;
use docmap::error::PatchError;
use docmap::{Patch, Repository, StorageError, WriteOutcome};
use serde_json::json;

#[tokio::test]
async fn test_update_advances_version() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let mut user = seed_users(&users).await.remove(0);

    user.status = "I".to_string();
    assert_eq!(users.update(&mut user).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(user.version, 2);

    user.age += 1;
    assert_eq!(users.update(&mut user).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(user.version, 3);

    let stored = users.load(user.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored, user);
}

#[tokio::test]
async fn test_stale_update_is_a_conflict() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let mut current = seed_users(&users).await.remove(1);
    let mut stale = current.clone();

    current.email = "albert@new.io".to_string();
    users.update(&mut current).await.unwrap();

    stale.email = "albert@old.io".to_string();
    let outcome = users.update(&mut stale).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Conflict);
    assert_eq!(outcome.rows(), -1);
    assert!(outcome.is_conflict());

    let stored = users.load(current.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored.email, "albert@new.io");
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_update_of_missing_record_is_not_found() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let mut user = seed_users(&users).await.remove(3);
    users.delete(user.id.as_str()).await.unwrap();

    let outcome = users.update(&mut user).await.unwrap();
    assert_eq!(outcome, WriteOutcome::NotFound);
    assert_eq!(outcome.rows(), 0);

    let mut never_stored = User {
        id: ObjectId::new().to_hex(),
        version: 1,
        ..Default::default()
    };
    assert_eq!(
        users.update(&mut never_stored).await.unwrap(),
        WriteOutcome::NotFound
    );
}

#[tokio::test]
async fn test_sixty_four_bit_version() {
    let store = MemoryStore::new();
    let counters: Repository<Counter> = Repository::new(&store, "counters").unwrap();

    let mut counter = Counter {
        id: "home".to_string(),
        ..Default::default()
    };
    counters.create(&mut counter).await.unwrap();
    assert_eq!(counter.revision, 1);

    let stored = store.memory_collection("counters").snapshot();
    assert_eq!(stored[0].get("revision"), Some(&Bson::Int64(1)));

    counter.hits = 10;
    counters.update(&mut counter).await.unwrap();
    assert_eq!(counter.revision, 2);
    let stored = store.memory_collection("counters").snapshot();
    assert_eq!(stored[0].get("revision"), Some(&Bson::Int64(2)));
}

#[tokio::test]
async fn test_patch_applies_and_bumps_version() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let user = seed_users(&users).await.remove(2);

    let patch = Patch::new()
        .set("id", user.id.as_str())
        .set("email", "bob@new.io")
        .set("version", user.version);
    assert_eq!(users.patch(&patch).await.unwrap(), WriteOutcome::Applied(1));

    let stored = users.load(user.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored.email, "bob@new.io");
    assert_eq!(stored.user_name, "bob");
    assert_eq!(stored.version, 2);

    // The same patch again carries a stale version.
    let outcome = users.patch(&patch).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Conflict);
}

#[tokio::test]
async fn test_patch_of_missing_record_is_not_found() {
    let store = MemoryStore::new();
    let users = user_repository(&store);

    let patch = Patch::new()
        .set("id", ObjectId::new().to_hex())
        .set("status", "I")
        .set("version", 1);
    assert_eq!(users.patch(&patch).await.unwrap(), WriteOutcome::NotFound);
}

#[tokio::test]
async fn test_patch_from_json_uses_read_names() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let user = seed_users(&users).await.remove(4);

    let patch = Patch::from_json(json!({
        "id": user.id.clone(),
        "userName": "david",
        "version": 1
    }))
    .unwrap();
    assert_eq!(users.patch(&patch).await.unwrap(), WriteOutcome::Applied(1));

    let stored = users.load(user.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored.user_name, "david");
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_invalid_patches_are_rejected_before_writing() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let user = seed_users(&users).await.remove(0);

    let no_version = Patch::new().set("id", user.id.as_str()).set("age", 50);
    let err = users.patch(&no_version).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Patch(PatchError::MissingVersion { .. })
    ));

    let unknown = Patch::new()
        .set("id", user.id.as_str())
        .set("nickname", "al")
        .set("version", 1);
    let err = users.patch(&unknown).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Patch(PatchError::UndeclaredField { .. })
    ));

    let bad_version = Patch::new()
        .set("id", user.id.as_str())
        .set("version", "1");
    let err = users.patch(&bad_version).await.unwrap_err();
    assert!(err.to_string().starts_with("Do not support this version type"));

    let stored = users.load(user.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored, user);
}

#[tokio::test]
async fn test_unversioned_patch() {
    let store = MemoryStore::new();
    let notes: Repository<Note> = Repository::new(&store, "notes").unwrap();
    notes.create(&mut Note::new("n1", "draft")).await.unwrap();

    let patch = Patch::new().set("id", "n1").set("body", "hello");
    assert_eq!(notes.patch(&patch).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(notes.load("n1").await.unwrap().unwrap().body, "hello");

    let missing = Patch::new().set("id", "n2").set("body", "x");
    assert_eq!(notes.patch(&missing).await.unwrap(), WriteOutcome::NotFound);
}
