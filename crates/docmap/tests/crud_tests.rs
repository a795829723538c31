//! Create, read, update, save and delete through `Repository`.

mod common;

use bson::doc;
use bson::oid::ObjectId;
use common::*;
use docmap::backends::memory::MemoryStore;
use docmap::error::SchemaError;
use docmap::mapper::PointMapper;
use docmap::{Repository, StorageError, WriteOutcome};

#[tokio::test]
async fn test_create_assigns_identity_and_version() {
    let store = MemoryStore::new();
    let users = user_repository(&store);

    let mut user = User::new("alice", "alice@example.com", "A", 31);
    let outcome = users.create(&mut user).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Applied(1));
    assert_eq!(outcome.rows(), 1);
    assert!(ObjectId::parse_str(&user.id).is_ok());
    assert_eq!(user.version, 1);

    let stored = store.memory_collection("users").snapshot();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_object_id("_id").unwrap().to_hex(), user.id);
    assert_eq!(stored[0].get_i32("version").unwrap(), 1);
    assert_eq!(stored[0].get_str("userName").unwrap(), "alice");

    let loaded = users.load(user.id.as_str()).await.unwrap().unwrap();
    assert_eq!(loaded, user);
}

#[tokio::test]
async fn test_create_reports_duplicate_identity() {
    let store = MemoryStore::new();
    let notes: Repository<Note> = Repository::new(&store, "notes").unwrap();

    let mut first = Note::new("n1", "first");
    assert_eq!(notes.create(&mut first).await.unwrap(), WriteOutcome::Applied(1));

    let mut again = Note::new("n1", "second");
    let outcome = notes.create(&mut again).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Duplicate);
    assert_eq!(outcome.rows(), 0);

    let stored = notes.load("n1").await.unwrap().unwrap();
    assert_eq!(stored.title, "first");
}

#[tokio::test]
async fn test_create_reports_duplicate_unique_field() {
    let store = MemoryStore::new().with_unique_index("users", "email");
    let users = user_repository(&store);

    let mut first = User::new("alice", "same@example.com", "A", 31);
    let mut second = User::new("alicia", "same@example.com", "A", 29);
    users.create(&mut first).await.unwrap();
    let outcome = users.create(&mut second).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Duplicate);
    assert!(second.id.is_empty());
    assert_eq!(second.version, 0);
}

#[tokio::test]
async fn test_load_and_exist() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let seeded = seed_users(&users).await;

    assert!(users.exist(seeded[2].id.as_str()).await.unwrap());
    let missing = ObjectId::new().to_hex();
    assert!(!users.exist(missing.as_str()).await.unwrap());
    assert!(users.load(missing.as_str()).await.unwrap().is_none());

    let all = users.all().await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].user_name, "alice");
}

#[tokio::test]
async fn test_update_unversioned() {
    let store = MemoryStore::new();
    let notes: Repository<Note> = Repository::new(&store, "notes").unwrap();
    let mut note = Note::new("n1", "draft");
    notes.create(&mut note).await.unwrap();

    note.body = "final text".to_string();
    assert_eq!(notes.update(&mut note).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(notes.load("n1").await.unwrap().unwrap().body, "final text");

    let mut ghost = Note::new("n404", "ghost");
    let outcome = notes.update(&mut ghost).await.unwrap();
    assert_eq!(outcome, WriteOutcome::NotFound);
    assert_eq!(outcome.rows(), 0);
}

#[tokio::test]
async fn test_save_inserts_then_updates() {
    let store = MemoryStore::new();
    let users = user_repository(&store);

    let mut user = User::new("erin", "erin@example.com", "A", 40);
    assert_eq!(users.save(&mut user).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(user.version, 1);
    assert!(!user.id.is_empty());

    user.age = 41;
    assert_eq!(users.save(&mut user).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(user.version, 2);

    // A record that carries an identity but was never stored is inserted.
    let mut imported = User {
        id: ObjectId::new().to_hex(),
        ..User::new("fay", "fay@example.com", "P", 23)
    };
    assert_eq!(users.save(&mut imported).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(imported.version, 1);
    assert!(users.exist(imported.id.as_str()).await.unwrap());
}

#[tokio::test]
async fn test_save_upserts_unversioned() {
    let store = MemoryStore::new();
    let notes: Repository<Note> = Repository::new(&store, "notes").unwrap();

    let mut note = Note::new("n7", "upserted");
    assert_eq!(notes.save(&mut note).await.unwrap(), WriteOutcome::Applied(1));

    note.title = "changed".to_string();
    assert_eq!(notes.save(&mut note).await.unwrap(), WriteOutcome::Applied(1));
    // Saving identical content touches nothing but still matches.
    assert_eq!(notes.save(&mut note).await.unwrap(), WriteOutcome::Applied(1));

    let stored = store.memory_collection("notes").snapshot();
    assert_eq!(stored, vec![doc! { "_id": "n7", "title": "changed", "body": "" }]);
}

#[tokio::test]
async fn test_delete_returns_count() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let seeded = seed_users(&users).await;

    assert_eq!(users.delete(seeded[0].id.as_str()).await.unwrap(), 1);
    assert_eq!(users.delete(seeded[0].id.as_str()).await.unwrap(), 0);
    assert_eq!(users.all().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_load_many_reports_missing_ids() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    let seeded = seed_users(&users).await;

    let absent = ObjectId::new().to_hex();
    let (found, missing) = users
        .load_many([
            seeded[3].id.as_str(),
            absent.as_str(),
            seeded[0].id.as_str(),
            "not-hex",
        ])
        .await
        .unwrap();

    let mut ids: Vec<&str> = found.iter().map(|u| u.id.as_str()).collect();
    ids.sort();
    let mut expected = vec![seeded[0].id.as_str(), seeded[3].id.as_str()];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(missing, vec![bson::Bson::from(absent.as_str()), "not-hex".into()]);

    let (found, missing) = users.load_many(Vec::<String>::new()).await.unwrap();
    assert!(found.is_empty());
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_load_many_plain_identities() {
    let store = MemoryStore::new();
    let notes: Repository<Note> = Repository::new(&store, "notes").unwrap();
    for id in ["n1", "n2", "n3"] {
        notes.create(&mut Note::new(id, "title")).await.unwrap();
    }

    let (found, missing) = notes.load_many(["n3", "n9", "n1"]).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|n| n.id == "n1" || n.id == "n3"));
    assert_eq!(missing, vec![bson::Bson::from("n9")]);
}

#[tokio::test]
async fn test_identity_required_for_keyed_operations() {
    let store = MemoryStore::new();
    let metrics: Repository<Metric> = Repository::new(&store, "metrics").unwrap();

    let err = metrics.load("cpu").await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Schema(SchemaError::MissingIdentity { .. })
    ));
    assert!(metrics.load_many(["cpu"]).await.is_err());

    let mut metric = Metric {
        name: "cpu".to_string(),
        value: 0.5,
    };
    assert!(metrics.update(&mut metric).await.is_err());

    // Inserts and full reads still work.
    assert_eq!(metrics.create(&mut metric).await.unwrap(), WriteOutcome::Applied(1));
    assert_eq!(metrics.all().await.unwrap(), vec![metric]);
}

#[tokio::test]
async fn test_point_mapper_round_trip() {
    let store = MemoryStore::new();
    let places: Repository<Place> = Repository::new(&store, "places")
        .unwrap()
        .with_mapper(PointMapper::default());

    let mut depot = Place {
        name: "depot".to_string(),
        latitude: 21.03,
        longitude: 105.85,
        ..Default::default()
    };
    places.create(&mut depot).await.unwrap();

    let stored = store.memory_collection("places").snapshot();
    assert_eq!(
        stored[0].get_document("location").unwrap(),
        &doc! { "type": "Point", "coordinates": [21.03, 105.85] }
    );
    assert!(!stored[0].contains_key("latitude"));

    let loaded = places.load(depot.id.as_str()).await.unwrap().unwrap();
    assert_eq!(loaded, depot);
}
