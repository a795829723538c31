//! MongoDB backend tests.
//!
//! Configuration tests need no server. The tests in `mongo_integration`
//! start a MongoDB container through testcontainers and are ignored by
//! default.
//!
//! Run with: `cargo test -p docmap --test mongodb_tests -- --ignored`

#![cfg(feature = "mongodb")]

mod common;

use docmap::backends::mongodb::{MongoConfig, MongoStore};
use docmap::core::{BackendKind, DocumentStore};

// ============================================================================
// Configuration Tests (no server required)
// ============================================================================

#[test]
fn test_mongo_config_defaults() {
    let config = MongoConfig::default();
    assert_eq!(config.uri, "mongodb://localhost:27017");
    assert_eq!(config.database, "docmap");
    assert_eq!(config.max_pool_size, 10);
    assert_eq!(config.min_pool_size, 0);
    assert_eq!(config.connect_timeout_ms, 10_000);
    assert_eq!(config.server_selection_timeout_ms, 30_000);
    assert!(config.username.is_none());
}

#[test]
fn test_mongo_config_serialization() {
    let config = MongoConfig {
        username: Some("svc".to_string()),
        password: Some("secret".to_string()),
        auth_source: Some("admin".to_string()),
        app_name: Some("billing".to_string()),
        ..MongoConfig::new("mongodb://db1:27017,db2:27017", "billing")
    };

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: MongoConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);
}

#[test]
fn test_mongo_config_from_lookup_falls_back() {
    let config = MongoConfig::from_lookup(|key| match key {
        "DOCMAP_MONGO_DATABASE" => Some("orders".to_string()),
        "DOCMAP_MONGO_MAX_POOL_SIZE" => Some("many".to_string()),
        "DOCMAP_MONGO_CONNECT_TIMEOUT" => Some("2m".to_string()),
        _ => None,
    });
    assert_eq!(config.database, "orders");
    assert_eq!(config.uri, "mongodb://localhost:27017");
    assert_eq!(config.max_pool_size, 10);
    assert_eq!(config.connect_timeout_ms, 120_000);
}

#[tokio::test]
async fn test_connect_is_lazy() {
    // Nothing listens here; configuring the client must still succeed.
    let config = MongoConfig {
        server_selection_timeout_ms: 200,
        ..MongoConfig::new("mongodb://127.0.0.1:1", "lazy")
    };
    let store = MongoStore::connect(&config).await.unwrap();
    assert_eq!(store.kind(), BackendKind::MongoDB);
    assert_eq!(store.name(), "mongodb");
    assert_eq!(store.database().name(), "lazy");
    assert!(store.ping().await.is_err());
}

#[tokio::test]
async fn test_connect_rejects_bad_uri() {
    let config = MongoConfig::new("postgres://localhost", "nope");
    assert!(MongoStore::connect(&config).await.is_err());
}

// ============================================================================
// Integration Tests (requires Docker for testcontainers)
// ============================================================================

mod mongo_integration {
    use std::sync::Arc;

    use docmap::backends::mongodb::{MongoConfig, MongoStore};
    use docmap::batch::BatchWriter;
    use docmap::core::DocumentStore;
    use docmap::health::{HealthChecker, ServerInfoChecker};
    use docmap::query::IntRange;
    use docmap::{Patch, Repository, WriteOutcome};
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, ImageExt};
    use testcontainers_modules::mongo::Mongo;
    use tokio::sync::OnceCell;

    use crate::common::*;

    struct SharedMongo {
        uri: String,
        _container: ContainerAsync<Mongo>,
    }

    static SHARED_MONGO: OnceCell<SharedMongo> = OnceCell::const_new();

    async fn shared_mongo() -> &'static SharedMongo {
        SHARED_MONGO
            .get_or_init(|| async {
                let run_id = std::env::var("GITHUB_RUN_ID").unwrap_or_default();
                let container = Mongo::default()
                    .with_label("github.run_id", &run_id)
                    .with_startup_timeout(std::time::Duration::from_secs(120))
                    .start()
                    .await
                    .expect("Failed to start MongoDB container");

                let port = container
                    .get_host_port_ipv4(27017)
                    .await
                    .expect("Failed to get host port");
                let host = container
                    .get_host()
                    .await
                    .expect("Failed to get host")
                    .to_string();

                SharedMongo {
                    uri: format!("mongodb://{host}:{port}"),
                    _container: container,
                }
            })
            .await
    }

    /// Connects to the shared container with a database of its own.
    async fn create_store() -> MongoStore {
        let mongo = shared_mongo().await;
        let database = format!("docmap_{}", uuid::Uuid::new_v4().simple());
        MongoStore::connect(&MongoConfig::new(mongo.uri.clone(), database))
            .await
            .expect("Failed to connect to MongoDB")
    }

    async fn users(store: &MongoStore) -> Repository<User> {
        store
            .create_unique_index("users", "email")
            .await
            .expect("Failed to create index");
        Repository::new(store, "users").expect("user schema")
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_ping_and_health() {
        let store = create_store().await;
        store.ping().await.unwrap();

        let store = Arc::new(store);
        let report = HealthChecker::new(store.clone()).build().await;
        assert!(report.is_up());

        let info = ServerInfoChecker::new(store).build().await;
        assert!(info.is_up());
        assert!(info.data["version"].as_str().is_some());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_crud_round_trip() {
        let store = create_store().await;
        let users = users(&store).await;

        let mut user = User::new("ann", "ann@example.com", "A", 30);
        assert_eq!(users.create(&mut user).await.unwrap(), WriteOutcome::Applied(1));
        assert_eq!(user.id.len(), 24);
        assert_eq!(user.version, 1);

        let stored = store.mongo_collection("users");
        let raw = stored
            .inner()
            .find_one(bson::doc! { "email": "ann@example.com" })
            .await
            .unwrap()
            .unwrap();
        assert!(raw.get_object_id("_id").is_ok());
        assert_eq!(raw.get_str("userName").unwrap(), "ann");

        let loaded = users.load(user.id.as_str()).await.unwrap().unwrap();
        assert_eq!(loaded, user);
        assert!(users.exist(user.id.as_str()).await.unwrap());

        let absent = bson::oid::ObjectId::new().to_hex();
        let (found, missing) = users
            .load_many([user.id.as_str(), absent.as_str()])
            .await
            .unwrap();
        assert_eq!(found, vec![user.clone()]);
        assert_eq!(missing, vec![bson::Bson::from(absent.as_str())]);

        assert_eq!(users.delete(user.id.as_str()).await.unwrap(), 1);
        assert!(users.load(user.id.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_optimistic_conflicts() {
        let store = create_store().await;
        let users = users(&store).await;

        let mut user = User::new("ann", "ann@example.com", "A", 30);
        users.create(&mut user).await.unwrap();
        let mut stale = user.clone();

        user.age = 31;
        assert_eq!(users.update(&mut user).await.unwrap(), WriteOutcome::Applied(1));
        assert_eq!(user.version, 2);

        stale.age = 99;
        let outcome = users.update(&mut stale).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
        assert_eq!(outcome.rows(), -1);

        let patch = Patch::new()
            .set("id", user.id.as_str())
            .set("status", "I")
            .set("version", 1);
        assert_eq!(users.patch(&patch).await.unwrap(), WriteOutcome::Conflict);

        let mut missing = User::new("ghost", "ghost@example.com", "A", 1);
        missing.id = bson::oid::ObjectId::new().to_hex();
        missing.version = 1;
        let outcome = users.update(&mut missing).await.unwrap();
        assert_eq!(outcome, WriteOutcome::NotFound);
        assert_eq!(outcome.rows(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_duplicate_key_is_reported() {
        let store = create_store().await;
        let users = users(&store).await;

        let mut first = User::new("ann", "ann@example.com", "A", 30);
        users.create(&mut first).await.unwrap();
        let mut second = User::new("anna", "ann@example.com", "A", 31);
        assert_eq!(users.create(&mut second).await.unwrap(), WriteOutcome::Duplicate);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_search_on_server() {
        let store = create_store().await;
        let users = users(&store).await;
        seed_users(&users).await;

        let mut filter = UserFilter::page(1, 2);
        filter.search.sort = Some("-age".to_string());
        filter.status = vec!["A".to_string()];
        let page = users.search(&filter).await.unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<&str> = page.items.iter().map(|u| u.user_name.as_str()).collect();
        assert_eq!(names, vec!["alice", "dave"]);

        let mut filter = UserFilter::default();
        filter.user_name = Some("al".to_string());
        filter.age_range = IntRange {
            min: Some(40),
            ..Default::default()
        };
        let found = users.query(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_name, "albert");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_batch_reports_failed_indices() {
        let store = create_store().await;
        let writer = BatchWriter::<Note>::new(&store, "notes").unwrap();

        let mut batch = vec![
            Note::new("n1", "one"),
            Note::new("n1", "again"),
            Note::new("n2", "two"),
        ];
        let outcome = writer.insert_many(&mut batch).await.unwrap();
        assert_eq!(outcome.succeeded, vec![0, 2]);
        assert_eq!(outcome.failed, vec![1]);
        assert!(outcome.cause.is_some());

        let mut updates = vec![Note::new("n1", "first"), Note::new("n3", "three")];
        let outcome = writer.upsert_many(&mut updates).await.unwrap();
        assert!(outcome.is_complete());

        let notes: Repository<Note> = Repository::new(&store, "notes").unwrap();
        assert_eq!(notes.all().await.unwrap().len(), 3);
        let first = notes.load("n1").await.unwrap().unwrap();
        assert_eq!(first.title, "first");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_batch_update_reports_stale_records() {
        let store = create_store().await;
        let users = users(&store).await;
        let writer = BatchWriter::<User>::new(&store, "users").unwrap();

        let mut batch = vec![
            User::new("ann", "ann@example.com", "A", 30),
            User::new("bob", "bob@example.com", "A", 40),
        ];
        writer.insert_many(&mut batch).await.unwrap();

        let mut winner = batch[1].clone();
        winner.age = 41;
        users.update(&mut winner).await.unwrap();

        batch[0].age = 31;
        batch[1].age = 99;
        let outcome = writer.update_many(&mut batch).await.unwrap();
        assert_eq!(outcome.succeeded, vec![0]);
        assert_eq!(outcome.failed, vec![1]);
        assert_eq!(batch[0].version, 2);
        assert_eq!(batch[1].version, 1);

        let stored = users.load(winner.id.as_str()).await.unwrap().unwrap();
        assert_eq!(stored.age, 41);
    }
}
