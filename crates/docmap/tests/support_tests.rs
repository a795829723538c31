//! Health checks, passcodes and exports through the public API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use docmap::StorageResult;
use docmap::backends::memory::MemoryStore;
use docmap::export::Exporter;
use docmap::health::{HealthChecker, HealthStatus};
use docmap::passcode::PasscodeRepository;

#[tokio::test(start_paused = true)]
async fn test_health_report_json() {
    let slow = MemoryStore::new().with_ping_delay(Duration::from_secs(10));
    let report = HealthChecker::new(Arc::new(slow))
        .with_timeout(Duration::from_millis(100))
        .build()
        .await;
    assert_eq!(report.status, HealthStatus::Down);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["name"], "mongo");
    assert_eq!(json["status"], "down");
    assert!(json["data"]["error"].as_str().unwrap().contains("100ms"));
}

#[tokio::test]
async fn test_passcode_lifecycle() {
    let store = MemoryStore::new();
    let codes = PasscodeRepository::new(&store, "passcodes");
    let expires = Utc::now() + ChronoDuration::minutes(5);

    assert_eq!(codes.save("user-1", "918273", expires).await.unwrap(), 1);
    let stored = codes.load("user-1").await.unwrap();
    assert_eq!(stored.code, "918273");
    assert!(stored.is_valid_at(Utc::now()));
    assert!(!stored.is_valid_at(expires + ChronoDuration::seconds(1)));

    assert_eq!(codes.delete("user-1").await.unwrap(), 1);
    let gone = codes.load("user-1").await.unwrap();
    assert!(gone.code.is_empty());
    assert!(!gone.is_valid_at(Utc::now()));
}

#[tokio::test]
async fn test_export_filtered_users() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    seed_users(&users).await;

    let mut filter = UserFilter::default();
    filter.status = vec!["A".to_string()];
    let mut out = Vec::new();
    let written = Exporter::new(&users)
        .with_filter(&filter)
        .with_sort("-age")
        .export(&mut out)
        .await
        .unwrap();
    assert_eq!(written, 3);

    let text = String::from_utf8(out).unwrap();
    let rows: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let names: Vec<&str> = rows.iter().map(|r| r["userName"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["alice", "dave", "bob"]);
    assert_eq!(rows[0]["_id"].as_str().unwrap().len(), 24);
}

#[tokio::test]
async fn test_export_with_csv_formatter() {
    let store = MemoryStore::new();
    let users = user_repository(&store);
    seed_users(&users).await;

    let csv = |user: &User| -> StorageResult<String> {
        Ok(format!("{},{},{}", user.user_name, user.status, user.age))
    };
    let mut out = Vec::new();
    Exporter::new(&users)
        .with_sort("userName")
        .with_formatter(csv)
        .export(&mut out)
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().next(), Some("albert,I,45"));
    assert!(text.ends_with("dave,A,27\n"));
}
