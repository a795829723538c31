//! Shared fixtures for the integration tests.
//!
//! Every test builds its own `MemoryStore`, so tests never share state.

#![allow(dead_code)]

use docmap::backends::memory::MemoryStore;
use docmap::query::IntRange;
use docmap::{Filter, Model, Repository, SearchEnvelope};
use serde::{Deserialize, Serialize};

/// A versioned record with a hex-string identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    #[serde(rename = "_id")]
    #[model(object_id_hex)]
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub status: String,
    pub age: i32,
    #[model(version)]
    pub version: i32,
}

impl User {
    pub fn new(user_name: &str, email: &str, status: &str, age: i32) -> Self {
        Self {
            user_name: user_name.to_string(),
            email: email.to_string(),
            status: status.to_string(),
            age,
            ..Default::default()
        }
    }
}

/// An unversioned record whose identity is chosen by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[serde(default)]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub body: String,
}

impl Note {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            body: String::new(),
        }
    }
}

/// A record with a 64-bit version counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[serde(default)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub hits: i64,
    #[model(version)]
    pub revision: i64,
}

/// A record stored as a GeoJSON point through `PointMapper`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[serde(default)]
pub struct Place {
    #[serde(rename = "_id")]
    #[model(object_id_hex)]
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A record without an identity field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Filter)]
pub struct UserFilter {
    #[filter(envelope)]
    pub search: SearchEnvelope,
    #[filter(match = "prefix", keyword)]
    pub user_name: Option<String>,
    #[filter(keyword)]
    pub email: String,
    pub status: Vec<String>,
    #[filter(operator = ">=", bson = "age")]
    pub min_age: Option<i32>,
    #[filter(bson = "age")]
    pub age_range: IntRange,
    #[filter(skip)]
    pub debug: bool,
}

impl UserFilter {
    pub fn page(page_index: i64, page_size: i64) -> Self {
        Self {
            search: SearchEnvelope::page(page_index, page_size),
            ..Default::default()
        }
    }
}

pub fn user_repository(store: &MemoryStore) -> Repository<User> {
    Repository::new(store, "users").expect("user schema")
}

/// Five users, created in name order.
pub async fn seed_users(users: &Repository<User>) -> Vec<User> {
    let mut seeded = vec![
        User::new("alice", "alice@example.com", "A", 31),
        User::new("albert", "albert@corp.io", "I", 45),
        User::new("bob", "bob@example.com", "A", 22),
        User::new("carol", "carol@corp.io", "P", 38),
        User::new("dave", "dave@example.com", "A", 27),
    ];
    for user in seeded.iter_mut() {
        let outcome = users.create(user).await.expect("create user");
        assert!(outcome.is_applied());
    }
    seeded
}
