//! Common test utilities and helpers for quotaroll tests
//!
//! This module provides document builders for seeding the in-process store,
//! wiremock helpers that stand in for the Cloud Foundry API, and an
//! environment guard for tests that read settings from the environment.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use quotaroll_core::memory_store::MemoryStore;
use quotaroll_core::types::{Guid, PollDocument};
use serde_json::{Value, json};
use std::env;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Global mutex to serialize environment variable modifications in tests
pub static ENV_MUTEX: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Every environment variable the CLI reads
pub const CONFIG_VARS: &[&str] = &[
    "ES_URI",
    "DATE",
    "POLL_QUOTA_INDEX",
    "AGG_QUOTA_INDEX",
    "SOURCE_INDEX",
    "BILL_INDEX",
    "OUT_DIR",
    "QUERY_TIMEOUT_SECS",
    "GROUP_CAP",
    "DISTINCT_CAP",
    "CF_API_URL",
    "CF_CLIENT_ID",
    "CF_CLIENT_SECRET",
    "ON_MISSING_QUOTA",
    "NOTIFY_WEBHOOK_URL",
];

/// RAII guard restoring environment variables on drop
pub struct EnvVarGuard {
    vars: Vec<(String, Option<String>)>,
}

impl EnvVarGuard {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Guard with every CLI variable unset
    pub fn cleared() -> Self {
        let mut guard = Self::new();
        for key in CONFIG_VARS {
            guard.remove(key);
        }
        guard
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.push((key.to_string(), env::var(key).ok()));
        // set_var is unsafe since edition 2024; callers hold ENV_MUTEX
        unsafe {
            env::set_var(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.vars.push((key.to_string(), env::var(key).ok()));
        unsafe {
            env::remove_var(key);
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.vars.iter().rev() {
            unsafe {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap()
}

/// Builder for poll documents as the poll command stores them
pub struct PollDocumentBuilder {
    org_id: String,
    org_name: String,
    quota_id: String,
    quota_name: String,
    memory_limit: i64,
    timestamp: DateTime<Utc>,
}

impl PollDocumentBuilder {
    pub fn new(org_id: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            org_name: format!("{org_id}-name"),
            quota_id: "q-default".to_string(),
            quota_name: "default".to_string(),
            memory_limit: 1024,
            timestamp: utc(2024, 3, 15, 6, 0, 0),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.org_name = name.to_string();
        self
    }

    pub fn with_quota(mut self, quota_id: &str, memory_limit: i64) -> Self {
        self.quota_id = quota_id.to_string();
        self.quota_name = format!("{quota_id}-name");
        self.memory_limit = memory_limit;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn build(self) -> PollDocument {
        PollDocument {
            id: PollDocument::build_id(
                &Guid::new(&self.org_id),
                &Guid::new(&self.quota_id),
                self.timestamp,
            ),
            timestamp: self.timestamp,
            org_id: self.org_id,
            org_name: self.org_name,
            quota_id: self.quota_id,
            quota_name: self.quota_name,
            memory_limit: self.memory_limit,
        }
    }

    /// Store the document under its id
    pub fn insert_into(self, store: &MemoryStore, index: &str) -> PollDocument {
        let doc = self.build();
        store.insert(index, &doc.id, serde_json::to_value(&doc).unwrap());
        doc
    }
}

/// A container metric event as shipped by the platform log pipeline
pub fn container_metric(
    org_id: &str,
    org_name: &str,
    timestamp: DateTime<Utc>,
    memory_bytes: u64,
    memory_bytes_quota: u64,
) -> Value {
    json!({
        "@timestamp": timestamp.to_rfc3339(),
        "@type": "ContainerMetric",
        "@cf.org_id": org_id,
        "@cf.org": org_name,
        "containermetric": {
            "memory_bytes": memory_bytes,
            "memory_bytes_quota": memory_bytes_quota
        }
    })
}

pub fn org_resource(guid: &str, name: &str, quota_guid: &str) -> Value {
    json!({
        "metadata": {"guid": guid, "url": format!("/v2/organizations/{guid}")},
        "entity": {"name": name, "quota_definition_guid": quota_guid, "status": "active"}
    })
}

pub fn quota_resource(guid: &str, name: &str, memory_limit: i64) -> Value {
    json!({
        "metadata": {"guid": guid, "url": format!("/v2/quota_definitions/{guid}")},
        "entity": {"name": name, "memory_limit": memory_limit, "total_routes": 1000}
    })
}

/// Mount `/v2/info` and a token endpoint that accepts any client
pub async fn mount_cf_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/info"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token_endpoint": format!("{}/uaa", server.uri())})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uaa/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

/// Mount a collection served as `pages`, linked through relative `next_url`s.
///
/// The first page answers requests without a `page` parameter too.
pub async fn mount_collection(server: &MockServer, collection: &str, pages: Vec<Vec<Value>>) {
    let total: usize = pages.iter().map(Vec::len).sum();
    let count = pages.len();

    for (i, resources) in pages.into_iter().enumerate() {
        let number = i + 1;
        let next_url = (number < count).then(|| format!("{collection}?page={}", number + 1));
        let body = json!({
            "total_results": total,
            "total_pages": count,
            "prev_url": null,
            "next_url": next_url,
            "resources": resources
        });

        if number == 1 {
            // Mounted with lower priority than the explicit page mocks
            Mock::given(method("GET"))
                .and(path(collection))
                .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
                .with_priority(10)
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(collection))
            .and(query_param("page", number.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}
