use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use cdp_core::config::RefreshPolicy;
use cdp_core::{Config, Event, Profile};
use cdp_persistence::backend::{BackendError, SearchRequest, SearchResponse};
use cdp_persistence::{MemoryBackend, PersistenceService, SearchBackend};

/// Default config: prefix `context`, `event` stored daily.
pub fn test_config() -> Config {
    Config::default()
}

pub fn memory_service() -> (Arc<MemoryBackend>, PersistenceService) {
    memory_service_with(test_config())
}

pub fn memory_service_with(config: Config) -> (Arc<MemoryBackend>, PersistenceService) {
    let backend = Arc::new(MemoryBackend::new());
    let service = PersistenceService::from_config(&config, backend.clone()).unwrap();
    (backend, service)
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn profile(id: &str, properties: Value) -> Profile {
    let mut p = Profile::new(id);
    if let Value::Object(props) = properties {
        p.properties = props;
    }
    p
}

pub fn event(id: &str, event_type: &str, ts: DateTime<Utc>) -> Event {
    Event::new(id, event_type, ts)
}

/// Profiles exercising numbers, strings, arrays, dates, missing fields and
/// nested objects.
pub fn fixture_profiles() -> Vec<Profile> {
    vec![
        profile(
            "p1",
            json!({
                "age": 42, "name": "Alice Smith", "city": "Paris",
                "tags": ["vip", "newsletter"], "birthDate": "1982-05-01T00:00:00Z", "score": 7.5
            }),
        ),
        profile(
            "p2",
            json!({
                "age": 17, "name": "bob", "city": "Lyon",
                "tags": ["newsletter"], "birthDate": "2007-01-15T10:00:00+02:00", "score": 3
            }),
        ),
        profile(
            "p3",
            json!({
                "age": 40, "name": "Carol*Star", "tags": [],
                "birthDate": 315532800000i64
            }),
        ),
        profile("p4", json!({"name": "dave", "city": "Paris", "tags": ["vip"]})),
        profile(
            "p5",
            json!({
                "age": 65, "name": "Eve", "city": "Berlin",
                "interests": [{"cat": "sport", "level": 3}, {"cat": "music", "level": 8}]
            }),
        ),
    ]
}

pub async fn save_all(service: &PersistenceService, profiles: &[Profile]) {
    for p in profiles {
        let mut p = p.clone();
        service.save(&mut p).await.unwrap();
    }
}

/// Backend whose calls never complete.
pub struct StallingBackend;

#[async_trait]
impl SearchBackend for StallingBackend {
    async fn index_exists(&self, _index: &str) -> Result<bool, BackendError> {
        std::future::pending().await
    }

    async fn create_index(&self, _index: &str, _mapping: &Value) -> Result<bool, BackendError> {
        std::future::pending().await
    }

    async fn put_mapping(&self, _index: &str, _mapping: &Value) -> Result<(), BackendError> {
        std::future::pending().await
    }

    async fn get_mapping(&self, _index: &str) -> Result<Option<Value>, BackendError> {
        std::future::pending().await
    }

    async fn index_document(
        &self,
        _index: &str,
        _id: &str,
        _routing: Option<&str>,
        _document: &Value,
        _refresh: RefreshPolicy,
    ) -> Result<(), BackendError> {
        std::future::pending().await
    }

    async fn get_document(&self, _index: &str, _id: &str, _routing: Option<&str>) -> Result<Option<Value>, BackendError> {
        std::future::pending().await
    }

    async fn delete_document(
        &self,
        _index: &str,
        _id: &str,
        _routing: Option<&str>,
        _refresh: RefreshPolicy,
    ) -> Result<bool, BackendError> {
        std::future::pending().await
    }

    async fn delete_by_query(&self, _indices: &str, _query: &Value) -> Result<u64, BackendError> {
        std::future::pending().await
    }

    async fn search(&self, _request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        std::future::pending().await
    }

    async fn list_indices(&self, _pattern: &str) -> Result<Vec<String>, BackendError> {
        std::future::pending().await
    }

    async fn delete_index(&self, _index: &str) -> Result<bool, BackendError> {
        std::future::pending().await
    }
}
