use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use cdp_condition::Condition;
use cdp_core::{CdpError, Event, Item, Profile, Session};
use cdp_persistence::SearchBackend;

use crate::helpers::{at, event, memory_service, memory_service_with, profile, test_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_writes_create_partition_once() {
    let (backend, service) = memory_service();
    let service = Arc::new(service);
    let day = at(2024, 3, 1, 9);

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let mut e = Event::new(format!("e{}", i), "view", day);
            service.save(&mut e).await
        }));
    }
    for handle in futures::future::join_all(handles).await {
        handle.unwrap().unwrap();
    }

    assert_eq!(backend.created_index_count(), 1);
    assert_eq!(backend.document_count("context-event-2024-03-01"), 16);
}

#[tokio::test]
async fn test_daily_items_route_to_day_partitions() {
    let (backend, service) = memory_service();
    let day1 = at(2024, 3, 1, 9);
    let day2 = at(2024, 3, 2, 18);
    service.save(&mut event("e1", "view", day1)).await.unwrap();
    service.save(&mut event("e2", "click", day2)).await.unwrap();

    let partitions = backend.list_indices("context-event-*").await.unwrap();
    assert_eq!(partitions, vec!["context-event-2024-03-01", "context-event-2024-03-02"]);

    let all = service.query::<Event>(None, Some("timeStamp"), 0, 10).await.unwrap();
    assert_eq!(all.total_size, 2);
    assert_eq!(all.list[0].item_id, "e1");

    let hinted: Event = service.load("e2", Some(day2)).await.unwrap().unwrap();
    assert_eq!(hinted.event_type, "click");
    let hintless: Event = service.load("e1", None).await.unwrap().unwrap();
    assert_eq!(hintless.timestamp, day1);
    assert!(service.load::<Event>("e1", Some(day2)).await.unwrap().is_none());

    let clicks = service
        .query_count(&Condition::event_type("click"), "event")
        .await
        .unwrap();
    assert_eq!(clicks, 1);
}

#[tokio::test]
async fn test_routed_type_loads_through_search() {
    let mut config = test_config();
    config
        .persistence
        .routing_by_type
        .insert("session".to_string(), "profileId".to_string());
    config.persistence.daily_item_types.clear();
    let (_, service) = memory_service_with(config);

    let mut session = Session::new("s1", "p1", at(2024, 3, 1, 9));
    service.save(&mut session).await.unwrap();
    let loaded: Session = service.load("s1", None).await.unwrap().unwrap();
    assert_eq!(loaded.profile_id, "p1");
    assert!(service.remove::<Session>("s1").await.unwrap());
    assert!(service.load::<Session>("s1", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_daily_item_without_timestamp_is_rejected() {
    let mut config = test_config();
    config.persistence.daily_item_types.insert("profile".to_string());
    let (backend, service) = memory_service_with(config);

    let err = service.save(&mut profile("p1", json!({}))).await.unwrap_err();
    assert!(matches!(err, CdpError::MissingTimestamp { ref item_type, .. } if item_type == "profile"));
    assert_eq!(backend.created_index_count(), 0);
}

#[tokio::test]
async fn test_purge_drops_partitions_before_date() {
    let (backend, service) = memory_service();
    for (id, day) in [("e1", 1), ("e2", 2), ("e3", 3)] {
        service.save(&mut event(id, "view", at(2024, 3, day, 12))).await.unwrap();
    }

    let purged = service.purge_before(at(2024, 3, 2, 0)).await.unwrap();
    assert_eq!(purged, vec!["context-event-2024-03-01"]);
    assert!(!backend.index_exists("context-event-2024-03-01").await.unwrap());

    let remaining = service.query::<Event>(None, None, 0, 10).await.unwrap();
    assert_eq!(remaining.total_size, 2);

    // A purged day is recreated on the next write.
    service.save(&mut event("e4", "view", at(2024, 3, 1, 13))).await.unwrap();
    assert!(backend.index_exists("context-event-2024-03-01").await.unwrap());
}

#[tokio::test]
async fn test_purge_scope_and_remove_by_query() {
    let (_, service) = memory_service();
    for (id, scope) in [("a", "acme"), ("b", "acme"), ("c", "other")] {
        let mut p = profile(id, json!({"age": 30}));
        p.scope = Some(scope.to_string());
        service.save(&mut p).await.unwrap();
    }
    let mut e = event("e1", "view", at(2024, 3, 1, 9));
    e.scope = Some("acme".to_string());
    service.save(&mut e).await.unwrap();

    assert_eq!(service.purge_scope("acme").await.unwrap(), 3);
    let left = service.query::<Profile>(None, None, 0, 10).await.unwrap();
    assert_eq!(left.total_size, 1);
    assert_eq!(left.list[0].item_id, "c");

    let removed = service
        .remove_by_query(&Condition::property("properties.age", "equals", json!(30)), "profile")
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(service.query_count(&Condition::match_all(), "profile").await.unwrap(), 0);
}

#[tokio::test]
async fn test_mapping_conflict_is_skipped() {
    let (backend, service) = memory_service();
    service.save(&mut event("e1", "view", at(2024, 3, 1, 9))).await.unwrap();
    service.save(&mut event("e2", "view", at(2024, 3, 2, 9))).await.unwrap();
    backend
        .put_mapping("context-event-2024-03-01", &json!({"properties": {"revenue": {"type": "keyword"}}}))
        .await
        .unwrap();

    service
        .create_mapping("event", &json!({"properties": {"revenue": {"type": "double"}}}))
        .await
        .unwrap();

    let day2 = backend.get_mapping("context-event-2024-03-02").await.unwrap().unwrap();
    assert_eq!(day2["properties"]["revenue"]["type"], "double");
    let registered = service.get_mapping("event").await.unwrap();
    assert_eq!(registered["properties"]["revenue"]["type"], "double");

    // New partitions pick up the merged mapping.
    service.save(&mut event("e3", "view", at(2024, 3, 3, 9))).await.unwrap();
    let day3 = backend.get_mapping("context-event-2024-03-03").await.unwrap().unwrap();
    assert_eq!(day3["properties"]["revenue"]["type"], "double");
}

#[tokio::test]
async fn test_mapping_for_base_index_comes_from_store() {
    let (_, service) = memory_service();
    let before = service.get_mapping("profile").await.unwrap();
    assert_eq!(before["properties"]["segments"]["type"], "keyword");

    service
        .create_mapping("profile", &json!({"properties": {"nickname": {"type": "text"}}}))
        .await
        .unwrap();
    let after = service.get_mapping("profile").await.unwrap();
    assert_eq!(after["properties"]["nickname"]["type"], "text");
    assert_eq!(after["properties"]["itemId"]["type"], "keyword");
}

/// A non-tenant item type that still carries a scope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    #[serde(default)]
    item_id: String,
}

impl Item for NodeRecord {
    const ITEM_TYPE: &'static str = "clusterNode";

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn set_item_id(&mut self, id: String) {
        self.item_id = id;
    }

    fn scope(&self) -> Option<&str> {
        Some("acme")
    }
}

#[tokio::test]
async fn test_purge_scope_leaves_non_tenant_indices() {
    let (backend, service) = memory_service();
    let mut p = profile("a", json!({"age": 30}));
    p.scope = Some("acme".to_string());
    service.save(&mut p).await.unwrap();
    let mut node = NodeRecord { item_id: "node-a".to_string() };
    service.save(&mut node).await.unwrap();
    assert_eq!(backend.document_count("context-clusternode"), 1);

    assert_eq!(service.purge_scope("acme").await.unwrap(), 1);
    assert_eq!(backend.document_count("context-clusternode"), 1);
    assert!(service.load::<NodeRecord>("node-a", None).await.unwrap().is_some());
    assert!(!service.scoped_item_types().contains("clusterNode"));
}
