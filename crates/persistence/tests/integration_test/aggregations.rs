use serde_json::json;

use cdp_condition::Condition;
use cdp_persistence::{Aggregate, DateInterval, PersistenceService};

use crate::helpers::{at, event, memory_service};

async fn seed(service: &PersistenceService) {
    let rows = [
        ("e1", "view", 1, Some("books")),
        ("e2", "view", 1, Some("books")),
        ("e3", "click", 1, Some("books")),
        ("e4", "view", 2, Some("music")),
        ("e5", "click", 3, None),
        ("e6", "view", 3, None),
    ];
    for (id, kind, day, category) in rows {
        let mut e = event(id, kind, at(2024, 3, day, 10));
        if let Some(c) = category {
            e = e.with_property("category", json!(c));
        }
        service.save(&mut e).await.unwrap();
    }
}

#[tokio::test]
async fn test_terms_aggregation_flattens_with_missing() {
    let (_, service) = memory_service();
    seed(&service).await;

    let counts = service
        .aggregate_query(None, Some(&Aggregate::terms("properties.category")), "event")
        .await
        .unwrap();
    let keys: Vec<&str> = counts.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_all", "books", "music", "_missing"]);
    assert_eq!(counts["_all"], 6);
    assert_eq!(counts["books"], 3);
    assert_eq!(counts["music"], 1);
    assert_eq!(counts["_missing"], 2);
}

#[tokio::test]
async fn test_filtered_aggregation_reads_inside_filter() {
    let (_, service) = memory_service();
    seed(&service).await;

    let views = Condition::event_type("view");
    let counts = service
        .aggregate_query(Some(&views), Some(&Aggregate::terms("properties.category")), "event")
        .await
        .unwrap();
    assert_eq!(counts["_all"], 6);
    assert_eq!(counts["_filtered"], 4);
    assert_eq!(counts["books"], 2);
    assert_eq!(counts["music"], 1);
    assert_eq!(counts["_missing"], 1);

    let clicks_with_category = Condition::and(vec![
        Condition::event_type("click"),
        Condition::property_check("properties.category", "exists"),
    ]);
    let counts = service
        .aggregate_query(Some(&clicks_with_category), Some(&Aggregate::terms("properties.category")), "event")
        .await
        .unwrap();
    assert_eq!(counts["_filtered"], 1);
    assert!(!counts.contains_key("_missing"), "zero missing count is not reported");
    assert!(!counts.contains_key("music"), "zero buckets are not reported");
}

#[tokio::test]
async fn test_date_aggregation_keys_by_interval() {
    let (_, service) = memory_service();
    seed(&service).await;

    let by_day = service
        .aggregate_query(None, Some(&Aggregate::date("timeStamp", DateInterval::Day)), "event")
        .await
        .unwrap();
    assert_eq!(by_day["2024-03-01"], 3);
    assert_eq!(by_day["2024-03-02"], 1);
    assert_eq!(by_day["2024-03-03"], 2);
    assert!(!by_day.contains_key("_missing"));

    let by_month = service
        .aggregate_query(None, Some(&Aggregate::date("timeStamp", DateInterval::Month)), "event")
        .await
        .unwrap();
    assert_eq!(by_month["2024-03"], 6);

    let by_week = service
        .aggregate_query(None, Some(&Aggregate::date("timeStamp", DateInterval::Week)), "event")
        .await
        .unwrap();
    // 2024-03-01 to 03 fall in the week starting Monday 2024-02-26.
    assert_eq!(by_week["2024-02-26"], 6);
    assert_eq!(by_week.len(), 2);
}

#[tokio::test]
async fn test_aggregation_without_data_or_buckets() {
    let (_, service) = memory_service();
    let empty = service.aggregate_query(None, None, "event").await.unwrap();
    assert_eq!(empty["_all"], 0);

    seed(&service).await;
    let only_total = service.aggregate_query(None, None, "event").await.unwrap();
    assert_eq!(only_total.len(), 1);
    assert_eq!(only_total["_all"], 6);
}
