use std::collections::BTreeSet;

use serde_json::json;

use cdp_condition::Condition;
use cdp_core::Profile;

use crate::helpers::{memory_service, profile};

#[tokio::test]
async fn test_pages_cover_matches_exactly_once() {
    let (_, service) = memory_service();
    for i in 0..23 {
        let mut p = profile(&format!("p{:02}", i), json!({"age": i}));
        service.save(&mut p).await.unwrap();
    }

    let mut seen = BTreeSet::new();
    for offset in (0..30).step_by(5) {
        let page = service
            .query::<Profile>(None, Some("itemId"), offset, 5)
            .await
            .unwrap();
        assert_eq!(page.total_size, 23, "total must not depend on paging");
        assert!(page.len() <= 5);
        assert!(page.len() as u64 <= page.total_size);
        assert_eq!(page.offset, offset);
        for p in page.list {
            assert!(seen.insert(p.item_id), "item returned twice");
        }
    }
    assert_eq!(seen.len(), 23);
}

#[tokio::test]
async fn test_sorted_query_with_condition() {
    let (_, service) = memory_service();
    for (id, age) in [("a", 30), ("b", 50), ("c", 45), ("d", 20)] {
        service.save(&mut profile(id, json!({"age": age}))).await.unwrap();
    }

    let adults = Condition::property("properties.age", "greaterThanOrEqualTo", json!(30));
    let page = service
        .query::<Profile>(Some(&adults), Some("properties.age:desc"), 0, 2)
        .await
        .unwrap();
    let ids: Vec<&str> = page.list.iter().map(|p| p.item_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(page.total_size, 3);
    assert!(page.has_more());

    let rest = service
        .query::<Profile>(Some(&adults), Some("properties.age:desc"), 2, 2)
        .await
        .unwrap();
    assert_eq!(rest.list[0].item_id, "a");
    assert!(!rest.has_more());
}

#[tokio::test]
async fn test_query_by_field_and_values() {
    let (_, service) = memory_service();
    for (id, city) in [("a", "Paris"), ("b", "Lyon"), ("c", "Paris"), ("d", "Nice")] {
        service.save(&mut profile(id, json!({"city": city}))).await.unwrap();
    }

    let paris = service
        .query_by_field::<Profile>("properties.city", json!("Paris"), Some("itemId"), 0, 10)
        .await
        .unwrap();
    assert_eq!(paris.total_size, 2);
    assert_eq!(paris.list[0].item_id, "a");

    let south = service
        .query_by_values::<Profile>("properties.city", vec![json!("Lyon"), json!("Nice")], Some("itemId:desc"), 0, 10)
        .await
        .unwrap();
    let ids: Vec<&str> = south.list.iter().map(|p| p.item_id.as_str()).collect();
    assert_eq!(ids, vec!["d", "b"]);
}

#[tokio::test]
async fn test_page_past_the_end_is_empty_with_total() {
    let (_, service) = memory_service();
    service.save(&mut profile("only", json!({}))).await.unwrap();
    let page = service.query::<Profile>(None, None, 10, 5).await.unwrap();
    assert!(page.is_empty());
    assert_eq!(page.total_size, 1);
}
