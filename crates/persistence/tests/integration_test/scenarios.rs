use serde_json::json;

use cdp_condition::Condition;
use cdp_core::{CdpError, Profile};

use crate::helpers::{fixture_profiles, memory_service, profile, save_all};

#[tokio::test]
async fn test_profile_age_scenario() {
    let (_, service) = memory_service();
    let mut p = profile("p1", json!({"age": 42}));
    service.save(&mut p).await.unwrap();

    let over_40 = Condition::property("properties.age", "greaterThan", json!(40));
    let page = service.query::<Profile>(Some(&over_40), None, 0, 10).await.unwrap();
    assert_eq!(page.total_size, 1);
    assert_eq!(page.list[0].item_id, "p1");
    assert_eq!(service.query_count(&over_40, "profile").await.unwrap(), 1);
    assert!(service.test_match(&over_40, &p).await.unwrap());

    let under_40 = Condition::property("properties.age", "lessThan", json!(40));
    assert_eq!(service.query_count(&under_40, "profile").await.unwrap(), 0);
    assert!(!service.test_match(&under_40, &p).await.unwrap());
}

#[tokio::test]
async fn test_nested_condition_matches_through_store() {
    let (_, service) = memory_service();
    let profiles = fixture_profiles();
    save_all(&service, &profiles).await;
    let eve = profiles.iter().find(|p| p.item_id == "p5").unwrap();
    let alice = profiles.iter().find(|p| p.item_id == "p1").unwrap();

    let keen_musician = Condition::nested(
        "properties.interests",
        Condition::and(vec![
            Condition::property("properties.interests.cat", "equals", json!("music")),
            Condition::property("properties.interests.level", "greaterThanOrEqualTo", json!(5)),
        ]),
    );
    let keen_athlete = Condition::nested(
        "properties.interests",
        Condition::and(vec![
            Condition::property("properties.interests.cat", "equals", json!("sport")),
            Condition::property("properties.interests.level", "greaterThanOrEqualTo", json!(5)),
        ]),
    );

    assert!(matches!(
        service.evaluators().evaluate_item(&keen_musician, eve),
        Err(CdpError::UnsupportedCondition(_))
    ));
    assert!(service.test_match(&keen_musician, eve).await.unwrap());
    assert!(!service.test_match(&keen_athlete, eve).await.unwrap());
    assert!(!service.test_match(&keen_musician, alice).await.unwrap());

    // Short-circuit before the nested branch stays in memory.
    let short = Condition::and(vec![
        Condition::property("properties.age", "lessThan", json!(0)),
        keen_musician.clone(),
    ]);
    assert!(!service.test_match(&short, eve).await.unwrap());
}
