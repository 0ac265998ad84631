use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use serde_json::json;

use cdp_condition::Condition;
use cdp_core::Profile;
use cdp_persistence::PersistenceService;

use crate::helpers::{fixture_profiles, memory_service, save_all};

fn ids(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Every operator against the fixture profiles, with the ids that must match.
fn cases() -> Vec<(Condition, BTreeSet<String>)> {
    let age = "properties.age";
    let name = "properties.name";
    let city = "properties.city";
    let tags = "properties.tags";
    let born = "properties.birthDate";
    let all = ids(&["p1", "p2", "p3", "p4", "p5"]);
    vec![
        (Condition::property(age, "greaterThan", json!(40)), ids(&["p1", "p5"])),
        (Condition::property(age, "greaterThanOrEqualTo", json!(40)), ids(&["p1", "p3", "p5"])),
        (Condition::property(age, "lessThan", json!(18)), ids(&["p2"])),
        (Condition::property(age, "lessThanOrEqualTo", json!(40)), ids(&["p2", "p3"])),
        (Condition::property(age, "equals", json!(42)), ids(&["p1"])),
        (Condition::property(age, "notEquals", json!(42)), ids(&["p2", "p3", "p4", "p5"])),
        (Condition::property_values(age, "between", vec![json!(18), json!(60)]), ids(&["p1", "p3"])),
        (Condition::property("properties.score", "greaterThan", json!(5.0)), ids(&["p1"])),
        (Condition::property(city, "equals", json!("Paris")), ids(&["p1", "p4"])),
        (Condition::property(city, "notEquals", json!("Paris")), ids(&["p2", "p3", "p5"])),
        (Condition::property(name, "contains", json!("ar")), ids(&["p3"])),
        (Condition::property(name, "contains", json!("*")), ids(&["p3"])),
        (Condition::property(name, "startsWith", json!("Ali")), ids(&["p1"])),
        (Condition::property(name, "endsWith", json!("Star")), ids(&["p3"])),
        (Condition::property(name, "matchesRegex", json!("[a-z]+")), ids(&["p2", "p4"])),
        (
            Condition::property_values(name, "inContains", vec![json!("li"), json!("ev")]),
            ids(&["p1"]),
        ),
        (
            Condition::property_values(city, "in", vec![json!("Paris"), json!("Lyon")]),
            ids(&["p1", "p2", "p4"]),
        ),
        (
            Condition::property_values(city, "notIn", vec![json!("Paris"), json!("Lyon")]),
            ids(&["p3", "p5"]),
        ),
        (
            Condition::property_values(tags, "all", vec![json!("vip"), json!("newsletter")]),
            ids(&["p1"]),
        ),
        (Condition::property_values(tags, "hasSomeOf", vec![json!("vip")]), ids(&["p1", "p4"])),
        (Condition::property_values(tags, "hasNoneOf", vec![json!("vip")]), ids(&["p2", "p3", "p5"])),
        (Condition::property_values(age, "in", vec![json!(17), json!(65)]), ids(&["p2", "p5"])),
        (Condition::property_check(city, "exists"), ids(&["p1", "p2", "p4", "p5"])),
        (Condition::property_check(city, "missing"), ids(&["p3"])),
        (Condition::property_check(tags, "exists"), ids(&["p1", "p2", "p4"])),
        (
            Condition::property_date(born, "lessThan", Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()),
            ids(&["p1", "p3"]),
        ),
        (
            Condition::property_date(born, "equals", Utc.with_ymd_and_hms(2007, 1, 15, 8, 0, 0).unwrap()),
            ids(&["p2"]),
        ),
        (Condition::property_date_expr(born, "greaterThan", "now-30y"), ids(&["p2"])),
        (Condition::match_all(), all.clone()),
        (Condition::ids(&["p1", "p4"], true), ids(&["p1", "p4"])),
        (Condition::ids(&["p1", "p4"], false), ids(&["p2", "p3", "p5"])),
        (
            Condition::and(vec![
                Condition::property(city, "equals", json!("Paris")),
                Condition::property_check(age, "exists"),
            ]),
            ids(&["p1"]),
        ),
        (
            Condition::or(vec![
                Condition::property(age, "lessThan", json!(18)),
                Condition::property(city, "equals", json!("Berlin")),
            ]),
            ids(&["p2", "p5"]),
        ),
        (
            Condition::not(Condition::property_values(tags, "in", vec![json!("vip")])),
            ids(&["p2", "p3", "p5"]),
        ),
        (Condition::and(vec![]), all),
        (Condition::or(vec![]), ids(&[])),
    ]
}

async fn query_ids(service: &PersistenceService, condition: &Condition) -> BTreeSet<String> {
    service
        .query::<Profile>(Some(condition), None, 0, 100)
        .await
        .unwrap()
        .list
        .into_iter()
        .map(|p| p.item_id)
        .collect()
}

fn evaluated_ids(service: &PersistenceService, condition: &Condition, profiles: &[Profile]) -> BTreeSet<String> {
    profiles
        .iter()
        .filter(|p| service.evaluators().evaluate_item(condition, *p).unwrap())
        .map(|p| p.item_id.clone())
        .collect()
}

#[tokio::test]
async fn test_evaluator_and_store_match_expected_sets() {
    let (_, service) = memory_service();
    let profiles = fixture_profiles();
    save_all(&service, &profiles).await;

    for (condition, expected) in cases() {
        assert_eq!(
            evaluated_ids(&service, &condition, &profiles),
            expected,
            "evaluator result for {}",
            condition
        );
        assert_eq!(query_ids(&service, &condition).await, expected, "store result for {}", condition);
    }
}

#[tokio::test]
async fn test_id_restricted_count_agrees_with_evaluation_per_item() {
    let (_, service) = memory_service();
    let profiles = fixture_profiles();
    save_all(&service, &profiles).await;

    for (condition, _) in cases() {
        for p in &profiles {
            let restricted = Condition::and(vec![Condition::ids(&[p.item_id.as_str()], true), condition.clone()]);
            let count = service.query_count(&restricted, "profile").await.unwrap();
            assert!(count <= 1, "id-restricted count {} for {} on {}", count, condition, p.item_id);
            let evaluated = service.evaluators().evaluate_item(&condition, p).unwrap();
            assert_eq!(count > 0, evaluated, "count vs evaluation for {} on {}", condition, p.item_id);
        }
    }
}

#[tokio::test]
async fn test_boolean_laws_hold_on_both_sides() {
    let (_, service) = memory_service();
    let profiles = fixture_profiles();
    save_all(&service, &profiles).await;

    let a = Condition::property("properties.age", "greaterThan", json!(30));
    let b = Condition::property("properties.city", "equals", json!("Paris"));

    let double_negation = Condition::not(Condition::not(a.clone()));
    let de_morgan_left = Condition::not(Condition::and(vec![a.clone(), b.clone()]));
    let de_morgan_right = Condition::or(vec![Condition::not(a.clone()), Condition::not(b.clone())]);
    let single_and = Condition::and(vec![b.clone()]);

    assert_eq!(query_ids(&service, &double_negation).await, query_ids(&service, &a).await);
    assert_eq!(
        query_ids(&service, &de_morgan_left).await,
        query_ids(&service, &de_morgan_right).await
    );
    assert_eq!(query_ids(&service, &single_and).await, query_ids(&service, &b).await);

    for p in &profiles {
        let eval = |c: &Condition| service.evaluators().evaluate_item(c, p).unwrap();
        assert_eq!(eval(&double_negation), eval(&a));
        assert_eq!(eval(&de_morgan_left), eval(&de_morgan_right));
        assert!(eval(&Condition::and(vec![])));
        assert!(!eval(&Condition::or(vec![])));
    }
}
