use std::sync::Arc;

use serde_json::json;

use cdp_condition::Condition;
use cdp_core::{CdpError, Event, Profile};
use cdp_persistence::PersistenceService;

use crate::helpers::{at, event, memory_service, profile, test_config, StallingBackend};

#[tokio::test(start_paused = true)]
async fn test_stalled_backend_times_out() {
    let mut config = test_config();
    config.search.request_timeout_ms = 250;
    let service = PersistenceService::from_config(&config, Arc::new(StallingBackend)).unwrap();

    let condition = Condition::property("properties.age", "greaterThan", json!(40));
    let err = service
        .query::<Profile>(Some(&condition), None, 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, CdpError::BackendTimeout(250)));

    let err = service.save(&mut profile("p1", json!({}))).await.unwrap_err();
    assert!(matches!(err, CdpError::BackendTimeout(250)));

    let err = service.load::<Profile>("p1", None).await.unwrap_err();
    assert!(err.is_backend_failure());
}

#[tokio::test]
async fn test_unreachable_partition_yields_partial_results() {
    let (backend, service) = memory_service();
    service.save(&mut event("e1", "view", at(2024, 3, 1, 9))).await.unwrap();
    service.save(&mut event("e2", "view", at(2024, 3, 2, 9))).await.unwrap();
    backend.set_unavailable("context-event-2024-03-02", true);

    let page = service.query::<Event>(None, None, 0, 10).await.unwrap();
    assert_eq!(page.total_size, 1);
    assert_eq!(page.list[0].item_id, "e1");

    let count = service.query_count(&Condition::event_type("view"), "event").await.unwrap();
    assert_eq!(count, 1);

    backend.set_unavailable("context-event-2024-03-01", true);
    let err = service.query::<Event>(None, None, 0, 10).await.unwrap_err();
    assert!(matches!(err, CdpError::BackendUnavailable(_)));
}

#[tokio::test]
async fn test_offline_backend_is_unavailable_not_empty() {
    let (backend, service) = memory_service();
    service.save(&mut profile("p1", json!({"age": 42}))).await.unwrap();
    backend.set_offline(true);

    let condition = Condition::property("properties.age", "greaterThan", json!(40));
    assert!(matches!(
        service.query_count(&condition, "profile").await,
        Err(CdpError::BackendUnavailable(_))
    ));
    assert!(matches!(
        service.load::<Profile>("p1", None).await,
        Err(CdpError::BackendUnavailable(_))
    ));

    // The in-memory evaluator needs no backend.
    let p = profile("p1", json!({"age": 42}));
    assert!(service.test_match(&condition, &p).await.unwrap());
}

#[tokio::test]
async fn test_unknown_condition_type_fails_before_backend() {
    let (backend, service) = memory_service();
    backend.set_offline(true);
    let bogus = Condition::and(vec![
        Condition::match_all(),
        Condition::new("noSuchCondition"),
    ]);
    assert!(matches!(
        service.query::<Profile>(Some(&bogus), None, 0, 10).await,
        Err(CdpError::UnknownConditionType(t)) if t == "noSuchCondition"
    ));
    assert!(matches!(
        service.test_match(&bogus, &profile("p", json!({}))).await,
        Err(CdpError::UnknownConditionType(_))
    ));
}
