//! Collection behaviour against an in-memory `SQLite` database.
//!
//! No external services are needed; run with `cargo test -p tabula-store`.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

mod common;

use chrono::TimeDelta;
use serde::Deserialize;
use tabula_store::{
    Filter, FilterCondition, FilterExpression, Operator, Record, Sort, StoreError, Value,
    with_advanced_filter, with_fields, with_filter, with_pagination, with_sort,
};

use common::{epoch, org, store};

#[derive(Debug, Deserialize)]
struct Organisation {
    id: String,
    name: String,
    seats: i64,
    active: bool,
    settings: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[tokio::test]
async fn create_stamps_id_and_timestamps() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");

    let created = orgs
        .create_record(org("Acme", 1).with("settings", serde_json::json!({"sso": true})))
        .await
        .expect("create");

    assert_eq!(created.string("id"), "org_1");
    assert_eq!(created.time("created_at"), epoch());
    assert_eq!(created.time("updated_at"), epoch());
    assert!(created.bool("active"), "column default applied");
    assert_eq!(
        created.get("settings"),
        Some(&Value::Json(serde_json::json!({"sso": true})))
    );

    let typed: Organisation = orgs.get_as("org_1").await.expect("decode");
    assert_eq!(typed.id, "org_1");
    assert_eq!(typed.name, "Acme");
    assert_eq!(typed.seats, 1);
    assert!(typed.active);
    assert_eq!(typed.settings, Some(serde_json::json!({"sso": true})));
    assert_eq!(typed.created_at, epoch());
}

#[tokio::test]
async fn explicit_ids_are_kept() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");

    let created = orgs
        .create_record(org("Initech", 1).with("id", "custom"))
        .await
        .expect("create");
    assert_eq!(created.string("id"), "custom");
}

#[tokio::test]
async fn missing_rows_are_not_found() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");

    assert!(orgs.get_record("nope").await.err().is_some_and(|e| e.is_not_found()));
    assert!(
        orgs.find_one(Filter::new().eq("name", "Nobody"))
            .await
            .err()
            .is_some_and(|e| e.is_not_found())
    );
    assert!(
        orgs.update_record("nope", Record::new().with("name", "x"))
            .await
            .err()
            .is_some_and(|e| e.is_not_found())
    );
    assert!(orgs.delete_record("nope").await.err().is_some_and(|e| e.is_not_found()));
    assert_eq!(
        orgs.delete_records(Filter::new().eq("name", "Nobody")).await.ok(),
        Some(0)
    );
}

#[tokio::test]
async fn update_record_sets_only_supplied_fields() {
    let (store, clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");
    orgs.create_record(org("Acme", 4)).await.expect("create");

    clock.advance(TimeDelta::minutes(5));
    let updated = orgs
        .update_record("org_1", Record::new().with("seats", 10).with("id", "hijack"))
        .await
        .expect("update");

    assert_eq!(updated.string("id"), "org_1");
    assert_eq!(updated.int64("seats"), 10);
    assert_eq!(updated.string("name"), "Acme");
    assert_eq!(updated.string("plan"), "pro");
    assert_eq!(updated.time("created_at"), epoch());
    assert_eq!(updated.time("updated_at"), epoch() + TimeDelta::minutes(5));
}

#[tokio::test]
async fn pagination_reports_metadata() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");
    for seq in 0..35 {
        orgs.create_record(org(&format!("Org {seq}"), seq))
            .await
            .expect("create");
    }

    let page = orgs
        .find([with_sort([Sort::asc("seq")]), with_pagination(10, 20)])
        .await
        .expect("find");
    let meta = page.meta.expect("metadata");
    assert_eq!(page.records.len(), 10);
    assert_eq!(meta.total, 35);
    assert_eq!(meta.limit, 10);
    assert_eq!(meta.offset, 20);
    assert_eq!(meta.total_pages, 4);
    assert_eq!(page.records[0].int64("seq"), 20);

    let last = orgs
        .find([with_sort([Sort::asc("seq")]), with_pagination(10, 30)])
        .await
        .expect("find");
    assert_eq!(last.records.len(), 5);

    let unpaged = orgs.find([]).await.expect("find");
    assert_eq!(unpaged.records.len(), 35);
    assert!(unpaged.meta.is_none());

    let pro = orgs
        .find([with_filter(Filter::new().eq("plan", "pro")), with_pagination(5, 0)])
        .await
        .expect("find");
    assert_eq!(pro.meta.map(|m| m.total), Some(18));
    assert_eq!(pro.meta.map(|m| m.total_pages), Some(4));
}

#[tokio::test]
async fn advanced_filters_sort_and_project() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");
    for (seq, name) in ["Acme", "acme labs", "Globex", "Initech"].iter().enumerate() {
        let seq = i64::try_from(seq).expect("small");
        orgs.create_record(org(name, seq)).await.expect("create");
    }

    let matches = orgs
        .find([
            with_advanced_filter(FilterExpression::or([
                FilterExpression::condition("name", Operator::ILike, "acme%"),
                FilterCondition::is_in("name", ["Initech"]).into(),
            ])),
            with_sort([Sort::desc("seq")]),
            with_fields(["name"]),
        ])
        .await
        .expect("find");

    let names: Vec<String> = matches.records.iter().map(|r| r.string("name")).collect();
    assert_eq!(names, ["Initech", "acme labs", "Acme"]);
    assert!(matches.records.iter().all(|r| r.len() == 1), "projection applied");

    assert_eq!(orgs.count(Filter::new()).await.ok(), Some(4));
    assert_eq!(
        orgs.count(FilterExpression::condition("seq", Operator::Gte, 2)).await.ok(),
        Some(2)
    );
    assert_eq!(orgs.exists(Filter::new().eq("name", "Globex")).await.ok(), Some(true));
    assert_eq!(orgs.exists(Filter::new().eq("name", "Hooli")).await.ok(), Some(false));
}

#[tokio::test]
async fn bulk_update_and_delete_report_counts() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");
    for seq in 0..6 {
        orgs.create_record(org("Org", seq)).await.expect("create");
    }

    let changed = orgs
        .update(Record::new().with("seats", 50), Filter::new().eq("plan", "pro"))
        .await
        .expect("update");
    assert_eq!(changed, 3);
    assert_eq!(orgs.count(Filter::new().eq("seats", 50)).await.ok(), Some(3));

    let deleted = orgs
        .delete_records(Filter::new().eq("plan", "free"))
        .await
        .expect("delete");
    assert_eq!(deleted, 3);
    assert_eq!(orgs.count(Filter::new()).await.ok(), Some(3));

    orgs.delete_record("org_1").await.expect("delete one");
    assert_eq!(orgs.count(Filter::new()).await.ok(), Some(2));
}

#[tokio::test]
async fn unscoped_bulk_writes_are_refused() {
    let (store, _clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");
    orgs.create_record(org("Acme", 1)).await.expect("create");

    assert!(matches!(
        orgs.delete_records(Filter::new()).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        orgs.delete_records(FilterExpression::and([])).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        orgs.update(
            Record::new().with("seats", 0),
            FilterExpression::or([
                FilterExpression::condition("name", Operator::Eq, "Acme"),
                FilterExpression::and([]),
            ])
        )
        .await,
        Err(StoreError::Validation(_))
    ));
    assert_eq!(orgs.count(Filter::new()).await.ok(), Some(1));
    assert_eq!(orgs.count(Filter::new().eq("seats", 1)).await.ok(), Some(1));
}

#[tokio::test]
async fn sub_second_timestamps_compare_in_time_order() {
    let (store, clock) = store().await;
    let orgs = store.collection("organisations").expect("collection");

    orgs.create_record(org("On the second", 1)).await.expect("create");
    clock.advance(TimeDelta::milliseconds(500));
    orgs.create_record(org("Half a second later", 2)).await.expect("create");

    assert_eq!(
        orgs.count(FilterExpression::condition("created_at", Operator::Gt, epoch()))
            .await
            .ok(),
        Some(1)
    );
    assert_eq!(
        orgs.count(FilterExpression::condition("created_at", Operator::Lte, epoch()))
            .await
            .ok(),
        Some(1)
    );

    let newest_first = orgs
        .find([with_sort([Sort::desc("created_at")])])
        .await
        .expect("find");
    let names: Vec<String> = newest_first.records.iter().map(|r| r.string("name")).collect();
    assert_eq!(names, ["Half a second later", "On the second"]);
    assert_eq!(
        newest_first.records[0].time("created_at"),
        epoch() + TimeDelta::milliseconds(500)
    );
}

#[tokio::test]
async fn hostile_input_is_contained() {
    let (store, _clock) = store().await;
    assert!(matches!(
        store.collection("organisations; DROP TABLE organisations"),
        Err(StoreError::Validation(_))
    ));

    let orgs = store.collection("organisations").expect("collection");
    let hostile = "x'); DROP TABLE organisations; --";
    orgs.create_record(org(hostile, 1)).await.expect("create");
    let found = orgs
        .find_one(Filter::new().eq("name", hostile))
        .await
        .expect("find");
    assert_eq!(found.string("name"), hostile);

    assert!(matches!(
        orgs.create_record(Record::new().with("name\" TEXT); --", "x")).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        orgs.find([with_sort([Sort::asc("seq DESC; --")])]).await,
        Err(StoreError::Validation(_))
    ));
    assert_eq!(orgs.count(Filter::new()).await.ok(), Some(1));
}

#[tokio::test]
async fn slow_statements_time_out() {
    let limit = std::time::Duration::from_millis(20);
    let backend = common::Slow::new(std::time::Duration::from_secs(5)).await;
    let store = tabula_store::Store::with_backend(backend)
        .with_statement_timeout(limit)
        .build();
    store.exec(common::SCHEMA).await.expect("apply schema");
    let orgs = store.collection("organisations").expect("collection");

    let started = std::time::Instant::now();
    let result = orgs.get_record("org_1").await;
    assert!(matches!(result, Err(StoreError::Timeout(d)) if d == limit));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
