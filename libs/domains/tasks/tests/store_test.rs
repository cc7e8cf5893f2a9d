//! Postgres store against a real database.

use chrono::{TimeZone, Utc};
use domain_tasks::*;
use test_utils::TestDatabase;
use tokio_util::sync::CancellationToken;

fn create_params(description: &str) -> CreateParams {
    CreateParams {
        description: description.to_string(),
        priority: Priority::Medium,
        dates: Dates {
            start: Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()),
            due: Some(Utc.with_ymd_and_hms(2025, 3, 7, 17, 30, 0).unwrap()),
        },
    }
}

#[tokio::test]
async fn test_create_then_find() {
    let db = TestDatabase::new().await;
    let store = PgTaskStore::new(db.connection());
    let cancel = CancellationToken::new();

    let created = store
        .create(&cancel, create_params("Water the plants"))
        .await
        .unwrap();
    assert!(!created.id.is_empty());
    assert!(!created.is_done);

    let found = store.find(&cancel, &created.id).await.unwrap();
    assert_eq!(found, created);
}

#[tokio::test]
async fn test_update_replaces_mutable_fields() {
    let db = TestDatabase::new().await;
    let store = PgTaskStore::new(db.connection());
    let cancel = CancellationToken::new();

    let created = store
        .create(&cancel, create_params("Water the plants"))
        .await
        .unwrap();

    store
        .update(
            &cancel,
            &created.id,
            UpdateParams {
                description: "Water the plants twice".to_string(),
                priority: Priority::High,
                dates: Dates::default(),
                is_done: true,
            },
        )
        .await
        .unwrap();

    let found = store.find(&cancel, &created.id).await.unwrap();
    assert_eq!(found.description, "Water the plants twice");
    assert_eq!(found.priority, Priority::High);
    assert_eq!(found.dates, Dates::default());
    assert!(found.is_done);
}

#[tokio::test]
async fn test_delete_is_not_repeatable() {
    let db = TestDatabase::new().await;
    let store = PgTaskStore::new(db.connection());
    let cancel = CancellationToken::new();

    let created = store
        .create(&cancel, create_params("Renew passport"))
        .await
        .unwrap();

    store.delete(&cancel, &created.id).await.unwrap();

    let err = store.delete(&cancel, &created.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = store.find(&cancel, &created.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_unknown_ids() {
    let db = TestDatabase::new().await;
    let store = PgTaskStore::new(db.connection());
    let cancel = CancellationToken::new();

    let err = store
        .find(&cancel, "6f1c1f1e-0000-4000-8000-000000000000")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = store
        .update(&cancel, "not-a-uuid", UpdateParams::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}
