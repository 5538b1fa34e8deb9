//! Store-level tests: append-only guarantees, ordering, search escaping.

use tempfile::TempDir;

use fragmentarium::config::{Config, DbConfig};
use fragmentarium::db;
use fragmentarium::migrate;
use fragmentarium::models::{NewFragment, SourceType};
use fragmentarium::store::{FragmentStore, StoreError};

async fn test_store() -> (TempDir, FragmentStore) {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: tmp.path().join("data").join("frag.sqlite"),
        },
        ..Default::default()
    };
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    (tmp, FragmentStore::new(pool))
}

fn text_fragment(content: &str) -> NewFragment<'_> {
    NewFragment {
        content,
        source: Some("notes.txt"),
        source_type: Some(SourceType::Text),
        source_page: None,
        ingestion_batch_id: Some("batch-1"),
    }
}

#[tokio::test]
async fn ids_are_assigned_in_increasing_order() {
    let (_tmp, store) = test_store().await;

    let a = store.insert(text_fragment("first")).await.unwrap();
    let b = store.insert(text_fragment("second")).await.unwrap();
    let c = store.insert(text_fragment("third")).await.unwrap();

    assert!(a < b && b < c, "ids not increasing: {} {} {}", a, b, c);
}

#[tokio::test]
async fn empty_content_is_rejected_before_storage() {
    let (_tmp, store) = test_store().await;

    for content in ["", "   ", "\n\t  \n"] {
        let err = store.insert(text_fragment(content)).await.unwrap_err();
        assert!(
            matches!(err, StoreError::Validation(_)),
            "expected validation error for {:?}, got {:?}",
            content,
            err
        );
    }
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn list_is_newest_first_and_paginated() {
    let (_tmp, store) = test_store().await;

    for i in 1..=5 {
        store
            .insert(text_fragment(&format!("fragment number {}", i)))
            .await
            .unwrap();
    }

    let page1 = store.list(2, 0).await.unwrap();
    let page2 = store.list(2, 2).await.unwrap();
    let ids1: Vec<i64> = page1.iter().map(|f| f.id).collect();
    let ids2: Vec<i64> = page2.iter().map(|f| f.id).collect();
    assert_eq!(ids1, vec![5, 4]);
    assert_eq!(ids2, vec![3, 2]);
}

#[tokio::test]
async fn search_treats_wildcards_as_literals() {
    let (_tmp, store) = test_store().await;

    store.insert(text_fragment("progress at 100% done")).await.unwrap();
    store.insert(text_fragment("plain progress note")).await.unwrap();
    store.insert(text_fragment("under_score token")).await.unwrap();

    let hits = store.search("100%", 10, 0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("100%"));

    // `_` matches any char in raw LIKE; escaped it must match only itself.
    let hits = store.search("under_score", 10, 0).await.unwrap();
    assert_eq!(hits.len(), 1);

    let hits = store.search("underXscore", 10, 0).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn get_by_ids_returns_ascending_and_omits_missing() {
    let (_tmp, store) = test_store().await;

    let a = store.insert(text_fragment("alpha")).await.unwrap();
    let b = store.insert(text_fragment("beta")).await.unwrap();
    let c = store.insert(text_fragment("gamma")).await.unwrap();

    let got = store.get_by_ids(&[c, 9999, a, b]).await.unwrap();
    let ids: Vec<i64> = got.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![a, b, c]);

    let none = store.get_by_ids(&[]).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn provenance_survives_the_round_trip() {
    let (_tmp, store) = test_store().await;

    let id = store
        .insert(NewFragment {
            content: "row content",
            source: Some("table.csv"),
            source_type: Some(SourceType::Csv),
            source_page: Some(3),
            ingestion_batch_id: Some("batch-xyz"),
        })
        .await
        .unwrap();

    let got = store.get_by_ids(&[id]).await.unwrap();
    assert_eq!(got.len(), 1);
    let fragment = &got[0];
    assert_eq!(fragment.source.as_deref(), Some("table.csv"));
    assert_eq!(fragment.source_type, Some(SourceType::Csv));
    assert_eq!(fragment.source_page, Some(3));
    assert_eq!(fragment.ingestion_batch_id.as_deref(), Some("batch-xyz"));
    assert!(fragment.created_at > 0);
}

#[tokio::test]
async fn updates_are_rejected_at_the_database_level() {
    let (_tmp, store) = test_store().await;

    let id = store.insert(text_fragment("original")).await.unwrap();

    let result = sqlx::query("UPDATE fragments SET content = 'tampered' WHERE id = ?")
        .bind(id)
        .execute(store.pool())
        .await;
    assert!(result.is_err(), "UPDATE should be blocked by trigger");

    let got = store.get_by_ids(&[id]).await.unwrap();
    assert_eq!(got[0].content, "original");
}

#[tokio::test]
async fn deletes_are_rejected_at_the_database_level() {
    let (_tmp, store) = test_store().await;

    let id = store.insert(text_fragment("keeper")).await.unwrap();

    let result = sqlx::query("DELETE FROM fragments WHERE id = ?")
        .bind(id)
        .execute(store.pool())
        .await;
    assert!(result.is_err(), "DELETE should be blocked by trigger");
    assert_eq!(store.count().await.unwrap(), 1);
}
