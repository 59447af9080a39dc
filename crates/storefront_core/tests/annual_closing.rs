mod common;

use common::{fields, live_ids, live_state, seed, FaultyStore};
use serde_json::json;
use std::thread;
use storefront_core::db::{open_db, open_db_in_memory};
use storefront_core::{
    ArchivalSnapshot, ClosingError, ClosingErrorKind, ClosingService, ClosingStatus, DocKey,
    DocumentStore, SourceCollection, SqliteDocumentStore, WriteBatch,
};

#[test]
fn closing_archives_only_records_of_the_target_year() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, SourceCollection::Orders, "o1", "2023-06-01T00:00:00Z", json!({"total": 40}));
    seed(&store, SourceCollection::Orders, "o2", "2024-01-01T00:00:00Z", json!({"total": 10}));
    let service = ClosingService::new(&store);

    let outcome = service.perform_annual_closing(2023).unwrap();

    assert_eq!(outcome.archived_count, 1);
    assert_eq!(live_ids(&store, SourceCollection::Orders), vec!["o2"]);
    let document = store.get(&DocKey::annual_closing(2023)).unwrap().unwrap();
    assert_eq!(
        document.fields["orders"],
        json!([{"id": "o1", "data": {"total": 40, "createdAt": "2023-06-01T00:00:00Z"}}])
    );
    assert_eq!(document.fields["year"], json!(2023));
}

#[test]
fn closing_buckets_date_only_timestamps_into_their_year() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, SourceCollection::Orders, "o1", "2023-06-01", json!({}));
    seed(&store, SourceCollection::Orders, "o2", "2024-01-01", json!({}));
    seed(&store, SourceCollection::Customers, "c1", "2023-12-31T23:59:59", json!({}));
    let service = ClosingService::new(&store);

    let outcome = service.perform_annual_closing(2023).unwrap();

    assert_eq!(outcome.archived_count, 2);
    assert_eq!(live_ids(&store, SourceCollection::Orders), vec!["o2"]);
    assert!(live_ids(&store, SourceCollection::Customers).is_empty());
}

#[test]
fn closing_covers_every_source_collection_and_timestamp_encoding() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, SourceCollection::Orders, "o1", "2022-01-01T00:00:00Z", json!({}));
    seed(&store, SourceCollection::Orders, "o2", "2022-12-31T23:59:59Z", json!({}));
    seed(&store, SourceCollection::Customers, "c1", "2022-03-03T10:00:00+02:00", json!({}));
    seed(&store, SourceCollection::Customers, "c2", "2021-12-31T23:59:59Z", json!({}));
    let mut batch = WriteBatch::new();
    batch
        .set(
            DocKey::source(SourceCollection::Promotions, "p1"),
            fields(json!({"createdAt": 1_656_633_600_000_i64, "code": "SUMMER"})),
        )
        .set(
            DocKey::source(SourceCollection::Admins, "a1"),
            fields(json!({"createdAt": {"seconds": 1_667_260_800_i64, "nanoseconds": 0}})),
        )
        .set(
            DocKey::source(SourceCollection::Admins, "a2"),
            fields(json!({"role": "owner"})),
        );
    store.commit(&batch).unwrap();
    let service = ClosingService::new(&store);

    let outcome = service.perform_annual_closing(2022).unwrap();

    assert_eq!(outcome.archived_count, 5);
    assert_eq!(outcome.counts[&SourceCollection::Orders], 2);
    assert_eq!(outcome.counts[&SourceCollection::Customers], 1);
    assert_eq!(outcome.counts[&SourceCollection::Promotions], 1);
    assert_eq!(outcome.counts[&SourceCollection::Admins], 1);

    let snapshot = ArchivalSnapshot::from_document(
        &store.get(&DocKey::annual_closing(2022)).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot.counts(), outcome.counts);
    assert!(live_ids(&store, SourceCollection::Orders).is_empty());
    assert_eq!(live_ids(&store, SourceCollection::Customers), vec!["c2"]);
    assert!(live_ids(&store, SourceCollection::Promotions).is_empty());
    assert_eq!(live_ids(&store, SourceCollection::Admins), vec!["a2"]);
}

#[test]
fn empty_year_is_rejected_without_side_effects() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, SourceCollection::Orders, "o1", "2023-06-01T00:00:00Z", json!({}));
    let before = live_state(&store);
    let service = ClosingService::new(&store);

    let err = service.perform_annual_closing(2021).unwrap_err();

    assert!(matches!(err, ClosingError::NothingToArchive { year: 2021 }));
    assert_eq!(err.kind(), ClosingErrorKind::EmptyOperation);
    assert_eq!(live_state(&store), before);
    assert!(store.list("annualClosings").unwrap().is_empty());
    assert_eq!(service.closing_status(2021).unwrap(), ClosingStatus::Open);
}

#[test]
fn closing_moves_status_to_closed_and_rejects_second_closing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, SourceCollection::Orders, "o1", "2023-06-01T00:00:00Z", json!({}));
    let service = ClosingService::new(&store);
    assert_eq!(service.closing_status(2023).unwrap(), ClosingStatus::Open);

    service.perform_annual_closing(2023).unwrap();
    assert_eq!(service.closing_status(2023).unwrap(), ClosingStatus::Closed);

    seed(&store, SourceCollection::Orders, "late", "2023-07-01T00:00:00Z", json!({}));
    let err = service.perform_annual_closing(2023).unwrap_err();
    assert!(matches!(
        err,
        ClosingError::AlreadyClosed {
            year: 2023,
            status: ClosingStatus::Closed
        }
    ));
    assert_eq!(err.kind(), ClosingErrorKind::Conflict);

    let snapshot = ArchivalSnapshot::from_document(
        &store.get(&DocKey::annual_closing(2023)).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot.total_records(), 1);
    assert_eq!(live_ids(&store, SourceCollection::Orders), vec!["late"]);
}

#[test]
fn large_purge_is_split_into_store_sized_batches() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn).with_max_batch_ops(8);
    for index in 0..20 {
        seed(
            &store,
            SourceCollection::Orders,
            &format!("o{index:02}"),
            "2023-02-01T00:00:00Z",
            json!({"index": index}),
        );
    }
    let service = ClosingService::new(&store);

    let outcome = service.perform_annual_closing(2023).unwrap();

    assert_eq!(outcome.archived_count, 20);
    assert_eq!(outcome.purge_batches, 3);
    assert!(live_ids(&store, SourceCollection::Orders).is_empty());
}

#[test]
fn failed_snapshot_write_purges_nothing() {
    let conn = open_db_in_memory().unwrap();
    let inner = SqliteDocumentStore::new(&conn);
    seed(&inner, SourceCollection::Orders, "o1", "2023-06-01T00:00:00Z", json!({}));
    let before = live_state(&inner);
    let service = ClosingService::new(FaultyStore::new(&inner, 1));

    let err = service.perform_annual_closing(2023).unwrap_err();

    assert_eq!(err.kind(), ClosingErrorKind::Storage);
    assert_eq!(live_state(&inner), before);
    assert!(inner.get(&DocKey::annual_closing(2023)).unwrap().is_none());
    assert_eq!(service.closing_status(2023).unwrap(), ClosingStatus::Open);
}

#[test]
fn failed_purge_leaves_year_in_closing_state() {
    let conn = open_db_in_memory().unwrap();
    let inner = SqliteDocumentStore::new(&conn);
    seed(&inner, SourceCollection::Orders, "o1", "2023-06-01T00:00:00Z", json!({}));
    let service = ClosingService::new(FaultyStore::new(&inner, 2));

    let err = service.perform_annual_closing(2023).unwrap_err();

    assert_eq!(err.kind(), ClosingErrorKind::Storage);
    assert!(inner.get(&DocKey::annual_closing(2023)).unwrap().is_some());
    assert_eq!(live_ids(&inner, SourceCollection::Orders), vec!["o1"]);
    assert_eq!(service.closing_status(2023).unwrap(), ClosingStatus::Closing);

    let retry = service.perform_annual_closing(2023).unwrap_err();
    assert!(matches!(
        retry,
        ClosingError::AlreadyClosed {
            status: ClosingStatus::Closing,
            ..
        }
    ));
}

#[test]
fn concurrent_closings_of_one_year_archive_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("closing.db");
    {
        let conn = open_db(&path).unwrap();
        let store = SqliteDocumentStore::new(&conn);
        for index in 0..50 {
            seed(
                &store,
                SourceCollection::Orders,
                &format!("o{index:02}"),
                "2023-05-05T00:00:00Z",
                json!({}),
            );
        }
    }

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = ClosingService::new(SqliteDocumentStore::new(&conn));
                service
                    .perform_annual_closing(2023)
                    .map(|outcome| outcome.archived_count)
                    .map_err(|err| err.kind())
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let successes: Vec<usize> = results.iter().filter_map(|r| r.clone().ok()).collect();
    assert_eq!(successes, vec![50]);
    for failure in results.iter().filter_map(|r| r.clone().err()) {
        assert!(matches!(
            failure,
            ClosingErrorKind::Conflict | ClosingErrorKind::EmptyOperation
        ));
    }

    let conn = open_db(&path).unwrap();
    let store = SqliteDocumentStore::new(&conn);
    let snapshot = ArchivalSnapshot::from_document(
        &store.get(&DocKey::annual_closing(2023)).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot.total_records(), 50);
    assert!(live_ids(&store, SourceCollection::Orders).is_empty());
}
