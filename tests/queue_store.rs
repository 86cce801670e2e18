use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use fitsync::{
    mutation::{Mutation, MutationError},
    persist::{memory::MemoryMedium, sqlite::SqliteMedium},
    queue::{QUEUE_KEY, QueueError, QueueStore},
    state::SyncState,
    types::{Action, Fields, MutationId, RowId},
};

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().expect("object")
}

#[test]
fn list_returns_enqueue_order() {
    let queue = QueueStore::new(MemoryMedium::new());

    let a = queue
        .enqueue(Mutation::insert("workouts", fields(json!({"id": 1, "name": "Run"}))))
        .expect("insert");
    let b = queue
        .enqueue(Mutation::update("workouts", 1, fields(json!({"name": "Long run"}))))
        .expect("update");
    let c = queue.enqueue(Mutation::delete("sets", "s-9")).expect("delete");

    let listed = queue.list();
    let ids: Vec<MutationId> = listed.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
    assert_eq!(listed[1].action(), Action::Update);
    assert_eq!(listed[1].mutation().row_id(), Some(&RowId::Int(1)));
    assert_eq!(listed[2].resource(), "sets");
    assert_eq!(queue.size(), 3);
}

#[test]
fn dequeue_of_absent_id_leaves_storage_untouched() {
    let medium = MemoryMedium::new();
    let queue = QueueStore::new(medium.clone());
    let rec = queue.enqueue(Mutation::delete("foods", 4)).expect("enqueue");
    let before = medium.get_raw(QUEUE_KEY).expect("persisted");

    medium.fail_writes(Some("must not write"));
    queue.dequeue(MutationId::new()).expect("absent id is a no-op");
    assert_eq!(medium.get_raw(QUEUE_KEY), Some(before));

    medium.fail_writes(None);
    queue.dequeue(rec.id()).expect("dequeue");
    queue.dequeue(rec.id()).expect("second dequeue is a no-op");
    assert!(queue.is_empty());
}

#[test]
fn corrupt_storage_reads_as_empty_and_is_overwritten() {
    let medium = MemoryMedium::new();
    medium.put_raw(QUEUE_KEY, "{definitely not a queue");
    let queue = QueueStore::new(medium.clone());

    assert!(queue.list().is_empty());
    assert_eq!(queue.size(), 0);

    queue.enqueue(Mutation::delete("foods", 1)).expect("enqueue");
    assert_eq!(queue.size(), 1);
}

#[test]
fn undecodable_entries_are_salvaged_around() {
    let medium = MemoryMedium::new();
    let scratch = QueueStore::new(MemoryMedium::new());
    let good = scratch.enqueue(Mutation::delete("foods", 2)).expect("enqueue");
    let raw = serde_json::to_vec(&json!([
        {"resource": "foods", "action": "explode"},
        serde_json::to_value(&good).expect("encode"),
        42,
    ]))
    .expect("raw");
    medium.put_raw(QUEUE_KEY, raw);

    let queue = QueueStore::new(medium);
    let listed = queue.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), good.id());
}

#[test]
fn write_failure_surfaces_and_keeps_previous_contents() {
    let medium = MemoryMedium::new();
    let queue = QueueStore::new(medium.clone());
    let kept = queue.enqueue(Mutation::delete("foods", 1)).expect("enqueue");

    medium.fail_writes(Some("disk full"));
    let err = queue
        .enqueue(Mutation::delete("foods", 2))
        .expect_err("write must fail");
    assert!(matches!(err, QueueError::Storage(_)), "got {err:?}");
    assert!(matches!(queue.dequeue(kept.id()), Err(QueueError::Storage(_))));

    medium.fail_writes(None);
    let ids: Vec<MutationId> = queue.list().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![kept.id()]);
}

#[test]
fn read_failure_propagates_on_writes_but_not_on_list() {
    let medium = MemoryMedium::new();
    let queue = QueueStore::new(medium.clone());
    queue.enqueue(Mutation::delete("foods", 1)).expect("enqueue");

    medium.fail_reads(true);
    assert!(queue.list().is_empty());
    assert!(matches!(
        queue.enqueue(Mutation::delete("foods", 2)),
        Err(QueueError::Storage(_))
    ));

    medium.fail_reads(false);
    assert_eq!(queue.size(), 1);
}

#[test]
fn untyped_payloads_are_validated_before_enqueue() {
    let queue = QueueStore::new(MemoryMedium::new());

    let err = queue
        .enqueue_payload("foods", Action::Delete, fields(json!({"name": "apple"})))
        .expect_err("delete needs an id");
    assert!(matches!(
        err,
        QueueError::Mutation(MutationError::MissingRowId { .. })
    ));
    assert!(queue.is_empty());

    let rec = queue
        .enqueue_payload("foods", Action::Update, fields(json!({"id": "f-1", "kcal": 52})))
        .expect("update");
    assert_eq!(rec.mutation().row_id(), Some(&RowId::Text("f-1".into())));
    assert_eq!(rec.mutation().payload().get("kcal"), Some(&json!(52)));
}

#[test]
fn clear_empties_and_publishes_zero() {
    let state = Arc::new(SyncState::new());
    let queue = QueueStore::with_state(MemoryMedium::new(), Arc::clone(&state));

    queue.enqueue(Mutation::delete("foods", 1)).expect("enqueue");
    queue.enqueue(Mutation::delete("foods", 2)).expect("enqueue");
    assert_eq!(state.snapshot().pending_count, 2);

    queue.clear().expect("clear");
    assert!(queue.is_empty());
    assert_eq!(state.snapshot().pending_count, 0);
}

#[test]
fn sqlite_queue_survives_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("queue.db");
    let synced_at = Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).single().expect("ts");

    let expected = {
        let queue = QueueStore::new(SqliteMedium::open(&db_path).expect("open"));
        let ids: Vec<MutationId> = (0..3)
            .map(|i| {
                queue
                    .enqueue(Mutation::update("meals", i, fields(json!({"kcal": i * 100}))))
                    .expect("enqueue")
                    .id()
            })
            .collect();
        queue.mark_synced(synced_at).expect("mark synced");
        ids
    };

    let queue = QueueStore::new(SqliteMedium::open(&db_path).expect("reopen"));
    let ids: Vec<MutationId> = queue.list().iter().map(|r| r.id()).collect();
    assert_eq!(ids, expected);
    assert_eq!(queue.last_sync_at(), Some(synced_at));
}

#[test]
fn concurrent_writers_do_not_lose_updates() {
    let queue = Arc::new(QueueStore::new(MemoryMedium::new()));

    let per_thread: Vec<Vec<MutationId>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                s.spawn(move || {
                    (0..25)
                        .map(|i| {
                            queue
                                .enqueue(Mutation::delete("sets", t * 100 + i))
                                .expect("enqueue")
                                .id()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("join"))
            .collect()
    });
    assert_eq!(queue.size(), 100);

    std::thread::scope(|s| {
        for ids in &per_thread {
            let queue = Arc::clone(&queue);
            s.spawn(move || {
                for id in ids.iter().step_by(2) {
                    queue.dequeue(*id).expect("dequeue");
                }
            });
        }
    });
    assert_eq!(queue.size(), 48);

    let survivors: Vec<MutationId> = queue.list().iter().map(|r| r.id()).collect();
    for ids in &per_thread {
        for id in ids.iter().skip(1).step_by(2) {
            assert!(survivors.contains(id));
        }
    }
}

#[test]
fn unreadable_mutations_are_refused_instead_of_lost() {
    let medium = MemoryMedium::new();
    let queue = QueueStore::new(medium.clone());
    let kept = queue.enqueue(Mutation::delete("foods", 1)).expect("enqueue");
    let before = medium.get_raw(QUEUE_KEY);

    let err = queue
        .enqueue(Mutation::insert("", fields(json!({"a": 1}))))
        .expect_err("empty resource");
    assert!(matches!(err, QueueError::Mutation(MutationError::EmptyResource)));
    assert_eq!(medium.get_raw(QUEUE_KEY), before);

    let rec = queue
        .enqueue(Mutation::update(
            "profiles",
            5,
            fields(json!({"id": null, "name": "Luc"})),
        ))
        .expect("update");

    let ids: Vec<MutationId> = queue.list().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![kept.id(), rec.id()]);
}

#[test]
fn update_keeps_its_row_id_through_storage() {
    let queue = QueueStore::new(MemoryMedium::new());
    queue
        .enqueue(Mutation::update(
            "profiles",
            5,
            fields(json!({"id": 6, "name": "Luc"})),
        ))
        .expect("enqueue");

    let listed = queue.list();
    assert_eq!(listed[0].mutation().row_id(), Some(&RowId::Int(5)));
    assert_eq!(
        listed[0].mutation(),
        &Mutation::update("profiles", 5, fields(json!({"name": "Luc"})))
    );
}
