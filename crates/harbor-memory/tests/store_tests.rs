#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    use harbor_core::{Clock, HarborError, ManualClock, MemoryCollection, MemoryRecord, Tier};
    use harbor_memory::MemoryStore;

    fn make_store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
        let store = MemoryStore::open_in_memory(Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    // ── Record CRUD ────────────────────────────────────────────

    #[test]
    fn test_create_and_get_roundtrip() {
        let (store, clock) = make_store();
        let record = MemoryRecord::new("u1", Tier::Personal, "prefers mornings")
            .with_attr("category", serde_json::json!("preference"));
        let id = store.create(record).unwrap();

        let loaded = store.get("u1", id).unwrap();
        assert_eq!(loaded.owner_id, "u1");
        assert_eq!(loaded.tier, Tier::Personal);
        assert_eq!(loaded.content, "prefers mornings");
        assert_eq!(
            loaded.attributes.get("category"),
            Some(&serde_json::json!("preference"))
        );
        assert_eq!(loaded.created_at, clock.now());
        assert_eq!(loaded.last_accessed_at, clock.now());
        assert!(loaded.embedding.is_none());
    }

    #[test]
    fn test_tier_survives_storage_unchanged() {
        let (store, _) = make_store();
        for tier in Tier::ALL {
            let id = store
                .create(MemoryRecord::new("u1", tier, "content"))
                .unwrap();
            assert_eq!(store.get("u1", id).unwrap().tier, tier);
        }
    }

    #[test]
    fn test_create_rejects_empty_owner() {
        let (store, _) = make_store();
        let err = store
            .create(MemoryRecord::new("", Tier::Task, "content"))
            .unwrap_err();
        assert!(matches!(err, HarborError::InvalidArgument(_)));
    }

    #[test]
    fn test_get_absent_is_not_found() {
        let (store, _) = make_store();
        let err = store.get("u1", uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, HarborError::NotFound(_)));
    }

    #[test]
    fn test_get_wrong_owner_is_access_denied() {
        let (store, _) = make_store();
        let id = store
            .create(MemoryRecord::new("u1", Tier::Personal, "private"))
            .unwrap();
        let err = store.get("u2", id).unwrap_err();
        assert!(matches!(err, HarborError::AccessDenied { .. }));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _) = make_store();
        let id = store
            .create(MemoryRecord::new("u1", Tier::Task, "ephemeral"))
            .unwrap();
        store.delete("u1", id).unwrap();
        // Second delete of an absent record succeeds silently
        store.delete("u1", id).unwrap();
        assert!(matches!(
            store.get("u1", id).unwrap_err(),
            HarborError::NotFound(_)
        ));
    }

    #[test]
    fn test_delete_wrong_owner_refused() {
        let (store, _) = make_store();
        let id = store
            .create(MemoryRecord::new("u1", Tier::Task, "mine"))
            .unwrap();
        let err = store.delete("u2", id).unwrap_err();
        assert!(matches!(err, HarborError::AccessDenied { .. }));
        // Record untouched
        assert!(store.get("u1", id).is_ok());
    }

    // ── Owner cascade ──────────────────────────────────────────

    #[test]
    fn test_cascade_deletes_records_and_collections() {
        let (store, _) = make_store();
        for tier in Tier::ALL {
            store
                .create(MemoryRecord::new("u1", tier, "to be purged"))
                .unwrap();
        }
        store
            .create_collection(MemoryCollection::new("u1", "goals", "fitness"))
            .unwrap();
        let keep = store
            .create(MemoryRecord::new("u2", Tier::Personal, "other owner"))
            .unwrap();

        let deleted = store.delete_all_for_owner("u1").unwrap();
        assert_eq!(deleted, 3);
        assert!(store.count_by_tier("u1").unwrap().is_empty());
        assert!(store.list_collections("u1").unwrap().is_empty());
        // Other owner's space untouched
        assert!(store.get("u2", keep).is_ok());
    }

    // ── Listing & counting ─────────────────────────────────────

    #[test]
    fn test_list_recent_orders_newest_first() {
        let (store, clock) = make_store();
        for label in ["oldest", "middle", "newest"] {
            store
                .create(MemoryRecord::new("u1", Tier::Task, label))
                .unwrap();
            clock.advance(Duration::hours(1));
        }
        let recent = store.list_recent("u1", Tier::Task, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "newest");
        assert_eq!(recent[1].content, "middle");
    }

    #[test]
    fn test_list_by_tier_and_age_only_older() {
        let (store, clock) = make_store();
        store
            .create(MemoryRecord::new("u1", Tier::Task, "old"))
            .unwrap();
        clock.advance(Duration::days(10));
        store
            .create(MemoryRecord::new("u1", Tier::Task, "new"))
            .unwrap();

        let cutoff = clock.now() - Duration::days(5);
        let old = store
            .list_by_tier_and_age("u1", Tier::Task, cutoff, 100)
            .unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].content, "old");
    }

    #[test]
    fn test_count_by_tier() {
        let (store, _) = make_store();
        store
            .create(MemoryRecord::new("u1", Tier::Personal, "a"))
            .unwrap();
        store
            .create(MemoryRecord::new("u1", Tier::Task, "b"))
            .unwrap();
        store
            .create(MemoryRecord::new("u1", Tier::Task, "c"))
            .unwrap();
        let counts = store.count_by_tier("u1").unwrap();
        assert_eq!(counts.get(&Tier::Personal), Some(&1));
        assert_eq!(counts.get(&Tier::Task), Some(&2));
        assert_eq!(counts.get(&Tier::Project), None);
    }

    // ── Owner isolation on queries ─────────────────────────────

    #[test]
    fn test_queries_never_cross_owners() {
        let (store, _) = make_store();
        store
            .create(MemoryRecord::new("u1", Tier::Personal, "u1 memory"))
            .unwrap();
        store
            .create(MemoryRecord::new("u2", Tier::Personal, "u2 memory"))
            .unwrap();

        let u1 = store.list_recent("u1", Tier::Personal, 10).unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].owner_id, "u1");
    }

    // ── Embeddings & touch ─────────────────────────────────────

    #[test]
    fn test_embedding_roundtrip() {
        let (store, _) = make_store();
        let id = store
            .create(
                MemoryRecord::new("u1", Tier::Personal, "embedded")
                    .with_embedding(vec![0.25, -1.5, 3.0]),
            )
            .unwrap();
        let loaded = store.get("u1", id).unwrap();
        assert_eq!(loaded.embedding, Some(vec![0.25, -1.5, 3.0]));
    }

    #[test]
    fn test_missing_embedding_backfill() {
        let (store, _) = make_store();
        let id = store
            .create(MemoryRecord::new("u1", Tier::Task, "deferred"))
            .unwrap();

        let pending = store.list_missing_embeddings("u1", 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        store.set_embedding("u1", id, &[1.0, 2.0]).unwrap();
        assert!(store.list_missing_embeddings("u1", 10).unwrap().is_empty());
        assert_eq!(store.get("u1", id).unwrap().embedding, Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_set_embedding_wrong_owner_refused() {
        let (store, _) = make_store();
        let id = store
            .create(MemoryRecord::new("u1", Tier::Task, "mine"))
            .unwrap();
        let err = store.set_embedding("u2", id, &[1.0]).unwrap_err();
        assert!(matches!(err, HarborError::AccessDenied { .. }));
    }

    #[test]
    fn test_touch_updates_last_accessed_only() {
        let (store, clock) = make_store();
        let id = store
            .create(MemoryRecord::new("u1", Tier::Personal, "touched"))
            .unwrap();
        let created = store.get("u1", id).unwrap().created_at;

        clock.advance(Duration::hours(3));
        store.touch("u1", &[id]).unwrap();

        let loaded = store.get("u1", id).unwrap();
        assert_eq!(loaded.created_at, created);
        assert_eq!(loaded.last_accessed_at, clock.now());
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let (store, _) = make_store();
        let v0 = store.tier_version("u1", Tier::Task);
        let id = store
            .create(MemoryRecord::new("u1", Tier::Task, "v"))
            .unwrap();
        let v1 = store.tier_version("u1", Tier::Task);
        assert!(v1 > v0);
        store.delete("u1", id).unwrap();
        assert!(store.tier_version("u1", Tier::Task) > v1);
    }

    #[test]
    fn test_stressor_scan_finds_flagged_personal_records() {
        let (store, _) = make_store();
        for i in 0..3 {
            store
                .create(
                    MemoryRecord::new("u1", Tier::Personal, format!("stressor {i}"))
                        .with_attr("stressor", serde_json::json!(true)),
                )
                .unwrap();
        }
        store
            .create(MemoryRecord::new("u1", Tier::Personal, "likes jazz"))
            .unwrap();
        // Flagged but wrong tier: not a stressor for policy purposes.
        store
            .create(
                MemoryRecord::new("u1", Tier::Task, "deadline chatter")
                    .with_attr("stressor", serde_json::json!(true)),
            )
            .unwrap();

        let stressors = store.list_stressors("u1", 10).unwrap();
        assert_eq!(stressors.len(), 3);
        assert!(stressors.iter().all(|r| r.tier == Tier::Personal));

        assert_eq!(store.list_stressors("u1", 2).unwrap().len(), 2);
        assert!(store.list_stressors("u2", 10).unwrap().is_empty());
    }

    // ── Durability ─────────────────────────────────────────────

    #[test]
    fn test_records_survive_reopen() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.db");

        let id = {
            let store = MemoryStore::open(&path, Arc::new(clock.clone())).unwrap();
            store
                .create(
                    MemoryRecord::new("u1", Tier::Personal, "prefers mornings")
                        .with_embedding(vec![0.5, 0.25]),
                )
                .unwrap()
        };

        let store = MemoryStore::open(&path, Arc::new(clock.clone())).unwrap();
        let loaded = store.get("u1", id).unwrap();
        assert_eq!(loaded.content, "prefers mornings");
        assert_eq!(loaded.embedding.as_deref(), Some(&[0.5, 0.25][..]));
    }

    // ── Collections ────────────────────────────────────────────

    #[test]
    fn test_collection_crud() {
        let (store, _) = make_store();
        let mut collection = MemoryCollection::new("u1", "goals", "running");
        collection.description = Some("5k training".into());
        let id = store.create_collection(collection).unwrap();

        let loaded = store.get_collection("u1", id).unwrap();
        assert_eq!(loaded.name, "running");
        assert_eq!(loaded.description.as_deref(), Some("5k training"));

        assert!(matches!(
            store.get_collection("u2", id).unwrap_err(),
            HarborError::AccessDenied { .. }
        ));

        store.delete_collection("u1", id).unwrap();
        store.delete_collection("u1", id).unwrap(); // idempotent
        assert!(store.list_collections("u1").unwrap().is_empty());
    }
}
