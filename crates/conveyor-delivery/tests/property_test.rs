//! Property-based tests for the backoff schedule and partial updates.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use conveyor_core::models::{
    ConfigId, EventType, QueueRowUpdate, WebhookQueueRow, WebhookStatus,
};
use conveyor_delivery::{retry, storage::mock::InMemoryQueueStore, QueueStore};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// For every tier, the jittered delay stays within ±25% of the base and
    /// never dips below one minute.
    #[test]
    fn backoff_delay_stays_within_bounds(retry_count in 0_i32..=6) {
        let base = retry::base_delay(retry_count).as_secs_f64();
        let delay = retry::backoff_delay(retry_count).as_secs_f64();

        prop_assert!(delay >= (base * 0.75).max(60.0), "delay {delay}s below bound");
        prop_assert!(delay <= base * 1.25 + 1e-6, "delay {delay}s above bound");
    }

    /// Absent update fields never overwrite persisted state; present fields
    /// always do.
    #[test]
    fn partial_update_preserves_absent_fields(
        set_status in proptest::option::of(0_u8..4),
        retry_count in proptest::option::of(0_i32..=6),
        next_retry_secs in proptest::option::of(0_i64..100_000),
        last_error in proptest::option::of("[a-z]{1,16}"),
        last_http_status in proptest::option::of(100_i32..600),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        runtime.block_on(async {
            let store = InMemoryQueueStore::new();
            let id = store
                .insert_row(WebhookQueueRow::new(
                    EventType::Credit,
                    "evt-prop".to_string(),
                    ConfigId(1),
                    "https://example.com/hook".to_string(),
                ))
                .await;

            let before = store.row(id).await.unwrap();

            let status = set_status.map(|s| match s {
                0 => WebhookStatus::Pending,
                1 => WebhookStatus::Processing,
                2 => WebhookStatus::Completed,
                _ => WebhookStatus::Failed,
            });
            let next_retry_at =
                next_retry_secs.map(|s| Utc.timestamp_opt(s, 0).single().unwrap());

            let update = QueueRowUpdate {
                status,
                retry_count,
                next_retry_at,
                last_error: last_error.clone(),
                last_http_status,
                ..Default::default()
            };
            store.update(id, update).await.unwrap();

            let after = store.row(id).await.unwrap();

            match status {
                Some(s) => prop_assert_eq!(after.status, s),
                None => prop_assert_eq!(after.status, before.status),
            }
            match retry_count {
                Some(n) => prop_assert_eq!(after.retry_count, n),
                None => prop_assert_eq!(after.retry_count, before.retry_count),
            }
            match next_retry_at {
                Some(t) => prop_assert_eq!(after.next_retry_at, t),
                None => prop_assert_eq!(after.next_retry_at, before.next_retry_at),
            }
            match last_error {
                Some(e) => prop_assert_eq!(after.last_error.as_deref(), Some(e.as_str())),
                None => prop_assert_eq!(after.last_error, before.last_error),
            }
            match last_http_status {
                Some(code) => prop_assert_eq!(after.last_http_status, Some(code)),
                None => prop_assert_eq!(after.last_http_status, before.last_http_status),
            }

            // Fields never named by the update are always untouched.
            prop_assert_eq!(after.webhook_url, before.webhook_url);
            prop_assert_eq!(after.event_id, before.event_id);
            prop_assert_eq!(after.created_at, before.created_at);
            prop_assert_eq!(after.deleted_at, before.deleted_at);

            Ok(())
        })?;
    }

    /// Claiming at tier k only ever yields rows whose retry_count is k.
    #[test]
    fn claim_yields_only_matching_tier(
        tiers in proptest::collection::vec(0_i32..=6, 1..20),
        claim_tier in 0_i32..=6,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        runtime.block_on(async {
            let store = Arc::new(InMemoryQueueStore::new());
            for (i, tier) in tiers.iter().enumerate() {
                let mut row = WebhookQueueRow::new(
                    EventType::Debit,
                    format!("evt-{i}"),
                    ConfigId(1),
                    "https://example.com/hook".to_string(),
                );
                row.retry_count = *tier;
                store.insert_row(row).await;
            }

            while let Some(row) = store.claim_next(claim_tier).await.unwrap() {
                prop_assert_eq!(row.retry_count, claim_tier);
                prop_assert_eq!(row.status, WebhookStatus::Processing);
            }

            Ok(())
        })?;
    }
}
