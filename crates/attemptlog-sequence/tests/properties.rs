use std::collections::BTreeMap;
use std::sync::Arc;

use attemptlog_core::types::{DeliveryMode, KeyedPatch, Patch, ProcessStartPayload};
use attemptlog_sequence::UnifiedLogSequence;
use chrono::{DateTime, Utc};
use proptest::prelude::*;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-02-25T12:00:00Z")
        .expect("valid RFC3339")
        .with_timezone(&Utc)
}

/// Patches with explicit timestamps drawn from a small range so ties are common.
fn timed_patch() -> impl Strategy<Value = KeyedPatch> {
    (0u8..4, 0u8..16, 0i64..20).prop_map(|(pid, key, ts)| {
        KeyedPatch::new(format!("p{pid}"), format!("k{key}"), Patch::stdout(format!("{ts}")))
            .with_ts(ts)
    })
}

fn batch() -> impl Strategy<Value = Vec<KeyedPatch>> {
    prop::collection::vec(timed_patch(), 0..40)
}

/// Mix of timed lines, untimed lines and process starts, so the fallback
/// clock and start-time seeding are exercised.
fn any_patch() -> impl Strategy<Value = KeyedPatch> {
    prop_oneof![
        timed_patch(),
        (0u8..4, 0u8..16).prop_map(|(pid, key)| {
            KeyedPatch::new(format!("p{pid}"), format!("u{key}"), Patch::stdout("untimed"))
        }),
        (0u8..4, 0u32..30).prop_map(|(pid, secs)| {
            KeyedPatch::new(
                format!("p{pid}"),
                "process-start",
                Patch::process_start(ProcessStartPayload {
                    process_id: format!("p{pid}"),
                    run_reason: "codingagent".into(),
                    started_at: format!("2026-02-25T11:59:{secs:02}Z"),
                    status: "running".into(),
                    action: None,
                }),
            )
        }),
    ]
}

fn mixed_batch() -> impl Strategy<Value = Vec<KeyedPatch>> {
    prop::collection::vec(any_patch(), 0..40)
}

fn live_mode() -> impl Strategy<Value = DeliveryMode> {
    prop::sample::select(vec![DeliveryMode::Running, DeliveryMode::Historic])
}

fn mode() -> impl Strategy<Value = DeliveryMode> {
    prop::sample::select(DeliveryMode::ALL.to_vec())
}

proptest! {
    #[test]
    fn feed_is_always_sorted(batches in prop::collection::vec((mixed_batch(), mode()), 1..6)) {
        let mut seq = UnifiedLogSequence::default();
        for (patches, mode) in batches {
            seq.ingest_at(patches, mode, false, now());
        }

        let entries = seq.entries();
        for pair in entries.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.ts <= b.ts);
            if a.ts == b.ts {
                prop_assert!((&a.process_id, &a.patch_key) < (&b.process_id, &b.patch_key));
            }
        }
    }

    #[test]
    fn reingesting_present_patches_is_noop(
        patches in mixed_batch(),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut seq = UnifiedLogSequence::default();
        seq.ingest_at(patches.clone(), DeliveryMode::Initial, false, now());
        prop_assume!(!patches.is_empty());

        let before = seq.entries();
        let replay = patches[pick.index(patches.len())].clone();
        let report = seq.ingest_at(vec![replay], DeliveryMode::Running, false, now());

        prop_assert_eq!(report.accepted, 0);
        prop_assert!(Arc::ptr_eq(&before, &seq.entries()));
    }

    #[test]
    fn initial_equals_sorted_dedup_of_batch(prior in batch(), patches in batch()) {
        let mut seq = UnifiedLogSequence::default();
        seq.ingest_at(prior, DeliveryMode::Running, false, now());
        seq.ingest_at(patches.clone(), DeliveryMode::Initial, false, now());

        // First delivery of a (process, key) pair wins.
        let mut expected: BTreeMap<(i64, String, String), String> = BTreeMap::new();
        let mut seen = std::collections::HashSet::new();
        for p in &patches {
            if seen.insert((p.execution_process_id.clone(), p.patch_key.clone())) {
                let ts = p.ts.expect("timed");
                expected.insert(
                    (ts, p.execution_process_id.clone(), p.patch_key.clone()),
                    p.entry_id(),
                );
            }
        }

        let actual: Vec<String> = seq.entries().iter().map(|e| e.id.clone()).collect();
        let expected: Vec<String> = expected.into_values().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn untimed_arrival_order_is_kept_within_a_process(
        batches in prop::collection::vec((1usize..6, live_mode(), batch()), 1..8),
    ) {
        let mut seq = UnifiedLogSequence::default();
        let mut arrived = Vec::new();
        for (untimed, mode, noise) in batches {
            // Timed output from other processes interleaves with the untimed stream.
            let mut patches = noise;
            for _ in 0..untimed {
                let key = format!("line-{}", arrived.len());
                arrived.push(key.clone());
                patches.push(KeyedPatch::new("stream", key, Patch::stdout("untimed")));
            }
            seq.ingest_at(patches, mode, false, now());
        }

        let order: Vec<String> = seq
            .entries()
            .iter()
            .filter(|e| e.process_id == "stream")
            .map(|e| e.patch_key.clone())
            .collect();
        prop_assert_eq!(order, arrived);
    }
}
