// tests/property/pipeline_test.rs

//! Property-based tests for the change notification pipeline
//! Tests that only genuine changes are forwarded, in receipt order

use opcgate::core::driver::{ChangeBatch, PointHandle};
use opcgate::core::notifications::{ChangePipeline, ItemValue};
use opcgate::core::value::{Quality, Value};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

fn change_strategy() -> impl Strategy<Value = (u32, i32, u16)> {
    (0..5u32, 0..3i32, any::<u16>())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_emits_exactly_the_transitions(
        batches in prop::collection::vec(
            prop::collection::vec(change_strategy(), 1..8),
            1..20
        )
    ) {
        let pipeline = ChangePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::<ItemValue>::new()));
        let sink = seen.clone();
        pipeline.set_handler(move |changes| sink.lock().extend_from_slice(changes));

        let mut model: HashMap<u32, (i32, u16)> = HashMap::new();
        let mut expected = Vec::new();

        for batch in batches {
            for &(handle, value, quality) in &batch {
                let masked = quality & 0xC0;
                let changed = model.get(&handle).is_none_or(|(v, _)| *v != value);
                model.insert(handle, (value, masked));
                if changed {
                    expected.push((handle, value, masked));
                }
            }
            let batch = ChangeBatch::from_changes(batch.into_iter().map(|(h, v, q)| {
                (PointHandle(h), Value::I4(v), Quality::from_raw(q))
            }));
            pipeline.on_data_change(batch).unwrap();
        }

        let emitted: Vec<(u32, i32, u16)> = seen
            .lock()
            .iter()
            .map(|c| match c.value {
                Value::I4(v) => (c.handle.0, v, c.quality.raw()),
                _ => unreachable!("only I4 values are pushed"),
            })
            .collect();
        prop_assert_eq!(emitted, expected);

        // The cache holds the last value and quality of every handle.
        for (handle, (value, quality)) in model {
            prop_assert_eq!(
                pipeline.latest(PointHandle(handle)),
                Some((Value::I4(value), Quality::from_raw(quality)))
            );
        }
    }
}
