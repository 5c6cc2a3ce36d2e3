// tests/property/directory_test.rs

//! Property-based tests for the point directory
//! Tests that registrations stay consistent with the data source

use opcgate::core::driver::{DataSourceDriver, PointHandle, SimulatedDriver};
use opcgate::core::session::Directory;
use opcgate::core::value::DataType;
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Remove(usize),
    RemoveAll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..6usize).prop_map(Op::Add),
        2 => (0..6usize).prop_map(Op::Remove),
        1 => Just(Op::RemoveAll),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_directory_matches_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let driver = SimulatedDriver::new();
        let connection = driver.connect("Test.Simulation.1").unwrap();
        let group = driver.create_group(connection, 1000).unwrap();
        let mut directory = Directory::new();
        let mut model: HashMap<String, PointHandle> = HashMap::new();
        let mut retired: Vec<PointHandle> = Vec::new();

        for op in ops {
            match op {
                Op::Add(i) => {
                    let id = format!("TAG{i}");
                    let point = directory.add(&driver, group, &id, DataType::I4).unwrap();
                    match model.get(&id).copied() {
                        // Adding a known id returns the same registration.
                        Some(handle) => {
                            prop_assert_eq!(point.handle, handle);
                        }
                        // A fresh registration never reuses a retired handle.
                        None => {
                            prop_assert!(!retired.contains(&point.handle));
                            model.insert(id, point.handle);
                        }
                    }
                }
                Op::Remove(i) => {
                    let id = format!("TAG{i}");
                    let result = directory.remove(&driver, group, &id);
                    match model.remove(&id) {
                        Some(handle) => {
                            prop_assert!(result.is_ok());
                            retired.push(handle);
                        }
                        None => {
                            prop_assert!(result.is_err());
                        }
                    }
                }
                Op::RemoveAll => {
                    prop_assert!(directory.remove_all(&driver, group).is_ok());
                    retired.extend(model.drain().map(|(_, handle)| handle));
                }
            }

            prop_assert_eq!(directory.len(), model.len());
            prop_assert_eq!(driver.point_count(), model.len());
            for (id, handle) in &model {
                let point = directory.lookup(id);
                prop_assert_eq!(point.map(|p| p.handle), Some(*handle));
                prop_assert_eq!(
                    directory.find_by_handle(*handle).map(|p| p.id.as_str()),
                    Some(id.as_str())
                );
            }
        }
    }
}
