//! Property-based tests for grouping and draft migration.
//!
//! These use proptest to check the invariants over generated item lists
//! instead of hand-picked fixtures.

use std::collections::HashSet;

use proptest::prelude::*;
use purchase_request_core::errors::ServiceError;
use purchase_request_core::models::{LineItem, Unit};
use purchase_request_core::services::drafts::migrate_draft;
use purchase_request_core::services::grouping::{detect_conflicts, group_items};
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn unit_strategy() -> impl Strategy<Value = Unit> {
    prop_oneof![Just(Unit::Adet), Just(Unit::Kg), Just(Unit::Metre)]
}

fn item_strategy() -> impl Strategy<Value = LineItem> {
    (
        prop_oneof!["A", "B", "C"],
        prop_oneof!["J1", "J2", "J3", "J4"],
        1u32..500,
        unit_strategy(),
        prop_oneof!["", "DN50"],
        prop_oneof!["", "galvaniz"],
    )
        .prop_map(|(code, job, quantity, unit, specifications, description)| {
            let mut item = LineItem::new(
                code.clone(),
                format!("Malzeme {}", code),
                job,
                Decimal::from(quantity),
                unit,
            );
            item.specifications = specifications.to_string();
            item.item_description = description.to_string();
            item
        })
}

/// Everything that must match for two rows to count as the same job's line
fn conflict_key(item: &LineItem) -> (String, String, String, String, String) {
    (
        item.code.clone(),
        item.name.clone(),
        item.job_no.clone(),
        item.specifications.clone(),
        item.item_description.clone(),
    )
}

/// Items whose conflict keys never repeat, so grouping always succeeds
fn mergeable_items() -> impl Strategy<Value = Vec<LineItem>> {
    prop::collection::vec(item_strategy(), 0..12).prop_map(|items| {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(conflict_key(item)))
            .collect()
    })
}

type RecordShape = (String, String, String, Unit, Decimal, Vec<(String, Decimal)>);

/// Order-free view of a grouping: each record with its sorted allocation pairs
fn record_shapes(items: &[LineItem]) -> Vec<RecordShape> {
    let mut shapes: Vec<RecordShape> = group_items(items)
        .unwrap()
        .items
        .into_iter()
        .map(|record| {
            let mut pairs: Vec<(String, Decimal)> = record
                .allocations
                .into_iter()
                .map(|a| (a.job_no, a.quantity))
                .collect();
            pairs.sort();
            (
                record.code,
                record.specifications,
                record.item_description,
                record.unit,
                record.quantity,
                pairs,
            )
        })
        .collect();
    shapes.sort();
    shapes
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn grouping_preserves_total_quantity_per_unit(items in mergeable_items()) {
        let grouped = group_items(&items).unwrap();
        for unit in [Unit::Adet, Unit::Kg, Unit::Metre] {
            let before: Decimal = items.iter().filter(|i| i.unit == unit).map(|i| i.quantity).sum();
            let after: Decimal = grouped.items.iter().filter(|i| i.unit == unit).map(|i| i.quantity).sum();
            prop_assert_eq!(before, after);
        }
    }

    #[test]
    fn every_row_maps_to_a_record_with_its_job(items in mergeable_items()) {
        let grouped = group_items(&items).unwrap();
        prop_assert_eq!(grouped.original_index_to_grouped_index.len(), items.len());
        for (index, item) in items.iter().enumerate() {
            let record = &grouped.items[grouped.original_index_to_grouped_index[index]];
            prop_assert_eq!(&record.code, &item.code);
            prop_assert_eq!(record.unit, item.unit);
            prop_assert!(record.job_numbers().any(|job| job == item.job_no));
        }
    }

    #[test]
    fn allocations_sum_to_the_record_quantity(items in mergeable_items()) {
        let grouped = group_items(&items).unwrap();
        for record in &grouped.items {
            let allocated: Decimal = record.allocations.iter().map(|a| a.quantity).sum();
            prop_assert_eq!(allocated, record.quantity);
        }
    }

    #[test]
    fn grouping_is_independent_of_row_order(
        (items, shuffled) in mergeable_items()
            .prop_flat_map(|items| (Just(items.clone()), Just(items).prop_shuffle()))
    ) {
        prop_assert_eq!(record_shapes(&items), record_shapes(&shuffled));
    }

    #[test]
    fn repeated_job_rows_are_always_reported(items in prop::collection::vec(item_strategy(), 0..12)) {
        let mut seen = HashSet::new();
        let has_duplicate = items.iter().any(|i| !seen.insert(conflict_key(i)));

        prop_assert_eq!(!detect_conflicts(&items).is_empty(), has_duplicate);
        prop_assert_eq!(
            matches!(group_items(&items), Err(ServiceError::ItemConflict(_))),
            has_duplicate
        );
    }

    #[test]
    fn both_copies_of_a_repeated_row_are_reported(
        (items, source, position) in prop::collection::vec(item_strategy(), 1..10)
            .prop_flat_map(|items| {
                let len = items.len();
                (Just(items), 0..len, 0..=len)
            }),
        quantity in 1u32..500,
    ) {
        let mut items = items;
        let mut copy = items[source].clone();
        copy.quantity = Decimal::from(quantity);
        items.insert(position, copy);
        let original = if position <= source { source + 1 } else { source };

        let Err(ServiceError::ItemConflict(report)) = group_items(&items) else {
            return Err(TestCaseError::fail("repeated row was merged"));
        };
        let indices = report.indices();
        prop_assert!(indices.contains(&position), "{:?} misses {}", indices, position);
        prop_assert!(indices.contains(&original), "{:?} misses {}", indices, original);
    }

    #[test]
    fn migration_is_idempotent(
        use_legacy_recommendations in any::<bool>(),
        use_specs in any::<bool>(),
        supplier_currency in prop_oneof!["TRY", "USD", "EUR"],
    ) {
        let mut item = json!({"code": "A", "name": "Boru", "job_no": "J1", "quantity": 1});
        if use_specs {
            item["specs"] = json!("DN50");
        }
        let mut document = json!({
            "items": [item],
            "suppliers": [{"id": "s1", "name": "Acme", "currency": supplier_currency}]
        });
        if use_legacy_recommendations {
            document["itemRecommendations"] = json!({"0": "s1"});
        }

        let mut once = document.clone();
        migrate_draft(&mut once);
        let mut twice = once.clone();
        prop_assert_eq!(migrate_draft(&mut twice), 0);
        prop_assert_eq!(&once, &twice);

        let root = once.as_object().unwrap();
        prop_assert!(!root.contains_key("itemRecommendations"));
        prop_assert_eq!(&once["suppliers"][0]["default_currency"], &Value::from(supplier_currency));
        prop_assert!(once["items"][0].get("specs").is_none());
    }
}
