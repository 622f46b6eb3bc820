// Property tests for identity stability, filter round trips, and ordering.
// CI: 128 cases. Soak: PROPTEST_CASES=5000 cargo test --release

use std::cmp::Ordering;

use proptest::prelude::*;

use gridsift_engine::edit::CellPos;
use gridsift_engine::sort::natural_cmp;
use gridsift_engine::{Record, RecordId, Session, SessionOptions};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"[A-C]-[A-Z]{2,4}",
        2 => r"Item [0-9]{1,3}",
        1 => Just(String::new()),
    ]
}

fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((arb_text(), arb_text(), -500i32..500), 1..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(name, layer, n)| {
                Record::new()
                    .with("Name", name)
                    .with("Layer", layer)
                    .with("Rotation", f64::from(n))
            })
            .collect()
    })
}

#[derive(Debug, Clone)]
enum Op {
    Query(String),
    Click(usize, bool),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop_oneof![
            Just("".to_string()),
            Just("a-*".to_string()),
            Just("layer:b,-layer:b".to_string()),
            Just("rotation>0".to_string()),
            Just("-name:item rot<100".to_string()),
            Just("\"item 1\"".to_string()),
            r"[a-c]{1,2}",
        ]
        .prop_map(Op::Query),
        (0usize..3, any::<bool>()).prop_map(|(c, shift)| Op::Click(c, shift)),
    ]
}

fn columns() -> Vec<String> {
    vec!["Name".into(), "Layer".into(), "Rotation".into()]
}

fn apply(s: &mut Session, op: &Op) {
    match op {
        Op::Query(q) => s.set_query(q),
        Op::Click(c, shift) => {
            let column = columns()[*c].clone();
            s.click_header(&column, *shift);
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    /// Every visible row maps to the same record it mapped to at load,
    /// whatever filtering and sorting happened in between.
    #[test]
    fn identities_survive_filter_and_sort(records in arb_records(), ops in prop::collection::vec(arb_op(), 0..12)) {
        let original = records.clone();
        let mut s = Session::new(records, columns(), SessionOptions::default());
        for op in &ops {
            apply(&mut s, op);
            for &id in s.view().rows() {
                prop_assert_eq!(s.store().get(id), Some(&original[id.raw()]));
            }
            prop_assert!(s.view().row_count() <= original.len());
        }
    }

    /// Clearing the query always restores the full row set
    #[test]
    fn clearing_query_restores_all_rows(records in arb_records(), ops in prop::collection::vec(arb_op(), 0..8)) {
        let n = records.len();
        let mut s = Session::new(records, columns(), SessionOptions::default());
        for op in &ops {
            apply(&mut s, op);
        }
        s.set_query("");
        prop_assert_eq!(s.view().row_count(), n);
        let mut ids: Vec<RecordId> = s.view().rows().to_vec();
        ids.sort();
        prop_assert_eq!(ids, s.store().ids().to_vec());
    }

    /// An edit stays with its record through later view changes
    #[test]
    fn edit_attribution_is_stable(records in arb_records(), ops in prop::collection::vec(arb_op(), 1..8), row in 0usize..40) {
        let mut s = Session::new(records, columns(), SessionOptions::default());
        s.toggle_edit_mode();
        let row = row % s.view().row_count();
        let id = s.view().record_at(row).unwrap();
        s.set_cell(CellPos::new(row, 0), "EDITED").unwrap();
        for op in &ops {
            apply(&mut s, op);
        }
        prop_assert_eq!(s.tracker().pending_value(id, "Name"), Some("EDITED"));
        prop_assert_eq!(s.tracker().pending_len(), 1);
        prop_assert_eq!(s.store().get(id).unwrap().text("Name"), "EDITED");
    }

    /// Natural comparison is antisymmetric and transitive on samples
    #[test]
    fn natural_order_is_consistent(a in arb_text(), b in arb_text(), c in arb_text()) {
        prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        if natural_cmp(&a, &b) != Ordering::Greater && natural_cmp(&b, &c) != Ordering::Greater {
            prop_assert_ne!(natural_cmp(&a, &c), Ordering::Greater);
        }
    }
}
