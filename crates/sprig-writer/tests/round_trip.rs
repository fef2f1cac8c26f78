//! Print → read → compare, for acyclic structure by content and for
//! shared/cyclic structure by topology.

use proptest::prelude::*;
use sprig_core::{Heap, Value};
use sprig_reader::read;
use sprig_writer::{write, write_pretty};

/// Read one datum back out of a printed form.
fn reread(heap: &mut Heap, text: &str) -> Value {
    let top = read(heap, "reread", text).unwrap_or_else(|e| {
        panic!("printed form failed to re-read: {text:?}\nError: {e}")
    });
    assert_eq!(heap.seq_len(top), 1, "expected one datum from {text:?}");
    heap.seq_get(top, 0).unwrap()
}

#[test]
fn scalars_round_trip() {
    let mut heap = Heap::new();
    let scalars = [
        Value::Nil,
        Value::Bool(true),
        Value::Bool(false),
        Value::Int(0),
        Value::Int(-42),
        Value::Int(i64::MAX),
        Value::Float(2.0),
        Value::Float(-0.125),
        Value::Float(1e20),
        Value::Float(3.25e-7),
        Value::symbol("foo-bar?"),
        Value::keyword("config"),
        Value::string("hello \"world\"\n"),
    ];
    for v in scalars {
        let text = write(&heap, v).unwrap();
        let back = reread(&mut heap, &text);
        assert_eq!(back, v, "via {text:?}");
    }
}

#[test]
fn acyclic_trees_round_trip() {
    let mut heap = Heap::new();
    for source in [
        "(a 1 2.5 \"x\" kw: nil true (nested (deeper)))",
        "{a 1 b {c 2} d (1 2 3)}",
        "(quote (1 2))",
        "()",
        "{}",
    ] {
        let top = read(&mut heap, "src", source).unwrap();
        let original = heap.seq_get(top, 0).unwrap();
        heap.push_root(original);

        for text in [
            write(&heap, original).unwrap(),
            write_pretty(&heap, original).unwrap(),
        ] {
            let back = reread(&mut heap, &text);
            assert!(
                heap.deep_eq(original, back),
                "{source:?} printed as {text:?}"
            );
        }
        heap.pop_roots(1);
    }
}

#[test]
fn self_reference_round_trips_topology() {
    let mut heap = Heap::new();
    let top = read(&mut heap, "src", "#1=(1 #1#)").unwrap();
    let original = heap.seq_get(top, 0).unwrap();
    heap.push_root(original);

    let text = write(&heap, original).unwrap();
    assert_eq!(text, "#1=(1 #1#)");

    let back = reread(&mut heap, &text);
    assert_eq!(heap.seq_len(back), 2);
    assert_eq!(heap.seq_get(back, 0), Some(Value::Int(1)));
    // The reconstructed second element is identity-equal to the whole.
    assert_eq!(heap.seq_get(back, 1), Some(back));
}

#[test]
fn shared_subtree_round_trips_topology() {
    let mut heap = Heap::new();
    let top = read(&mut heap, "src", "((#1=(s)) #1#)").unwrap();
    let original = heap.seq_get(top, 0).unwrap();
    heap.push_root(original);

    let text = write(&heap, original).unwrap();
    // Exactly one definition, exactly one reference.
    assert_eq!(text.matches("#1=").count(), 1);
    assert_eq!(text.matches("#1#").count(), 1);

    let back = reread(&mut heap, &text);
    let first_wrap = heap.seq_get(back, 0).unwrap();
    let via_first = heap.seq_get(first_wrap, 0).unwrap();
    let via_second = heap.seq_get(back, 1).unwrap();
    assert_eq!(via_first, via_second);
}

#[test]
fn shared_map_values_round_trip() {
    let mut heap = Heap::new();
    let shared = heap.alloc_seq(0);
    heap.seq_push(shared, Value::Int(9));
    let m = heap.alloc_map();
    heap.map_set(m, Value::keyword("a"), shared).unwrap();
    heap.map_set(m, Value::keyword("b"), shared).unwrap();
    heap.push_root(m);

    let text = write(&heap, m).unwrap();
    assert_eq!(text.matches("#1=").count(), 1);
    assert_eq!(text.matches("#1#").count(), 1);

    let back = reread(&mut heap, &text);
    let a = heap.map_get(back, Value::keyword("a")).unwrap();
    let b = heap.map_get(back, Value::keyword("b")).unwrap();
    assert_eq!(a, b);
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        // Dyadic fractions: exactly representable well inside the printer's
        // 15 significant digits, so bitwise comparison is legitimate.
        (-32768i32..32768).prop_map(|n| Value::Float(n as f64 / 256.0)),
        "[a-z][a-z0-9-]{0,8}"
            .prop_filter("reads back as nil/bool, not a symbol", |s| {
                !matches!(s.as_str(), "nil" | "true" | "false")
            })
            .prop_map(|s| Value::symbol(&s)),
        "[a-z][a-z0-9]{0,8}".prop_map(|s| Value::keyword(&s)),
        "[ -~]{0,12}".prop_map(|s| Value::string(&s)),
    ]
}

proptest! {
    #[test]
    fn printed_scalars_reread_equal(v in arb_scalar()) {
        let mut heap = Heap::new();
        let text = write(&heap, v).unwrap();
        let back = reread(&mut heap, &text);
        prop_assert_eq!(back, v, "via {}", text);
    }

    #[test]
    fn printed_scalar_sequences_reread_equal(items in prop::collection::vec(arb_scalar(), 0..12)) {
        let mut heap = Heap::new();
        let s = heap.alloc_seq(items.len());
        for &item in &items {
            heap.seq_push(s, item);
        }
        heap.push_root(s);
        for text in [write(&heap, s).unwrap(), write_pretty(&heap, s).unwrap()] {
            let back = reread(&mut heap, &text);
            prop_assert!(heap.deep_eq(s, back), "via {}", text);
        }
    }
}
