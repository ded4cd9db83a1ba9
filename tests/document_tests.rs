//! Integration tests for the document engine's end-to-end behaviors
//! (testable properties, invariants, round-trip laws, and seed scenarios).

use std::collections::BTreeMap;

use weave_core::document::Document;
use weave_core::node::{NodeSnapshot, NodeSpec};
use weave_core::patch::Patch;

fn element(tag: &str) -> NodeSpec {
    NodeSpec::Element { tag: tag.to_string(), attrs: BTreeMap::new() }
}

fn value(text: &str) -> NodeSpec {
    NodeSpec::Value { value: text.to_string() }
}

/// Seed scenario 2: wrap-by-primitives. root -> A -> X; create W under root,
/// then move X under W. Final tree: root -> A, root -> W -> X.
#[test]
fn wrap_by_primitives_reparents_via_create_then_move() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();

    let a = doc.mutate().add_children(root, vec![element("a")], None)[0];
    let x = doc.mutate().add_children(a, vec![element("x")], None)[0];

    let w = doc.mutate().add_children(root, vec![element("w")], None)[0];
    doc.mutate().move_nodes(&[x], w, None);

    assert_eq!(doc.children(a), Vec::<weave_core::NodeId>::new());
    assert_eq!(doc.children(w), vec![x]);
    assert!(doc.children(root).contains(&a));
    assert!(doc.children(root).contains(&w));
}

/// Seed scenario 3: copy-then-mutate-then-replay. Copying V, then mutating
/// the original after the copy was recorded, then replaying the recorded
/// patches must copy the *current* state, not the state at record time.
#[test]
fn replaying_a_recorded_copy_uses_current_source_state() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let p = doc.mutate().add_children(root, vec![element("p")], None)[0];
    let v = doc.mutate().add_children(p, vec![value("hello")], None)[0];

    doc.clear_history();
    let index = doc.index();
    doc.mutate().copy_node(&index, v, p, None);
    let recorded = doc.history();
    assert!(!recorded.is_empty());

    doc.mutate().update_value(&[v], "hello", "hello world");

    doc.replay(&recorded, p);

    let children_text: Vec<String> = doc
        .children(p)
        .into_iter()
        .filter_map(|id| match doc.node(id) {
            Some(NodeSnapshot::Value { text }) => Some(text),
            _ => None,
        })
        .collect();

    assert!(children_text.contains(&"hello world".to_string()));
    assert_eq!(children_text.iter().filter(|t| t.as_str() == "hello world").count(), 2);
}

/// Seed scenario 4: undo after create preserves the recorded history payload.
#[test]
fn undo_after_create_preserves_history_and_removes_node_from_index() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    doc.clear_history();

    let l = doc.mutate().add_children(root, vec![element("li")], None)[0];
    assert!(doc.undo_manager().undo());

    assert!(!doc.index().contains(l));

    let history = doc.history();
    let has_create = history.iter().any(|p| matches!(p, Patch::TreeCreate { target, .. } if target == &l.to_string()));
    let has_delete = history.iter().any(|p| matches!(p, Patch::TreeDelete { target } if target == &l.to_string()));
    assert!(has_create, "expected a recorded tree.create for the undone node");
    assert!(has_delete, "expected a recorded tree.delete from the undo's own commit");
}

/// Seed scenario 5: selection generalization by tag + depth.
#[test]
fn selection_generalizes_across_sibling_articles_by_tag_and_depth() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();

    let mut h2s = Vec::new();
    for _ in 0..2 {
        let article = doc.mutate().add_children(root, vec![element("article")], None)[0];
        let h2 = doc.mutate().add_children(article, vec![element("h2")], None)[0];
        doc.mutate().add_children(article, vec![element("p")], None);
        h2s.push(h2);
    }

    let result = doc.generalize_selection(&[h2s[0]]);
    assert_eq!(result.len(), 2);
    assert!(result.contains(&h2s[0]));
    assert!(result.contains(&h2s[1]));
}

/// Seed scenario 6: formula RPN stack evaluation.
#[test]
fn formula_rpn_stack_reduces_across_siblings() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();

    let specs = vec![
        value("5"),
        value("1"),
        NodeSpec::Formula { operation: "add".into() },
        value("1"),
        NodeSpec::Formula { operation: "add".into() },
    ];
    let ids = doc.mutate().add_children(root, specs, None);

    let result = doc.evaluate_formula(ids[4]);
    assert_eq!(result, serde_json::json!(7.0));
}

/// Boundary: copy_node on a deleted source returns nothing.
#[test]
fn copy_node_on_a_deleted_source_is_a_no_op() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let v = doc.mutate().add_children(root, vec![value("gone")], None)[0];
    doc.mutate().delete(&[v]);

    let index = doc.index();
    let copied = doc.mutate().copy_node(&index, v, root, None);
    assert!(copied.is_none());
}

/// Boundary: replay with an empty patch list is a no-op.
#[test]
fn replay_with_empty_patches_does_not_change_the_tree() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let before = doc.index().len();
    doc.replay(&[], root);
    assert_eq!(doc.index().len(), before);
}

/// Round-trip law: a splice, its exact inverse, then re-inserting the
/// deleted text restores the original string.
#[test]
fn splice_value_round_trips_back_to_the_original_text() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let v = doc.mutate().add_children(root, vec![value("hello world")], None)[0];

    doc.mutate().splice_value(&[v], 5, 0, ", there");
    doc.mutate().splice_value(&[v], 5, ", there".chars().count(), "");

    match doc.node(v) {
        Some(NodeSnapshot::Value { text }) => assert_eq!(text, "hello world"),
        other => panic!("expected Value, got {other:?}"),
    }
}

/// Round-trip law: undo(redo(x)) = x for a single local mutation.
#[test]
fn undo_then_redo_then_undo_restores_the_pre_mutation_state() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let before = doc.index().len();

    doc.mutate().add_children(root, vec![element("li")], None);
    assert_eq!(doc.index().len(), before + 1);

    assert!(doc.undo_manager().undo());
    assert_eq!(doc.index().len(), before);

    assert!(doc.undo_manager().redo());
    assert_eq!(doc.index().len(), before + 1);

    assert!(doc.undo_manager().undo());
    assert_eq!(doc.index().len(), before);
}

/// Round-trip law: exporting a snapshot and importing it into a fresh
/// document yields an equivalent indexed view.
#[test]
fn snapshot_round_trip_yields_an_equivalent_index() {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let article = doc.mutate().add_children(root, vec![element("article")], None)[0];
    doc.mutate().add_children(article, vec![value("hi")], None);

    let bytes = doc.export_snapshot().unwrap();
    let doc2 = Document::new(2).unwrap();
    doc2.import(&bytes).unwrap();

    assert_eq!(doc2.index().len(), doc.index().len());
    assert_eq!(doc2.node(article), doc.node(article));
}

/// Round-trip law: re-applying the same update bytes is a no-op
/// (substrate idempotence).
#[test]
fn reapplying_the_same_update_bytes_is_idempotent() {
    let doc1 = Document::new(1).unwrap();
    let root = doc1.root();
    doc1.mutate().add_children(root, vec![element("p")], None);

    let update = doc1.export_update(None).unwrap();

    let doc2 = Document::new(2).unwrap();
    doc2.import(&update).unwrap();
    let once = doc2.index().len();

    doc2.import(&update).unwrap();
    assert_eq!(doc2.index().len(), once);
}

/// Seed scenario 1: concurrent move resolution. Two peers diverge on the
/// ordering of A's children, then exchange updates; both converge to the
/// identical final child order (last-writer-wins on position).
#[test]
fn concurrent_moves_converge_to_an_identical_child_order() {
    let doc1 = Document::new(1).unwrap();
    let root1 = doc1.root();
    let a1 = doc1.mutate().add_children(root1, vec![element("a")], None)[0];
    let children = doc1.mutate().add_children(a1, vec![element("x"), element("y")], None);
    let (x, y) = (children[0], children[1]);

    let snapshot = doc1.export_snapshot().unwrap();
    let doc2 = Document::new(2).unwrap();
    doc2.import(&snapshot).unwrap();

    doc1.mutate().move_nodes(&[x], a1, Some(1)); // peer1: [Y, X]
    doc2.mutate().move_nodes(&[y], a1, Some(1)); // peer2: [X, Y] (no-op) then below

    let update1 = doc1.export_update(None).unwrap();
    let update2 = doc2.export_update(None).unwrap();

    doc2.import(&update1).unwrap();
    doc1.import(&update2).unwrap();

    assert_eq!(doc1.children(a1), doc2.children(a1));
    assert!(doc1.children(a1).contains(&x));
    assert!(doc1.children(a1).contains(&y));
}
