use dom::{Boundary, Dom, NodeId, TreeSnapshot, assert_tree_eq};
use tracker::driver::TrackedDom;
use tracker::{
    ChildGroup, DiffFilter, Dimension, GroupAnchor, MutationTracker, Position, RangeError,
    Sibling, patch_grouped_children,
};

fn row(dom: &mut Dom, names: &[&str]) -> (NodeId, Vec<NodeId>) {
    let root = dom.create_element("root");
    let children = names
        .iter()
        .map(|name| {
            let id = dom.create_element(name);
            dom.append(root, id).expect("append failed");
            id
        })
        .collect();
    (root, children)
}

#[test]
fn move_to_back_tracks_exactly_one_node() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b", "c", "d"]);
    let (a, b, _c, d) = (kids[0], kids[1], kids[2], kids[3]);
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.append(root, a).expect("append failed");

    assert!(td.tracker.mutated(&td.dom, Some(root)));
    let diff = td.tracker.diff(DiffFilter::ALL);
    assert_eq!(diff.len(), 1, "only the moved node carries a record");
    let delta = &diff[&a];
    assert_eq!(
        delta.original,
        Some(Position::new(root, Sibling::Edge, Sibling::Node(b)))
    );
    assert_eq!(
        delta.mutated,
        Some(Position::new(root, Sibling::Node(d), Sibling::Edge))
    );
}

#[test]
fn move_to_back_range_spans_the_whole_disturbed_run() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b", "c", "d"]);
    let a = kids[0];
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.append(root, a).expect("append failed");

    let range = td
        .tracker
        .range(&td.dom, Some(root))
        .expect("range failed")
        .expect("range is null");
    // From the gap before the (now) first child through the end of the list:
    // the original slot of the mover and its current place are both inside.
    let start = range.start().expect("start");
    let end = range.end().expect("end");
    assert_eq!((start.node, start.at), (root, Boundary::AfterOpen));
    assert_eq!((end.node, end.at), (root, Boundary::BeforeClose));
}

#[test]
fn move_to_back_reverts_to_the_original_order() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b", "c", "d"]);
    let a = kids[0];
    let before = TreeSnapshot::capture(&dom, root);
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.append(root, a).expect("append failed");
    td.tracker.revert(&mut td.dom, None).expect("revert failed");

    assert_tree_eq(&before, &TreeSnapshot::capture(&td.dom, root));
    assert!(!td.tracker.mutated(&td.dom, None));
}

#[test]
fn insert_then_remove_cancels_out() {
    let mut dom = Dom::new();
    let root = dom.create_element("root");
    let a = dom.create_element("a");
    let mut td = TrackedDom::from_dom(dom);

    td.append(root, a).expect("append failed");
    assert!(td.tracker.mutated(&td.dom, None));
    td.remove(a).expect("remove failed");

    assert!(!td.tracker.mutated(&td.dom, None));
    assert!(td.tracker.diff(DiffFilter::ALL).is_empty());
}

#[test]
fn untracked_origin_add_resolves_after_synchronize() {
    // root holds [a]; b and t are orphans and b's subtree is not watched.
    let mut dom = Dom::new();
    let root = dom.create_element("root");
    let a = dom.create_element("a");
    let b = dom.create_element("b");
    let t = dom.create_text("tail");
    dom.append(root, a).expect("append failed");
    let mut tracker = MutationTracker::new();

    // root.append(b), reported while a was still root's last child
    dom.append(root, b).expect("append failed");
    tracker.record_children(root, &[], &[b], Some(a), None);
    // b.append(a): never reported
    dom.remove(a).expect("remove failed");
    dom.append(b, a).expect("append failed");
    // a.after(t), reported
    dom.append(b, t).expect("append failed");
    tracker.record_children(b, &[], &[t], Some(a), None);

    let diff = tracker.diff(DiffFilter::ALL);
    // the reveal of a takes over its sibling-index key; b's stale
    // "right after a" knowledge goes unknown until synchronize
    let b_mutated = diff[&b].mutated.expect("b is tracked");
    assert_eq!(b_mutated.parent, root);
    assert_eq!(b_mutated.prev, Sibling::Unknown);
    assert_eq!(b_mutated.next, Sibling::Edge);
    // a surfaced as a reported sibling inside b: tracked, but with its
    // sibling inside b still unrevealed
    let a_mutated = diff[&a].mutated.expect("a is tracked");
    assert_eq!(a_mutated.parent, b);
    assert_eq!(a_mutated.prev, Sibling::Unknown);
    assert_eq!(a_mutated.next, Sibling::Node(t));

    tracker.synchronize(&dom);

    let diff = tracker.diff(DiffFilter::ALL);
    assert_eq!(
        diff[&a].mutated,
        Some(Position::new(b, Sibling::Edge, Sibling::Node(t)))
    );
    assert_eq!(
        diff[&a].original,
        Some(Position::new(root, Sibling::Edge, Sibling::Edge))
    );
    assert_eq!(
        diff[&b].mutated,
        Some(Position::new(root, Sibling::Edge, Sibling::Edge))
    );

    tracker.revert(&mut dom, None).expect("revert failed");
    assert_eq!(dom.children(root), &[a]);
    assert_eq!(dom.parent(b), None);
    assert_eq!(dom.children(b), &[] as &[NodeId]);
    assert_eq!(dom.parent(t), None);
}

#[test]
fn reversion_through_intermediary_keeps_both_movers() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b", "c"]);
    let (a, b, c) = (kids[0], kids[1], kids[2]);
    let mut td = TrackedDom::from_dom(dom);

    td.remove(b).expect("remove failed");
    td.remove(a).expect("remove failed");
    td.insert_before(c, a).expect("insert failed");
    td.prepend(root, b).expect("prepend failed");
    assert_eq!(td.dom.children(root), &[b, a, c]);

    let diff = td.tracker.diff(DiffFilter::CHILDREN);
    assert_eq!(diff.len(), 2, "a and b moved, c did not");
    assert_eq!(diff[&a].original.map(|o| o.next), Some(Sibling::Node(b)));
    assert_eq!(diff[&a].mutated.map(|m| m.prev), Some(Sibling::Node(b)));
    assert!(!diff.contains_key(&c));
}

#[test]
fn attribute_reverted_to_its_original_goes_clean() {
    let mut dom = Dom::new();
    let root = dom.create_element("root");
    let x = dom.create_element("x");
    dom.append(root, x).expect("append failed");
    dom.set_attribute(x, "id", "B").expect("set failed");
    let mut td = TrackedDom::from_dom(dom);

    td.set_attribute(x, "id", "B_modified").expect("set failed");
    assert!(td.tracker.mutated(&td.dom, Some(root)));
    td.set_attribute(x, "id", "B").expect("set failed");

    assert!(!td.tracker.mutated(&td.dom, None));
    td.tracker.synchronize(&td.dom);
    assert!(td.tracker.diff(DiffFilter::PROPERTY).is_empty());
}

#[test]
fn range_without_a_root_rejects_disconnected_trees() {
    let mut dom = Dom::new();
    let (r1, _kids) = row(&mut dom, &["a"]);
    let r2 = dom.create_element("root2");
    let c = dom.create_element("c");
    dom.append(r2, c).expect("append failed");
    let x = dom.create_element("x");
    let y = dom.create_element("y");
    let mut td = TrackedDom::from_dom(dom);

    td.append(r1, x).expect("append failed");
    td.append(r2, y).expect("append failed");

    assert!(matches!(
        td.tracker.range(&td.dom, None),
        Err(RangeError::DisconnectedRoots)
    ));
    let range = td
        .tracker
        .range(&td.dom, Some(r1))
        .expect("range failed")
        .expect("range is null");
    let start = range.start().expect("start");
    let end = range.end().expect("end");
    assert!(td.dom.contains(r1, start.node));
    assert!(td.dom.contains(r1, end.node));
}

#[test]
fn adjacent_movers_group_into_one_run() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b", "c", "d"]);
    let (a, b, c, d) = (kids[0], kids[1], kids[2], kids[3]);
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.remove(b).expect("remove failed");
    td.append(root, a).expect("append failed");
    td.append(root, b).expect("append failed");
    assert_eq!(td.dom.children(root), &[c, d, a, b]);

    let mutated: Vec<ChildGroup> = td.tracker.grouped_children(Dimension::Mutated, false).collect();
    assert_eq!(
        mutated,
        vec![ChildGroup {
            nodes: vec![a, b],
            parent: Some(root),
            prev: Some(GroupAnchor::Node(d)),
            next: Some(GroupAnchor::Edge),
        }]
    );
    let original: Vec<ChildGroup> = td.tracker.grouped_children(Dimension::Original, false).collect();
    assert_eq!(
        original,
        vec![ChildGroup {
            nodes: vec![a, b],
            parent: Some(root),
            prev: Some(GroupAnchor::Edge),
            next: Some(GroupAnchor::Node(c)),
        }]
    );
}

#[test]
fn removed_nodes_collect_into_a_trailing_group() {
    let mut dom = Dom::new();
    let (root, _kids) = row(&mut dom, &["a"]);
    let fresh = dom.create_element("fresh");
    let mut td = TrackedDom::from_dom(dom);

    td.append(root, fresh).expect("append failed");
    // in the original dimension the fresh node has no place at all
    let groups: Vec<ChildGroup> = td.tracker.grouped_children(Dimension::Original, true).collect();
    assert_eq!(
        groups,
        vec![ChildGroup {
            nodes: vec![fresh],
            parent: None,
            prev: None,
            next: None,
        }]
    );
    let without: Vec<ChildGroup> = td.tracker.grouped_children(Dimension::Original, false).collect();
    assert!(without.is_empty());
}

#[test]
fn patching_replays_the_mutated_configuration_onto_a_copy() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b", "c"]);
    let (a, _b, c) = (kids[0], kids[1], kids[2]);
    let spare = dom.create_element("spare");
    let copy = dom.clone();
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.insert_after(c, a).expect("insert failed");
    td.append(root, spare).expect("append failed");

    let groups: Vec<ChildGroup> = td.tracker.grouped_children(Dimension::Mutated, true).collect();
    let mut replay = copy;
    patch_grouped_children(&mut replay, groups).expect("patch failed");
    assert_tree_eq(
        &TreeSnapshot::capture(&replay, root),
        &TreeSnapshot::capture(&td.dom, root),
    );
}

#[test]
fn group_without_any_boundary_is_skipped() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a"]);
    let a = kids[0];
    let group = ChildGroup {
        nodes: vec![a],
        parent: Some(root),
        prev: None,
        next: None,
    };
    patch_grouped_children(&mut dom, vec![group]).expect("patch failed");
    // detached by the first phase, never re-attached: the damage stays local
    assert_eq!(dom.parent(a), None);
    assert_eq!(dom.children(root), &[] as &[NodeId]);
}

#[test]
fn unobserved_move_is_recovered_from_index_evidence_on_removal() {
    // w moved next to x inside q (observed); x then left q unobserved and
    // surfaces being removed from p: the graph still knows x belonged to q.
    let mut dom = Dom::new();
    let q = dom.create_element("q");
    let x = dom.create_element("x");
    dom.append(q, x).expect("append failed");
    let p = dom.create_element("p");
    let w = dom.create_element("w");
    let mut tracker = MutationTracker::new();

    dom.append(q, w).expect("append failed");
    tracker.record_children(q, &[], &[w], Some(x), None);
    dom.remove(x).expect("remove failed");
    dom.append(p, x).expect("append failed");
    // x's trip into p was unobserved; now its removal from p is reported
    dom.remove(x).expect("remove failed");
    tracker.record_children(p, &[x], &[], None, None);

    let diff = tracker.diff(DiffFilter::ALL);
    let original = diff[&x].original.expect("x keeps an original position");
    assert_eq!(original.parent, q, "original parent comes from the evidence");
    // w floated in after observation started, so x originally sat alone on
    // its right side; the left side was never revealed by anything
    assert_eq!(original.next, Sibling::Edge);
    assert_eq!(original.prev, Sibling::Unknown);
}

#[test]
fn mutated_scopes_to_the_given_root() {
    let mut dom = Dom::new();
    let root = dom.create_element("root");
    let left = dom.create_element("left");
    let right = dom.create_element("right");
    let leaf = dom.create_element("leaf");
    dom.append(root, left).expect("append failed");
    dom.append(root, right).expect("append failed");
    dom.append(left, leaf).expect("append failed");
    let mut td = TrackedDom::from_dom(dom);

    td.remove(leaf).expect("remove failed");
    td.prepend(left, leaf).expect("prepend failed");
    // leaf moved back where it was: nothing is mutated at all
    assert!(!td.tracker.mutated(&td.dom, None));

    td.remove(leaf).expect("remove failed");
    td.append(right, leaf).expect("append failed");
    assert!(td.tracker.mutated(&td.dom, Some(left)), "original parent side");
    assert!(td.tracker.mutated(&td.dom, Some(right)), "current parent side");
    assert!(td.tracker.mutated(&td.dom, Some(root)));
}

#[test]
fn clear_is_idempotent_and_total() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b"]);
    let a = kids[0];
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.append(root, a).expect("append failed");
    td.set_attribute(a, "id", "x").expect("set failed");
    assert!(td.tracker.mutated(&td.dom, None));

    td.tracker.clear();
    assert!(!td.tracker.mutated(&td.dom, None));
    assert!(td.tracker.diff(DiffFilter::ALL).is_empty());
    td.tracker.clear();
    assert!(!td.tracker.mutated(&td.dom, None));
}

#[test]
fn diff_filters_select_delta_parts() {
    let mut dom = Dom::new();
    let (root, kids) = row(&mut dom, &["a", "b"]);
    let a = kids[0];
    let mut td = TrackedDom::from_dom(dom);

    td.remove(a).expect("remove failed");
    td.append(root, a).expect("append failed");
    td.set_attribute(a, "id", "x").expect("set failed");
    td.tracker.record_custom(a, "mark", Some("new"), Some("old"));

    let props = td.tracker.diff(DiffFilter::PROPERTY);
    let delta = &props[&a];
    assert!(delta.original.is_none() && delta.mutated.is_none());
    assert_eq!(delta.attributes.get("id"), Some(&None));
    assert_eq!(delta.custom.get("mark"), Some(&Some("old".to_string())));

    let children = td.tracker.diff(DiffFilter::CHILDREN);
    let delta = &children[&a];
    assert!(delta.attributes.is_empty() && delta.custom.is_empty());
    assert!(delta.original.is_some() && delta.mutated.is_some());

    let mutated_only = td.tracker.diff(DiffFilter::MUTATED);
    assert!(mutated_only[&a].original.is_none());
    assert!(mutated_only[&a].mutated.is_some());
}

#[test]
fn revert_restores_custom_properties_through_the_hook() {
    let mut dom = Dom::new();
    let (_root, kids) = row(&mut dom, &["a"]);
    let a = kids[0];
    let mut td = TrackedDom::from_dom(dom);

    td.tracker.record_custom(a, "selection", Some("2:4"), Some("0:0"));
    let mut restored = Vec::new();
    let mut hook = |node: NodeId, key: &str, value: Option<&str>| {
        restored.push((node, key.to_string(), value.map(str::to_string)));
    };
    td.tracker.revert(&mut td.dom, Some(&mut hook)).expect("revert failed");
    assert_eq!(
        restored,
        vec![(a, "selection".to_string(), Some("0:0".to_string()))]
    );
}
