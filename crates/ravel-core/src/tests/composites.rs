use super::*;

fn repeat_doc(count: f64) -> NodeTree {
    NodeTree::new("document").child(repeat("r", count, NodeTree::new("repeatValue").named("v")))
}

fn set_count(engine: &mut Engine, count: f64) {
    let outcome = engine
        .apply_action_sync(&Action::named("r", "count", count))
        .unwrap();
    assert!(outcome.success);
}

#[test]
fn repeat_instantiates_its_template_per_item() {
    let mut engine = build(repeat_doc(3.0));
    let r = id(&engine, "r");

    assert_eq!(engine.replacements(r).unwrap().len(), 3);
    assert_eq!(num(&mut engine, "r[1]/v", "value"), 1.0);
    assert_eq!(num(&mut engine, "r[2]/v", "value"), 2.0);
    assert_eq!(num(&mut engine, "r[3]/v", "value"), 3.0);
    assert_eq!(engine.parent(id(&engine, "r[2]/v")), Some(r));
}

#[test]
fn oversized_counts_are_clamped_with_a_warning() {
    let mut engine = build(repeat_doc(1e12));
    let r = id(&engine, "r");

    let limit = components::MAX_REPEAT_INSTANCES;
    assert_eq!(engine.replacements(r).unwrap().len(), limit);
    assert_eq!(
        engine.value(r, "items").unwrap().as_list().map(<[_]>::len),
        Some(limit)
    );
    let warning = engine
        .diagnostics()
        .iter()
        .find(|d| d.message.contains("exceeds the limit"))
        .expect("a clamp warning");
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.node, Some(r));

    set_count(&mut engine, 2.0);
    assert_eq!(engine.replacements(r).unwrap().len(), 2);
}

#[test]
fn the_document_sees_replacements_in_place_of_the_composite() {
    let tree = NodeTree::new("document")
        .child(number("before", 0.0))
        .child(repeat("r", 2.0, NodeTree::new("repeatIndex").named("i")))
        .child(number("after", 0.0));
    let mut engine = build(tree);
    let root = engine.root();

    let children = engine.children(root).unwrap();
    let expected = vec![
        id(&engine, "before"),
        id(&engine, "r[1]/i"),
        id(&engine, "r[2]/i"),
        id(&engine, "after"),
    ];
    assert_eq!(children, expected);
}

#[test]
fn multiple_template_roots_are_wrapped_in_a_group() {
    let tree = NodeTree::new("document").child(
        NodeTree::new("repeat")
            .named("r")
            .attribute("count", json!(3))
            .child(NodeTree::new("repeatValue").named("v"))
            .child(NodeTree::new("repeatIndex").named("i")),
    );
    let mut engine = build(tree);
    let r = id(&engine, "r");

    let instances = engine.replacements(r).unwrap();
    assert_eq!(instances.len(), 3);
    assert!(
        instances
            .iter()
            .all(|id| engine.component_type(*id) == Some("group"))
    );
    assert_eq!(num(&mut engine, "r[3]/i", "value"), 3.0);
    assert_eq!(engine.parent(id(&engine, "r[3]/i")), Some(instances[2]));
}

#[test]
fn shrinking_withholds_and_growing_restores_the_same_nodes() {
    let mut engine = build(repeat_doc(3.0));
    let r = id(&engine, "r");
    let ids = engine.replacements(r).unwrap();
    let second = id(&engine, "r[2]/v");

    set_count(&mut engine, 1.0);
    assert_eq!(engine.replacements(r).unwrap(), vec![ids[0]]);
    assert_eq!(engine.withheld(r), vec![ids[1], ids[2]]);
    assert!(engine.is_withheld(ids[1]));
    assert_eq!(engine.node_id("r[2]/v"), None);
    assert_eq!(engine.children(engine.root()).unwrap(), vec![ids[0]]);

    set_count(&mut engine, 3.0);
    assert_eq!(engine.replacements(r).unwrap(), ids);
    assert!(engine.withheld(r).is_empty());
    assert_eq!(engine.node_id("r[2]/v"), Some(second));
    assert_eq!(num(&mut engine, "r[2]/v", "value"), 2.0);
}

#[test]
fn trim_mode_destroys_vanished_replacements() {
    let mut config = RavelConfig::default();
    config.set_value("composite.trimWithheld", json!(true));
    let mut engine = Engine::with_options(
        &repeat_doc(3.0),
        EngineOptions::default().with_config(config),
    )
    .unwrap();
    let r = id(&engine, "r");
    let ids = engine.replacements(r).unwrap();

    set_count(&mut engine, 1.0);
    assert_eq!(engine.replacements(r).unwrap(), vec![ids[0]]);
    assert!(engine.withheld(r).is_empty());
    assert!(!engine.contains(ids[1]));
    assert!(!engine.contains(ids[2]));

    set_count(&mut engine, 3.0);
    let regrown = engine.replacements(r).unwrap();
    assert_eq!(regrown[0], ids[0]);
    let highest = ids.iter().max().copied().unwrap();
    assert!(regrown[1] > highest && regrown[2] > highest);
    assert_eq!(num(&mut engine, "r[3]/v", "value"), 3.0);
}

#[test]
fn withheld_replacements_can_be_trimmed_on_demand() {
    let mut engine = build(repeat_doc(3.0));
    let r = id(&engine, "r");
    let ids = engine.replacements(r).unwrap();

    set_count(&mut engine, 1.0);
    engine.replacements(r).unwrap();
    assert_eq!(engine.trim_withheld(), 2);
    assert!(engine.withheld(r).is_empty());
    assert!(!engine.contains(ids[2]));
    assert_eq!(engine.trim_withheld(), 0);
}

#[test]
fn repeat_items_can_come_from_a_list() {
    let tree = NodeTree::new("document").child(
        NodeTree::new("repeat")
            .named("r")
            .attribute_component(
                "for",
                NodeTree::new("numberList").attribute("numbers", json!([10, 20])),
            )
            .child(NodeTree::new("repeatValue").named("v")),
    );
    let mut engine = build(tree);
    assert_eq!(num(&mut engine, "r[1]/v", "value"), 10.0);
    assert_eq!(num(&mut engine, "r[2]/v", "value"), 20.0);

    let outcome = engine
        .apply_action_sync(&Action::named("r[2]/v", "value", 25.0))
        .unwrap();
    assert!(outcome.success);
    assert_eq!(point(&mut engine, "r", "items"), vec![10.0, 25.0]);
    assert_eq!(num(&mut engine, "r[2]/v", "value"), 25.0);
}

#[test]
fn counted_items_cannot_be_edited() {
    let mut engine = build(repeat_doc(2.0));
    let outcome = engine
        .apply_action_sync(&Action::named("r[1]/v", "value", 7.0))
        .unwrap();
    assert!(!outcome.success);
}

fn collect_doc() -> NodeTree {
    collect_doc_limited(None)
}

fn collect_doc_limited(max_number: Option<u32>) -> NodeTree {
    let mut collect = NodeTree::new("collect")
        .named("c")
        .attribute("source", json!("g"))
        .attribute("componentType", json!("point"));
    if let Some(max) = max_number {
        collect = collect.attribute("maxNumber", json!(max));
    }
    NodeTree::new("document")
        .child(
            NodeTree::new("group")
                .named("g")
                .child(point_at("p1", 1.0, 2.0))
                .child(NodeTree::new("group").child(point_at("p2", 3.0, 4.0)))
                .child(number("n", 1.0)),
        )
        .child(collect)
}

#[test]
fn collect_shadows_matching_descendants() {
    let mut engine = build(collect_doc());
    let c = id(&engine, "c");
    let shadows = engine.replacements(c).unwrap();

    assert_eq!(shadows.len(), 2);
    assert_eq!(engine.shadow_of(shadows[0]), Some(id(&engine, "p1")));
    assert_eq!(engine.shadow_of(shadows[1]), Some(id(&engine, "p2")));
    assert_eq!(num(&mut engine, "c", "numberCollected"), 2.0);
    assert_eq!(
        engine.value(shadows[1], "coords").unwrap().as_point().unwrap(),
        vec![3.0, 4.0]
    );
    // Shadows are anonymous: the original keeps its name.
    assert_eq!(engine.node_id("p1"), Some(id(&engine, "p1")));
}

#[test]
fn collect_respects_max_number() {
    let mut engine = build(collect_doc_limited(Some(1)));
    assert_eq!(num(&mut engine, "c", "numberCollected"), 1.0);
    let c = id(&engine, "c");
    let shadows = engine.replacements(c).unwrap();
    assert_eq!(engine.shadow_of(shadows[0]), Some(id(&engine, "p1")));
}

#[test]
fn edits_to_a_shadow_reach_the_original() {
    let mut engine = build(collect_doc());
    let c = id(&engine, "c");
    let shadow = engine.replacements(c).unwrap()[0];

    let outcome = engine.apply_action_sync(&Action::new(shadow, "x", 5.0)).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.changed, vec![id(&engine, "p1")]);
    assert_eq!(num(&mut engine, "p1", "x"), 5.0);
    assert_eq!(engine.value(shadow, "x").unwrap(), StateValue::Number(5.0));
}

#[test]
fn collect_follows_changes_in_its_source() {
    let tree = NodeTree::new("document")
        .child(
            NodeTree::new("group")
                .named("g")
                .child(repeat("r", 2.0, point_at("p", 0.0, 0.0))),
        )
        .child(
            NodeTree::new("collect")
                .named("c")
                .attribute("source", json!("g"))
                .attribute("componentType", json!("point")),
        );
    let mut engine = build(tree);
    assert_eq!(num(&mut engine, "c", "numberCollected"), 2.0);

    set_count(&mut engine, 4.0);
    assert_eq!(num(&mut engine, "c", "numberCollected"), 4.0);
}

#[test]
fn extend_shadows_its_target() {
    let tree = NodeTree::new("document")
        .child(point_at("p", 1.0, 2.0))
        .child(NodeTree::new("extend").named("e").attribute("target", json!("p")));
    let mut engine = build(tree);
    let e = id(&engine, "e");
    let shadow = engine.replacements(e).unwrap()[0];

    assert_eq!(engine.shadow_of(shadow), Some(id(&engine, "p")));
    assert_eq!(engine.component_type(shadow), Some("point"));

    engine
        .apply_action_sync(&Action::named("p", "coords", json!([7.0, 8.0])))
        .unwrap();
    assert_eq!(
        engine.value(shadow, "coords").unwrap().as_point().unwrap(),
        vec![7.0, 8.0]
    );
}

#[test]
fn extending_a_subtree_with_a_composite_aliases_its_instances() {
    let tree = NodeTree::new("document")
        .child(
            NodeTree::new("group")
                .named("g")
                .child(repeat("r", 2.0, point_at("p", 1.0, 1.0))),
        )
        .child(NodeTree::new("extend").named("e").attribute("target", json!("g")));
    let mut engine = build(tree);
    let e = id(&engine, "e");
    let copy = engine.replacements(e).unwrap()[0];
    assert_eq!(engine.shadow_of(copy), Some(id(&engine, "g")));

    let points = engine.children(copy).unwrap();
    assert_eq!(points.len(), 2);
    let original = id(&engine, "r[1]/p");
    assert_eq!(engine.shadow_of(points[0]), Some(original));
    assert_eq!(engine.shadow_of(points[1]), Some(id(&engine, "r[2]/p")));

    let outcome = engine
        .apply_action_sync(&Action::new(points[0], "x", 5.0))
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.changed, vec![original]);
    assert_eq!(num(&mut engine, "r[1]/p", "x"), 5.0);
    assert_eq!(engine.value(points[0], "x").unwrap(), StateValue::Number(5.0));

    set_count(&mut engine, 3.0);
    let points = engine.children(copy).unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(engine.shadow_of(points[2]), Some(id(&engine, "r[3]/p")));
}

#[test]
fn extend_rejects_itself_as_target() {
    let tree = NodeTree::new("document")
        .child(NodeTree::new("extend").named("e").attribute("target", json!("e")));
    let mut engine = build(tree);
    let e = id(&engine, "e");

    assert!(engine.replacements(e).unwrap().is_empty());
    let warning = &engine.diagnostics()[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.node, Some(e));
    assert!(warning.message.contains("cannot target itself"));
}

#[test]
fn references_to_later_expansions_are_deferred() {
    let tree = NodeTree::new("document")
        .child(NodeTree::new("extend").named("e").attribute("target", json!("r[2]/v")))
        .child(repeat("r", 2.0, NodeTree::new("repeatValue").named("v")));
    let mut engine = build(tree);
    let e = id(&engine, "e");

    let shadow = engine.replacements(e).unwrap()[0];
    assert_eq!(engine.shadow_of(shadow), Some(id(&engine, "r[2]/v")));
    assert_eq!(engine.value(shadow, "value").unwrap(), StateValue::Number(2.0));
    assert!(engine.diagnostics().is_empty());
}
