use super::*;
use futures::executor::block_on;

fn segment_doc() -> Engine {
    build(NodeTree::new("document").child(segment("seg", [1.0, 2.0], [4.0, 6.0])))
}

#[test]
fn queued_drag_frames_collapse_before_they_are_applied() {
    let mut engine = segment_doc();
    let mut queue = ActionQueue::new();
    for x in [2.0, 3.0, 4.0] {
        queue.push(Action::named("seg", "endpoint", json!([x, 0.0])).skippable().continuing());
    }
    queue.push(Action::named("seg", "through", json!([9.0, 9.0])));
    assert_eq!(queue.len(), 2);

    let outcomes = queue.apply_all(&mut engine).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| outcome.success));
    assert!(queue.is_empty());
    assert_eq!(point(&mut engine, "seg", "endpoint"), vec![4.0, 0.0]);
    assert_eq!(point(&mut engine, "seg", "through"), vec![9.0, 9.0]);
}

#[test]
fn apply_all_stops_at_the_first_api_error() {
    let mut engine = segment_doc();
    let mut queue = ActionQueue::new();
    queue.push(Action::named("seg", "endpoint", json!([0.0, 0.0])));
    queue.push(Action::named("ghost", "value", 1.0));
    queue.push(Action::named("seg", "through", json!([5.0, 5.0])));

    assert!(queue.apply_all(&mut engine).is_err());
    assert_eq!(queue.len(), 2);
    assert_eq!(point(&mut engine, "seg", "endpoint"), vec![0.0, 0.0]);
    assert_eq!(point(&mut engine, "seg", "through"), vec![4.0, 6.0]);
}

#[test]
fn transient_actions_are_not_unsaved_changes() {
    let mut engine = segment_doc();
    assert!(!engine.has_unsaved_changes());

    let preview = Action::named("seg", "endpoint", json!([0.0, 0.0])).transient();
    assert!(engine.apply_action_sync(&preview).unwrap().success);
    assert!(!engine.has_unsaved_changes());

    let commit = Action::named("seg", "endpoint", json!([0.5, 0.5]));
    assert!(engine.apply_action_sync(&commit).unwrap().success);
    assert!(engine.has_unsaved_changes());

    engine.mark_saved();
    assert!(!engine.has_unsaved_changes());
}

#[test]
fn unknown_targets_are_api_errors() {
    let mut engine = segment_doc();

    let err = engine
        .apply_action_sync(&Action::named("ghost", "value", 1.0))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownNode { .. }));

    let err = engine
        .apply_action_sync(&Action::named("seg", "slope", 1.0))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownStateVariable { .. }));

    let err = engine
        .apply_action_sync(&Action::named("seg", "children", json!([])))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownStateVariable { .. }));

    let err = engine
        .apply_action_sync(&Action::new(NodeId(9999), "value", 1.0))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownNode { .. }));
}

#[test]
fn actions_can_target_nodes_by_id() {
    let mut engine = segment_doc();
    let seg = id(&engine, "seg");
    let outcome = engine
        .apply_action_sync(&Action::new(seg, "through", json!([5.0, 2.0])))
        .unwrap();
    assert!(outcome.success);
    assert_eq!(num(&mut engine, "seg", "length"), 4.0);
}

#[test]
fn async_actions_behave_like_sync_ones() {
    let mut engine = segment_doc();
    let outcome = block_on(engine.apply_action(&Action::named("seg", "length", 10.0))).unwrap();
    assert!(outcome.success);
    assert_eq!(point(&mut engine, "seg", "endpoint"), vec![-2.0, -2.0]);

    let err = block_on(engine.apply_action(&Action::named("ghost", "value", 1.0))).unwrap_err();
    assert!(matches!(err, Error::UnknownNode { .. }));
}

#[test]
fn actions_deserialized_from_json_apply() {
    let mut engine = segment_doc();
    let action: Action = serde_json::from_value(json!({
        "nodeName": "seg",
        "variable": "midpoint",
        "desired": [0, 0],
        "metadata": { "transient": true }
    }))
    .unwrap();

    let outcome = engine.apply_action_sync(&action).unwrap();
    assert!(outcome.success);
    assert_eq!(point(&mut engine, "seg", "midpoint"), vec![0.0, 0.0]);
    assert!(!engine.has_unsaved_changes());
}

#[test]
fn entry_edits_change_one_coordinate() {
    let tree = NodeTree::new("document").child(point_at("p", 1.0, 2.0));
    let mut engine = build(tree);

    let outcome = engine
        .apply_action_sync(&Action::named("p", "coords", 5.0).at_entry(1))
        .unwrap();
    assert!(outcome.success);
    assert_eq!(point(&mut engine, "p", "coords"), vec![1.0, 5.0]);
    assert!(engine.is_fresh(id(&engine, "p"), "x").unwrap());
}

#[test]
fn gesture_origins_are_recorded_once_per_drag() {
    let tree = NodeTree::new("document").child(point_at("p", 1.0, 1.0));
    let mut engine = build(tree);
    assert_eq!(engine.value_by_name("p", "gestureOrigin").unwrap(), StateValue::Null);

    let drag = |to: [f64; 2]| Action::named("p", "coords", json!(to)).skippable();
    assert!(engine.apply_action_sync(&drag([2.0, 2.0])).unwrap().success);
    assert_eq!(point(&mut engine, "p", "gestureOrigin"), vec![1.0, 1.0]);

    assert!(engine.apply_action_sync(&drag([3.0, 4.0]).continuing()).unwrap().success);
    assert_eq!(point(&mut engine, "p", "gestureOrigin"), vec![1.0, 1.0]);
    assert_eq!(point(&mut engine, "p", "displacement"), vec![2.0, 3.0]);

    assert!(engine.apply_action_sync(&drag([5.0, 5.0])).unwrap().success);
    assert_eq!(point(&mut engine, "p", "gestureOrigin"), vec![3.0, 4.0]);
    assert_eq!(point(&mut engine, "p", "displacement"), vec![2.0, 1.0]);
}

#[test]
fn booleans_accept_text_edits() {
    let tree = NodeTree::new("document").child(
        NodeTree::new("boolean")
            .named("b")
            .attribute("value", json!(false)),
    );
    let mut engine = build(tree);
    assert!(
        engine
            .apply_action_sync(&Action::named("b", "value", "true"))
            .unwrap()
            .success
    );
    assert_eq!(engine.value_by_name("b", "value").unwrap(), StateValue::Bool(true));
    assert!(
        !engine
            .apply_action_sync(&Action::named("b", "value", "maybe"))
            .unwrap()
            .success
    );
}

#[test]
fn hiding_a_container_cascades_after_an_edit() {
    let tree = NodeTree::new("document").child(
        NodeTree::new("group")
            .named("g")
            .child(number("n", 1.0)),
    );
    let mut engine = build(tree);
    let n = id(&engine, "n");
    assert_eq!(engine.value(n, "hidden").unwrap(), StateValue::Bool(false));

    assert!(
        engine
            .apply_action_sync(&Action::named("g", "hidden", true))
            .unwrap()
            .success
    );
    assert_eq!(engine.value(n, "hidden").unwrap(), StateValue::Bool(true));
    assert!(!engine.used_default(n, "hidden").unwrap());
}
