use super::*;
use std::sync::{Arc, Mutex};

#[test]
fn numbers_read_attributes_or_their_first_child() {
    let tree = NodeTree::new("document")
        .child(number("a", 3.0))
        .child(NodeTree::new("number").named("b").text_child("4"))
        .child(NodeTree::new("number").named("c"));
    let mut engine = build(tree);

    assert_eq!(num(&mut engine, "a", "value"), 3.0);
    assert_eq!(num(&mut engine, "b", "value"), 4.0);
    assert!(num(&mut engine, "c", "value").is_nan());
    assert!(!engine.used_default(id(&engine, "b"), "value").unwrap());
    assert!(engine.used_default(id(&engine, "c"), "value").unwrap());
}

#[test]
fn sum_adds_numbers_and_number_lists() {
    let tree = NodeTree::new("document").child(
        NodeTree::new("sum")
            .named("s")
            .child(number("one", 1.0))
            .child(number("two", 2.0))
            .child(
                NodeTree::new("numberList")
                    .named("rest")
                    .attribute("numbers", json!("3 4")),
            ),
    );
    let mut engine = build(tree);
    assert_eq!(num(&mut engine, "s", "value"), 10.0);
    assert_eq!(num(&mut engine, "rest", "length"), 2.0);
}

#[test]
fn resolution_does_not_depend_on_read_order() {
    let tree = NodeTree::new("document")
        .child(segment("seg", [1.0, 2.0], [4.0, 6.0]))
        .child(
            NodeTree::new("sum")
                .named("s")
                .child(number("x", 1.5))
                .child(number("y", 2.5)),
        );

    let mut forward = build(tree.clone());
    let mut backward = build(tree);
    for name in ["direction", "length", "midpoint"] {
        forward.value_by_name("seg", name).unwrap();
    }
    for name in ["midpoint", "length", "direction"] {
        backward.value_by_name("seg", name).unwrap();
    }
    backward.value_by_name("s", "value").unwrap();

    assert_eq!(forward.snapshot(), backward.snapshot());
}

#[test]
fn repeated_reads_do_not_reevaluate() {
    let tree = NodeTree::new("document").child(segment("seg", [0.0, 0.0], [3.0, 4.0]));
    let mut engine = build(tree);
    let seg = id(&engine, "seg");
    let before = engine.evaluation_count(seg, "length").unwrap();

    for _ in 0..3 {
        assert_eq!(num(&mut engine, "seg", "length"), 5.0);
    }
    engine.snapshot();

    assert_eq!(engine.evaluation_count(seg, "length").unwrap(), before);
    assert!(engine.stale_variables().is_empty());
}

fn cascade(doc: Option<bool>, group: Option<bool>, leaf: Option<bool>) -> (bool, bool, bool, bool) {
    let with = |tree: NodeTree, hidden: Option<bool>| match hidden {
        Some(hidden) => tree.attribute("hidden", json!(hidden)),
        None => tree,
    };
    let tree = with(NodeTree::new("document"), doc).child(with(
        NodeTree::new("group").named("g"),
        group,
    )
    .child(with(NodeTree::new("number").named("n"), leaf)));
    let mut engine = build(tree);
    let g = id(&engine, "g");
    let n = id(&engine, "n");
    (
        engine.value(g, "hidden").unwrap().as_bool().unwrap(),
        engine.used_default(g, "hidden").unwrap(),
        engine.value(n, "hidden").unwrap().as_bool().unwrap(),
        engine.used_default(n, "hidden").unwrap(),
    )
}

#[test]
fn hidden_cascades_from_the_nearest_explicit_container() {
    // (group value, group used default, leaf value, leaf used default)
    assert_eq!(cascade(None, None, None), (false, true, false, true));
    assert_eq!(cascade(Some(true), None, None), (true, false, true, false));
    assert_eq!(cascade(Some(true), Some(false), None), (false, false, false, false));
    assert_eq!(cascade(None, Some(true), None), (true, false, true, false));
    assert_eq!(cascade(None, None, Some(true)), (false, true, true, false));
    assert_eq!(cascade(Some(true), None, Some(false)), (true, false, false, false));
}

#[test]
fn cycles_resolve_to_invalid_without_affecting_other_nodes() {
    let tree = NodeTree::new("document")
        .child(
            NodeTree::new("lookup")
                .named("l1")
                .attribute("target", json!("l2")),
        )
        .child(
            NodeTree::new("lookup")
                .named("l2")
                .attribute("target", json!("l1")),
        )
        .child(number("ok", 5.0));
    let mut engine = build(tree);

    assert_eq!(engine.value_by_name("l1", "value").unwrap(), StateValue::Invalid);
    assert_eq!(engine.value_by_name("l2", "value").unwrap(), StateValue::Invalid);
    assert_eq!(num(&mut engine, "ok", "value"), 5.0);

    let errors: Vec<&Diagnostic> = engine
        .diagnostics()
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].message.starts_with("circular dependency"));

    let l1 = id(&engine, "l1");
    let cycles = engine.static_cycles();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].contains(&(l1, "value".to_string())));
}

#[test]
fn array_entries_are_computed_only_when_read() {
    let requested = Arc::new(Mutex::new(Vec::new()));
    let log = requested.clone();
    let mut registry = ComponentRegistry::standard();
    registry
        .register(
            ComponentType::new("squares").var(
                StateVarDef::array("squares")
                    .static_deps(vec![("n", DependencySpec::attribute("n"))])
                    .size(|deps| deps.number("n") as usize)
                    .entries(move |_, wanted| {
                        log.lock().unwrap().extend_from_slice(wanted);
                        wanted
                            .iter()
                            .map(|&i| (i, StateValue::Number((i * i) as f64)))
                            .collect()
                    }),
            ),
        )
        .unwrap();
    let tree = NodeTree::new("document")
        .child(NodeTree::new("squares").named("p").attribute("n", json!(5)));
    let mut engine = Engine::with_options(
        &tree,
        EngineOptions::default().with_registry(Arc::new(registry)),
    )
    .unwrap();
    let p = id(&engine, "p");

    assert_eq!(engine.array_size(p, "squares").unwrap(), 5);
    assert!(requested.lock().unwrap().is_empty());

    assert_eq!(engine.entry(p, "squares", 3).unwrap(), StateValue::Number(9.0));
    assert_eq!(engine.entry(p, "squares", 3).unwrap(), StateValue::Number(9.0));
    assert_eq!(*requested.lock().unwrap(), vec![3]);

    let all = engine.value(p, "squares").unwrap();
    assert_eq!(all.as_point().unwrap(), vec![0.0, 1.0, 4.0, 9.0, 16.0]);
    assert_eq!(*requested.lock().unwrap(), vec![3, 0, 1, 2, 4]);
}

#[test]
fn companion_variables_come_from_their_primary_definition() {
    let mut registry = ComponentRegistry::standard();
    registry
        .register(
            ComponentType::new("pair")
                .var(components::fragments::essential_number("a", 0.0))
                .var(components::fragments::essential_number("b", 0.0))
                .var(
                    StateVarDef::scalar("sum")
                        .static_deps(vec![
                            ("a", DependencySpec::own("a")),
                            ("b", DependencySpec::own("b")),
                        ])
                        .define(|deps| {
                            let (a, b) = (deps.number("a"), deps.number("b"));
                            Defined::value(a + b).with_additional("product", a * b)
                        }),
                )
                .var(StateVarDef::companion("product", "sum")),
        )
        .unwrap();
    let tree = NodeTree::new("document").child(
        NodeTree::new("pair")
            .named("p")
            .attribute("a", json!(1))
            .attribute("b", json!(3)),
    );
    let mut engine = Engine::with_options(
        &tree,
        EngineOptions::default().with_registry(Arc::new(registry)),
    )
    .unwrap();
    let p = id(&engine, "p");

    assert_eq!(num(&mut engine, "p", "sum"), 4.0);
    assert_eq!(num(&mut engine, "p", "product"), 3.0);
    let runs = engine.evaluation_count(p, "sum").unwrap();
    assert_eq!(num(&mut engine, "p", "product"), 3.0);
    assert_eq!(engine.evaluation_count(p, "sum").unwrap(), runs);

    let outcome = engine.apply_action_sync(&Action::named("p", "a", 10.0)).unwrap();
    assert!(outcome.success);
    assert!(!engine.is_fresh(p, "product").unwrap());
    assert_eq!(num(&mut engine, "p", "product"), 30.0);
    assert_eq!(num(&mut engine, "p", "sum"), 13.0);
    assert_eq!(engine.evaluation_count(p, "sum").unwrap(), runs + 1);
}

#[test]
fn lookup_reads_whole_values_entries_and_sizes() {
    let tree = NodeTree::new("document")
        .child(number("a", 2.0))
        .child(
            NodeTree::new("numberList")
                .named("list")
                .attribute("numbers", json!([1, 2, 3])),
        )
        .child(NodeTree::new("lookup").named("whole").attribute("target", json!("a")))
        .child(
            NodeTree::new("lookup")
                .named("second")
                .attribute("target", json!("list"))
                .attribute("variable", json!("numbers[2]")),
        )
        .child(
            NodeTree::new("lookup")
                .named("size")
                .attribute("target", json!("list"))
                .attribute("variable", json!("numbers.size")),
        );
    let mut engine = build(tree);

    assert_eq!(num(&mut engine, "whole", "value"), 2.0);
    assert_eq!(num(&mut engine, "second", "value"), 2.0);
    assert_eq!(num(&mut engine, "size", "value"), 3.0);
    assert!(engine.diagnostics().is_empty());
}

#[test]
fn lookup_target_can_be_computed_by_a_component() {
    let tree = NodeTree::new("document")
        .child(number("a", 2.0))
        .child(number("b", 7.0))
        .child(NodeTree::new("text").named("which").attribute("value", json!("a")))
        .child(
            NodeTree::new("lookup")
                .named("l")
                .attribute_component(
                    "target",
                    NodeTree::new("lookup").attribute("target", json!("which")),
                ),
        );
    let mut engine = build(tree);
    assert_eq!(num(&mut engine, "l", "value"), 2.0);

    let outcome = engine
        .apply_action_sync(&Action::named("which", "value", "b"))
        .unwrap();
    assert!(outcome.success);
    assert_eq!(num(&mut engine, "l", "value"), 7.0);
}

#[test]
fn missing_lookup_target_warns_and_reads_null() {
    let tree = NodeTree::new("document").child(
        NodeTree::new("lookup")
            .named("l")
            .attribute("target", json!("nowhere")),
    );
    let mut engine = build(tree);

    assert_eq!(engine.value_by_name("l", "value").unwrap(), StateValue::Null);
    assert!(engine.used_default(id(&engine, "l"), "value").unwrap());
    let warning = &engine.diagnostics()[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert!(warning.message.contains("nowhere"));
}

#[test]
fn unsettled_declarations_stop_at_the_configured_round_limit() {
    let mut registry = ComponentRegistry::standard();
    registry
        .register(
            ComponentType::new("restless").var(
                StateVarDef::scalar("rounds")
                    .deps(|ctx| vec![(format!("round{}", ctx.round), DependencySpec::Identity)])
                    .define(|deps| Defined::value(deps.len() as f64)),
            ),
        )
        .unwrap();
    let mut config = RavelConfig::default();
    config.set_value("resolution.maxDeclarationRounds", json!(3));
    let tree = NodeTree::new("document").child(NodeTree::new("restless").named("r"));
    let mut engine = Engine::with_options(
        &tree,
        EngineOptions::default()
            .with_registry(Arc::new(registry))
            .with_config(config),
    )
    .unwrap();

    assert_eq!(num(&mut engine, "r", "rounds"), 3.0);
    assert!(
        engine
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("did not settle after 3 declaration rounds"))
    );
}
