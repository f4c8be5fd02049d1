use crate::*;
use serde_json::json;

mod actions;
mod composites;
mod resolution;

fn build(tree: NodeTree) -> Engine {
    Engine::new(&tree).unwrap()
}

fn id(engine: &Engine, name: &str) -> NodeId {
    engine
        .node_id(name)
        .unwrap_or_else(|| panic!("no node named {name:?}"))
}

fn num(engine: &mut Engine, name: &str, variable: &str) -> f64 {
    engine.value_by_name(name, variable).unwrap().to_f64()
}

fn point(engine: &mut Engine, name: &str, variable: &str) -> Vec<f64> {
    engine
        .value_by_name(name, variable)
        .unwrap()
        .as_point()
        .unwrap_or_else(|| panic!("{name}.{variable} is not a point"))
}

fn number(name: &str, value: f64) -> NodeTree {
    NodeTree::new("number").named(name).attribute("value", json!(value))
}

fn point_at(name: &str, x: f64, y: f64) -> NodeTree {
    NodeTree::new("point")
        .named(name)
        .attribute("x", json!(x))
        .attribute("y", json!(y))
}

fn segment(name: &str, endpoint: [f64; 2], through: [f64; 2]) -> NodeTree {
    NodeTree::new("directedSegment")
        .named(name)
        .attribute("endpoint", json!(endpoint))
        .attribute("through", json!(through))
}

fn repeat(name: &str, count: f64, template: NodeTree) -> NodeTree {
    NodeTree::new("repeat")
        .named(name)
        .attribute("count", json!(count))
        .child(template)
}
