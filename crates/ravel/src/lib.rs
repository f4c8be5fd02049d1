#![forbid(unsafe_code)]

//! `ravel` resolves documents made of typed nodes whose state variables depend on each other.
//!
//! Values are computed lazily from declared dependencies and cached until something they read
//! changes. Edits travel the other way: a desired value on any variable is pushed back through
//! inverse definitions until it lands in essential (persisted) state.
//!
//! ```
//! use ravel::{Action, Engine, NodeTree};
//! use serde_json::json;
//!
//! let tree = NodeTree::new("document").child(
//!     NodeTree::new("directedSegment")
//!         .named("seg")
//!         .attribute("endpoint", json!([1.0, 2.0]))
//!         .attribute("through", json!([4.0, 6.0])),
//! );
//! let mut engine = Engine::new(&tree).unwrap();
//! assert_eq!(engine.value_by_name("seg", "length").unwrap().to_f64(), 5.0);
//!
//! let outcome = engine
//!     .apply_action_sync(&Action::named("seg", "length", 10.0))
//!     .unwrap();
//! assert!(outcome.success);
//! assert_eq!(
//!     engine.value_by_name("seg", "endpoint").unwrap().as_point(),
//!     Some(vec![-2.0, -2.0])
//! );
//! ```

pub use ravel_core::*;

/// The dependency graph container and its algorithms.
pub mod graph {
    pub use ravel_graph::*;
}
