//! The standard component library.
//!
//! Every type is assembled from [`fragments`] plus its own variables; there is no inheritance
//! between component types.

mod basic;
mod composites;
pub mod fragments;
mod geometry;
mod lists;

pub use composites::MAX_REPEAT_INSTANCES;

use crate::registry::ComponentType;

pub(crate) fn standard_types() -> Vec<ComponentType> {
    vec![
        basic::document(),
        basic::group(),
        basic::number(),
        basic::boolean(),
        basic::text(),
        basic::lookup(),
        geometry::point(),
        geometry::directed_segment(),
        lists::number_list(),
        lists::sum(),
        composites::collect(),
        composites::repeat(),
        composites::repeat_value(),
        composites::repeat_index(),
        composites::extend(),
    ]
}
