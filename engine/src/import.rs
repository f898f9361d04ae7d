//! Import of raw road network exports.
//!
//! `raw` reads the node and edge files of the export, `identity` collapses
//! the two ids a vertex may carry into one dense id and `graph_builder`
//! turns raw edges into the directed distance and travel time graphs.

pub mod graph_builder;
pub mod identity;
pub mod raw;
