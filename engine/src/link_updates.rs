//! Edge weight updates derived from vehicle trajectories.
//!
//! `trajectory` parses trips, `stream` turns their hops into per edge
//! observations, a time ordered update stream and shortest path queries,
//! `batch` aggregates the observations into per slot batches of significant changes.

pub mod batch;
pub mod stream;
pub mod trajectory;
