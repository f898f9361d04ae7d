//! Data structures shared by the preprocessing stages.

pub mod graph;
pub mod id_translator;
