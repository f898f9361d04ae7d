//! Graph algorithms used during preprocessing.

pub mod components;
