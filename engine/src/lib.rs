//! Preprocessing for large road networks.
//!
//! Turns raw map exports into dense directed graphs, extracts the largest
//! connected component and derives stream and batch edge weight updates
//! from vehicle trajectories.

#[macro_use]
pub mod report;
pub mod algo;
pub mod cli;
pub mod datastr;
pub mod error;
pub mod geo;
pub mod import;
pub mod io;
pub mod link_updates;
pub mod pipeline;

pub use error::{PrepError, Result};

pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
