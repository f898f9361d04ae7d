//! Error type shared by all preprocessing stages.
//!
//! Every fatal condition of the pipeline maps to one variant.
//! Conditions which only drop a single record (an invalid edge line,
//! a trajectory hop outside the component) are not errors,
//! they get logged and counted by the stage which encounters them.

use crate::datastr::graph::{NodeId, RawEdgeId, RawNodeId};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("could not access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("wrong syntax in {path:?} line {line}: {content:?}")]
    Syntax { path: PathBuf, line: usize, content: String },
    #[error("inconsistent {what}: expected {expected}, found {found}")]
    CountMismatch { what: &'static str, expected: usize, found: usize },
    #[error("vertex {primary} registered twice (record {record})")]
    DuplicateVertex { primary: RawNodeId, record: usize },
    #[error("vertex {primary} with secondary id {secondary} would merge two distinct vertices")]
    ConflictingAlias { primary: RawNodeId, secondary: RawNodeId },
    #[error("edge {0} already exists")]
    DuplicateEdge(RawEdgeId),
    #[error("edge {edge} references unregistered vertex {vertex}")]
    UnknownVertex { edge: RawEdgeId, vertex: RawNodeId },
    #[error("wrong direction code {0}")]
    InvalidDirection(i64),
    #[error("unknown speed class {0}")]
    InvalidSpeedClass(i64),
    #[error("{what} id {id} out of range 0..{bound}")]
    IdOutOfRange { what: &'static str, id: u64, bound: usize },
    #[error("distance and travel time graph disagree on the neighbors of vertex {node}")]
    InconsistentNeighbors { node: NodeId },
    #[error("travel time {weight} on edge {src} -> {dst} is below one second")]
    NonPositiveTravelTime { src: NodeId, dst: NodeId, weight: i64 },
    #[error("trip {car} starts or ends {distance:.1}m away from the nearest vertex {node}")]
    QueryEndpointTooFar { car: String, node: NodeId, distance: f64 },
    #[error("edge {src} -> {dst} does not exist in the largest component")]
    MissingEdge { src: NodeId, dst: NodeId },
    #[error("{layer} has no entry for {id}")]
    Translation { layer: &'static str, id: i64 },
    #[error("duplicate entry for {id} in {layer}")]
    DuplicateTranslation { layer: &'static str, id: i64 },
    #[error("edge {src} -> {dst} is referenced by several raw edges")]
    ParallelEdge { src: NodeId, dst: NodeId },
    #[error("{0} is not a valid YYYYMMDD day")]
    InvalidDay(u32),
    #[error("batch slots must be at least one second long")]
    ZeroInterval,
}

pub type Result<T> = std::result::Result<T, PrepError>;

/// Attach the offending path to plain io errors.
pub trait IoContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| PrepError::Io { path: path.to_path_buf(), source })
    }
}
