//! Reading the raw node and edge files of a map export.
//!
//! Both files start with a column header line and a line holding the record count.
//! Fields are separated by tabs or spaces.

use crate::datastr::graph::{RawEdgeId, RawNodeId};
use crate::error::{PrepError, Result};
use crate::geo::Coordinate;
use csv::ReaderBuilder;
use glob::glob;
use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// Traversal permission of a raw edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Codes 0 and 1
    Both,
    /// Code 2, from the first to the second endpoint
    Forward,
    /// Code 3, from the second to the first endpoint
    Backward,
}

impl TryFrom<i64> for Direction {
    type Error = PrepError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 | 1 => Ok(Direction::Both),
            2 => Ok(Direction::Forward),
            3 => Ok(Direction::Backward),
            _ => Err(PrepError::InvalidDirection(code)),
        }
    }
}

/// One line of the node file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawVertex {
    pub primary: RawNodeId,
    pub secondary: RawNodeId,
    pub coord: Coordinate,
}

/// One line of the edge file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEdge {
    pub id: RawEdgeId,
    pub direction: Direction,
    /// recorded length in meters
    pub length: f64,
    pub from: RawNodeId,
    pub to: RawNodeId,
    pub speed_class: i64,
}

/// Anything which can hand out the raw vertices and edges of one dataset.
pub trait RoadExportSource {
    fn name(&self) -> &str;
    fn vertices(&self) -> Result<Vec<RawVertex>>;
    fn edges(&self) -> Result<Vec<RawEdge>>;
}

/// A dataset stored as `<name>.node` and `<name>.edge` text files.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    node_file: PathBuf,
    edge_file: PathBuf,
}

impl FileSource {
    pub fn new(name: impl Into<String>, node_file: PathBuf, edge_file: PathBuf) -> Self {
        FileSource {
            name: name.into(),
            node_file,
            edge_file,
        }
    }

    /// Dataset `name` in the `<source>/<name>/road/<name>.node|.edge` layout.
    pub fn in_directory(source: &Path, name: &str) -> Self {
        let dir = source.join(name).join("road");
        FileSource::new(name, dir.join(format!("{}.node", name)), dir.join(format!("{}.edge", name)))
    }
}

impl RoadExportSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn vertices(&self) -> Result<Vec<RawVertex>> {
        let mut vertices = Vec::new();
        let declared = read_records(&self.node_file, |fields| {
            if fields.len() < 4 {
                return Err(());
            }
            vertices.push(RawVertex {
                primary: fields[0].parse().map_err(drop)?,
                secondary: fields[fields.len() - 1].parse().map_err(drop)?,
                coord: Coordinate::new(fields[1].parse().map_err(drop)?, fields[2].parse().map_err(drop)?),
            });
            Ok(())
        })?;

        if declared != vertices.len() {
            return Err(PrepError::CountMismatch {
                what: "vertex count of node file",
                expected: declared,
                found: vertices.len(),
            });
        }
        tracing::info!(dataset = %self.name, vertices = vertices.len(), "read node file");
        Ok(vertices)
    }

    fn edges(&self) -> Result<Vec<RawEdge>> {
        let mut edges = Vec::new();
        let mut bad_direction = None;
        let declared = read_records(&self.edge_file, |fields| {
            if fields.len() < 11 {
                return Err(());
            }
            let code: i64 = fields[1].parse().map_err(drop)?;
            let direction = match Direction::try_from(code) {
                Ok(direction) => direction,
                Err(e) => {
                    bad_direction.get_or_insert(e);
                    return Ok(());
                }
            };
            edges.push(RawEdge {
                id: fields[0].parse().map_err(drop)?,
                direction,
                length: fields[2].parse().map_err(drop)?,
                from: fields[3].parse().map_err(drop)?,
                to: fields[4].parse().map_err(drop)?,
                speed_class: fields[5].parse().map_err(drop)?,
            });
            Ok(())
        })?;

        if let Some(e) = bad_direction {
            return Err(e);
        }
        if declared != edges.len() {
            tracing::warn!(dataset = %self.name, declared, found = edges.len(), "edge count differs from header");
        }
        tracing::info!(dataset = %self.name, edges = edges.len(), "read edge file");
        Ok(edges)
    }
}

/// Find all datasets below `source` following the `<name>/road/<name>.node` layout.
pub fn discover_datasets(source: &Path) -> Result<Vec<FileSource>> {
    let pattern = source.join("*").join("road").join("*.node");
    let pattern = pattern.to_string_lossy();
    let mut sources = Vec::new();

    let entries = glob(&pattern).map_err(|e| PrepError::Syntax {
        path: source.to_path_buf(),
        line: 0,
        content: e.to_string(),
    })?;
    for entry in entries {
        match entry {
            Ok(node_file) => {
                let name = match node_file.file_stem() {
                    Some(stem) => stem.to_string_lossy().into_owned(),
                    None => continue,
                };
                let edge_file = node_file.with_extension("edge");
                sources.push(FileSource::new(name, node_file, edge_file));
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sources)
}

/// Read an export file, pass the fields of every record to `f` and return the declared count.
/// `f` signals a malformed record with `Err(())`.
fn read_records<F>(path: &Path, mut f: F) -> Result<usize>
where
    F: FnMut(&[&str]) -> std::result::Result<(), ()>,
{
    let file = File::open(path).map_err(|source| PrepError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .quoting(false)
        .double_quote(false)
        .escape(None)
        .from_reader(file);

    let csv_err = |source| PrepError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut declared = None;
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map(|pos| pos.line() as usize).unwrap_or(i + 1);
        let fields: Vec<&str> = record.iter().flat_map(str::split_whitespace).collect();
        let syntax_error = || PrepError::Syntax {
            path: path.to_path_buf(),
            line,
            content: fields.join(" "),
        };

        if i == 0 {
            // column names
            continue;
        }
        if fields.is_empty() {
            continue;
        }
        match declared {
            None => {
                if fields.len() != 1 {
                    return Err(syntax_error());
                }
                declared = Some(fields[0].parse::<usize>().map_err(|_| syntax_error())?);
            }
            Some(_) => f(&fields).map_err(|_| syntax_error())?,
        }
    }

    declared.ok_or_else(|| PrepError::Syntax {
        path: path.to_path_buf(),
        line: 0,
        content: "missing record count".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn direction_codes() {
        assert_eq!(Direction::try_from(0).unwrap(), Direction::Both);
        assert_eq!(Direction::try_from(1).unwrap(), Direction::Both);
        assert_eq!(Direction::try_from(2).unwrap(), Direction::Forward);
        assert_eq!(Direction::try_from(3).unwrap(), Direction::Backward);
        assert!(matches!(Direction::try_from(4), Err(PrepError::InvalidDirection(4))));
    }

    #[test]
    fn read_mixed_separators() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new("test", dir.path().join("test.node"), dir.path().join("test.edge"));
        fs::write(
            dir.path().join("test.node"),
            "ID\tLon\tLat\tKind\tID2\n2\n1\t113.1 23.2\tx\t11\n2 113.2 23.3 x y 12\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("test.edge"),
            "ID\tDir\tLen\tA\tB\tSC\n1\n77\t2\t150\t1\t2\t6\ta b c d e\n",
        )
        .unwrap();

        let vertices = source.vertices().unwrap();
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[0].primary, 1);
        assert_eq!(vertices[0].secondary, 11);
        assert_eq!(vertices[1].secondary, 12);
        assert_eq!(vertices[1].coord, Coordinate::new(113.2, 23.3));

        let edges = source.edges().unwrap();
        assert_eq!(
            edges,
            vec![RawEdge {
                id: 77,
                direction: Direction::Forward,
                length: 150.0,
                from: 1,
                to: 2,
                speed_class: 6
            }]
        );
    }

    #[test]
    fn vertex_count_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new("test", dir.path().join("test.node"), dir.path().join("test.edge"));
        fs::write(dir.path().join("test.node"), "header\n3\n1 113.1 23.2 11\n").unwrap();
        assert!(matches!(source.vertices(), Err(PrepError::CountMismatch { expected: 3, found: 1, .. })));
    }

    #[test]
    fn short_records_are_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new("test", dir.path().join("test.node"), dir.path().join("test.edge"));
        fs::write(dir.path().join("test.node"), "header\n1\n1 113.1 23.2\n").unwrap();
        assert!(matches!(source.vertices(), Err(PrepError::Syntax { line: 3, .. })));
    }

    #[test]
    fn datasets_are_discovered() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["b", "a"] {
            let road = dir.path().join(name).join("road");
            fs::create_dir_all(&road).unwrap();
            fs::write(road.join(format!("{}.node", name)), "header\n0\n").unwrap();
        }
        let sources = discover_datasets(dir.path()).unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(sources[0].edge_file, dir.path().join("a").join("road").join("a.edge"));
    }
}
