//! Graph types shared by the preprocessing stages.
//!
//! Graphs are exchanged between stages as plain weighted edge lists
//! (`n m` header, then `tail head weight` lines).
//! The component analysis works on a symmetrized adjacency view of such a list.

use crate::error::{PrepError, Result};
use crate::geo::Coordinate;
use crate::io::*;
use std::{collections::BTreeMap, io::prelude::*};

/// Node ids are 32bit unsigned ints
pub type NodeId = u32;
/// Edge ids are 32bit unsigned ints
pub type EdgeId = u32;
/// Weights are meters or seconds, always positive integers
pub type Weight = u32;
/// Vertex ids as they appear in the raw map export
pub type RawNodeId = u64;
/// Edge ids as they appear in the raw map export and in trajectories.
/// Trajectories may carry them with a sign to mark the driving direction.
pub type RawEdgeId = i64;
/// Unix timestamps in seconds
pub type Timestamp = u64;

/// Simple struct for weighted links.
/// No behaviour, just a pure data struct.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link {
    pub node: NodeId,
    pub weight: Weight,
}

/// Base trait for graphs.
pub trait Graph {
    fn num_nodes(&self) -> usize;
    fn num_arcs(&self) -> usize;
    fn degree(&self, node: NodeId) -> usize;
}

/// A directed edge carrying both weights of the road network.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirectedEdge {
    pub tail: NodeId,
    pub head: NodeId,
    pub distance: Weight,
    pub travel_time: Weight,
}

/// A graph as an edge list, the in memory form of `.gr`, `.dis` and `.time` files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeightedEdgeList {
    pub num_nodes: usize,
    pub edges: Vec<(NodeId, NodeId, Weight)>,
}

impl WeightedEdgeList {
    pub fn new(num_nodes: usize, edges: Vec<(NodeId, NodeId, Weight)>) -> Self {
        WeightedEdgeList { num_nodes, edges }
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

impl Load for WeightedEdgeList {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let (num_nodes, num_edges) = {
            let mut header = reader.expect_fields()?;
            (header.next::<usize>()?, header.next::<usize>()?)
        };

        let mut edges = Vec::with_capacity(num_edges);
        while let Some(mut fields) = reader.next_fields()? {
            edges.push((fields.next()?, fields.next()?, fields.next()?));
        }

        if edges.len() != num_edges {
            return Err(PrepError::CountMismatch {
                what: "edge count in graph file",
                expected: num_edges,
                found: edges.len(),
            });
        }

        Ok(WeightedEdgeList { num_nodes, edges })
    }
}

impl Store for WeightedEdgeList {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{} {}", self.num_nodes, self.edges.len())?;
        for &(tail, head, weight) in &self.edges {
            writeln!(out, "{} {} {}", tail, head, weight)?;
        }
        Ok(())
    }
}

/// Coordinates indexed by vertex id, stored on disk as micro-degrees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinateList(pub Vec<Coordinate>);

impl CoordinateList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<Coordinate> {
        self.0.get(node as usize).copied()
    }
}

impl Load for CoordinateList {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let num_nodes = reader.read_count()?;
        let mut coords = vec![Coordinate::default(); num_nodes];

        while let Some(mut fields) = reader.next_fields()? {
            let node: u64 = fields.next()?;
            let lon: i64 = fields.next()?;
            let lat: i64 = fields.next()?;
            match coords.get_mut(node as usize) {
                Some(coord) => *coord = Coordinate::from_micro_degrees(lon, lat),
                None => tracing::warn!(node, lon, lat, "coordinate of unknown vertex ignored"),
            }
        }

        Ok(CoordinateList(coords))
    }
}

impl Store for CoordinateList {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", self.0.len())?;
        for (node, coord) in self.0.iter().enumerate() {
            let (lon, lat) = coord.to_micro_degrees();
            writeln!(out, "{} {} {}", node, lon, lat)?;
        }
        Ok(())
    }
}

/// Symmetrized adjacency view of a directed edge list.
///
/// For every accepted line `(u, v, w)` the view contains `v` as a neighbor of `u`
/// and `u` as a neighbor of `v`, both with weight `w`.
/// When a pair occurs several times the first weight wins.
/// Neighbors are kept sorted by id.
#[derive(Debug, Clone)]
pub struct UndirectedGraph {
    neighbors: Vec<Vec<Link>>,
    num_arcs: usize,
}

/// Statistics about lines dropped while symmetrizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymmetrizeStats {
    pub invalid: usize,
    pub parallel: usize,
}

impl UndirectedGraph {
    pub fn symmetrize(graph: &WeightedEdgeList) -> (Self, SymmetrizeStats) {
        let n = graph.num_nodes;
        let mut adjacency: Vec<BTreeMap<NodeId, Weight>> = vec![BTreeMap::new(); n];
        let mut stats = SymmetrizeStats::default();

        for &(tail, head, weight) in &graph.edges {
            if tail as usize >= n || head as usize >= n || weight == 0 {
                tracing::warn!(tail, head, weight, "invalid graph line skipped");
                stats.invalid += 1;
                continue;
            }
            if adjacency[tail as usize].contains_key(&head) {
                stats.parallel += 1;
                continue;
            }
            adjacency[tail as usize].insert(head, weight);
            adjacency[head as usize].insert(tail, weight);
        }

        let neighbors: Vec<Vec<Link>> = adjacency
            .into_iter()
            .map(|links| links.into_iter().map(|(node, weight)| Link { node, weight }).collect())
            .collect();
        let num_arcs = neighbors.iter().map(Vec::len).sum();

        (UndirectedGraph { neighbors, num_arcs }, stats)
    }

    pub fn neighbors(&self, node: NodeId) -> &[Link] {
        &self.neighbors[node as usize]
    }

    /// Weight of the link between `u` and `v` if they are adjacent.
    pub fn link_weight(&self, u: NodeId, v: NodeId) -> Option<Weight> {
        let links = self.neighbors.get(u as usize)?;
        links
            .binary_search_by_key(&v, |link| link.node)
            .ok()
            .map(|idx| links[idx].weight)
    }
}

impl Graph for UndirectedGraph {
    fn num_nodes(&self) -> usize {
        self.neighbors.len()
    }

    fn num_arcs(&self) -> usize {
        self.num_arcs
    }

    fn degree(&self, node: NodeId) -> usize {
        self.neighbors[node as usize].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_list_round_trip() {
        let graph = WeightedEdgeList::new(3, vec![(0, 1, 5), (1, 2, 7), (2, 0, 1)]);
        let text = store_to_string(&graph);
        assert_eq!(text, "3 3\n0 1 5\n1 2 7\n2 0 1\n");
        let reloaded = WeightedEdgeList::load(&mut reader_for(&text)).unwrap();
        assert_eq!(reloaded, graph);
    }

    #[test]
    fn edge_count_must_match_header() {
        let result = WeightedEdgeList::load(&mut reader_for("2 2\n0 1 5\n"));
        assert!(matches!(result, Err(PrepError::CountMismatch { expected: 2, found: 1, .. })));
    }

    #[test]
    fn coordinates_round_trip() {
        let text = "2\n0 113264400 23129100\n1 114057900 22543100\n";
        let coords = CoordinateList::load(&mut reader_for(text)).unwrap();
        assert_eq!(coords.len(), 2);
        assert_eq!(store_to_string(&coords), text);
    }

    #[test]
    fn out_of_range_coordinates_are_ignored() {
        let coords = CoordinateList::load(&mut reader_for("1\n0 1 2\n5 3 4\n")).unwrap();
        assert_eq!(coords.len(), 1);
        assert_eq!(coords.get(0).unwrap().to_micro_degrees(), (1, 2));
    }

    //    5
    // 0 --- 1
    //  \    |
    //   \3  | 4 (listed twice, first wins)
    //    \  |
    //     2
    #[test]
    fn symmetrize_keeps_first_weight() {
        let list = WeightedEdgeList::new(4, vec![(0, 1, 5), (1, 2, 4), (2, 1, 9), (2, 0, 3), (3, 7, 1), (3, 0, 0)]);
        let (graph, stats) = UndirectedGraph::symmetrize(&list);

        assert_eq!(stats, SymmetrizeStats { invalid: 2, parallel: 1 });
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.num_arcs(), 6);
        assert_eq!(graph.neighbors(0), &[Link { node: 1, weight: 5 }, Link { node: 2, weight: 3 }][..]);
        assert_eq!(graph.link_weight(2, 1), Some(4));
        assert_eq!(graph.link_weight(1, 2), Some(4));
        assert_eq!(graph.degree(3), 0);
        assert_eq!(graph.link_weight(0, 3), None);
    }
}
