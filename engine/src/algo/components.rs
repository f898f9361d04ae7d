//! Connected components of the symmetrized road graph and extraction of the largest one.
//!
//! The search is an iterative DFS with an explicit stack so that continent sized
//! networks do not overflow the call stack.
//! Vertices are marked when pushed, so every vertex enters the stack at most once.

use crate::datastr::graph::*;
use crate::datastr::id_translator::IdMap;
use crate::error::{PrepError, Result};
use crate::geo::extreme_point_diameter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    /// pushed, not yet expanded
    Frontier,
    Visited,
}

/// A connected component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// sorted ascending
    pub nodes: Vec<NodeId>,
    /// Number of neighbor entries scanned while exploring the component.
    /// Equals twice the number of distinct undirected links.
    pub traversed_arcs: usize,
}

impl Component {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// All components in discovery order.
/// Seeds are taken in increasing vertex id order.
pub fn connected_components(graph: &UndirectedGraph) -> Vec<Component> {
    let n = graph.num_nodes();
    let mut state = vec![VisitState::Unvisited; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();

    for seed in 0..n {
        if state[seed] != VisitState::Unvisited {
            continue;
        }

        let mut nodes = Vec::new();
        let mut traversed_arcs = 0;
        state[seed] = VisitState::Frontier;
        stack.push(seed as NodeId);

        while let Some(node) = stack.pop() {
            state[node as usize] = VisitState::Visited;
            nodes.push(node);

            for link in graph.neighbors(node) {
                traversed_arcs += 1;
                if state[link.node as usize] == VisitState::Unvisited {
                    state[link.node as usize] = VisitState::Frontier;
                    stack.push(link.node);
                }
            }
        }

        nodes.sort_unstable();
        components.push(Component { nodes, traversed_arcs });
    }

    components
}

/// Index of the largest component. On ties the first discovered one wins.
pub fn largest(components: &[Component]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, component) in components.iter().enumerate() {
        if best.map_or(true, |b| component.len() > components[b].len()) {
            best = Some(idx);
        }
    }
    best
}

/// The largest component renumbered densely, ready to be written.
#[derive(Debug, Clone)]
pub struct LargestComponent {
    /// old vertex id to component vertex id, ascending in both
    pub id_map: IdMap<NodeId, NodeId>,
    pub time: WeightedEdgeList,
    pub distance: WeightedEdgeList,
    pub coordinates: CoordinateList,
    pub num_components: usize,
    /// vertex count of every component, largest first
    pub component_sizes: Vec<usize>,
    /// approximate extent in meters
    pub diameter: f64,
}

/// Find the largest component of the symmetrized travel time graph and
/// emit symmetric time and distance graphs restricted to it.
pub fn extract_largest_component(time: &WeightedEdgeList, distance: &WeightedEdgeList, coords: &CoordinateList) -> Result<LargestComponent> {
    if time.num_nodes != distance.num_nodes {
        return Err(PrepError::CountMismatch {
            what: "vertex count of distance graph",
            expected: time.num_nodes,
            found: distance.num_nodes,
        });
    }
    if coords.len() != time.num_nodes {
        return Err(PrepError::CountMismatch {
            what: "coordinate count",
            expected: time.num_nodes,
            found: coords.len(),
        });
    }

    let (time_graph, time_stats) = UndirectedGraph::symmetrize(time);
    let (distance_graph, distance_stats) = UndirectedGraph::symmetrize(distance);
    tracing::info!(
        nodes = time_graph.num_nodes(),
        arcs = time_graph.num_arcs(),
        invalid = time_stats.invalid,
        parallel = time_stats.parallel,
        "symmetrized travel time graph"
    );
    tracing::debug!(invalid = distance_stats.invalid, parallel = distance_stats.parallel, "symmetrized distance graph");

    let components = connected_components(&time_graph);
    let lcc = match largest(&components) {
        Some(idx) => &components[idx],
        None => {
            return Ok(LargestComponent {
                id_map: IdMap::new(0, Vec::new()),
                time: WeightedEdgeList::default(),
                distance: WeightedEdgeList::default(),
                coordinates: CoordinateList::default(),
                num_components: 0,
                component_sizes: Vec::new(),
                diameter: 0.0,
            })
        }
    };
    tracing::info!(
        components = components.len(),
        lcc_nodes = lcc.len(),
        lcc_arcs = lcc.traversed_arcs,
        "found largest connected component"
    );

    let mut new_ids = vec![None; time_graph.num_nodes()];
    for (new, &old) in lcc.nodes.iter().enumerate() {
        new_ids[old as usize] = Some(new as NodeId);
    }

    let mut time_edges = Vec::with_capacity(lcc.traversed_arcs);
    let mut distance_edges = Vec::with_capacity(lcc.traversed_arcs);
    for &old in &lcc.nodes {
        let time_links = time_graph.neighbors(old);
        let distance_links = distance_graph.neighbors(old);
        if time_links.len() != distance_links.len() || time_links.iter().zip(distance_links).any(|(t, d)| t.node != d.node) {
            return Err(PrepError::InconsistentNeighbors { node: old });
        }

        let tail = component_id(&new_ids, old)?;
        for (t, d) in time_links.iter().zip(distance_links) {
            let head = component_id(&new_ids, t.node)?;
            time_edges.push((tail, head, t.weight));
            distance_edges.push((tail, head, d.weight));
        }
    }

    let mut component_sizes: Vec<usize> = components.iter().map(Component::len).collect();
    component_sizes.sort_unstable_by(|a, b| b.cmp(a));

    let coordinates: Vec<_> = lcc.nodes.iter().filter_map(|&old| coords.get(old)).collect();
    let diameter = extreme_point_diameter(&coordinates);
    tracing::info!("diameter of the largest component: {:.3} km", diameter / 1000.0);

    Ok(LargestComponent {
        id_map: IdMap::new(lcc.len(), lcc.nodes.iter().enumerate().map(|(new, &old)| (old, new as NodeId)).collect()),
        time: WeightedEdgeList::new(lcc.len(), time_edges),
        distance: WeightedEdgeList::new(lcc.len(), distance_edges),
        coordinates: CoordinateList(coordinates),
        num_components: components.len(),
        component_sizes,
        diameter,
    })
}

// every neighbor of a component vertex is in the component
fn component_id(new_ids: &[Option<NodeId>], old: NodeId) -> Result<NodeId> {
    new_ids.get(old as usize).copied().flatten().ok_or(PrepError::Translation {
        layer: "component id map",
        id: i64::from(old),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    fn graph(n: usize, edges: &[(NodeId, NodeId, Weight)]) -> WeightedEdgeList {
        WeightedEdgeList::new(n, edges.to_vec())
    }

    fn coords(n: usize) -> CoordinateList {
        CoordinateList((0..n).map(|i| Coordinate::new(113.0 + 0.01 * i as f64, 23.0)).collect())
    }

    //  0 --- 1      3 --- 4
    //   \   /        \   /
    //    \ /          \ /
    //     2            5
    #[test]
    fn two_triangles_first_discovered_wins() {
        let edges = [(0, 1, 1), (1, 2, 1), (2, 0, 1), (3, 4, 1), (4, 5, 1), (5, 3, 1)];
        let time = graph(6, &edges);
        let result = extract_largest_component(&time, &time, &coords(6)).unwrap();

        assert_eq!(result.num_components, 2);
        assert_eq!(result.component_sizes, vec![3, 3]);
        assert_eq!(result.id_map.entries, vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(result.time.num_nodes, 3);
        assert_eq!(result.time.num_edges(), 6);
        assert_eq!(result.distance.num_edges(), 6);
    }

    //  0 -- 1    2 -- 3 -- 4
    //                 |
    //                 5
    #[test]
    fn larger_component_is_renumbered() {
        let time = graph(6, &[(0, 1, 3), (2, 3, 4), (3, 4, 5), (5, 3, 6)]);
        let distance = graph(6, &[(0, 1, 30), (2, 3, 40), (4, 3, 50), (3, 5, 60)]);
        let result = extract_largest_component(&time, &distance, &coords(6)).unwrap();

        assert_eq!(result.id_map.count, 4);
        assert_eq!(result.id_map.entries, vec![(2, 0), (3, 1), (4, 2), (5, 3)]);
        assert_eq!(result.time.edges, vec![(0, 1, 4), (1, 0, 4), (1, 2, 5), (1, 3, 6), (2, 1, 5), (3, 1, 6)]);
        assert_eq!(result.distance.edges, vec![(0, 1, 40), (1, 0, 40), (1, 2, 50), (1, 3, 60), (2, 1, 50), (3, 1, 60)]);
        assert_eq!(result.coordinates.len(), 4);
        assert_eq!(result.coordinates.get(0), coords(6).get(2));
    }

    #[test]
    fn every_vertex_lands_in_exactly_one_component() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(1234);
        let n = 200;
        let edges: Vec<_> = (0..150).map(|_| (rng.gen_range(0..n as NodeId), rng.gen_range(0..n as NodeId), rng.gen_range(1..100))).collect();
        let (undirected, _) = UndirectedGraph::symmetrize(&graph(n, &edges));
        let components = connected_components(&undirected);

        let mut seen: Vec<NodeId> = components.iter().flat_map(|c| c.nodes.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n as NodeId).collect::<Vec<_>>());
        assert_eq!(components.iter().map(|c| c.traversed_arcs).sum::<usize>(), undirected.num_arcs());

        let lcc = &components[largest(&components).unwrap()];
        assert!(components.iter().all(|c| c.len() <= lcc.len()));
    }

    #[test]
    fn vertices_outside_the_component_have_no_component_id() {
        let new_ids = [Some(0), None, Some(1)];
        assert_eq!(component_id(&new_ids, 2).unwrap(), 1);
        assert!(matches!(
            component_id(&new_ids, 1),
            Err(PrepError::Translation { layer: "component id map", id: 1 })
        ));
        assert!(component_id(&new_ids, 7).is_err());
    }

    #[test]
    fn mismatching_neighbors_are_fatal() {
        let time = graph(3, &[(0, 1, 1), (1, 2, 1)]);
        let distance = graph(3, &[(0, 1, 1), (0, 2, 1)]);
        assert!(matches!(
            extract_largest_component(&time, &distance, &coords(3)),
            Err(PrepError::InconsistentNeighbors { .. })
        ));
    }

    #[test]
    fn coordinate_count_must_match() {
        let time = graph(3, &[(0, 1, 1)]);
        assert!(matches!(
            extract_largest_component(&time, &time, &coords(2)),
            Err(PrepError::CountMismatch { .. })
        ));
    }
}
