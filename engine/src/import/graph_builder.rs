//! Building the directed distance and travel time graphs from raw edges.

use crate::datastr::graph::*;
use crate::datastr::id_translator::{EdgeToNodeMap, IdMap};
use crate::error::{PrepError, Result};
use crate::geo::Coordinate;
use crate::import::identity::IdentityMapper;
use crate::import::raw::{Direction, RawEdge};
use std::collections::{BTreeMap, HashMap};

/// Free flow speeds in m/s for speed classes 2 to 8.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTable {
    pub speeds: [f64; 7],
}

impl Default for SpeedTable {
    fn default() -> Self {
        // 120, 100, 80, 60, 40, 30 and 10 km/h
        SpeedTable {
            speeds: [33.33, 27.77, 22.22, 16.66, 11.11, 8.33, 2.77],
        }
    }
}

impl SpeedTable {
    pub const FIRST_CLASS: i64 = 2;

    pub fn speed(&self, class: i64) -> Result<f64> {
        usize::try_from(class - Self::FIRST_CLASS)
            .ok()
            .and_then(|idx| self.speeds.get(idx).copied())
            .ok_or(PrepError::InvalidSpeedClass(class))
    }

    /// Seconds needed for `distance` meters at the speed of `class`, rounded up.
    pub fn travel_time(&self, class: i64, distance: Weight) -> Result<Weight> {
        Ok((f64::from(distance) / self.speed(class)?).ceil() as Weight)
    }
}

/// Replacement of recorded lengths shorter than the great-circle distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRepair {
    /// meters added to the great-circle distance
    pub slack: f64,
    pub factor: f64,
}

impl Default for DistanceRepair {
    fn default() -> Self {
        DistanceRepair { slack: 2.0, factor: 1.05 }
    }
}

impl DistanceRepair {
    /// The length to use and whether it had to be repaired.
    ///
    /// The recorded length is rounded to whole meters before the check,
    /// so the result never undercuts the great-circle distance.
    pub fn apply(&self, recorded: f64, great_circle: f64) -> (Weight, bool) {
        let recorded = recorded.round();
        if recorded < great_circle {
            let repaired = (great_circle + self.slack).max(great_circle * self.factor).round();
            (repaired as Weight, true)
        } else {
            (recorded as Weight, false)
        }
    }
}

/// Accumulates raw edges into directed edges with dense ids.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    speeds: SpeedTable,
    repair: DistanceRepair,
    edges: Vec<DirectedEdge>,
    edge_ids: HashMap<RawEdgeId, EdgeId>,
    endpoints: Vec<(RawEdgeId, NodeId, NodeId)>,
    speed_histogram: BTreeMap<i64, usize>,
    repaired: usize,
}

impl GraphBuilder {
    pub fn new(speeds: SpeedTable, repair: DistanceRepair) -> Self {
        GraphBuilder {
            speeds,
            repair,
            ..Default::default()
        }
    }

    /// Add one raw edge. Both endpoints have to be registered with `mapper` already.
    pub fn add_edge(&mut self, mapper: &IdentityMapper, edge: &RawEdge) -> Result<()> {
        let resolve = |vertex| mapper.resolve(vertex).ok_or(PrepError::UnknownVertex { edge: edge.id, vertex });
        let from = resolve(edge.from)?;
        let to = resolve(edge.to)?;

        if self.edge_ids.contains_key(&edge.id) {
            return Err(PrepError::DuplicateEdge(edge.id));
        }

        let great_circle = mapper.coordinate(from).distance_to(mapper.coordinate(to));
        let (distance, repaired) = self.repair.apply(edge.length, great_circle);
        if repaired {
            tracing::warn!(edge = edge.id, recorded = edge.length, great_circle, repaired = distance, "invalid edge distance");
            self.repaired += 1;
        }
        let travel_time = self.speeds.travel_time(edge.speed_class, distance)?;

        let dense = self.endpoints.len() as EdgeId;
        self.edge_ids.insert(edge.id, dense);
        self.endpoints.push((edge.id, from, to));
        *self.speed_histogram.entry(edge.speed_class).or_insert(0) += 1;

        let forward = DirectedEdge {
            tail: from,
            head: to,
            distance,
            travel_time,
        };
        let backward = DirectedEdge { tail: to, head: from, ..forward };
        match edge.direction {
            Direction::Both => {
                self.edges.push(forward);
                self.edges.push(backward);
            }
            Direction::Forward => self.edges.push(forward),
            Direction::Backward => self.edges.push(backward),
        }
        Ok(())
    }

    pub fn num_raw_edges(&self) -> usize {
        self.endpoints.len()
    }

    pub fn finish(self, mapper: IdentityMapper) -> RoadNetwork {
        let node_ids = mapper.id_map();
        let bounds = mapper.bounds();

        let mut edge_ids: Vec<_> = self.edge_ids.into_iter().collect();
        edge_ids.sort_unstable();
        let mut endpoints = self.endpoints;
        endpoints.sort_unstable_by_key(|&(raw, _, _)| raw);

        tracing::info!(
            nodes = mapper.num_nodes(),
            edges = self.edges.len(),
            raw_edges = edge_ids.len(),
            repaired = self.repaired,
            "built road network"
        );
        tracing::info!(
            "coordinate range [{} {}] [{} {}]",
            bounds.min_lon,
            bounds.max_lon,
            bounds.min_lat,
            bounds.max_lat
        );

        RoadNetwork {
            edges: self.edges,
            coordinates: mapper.into_coordinates(),
            edge_ids: IdMap::new(edge_ids.len(), edge_ids),
            node_ids,
            edge_to_node: EdgeToNodeMap(endpoints),
            speed_histogram: self.speed_histogram,
            repaired: self.repaired,
        }
    }
}

/// The imported directed road network with all its id maps.
#[derive(Debug)]
pub struct RoadNetwork {
    pub edges: Vec<DirectedEdge>,
    pub coordinates: Vec<Coordinate>,
    pub node_ids: IdMap<RawNodeId, NodeId>,
    pub edge_ids: IdMap<RawEdgeId, EdgeId>,
    pub edge_to_node: EdgeToNodeMap,
    pub speed_histogram: BTreeMap<i64, usize>,
    pub repaired: usize,
}

impl RoadNetwork {
    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    pub fn distance_graph(&self) -> WeightedEdgeList {
        WeightedEdgeList::new(self.num_nodes(), self.edges.iter().map(|e| (e.tail, e.head, e.distance)).collect())
    }

    pub fn time_graph(&self) -> WeightedEdgeList {
        WeightedEdgeList::new(self.num_nodes(), self.edges.iter().map(|e| (e.tail, e.head, e.travel_time)).collect())
    }

    pub fn coordinate_list(&self) -> CoordinateList {
        CoordinateList(self.coordinates.clone())
    }
}
