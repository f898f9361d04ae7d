//! Turning trajectory hops into edge weight observations, a time ordered
//! update stream and shortest path queries on the largest component.

use super::trajectory::{Trip, TimeWindow};
use crate::datastr::graph::*;
use crate::datastr::id_translator::IdTranslator;
use crate::error::{PrepError, Result};
use crate::io::*;
use std::{
    collections::{BTreeMap, HashMap},
    io::prelude::*,
};

/// Bounds applied to every observed hop duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HopClamp {
    /// observations below this fraction of the free flow time are raised to it
    pub min_ratio: f64,
    /// m/s, no vehicle is assumed to be faster
    pub max_speed: f64,
}

impl Default for HopClamp {
    fn default() -> Self {
        HopClamp { min_ratio: 0.83, max_speed: 33.33 }
    }
}

impl HopClamp {
    pub fn clamp(&self, observed: i64, edge: &StaticEdge) -> i64 {
        let floor = self.min_ratio * f64::from(edge.travel_time);
        let mut weight = observed;
        if (weight as f64) < floor {
            weight = floor as i64;
        }
        let fastest = (f64::from(edge.distance) / self.max_speed).ceil() as i64;
        weight.max(fastest)
    }
}

/// Maximum distance between a trip's start or end point and the chosen vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryMatch {
    pub max_distance: f64,
}

impl Default for QueryMatch {
    fn default() -> Self {
        QueryMatch { max_distance: 100.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    /// hops outside this window are ignored
    pub window: TimeWindow,
    /// trips starting in this window (half open) yield a query
    pub query_window: TimeWindow,
    pub clamp: HopClamp,
    pub query_match: QueryMatch,
}

impl StreamConfig {
    pub fn new(window: TimeWindow) -> Self {
        StreamConfig {
            window,
            query_window: window,
            clamp: HopClamp::default(),
            query_match: QueryMatch::default(),
        }
    }
}

/// Mean of all observations of one edge at one timestamp.
///
/// Integer arithmetic: the mean is truncated after every observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningAverage {
    pub weight: Weight,
    pub count: u32,
}

impl RunningAverage {
    pub fn add(&mut self, weight: Weight) {
        let total = u64::from(self.weight) * u64::from(self.count) + u64::from(weight);
        self.count += 1;
        self.weight = (total / u64::from(self.count)) as Weight;
    }
}

/// Static attributes of a component edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEdge {
    pub tail: NodeId,
    pub head: NodeId,
    pub distance: Weight,
    pub travel_time: Weight,
}

/// A shortest path query taken from a real trip.
/// Ordered by departure first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Query {
    pub departure: Timestamp,
    pub from: NodeId,
    pub to: NodeId,
    pub car_type: i64,
    pub distance: i64,
}

/// Everything the stream stage needs to know about the component.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub translator: IdTranslator,
    /// indexed by dense edge id, `None` for edges outside the component
    pub static_edges: Vec<Option<StaticEdge>>,
    pub coordinates: CoordinateList,
}

impl UpdateContext {
    /// Attach the component's distances and travel times to dense edge ids.
    ///
    /// Every component pair must be covered by exactly one raw edge,
    /// so the component graphs have twice as many lines as there are component edges.
    pub fn new(translator: IdTranslator, distance: &WeightedEdgeList, time: &WeightedEdgeList, coordinates: CoordinateList) -> Result<Self> {
        for graph in &[distance, time] {
            if graph.num_nodes != translator.component_size() {
                return Err(PrepError::CountMismatch {
                    what: "vertex count of component graph",
                    expected: translator.component_size(),
                    found: graph.num_nodes,
                });
            }
        }

        let mut node_to_edge: HashMap<(NodeId, NodeId), RawEdgeId> = HashMap::new();
        for (raw, tail, head) in translator.component_edges()? {
            if node_to_edge.insert((tail, head), raw).is_some() {
                return Err(PrepError::ParallelEdge { src: tail, dst: head });
            }
        }
        if node_to_edge.len() * 2 != distance.num_edges() {
            return Err(PrepError::CountMismatch {
                what: "edge count of component distance graph",
                expected: node_to_edge.len() * 2,
                found: distance.num_edges(),
            });
        }

        let mut static_edges: Vec<Option<StaticEdge>> = vec![None; translator.num_edges()];
        let lookup = |tail: NodeId, head: NodeId| -> Result<EdgeId> {
            let raw = node_to_edge
                .get(&(tail, head))
                .or_else(|| node_to_edge.get(&(head, tail)))
                .ok_or(PrepError::MissingEdge { src: tail, dst: head })?;
            translator.dense_edge(*raw)
        };
        for &(tail, head, weight) in &distance.edges {
            static_entry(&mut static_edges, &translator, lookup(tail, head)?)?.distance = weight;
        }
        for &(tail, head, weight) in &time.edges {
            static_entry(&mut static_edges, &translator, lookup(tail, head)?)?.travel_time = weight;
        }

        Ok(UpdateContext {
            translator,
            static_edges,
            coordinates,
        })
    }

    fn static_edge(&self, dense: EdgeId) -> Result<StaticEdge> {
        self.static_edges
            .get(dense as usize)
            .copied()
            .flatten()
            .ok_or(PrepError::Translation {
                layer: "component edge weights",
                id: i64::from(dense),
            })
    }

    /// The endpoint of a component edge closest to `point`.
    fn nearest_endpoint(&self, trip: &Trip, raw: RawEdgeId, at_start: bool, max_distance: f64) -> Result<Option<NodeId>> {
        let (tail, head) = match self.translator.component_endpoints(raw)? {
            Some(endpoints) => endpoints,
            None => return Ok(None),
        };
        let point = if at_start { trip.origin } else { trip.destination };
        let distance_of = |node: NodeId| {
            self.coordinates
                .get(node)
                .map(|coord| coord.distance_to(point))
                .ok_or(PrepError::IdOutOfRange {
                    what: "coordinate",
                    id: u64::from(node),
                    bound: self.coordinates.len(),
                })
        };
        let (tail_distance, head_distance) = (distance_of(tail)?, distance_of(head)?);
        let (node, distance) = if tail_distance <= head_distance {
            (tail, tail_distance)
        } else {
            (head, head_distance)
        };
        if distance > max_distance {
            return Err(PrepError::QueryEndpointTooFar {
                car: trip.car_id.clone(),
                node,
                distance,
            });
        }
        Ok(Some(node))
    }
}

fn static_entry<'a>(static_edges: &'a mut [Option<StaticEdge>], translator: &IdTranslator, dense: EdgeId) -> Result<&'a mut StaticEdge> {
    let raw = translator.raw_edge(dense)?;
    let (tail, head) = translator.component_endpoints(raw)?.ok_or(PrepError::Translation {
        layer: "component edge",
        id: raw,
    })?;
    Ok(static_edges[dense as usize].get_or_insert(StaticEdge {
        tail,
        head,
        distance: 0,
        travel_time: 0,
    }))
}

/// All outputs of the stream stage.
#[derive(Debug, Clone, Default)]
pub struct StreamOutput {
    pub edge_updates: EdgeUpdateTable,
    pub stream: StreamUpdates,
    pub queries: QueryList,
    pub stats: StreamStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub trips: usize,
    pub hops: usize,
    /// hops on edges outside the component
    pub filtered_hops: usize,
    /// hops with an entry time outside the window
    pub late_hops: usize,
    /// (edge, timestamp) pairs observed more than once
    pub repeated: usize,
    pub first_update: Option<Timestamp>,
    pub last_update: Option<Timestamp>,
}

/// Process all trips in file order.
pub fn process_trips(ctx: &UpdateContext, trips: &[Trip], config: &StreamConfig) -> Result<StreamOutput> {
    let mut observations: Vec<BTreeMap<Timestamp, RunningAverage>> = vec![BTreeMap::new(); ctx.translator.num_edges()];
    let mut stream = StreamUpdates::default();
    let mut queries = Vec::new();
    let mut stats = StreamStats {
        trips: trips.len(),
        ..Default::default()
    };

    for trip in trips {
        if let Some(query) = trip_query(ctx, trip, config)? {
            queries.push(query);
        }

        for hop in trip.hops() {
            stats.hops += 1;
            let edge = match ctx.translator.resolve_edge(hop.edge)? {
                Some(edge) => edge,
                None => {
                    stats.filtered_hops += 1;
                    continue;
                }
            };
            if !config.window.contains(hop.entered) {
                stats.late_hops += 1;
                continue;
            }

            let static_edge = ctx.static_edge(edge.dense)?;
            let weight = config.clamp.clamp(hop.duration(), &static_edge);
            if weight < 1 {
                return Err(PrepError::NonPositiveTravelTime {
                    src: edge.tail,
                    dst: edge.head,
                    weight,
                });
            }
            let weight = weight as Weight;

            let average = observations[edge.dense as usize].entry(hop.entered).or_default();
            if average.count == 1 {
                stats.repeated += 1;
            }
            average.add(weight);
            stream.0.entry(hop.entered).or_default().push((edge.tail, edge.head, weight));

            stats.first_update = Some(stats.first_update.map_or(hop.entered, |t| t.min(hop.entered)));
            stats.last_update = Some(stats.last_update.map_or(hop.entered, |t| t.max(hop.entered)));
        }
    }

    queries.sort();
    tracing::info!(
        trips = stats.trips,
        hops = stats.hops,
        filtered = stats.filtered_hops,
        outside_window = stats.late_hops,
        repeated = stats.repeated,
        queries = queries.len(),
        "processed trajectories"
    );

    Ok(StreamOutput {
        edge_updates: EdgeUpdateTable::new(ctx, &observations, config.clamp.min_ratio),
        stream,
        queries: QueryList(queries),
        stats,
    })
}

fn trip_query(ctx: &UpdateContext, trip: &Trip, config: &StreamConfig) -> Result<Option<Query>> {
    if !config.query_window.contains_half_open(trip.start_time) {
        return Ok(None);
    }
    let (first, last) = match (trip.first_edge(), trip.last_edge()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(None),
    };
    // both ends have to lie in the component before any distance is checked
    if ctx.translator.component_endpoints(first)?.is_none() || ctx.translator.component_endpoints(last)?.is_none() {
        return Ok(None);
    }

    let max_distance = config.query_match.max_distance;
    match (
        ctx.nearest_endpoint(trip, first, true, max_distance)?,
        ctx.nearest_endpoint(trip, last, false, max_distance)?,
    ) {
        (Some(from), Some(to)) => Ok(Some(Query {
            departure: trip.start_time,
            from,
            to,
            car_type: trip.car_type,
            distance: trip.distance,
        })),
        _ => Ok(None),
    }
}

/// Time ordered individual observations: `timestamp -> [(tail, head, weight)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamUpdates(pub BTreeMap<Timestamp, Vec<(NodeId, NodeId, Weight)>>);

impl StreamUpdates {
    pub fn num_updates(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl Load for StreamUpdates {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let count = reader.read_count()?;
        let mut updates = BTreeMap::new();
        while let Some(mut fields) = reader.next_fields()? {
            let timestamp: Timestamp = fields.next()?;
            let n: usize = fields.next()?;
            let mut batch = Vec::with_capacity(n);
            for _ in 0..n {
                batch.push((fields.next()?, fields.next()?, fields.next()?));
            }
            updates.insert(timestamp, batch);
        }
        if updates.len() != count {
            return Err(PrepError::CountMismatch {
                what: "timestamp count of stream updates",
                expected: count,
                found: updates.len(),
            });
        }
        Ok(StreamUpdates(updates))
    }
}

impl Store for StreamUpdates {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", self.0.len())?;
        for (timestamp, updates) in &self.0 {
            write!(out, "{} {}", timestamp, updates.len())?;
            for (tail, head, weight) in updates {
                write!(out, " {} {} {}", tail, head, weight)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Real queries sorted by departure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryList(pub Vec<Query>);

impl QueryList {
    /// Number of queries departing within `window`, half open.
    pub fn count_in(&self, window: TimeWindow) -> usize {
        self.0.iter().filter(|q| window.contains_half_open(q.departure)).count()
    }
}

impl Load for QueryList {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let count = reader.read_count()?;
        let mut queries = Vec::with_capacity(count);
        while let Some(mut fields) = reader.next_fields()? {
            if fields.len() != 5 {
                return Err(fields.error());
            }
            queries.push(Query {
                departure: fields.next()?,
                from: fields.next()?,
                to: fields.next()?,
                car_type: fields.next()?,
                distance: fields.next()?,
            });
        }
        if queries.len() != count {
            return Err(PrepError::CountMismatch {
                what: "query count",
                expected: count,
                found: queries.len(),
            });
        }
        Ok(QueryList(queries))
    }
}

impl Store for QueryList {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", self.0.len())?;
        for q in &self.0 {
            writeln!(out, "{} {} {} {} {}", q.departure, q.from, q.to, q.car_type, q.distance)?;
        }
        Ok(())
    }
}

/// Observations of one dense edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeUpdateRow {
    pub edge: StaticEdge,
    pub samples: BTreeMap<Timestamp, Weight>,
}

/// Per dense edge observation table, `None` for edges outside the component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeUpdateTable(pub Vec<Option<EdgeUpdateRow>>);

// m/s, bound for the plausibility check of averaged updates
const PLAUSIBLE_MAX_SPEED: f64 = 33.3;

const EDGE_UPDATE_HEADER: &str = "vertexID1 vertexID2 spatialDis timeDis updateSize timeStamp1 timeDis1";

impl EdgeUpdateTable {
    /// Assemble the table, raising averages which undercut both plausibility floors.
    fn new(ctx: &UpdateContext, observations: &[BTreeMap<Timestamp, RunningAverage>], min_ratio: f64) -> Self {
        let rows = ctx
            .static_edges
            .iter()
            .zip(observations)
            .map(|(edge, samples)| {
                edge.map(|edge| {
                    let by_time = (f64::from(edge.travel_time) * min_ratio) as Weight;
                    let by_distance = (f64::from(edge.distance) / PLAUSIBLE_MAX_SPEED) as Weight;
                    let samples = samples
                        .iter()
                        .map(|(&t, average)| {
                            let mut weight = average.weight;
                            if weight < by_time && weight < by_distance {
                                tracing::warn!(tail = edge.tail, head = edge.head, weight, by_time, by_distance, "implausible edge update raised");
                                weight = by_time.max(by_distance);
                            }
                            (t, weight)
                        })
                        .collect();
                    EdgeUpdateRow { edge, samples }
                })
            })
            .collect();
        EdgeUpdateTable(rows)
    }

    pub fn num_samples(&self) -> usize {
        self.0.iter().flatten().map(|row| row.samples.len()).sum()
    }
}

impl Load for EdgeUpdateTable {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        reader.skip_line()?;
        let count = reader.read_count()?;
        let mut rows = Vec::with_capacity(count);
        while let Some(mut fields) = reader.next_fields()? {
            let edge = StaticEdge {
                tail: fields.next()?,
                head: fields.next()?,
                distance: fields.next()?,
                travel_time: fields.next()?,
            };
            let n: usize = fields.next()?;
            let mut samples = BTreeMap::new();
            for _ in 0..n {
                samples.insert(fields.next()?, fields.next()?);
            }
            if edge.distance == 0 && edge.travel_time == 0 && samples.is_empty() {
                rows.push(None);
            } else {
                rows.push(Some(EdgeUpdateRow { edge, samples }));
            }
        }
        if rows.len() != count {
            return Err(PrepError::CountMismatch {
                what: "row count of edge update table",
                expected: count,
                found: rows.len(),
            });
        }
        Ok(EdgeUpdateTable(rows))
    }
}

impl Store for EdgeUpdateTable {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", EDGE_UPDATE_HEADER)?;
        writeln!(out, "{}", self.0.len())?;
        for row in &self.0 {
            match row {
                Some(EdgeUpdateRow { edge, samples }) => {
                    write!(out, "{} {} {} {} {}", edge.tail, edge.head, edge.distance, edge.travel_time, samples.len())?;
                    for (t, w) in samples {
                        write!(out, " {} {}", t, w)?;
                    }
                    writeln!(out)?;
                }
                None => writeln!(out, "0 0 0 0 0")?,
            }
        }
        Ok(())
    }
}
