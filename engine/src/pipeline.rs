//! Stage drivers.
//!
//! Stages only communicate through files named after a common graph path prefix.
//! Each stage checks its outputs first and skips all work when they already
//! exist, unless it is forced to regenerate them.

use crate::algo::components::extract_largest_component;
use crate::datastr::graph::*;
use crate::datastr::id_translator::{EdgeToNodeMap, IdMap, IdTranslator};
use crate::error::{PrepError, Result};
use crate::import::{
    graph_builder::{GraphBuilder, RoadNetwork},
    identity::IdentityMapper,
    raw::RoadExportSource,
};
use crate::io::*;
use crate::link_updates::{
    batch::{batch_updates, trimmed_observations, BatchContext, Day, OutlierTrim, SignificanceThresholds},
    stream::{process_trips, EdgeUpdateTable, QueryList, StreamConfig, UpdateContext},
    trajectory::Trips,
};
use crate::report::*;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// File names of all stage outputs for the graph at `prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPaths {
    prefix: PathBuf,
}

impl GraphPaths {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        GraphPaths { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path: OsString = self.prefix.clone().into_os_string();
        path.push(suffix);
        path.into()
    }

    pub fn distance_graph(&self) -> PathBuf {
        self.with_suffix("_Distance.gr")
    }

    pub fn time_graph(&self) -> PathBuf {
        self.with_suffix("_Time.gr")
    }

    pub fn node_id_map(&self) -> PathBuf {
        self.with_suffix("_NodeIDMap")
    }

    pub fn coordinates(&self) -> PathBuf {
        self.with_suffix("_Coordinate.co")
    }

    pub fn edge_to_node_map(&self) -> PathBuf {
        self.with_suffix("_EdgeToNodeMap")
    }

    pub fn edge_id_map(&self) -> PathBuf {
        self.with_suffix("_EdgeIDMap")
    }

    pub fn lcc_id_map(&self) -> PathBuf {
        self.with_suffix(".IDMap")
    }

    pub fn lcc_time_graph(&self) -> PathBuf {
        self.with_suffix(".time")
    }

    pub fn lcc_distance_graph(&self) -> PathBuf {
        self.with_suffix(".dis")
    }

    pub fn lcc_coordinates(&self) -> PathBuf {
        self.with_suffix(".time.co")
    }

    pub fn edge_updates(&self) -> PathBuf {
        self.with_suffix(".edgeUpdates")
    }

    pub fn stream_updates(&self) -> PathBuf {
        self.with_suffix(".streamUpdates")
    }

    pub fn real_queries(&self) -> PathBuf {
        self.with_suffix(".realQueries")
    }

    pub fn batch_updates(&self, day: u32, interval: u64) -> PathBuf {
        self.with_suffix(&format!("_{}_{}.batchUpdates", day, interval))
    }

    pub fn batch_info(&self, day: u32, interval: u64) -> PathBuf {
        self.with_suffix(&format!("_{}_{}.batchUpdatesInfo", day, interval))
    }
}

/// Existence check guarding the outputs of one stage.
#[derive(Debug, Clone, Copy)]
pub struct Stage<'a> {
    name: &'a str,
    force: bool,
}

impl<'a> Stage<'a> {
    pub fn new(name: &'a str, force: bool) -> Self {
        Stage { name, force }
    }

    /// Whether any of `outputs` has to be (re)generated.
    pub fn needs(&self, outputs: &[PathBuf]) -> bool {
        if self.force {
            return true;
        }
        match outputs.iter().find(|path| !path.exists()) {
            Some(missing) => {
                tracing::debug!(stage = self.name, missing = %missing.display(), "output missing");
                true
            }
            None => {
                tracing::info!(stage = self.name, "all outputs exist, skipping");
                false
            }
        }
    }
}

/// Read all datasets into one graph and write it with all id maps next to `paths`.
///
/// All vertices of all datasets are registered before the first edge is added,
/// so edges may reference vertices of other datasets.
pub fn import_road_network<S: RoadExportSource>(sources: &[S], paths: &GraphPaths, mut builder: GraphBuilder, force: bool) -> Result<Option<RoadNetwork>> {
    let outputs = [
        paths.distance_graph(),
        paths.time_graph(),
        paths.node_id_map(),
        paths.coordinates(),
        paths.edge_to_node_map(),
        paths.edge_id_map(),
    ];
    if !Stage::new("import", force).needs(&outputs) {
        return Ok(None);
    }

    let _ctxt = push_context("import".to_string());
    let mut mapper = IdentityMapper::new();
    report_time_with_key("reading vertices", "vertices_running_time_ms", || -> Result<()> {
        let mut datasets = push_collection_context("datasets".to_string());
        for source in sources {
            let _item = datasets.push_collection_item();
            let vertices = source.vertices()?;
            for vertex in &vertices {
                mapper.register(vertex)?;
            }
            report!("name", source.name());
            report!("num_vertex_records", vertices.len());
        }
        Ok(())
    })?;
    report_time_with_key("reading edges", "edges_running_time_ms", || -> Result<()> {
        for source in sources {
            for edge in &source.edges()? {
                builder.add_edge(&mapper, edge)?;
            }
        }
        Ok(())
    })?;

    report!("num_vertex_records", mapper.num_records());
    report!("num_raw_edges", builder.num_raw_edges());
    let bounds = mapper.bounds();
    let network = builder.finish(mapper);
    report!("num_nodes", network.num_nodes());
    report!("num_arcs", network.edges.len());
    report!("num_repaired_distances", network.repaired);
    report!(
        "speed_classes",
        network
            .speed_histogram
            .iter()
            .map(|(class, count)| (class.to_string(), json!(count)))
            .collect::<serde_json::Map<String, serde_json::Value>>()
    );
    report!("coordinate_range", { "lon": [bounds.min_lon, bounds.max_lon], "lat": [bounds.min_lat, bounds.max_lat] });

    network.distance_graph().write_to(&paths.distance_graph())?;
    network.time_graph().write_to(&paths.time_graph())?;
    network.node_ids.write_to(&paths.node_id_map())?;
    network.coordinate_list().write_to(&paths.coordinates())?;
    network.edge_to_node.write_to(&paths.edge_to_node_map())?;
    network.edge_ids.write_to(&paths.edge_id_map())?;
    tracing::info!(prefix = %paths.prefix().display(), "wrote road network");

    Ok(Some(network))
}

/// Restrict the imported graph to its largest connected component.
pub fn extract_lcc(paths: &GraphPaths, force: bool) -> Result<()> {
    let outputs = [paths.lcc_id_map(), paths.lcc_time_graph(), paths.lcc_distance_graph(), paths.lcc_coordinates()];
    if !Stage::new("lcc", force).needs(&outputs) {
        return Ok(());
    }

    let _ctxt = push_context("lcc".to_string());
    let time = WeightedEdgeList::load_from(paths.time_graph())?;
    let distance = WeightedEdgeList::load_from(paths.distance_graph())?;
    let coords = CoordinateList::load_from(paths.coordinates())?;
    report!("num_nodes", time.num_nodes);
    report!("num_arcs", time.num_edges());

    let lcc = report_time("component search", || extract_largest_component(&time, &distance, &coords))?;
    report!("num_components", lcc.num_components);
    report!("component_sizes", lcc.component_sizes);
    report!("lcc_num_nodes", lcc.time.num_nodes);
    report!("lcc_num_arcs", lcc.time.num_edges());
    report!("lcc_diameter_m", lcc.diameter);

    lcc.id_map.write_to(&paths.lcc_id_map())?;
    lcc.time.write_to(&paths.lcc_time_graph())?;
    lcc.distance.write_to(&paths.lcc_distance_graph())?;
    lcc.coordinates.write_to(&paths.lcc_coordinates())?;
    Ok(())
}

/// Build the translation chain from raw edge ids to component vertices.
pub fn load_translator(paths: &GraphPaths) -> Result<IdTranslator> {
    let edge_ids = IdMap::<RawEdgeId, EdgeId>::load_from(paths.edge_id_map())?;
    let edge_to_node = EdgeToNodeMap::load_from(paths.edge_to_node_map())?;
    let component_ids = IdMap::<NodeId, NodeId>::load_from(paths.lcc_id_map())?;
    IdTranslator::new(&edge_ids, &edge_to_node, &component_ids)
}

/// Derive the edge update table, the update stream and the real queries from a trajectory file.
///
/// If the query file already exists only a per day summary of it is reported.
pub fn stream_stage(paths: &GraphPaths, trajectory: &Path, config: &StreamConfig, days: &[Day], force: bool) -> Result<()> {
    let _ctxt = push_context("stream".to_string());
    if !Stage::new("stream", force).needs(&[paths.real_queries()]) {
        let queries = QueryList::load_from(paths.real_queries())?;
        report_queries_per_day(&queries, days);
        return Ok(());
    }

    let translator = load_translator(paths)?;
    let distance = WeightedEdgeList::load_from(paths.lcc_distance_graph())?;
    let time = WeightedEdgeList::load_from(paths.lcc_time_graph())?;
    let coords = CoordinateList::load_from(paths.lcc_coordinates())?;
    let ctx = UpdateContext::new(translator, &distance, &time, coords)?;

    let trips = report_time_with_key("reading trajectories", "read_running_time_ms", || Trips::load_from(trajectory, config.window))?;
    report!("num_declared_trips", trips.declared);
    report!("num_skipped_trips", trips.skipped);

    let output = report_time_with_key("processing trajectories", "processing_running_time_ms", || process_trips(&ctx, &trips.trips, config))?;
    let stats = output.stats;
    report!("num_trips", stats.trips);
    report!("num_hops", stats.hops);
    report!("num_filtered_hops", stats.filtered_hops);
    report!("num_hops_outside_window", stats.late_hops);
    report!("num_repeated_observations", stats.repeated);
    report!("first_update", stats.first_update);
    report!("last_update", stats.last_update);
    report!("num_edge_samples", output.edge_updates.num_samples());
    report!("num_stream_updates", output.stream.num_updates());
    report_queries_per_day(&output.queries, days);

    if Stage::new("edge updates", force).needs(&[paths.edge_updates()]) {
        output.edge_updates.write_to(&paths.edge_updates())?;
    }
    if Stage::new("stream updates", force).needs(&[paths.stream_updates()]) {
        output.stream.write_to(&paths.stream_updates())?;
    }
    output.queries.write_to(&paths.real_queries())?;
    Ok(())
}

fn report_queries_per_day(queries: &QueryList, days: &[Day]) {
    report!("num_queries", queries.0.len());
    let mut per_day = push_collection_context("queries_per_day".to_string());
    for day in days {
        let _item = per_day.push_collection_item();
        let count = queries.count_in(day.window);
        tracing::info!(day = day.id, queries = count, "real queries");
        report!("day", day.id);
        report!("num_queries", count);
    }
}

/// Batch updates for every combination of `days` and `intervals`.
pub fn batch_stage(
    paths: &GraphPaths,
    days: &[Day],
    intervals: &[u64],
    trim: &OutlierTrim,
    thresholds: &SignificanceThresholds,
    force: bool,
) -> Result<()> {
    if intervals.contains(&0) {
        return Err(PrepError::ZeroInterval);
    }
    let pending: Vec<(Day, u64)> = intervals
        .iter()
        .flat_map(|&interval| days.iter().map(move |&day| (day, interval)))
        .filter(|&(day, interval)| Stage::new("batch updates", force).needs(&[paths.batch_info(day.id, interval)]))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let _ctxt = push_context("batch".to_string());
    let translator = load_translator(paths)?;
    let time = WeightedEdgeList::load_from(paths.lcc_time_graph())?;
    let ctx = BatchContext::new(translator, &time);
    let table = report_time("reading edge updates", || EdgeUpdateTable::load_from(paths.edge_updates()))?;
    let observations = trimmed_observations(&table, trim);
    report!("num_edge_samples", table.num_samples());
    report!("num_trimmed_samples", observations.iter().map(Vec::len).sum::<usize>());

    let mut runs = push_collection_context("runs".to_string());
    for (day, interval) in pending {
        let _item = runs.push_collection_item();
        report!("day", day.id);
        report!("interval", interval);
        let updates = batch_updates(&ctx, &observations, &day, interval, thresholds)?;
        report!("num_slots", updates.slots.len());
        report!("num_updates", updates.num_updates());
        report!("max_slot_size", updates.max_slot_size());
        report!("min_slot_size", updates.min_slot_size());

        updates.write_to(&paths.batch_updates(day.id, interval))?;
        updates.info().write_to(&paths.batch_info(day.id, interval))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_are_appended_to_the_prefix() {
        let paths = GraphPaths::new("/data/guangdong");
        assert_eq!(paths.time_graph(), PathBuf::from("/data/guangdong_Time.gr"));
        assert_eq!(paths.lcc_coordinates(), PathBuf::from("/data/guangdong.time.co"));
        assert_eq!(paths.batch_info(20160101, 300), PathBuf::from("/data/guangdong_20160101_300.batchUpdatesInfo"));
    }

    #[test]
    fn stages_skip_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a");
        std::fs::write(&existing, "0\n").unwrap();
        let missing = dir.path().join("b");

        assert!(!Stage::new("test", false).needs(&[existing.clone()]));
        assert!(Stage::new("test", false).needs(&[existing.clone(), missing]));
        assert!(Stage::new("test", true).needs(&[existing]));
    }

    #[test]
    fn zero_intervals_are_rejected_before_any_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let paths = GraphPaths::new(dir.path().join("missing"));
        let day = Day {
            id: 20160101,
            window: crate::link_updates::trajectory::TimeWindow::new(0, 86400),
        };
        assert!(matches!(
            batch_stage(&paths, &[day], &[300, 0], &OutlierTrim::default(), &SignificanceThresholds::default(), false),
            Err(PrepError::ZeroInterval)
        ));
    }
}
