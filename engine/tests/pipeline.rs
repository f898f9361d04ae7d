use road_network_prep::{
    datastr::{
        graph::*,
        id_translator::{EdgeToNodeMap, IdMap},
    },
    import::{
        graph_builder::GraphBuilder,
        raw::{discover_datasets, FileSource},
    },
    io::*,
    link_updates::{
        batch::{BatchUpdates, Day, OutlierTrim, SignificanceThresholds},
        stream::{QueryList, StreamConfig, StreamUpdates},
        trajectory::TimeWindow,
    },
    pipeline::*,
    PrepError,
};
use std::{fs, path::Path};
use time::UtcOffset;

const DAY_START: Timestamp = 1451577600;
const T0: Timestamp = DAY_START + 1000;

// Six records for four physical vertices on a line, 0.001 degrees (about 102m) apart.
// 1/11 and 2/12 are the same vertex exported twice with swapped tags.
const NODES: &str = "ID\tLon\tLat\tKind\tSecondID
6
1\t113.000\t23.0\t0\t11
2\t113.001\t23.0\t0\t12
11\t113.000\t23.0\t0\t1
3\t113.002\t23.0\t0\t3
12\t113.001\t23.0\t0\t2
4\t113.003\t23.0\t0\t4
";

// The last edge is recorded shorter than the distance between its endpoints.
const EDGES: &str = "ID\tDirection\tLength\tSNodeID\tENodeID\tSpeedClass\tA\tB\tC\tD\tE
3
1\t0\t150\t1\t2\t6\t0\t0\t0\t0\t0
2\t0\t120\t12\t3\t6\t0\t0\t0\t0\t0
3\t1\t5\t3\t4\t6\t0\t0\t0\t0\t0
";

fn write_dataset(source: &Path, name: &str, nodes: &str, edges: &str) {
    let dir = source.join(name).join("road");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.node", name)), nodes).unwrap();
    fs::write(dir.join(format!("{}.edge", name)), edges).unwrap();
}

fn trajectories() -> String {
    format!(
        "carID carType travelDis travelTime travelSpeed startT endT startLon startLat endLon endLat links times speeds cities
1
car1 1 377 80 17 {t0} {end} 113.0 23.0 113.003 23.0 3 1 -2 3 3 {t0} {t1} {t2} 3 20 20 20 1 440100
",
        t0 = T0,
        t1 = T0 + 20,
        t2 = T0 + 40,
        end = T0 + 80
    )
}

fn days() -> Vec<Day> {
    let offset = UtcOffset::from_hms(8, 0, 0).unwrap();
    vec![Day::from_id(20160101, offset).unwrap(), Day::from_id(20160102, offset).unwrap()]
}

fn import(dir: &Path) -> GraphPaths {
    let source = dir.join("raw");
    write_dataset(&source, "gz", NODES, EDGES);
    let paths = GraphPaths::new(dir.join("gz"));
    let network = import_road_network(&[FileSource::in_directory(&source, "gz")], &paths, GraphBuilder::default(), false)
        .unwrap()
        .unwrap();
    assert_eq!(network.num_nodes(), 4);
    extract_lcc(&paths, false).unwrap();
    paths
}

#[test]
fn import_merges_duplicate_vertices_and_repairs_distances() {
    let dir = tempfile::tempdir().unwrap();
    let paths = import(dir.path());

    let distance = WeightedEdgeList::load_from(paths.distance_graph()).unwrap();
    assert_eq!(distance.num_nodes, 4);
    assert_eq!(distance.edges, vec![(0, 1, 150), (1, 0, 150), (1, 2, 120), (2, 1, 120), (2, 3, 107), (3, 2, 107)]);
    let time = WeightedEdgeList::load_from(paths.time_graph()).unwrap();
    assert_eq!(time.edges.iter().map(|&(_, _, w)| w).collect::<Vec<_>>(), vec![14, 14, 11, 11, 10, 10]);

    let node_ids = IdMap::<RawNodeId, NodeId>::load_from(paths.node_id_map()).unwrap();
    assert_eq!(node_ids.count, 4);
    assert_eq!(node_ids.entries, vec![(1, 0), (2, 1), (3, 2), (4, 3), (11, 0), (12, 1)]);

    let edge_to_node = EdgeToNodeMap::load_from(paths.edge_to_node_map()).unwrap();
    assert_eq!(edge_to_node.0, vec![(1, 0, 1), (2, 1, 2), (3, 2, 3)]);

    let coords = CoordinateList::load_from(paths.coordinates()).unwrap();
    assert_eq!(coords.get(3).map(|c| c.to_micro_degrees()), Some((113_003_000, 23_000_000)));
}

#[test]
fn whole_network_is_the_largest_component() {
    let dir = tempfile::tempdir().unwrap();
    let paths = import(dir.path());

    let lcc_ids = IdMap::<NodeId, NodeId>::load_from(paths.lcc_id_map()).unwrap();
    assert_eq!(lcc_ids.entries, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    let time = WeightedEdgeList::load_from(paths.lcc_time_graph()).unwrap();
    let distance = WeightedEdgeList::load_from(paths.lcc_distance_graph()).unwrap();
    assert_eq!(time.num_nodes, 4);
    assert_eq!(time.num_edges(), 6);
    assert_eq!(
        time.edges.iter().map(|&(t, h, _)| (t, h)).collect::<Vec<_>>(),
        distance.edges.iter().map(|&(t, h, _)| (t, h)).collect::<Vec<_>>()
    );
    assert_eq!(CoordinateList::load_from(paths.lcc_coordinates()).unwrap().len(), 4);
}

#[test]
fn trajectory_yields_stream_queries_and_batches() {
    let dir = tempfile::tempdir().unwrap();
    let paths = import(dir.path());
    let trajectory = dir.path().join("trajectories.txt");
    fs::write(&trajectory, trajectories()).unwrap();

    let days = days();
    let config = StreamConfig::new(TimeWindow::new(DAY_START, days[1].window.end));
    stream_stage(&paths, &trajectory, &config, &days, false).unwrap();

    let stream = StreamUpdates::load_from(paths.stream_updates()).unwrap();
    assert_eq!(stream.num_updates(), 3);
    assert_eq!(stream.0[&T0], vec![(0, 1, 20)]);
    assert_eq!(stream.0[&(T0 + 20)], vec![(1, 2, 20)]);
    assert_eq!(stream.0[&(T0 + 40)], vec![(2, 3, 40)]);

    let queries = QueryList::load_from(paths.real_queries()).unwrap();
    assert_eq!(queries.0.len(), 1);
    assert_eq!((queries.0[0].departure, queries.0[0].from, queries.0[0].to), (T0, 0, 3));
    assert_eq!(queries.count_in(days[0].window), 1);
    assert_eq!(queries.count_in(days[1].window), 0);

    batch_stage(&paths, &days, &[300], &OutlierTrim::default(), &SignificanceThresholds::default(), false).unwrap();
    let batch = BatchUpdates::load_from(paths.batch_updates(20160101, 300)).unwrap();
    assert_eq!(batch.slots.len(), 288);
    // 20s on free flow 14s and 11s is not significant, 40s on 10s is
    assert_eq!(batch.num_updates(), 1);
    assert_eq!(batch.slots[3].get(&(2, 3)), Some(&40));
    assert!(paths.batch_info(20160101, 300).exists());
    assert_eq!(BatchUpdates::load_from(paths.batch_updates(20160102, 300)).unwrap().num_updates(), 0);
}

#[test]
fn existing_outputs_are_not_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let paths = import(dir.path());
    let trajectory = dir.path().join("trajectories.txt");
    fs::write(&trajectory, trajectories()).unwrap();
    let days = days();
    let config = StreamConfig::new(TimeWindow::new(DAY_START, days[1].window.end));
    stream_stage(&paths, &trajectory, &config, &days, false).unwrap();

    let source = dir.path().join("raw");
    assert!(import_road_network(&[FileSource::in_directory(&source, "gz")], &paths, GraphBuilder::default(), false)
        .unwrap()
        .is_none());

    // without force the trajectory file is not even opened again
    fs::remove_file(&trajectory).unwrap();
    stream_stage(&paths, &trajectory, &config, &days, false).unwrap();
    assert!(matches!(
        stream_stage(&paths, &trajectory, &config, &days, true),
        Err(PrepError::Io { .. })
    ));
}

#[test]
fn datasets_are_aggregated() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("raw");
    write_dataset(&source, "gz", NODES, EDGES);
    // references vertex 4 of the other dataset
    write_dataset(
        &source,
        "sz",
        "ID\tLon\tLat\tKind\tSecondID\n1\n5\t113.004\t23.0\t0\t5\n",
        "ID\tDirection\tLength\tSNodeID\tENodeID\tSpeedClass\tA\tB\tC\tD\tE\n1\n9\t2\t200\t4\t5\t2\t0\t0\t0\t0\t0\n",
    );

    let sources = discover_datasets(&source).unwrap();
    assert_eq!(sources.len(), 2);
    let paths = GraphPaths::new(dir.path().join("all"));
    let network = import_road_network(&sources, &paths, GraphBuilder::default(), false).unwrap().unwrap();
    assert_eq!(network.num_nodes(), 5);
    // forward only
    assert_eq!(network.edges.len(), 7);
    assert_eq!(network.edges[6].tail, 3);
    assert_eq!(network.edges[6].head, 4);
}

#[test]
fn edges_to_unknown_vertices_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("raw");
    write_dataset(
        &source,
        "gz",
        NODES,
        "ID\tDirection\tLength\tSNodeID\tENodeID\tSpeedClass\tA\tB\tC\tD\tE\n1\n1\t0\t150\t1\t99\t6\t0\t0\t0\t0\t0\n",
    );
    let paths = GraphPaths::new(dir.path().join("gz"));
    assert!(matches!(
        import_road_network(&[FileSource::in_directory(&source, "gz")], &paths, GraphBuilder::default(), false),
        Err(PrepError::UnknownVertex { edge: 1, vertex: 99 })
    ));
}
