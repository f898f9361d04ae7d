use clap::Parser;
use road_network_prep::{
    cli::{init_tracing, GraphArgs},
    pipeline::{extract_lcc, GraphPaths},
    report::*,
};
use std::error::Error;

/// Restrict an imported graph to its largest connected component.
#[derive(Debug, Parser)]
struct Cli {
    #[command(flatten)]
    graph: GraphArgs,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let _reporter = enable_reporting("extract_lcc");

    extract_lcc(&GraphPaths::new(cli.graph.graph), cli.graph.force)?;
    Ok(())
}
