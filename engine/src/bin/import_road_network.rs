#[macro_use]
extern crate road_network_prep;
use clap::Parser;
use road_network_prep::{
    cli::{init_tracing, CliErr},
    import::{
        graph_builder::GraphBuilder,
        raw::{discover_datasets, FileSource},
    },
    pipeline::{extract_lcc, import_road_network, GraphPaths},
    report::*,
};
use std::{error::Error, path::PathBuf};

/// Import raw road exports into a directed graph and extract its largest connected component.
#[derive(Debug, Parser)]
struct Cli {
    /// Directory with the datasets in `<name>/road/<name>.node|.edge` layout
    source: PathBuf,
    /// Path prefix of the written graph files
    target: PathBuf,
    /// Datasets to aggregate, every dataset below the source directory when omitted
    datasets: Vec<String>,
    /// Regenerate outputs which already exist
    #[arg(long)]
    force: bool,
    /// Stop after the import
    #[arg(long)]
    skip_lcc: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let _reporter = enable_reporting("import_road_network");

    let sources = if cli.datasets.is_empty() {
        discover_datasets(&cli.source)?
    } else {
        cli.datasets.iter().map(|name| FileSource::in_directory(&cli.source, name)).collect()
    };
    if sources.is_empty() {
        return Err(Box::new(CliErr("no datasets found")));
    }
    report!("num_datasets", sources.len());

    let paths = GraphPaths::new(cli.target);
    import_road_network(&sources, &paths, GraphBuilder::default(), cli.force)?;
    if !cli.skip_lcc {
        extract_lcc(&paths, cli.force)?;
    }
    Ok(())
}
