#[macro_use]
extern crate road_network_prep;
use clap::Parser;
use road_network_prep::{
    cli::{init_tracing, parse_days, utc_offset, CliErr, GraphArgs},
    link_updates::{
        batch::{OutlierTrim, SignificanceThresholds},
        stream::StreamConfig,
        trajectory::TimeWindow,
    },
    pipeline::{batch_stage, stream_stage, GraphPaths},
    report::*,
};
use std::{error::Error, path::PathBuf};

/// Derive stream updates, real queries and batch updates from vehicle trajectories.
#[derive(Debug, Parser)]
struct Cli {
    #[command(flatten)]
    graph: GraphArgs,
    /// Trajectory file
    trajectory: PathBuf,
    /// Start of the processing window (unix time)
    #[arg(long, default_value_t = 1451577600)]
    start: u64,
    /// End of the processing window (unix time, inclusive)
    #[arg(long, default_value_t = 1452009600)]
    end: u64,
    /// Start of the query window, defaults to the processing window
    #[arg(long, requires = "query_end")]
    query_start: Option<u64>,
    /// End of the query window (exclusive)
    #[arg(long, requires = "query_start")]
    query_end: Option<u64>,
    /// Days to batch as YYYYMMDD
    #[arg(long = "day", default_values_t = [20160101, 20160102, 20160103, 20160104, 20160105])]
    days: Vec<u32>,
    /// UTC offset of the local time the days refer to
    #[arg(long, default_value_t = 8, allow_negative_numbers = true)]
    utc_offset_hours: i8,
    /// Batch slot lengths in seconds
    #[arg(long = "interval", default_values_t = [300, 900], value_parser = clap::value_parser!(u64).range(1..))]
    intervals: Vec<u64>,
    /// Absolute change in seconds which is always significant
    #[arg(long, default_value_t = 20.0)]
    min_change: f64,
    /// Relative increase which is always significant
    #[arg(long, default_value_t = 1.0)]
    max_increase: f64,
    /// Relative decrease which is always significant
    #[arg(long, default_value_t = 0.5)]
    max_decrease: f64,
    /// Fraction of the fastest observations kept per edge
    #[arg(long, default_value_t = 0.95)]
    keep_ratio: f64,
    /// Only derive the stream outputs
    #[arg(long)]
    skip_batch: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let _reporter = enable_reporting("edge_updates");

    if cli.start > cli.end {
        return Err(Box::new(CliErr("window start after window end")));
    }
    let mut config = StreamConfig::new(TimeWindow::new(cli.start, cli.end));
    if let (Some(start), Some(end)) = (cli.query_start, cli.query_end) {
        if start > end {
            return Err(Box::new(CliErr("query window start after query window end")));
        }
        config.query_window = TimeWindow::new(start, end);
    }
    let days = parse_days(&cli.days, utc_offset(cli.utc_offset_hours)?)?;
    report!("window", [cli.start, cli.end]);
    report!("query_window", [config.query_window.start, config.query_window.end]);

    let paths = GraphPaths::new(cli.graph.graph);
    stream_stage(&paths, &cli.trajectory, &config, &days, cli.graph.force)?;

    if !cli.skip_batch {
        let trim = OutlierTrim {
            keep_ratio: cli.keep_ratio,
            ..OutlierTrim::default()
        };
        let thresholds = SignificanceThresholds {
            min_change: cli.min_change,
            max_increase: cli.max_increase,
            max_decrease: cli.max_decrease,
        };
        batch_stage(&paths, &days, &cli.intervals, &trim, &thresholds, cli.graph.force)?;
    }
    Ok(())
}
