//! Utility module for command line interfaces

use crate::link_updates::batch::Day;
use clap::Args;
use std::{error::Error, fmt, fmt::Display, path::PathBuf};
use time::UtcOffset;
use tracing_subscriber::EnvFilter;

/// An error struct to wrap simple static error messages
#[derive(Debug)]
pub struct CliErr(pub &'static str);

impl Display for CliErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Error for CliErr {}

/// Arguments shared by all tools working on an imported graph.
#[derive(Debug, Clone, Args)]
pub struct GraphArgs {
    /// Path prefix of the graph files, e.g. `data/guangdong` for `data/guangdong_Time.gr`
    pub graph: PathBuf,
    /// Regenerate outputs which already exist
    #[arg(long)]
    pub force: bool,
}

/// Log to stderr, filtered by `RUST_LOG` with `info` as default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub fn utc_offset(hours: i8) -> Result<UtcOffset, CliErr> {
    UtcOffset::from_hms(hours, 0, 0).map_err(|_| CliErr("UTC offset out of range"))
}

/// Resolve `YYYYMMDD` ids to day windows.
pub fn parse_days(ids: &[u32], offset: UtcOffset) -> Result<Vec<Day>, Box<dyn Error>> {
    let days = ids.iter().map(|&id| Day::from_id(id, offset)).collect::<crate::Result<Vec<_>>>()?;
    if days.is_empty() {
        return Err(Box::new(CliErr("at least one day is required")));
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_at_offset() {
        let offset = utc_offset(8).unwrap();
        let days = parse_days(&[20160101, 20160102], offset).unwrap();
        assert_eq!(days[1].window.start, 1451664000);
        assert!(parse_days(&[], offset).is_err());
        assert!(parse_days(&[20160132], offset).is_err());
        assert!(utc_offset(30).is_err());
    }
}
