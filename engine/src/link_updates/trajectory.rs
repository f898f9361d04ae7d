//! Vehicle trajectories as recorded by the fleet.
//!
//! A trajectory file has a column header line, a count line and then one trip per line:
//!
//! ```text
//! carID carType travelDis travelTime travelSpeed startT endT startLon startLat endLon endLat
//!     n edge_1 .. edge_n  n time_1 .. time_n  n speed_1 .. speed_n  k city_1 .. city_k
//! ```
//!
//! Edge ids may be negative to encode the driving direction.
//! `time_i` is the timestamp at which the vehicle entered `edge_i`.

use crate::datastr::graph::{RawEdgeId, Timestamp};
use crate::error::Result;
use crate::geo::Coordinate;
use crate::io::TextReader;
use std::{io::BufRead, path::Path};

/// Minimum number of fields of a trip line.
const MIN_FIELDS: usize = 17;

/// A span of unix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        TimeWindow { start, end }
    }

    /// `start <= t <= end`
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    /// `start <= t < end`
    pub fn contains_half_open(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }

    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        start <= self.end && end >= self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub car_id: String,
    /// 1 private car, 2 taxi, 0 others
    pub car_type: i64,
    /// meters
    pub distance: i64,
    pub travel_time: i64,
    pub speed: i64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub edges: Vec<RawEdgeId>,
    pub entry_times: Vec<Timestamp>,
    pub speeds: Vec<i64>,
    pub cities: Vec<i64>,
}

/// One traversed edge of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// sign stripped
    pub edge: RawEdgeId,
    pub entered: Timestamp,
    /// entry into the next edge, or the end of the trip for the last edge
    pub left: Timestamp,
}

impl Hop {
    /// Observed traversal time in seconds, negative for inconsistent timestamps.
    pub fn duration(&self) -> i64 {
        self.left as i64 - self.entered as i64
    }
}

impl Trip {
    pub fn hops(&self) -> impl Iterator<Item = Hop> + '_ {
        self.edges.iter().zip(&self.entry_times).enumerate().map(move |(i, (&edge, &entered))| Hop {
            edge: edge.wrapping_abs(),
            entered,
            left: self.entry_times.get(i + 1).copied().unwrap_or(self.end_time),
        })
    }

    pub fn first_edge(&self) -> Option<RawEdgeId> {
        self.edges.first().map(|e| e.wrapping_abs())
    }

    pub fn last_edge(&self) -> Option<RawEdgeId> {
        self.edges.last().map(|e| e.wrapping_abs())
    }
}

/// Trips overlapping a time window.
#[derive(Debug, Clone, Default)]
pub struct Trips {
    pub trips: Vec<Trip>,
    /// count from the file header
    pub declared: usize,
    /// trips entirely outside the window
    pub skipped: usize,
}

impl Trips {
    pub fn load_from(path: &Path, window: TimeWindow) -> Result<Self> {
        Self::load(&mut TextReader::open(path)?, window)
    }

    pub fn load<R: BufRead>(reader: &mut TextReader<R>, window: TimeWindow) -> Result<Self> {
        reader.skip_line()?;
        let declared = reader.read_count()?;
        let mut trips = Vec::new();
        let mut skipped = 0;

        while let Some(mut fields) = reader.next_fields()? {
            if fields.len() < MIN_FIELDS {
                return Err(fields.error());
            }
            let car_id = fields.next()?;
            let car_type = fields.next()?;
            let distance = fields.next()?;
            let travel_time = fields.next()?;
            let speed = fields.next()?;
            let start_time = fields.next()?;
            let end_time = fields.next()?;
            if !window.overlaps(start_time, end_time) {
                skipped += 1;
                continue;
            }
            let origin = Coordinate::new(fields.next()?, fields.next()?);
            let destination = Coordinate::new(fields.next()?, fields.next()?);

            let n = fields.next()?;
            let edges = fields.next_n(n)?;
            let n = fields.next()?;
            let entry_times = fields.next_n(n)?;
            let n = fields.next()?;
            let speeds = fields.next_n(n)?;
            let n = fields.next()?;
            let cities = fields.next_n(n)?;

            if edges.len() != entry_times.len() || edges.iter().any(|e: &RawEdgeId| e.checked_abs().is_none()) {
                return Err(fields.error());
            }

            trips.push(Trip {
                car_id,
                car_type,
                distance,
                travel_time,
                speed,
                start_time,
                end_time,
                origin,
                destination,
                edges,
                entry_times,
                speeds,
                cities,
            });
        }

        tracing::info!(declared, read = trips.len(), skipped, "read trajectories");
        Ok(Trips { trips, declared, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrepError;
    use crate::io::reader_for;

    const HEADER: &str = "carID carType travelDis travelTime travelSpeed startT endT startLon startLat endLon endLat links times speeds cities\n";

    #[test]
    fn parse_trip_and_hops() {
        let text = format!(
            "{}1\ncar7 1 450 60 27 1000 1060 113.0 23.0 113.003 23.0 3 100 -200 300 3 1000 1020 1040 3 20 21 22 1 440100\n",
            HEADER
        );
        let trips = Trips::load(&mut reader_for(&text), TimeWindow::new(0, 5000)).unwrap();
        assert_eq!(trips.trips.len(), 1);
        let trip = &trips.trips[0];
        assert_eq!(trip.car_id, "car7");
        assert_eq!(trip.cities, vec![440100]);
        assert_eq!(trip.first_edge(), Some(100));
        assert_eq!(trip.last_edge(), Some(300));

        let hops: Vec<_> = trip.hops().collect();
        assert_eq!(hops[1], Hop { edge: 200, entered: 1020, left: 1040 });
        assert_eq!(hops[2].duration(), 20);
    }

    #[test]
    fn trips_outside_the_window_are_skipped() {
        let text = format!(
            "{}2\na 1 1 1 1 100 200 0 0 0 0 1 5 1 100 1 1 1 1\nb 1 1 1 1 900 950 0 0 0 0 1 5 1 900 1 1 1 1\n",
            HEADER
        );
        let trips = Trips::load(&mut reader_for(&text), TimeWindow::new(150, 800)).unwrap();
        assert_eq!(trips.declared, 2);
        assert_eq!(trips.skipped, 1);
        assert_eq!(trips.trips[0].car_id, "a");
    }

    #[test]
    fn short_lines_are_fatal() {
        let text = format!("{}1\na 1 1 1 1 100 200 0 0 0 0 1 5\n", HEADER);
        assert!(matches!(
            Trips::load(&mut reader_for(&text), TimeWindow::new(0, 1000)),
            Err(PrepError::Syntax { line: 3, .. })
        ));
    }

    #[test]
    fn unsignable_edge_ids_are_fatal() {
        let text = format!("{}1\na 1 1 1 1 100 200 0 0 0 0 1 {} 1 100 1 1 1 1\n", HEADER, i64::MIN);
        assert!(matches!(
            Trips::load(&mut reader_for(&text), TimeWindow::new(0, 1000)),
            Err(PrepError::Syntax { line: 3, .. })
        ));
    }

    #[test]
    fn windows() {
        let w = TimeWindow::new(10, 20);
        assert!(w.contains(20));
        assert!(!w.contains_half_open(20));
        assert!(w.contains_half_open(10));
        assert!(w.overlaps(0, 10));
        assert!(!w.overlaps(21, 30));
    }
}
