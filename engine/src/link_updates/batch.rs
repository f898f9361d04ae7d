//! Aggregating edge observations into per slot batches of significant weight changes.
//!
//! The observations of each edge are first stripped of the slowest tail,
//! then every day is cut into slots of fixed length.
//! Within a slot the observations of an edge are averaged and emitted only if
//! the average differs significantly from the last emitted weight of that edge
//! (or its free flow weight if nothing was emitted that day).

use super::stream::EdgeUpdateTable;
use super::trajectory::TimeWindow;
use crate::datastr::graph::*;
use crate::datastr::id_translator::IdTranslator;
use crate::error::{PrepError, Result};
use crate::io::*;
use std::{
    collections::{BTreeMap, HashMap},
    io::prelude::*,
};
use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};

/// Drops the slowest observations of well observed edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierTrim {
    /// rank quantile above which observations are dropped
    pub keep_ratio: f64,
    /// edges with at most this many observations are kept entirely
    pub min_samples: usize,
}

impl Default for OutlierTrim {
    fn default() -> Self {
        OutlierTrim {
            keep_ratio: 0.95,
            min_samples: 3,
        }
    }
}

impl OutlierTrim {
    /// `(weight, timestamp)` pairs sorted ascending, without the slowest observations.
    pub fn apply(&self, samples: &BTreeMap<Timestamp, Weight>) -> Vec<(Weight, Timestamp)> {
        let mut sorted: Vec<_> = samples.iter().map(|(&t, &w)| (w, t)).collect();
        sorted.sort_unstable();
        let n = sorted.len();
        if n <= self.min_samples {
            return sorted;
        }
        sorted
            .into_iter()
            .enumerate()
            .filter(|&(rank, _)| (rank + 1) as f64 / n as f64 <= self.keep_ratio)
            .map(|(_, sample)| sample)
            .collect()
    }
}

/// When a new average differs enough from the current weight to be worth an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificanceThresholds {
    /// seconds
    pub min_change: f64,
    /// relative increase
    pub max_increase: f64,
    /// relative decrease
    pub max_decrease: f64,
}

impl Default for SignificanceThresholds {
    fn default() -> Self {
        SignificanceThresholds {
            min_change: 20.0,
            max_increase: 1.0,
            max_decrease: 0.5,
        }
    }
}

impl SignificanceThresholds {
    pub fn is_significant(&self, current: Weight, candidate: Weight) -> bool {
        let change = f64::from(candidate) - f64::from(current);
        let relative = change.abs() / f64::from(current.max(1));
        if change > 0.0 {
            change > self.min_change || relative > self.max_increase
        } else if change < 0.0 {
            -change > self.min_change || relative > self.max_decrease
        } else {
            false
        }
    }
}

/// A calendar day as a unix time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Day {
    /// `YYYYMMDD`
    pub id: u32,
    pub window: TimeWindow,
}

impl Day {
    /// The day `id` (`YYYYMMDD`) from local midnight to local midnight at `offset`.
    pub fn from_id(id: u32, offset: UtcOffset) -> Result<Self> {
        let invalid = |_| PrepError::InvalidDay(id);
        let month = Month::try_from((id / 100 % 100) as u8).map_err(invalid)?;
        let date = Date::from_calendar_date((id / 10000) as i32, month, (id % 100) as u8).map_err(invalid)?;
        let start = PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(offset).unix_timestamp();
        let start = u64::try_from(start).map_err(|_| PrepError::InvalidDay(id))?;
        Ok(Day {
            id,
            window: TimeWindow::new(start, start + 24 * 60 * 60),
        })
    }

    pub fn slot_count(&self, interval: u64) -> usize {
        ((self.window.end - self.window.start) / interval) as usize
    }

    pub fn slot_of(&self, t: Timestamp, interval: u64) -> Option<usize> {
        if t < self.window.start {
            return None;
        }
        let slot = ((t - self.window.start) / interval) as usize;
        if slot < self.slot_count(interval) {
            Some(slot)
        } else {
            None
        }
    }
}

/// The emitted updates of one day: per slot `(tail, head) -> weight` with `tail < head`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpdates {
    pub interval: u64,
    pub slots: Vec<BTreeMap<(NodeId, NodeId), Weight>>,
}

impl BatchUpdates {
    pub fn num_updates(&self) -> usize {
        self.slots.iter().map(BTreeMap::len).sum()
    }

    pub fn max_slot_size(&self) -> usize {
        self.slots.iter().map(BTreeMap::len).max().unwrap_or(0)
    }

    pub fn min_slot_size(&self) -> usize {
        self.slots.iter().map(BTreeMap::len).min().unwrap_or(0)
    }

    /// Slot sizes, the content of the companion info file.
    pub fn info(&self) -> BatchInfo {
        BatchInfo(self.slots.iter().map(BTreeMap::len).collect())
    }
}

impl Load for BatchUpdates {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let (num_slots, interval) = {
            let mut header = reader.expect_fields()?;
            (header.next::<usize>()?, header.next::<u64>()?)
        };
        let mut slots = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            let mut fields = reader.expect_fields()?;
            let n: usize = fields.next()?;
            let mut slot = BTreeMap::new();
            for _ in 0..n {
                slot.insert((fields.next()?, fields.next()?), fields.next()?);
            }
            slots.push(slot);
        }
        Ok(BatchUpdates { interval, slots })
    }
}

impl Store for BatchUpdates {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{} {}", self.slots.len(), self.interval)?;
        for slot in &self.slots {
            write!(out, "{}", slot.len())?;
            for ((tail, head), weight) in slot {
                write!(out, " {} {} {}", tail, head, weight)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Number of updates per slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInfo(pub Vec<usize>);

impl Store for BatchInfo {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", self.0.len())?;
        for (slot, size) in self.0.iter().enumerate() {
            writeln!(out, "{} {}", slot, size)?;
        }
        Ok(())
    }
}

/// What the batch stage needs to know about the component.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub translator: IdTranslator,
    /// symmetrized free flow travel times
    pub time: UndirectedGraph,
}

impl BatchContext {
    pub fn new(translator: IdTranslator, time: &WeightedEdgeList) -> Self {
        let (time, _) = UndirectedGraph::symmetrize(time);
        BatchContext { translator, time }
    }
}

/// Trimmed `(weight, timestamp)` observations per dense edge.
pub fn trimmed_observations(table: &EdgeUpdateTable, trim: &OutlierTrim) -> Vec<Vec<(Weight, Timestamp)>> {
    table
        .0
        .iter()
        .map(|row| row.as_ref().map(|row| trim.apply(&row.samples)).unwrap_or_default())
        .collect()
}

/// Compute the updates of one day.
pub fn batch_updates(
    ctx: &BatchContext,
    observations: &[Vec<(Weight, Timestamp)>],
    day: &Day,
    interval: u64,
    thresholds: &SignificanceThresholds,
) -> Result<BatchUpdates> {
    if interval == 0 {
        return Err(PrepError::ZeroInterval);
    }
    if observations.len() != ctx.translator.num_edges() {
        return Err(PrepError::CountMismatch {
            what: "row count of edge update table",
            expected: ctx.translator.num_edges(),
            found: observations.len(),
        });
    }

    let num_slots = day.slot_count(interval);
    let mut by_slot: Vec<BTreeMap<EdgeId, Vec<Weight>>> = vec![BTreeMap::new(); num_slots];
    for (edge, samples) in observations.iter().enumerate() {
        for &(weight, t) in samples {
            if let Some(slot) = day.slot_of(t, interval) {
                by_slot[slot].entry(edge as EdgeId).or_default().push(weight);
            }
        }
    }

    let mut current: HashMap<(NodeId, NodeId), Weight> = HashMap::new();
    let mut slots = Vec::with_capacity(num_slots);
    for slot in by_slot {
        let mut emitted = BTreeMap::new();
        for (edge, weights) in slot {
            let (a, b) = match ctx.translator.dense_component_endpoints(edge)? {
                Some(endpoints) => endpoints,
                None => continue,
            };
            let pair = (a.min(b), a.max(b));
            let free_flow = match ctx.time.link_weight(pair.0, pair.1) {
                Some(weight) => weight,
                None => continue,
            };

            let sum: u64 = weights.iter().map(|&w| u64::from(w)).sum();
            let average = ((sum / weights.len() as u64) as Weight).max(1);
            let baseline = current.get(&pair).copied().unwrap_or(free_flow);
            if thresholds.is_significant(baseline, average) && !emitted.contains_key(&pair) {
                emitted.insert(pair, average);
                current.insert(pair, average);
            }
        }
        slots.push(emitted);
    }

    let updates = BatchUpdates { interval, slots };
    tracing::info!(
        day = day.id,
        interval,
        slots = num_slots,
        total = updates.num_updates(),
        average = updates.num_updates() / num_slots.max(1),
        max = updates.max_slot_size(),
        min = updates.min_slot_size(),
        "computed batch updates"
    );
    Ok(updates)
}
