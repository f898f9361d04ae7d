//! Collapsing the raw vertex ids of a map export into dense canonical ids.
//!
//! Each raw vertex record carries a primary id and a secondary id.
//! Two records describe the same physical vertex when one of them names the
//! other one's id as its secondary id.
//! The first record of a physical vertex allocates the next dense id and
//! determines the coordinate, later records only add aliases.
//!
//! Registration rules for a record `(primary, secondary)`:
//!
//! - neither id known: allocate a new canonical id, register `primary` and
//!   remember `secondary` as an alias of it
//! - only `secondary` known: register `primary` under the canonical id of `secondary`
//! - `primary` known as an alias only: the record claims the alias,
//!   `secondary` joins the same canonical id
//! - `primary` already registered by an earlier record: fatal

use crate::datastr::graph::{NodeId, RawNodeId};
use crate::datastr::id_translator::IdMap;
use crate::error::{PrepError, Result};
use crate::geo::{BoundingBox, Coordinate};
use crate::import::raw::RawVertex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Registration {
    node: NodeId,
    // registered as the primary id of some record
    claimed: bool,
}

#[derive(Debug, Default)]
pub struct IdentityMapper {
    ids: HashMap<RawNodeId, Registration>,
    coords: Vec<Coordinate>,
    bounds: BoundingBox,
    records: usize,
}

impl IdentityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one raw vertex record and return its canonical id.
    pub fn register(&mut self, vertex: &RawVertex) -> Result<NodeId> {
        let RawVertex { primary, secondary, coord } = *vertex;
        let record = self.records;

        let node = match self.ids.get(&primary).copied() {
            Some(Registration { claimed: true, .. }) => return Err(PrepError::DuplicateVertex { primary, record }),
            Some(Registration { node, claimed: false }) => {
                self.link_secondary(primary, secondary, node)?;
                node
            }
            None => match self.ids.get(&secondary).copied() {
                Some(Registration { node, .. }) => node,
                None => {
                    let node = self.coords.len() as NodeId;
                    self.coords.push(coord);
                    if secondary != primary {
                        self.ids.insert(secondary, Registration { node, claimed: false });
                    }
                    node
                }
            },
        };

        self.ids.insert(primary, Registration { node, claimed: true });
        self.bounds.extend(coord);
        self.records += 1;
        Ok(node)
    }

    fn link_secondary(&mut self, primary: RawNodeId, secondary: RawNodeId, node: NodeId) -> Result<()> {
        if secondary == primary {
            return Ok(());
        }
        match self.ids.get(&secondary) {
            Some(other) if other.node != node => Err(PrepError::ConflictingAlias { primary, secondary }),
            Some(_) => Ok(()),
            None => {
                self.ids.insert(secondary, Registration { node, claimed: false });
                Ok(())
            }
        }
    }

    /// Canonical id of a raw id, primary or alias.
    pub fn resolve(&self, raw: RawNodeId) -> Option<NodeId> {
        self.ids.get(&raw).map(|registration| registration.node)
    }

    pub fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    pub fn num_records(&self) -> usize {
        self.records
    }

    /// Coordinates indexed by canonical id.
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn coordinate(&self, node: NodeId) -> Coordinate {
        self.coords[node as usize]
    }

    /// Bounding box of all registered records.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// All known raw ids sorted, with the number of canonical vertices as count.
    pub fn id_map(&self) -> IdMap<RawNodeId, NodeId> {
        let mut entries: Vec<_> = self.ids.iter().map(|(&raw, registration)| (raw, registration.node)).collect();
        entries.sort_unstable();
        IdMap::new(self.num_nodes(), entries)
    }

    pub fn into_coordinates(self) -> Vec<Coordinate> {
        self.coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(primary: RawNodeId, secondary: RawNodeId, lon: f64) -> RawVertex {
        RawVertex {
            primary,
            secondary,
            coord: Coordinate::new(lon, 23.0),
        }
    }

    #[test]
    fn canonical_ids_are_dense() {
        let mut mapper = IdentityMapper::new();
        let records = [vertex(10, 110, 113.0), vertex(20, 120, 113.1), vertex(110, 10, 113.0), vertex(30, 30, 113.2), vertex(120, 20, 113.1)];
        let ids: Vec<_> = records.iter().map(|r| mapper.register(r).unwrap()).collect();

        assert_eq!(ids, vec![0, 1, 0, 2, 1]);
        assert_eq!(mapper.num_nodes(), 3);
        assert_eq!(mapper.num_records(), 5);
        assert_eq!(mapper.coordinates().len(), 3);
        let mut canonical: Vec<_> = mapper.id_map().entries.iter().map(|&(_, node)| node).collect();
        canonical.sort_unstable();
        canonical.dedup();
        assert_eq!(canonical, vec![0, 1, 2]);
    }

    #[test]
    fn secondary_id_links_to_an_earlier_primary() {
        let mut mapper = IdentityMapper::new();
        assert_eq!(mapper.register(&vertex(1, 2, 113.0)).unwrap(), 0);
        // the primary of the first record appears as secondary id
        assert_eq!(mapper.register(&vertex(5, 1, 113.5)).unwrap(), 0);
        assert_eq!(mapper.resolve(5), Some(0));
        assert_eq!(mapper.resolve(2), Some(0));
        // first record determines the coordinate
        assert_eq!(mapper.coordinate(0), Coordinate::new(113.0, 23.0));
        // the bounding box covers every record
        assert_eq!(mapper.bounds().max_lon, 113.5);
    }

    #[test]
    fn duplicate_primary_is_fatal() {
        let mut mapper = IdentityMapper::new();
        mapper.register(&vertex(1, 2, 113.0)).unwrap();
        assert!(matches!(
            mapper.register(&vertex(1, 3, 113.0)),
            Err(PrepError::DuplicateVertex { primary: 1, record: 1 })
        ));
    }

    #[test]
    fn alias_bridging_two_vertices_is_fatal() {
        let mut mapper = IdentityMapper::new();
        mapper.register(&vertex(1, 2, 113.0)).unwrap();
        mapper.register(&vertex(3, 4, 113.1)).unwrap();
        assert!(matches!(mapper.register(&vertex(2, 3, 113.0)), Err(PrepError::ConflictingAlias { .. })));
    }

    #[test]
    fn id_map_is_sorted_by_raw_id() {
        let mut mapper = IdentityMapper::new();
        mapper.register(&vertex(9, 9, 113.0)).unwrap();
        mapper.register(&vertex(4, 7, 113.1)).unwrap();
        let map = mapper.id_map();
        assert_eq!(map.count, 2);
        assert_eq!(map.entries, vec![(4, 1), (7, 1), (9, 0)]);
    }
}
