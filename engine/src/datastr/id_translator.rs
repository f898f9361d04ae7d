//! Id maps between the numbering schemes of the stages and their composition.
//!
//! Three id spaces exist: raw ids of the map export, canonical dense ids of the
//! full graph and the dense ids of the largest connected component.
//! A lookup which misses either means the element was filtered out on purpose
//! (an edge outside the imported region, a vertex outside the component)
//! or that the derived files contradict each other.
//! Every layer knows which of the two a miss means for it.

use crate::datastr::graph::*;
use crate::error::{PrepError, Result};
use crate::io::*;
use std::{
    collections::HashMap,
    fmt::Display,
    hash::Hash,
    io::prelude::*,
    str::FromStr,
};

/// On disk id map: a count line followed by `old new` lines.
///
/// The count is whatever the producer declared.
/// For vertex maps it is the number of canonical vertices, which may be less
/// than the number of lines since several raw ids can share one canonical id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMap<K, V> {
    pub count: usize,
    pub entries: Vec<(K, V)>,
}

impl<K, V> IdMap<K, V> {
    pub fn new(count: usize, entries: Vec<(K, V)>) -> Self {
        IdMap { count, entries }
    }
}

impl<K: FromStr, V: FromStr> Load for IdMap<K, V> {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let count = reader.read_count()?;
        let mut entries = Vec::with_capacity(count);
        while let Some(mut fields) = reader.next_fields()? {
            entries.push((fields.next()?, fields.next()?));
        }
        Ok(IdMap { count, entries })
    }
}

impl<K: Display, V: Display> Store for IdMap<K, V> {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", self.count)?;
        for (old, new) in &self.entries {
            writeln!(out, "{} {}", old, new)?;
        }
        Ok(())
    }
}

/// Raw edge id to the ids of its two endpoints, in the direction the edge was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeToNodeMap(pub Vec<(RawEdgeId, NodeId, NodeId)>);

impl Load for EdgeToNodeMap {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self> {
        let count = reader.read_count()?;
        let mut entries = Vec::with_capacity(count);
        while let Some(mut fields) = reader.next_fields()? {
            entries.push((fields.next()?, fields.next()?, fields.next()?));
        }
        if entries.len() != count {
            return Err(PrepError::CountMismatch {
                what: "edge to node map size",
                expected: count,
                found: entries.len(),
            });
        }
        Ok(EdgeToNodeMap(entries))
    }
}

impl Store for EdgeToNodeMap {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", self.0.len())?;
        for (edge, tail, head) in &self.0 {
            writeln!(out, "{} {} {}", edge, tail, head)?;
        }
        Ok(())
    }
}

/// What a failed lookup means for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    /// The id was removed on purpose, callers skip the element.
    Filtered,
    /// The derived files are inconsistent, processing must stop.
    Corrupt,
}

/// A single id mapping with explicit semantics for missing keys.
#[derive(Debug, Clone)]
pub struct TranslationLayer<K, V> {
    name: &'static str,
    map: HashMap<K, V>,
    on_missing: OnMissing,
}

impl<K, V> TranslationLayer<K, V>
where
    K: Hash + Eq + Copy + Into<i64>,
    V: Copy,
{
    pub fn new(name: &'static str, on_missing: OnMissing) -> Self {
        TranslationLayer {
            name,
            map: HashMap::new(),
            on_missing,
        }
    }

    /// Add a mapping. A key may only be mapped once.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        if self.map.insert(key, value).is_some() {
            return Err(PrepError::DuplicateTranslation {
                layer: self.name,
                id: key.into(),
            });
        }
        Ok(())
    }

    /// `Ok(None)` for filtered ids, an error if a miss means corruption.
    pub fn resolve(&self, key: K) -> Result<Option<V>> {
        match self.map.get(&key) {
            Some(&value) => Ok(Some(value)),
            None if self.on_missing == OnMissing::Filtered => Ok(None),
            None => Err(self.missing(key)),
        }
    }

    /// Lookup for callers which know the key has to be present.
    pub fn require(&self, key: K) -> Result<V> {
        self.map.get(&key).copied().ok_or_else(|| self.missing(key))
    }

    pub fn contains(&self, key: K) -> bool {
        self.map.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn missing(&self, key: K) -> PrepError {
        PrepError::Translation {
            layer: self.name,
            id: key.into(),
        }
    }
}

/// An edge of the largest component as seen from a trajectory or an update table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub dense: EdgeId,
    pub tail: NodeId,
    pub head: NodeId,
}

/// The chain raw edge id -> canonical endpoints -> component endpoints,
/// plus the raw <-> dense edge id bijection.
#[derive(Debug, Clone)]
pub struct IdTranslator {
    dense_edges: TranslationLayer<RawEdgeId, EdgeId>,
    raw_edges: Vec<RawEdgeId>,
    endpoints: TranslationLayer<RawEdgeId, (NodeId, NodeId)>,
    component: TranslationLayer<NodeId, NodeId>,
    component_size: usize,
}

impl IdTranslator {
    /// Build the translator from the outputs of the graph builder and the component extraction.
    pub fn new(edge_ids: &IdMap<RawEdgeId, EdgeId>, edge_to_node: &EdgeToNodeMap, component_ids: &IdMap<NodeId, NodeId>) -> Result<Self> {
        let num_edges = edge_ids.count;
        if edge_ids.entries.len() != num_edges {
            return Err(PrepError::CountMismatch {
                what: "edge id map size",
                expected: num_edges,
                found: edge_ids.entries.len(),
            });
        }

        let mut dense_edges = TranslationLayer::new("raw to dense edge map", OnMissing::Corrupt);
        let mut raw_edges = vec![None; num_edges];
        for &(raw, dense) in &edge_ids.entries {
            let slot = raw_edges.get_mut(dense as usize).ok_or(PrepError::IdOutOfRange {
                what: "dense edge",
                id: u64::from(dense),
                bound: num_edges,
            })?;
            if slot.is_some() {
                return Err(PrepError::DuplicateTranslation {
                    layer: "dense to raw edge map",
                    id: i64::from(dense),
                });
            }
            *slot = Some(raw);
            dense_edges.insert(raw, dense)?;
        }
        // every slot is filled: num_edges distinct dense ids all below num_edges
        let raw_edges = raw_edges.into_iter().flatten().collect();

        if edge_to_node.0.len() != num_edges {
            return Err(PrepError::CountMismatch {
                what: "edge to node map size",
                expected: num_edges,
                found: edge_to_node.0.len(),
            });
        }
        let mut endpoints = TranslationLayer::new("edge to node map", OnMissing::Filtered);
        for &(raw, tail, head) in &edge_to_node.0 {
            endpoints.insert(raw, (tail, head))?;
        }

        let mut component = TranslationLayer::new("component id map", OnMissing::Filtered);
        for &(old, new) in &component_ids.entries {
            if new as usize >= component_ids.count {
                return Err(PrepError::IdOutOfRange {
                    what: "component vertex",
                    id: u64::from(new),
                    bound: component_ids.count,
                });
            }
            component.insert(old, new)?;
        }

        Ok(IdTranslator {
            dense_edges,
            raw_edges,
            endpoints,
            component,
            component_size: component_ids.count,
        })
    }

    pub fn num_edges(&self) -> usize {
        self.raw_edges.len()
    }

    pub fn component_size(&self) -> usize {
        self.component_size
    }

    /// Dense id of a known raw edge.
    pub fn dense_edge(&self, raw: RawEdgeId) -> Result<EdgeId> {
        self.dense_edges.require(unsigned_edge(raw)?)
    }

    /// Raw id of a dense edge.
    pub fn raw_edge(&self, dense: EdgeId) -> Result<RawEdgeId> {
        self.raw_edges.get(dense as usize).copied().ok_or(PrepError::IdOutOfRange {
            what: "dense edge",
            id: u64::from(dense),
            bound: self.raw_edges.len(),
        })
    }

    /// Component vertex of a canonical vertex, `None` outside the component.
    pub fn component_node(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.component.resolve(node)
    }

    /// Component endpoints of a raw edge.
    ///
    /// The sign of the raw id is ignored.
    /// `None` if the edge is unknown or leaves the component.
    pub fn component_endpoints(&self, raw: RawEdgeId) -> Result<Option<(NodeId, NodeId)>> {
        let (tail, head) = match self.endpoints.resolve(unsigned_edge(raw)?)? {
            Some(endpoints) => endpoints,
            None => return Ok(None),
        };
        match (self.component.resolve(tail)?, self.component.resolve(head)?) {
            (Some(tail), Some(head)) => Ok(Some((tail, head))),
            _ => Ok(None),
        }
    }

    /// Full resolution of a raw edge id as found in trajectories.
    pub fn resolve_edge(&self, raw: RawEdgeId) -> Result<Option<ResolvedEdge>> {
        match self.component_endpoints(raw)? {
            Some((tail, head)) => Ok(Some(ResolvedEdge {
                dense: self.dense_edge(raw)?,
                tail,
                head,
            })),
            None => Ok(None),
        }
    }

    /// Component endpoints of a dense edge. The endpoints of a dense edge have to exist.
    pub fn dense_component_endpoints(&self, dense: EdgeId) -> Result<Option<(NodeId, NodeId)>> {
        let raw = self.raw_edge(dense)?;
        let (tail, head) = self.endpoints.require(raw)?;
        match (self.component.resolve(tail)?, self.component.resolve(head)?) {
            (Some(tail), Some(head)) => Ok(Some((tail, head))),
            _ => Ok(None),
        }
    }

    /// Raw ids of all edges with both endpoints in the component, with their component endpoints.
    pub fn component_edges(&self) -> Result<Vec<(RawEdgeId, NodeId, NodeId)>> {
        let mut edges = Vec::new();
        for &raw in &self.raw_edges {
            if let Some((tail, head)) = self.component_endpoints(raw)? {
                edges.push((raw, tail, head));
            }
        }
        Ok(edges)
    }
}

/// Raw edge id without the sign marking the driving direction.
fn unsigned_edge(raw: RawEdgeId) -> Result<RawEdgeId> {
    raw.checked_abs().ok_or(PrepError::IdOutOfRange {
        what: "raw edge",
        id: raw.unsigned_abs(),
        bound: i64::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> IdTranslator {
        let edge_ids = IdMap::new(3, vec![(100, 0), (200, 1), (300, 2)]);
        let edge_to_node = EdgeToNodeMap(vec![(100, 0, 1), (200, 1, 2), (300, 2, 3)]);
        // canonical vertex 3 is outside the component
        let component = IdMap::new(3, vec![(0, 0), (1, 1), (2, 2)]);
        IdTranslator::new(&edge_ids, &edge_to_node, &component).unwrap()
    }

    #[test]
    fn filtered_and_corrupt_misses_differ() {
        let mut layer = TranslationLayer::<NodeId, NodeId>::new("test", OnMissing::Filtered);
        layer.insert(1, 2).unwrap();
        assert_eq!(layer.resolve(1).unwrap(), Some(2));
        assert_eq!(layer.resolve(5).unwrap(), None);
        assert!(layer.require(5).is_err());
        assert!(layer.insert(1, 3).is_err());

        let strict = TranslationLayer::<NodeId, NodeId>::new("strict", OnMissing::Corrupt);
        assert!(matches!(strict.resolve(5), Err(PrepError::Translation { layer: "strict", id: 5 })));
    }

    #[test]
    fn signed_edge_ids_resolve_like_unsigned_ones() {
        let translator = translator();
        let expected = Some(ResolvedEdge { dense: 1, tail: 1, head: 2 });
        assert_eq!(translator.resolve_edge(200).unwrap(), expected);
        assert_eq!(translator.resolve_edge(-200).unwrap(), expected);
        assert!(matches!(
            translator.resolve_edge(i64::MIN),
            Err(PrepError::IdOutOfRange { what: "raw edge", .. })
        ));
        assert!(translator.dense_edge(i64::MIN).is_err());
    }

    #[test]
    fn edges_leaving_the_component_are_filtered() {
        let translator = translator();
        assert_eq!(translator.resolve_edge(300).unwrap(), None);
        assert_eq!(translator.resolve_edge(999).unwrap(), None);
        assert_eq!(translator.dense_component_endpoints(2).unwrap(), None);
        assert_eq!(translator.component_edges().unwrap(), vec![(100, 0, 1), (200, 1, 2)]);
    }

    #[test]
    fn inconsistent_maps_are_rejected() {
        let edge_ids = IdMap::new(2, vec![(100, 0), (200, 0)]);
        let edge_to_node = EdgeToNodeMap(vec![(100, 0, 1), (200, 1, 2)]);
        let component = IdMap::new(0, vec![]);
        assert!(IdTranslator::new(&edge_ids, &edge_to_node, &component).is_err());

        let edge_ids = IdMap::new(2, vec![(100, 0), (200, 1)]);
        let edge_to_node = EdgeToNodeMap(vec![(100, 0, 1)]);
        assert!(matches!(
            IdTranslator::new(&edge_ids, &edge_to_node, &component),
            Err(PrepError::CountMismatch { .. })
        ));
    }

    #[test]
    fn id_map_round_trip() {
        let map: IdMap<RawNodeId, NodeId> = IdMap::new(2, vec![(11, 0), (12, 1), (13, 1)]);
        let text = store_to_string(&map);
        assert_eq!(text, "2\n11 0\n12 1\n13 1\n");
        assert_eq!(IdMap::<RawNodeId, NodeId>::load(&mut reader_for(&text)).unwrap(), map);
    }
}
