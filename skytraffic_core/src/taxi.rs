//! Taxi networks and the ground pathfinder.
//!
//! A taxi network is a small undirected graph of named nodes. Networks are
//! described by [`TaxiNetworkSpec`]s and materialised lazily by
//! [`TaxiGraphs`], which also memoises adjacency lists and route queries.
//!
//! A second airport can reuse an authored layout through
//! [`TaxiNetworkSpec::Derived`]: every node is translated by an offset and
//! every identity (including edge endpoints) gets a prefix, so the derived
//! network is structurally identical to its base.

use crate::error::{Result, TrafficError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// A node of a taxi network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxiNode {
    pub id: String,
    pub position: Vector3<f64>,
}

impl TaxiNode {
    pub fn new(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: id.into(),
            position: Vector3::new(x, y, z),
        }
    }
}

/// How a network is obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxiNetworkSpec {
    /// Hand-authored nodes and undirected edges.
    Authored {
        nodes: Vec<TaxiNode>,
        edges: Vec<(String, String)>,
    },
    /// A translated, re-prefixed copy of another network.
    Derived {
        base: String,
        offset: Vector3<f64>,
        prefix: String,
    },
}

/// A materialised taxi network.
#[derive(Debug, Clone)]
pub struct TaxiNetwork {
    id: String,
    nodes: Vec<TaxiNode>,
    index: HashMap<String, usize>,
    edges: Vec<(String, String)>,
}

impl TaxiNetwork {
    /// Builds a network from nodes and undirected edges.
    pub fn new(id: impl Into<String>, nodes: Vec<TaxiNode>, edges: Vec<(String, String)>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        Self {
            id: id.into(),
            nodes,
            index,
            edges,
        }
    }

    /// Translates every node by `offset` and prefixes every identity.
    pub fn derive(&self, id: impl Into<String>, offset: Vector3<f64>, prefix: &str) -> Self {
        let nodes = self
            .nodes
            .iter()
            .map(|n| TaxiNode {
                id: format!("{prefix}{}", n.id),
                position: n.position + offset,
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|(a, b)| (format!("{prefix}{a}"), format!("{prefix}{b}")))
            .collect();

        Self::new(id, nodes, edges)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nodes(&self) -> &[TaxiNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&TaxiNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<Vector3<f64>> {
        self.node(id).map(|n| n.position)
    }

    /// Closest node by horizontal distance.
    pub fn nearest_node(&self, position: &Vector3<f64>) -> Option<&TaxiNode> {
        self.nodes.iter().min_by(|a, b| {
            let da = horizontal_distance(&a.position, position);
            let db = horizontal_distance(&b.position, position);
            da.total_cmp(&db)
        })
    }

    /// Derives adjacency lists. Edges naming unknown nodes are skipped.
    pub fn adjacency(&self) -> Adjacency {
        let mut neighbors: HashMap<String, Vec<String>> = self
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();

        for (a, b) in &self.edges {
            if !self.contains(a) || !self.contains(b) {
                warn!(network = %self.id, "Skipping edge {}-{}: unknown endpoint", a, b);
                continue;
            }
            if a == b {
                continue;
            }
            if let Some(list) = neighbors.get_mut(a) {
                if !list.contains(b) {
                    list.push(b.clone());
                }
            }
            if let Some(list) = neighbors.get_mut(b) {
                if !list.contains(a) {
                    list.push(a.clone());
                }
            }
        }

        Adjacency { neighbors }
    }
}

/// Adjacency lists of one network.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    neighbors: HashMap<String, Vec<String>>,
}

impl Adjacency {
    pub fn neighbors(&self, id: &str) -> Option<&[String]> {
        self.neighbors.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.neighbors.contains_key(id)
    }

    pub fn is_edge(&self, a: &str, b: &str) -> bool {
        self.neighbors
            .get(a)
            .map_or(false, |list| list.iter().any(|n| n == b))
    }

    /// Unweighted breadth-first search.
    ///
    /// Returns the node sequence from `from` to `to` inclusive, or `None`
    /// if either endpoint is unknown or the two are disconnected.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> = VecDeque::new();

        visited.insert(from);
        frontier.push_back(from);

        while let Some(current) = frontier.pop_front() {
            for next in self.neighbors.get(current).into_iter().flatten() {
                let next = next.as_str();
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, current);

                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut cursor = to;
                    while let Some(&parent) = parents.get(cursor) {
                        path.push(parent.to_string());
                        cursor = parent;
                    }
                    path.reverse();
                    return Some(path);
                }

                frontier.push_back(next);
            }
        }

        None
    }
}

/// Lazily-built, memoised store of every taxi network.
#[derive(Debug, Clone)]
pub struct TaxiGraphs {
    specs: BTreeMap<String, TaxiNetworkSpec>,
    networks: HashMap<String, TaxiNetwork>,
    adjacency: HashMap<String, Adjacency>,
    paths: HashMap<(String, String, String), Option<Vec<String>>>,
}

impl TaxiGraphs {
    pub fn new(specs: BTreeMap<String, TaxiNetworkSpec>) -> Self {
        Self {
            specs,
            networks: HashMap::new(),
            adjacency: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    /// Returns the network, building (and caching) it on first use.
    pub fn network(&mut self, id: &str) -> Result<&TaxiNetwork> {
        self.ensure_network(id, 0)?;
        self.networks
            .get(id)
            .ok_or_else(|| TrafficError::UnknownNetwork(id.to_string()))
    }

    /// Returns the adjacency lists, deriving (and caching) them on first use.
    pub fn adjacency(&mut self, id: &str) -> Result<&Adjacency> {
        if !self.adjacency.contains_key(id) {
            let adjacency = self.network(id)?.adjacency();
            self.adjacency.insert(id.to_string(), adjacency);
        }
        self.adjacency
            .get(id)
            .ok_or_else(|| TrafficError::UnknownNetwork(id.to_string()))
    }

    /// Shortest taxi route between two nodes of a network.
    pub fn shortest_path(&mut self, network: &str, from: &str, to: &str) -> Result<Vec<String>> {
        let key = (network.to_string(), from.to_string(), to.to_string());

        let cached = match self.paths.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let adjacency = self.adjacency(network)?;
                for node in [from, to] {
                    if !adjacency.contains(node) {
                        return Err(TrafficError::MissingNode {
                            network: network.to_string(),
                            node: node.to_string(),
                        });
                    }
                }
                let path = adjacency.shortest_path(from, to);
                debug!(network, from, to, hops = ?path.as_ref().map(Vec::len), "Route computed");
                self.paths.insert(key, path.clone());
                path
            }
        };

        cached.ok_or_else(|| TrafficError::NoPath {
            network: network.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Id of the node closest to a position.
    pub fn nearest_node(&mut self, network: &str, position: &Vector3<f64>) -> Result<String> {
        self.network(network)?
            .nearest_node(position)
            .map(|n| n.id.clone())
            .ok_or_else(|| TrafficError::UnknownNetwork(network.to_string()))
    }

    /// Position of a node.
    pub fn position(&mut self, network: &str, node: &str) -> Result<Vector3<f64>> {
        self.network(network)?
            .position(node)
            .ok_or_else(|| TrafficError::MissingNode {
                network: network.to_string(),
                node: node.to_string(),
            })
    }

    /// Drops every derived artifact; networks rebuild on next use.
    pub fn clear_caches(&mut self) {
        self.networks.clear();
        self.adjacency.clear();
        self.paths.clear();
    }

    /// Number of networks currently materialised.
    pub fn cached_networks(&self) -> usize {
        self.networks.len()
    }

    /// Ids of all known network specs.
    pub fn network_ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    fn ensure_network(&mut self, id: &str, depth: usize) -> Result<()> {
        if self.networks.contains_key(id) {
            return Ok(());
        }
        if depth > self.specs.len() {
            return Err(TrafficError::NetworkCycle(id.to_string()));
        }

        let spec = self
            .specs
            .get(id)
            .cloned()
            .ok_or_else(|| TrafficError::UnknownNetwork(id.to_string()))?;

        let network = match spec {
            TaxiNetworkSpec::Authored { nodes, edges } => TaxiNetwork::new(id, nodes, edges),
            TaxiNetworkSpec::Derived { base, offset, prefix } => {
                self.ensure_network(&base, depth + 1)?;
                let base = self
                    .networks
                    .get(&base)
                    .ok_or_else(|| TrafficError::UnknownNetwork(base.clone()))?;
                base.derive(id, offset, &prefix)
            }
        };

        debug!(network = id, nodes = network.nodes().len(), "Taxi network built");
        self.networks.insert(id.to_string(), network);
        Ok(())
    }
}

/// Distance in the x/z plane.
pub fn horizontal_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    fn line_network() -> TaxiNetworkSpec {
        TaxiNetworkSpec::Authored {
            nodes: vec![
                TaxiNode::new("A", 0.0, 0.0, 0.0),
                TaxiNode::new("B", 100.0, 0.0, 0.0),
                TaxiNode::new("C", 200.0, 0.0, 0.0),
            ],
            edges: vec![edge("A", "B"), edge("B", "C")],
        }
    }

    fn graphs() -> TaxiGraphs {
        let mut specs = BTreeMap::new();
        specs.insert("line".to_string(), line_network());
        specs.insert(
            "line_b".to_string(),
            TaxiNetworkSpec::Derived {
                base: "line".to_string(),
                offset: Vector3::new(1000.0, 0.0, 500.0),
                prefix: "B_".to_string(),
            },
        );
        TaxiGraphs::new(specs)
    }

    #[test]
    fn test_shortest_path_line() {
        let mut graphs = graphs();
        let path = graphs.shortest_path("line", "A", "C").unwrap();
        assert_eq!(path, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_shortest_path_prefers_fewer_hops() {
        let adjacency = TaxiNetwork::new(
            "square",
            vec![
                TaxiNode::new("A", 0.0, 0.0, 0.0),
                TaxiNode::new("B", 1.0, 0.0, 0.0),
                TaxiNode::new("C", 2.0, 0.0, 0.0),
                TaxiNode::new("D", 3.0, 0.0, 0.0),
            ],
            vec![edge("A", "B"), edge("B", "C"), edge("C", "D"), edge("A", "D")],
        )
        .adjacency();

        assert_eq!(adjacency.shortest_path("A", "D").unwrap(), vec!["A", "D"]);
        assert_eq!(adjacency.shortest_path("B", "D").unwrap().len(), 3);
    }

    #[test]
    fn test_shortest_path_missing_endpoint() {
        let mut graphs = graphs();
        let err = graphs.shortest_path("line", "A", "Z").unwrap_err();
        assert!(matches!(err, TrafficError::MissingNode { .. }));
    }

    #[test]
    fn test_shortest_path_disconnected() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "split".to_string(),
            TaxiNetworkSpec::Authored {
                nodes: vec![
                    TaxiNode::new("A", 0.0, 0.0, 0.0),
                    TaxiNode::new("B", 1.0, 0.0, 0.0),
                    TaxiNode::new("C", 5.0, 0.0, 0.0),
                ],
                edges: vec![edge("A", "B")],
            },
        );
        let mut graphs = TaxiGraphs::new(specs);

        let err = graphs.shortest_path("split", "A", "C").unwrap_err();
        assert!(matches!(err, TrafficError::NoPath { .. }));
        // Memoised failures stay failures
        assert!(graphs.shortest_path("split", "A", "C").is_err());
    }

    #[test]
    fn test_derived_network_parity() {
        let mut graphs = graphs();
        let base = graphs.network("line").unwrap().clone();
        let derived = graphs.network("line_b").unwrap().clone();

        assert_eq!(base.nodes().len(), derived.nodes().len());
        assert_eq!(base.edges().len(), derived.edges().len());

        let b = derived.position("B_B").unwrap();
        assert_eq!(b, Vector3::new(1100.0, 0.0, 500.0));
        assert_eq!(
            graphs.shortest_path("line_b", "B_A", "B_C").unwrap(),
            vec!["B_A", "B_B", "B_C"]
        );
    }

    #[test]
    fn test_clear_caches_rebuilds() {
        let mut graphs = graphs();
        graphs.shortest_path("line_b", "B_A", "B_C").unwrap();
        assert_eq!(graphs.cached_networks(), 2);

        graphs.clear_caches();
        assert_eq!(graphs.cached_networks(), 0);

        assert!(graphs.shortest_path("line_b", "B_A", "B_C").is_ok());
    }

    #[test]
    fn test_derivation_cycle_detected() {
        let mut specs = BTreeMap::new();
        for (id, base) in [("x", "y"), ("y", "x")] {
            specs.insert(
                id.to_string(),
                TaxiNetworkSpec::Derived {
                    base: base.to_string(),
                    offset: Vector3::zeros(),
                    prefix: String::new(),
                },
            );
        }
        let mut graphs = TaxiGraphs::new(specs);
        assert!(matches!(graphs.network("x"), Err(TrafficError::NetworkCycle(_))));
    }

    #[test]
    fn test_nearest_node() {
        let mut graphs = graphs();
        let id = graphs
            .nearest_node("line", &Vector3::new(180.0, 30.0, 5.0))
            .unwrap();
        assert_eq!(id, "C");
    }

    #[test]
    fn test_adjacency_edges_are_undirected() {
        let mut graphs = graphs();
        let adjacency = graphs.adjacency("line").unwrap();
        assert!(adjacency.is_edge("A", "B"));
        assert!(adjacency.is_edge("B", "A"));
        assert!(!adjacency.is_edge("A", "C"));
    }
}
