//! Static airport configuration.
//!
//! Airports, runways and taxi-network specs are created once at startup,
//! either from the built-in world ([`AirportSet::default_world`]) or from a
//! JSON document.
//!
//! World frame: x east, y up, z north. Headings are radians, 0 = +z,
//! clockwise positive.

use crate::error::{Result, TrafficError};
use crate::taxi::{TaxiNetworkSpec, TaxiNode};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Principal axis of a runway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Z,
}

/// A runway, used in one direction: departures roll from `thresholds[0]`
/// toward `thresholds[1]`; arrivals land from whichever end they approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runway {
    pub id: String,
    pub heading: f64,
    pub thresholds: [Vector3<f64>; 2],
    pub length: f64,
    pub width: f64,
    pub axis: Axis,
}

impl Runway {
    /// Builds a runway between two thresholds.
    pub fn between(id: impl Into<String>, start: Vector3<f64>, end: Vector3<f64>, width: f64) -> Self {
        let delta = end - start;
        let axis = if delta.x.abs() >= delta.z.abs() { Axis::X } else { Axis::Z };

        Self {
            id: id.into(),
            heading: bearing(&start, &end),
            thresholds: [start, end],
            length: (delta.x * delta.x + delta.z * delta.z).sqrt(),
            width,
            axis,
        }
    }

    /// Where departures line up.
    pub fn departure_threshold(&self) -> Vector3<f64> {
        self.thresholds[0]
    }

    /// Index of the threshold closest to `position`, which becomes the
    /// approach end.
    pub fn approach_end(&self, position: &Vector3<f64>) -> usize {
        let d0 = crate::taxi::horizontal_distance(&self.thresholds[0], position);
        let d1 = crate::taxi::horizontal_distance(&self.thresholds[1], position);
        if d0 <= d1 { 0 } else { 1 }
    }

    /// Touchdown point and landing heading for an approach from `end`.
    pub fn touchdown(&self, end: usize, fraction: f64) -> (Vector3<f64>, f64) {
        let from = self.thresholds[end];
        let to = self.thresholds[1 - end];
        (from + (to - from) * fraction, bearing(&from, &to))
    }

    /// Keeps a rolling aircraft on the centerline: the along-axis
    /// coordinate is free, the cross-axis coordinate is pinned.
    pub fn lock_to_centerline(&self, position: &mut Vector3<f64>) {
        let (start, end) = (self.thresholds[0], self.thresholds[1]);
        match self.axis {
            Axis::X => {
                let t = if (end.x - start.x).abs() > f64::EPSILON {
                    (position.x - start.x) / (end.x - start.x)
                } else {
                    0.0
                };
                position.z = start.z + (end.z - start.z) * t;
            }
            Axis::Z => {
                let t = if (end.z - start.z).abs() > f64::EPSILON {
                    (position.z - start.z) / (end.z - start.z)
                } else {
                    0.0
                };
                position.x = start.x + (end.x - start.x) * t;
            }
        }
    }

    fn translated(&self, offset: Vector3<f64>) -> Self {
        Self {
            thresholds: [self.thresholds[0] + offset, self.thresholds[1] + offset],
            ..self.clone()
        }
    }
}

/// An airport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airport {
    pub id: String,
    pub name: String,
    pub position: Vector3<f64>,
    pub runways: Vec<Runway>,
    /// Gate node ids
    pub gates: Vec<String>,
    /// Runway id -> hold-short node ids
    pub hold_short: HashMap<String, Vec<String>>,
    /// Taxi network id
    pub network: String,
}

impl Airport {
    pub fn runway(&self, id: &str) -> Option<&Runway> {
        self.runways.iter().find(|r| r.id == id)
    }

    pub fn hold_nodes(&self, runway: &str) -> &[String] {
        self.hold_short.get(runway).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A structurally identical airport at `offset`, using a network whose
    /// node ids carry `prefix`.
    pub fn translated(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        offset: Vector3<f64>,
        prefix: &str,
        network: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: self.position + offset,
            runways: self.runways.iter().map(|r| r.translated(offset)).collect(),
            gates: self.gates.iter().map(|g| format!("{prefix}{g}")).collect(),
            hold_short: self
                .hold_short
                .iter()
                .map(|(rwy, nodes)| {
                    (rwy.clone(), nodes.iter().map(|n| format!("{prefix}{n}")).collect())
                })
                .collect(),
            network: network.into(),
        }
    }
}

/// Every airport plus every taxi-network spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirportSet {
    pub airports: Vec<Airport>,
    pub networks: BTreeMap<String, TaxiNetworkSpec>,
}

impl AirportSet {
    /// Parses and validates a JSON airport set.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let set: Self = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    /// Reads, parses and validates a JSON airport set.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Structural checks. Node-level problems (unknown gates, missing hold
    /// nodes) are tolerated here and recovered at spawn time.
    pub fn validate(&self) -> Result<()> {
        if self.airports.len() < 2 {
            return Err(TrafficError::NotEnoughAirports(self.airports.len()));
        }
        for airport in &self.airports {
            if !self.networks.contains_key(&airport.network) {
                return Err(TrafficError::UnknownNetwork(airport.network.clone()));
            }
            if airport.runways.is_empty() {
                return Err(TrafficError::NoRunways(airport.id.clone()));
            }
        }
        Ok(())
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.airports.iter().position(|a| a.id == id)
    }

    /// Built-in world: a two-runway hub, a derived twin of the hub, and a
    /// single-runway regional field.
    pub fn default_world() -> Self {
        let hub = hub_airport();
        let twin_offset = Vector3::new(60_000.0, 0.0, 25_000.0);
        let twin = hub.translated("SKYB", "Bayside International", twin_offset, "B_", "hub_b");
        let regional = regional_airport();

        let mut networks = BTreeMap::new();
        networks.insert("hub".to_string(), hub_network());
        networks.insert(
            "hub_b".to_string(),
            TaxiNetworkSpec::Derived {
                base: "hub".to_string(),
                offset: twin_offset,
                prefix: "B_".to_string(),
            },
        );
        networks.insert("regional".to_string(), regional_network());

        Self {
            airports: vec![hub, twin, regional],
            networks,
        }
    }
}

/// Bearing from `a` to `b` (0 = +z, clockwise positive).
pub fn bearing(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (b.x - a.x).atan2(b.z - a.z)
}

// =============================================================================
// BUILT-IN WORLD
// =============================================================================

fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

fn hub_airport() -> Airport {
    let mut hold_short = HashMap::new();
    hold_short.insert("09".to_string(), vec!["H09".to_string(), "H09M".to_string()]);
    hold_short.insert("18".to_string(), vec!["H18".to_string()]);

    Airport {
        id: "SKYA".to_string(),
        name: "Skyharbor Central".to_string(),
        position: Vector3::zeros(),
        runways: vec![
            Runway::between(
                "09",
                Vector3::new(-1500.0, 0.0, 0.0),
                Vector3::new(1500.0, 0.0, 0.0),
                45.0,
            ),
            Runway::between(
                "18",
                Vector3::new(2500.0, 0.0, 1500.0),
                Vector3::new(2500.0, 0.0, -1500.0),
                45.0,
            ),
        ],
        gates: ["G1", "G2", "G3", "G4"].iter().map(|g| g.to_string()).collect(),
        hold_short,
        network: "hub".to_string(),
    }
}

fn hub_network() -> TaxiNetworkSpec {
    TaxiNetworkSpec::Authored {
        nodes: vec![
            TaxiNode::new("G1", -600.0, 0.0, -400.0),
            TaxiNode::new("G2", -300.0, 0.0, -400.0),
            TaxiNode::new("G3", 0.0, 0.0, -400.0),
            TaxiNode::new("G4", 300.0, 0.0, -400.0),
            TaxiNode::new("T0", -1450.0, 0.0, -250.0),
            TaxiNode::new("T1", -600.0, 0.0, -250.0),
            TaxiNode::new("T2", -300.0, 0.0, -250.0),
            TaxiNode::new("T3", 0.0, 0.0, -250.0),
            TaxiNode::new("T4", 300.0, 0.0, -250.0),
            TaxiNode::new("T5", 1000.0, 0.0, -250.0),
            TaxiNode::new("T6", 2300.0, 0.0, -250.0),
            TaxiNode::new("N1", 2300.0, 0.0, 700.0),
            TaxiNode::new("H09", -1450.0, 0.0, -100.0),
            TaxiNode::new("H09M", 0.0, 0.0, -100.0),
            TaxiNode::new("H18", 2350.0, 0.0, 1400.0),
            // Runway exits
            TaxiNode::new("X1", -700.0, 0.0, -60.0),
            TaxiNode::new("X2", 700.0, 0.0, -60.0),
            TaxiNode::new("X3", 2440.0, 0.0, -900.0),
        ],
        edges: edges(&[
            ("G1", "T1"),
            ("G2", "T2"),
            ("G3", "T3"),
            ("G4", "T4"),
            ("T0", "T1"),
            ("T1", "T2"),
            ("T2", "T3"),
            ("T3", "T4"),
            ("T4", "T5"),
            ("T5", "T6"),
            ("T6", "N1"),
            ("N1", "H18"),
            ("T0", "H09"),
            ("T3", "H09M"),
            ("X1", "T1"),
            ("X2", "T5"),
            ("X3", "T6"),
        ]),
    }
}

fn regional_airport() -> Airport {
    let mut hold_short = HashMap::new();
    hold_short.insert("36".to_string(), vec!["C_H36".to_string()]);

    Airport {
        id: "SKYC".to_string(),
        name: "Cedar Valley Regional".to_string(),
        position: Vector3::new(-45_000.0, 0.0, 50_000.0),
        runways: vec![Runway::between(
            "36",
            Vector3::new(-45_000.0, 0.0, 48_800.0),
            Vector3::new(-45_000.0, 0.0, 51_200.0),
            30.0,
        )],
        gates: vec!["C_G1".to_string(), "C_G2".to_string()],
        hold_short,
        network: "regional".to_string(),
    }
}

fn regional_network() -> TaxiNetworkSpec {
    TaxiNetworkSpec::Authored {
        nodes: vec![
            TaxiNode::new("C_G1", -44_600.0, 0.0, 49_600.0),
            TaxiNode::new("C_G2", -44_600.0, 0.0, 49_900.0),
            TaxiNode::new("C_T0", -44_800.0, 0.0, 48_850.0),
            TaxiNode::new("C_T1", -44_800.0, 0.0, 49_600.0),
            TaxiNode::new("C_T2", -44_800.0, 0.0, 49_900.0),
            TaxiNode::new("C_T3", -44_800.0, 0.0, 50_900.0),
            TaxiNode::new("C_H36", -44_920.0, 0.0, 48_850.0),
            TaxiNode::new("C_X1", -44_950.0, 0.0, 50_900.0),
        ],
        edges: edges(&[
            ("C_G1", "C_T1"),
            ("C_G2", "C_T2"),
            ("C_T0", "C_T1"),
            ("C_T1", "C_T2"),
            ("C_T2", "C_T3"),
            ("C_T0", "C_H36"),
            ("C_T3", "C_X1"),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxi::TaxiGraphs;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_runway_between_derives_heading_and_axis() {
        let rwy = Runway::between("09", Vector3::new(-1500.0, 0.0, 0.0), Vector3::new(1500.0, 0.0, 0.0), 45.0);
        assert_relative_eq!(rwy.heading, FRAC_PI_2);
        assert_relative_eq!(rwy.length, 3000.0);
        assert_eq!(rwy.axis, Axis::X);

        let rwy = Runway::between("18", Vector3::new(0.0, 0.0, 1500.0), Vector3::new(0.0, 0.0, -1500.0), 45.0);
        assert_relative_eq!(rwy.heading.abs(), PI);
        assert_eq!(rwy.axis, Axis::Z);
    }

    #[test]
    fn test_touchdown_from_far_end() {
        let rwy = Runway::between("09", Vector3::new(-1500.0, 0.0, 0.0), Vector3::new(1500.0, 0.0, 0.0), 45.0);
        let end = rwy.approach_end(&Vector3::new(8000.0, 500.0, 300.0));
        assert_eq!(end, 1);

        let (point, heading) = rwy.touchdown(end, 0.15);
        assert_relative_eq!(point.x, 1050.0);
        assert_relative_eq!(heading, -FRAC_PI_2);
    }

    #[test]
    fn test_lock_to_centerline() {
        let rwy = Runway::between("36", Vector3::new(100.0, 0.0, 0.0), Vector3::new(100.0, 0.0, 2000.0), 30.0);
        let mut pos = Vector3::new(112.0, 0.0, 900.0);
        rwy.lock_to_centerline(&mut pos);
        assert_relative_eq!(pos.x, 100.0);
        assert_relative_eq!(pos.z, 900.0);
    }

    #[test]
    fn test_default_world_references_resolve() {
        let world = AirportSet::default_world();
        world.validate().unwrap();
        let mut graphs = TaxiGraphs::new(world.networks.clone());

        for airport in &world.airports {
            let network = graphs.network(&airport.network).unwrap().clone();
            for gate in &airport.gates {
                assert!(network.contains(gate), "{} missing gate {}", airport.id, gate);
            }
            for runway in &airport.runways {
                let holds = airport.hold_nodes(&runway.id);
                assert!(!holds.is_empty());
                for hold in holds {
                    for gate in &airport.gates {
                        assert!(graphs.shortest_path(&airport.network, gate, hold).is_ok());
                    }
                }
            }
        }
    }

    #[test]
    fn test_twin_airport_is_translated() {
        let world = AirportSet::default_world();
        let hub = &world.airports[0];
        let twin = &world.airports[1];
        let offset = twin.position - hub.position;

        assert_eq!(twin.gates[0], "B_G1");
        assert_eq!(twin.hold_nodes("09"), ["B_H09".to_string(), "B_H09M".to_string()]);
        assert_relative_eq!(twin.runways[0].thresholds[0].x, hub.runways[0].thresholds[0].x + offset.x);
    }

    #[test]
    fn test_json_round_trip_validates() {
        let world = AirportSet::default_world();
        let json = serde_json::to_string(&world).unwrap();
        let parsed = AirportSet::from_json_str(&json).unwrap();
        assert_eq!(parsed.airports.len(), 3);
        assert_eq!(parsed.index_of("SKYC"), Some(2));
    }

    #[test]
    fn test_runwayless_airport_rejected() {
        let mut world = AirportSet::default_world();
        world.airports[2].runways.clear();
        assert!(matches!(world.validate(), Err(TrafficError::NoRunways(id)) if id == "SKYC"));
    }

    #[test]
    fn test_single_airport_rejected() {
        let mut world = AirportSet::default_world();
        world.airports.truncate(1);
        assert!(matches!(world.validate(), Err(TrafficError::NotEnoughAirports(1))));
    }
}
