//! Common types shared between the traffic engine and its collaborators.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a traffic agent, derived from the pool seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Creates a deterministic AgentId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Opaque handle to a visual model owned by one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHandle(pub u64);

/// Airframe size class, selects the visual model and engine sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    Light,
    Regional,
    Narrowbody,
    Widebody,
}

impl SizeClass {
    /// All size classes, in ascending order.
    pub const ALL: [SizeClass; 4] = [
        SizeClass::Light,
        SizeClass::Regional,
        SizeClass::Narrowbody,
        SizeClass::Widebody,
    ];

    /// Base engine pitch multiplier; bigger airframes rumble lower.
    pub fn base_pitch(&self) -> f64 {
        match self {
            SizeClass::Light => 1.3,
            SizeClass::Regional => 1.1,
            SizeClass::Narrowbody => 1.0,
            SizeClass::Widebody => 0.8,
        }
    }

    /// Radio type designator used in callouts.
    pub fn type_designator(&self) -> &'static str {
        match self {
            SizeClass::Light => "Cessna",
            SizeClass::Regional => "Dash Eight",
            SizeClass::Narrowbody => "Airbus",
            SizeClass::Widebody => "Heavy",
        }
    }
}

/// Immutable copy of an agent's pose handed to collaborators each tick.
///
/// Collaborators never see live agent state; they get this value copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub callsign: String,
    pub size_class: SizeClass,
    /// World position [x east, y up, z north] in meters
    pub position: Vector3<f64>,
    /// Heading in radians (0 = +z, clockwise positive)
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    /// Ground or air speed in m/s
    pub speed: f64,
    /// True in climb, cruise, descent and approach
    pub airborne: bool,
    /// True during takeoff and landing roll
    pub rolling: bool,
    /// Flight state name, for display and export
    pub state: String,
}

/// Engine loop parameters for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSound {
    /// Linear gain in [0, 1]
    pub volume: f64,
    /// Playback rate multiplier
    pub pitch: f64,
}

/// A spoken traffic advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callout {
    pub agent: AgentId,
    pub text: String,
    /// Simulation time at which the callout was issued (seconds)
    pub issued_at: f64,
}
