//! JSON exporter for offline replay.
//!
//! Exports simulation frames as JSON: every aircraft's pose and state plus
//! every runway's flag, sampled at a fixed tick interval.

use crate::error::Result;
use crate::world::SimWorld;
use serde::{Deserialize, Serialize};
use skytraffic_core::{RunwayRef, TrafficMetrics};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub agents: Vec<AgentFrame>,

    pub runways: Vec<RunwayFrame>,

    /// Events (resets, violations, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// One aircraft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFrame {
    pub id: Uuid,
    pub callsign: String,
    pub state: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub heading_deg: f64,
    pub speed: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub runway: Option<String>,
}

/// One runway's occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunwayFrame {
    pub runway: String,
    pub occupied: bool,
    pub pending_release: bool,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

impl SimFrame {
    /// Captures the world as it is now.
    pub fn capture(world: &SimWorld, events: Vec<SimEvent>) -> Self {
        let manager = world.manager();

        let agents = manager
            .agents()
            .iter()
            .map(|agent| AgentFrame {
                id: agent.id.as_uuid(),
                callsign: agent.callsign.clone(),
                state: agent.state.name().to_string(),
                x: agent.position.x,
                y: agent.position.y,
                z: agent.position.z,
                heading_deg: agent.heading.to_degrees(),
                speed: agent.speed,
                runway: agent.runway.as_ref().map(RunwayRef::to_string),
            })
            .collect();

        let arbiter = manager.runways();
        let runways = manager
            .airports()
            .airports
            .iter()
            .enumerate()
            .flat_map(|(index, airport)| {
                airport
                    .runways
                    .iter()
                    .map(move |runway| RunwayRef::new(index, runway.id.clone()))
            })
            .map(|runway| RunwayFrame {
                occupied: arbiter.is_occupied(&runway),
                pending_release: arbiter.has_pending_release(&runway),
                runway: runway.to_string(),
            })
            .collect();

        Self {
            time_sec: world.time(),
            agents,
            runways,
            events,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<TrafficMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, metrics: TrafficMetrics) {
        self.passed = passed;
        self.metrics = Some(metrics);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
