//! SkyTraffic Deterministic Simulation Harness
//!
//! This crate runs the traffic engine in a controlled environment where
//! every run is a pure function of one 64-bit seed, and checks the
//! engine's invariants after every tick.
//!
//! # Core Principle: Own Every Source of Change
//!
//! - **Time**: a virtual clock that advances only when the harness ticks
//! - **Randomness**: every RNG stream derived from the master seed
//! - **Collaborators**: recording stand-ins for models, audio and the
//!   announcer, with fault injection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seed)                    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼───────────────────┐      ┌──────────────────────┐   │
//! │  │    TrafficManager      │─────►│ Recording            │   │
//! │  │ (agents, runways, BFS) │      │ collaborators        │   │
//! │  └────────────────────────┘      └──────────┬───────────┘   │
//! │       │ after every tick                    │ SimProbe      │
//! │  ┌────▼───────────────────┐                 │               │
//! │  │        Oracle          │                 │               │
//! │  │   (Invariant Checks)   │                 │               │
//! │  └────────────────────────┘                 │               │
//! └───────┬─────────────────────────────────────┼───────────────┘
//!         │ violations                          │ ledger
//!    ┌────▼─────────────────────────────────────▼────┐
//!    │                ScenarioRunner                 │
//!    └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use skytraffic_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 12)
//!     .with_duration(120.0)
//!     .run(ScenarioId::SingleRunway);
//! assert!(result.passed);
//! ```

mod collaborators;
mod context;
mod error;
mod exporter;
mod oracle;
mod runner;
mod world;
pub mod scenarios;

pub use collaborators::{callouts_by_agent, Ledger, SimProbe};
pub use context::SimContext;
pub use error::{Result, SimError};
pub use exporter::{AgentFrame, RunwayFrame, SimEvent, SimExport, SimFrame};
pub use oracle::{Oracle, Violation};
pub use runner::{broken_taxiways, single_runway, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimWorld};
