//! SkyTraffic Core - Background Air Traffic Engine
//!
//! A fixed pool of autonomous aircraft cycles through gate departure, taxi,
//! takeoff, climb, cruise, descent, approach, landing and taxi-in across
//! several airports. Three problems are solved here:
//! 1. **Ground routing**: BFS over memoised taxi networks, with derived
//!    networks for airports sharing a layout
//! 2. **Runway contention**: exclusive per-runway occupancy with delayed,
//!    cancelable releases after liftoff
//! 3. **Recovery**: bounded retry-then-place on route failure, recycle on
//!    dead ends, deferred respawn on missing configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     TrafficManager                       │
//! │  initialize(count) · tick(dt) · reset()                  │
//! │                                                          │
//! │   agents: Vec<Agent> ──► flight::step (per state)        │
//! │        │                     │            │              │
//! │        │             ┌───────▼──────┐ ┌───▼──────────┐   │
//! │        │             │  TaxiGraphs  │ │RunwayArbiter │   │
//! │        │             │ (BFS, cache) │ │(flags,timers)│   │
//! │        │             └──────────────┘ └──────────────┘   │
//! │        ▼ snapshots                                       │
//! │  ModelLibrary · EngineAudio · Announcer (collaborators)  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod airport;
pub mod audio;
pub mod callout;
pub mod config;
pub mod error;
pub mod flight;
pub mod metrics;
pub mod runway;
pub mod steering;
pub mod taxi;
pub mod traffic;

// Re-export key types for convenience
pub use agent::{Agent, FlightState};
pub use airport::{Airport, AirportSet, Axis, Runway};
pub use audio::engine_sound;
pub use callout::{CalloutScheduler, traffic_message};
pub use config::TrafficConfig;
pub use error::{Result, TrafficError};
pub use metrics::TrafficMetrics;
pub use runway::{OtherAgents, RunwayArbiter, RunwayRef, TimerId};
pub use taxi::{Adjacency, TaxiGraphs, TaxiNetwork, TaxiNetworkSpec, TaxiNode};
pub use traffic::TrafficManager;
