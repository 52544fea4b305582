//! SkyTraffic Environment Abstraction Layer
//!
//! This crate provides the seam between the traffic engine and the world
//! it runs in, so the same engine can be driven by a **Real-time** host
//! (tokio) or a **Deterministic Simulation** (virtual clock).
//!
//! # Core Concept
//!
//! Everything the engine does not own is behind a trait:
//! - Time and entropy (`TrafficContext`)
//! - Terrain, focus, visual models, engine audio, announcements
//!   (`collaborators`)
//!
//! By deriving all entropy from a single 64-bit seed, any traffic
//! pattern becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use skytraffic_env::{TrafficContext, TokioContext};
//!
//! async fn host_loop<Ctx: TrafficContext>(ctx: &Ctx, manager: &mut Manager) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(33)).await;
//!         manager.tick(0.033);
//!     }
//! }
//! ```

mod context;
mod error;
mod tokio_impl;
mod types;
pub mod collaborators;

pub use collaborators::{
    Announcer, Collaborators, EngineAudio, FixedFocus, FlatTerrain, FocusFeed, ModelLibrary,
    NullModels, SilentAnnouncer, SilentAudio, Terrain,
};
pub use context::TrafficContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::{AgentId, AgentSnapshot, Callout, EngineSound, ModelHandle, SizeClass};
