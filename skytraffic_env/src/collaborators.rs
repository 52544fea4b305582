//! Collaborator abstractions consumed by the traffic engine.
//!
//! The engine never builds meshes, plays sounds or samples terrain itself.
//! It talks to the host through these traits:
//!
//! ```text
//!  TrafficManager ──ground_height(x, z)──────► Terrain
//!        │        ──current_focus()──────────► FocusFeed
//!        │        ──build / sync / dispose───► ModelLibrary
//!        │        ──update / stop────────────► EngineAudio
//!        └──────────announce(callout)────────► Announcer
//! ```
//!
//! Every call receives value copies (`AgentSnapshot`, `EngineSound`,
//! `Callout`), never references into engine state.

use crate::error::EnvError;
use crate::types::{AgentId, AgentSnapshot, Callout, EngineSound, ModelHandle, SizeClass};
use nalgebra::Vector3;

/// Ground height queries.
pub trait Terrain: Send {
    /// Returns the ground altitude (y) at horizontal position (x, z).
    fn ground_height(&self, x: f64, z: f64) -> f64;
}

/// Position of the player / active camera.
pub trait FocusFeed: Send {
    /// Returns the current focus position [x, y, z].
    fn current_focus(&self) -> Vector3<f64>;
}

/// Visual model builder and disposer.
///
/// An agent owns its handle exclusively between `build_model` and
/// `dispose_model`.
pub trait ModelLibrary: Send {
    /// Builds a model for the given size class.
    fn build_model(&mut self, size_class: SizeClass) -> Result<ModelHandle, EnvError>;

    /// Pushes the latest transform to a model.
    fn sync(&mut self, handle: ModelHandle, snapshot: &AgentSnapshot);

    /// Releases a model. The handle must not be used afterwards.
    fn dispose_model(&mut self, handle: ModelHandle);
}

/// Spatial engine-loop audio.
pub trait EngineAudio: Send {
    /// Starts or updates the loop for an agent; `None` mutes it.
    fn update(&mut self, agent: AgentId, sound: Option<EngineSound>) -> Result<(), EnvError>;

    /// Stops and forgets the loop for an agent.
    fn stop(&mut self, agent: AgentId);
}

/// Text-to-speech style traffic announcer.
pub trait Announcer: Send {
    fn announce(&mut self, callout: &Callout);
}

/// Bundle of collaborators handed to the traffic manager.
pub struct Collaborators {
    pub terrain: Box<dyn Terrain>,
    pub focus: Box<dyn FocusFeed>,
    pub models: Box<dyn ModelLibrary>,
    pub audio: Box<dyn EngineAudio>,
    pub announcer: Box<dyn Announcer>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            terrain: Box::new(FlatTerrain::default()),
            focus: Box::new(FixedFocus::default()),
            models: Box::new(NullModels::default()),
            audio: Box::new(SilentAudio),
            announcer: Box::new(SilentAnnouncer),
        }
    }
}

// =============================================================================
// INERT IMPLEMENTATIONS
// =============================================================================

/// Terrain at constant elevation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatTerrain {
    pub elevation: f64,
}

impl Terrain for FlatTerrain {
    fn ground_height(&self, _x: f64, _z: f64) -> f64 {
        self.elevation
    }
}

/// A focus that never moves.
#[derive(Debug, Clone, Copy)]
pub struct FixedFocus(pub Vector3<f64>);

impl Default for FixedFocus {
    fn default() -> Self {
        Self(Vector3::zeros())
    }
}

impl FocusFeed for FixedFocus {
    fn current_focus(&self) -> Vector3<f64> {
        self.0
    }
}

/// Hands out handles without building anything.
#[derive(Debug, Default)]
pub struct NullModels {
    next: u64,
}

impl ModelLibrary for NullModels {
    fn build_model(&mut self, _size_class: SizeClass) -> Result<ModelHandle, EnvError> {
        self.next += 1;
        Ok(ModelHandle(self.next))
    }

    fn sync(&mut self, _handle: ModelHandle, _snapshot: &AgentSnapshot) {}

    fn dispose_model(&mut self, _handle: ModelHandle) {}
}

/// Audio backend that plays nothing.
#[derive(Debug, Default)]
pub struct SilentAudio;

impl EngineAudio for SilentAudio {
    fn update(&mut self, _agent: AgentId, _sound: Option<EngineSound>) -> Result<(), EnvError> {
        Ok(())
    }

    fn stop(&mut self, _agent: AgentId) {}
}

/// Announcer that drops every callout.
#[derive(Debug, Default)]
pub struct SilentAnnouncer;

impl Announcer for SilentAnnouncer {
    fn announce(&mut self, _callout: &Callout) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_models_hand_out_distinct_handles() {
        let mut models = NullModels::default();
        let a = models.build_model(SizeClass::Light).unwrap();
        let b = models.build_model(SizeClass::Widebody).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_flat_terrain() {
        let terrain = FlatTerrain { elevation: 12.5 };
        assert_eq!(terrain.ground_height(1000.0, -400.0), 12.5);
    }
}
