//! Recording collaborators with fault injection.
//!
//! The harness hands the manager collaborators that write everything they
//! see into one shared [`Ledger`]. A [`SimProbe`] holds the other end, so
//! scenarios and the oracle can inspect model ownership, audio traffic and
//! callouts, and inject model-build failures.

use crate::context::SimContext;
use nalgebra::Vector3;
use skytraffic_env::{
    AgentId, AgentSnapshot, Announcer, Callout, Collaborators, EngineAudio, EngineSound, EnvError,
    FlatTerrain, FocusFeed, ModelHandle, ModelLibrary, SizeClass, TrafficContext,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything the recording collaborators observed.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    /// Handles built and not yet disposed
    pub live_models: HashSet<ModelHandle>,
    pub models_built: u64,
    pub models_disposed: u64,
    /// Dispose or sync calls on a handle that was not live
    pub stale_handle_uses: u64,
    pub syncs: u64,
    /// Remaining model builds that will fail
    pub pending_build_failures: u32,

    /// Agents with a loop currently playing
    pub audible: HashSet<AgentId>,
    pub audio_updates: u64,
    pub audio_stops: u64,

    pub callouts: Vec<Callout>,
}

/// Shared handle onto the ledger.
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    ledger: Arc<Mutex<Ledger>>,
}

impl SimProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the ledger at this instant.
    pub fn snapshot(&self) -> Ledger {
        self.lock().clone()
    }

    pub fn live_models(&self) -> usize {
        self.lock().live_models.len()
    }

    pub fn stale_handle_uses(&self) -> u64 {
        self.lock().stale_handle_uses
    }

    pub fn audible(&self) -> usize {
        self.lock().audible.len()
    }

    pub fn callouts(&self) -> Vec<Callout> {
        self.lock().callouts.clone()
    }

    /// Makes the next `count` model builds fail.
    pub fn fail_model_builds(&self, count: u32) {
        self.lock().pending_build_failures = count;
    }

    /// Builds the collaborator bundle for a simulated run. The focus
    /// orbits `center` at `radius` meters, one lap per `period` seconds.
    pub fn collaborators(
        &self,
        ctx: Arc<SimContext>,
        center: Vector3<f64>,
        radius: f64,
        period: f64,
    ) -> Collaborators {
        Collaborators {
            terrain: Box::new(FlatTerrain::default()),
            focus: Box::new(OrbitingFocus {
                ctx,
                center,
                radius,
                period,
            }),
            models: Box::new(RecordingModels {
                probe: self.clone(),
                next: 0,
            }),
            audio: Box::new(CountingAudio { probe: self.clone() }),
            announcer: Box::new(RecordingAnnouncer { probe: self.clone() }),
        }
    }
}

/// A focus circling a point on the virtual clock.
pub struct OrbitingFocus {
    ctx: Arc<SimContext>,
    center: Vector3<f64>,
    radius: f64,
    period: f64,
}

impl FocusFeed for OrbitingFocus {
    fn current_focus(&self) -> Vector3<f64> {
        if self.period <= 0.0 {
            return self.center;
        }
        let angle = std::f64::consts::TAU * self.ctx.now().as_secs_f64() / self.period;
        self.center + Vector3::new(angle.sin(), 0.0, angle.cos()) * self.radius
    }
}

/// Hands out handles and tracks which ones are alive.
pub struct RecordingModels {
    probe: SimProbe,
    next: u64,
}

impl ModelLibrary for RecordingModels {
    fn build_model(&mut self, size_class: SizeClass) -> Result<ModelHandle, EnvError> {
        let mut ledger = self.probe.lock();
        if ledger.pending_build_failures > 0 {
            ledger.pending_build_failures -= 1;
            return Err(EnvError::model_build(format!(
                "injected failure for {size_class:?}"
            )));
        }

        self.next += 1;
        let handle = ModelHandle(self.next);
        ledger.live_models.insert(handle);
        ledger.models_built += 1;
        Ok(handle)
    }

    fn sync(&mut self, handle: ModelHandle, _snapshot: &AgentSnapshot) {
        let mut ledger = self.probe.lock();
        if ledger.live_models.contains(&handle) {
            ledger.syncs += 1;
        } else {
            ledger.stale_handle_uses += 1;
        }
    }

    fn dispose_model(&mut self, handle: ModelHandle) {
        let mut ledger = self.probe.lock();
        if ledger.live_models.remove(&handle) {
            ledger.models_disposed += 1;
        } else {
            ledger.stale_handle_uses += 1;
        }
    }
}

/// Counts audio updates and tracks which loops are audible.
pub struct CountingAudio {
    probe: SimProbe,
}

impl EngineAudio for CountingAudio {
    fn update(&mut self, agent: AgentId, sound: Option<EngineSound>) -> Result<(), EnvError> {
        let mut ledger = self.probe.lock();
        ledger.audio_updates += 1;
        match sound {
            Some(sound) if !(0.0..=1.0).contains(&sound.volume) => {
                return Err(EnvError::audio(format!("volume {} out of range", sound.volume)));
            }
            Some(_) => {
                ledger.audible.insert(agent);
            }
            None => {
                ledger.audible.remove(&agent);
            }
        }
        Ok(())
    }

    fn stop(&mut self, agent: AgentId) {
        let mut ledger = self.probe.lock();
        ledger.audio_stops += 1;
        ledger.audible.remove(&agent);
    }
}

/// Keeps every callout.
pub struct RecordingAnnouncer {
    probe: SimProbe,
}

impl Announcer for RecordingAnnouncer {
    fn announce(&mut self, callout: &Callout) {
        self.probe.lock().callouts.push(callout.clone());
    }
}

/// Per-agent count of callouts, for cooldown checks in tests.
pub fn callouts_by_agent(callouts: &[Callout]) -> HashMap<AgentId, usize> {
    let mut counts = HashMap::new();
    for callout in callouts {
        *counts.entry(callout.agent).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bundle(probe: &SimProbe, ctx: Arc<SimContext>) -> Collaborators {
        probe.collaborators(ctx, Vector3::zeros(), 1000.0, 100.0)
    }

    #[test]
    fn test_models_are_tracked_until_disposed() {
        let probe = SimProbe::new();
        let mut collab = bundle(&probe, SimContext::shared(1));

        let a = collab.models.build_model(SizeClass::Light).unwrap();
        let b = collab.models.build_model(SizeClass::Widebody).unwrap();
        assert_ne!(a, b);
        assert_eq!(probe.live_models(), 2);

        collab.models.dispose_model(a);
        collab.models.dispose_model(a);
        assert_eq!(probe.live_models(), 1);
        assert_eq!(probe.stale_handle_uses(), 1);
    }

    #[test]
    fn test_injected_build_failures() {
        let probe = SimProbe::new();
        let mut collab = bundle(&probe, SimContext::shared(1));
        probe.fail_model_builds(1);

        assert!(collab.models.build_model(SizeClass::Regional).is_err());
        assert!(collab.models.build_model(SizeClass::Regional).is_ok());
        assert_eq!(probe.live_models(), 1);
    }

    #[test]
    fn test_audio_tracks_audible_set() {
        let probe = SimProbe::new();
        let mut collab = bundle(&probe, SimContext::shared(1));
        let agent = AgentId::from_seed(3);

        let sound = EngineSound { volume: 0.5, pitch: 1.0 };
        collab.audio.update(agent, Some(sound)).unwrap();
        assert_eq!(probe.audible(), 1);

        collab.audio.update(agent, None).unwrap();
        assert_eq!(probe.audible(), 0);

        let loud = EngineSound { volume: 1.5, pitch: 1.0 };
        assert!(collab.audio.update(agent, Some(loud)).is_err());
    }

    #[test]
    fn test_focus_orbits_on_virtual_clock() {
        let ctx = SimContext::shared(1);
        let probe = SimProbe::new();
        let collab = bundle(&probe, ctx.clone());

        let start = collab.focus.current_focus();
        assert!((start.z - 1000.0).abs() < 1e-9);

        ctx.advance_time(Duration::from_secs(25));
        let quarter = collab.focus.current_focus();
        assert!((quarter.x - 1000.0).abs() < 1e-6);
        assert!(quarter.z.abs() < 1e-6);
    }
}
