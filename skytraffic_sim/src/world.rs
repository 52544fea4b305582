//! SimWorld - The simulation harness container.

use crate::collaborators::SimProbe;
use crate::context::SimContext;
use crate::error::Result;
use crate::oracle::Oracle;

use nalgebra::Vector3;
use skytraffic_core::{AirportSet, TrafficConfig, TrafficManager};
use skytraffic_env::TrafficContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Radius of the listener's orbit around the middle of the world (m).
const FOCUS_RADIUS: f64 = 20_000.0;

/// Seconds per lap of the listener's orbit.
const FOCUS_PERIOD: f64 = 900.0;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of aircraft in the pool
    pub num_agents: usize,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Maximum simulation duration in seconds (0 = unlimited)
    pub max_duration_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 12,
            tick_rate_hz: 30,
            max_duration_secs: 120.0,
        }
    }
}

/// The SimWorld - one traffic pool on a virtual clock, watched by the oracle.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    manager: TrafficManager<SimContext>,
    oracle: Oracle,
    probe: SimProbe,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a world on the built-in airports with default kinematics.
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_world(config, AirportSet::default_world(), TrafficConfig::default())
    }

    /// Creates a world on a custom airport set and traffic configuration.
    pub fn with_world(
        config: SimConfig,
        airports: AirportSet,
        traffic: TrafficConfig,
    ) -> Result<Self> {
        let context = SimContext::shared(config.seed);
        let probe = SimProbe::new();

        let center = world_center(&airports);
        let collaborators =
            probe.collaborators(context.clone(), center, FOCUS_RADIUS, FOCUS_PERIOD);

        let mut oracle = Oracle::new(&airports, &traffic);
        let mut manager = TrafficManager::new(context.clone(), airports, traffic, collaborators)?;
        manager.initialize(config.num_agents);
        oracle.observe(&manager);

        Ok(Self {
            config,
            context,
            manager,
            oracle,
            probe,
            tick_count: 0,
        })
    }

    /// Tick length in seconds.
    pub fn dt(&self) -> f64 {
        1.0 / self.config.tick_rate_hz.max(1) as f64
    }

    /// Advances the simulation by one tick and checks invariants. Returns
    /// the number of new violations.
    pub fn tick(&mut self) -> usize {
        let dt = self.dt();

        // Advance virtual time
        self.context.advance_time(Duration::from_secs_f64(dt));

        self.manager.tick(dt);
        self.tick_count += 1;

        self.oracle.check(&self.manager)
    }

    /// Runs for `secs` of simulated time. Returns the number of new
    /// violations.
    pub fn run_for(&mut self, secs: f64) -> usize {
        let ticks = (secs.max(0.0) * self.config.tick_rate_hz as f64).round() as u64;
        let mut violations = 0;
        for _ in 0..ticks {
            violations += self.tick();
        }
        debug!(
            t = self.time(),
            ticks = self.tick_count,
            violations,
            "Ran world"
        );
        violations
    }

    /// Full traffic reset; the oracle takes the fresh pool as its baseline.
    pub fn reset(&mut self) {
        self.manager.reset();
        self.oracle.observe(&self.manager);
    }

    /// Applies an out-of-band change to the pool, then re-baselines the
    /// oracle so the change is not mistaken for a transition.
    pub fn mutate<F>(&mut self, change: F)
    where
        F: FnOnce(&mut TrafficManager<SimContext>),
    {
        change(&mut self.manager);
        self.oracle.observe(&self.manager);
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns the number of aircraft in the pool.
    pub fn agent_count(&self) -> usize {
        self.manager.agents().len()
    }

    pub fn manager(&self) -> &TrafficManager<SimContext> {
        &self.manager
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub fn probe(&self) -> &SimProbe {
        &self.probe
    }
}

/// Mean airport position; the listener orbits it.
fn world_center(airports: &AirportSet) -> Vector3<f64> {
    let count = airports.airports.len().max(1) as f64;
    airports
        .airports
        .iter()
        .fold(Vector3::zeros(), |sum, a| sum + a.position)
        / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use skytraffic_core::FlightState;

    #[test]
    fn test_sim_world_creation() {
        let config = SimConfig {
            seed: 42,
            num_agents: 3,
            ..Default::default()
        };

        let world = SimWorld::new(config).unwrap();

        assert_eq!(world.agent_count(), 3);
        assert_eq!(world.probe().live_models(), 3);
    }

    #[test]
    fn test_sim_world_tick() {
        let config = SimConfig {
            seed: 42,
            tick_rate_hz: 30,
            ..Default::default()
        };

        let mut world = SimWorld::new(config).unwrap();

        assert_eq!(world.tick_count(), 0);
        assert_eq!(world.time(), 0.0);

        world.tick();

        assert_eq!(world.tick_count(), 1);
        assert!((world.time() - 1.0 / 30.0).abs() < 0.0001);
        assert!((world.manager().elapsed().as_secs_f64() - world.time()).abs() < 1e-6);
    }

    #[test]
    fn test_sim_world_determinism() {
        let config = SimConfig {
            seed: 42,
            ..Default::default()
        };

        let mut world1 = SimWorld::new(config.clone()).unwrap();
        let mut world2 = SimWorld::new(config).unwrap();
        world1.run_for(60.0);
        world2.run_for(60.0);

        assert_eq!(world1.manager().metrics(), world2.manager().metrics());
        for (a, b) in world1.manager().agents().iter().zip(world2.manager().agents()) {
            assert_eq!(a.callsign, b.callsign);
            assert_eq!(a.state, b.state);
            assert_eq!(a.position, b.position);
        }
    }

    #[test]
    fn test_two_minutes_without_violations() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        let violations = world.run_for(120.0);

        assert_eq!(violations, 0, "{:?}", world.oracle().first_violation());
        assert!(world.oracle().transitions() > 0);
        assert_eq!(world.probe().stale_handle_uses(), 0);
    }

    #[test]
    fn test_reset_rebuilds_pool() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.run_for(30.0);
        world.reset();

        assert_eq!(world.agent_count(), 12);
        assert_eq!(world.probe().live_models(), 12);
        assert_eq!(world.manager().runways().pending_releases(), 0);
        assert_eq!(world.manager().metrics().resets, 1);
        assert_eq!(world.run_for(10.0), 0);
    }

    #[test]
    fn test_mutate_rebaselines_oracle() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.mutate(|manager| {
            if let Some(agent) = manager.agent_mut(0) {
                agent.state = FlightState::Cruise;
                agent.position.y = 3000.0;
                agent.speed = 230.0;
            }
        });
        assert_eq!(world.tick(), 0);
    }
}
