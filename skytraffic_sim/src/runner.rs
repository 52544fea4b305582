//! Scenario runner - executes traffic stress scenarios.

use crate::error::Result;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use skytraffic_core::{AirportSet, FlightState, TrafficConfig, TrafficMetrics};
use skytraffic_env::TrafficContext;
use tracing::{debug, info, warn};

/// Seed extension for scenario-level randomness (reset timing, placement).
const SCENARIO_STREAM: u64 = 0x5343_454e; // "SCEN"

/// Mean and spread of the gap between resets in the reset storm (s).
const RESET_GAP_MEAN: f64 = 6.0;
const RESET_GAP_STD: f64 = 2.0;

/// Model builds made to fail on every third reset of the storm.
const INJECTED_MODEL_FAILURES: u32 = 2;

/// Name given to hold-short and gate nodes that no taxi network contains.
const MISSING_NODE: &str = "MISSING";

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Pool size at the end
    pub final_agent_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Engine counters at the end of the run
    pub traffic: TrafficMetrics,

    /// Invariant violations seen by the oracle
    pub violations: u64,

    /// State changes seen by the oracle
    pub transitions: u64,

    /// Touchdowns seen by the oracle
    pub landings: u64,

    /// Most runways flagged at once
    pub peak_runways_in_use: usize,

    /// Most engine loops audible at once
    pub peak_audible: usize,

    /// Callouts the announcer received
    pub callouts_heard: usize,
}

/// What a scenario does on top of plain ticking.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Plan {
    Steady,
    ResetStorm,
}

/// Runs traffic scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Aircraft in the pool
    num_agents: usize,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Airport set to start from (built-in world if unset)
    airports: Option<AirportSet>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self {
            seed,
            num_agents,
            tick_rate_hz: 30,
            max_duration_secs: 120.0,
            airports: None,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Replaces the built-in world.
    pub fn with_airports(mut self, airports: AirportSet) -> Self {
        self.airports = Some(airports);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
    }

    /// Runs a scenario, sampling a frame every `frame_interval` ticks.
    pub fn run_recorded(
        &self,
        scenario: ScenarioId,
        frame_interval: u64,
    ) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some((&mut export, frame_interval.max(1))));
        export.finalize(result.passed, result.metrics.traffic.clone());
        (result, export)
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        export: Option<(&mut SimExport, u64)>,
    ) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        match self.build(scenario) {
            Ok((world, plan)) => self.drive(scenario, world, plan, export),
            Err(e) => {
                warn!("Scenario {} could not start: {}", scenario.name(), e);
                ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    total_ticks: 0,
                    final_time_secs: 0.0,
                    final_agent_count: 0,
                    failure_reason: Some(e.to_string()),
                    metrics: ScenarioMetrics::default(),
                }
            }
        }
    }

    // =========================================================================
    // SETUP
    // =========================================================================

    fn base_world(&self) -> AirportSet {
        self.airports
            .clone()
            .unwrap_or_else(AirportSet::default_world)
    }

    fn config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            num_agents: self.num_agents,
            tick_rate_hz: self.tick_rate_hz,
            max_duration_secs: self.max_duration_secs,
        }
    }

    fn build(&self, scenario: ScenarioId) -> Result<(SimWorld, Plan)> {
        let config = self.config();

        match scenario {
            ScenarioId::BusySkies => {
                let world =
                    SimWorld::with_world(config, self.base_world(), TrafficConfig::default())?;
                Ok((world, Plan::Steady))
            }
            ScenarioId::SingleRunway => {
                let traffic = TrafficConfig {
                    airborne_fraction: 0.0,
                    initial_stagger: 0.0,
                    parked_wait_min: 1.0,
                    parked_wait_max: 3.0,
                    ..TrafficConfig::default()
                };
                let world = SimWorld::with_world(config, single_runway(self.base_world()), traffic)?;
                Ok((world, Plan::Steady))
            }
            ScenarioId::BrokenTaxiways => {
                let traffic = TrafficConfig {
                    airborne_fraction: 0.0,
                    initial_stagger: 0.5,
                    parked_wait_min: 1.0,
                    parked_wait_max: 5.0,
                    ..TrafficConfig::default()
                };
                let world = SimWorld::with_world(config, broken_taxiways(self.base_world()), traffic)?;
                Ok((world, Plan::Steady))
            }
            ScenarioId::ResetStorm => {
                let world =
                    SimWorld::with_world(config, self.base_world(), TrafficConfig::default())?;
                Ok((world, Plan::ResetStorm))
            }
            ScenarioId::RushHour => {
                let mut world =
                    SimWorld::with_world(config, self.base_world(), TrafficConfig::default())?;
                converge_on(&mut world, 0);
                Ok((world, Plan::Steady))
            }
        }
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    fn drive(
        &self,
        scenario: ScenarioId,
        mut world: SimWorld,
        plan: Plan,
        mut export: Option<(&mut SimExport, u64)>,
    ) -> ScenarioResult {
        let mut rng = ChaCha8Rng::seed_from_u64(world.context.derive_seed(SCENARIO_STREAM));
        let gaps = Normal::new(RESET_GAP_MEAN, RESET_GAP_STD).ok();
        let mut next_reset = next_gap(&gaps, &mut rng);
        let mut resets = 0u32;
        let mut expected_live = self.num_agents;

        let mut metrics = ScenarioMetrics::default();
        let mut failure: Option<String> = None;
        let target_ticks = (self.max_duration_secs.max(0.0) * self.tick_rate_hz as f64) as u64;

        for tick in 0..target_ticks {
            let mut events = Vec::new();

            if plan == Plan::ResetStorm && world.time() >= next_reset {
                resets += 1;
                let injected = if resets % 3 == 0 { INJECTED_MODEL_FAILURES } else { 0 };
                world.probe().fail_model_builds(injected);
                world.reset();
                expected_live = self.num_agents.saturating_sub(injected as usize);
                next_reset = world.time() + next_gap(&gaps, &mut rng);
                events.push(SimEvent::info(format!("reset #{resets}")));

                if failure.is_none() {
                    failure = check_after_reset(&world, expected_live);
                }
            }

            let found = world.tick();
            if found > 0 {
                let recorded = world.oracle().violations();
                if let Some(last) = recorded.last() {
                    events.push(SimEvent::warn(last.to_string()));
                }
            }

            let manager = world.manager();
            metrics.peak_runways_in_use = metrics
                .peak_runways_in_use
                .max(manager.runways().occupied_runways().count());
            metrics.peak_audible = metrics.peak_audible.max(world.probe().audible());

            if let Some((export, interval)) = export.as_mut() {
                if tick % *interval == 0 || !events.is_empty() {
                    export.add_frame(SimFrame::capture(&world, events));
                }
            }

            if tick % (self.tick_rate_hz as u64 * 10).max(1) == 0 {
                debug!(
                    "  t={:.1}s | parked={} | airborne={} | runways={}",
                    world.time(),
                    manager.count_in(FlightState::Parked),
                    manager.agents().iter().filter(|a| a.state.is_airborne()).count(),
                    manager.runways().occupied_runways().count(),
                );
            }
        }

        if plan == Plan::ResetStorm && failure.is_none() && world.probe().live_models() != expected_live
        {
            failure = Some(format!(
                "{} live models for a pool of {}",
                world.probe().live_models(),
                expected_live
            ));
        }

        let oracle = world.oracle();
        metrics.traffic = world.manager().metrics().clone();
        metrics.violations = oracle.violation_count();
        metrics.transitions = oracle.transitions();
        metrics.landings = oracle.visits(FlightState::Landing);
        metrics.callouts_heard = world.probe().callouts().len();

        if world.probe().stale_handle_uses() > 0 && failure.is_none() {
            failure = Some(format!(
                "{} uses of disposed model handles",
                world.probe().stale_handle_uses()
            ));
        }
        if let Some(violation) = oracle.first_violation() {
            failure = Some(format!(
                "{} violation(s), first: {}",
                oracle.violation_count(),
                violation
            ));
        }

        let passed = failure.is_none();
        if passed {
            info!("Scenario {} passed: {}", scenario.name(), metrics.traffic);
        } else {
            warn!(
                "Scenario {} failed: {}",
                scenario.name(),
                failure.as_deref().unwrap_or("unknown")
            );
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            final_agent_count: world.agent_count(),
            failure_reason: failure,
            metrics,
        }
    }
}

fn next_gap(gaps: &Option<Normal<f64>>, rng: &mut ChaCha8Rng) -> f64 {
    gaps.as_ref()
        .map_or(RESET_GAP_MEAN, |normal| normal.sample(rng))
        .clamp(1.0, 4.0 * RESET_GAP_MEAN)
}

/// A reset must leave exactly the new pool's models and no timers.
fn check_after_reset(world: &SimWorld, expected_live: usize) -> Option<String> {
    let live = world.probe().live_models();
    let pending = world.manager().runways().pending_releases();
    let flagged = world.manager().runways().occupied_runways().count();

    if live != expected_live {
        Some(format!("{live} live models after reset, expected {expected_live}"))
    } else if pending > 0 || flagged > 0 {
        Some(format!("{pending} pending releases and {flagged} flags survived reset"))
    } else {
        None
    }
}

// =============================================================================
// WORLD SURGERY
// =============================================================================

/// Keeps only each airport's first runway.
pub fn single_runway(mut airports: AirportSet) -> AirportSet {
    for airport in &mut airports.airports {
        airport.runways.truncate(1);
        if let Some(kept) = airport.runways.first().map(|r| r.id.clone()) {
            airport.hold_short.retain(|runway, _| *runway == kept);
        }
    }
    airports
}

/// Points every hold-short node but the last airport's at a node no
/// network contains, and does the same to the last airport's first gate.
pub fn broken_taxiways(mut airports: AirportSet) -> AirportSet {
    let Some((last, rest)) = airports.airports.split_last_mut() else {
        return airports;
    };
    for airport in rest {
        for nodes in airport.hold_short.values_mut() {
            *nodes = vec![MISSING_NODE.to_string()];
        }
    }
    if let Some(gate) = last.gates.first_mut() {
        *gate = MISSING_NODE.to_string();
    }
    airports
}

/// Puts the whole pool in cruise inside descent range of `destination`,
/// outside approach range, on random bearings.
fn converge_on(world: &mut SimWorld, destination: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(world.context.derive_seed(SCENARIO_STREAM + 1));

    world.mutate(|manager| {
        let config = manager.config().clone();
        let airports: Vec<Vector3<f64>> =
            manager.airports().airports.iter().map(|a| a.position).collect();
        let Some(&target) = airports.get(destination) else {
            return;
        };
        let others: Vec<usize> = (0..airports.len()).filter(|&i| i != destination).collect();
        if others.is_empty() {
            return;
        }

        let near = config.approach_distance + 2_000.0;
        let far = (config.descent_distance - 1_000.0).max(near + 1.0);

        for index in 0..manager.agents().len() {
            let Some(agent) = manager.agent_mut(index) else {
                continue;
            };
            let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
            let distance = rng.gen_range(near..far);
            let offset = Vector3::new(bearing.sin(), 0.0, bearing.cos()) * distance;

            agent.clear_leg();
            agent.gate = None;
            agent.origin = others[rng.gen_range(0..others.len())];
            agent.destination = destination;
            agent.position = target + offset;
            agent.position.y = config.cruise_altitude_min;
            agent.cruise_altitude = config.cruise_altitude_min;
            agent.heading = (-offset.x).atan2(-offset.z);
            agent.speed = config.cruise_speed;
            agent.wait_timer = 0.0;
            agent.state = FlightState::Cruise;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_busy_skies_scenario() {
        let runner = ScenarioRunner::new(42, 12).with_duration(120.0);

        let result = runner.run(ScenarioId::BusySkies);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.transitions > 0);
        assert_eq!(result.final_agent_count, 12);
    }

    #[test]
    fn test_single_runway_contention() {
        let runner = ScenarioRunner::new(7, 10)
            .with_tick_rate(10)
            .with_duration(400.0);

        let result = runner.run(ScenarioId::SingleRunway);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.traffic.departures > 0);
        assert!(result.metrics.traffic.runway_waits > 0);
    }

    #[test]
    fn test_broken_taxiways_recover() {
        let runner = ScenarioRunner::new(11, 10)
            .with_tick_rate(10)
            .with_duration(90.0);

        let result = runner.run(ScenarioId::BrokenTaxiways);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.traffic.path_failures > 0);
        assert!(result.metrics.traffic.forced_placements > 0);
    }

    #[test]
    fn test_reset_storm_leaks_nothing() {
        let runner = ScenarioRunner::new(3, 8).with_duration(60.0);

        let result = runner.run(ScenarioId::ResetStorm);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.traffic.resets >= 3);
        assert!(result.metrics.traffic.model_failures >= INJECTED_MODEL_FAILURES as u64);
    }

    #[test]
    fn test_rush_hour_lands_traffic() {
        let runner = ScenarioRunner::new(5, 8)
            .with_tick_rate(10)
            .with_duration(400.0);

        let result = runner.run(ScenarioId::RushHour);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.landings > 0);
        assert!(result.metrics.traffic.arrivals > 0);
    }

    #[test]
    fn test_same_seed_same_result() {
        let runner1 = ScenarioRunner::new(42, 8).with_duration(45.0);
        let runner2 = ScenarioRunner::new(42, 8).with_duration(45.0);

        let result1 = runner1.run(ScenarioId::BusySkies);
        let result2 = runner2.run(ScenarioId::BusySkies);

        assert_eq!(result1.metrics.traffic, result2.metrics.traffic);
        assert_eq!(result1.metrics.transitions, result2.metrics.transitions);
    }

    #[test]
    fn test_recorded_run_samples_frames() {
        let runner = ScenarioRunner::new(42, 4).with_duration(10.0);

        let (result, export) = runner.run_recorded(ScenarioId::BusySkies, 30);

        assert!(result.passed);
        assert_eq!(export.frames.len(), 10);
        assert_eq!(export.passed, result.passed);
        assert!(export.metrics.is_some());
    }

    #[test]
    fn test_world_surgery() {
        let single = single_runway(AirportSet::default_world());
        assert!(single.airports.iter().all(|a| a.runways.len() == 1));
        assert!(single.airports.iter().all(|a| a.hold_short.len() == 1));

        let broken = broken_taxiways(AirportSet::default_world());
        assert!(broken.airports[0]
            .hold_short
            .values()
            .all(|nodes| nodes == &vec![MISSING_NODE.to_string()]));
        assert_eq!(broken.airports[2].gates[0], MISSING_NODE);
    }

    #[test]
    fn test_invalid_world_fails_cleanly() {
        let mut airports = AirportSet::default_world();
        airports.airports.truncate(1);
        let result = ScenarioRunner::new(1, 4)
            .with_airports(airports)
            .run(ScenarioId::BusySkies);

        assert!(!result.passed);
        assert_eq!(result.total_ticks, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_any_seed_keeps_invariants(seed in any::<u64>()) {
            let result = ScenarioRunner::new(seed, 10)
                .with_tick_rate(10)
                .with_duration(90.0)
                .run(ScenarioId::BusySkies);
            prop_assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
        }

        #[test]
        fn prop_single_runway_never_double_books(seed in any::<u64>()) {
            let result = ScenarioRunner::new(seed, 8)
                .with_tick_rate(10)
                .with_duration(120.0)
                .run(ScenarioId::SingleRunway);
            prop_assert_eq!(result.metrics.violations, 0);
        }
    }
}
