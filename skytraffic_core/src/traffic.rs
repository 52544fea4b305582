//! The traffic lifecycle manager.
//!
//! [`TrafficManager`] owns every piece of mutable traffic state: the agent
//! pool, the taxi-graph caches, the runway arbiter and its timers, the RNG
//! and the collaborators. The host drives it through three calls:
//!
//! - [`TrafficManager::initialize`] builds a fixed-size pool,
//! - [`TrafficManager::tick`] advances every agent by one step,
//! - [`TrafficManager::reset`] tears everything down and rebuilds the pool.
//!
//! Agents are processed in pool order; each one sees the others only
//! through a read-only view, and the runway arbiter is the only state they
//! share.

use crate::agent::{Agent, FlightState};
use crate::airport::AirportSet;
use crate::audio::engine_sound;
use crate::callout::{CalloutScheduler, AIRLINES};
use crate::config::TrafficConfig;
use crate::error::Result;
use crate::flight::{self, FlightContext};
use crate::metrics::TrafficMetrics;
use crate::runway::{OtherAgents, RunwayArbiter};
use crate::taxi::TaxiGraphs;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skytraffic_env::{AgentId, AgentSnapshot, Collaborators, SizeClass, TrafficContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Seed extension for the traffic RNG stream.
const TRAFFIC_STREAM: u64 = 0x5354_5246; // "STRF"

/// Most integration steps a single `tick` will run.
const MAX_SUBSTEPS: usize = 100;

/// Owns and drives a pool of traffic agents.
pub struct TrafficManager<C: TrafficContext> {
    ctx: Arc<C>,
    config: TrafficConfig,
    airports: AirportSet,
    graphs: TaxiGraphs,
    runways: RunwayArbiter,
    agents: Vec<Agent>,
    collaborators: Collaborators,
    callouts: CalloutScheduler,
    rng: ChaCha8Rng,
    metrics: TrafficMetrics,
    elapsed: Duration,
    pool_size: usize,
}

impl<C: TrafficContext> TrafficManager<C> {
    /// Creates an empty manager. Fails only on an invalid airport set.
    pub fn new(
        ctx: Arc<C>,
        airports: AirportSet,
        config: TrafficConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        airports.validate()?;

        let rng = ChaCha8Rng::seed_from_u64(ctx.derive_seed(TRAFFIC_STREAM));
        let graphs = TaxiGraphs::new(airports.networks.clone());

        Ok(Self {
            ctx,
            config,
            airports,
            graphs,
            runways: RunwayArbiter::new(),
            agents: Vec::new(),
            collaborators,
            callouts: CalloutScheduler::new(),
            rng,
            metrics: TrafficMetrics::new(),
            elapsed: Duration::ZERO,
            pool_size: 0,
        })
    }

    /// Builds a pool of `count` agents.
    ///
    /// A share of the pool (`airborne_fraction`) starts in cruise somewhere
    /// along its route; the rest wait at gates with staggered timers so
    /// departures do not bunch up.
    pub fn initialize(&mut self, count: usize) {
        if !self.agents.is_empty() {
            self.dispose_agents();
        }
        self.pool_size = count;
        let airborne_fraction = self.config.airborne_fraction.clamp(0.0, 1.0);
        let mut airborne = 0usize;

        for index in 0..count {
            let mut agent = self.new_agent();

            let mut fctx = FlightContext {
                config: &self.config,
                airports: &self.airports.airports,
                graphs: &mut self.graphs,
                runways: &mut self.runways,
                others: OtherAgents::none(),
                terrain: &*self.collaborators.terrain,
                rng: &mut self.rng,
                metrics: &mut self.metrics,
                now: self.elapsed,
            };

            if fctx.rng.gen_bool(airborne_fraction) {
                if flight::spawn_airborne(&mut agent, &mut fctx) {
                    airborne += 1;
                }
            } else if flight::spawn_at_gate(&mut agent, &mut fctx) {
                let jitter = fctx.rng.gen_range(0.0..1.0) * self.config.initial_stagger;
                agent.wait_timer = index as f64 * self.config.initial_stagger + jitter;
            }

            self.agents.push(agent);
        }

        info!(
            count,
            airborne,
            seed = self.ctx.seed(),
            "Traffic pool initialized"
        );
    }

    /// Advances every agent by `dt` seconds, then pushes snapshots to the
    /// collaborators. A `dt` larger than `max_tick_dt` is integrated in
    /// equal sub-steps no longer than `max_tick_dt`, at most
    /// `MAX_SUBSTEPS` of them.
    pub fn tick(&mut self, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        let limit = self.config.max_tick_dt;
        let steps = if limit > 0.0 {
            ((dt / limit).ceil() as usize).clamp(1, MAX_SUBSTEPS)
        } else {
            1
        };
        let step_dt = if limit > 0.0 { (dt / steps as f64).min(limit) } else { dt };
        if steps as f64 * step_dt < dt {
            debug!(dt, steps, "Tick longer than the sub-step budget, dropping the rest");
        }

        for _ in 0..steps {
            self.step_agents(step_dt);
        }

        self.publish();
    }

    /// One integration step: advance time, fire due releases, dispatch
    /// every agent in pool order.
    fn step_agents(&mut self, dt: f64) {
        self.elapsed += Duration::from_secs_f64(dt);

        let released = self.runways.advance(self.elapsed);
        if !released.is_empty() {
            trace!(count = released.len(), "Delayed runway releases fired");
            self.metrics.releases_fired += released.len() as u64;
        }

        for index in 0..self.agents.len() {
            let (before, rest) = self.agents.split_at_mut(index);
            let Some((agent, after)) = rest.split_first_mut() else {
                break;
            };

            let mut fctx = FlightContext {
                config: &self.config,
                airports: &self.airports.airports,
                graphs: &mut self.graphs,
                runways: &mut self.runways,
                others: OtherAgents {
                    before: &*before,
                    after: &*after,
                },
                terrain: &*self.collaborators.terrain,
                rng: &mut self.rng,
                metrics: &mut self.metrics,
                now: self.elapsed,
            };
            flight::step(agent, &mut fctx, dt);
        }
    }

    /// Cancels every timer, disposes every model, drops graph caches and
    /// occupancy, then rebuilds a pool of the same size.
    pub fn reset(&mut self) {
        let cancelled = self.runways.cancel_all();
        self.dispose_agents();
        self.graphs.clear_caches();
        self.runways.clear();
        self.callouts.clear();
        self.metrics.resets += 1;

        info!(cancelled, pool = self.pool_size, "Traffic reset");
        self.initialize(self.pool_size);
    }

    /// Ends agent `index`'s leg and re-spawns it at a gate.
    pub fn recycle(&mut self, index: usize) -> bool {
        let Some(agent) = self.agents.get_mut(index) else {
            return false;
        };

        let mut fctx = FlightContext {
            config: &self.config,
            airports: &self.airports.airports,
            graphs: &mut self.graphs,
            runways: &mut self.runways,
            others: OtherAgents::none(),
            terrain: &*self.collaborators.terrain,
            rng: &mut self.rng,
            metrics: &mut self.metrics,
            now: self.elapsed,
        };
        flight::recycle(agent, &mut fctx)
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, index: usize) -> Option<&Agent> {
        self.agents.get(index)
    }

    /// Direct access for harnesses that stage specific situations.
    pub fn agent_mut(&mut self, index: usize) -> Option<&mut Agent> {
        self.agents.get_mut(index)
    }

    pub fn runways(&self) -> &RunwayArbiter {
        &self.runways
    }

    pub fn runways_mut(&mut self) -> &mut RunwayArbiter {
        &mut self.runways
    }

    pub fn graphs(&self) -> &TaxiGraphs {
        &self.graphs
    }

    pub fn graphs_mut(&mut self) -> &mut TaxiGraphs {
        &mut self.graphs
    }

    pub fn airports(&self) -> &AirportSet {
        &self.airports
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    pub fn metrics(&self) -> &TrafficMetrics {
        &self.metrics
    }

    /// Simulation time accumulated from ticks.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn context(&self) -> &Arc<C> {
        &self.ctx
    }

    pub fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collaborators
    }

    /// Value copies of every agent.
    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().map(Agent::snapshot).collect()
    }

    /// Number of agents in `state`.
    pub fn count_in(&self, state: FlightState) -> usize {
        self.agents.iter().filter(|a| a.state == state).count()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn new_agent(&mut self) -> Agent {
        let id = AgentId::from_seed(self.rng.gen());
        let (code, _) = AIRLINES[self.rng.gen_range(0..AIRLINES.len())];
        let callsign = format!("{}{}", code, self.rng.gen_range(100..1000));
        let size_class = SizeClass::ALL[self.rng.gen_range(0..SizeClass::ALL.len())];

        let mut agent = Agent::new(id, callsign, size_class);
        match self.collaborators.models.build_model(size_class) {
            Ok(handle) => agent.model = Some(handle),
            Err(e) => {
                // Traffic keeps flying without a visual
                self.metrics.model_failures += 1;
                warn!(agent = %agent.callsign, "Model build failed: {}", e);
            }
        }
        agent
    }

    fn dispose_agents(&mut self) {
        for agent in self.agents.drain(..) {
            if let Some(handle) = agent.model {
                self.collaborators.models.dispose_model(handle);
            }
            self.collaborators.audio.stop(agent.id);
        }
    }

    fn publish(&mut self) {
        let focus = self.collaborators.focus.current_focus();
        let snapshots = self.snapshots();

        for (agent, snapshot) in self.agents.iter().zip(&snapshots) {
            if let Some(handle) = agent.model {
                self.collaborators.models.sync(handle, snapshot);
            }
            let sound = engine_sound(snapshot, &focus, &self.config);
            if let Err(e) = self.collaborators.audio.update(snapshot.id, sound) {
                debug!(agent = %snapshot.callsign, "Engine audio update failed: {}", e);
            }
        }

        let now = self.elapsed.as_secs_f64();
        if let Some(callout) = self.callouts.poll(&snapshots, &focus, now, &self.config) {
            self.metrics.callouts += 1;
            debug!(text = %callout.text, "Traffic callout");
            self.collaborators.announcer.announce(&callout);
        }
    }
}
