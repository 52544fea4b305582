//! Invariant oracle for simulation.
//!
//! The Oracle watches the traffic pool after every tick and checks what
//! must hold no matter the seed:
//! - Runway mutual exclusion (one roller or lander per runway, and only on
//!   a flagged runway)
//! - Legal state transitions
//! - Route validity (known nodes, adjacent hops, index in range)
//! - No occupancy leak (a flag without an occupant clears within the
//!   release delay plus a grace period)
//! - Bounded route-failure retries

use skytraffic_core::{
    Agent, AirportSet, FlightState, RunwayRef, TaxiGraphs, TrafficConfig, TrafficManager,
};
use skytraffic_env::TrafficContext;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Slack on top of the release delay before an unattended flag is a leak.
const LEAK_GRACE: Duration = Duration::from_secs(2);

/// Violations kept verbatim; later ones are only counted.
const MAX_RECORDED: usize = 64;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("t={time:.2}s runway {runway} held by {holders:?}")]
    RunwayConflict {
        time: f64,
        runway: String,
        holders: Vec<String>,
    },

    #[error("t={time:.2}s {agent} in {state} on runway {runway} which is not flagged")]
    UnflaggedOccupant {
        time: f64,
        agent: String,
        state: FlightState,
        runway: String,
    },

    #[error("t={time:.2}s {agent} went {from} -> {to}")]
    IllegalTransition {
        time: f64,
        agent: String,
        from: FlightState,
        to: FlightState,
    },

    #[error("t={time:.2}s {agent} has an invalid route: {reason}")]
    InvalidRoute {
        time: f64,
        agent: String,
        reason: String,
    },

    #[error("t={time:.2}s runway {runway} flagged with no occupant for {held:.1}s")]
    OccupancyLeak { time: f64, runway: String, held: f64 },

    #[error("t={time:.2}s {agent} reached {failures} consecutive route failures")]
    RecoveryBound {
        time: f64,
        agent: String,
        failures: u8,
    },

    #[error("t={time:.2}s {agent} has a non-finite pose")]
    NonFinite { time: f64, agent: String },
}

/// Per-tick invariant checker.
pub struct Oracle {
    /// Network id per airport index
    networks: Vec<String>,

    /// Independent copy of the taxi graphs
    graphs: TaxiGraphs,

    max_failures: u8,
    leak_bound: Duration,

    previous: Vec<FlightState>,
    resets_seen: u64,

    /// Flagged runways with no occupant, and since when
    unattended: HashMap<RunwayRef, Duration>,

    violations: Vec<Violation>,
    violation_count: u64,
    transitions: u64,
    visits: HashMap<FlightState, u64>,
    checks: u64,
}

impl Oracle {
    pub fn new(airports: &AirportSet, config: &TrafficConfig) -> Self {
        let release_delay = Duration::try_from_secs_f64(config.release_delay.max(0.0))
            .unwrap_or(Duration::ZERO);

        Self {
            networks: airports.airports.iter().map(|a| a.network.clone()).collect(),
            graphs: TaxiGraphs::new(airports.networks.clone()),
            max_failures: config.max_path_failures,
            leak_bound: release_delay + LEAK_GRACE,
            previous: Vec::new(),
            resets_seen: 0,
            unattended: HashMap::new(),
            violations: Vec::new(),
            violation_count: 0,
            transitions: 0,
            visits: HashMap::new(),
            checks: 0,
        }
    }

    /// Takes the current pool as the new baseline. Call after anything
    /// other than `tick` rewrites agent state.
    pub fn observe<C: TrafficContext>(&mut self, manager: &TrafficManager<C>) {
        self.previous = manager.agents().iter().map(|a| a.state).collect();
        self.resets_seen = manager.metrics().resets;
        self.unattended.clear();
    }

    /// Checks every invariant against the pool. Returns the number of new
    /// violations.
    pub fn check<C: TrafficContext>(&mut self, manager: &TrafficManager<C>) -> usize {
        if manager.metrics().resets != self.resets_seen
            || manager.agents().len() != self.previous.len()
        {
            self.observe(manager);
        }

        self.checks += 1;
        let now = manager.elapsed();
        let time = now.as_secs_f64();
        let mut found = Vec::new();

        for (index, agent) in manager.agents().iter().enumerate() {
            let callsign = || agent.callsign.clone();

            if !pose_is_finite(agent) {
                found.push(Violation::NonFinite {
                    time,
                    agent: callsign(),
                });
            }

            let from = self.previous[index];
            if from != agent.state {
                self.transitions += 1;
                *self.visits.entry(agent.state).or_insert(0) += 1;
                if !from.can_transition_to(agent.state) {
                    found.push(Violation::IllegalTransition {
                        time,
                        agent: callsign(),
                        from,
                        to: agent.state,
                    });
                }
                self.previous[index] = agent.state;
            }

            if agent.failures >= self.max_failures {
                found.push(Violation::RecoveryBound {
                    time,
                    agent: callsign(),
                    failures: agent.failures,
                });
            }

            if let Some(reason) = self.route_problem(agent) {
                found.push(Violation::InvalidRoute {
                    time,
                    agent: callsign(),
                    reason,
                });
            }
        }

        self.check_runways(manager, now, &mut found);

        let count = found.len();
        for violation in found {
            warn!(%violation, "Invariant violated");
            self.violation_count += 1;
            if self.violations.len() < MAX_RECORDED {
                self.violations.push(violation);
            }
        }
        count
    }

    fn check_runways<C: TrafficContext>(
        &mut self,
        manager: &TrafficManager<C>,
        now: Duration,
        found: &mut Vec<Violation>,
    ) {
        let time = now.as_secs_f64();
        let arbiter = manager.runways();
        let mut holders: HashMap<&RunwayRef, Vec<&Agent>> = HashMap::new();

        for agent in manager.agents().iter().filter(|a| a.state.occupies_runway()) {
            match &agent.runway {
                Some(runway) => holders.entry(runway).or_default().push(agent),
                None => found.push(Violation::UnflaggedOccupant {
                    time,
                    agent: agent.callsign.clone(),
                    state: agent.state,
                    runway: "none".to_string(),
                }),
            }
        }

        for (runway, agents) in &holders {
            if agents.len() > 1 {
                found.push(Violation::RunwayConflict {
                    time,
                    runway: runway.to_string(),
                    holders: agents.iter().map(|a| a.callsign.clone()).collect(),
                });
            }
            if !arbiter.is_occupied(runway) {
                for agent in agents {
                    found.push(Violation::UnflaggedOccupant {
                        time,
                        agent: agent.callsign.clone(),
                        state: agent.state,
                        runway: runway.to_string(),
                    });
                }
            }
        }

        let flagged: Vec<RunwayRef> = arbiter.occupied_runways().cloned().collect();
        self.unattended.retain(|runway, _| flagged.contains(runway));

        for runway in flagged {
            if holders.contains_key(&runway) {
                self.unattended.remove(&runway);
                continue;
            }
            let since = *self.unattended.entry(runway.clone()).or_insert(now);
            let held = now.saturating_sub(since);
            if held > self.leak_bound {
                found.push(Violation::OccupancyLeak {
                    time,
                    runway: runway.to_string(),
                    held: held.as_secs_f64(),
                });
                // Report each leak once per bound
                self.unattended.insert(runway, now);
            }
        }
    }

    fn route_problem(&mut self, agent: &Agent) -> Option<String> {
        let route = agent.route.as_ref()?;
        if route.len() < 2 {
            return Some(format!("{} node(s)", route.len()));
        }
        if agent.route_idx >= route.len() {
            return Some(format!("index {} past {} nodes", agent.route_idx, route.len()));
        }

        let network = self.networks.get(agent.route_airport())?;
        let adjacency = match self.graphs.adjacency(network) {
            Ok(adjacency) => adjacency,
            Err(e) => return Some(e.to_string()),
        };
        if let Some(missing) = route.iter().find(|node| !adjacency.contains(node)) {
            return Some(format!("{missing} not in {network}"));
        }
        route
            .windows(2)
            .find(|hop| !adjacency.is_edge(&hop[0], &hop[1]))
            .map(|hop| format!("{} -> {} is not an edge", hop[0], hop[1]))
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn violation_count(&self) -> u64 {
        self.violation_count
    }

    pub fn is_clean(&self) -> bool {
        self.violation_count == 0
    }

    /// The first recorded violation, if any.
    pub fn first_violation(&self) -> Option<&Violation> {
        self.violations.first()
    }

    /// State changes seen since creation.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Times any agent entered `state`.
    pub fn visits(&self, state: FlightState) -> u64 {
        self.visits.get(&state).copied().unwrap_or(0)
    }

    pub fn checks(&self) -> u64 {
        self.checks
    }
}

fn pose_is_finite(agent: &Agent) -> bool {
    agent.position.iter().all(|v| v.is_finite())
        && agent.speed.is_finite()
        && agent.heading.is_finite()
        && agent.pitch.is_finite()
        && agent.roll.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use skytraffic_env::Collaborators;

    fn pool(count: usize) -> (TrafficManager<SimContext>, Oracle) {
        let airports = AirportSet::default_world();
        let config = TrafficConfig::default();
        let oracle = Oracle::new(&airports, &config);
        let mut manager =
            TrafficManager::new(SimContext::shared(42), airports, config, Collaborators::default())
                .unwrap();
        manager.initialize(count);
        (manager, oracle)
    }

    fn park(manager: &mut TrafficManager<SimContext>, index: usize) {
        let agent = manager.agent_mut(index).unwrap();
        agent.clear_leg();
        agent.state = FlightState::Parked;
        agent.origin = 0;
        agent.destination = 1;
        agent.wait_timer = 1_000.0;
    }

    #[test]
    fn test_fresh_pool_is_clean() {
        let (manager, mut oracle) = pool(8);
        oracle.observe(&manager);
        assert_eq!(oracle.check(&manager), 0);
        assert!(oracle.is_clean());
    }

    #[test]
    fn test_two_rollers_on_one_runway() {
        let (mut manager, mut oracle) = pool(2);
        let runway = RunwayRef::new(0, "09");
        for index in 0..2 {
            park(&mut manager, index);
        }
        oracle.observe(&manager);

        manager.runways_mut().acquire(&runway);
        for index in 0..2 {
            let agent = manager.agent_mut(index).unwrap();
            agent.state = FlightState::Holding;
        }
        oracle.check(&manager);
        for index in 0..2 {
            let agent = manager.agent_mut(index).unwrap();
            agent.state = FlightState::TakeoffRoll;
            agent.runway = Some(runway.clone());
        }

        assert!(oracle.check(&manager) > 0);
        assert!(oracle
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::RunwayConflict { holders, .. } if holders.len() == 2)));
    }

    #[test]
    fn test_unflagged_lander() {
        let (mut manager, mut oracle) = pool(1);
        park(&mut manager, 0);
        let agent = manager.agent_mut(0).unwrap();
        agent.state = FlightState::Landing;
        agent.runway = Some(RunwayRef::new(1, "09"));
        oracle.observe(&manager);

        assert_eq!(oracle.check(&manager), 1);
        assert!(matches!(
            oracle.first_violation(),
            Some(Violation::UnflaggedOccupant { .. })
        ));
    }

    #[test]
    fn test_illegal_transition() {
        let (mut manager, mut oracle) = pool(1);
        park(&mut manager, 0);
        oracle.observe(&manager);

        manager.agent_mut(0).unwrap().state = FlightState::Cruise;
        assert_eq!(oracle.check(&manager), 1);
        assert!(matches!(
            oracle.first_violation(),
            Some(Violation::IllegalTransition {
                from: FlightState::Parked,
                to: FlightState::Cruise,
                ..
            })
        ));
        assert_eq!(oracle.visits(FlightState::Cruise), 1);
    }

    #[test]
    fn test_route_must_follow_edges() {
        let (mut manager, mut oracle) = pool(1);
        park(&mut manager, 0);
        let agent = manager.agent_mut(0).unwrap();
        agent.state = FlightState::TaxiOut;
        agent.set_route(vec!["G1".into(), "T1".into(), "T2".into()]);
        oracle.observe(&manager);
        assert_eq!(oracle.check(&manager), 0);

        // G1 and T3 are not joined by a taxiway
        manager
            .agent_mut(0)
            .unwrap()
            .set_route(vec!["G1".into(), "T3".into()]);
        assert_eq!(oracle.check(&manager), 1);

        manager
            .agent_mut(0)
            .unwrap()
            .set_route(vec!["G1".into(), "NOWHERE".into()]);
        assert_eq!(oracle.check(&manager), 1);
        assert_eq!(oracle.violation_count(), 2);
    }

    #[test]
    fn test_recovery_bound() {
        let (mut manager, mut oracle) = pool(1);
        park(&mut manager, 0);
        oracle.observe(&manager);

        manager.agent_mut(0).unwrap().failures = 3;
        assert_eq!(oracle.check(&manager), 1);
    }

    #[test]
    fn test_orphaned_flag_is_a_leak() {
        let (mut manager, mut oracle) = pool(0);
        manager.runways_mut().acquire(&RunwayRef::new(2, "36"));
        oracle.observe(&manager);

        // 8 s release delay + 2 s grace at 0.1 s per tick
        let mut leaks = 0;
        for _ in 0..120 {
            manager.tick(0.1);
            leaks += oracle.check(&manager);
        }
        assert_eq!(leaks, 1);
        assert!(matches!(
            oracle.first_violation(),
            Some(Violation::OccupancyLeak { .. })
        ));
    }

    #[test]
    fn test_pending_release_is_not_a_leak() {
        let (mut manager, mut oracle) = pool(0);
        let runway = RunwayRef::new(0, "18");
        manager.runways_mut().acquire(&runway);
        let now = manager.elapsed();
        manager
            .runways_mut()
            .schedule_delayed_release(&runway, Duration::from_secs(8), now);
        oracle.observe(&manager);

        for _ in 0..150 {
            manager.tick(0.1);
            oracle.check(&manager);
        }
        assert!(oracle.is_clean());
        assert!(!manager.runways().is_occupied(&runway));
    }
}
