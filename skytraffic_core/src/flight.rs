//! The flight state machine.
//!
//! One handler per [`FlightState`]; [`step`] dispatches on the agent's
//! current state. Handlers reach shared infrastructure through a
//! [`FlightContext`] and see other agents only through a read-only view.
//!
//! Failures never escape a handler. Taxi-out routing retries a bounded
//! number of times before force-placing the agent at its hold node; a
//! landing with no route to a gate recycles the agent; missing gates or
//! nodes abandon the spawn attempt and retry after `retry_wait`.

use crate::agent::{Agent, FlightState};
use crate::airport::{bearing, Airport, Runway};
use crate::config::TrafficConfig;
use crate::error::{Result, TrafficError};
use crate::metrics::TrafficMetrics;
use crate::runway::{OtherAgents, RunwayArbiter, RunwayRef};
use crate::steering::{
    advance, approach_value, interpolate_altitude, pitch_for, steer_to, turn_toward,
};
use crate::taxi::{horizontal_distance, TaxiGraphs};
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use skytraffic_env::Terrain;
use std::time::Duration;
use tracing::{debug, warn};

/// An overflown touchdown point still counts as a landing this close (m).
const OVERFLY_LANDING_RADIUS: f64 = 300.0;

/// Final approach aims at the extended centerline until this close (m).
const FINAL_FIX_DISTANCE: f64 = 1_500.0;

/// How far back along the centerline the final approach aims, per meter
/// of distance beyond the final fix.
const FINAL_LEAD_FRACTION: f64 = 0.6;

/// Everything a state handler may touch besides the agent itself.
pub struct FlightContext<'a> {
    pub config: &'a TrafficConfig,
    pub airports: &'a [Airport],
    pub graphs: &'a mut TaxiGraphs,
    pub runways: &'a mut RunwayArbiter,
    pub others: OtherAgents<'a>,
    pub terrain: &'a dyn Terrain,
    pub rng: &'a mut ChaCha8Rng,
    pub metrics: &'a mut TrafficMetrics,
    /// Simulation time at the start of this tick
    pub now: Duration,
}

impl FlightContext<'_> {
    fn ground(&self, position: &Vector3<f64>) -> f64 {
        self.terrain.ground_height(position.x, position.z)
    }
}

/// Resolves a runway reference against the airport table.
pub fn runway_of<'r>(airports: &'r [Airport], runway: &RunwayRef) -> Option<&'r Runway> {
    airports.get(runway.airport).and_then(|a| a.runway(&runway.runway))
}

/// Advances one agent by `dt` seconds.
pub fn step(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    match agent.state {
        FlightState::Parked => parked(agent, ctx, dt),
        FlightState::TaxiOut => taxi_out(agent, ctx, dt),
        FlightState::Holding => holding(agent, ctx),
        FlightState::TakeoffRoll => takeoff_roll(agent, ctx, dt),
        FlightState::Climb => climb(agent, ctx, dt),
        FlightState::Cruise => cruise(agent, ctx, dt),
        FlightState::Descent => descent(agent, ctx, dt),
        FlightState::Approach => approach(agent, ctx, dt),
        FlightState::Landing => landing(agent, ctx, dt),
        FlightState::TaxiIn => taxi_in(agent, ctx, dt),
    }
}

// =============================================================================
// GROUND
// =============================================================================

fn parked(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    agent.speed = 0.0;
    agent.position.y = ctx.ground(&agent.position);

    agent.wait_timer -= dt;
    if agent.wait_timer > 0.0 {
        return;
    }

    if agent.awaiting_spawn {
        recycle(agent, ctx);
        return;
    }

    match plan_departure(agent, ctx) {
        Ok(route) if route.len() >= 2 => {
            agent.failures = 0;
            debug!(agent = %agent.callsign, hold = ?agent.hold_node, hops = route.len(), "Taxiing out");
            agent.set_route(route);
            agent.state = FlightState::TaxiOut;
        }
        Ok(_) => {
            // Gate and hold node coincide
            agent.failures = 0;
            agent.clear_route();
            agent.state = FlightState::Holding;
        }
        Err(e) => {
            agent.failures = agent.failures.saturating_add(1);
            ctx.metrics.path_failures += 1;
            warn!(agent = %agent.callsign, failures = agent.failures, "Taxi-out route failed: {}", e);

            if agent.failures >= ctx.config.max_path_failures {
                force_to_hold(agent, ctx);
            } else {
                agent.wait_timer = ctx.config.retry_wait;
            }
        }
    }
}

/// Picks a runway and hold node at the origin and routes the gate to it.
fn plan_departure(agent: &mut Agent, ctx: &mut FlightContext<'_>) -> Result<Vec<String>> {
    let airports = ctx.airports;
    let airport = airports
        .get(agent.origin)
        .ok_or_else(|| TrafficError::UnknownAirport(agent.origin.to_string()))?;

    let runway = ctx
        .runways
        .pick_runway(agent.origin, airport, &mut *ctx.rng)
        .ok_or_else(|| TrafficError::NoRunways(airport.id.clone()))?;

    let holds = airport.hold_nodes(&runway.runway);
    agent.runway = Some(runway.clone());
    if holds.is_empty() {
        agent.hold_node = None;
        return Err(TrafficError::MissingHoldShort {
            airport: airport.id.clone(),
            runway: runway.runway,
        });
    }

    let hold = holds[ctx.rng.gen_range(0..holds.len())].clone();
    agent.hold_node = Some(hold.clone());

    let from = match &agent.gate {
        Some(gate) => gate.clone(),
        None => ctx.graphs.nearest_node(&airport.network, &agent.position)?,
    };
    ctx.graphs.shortest_path(&airport.network, &from, &hold)
}

/// Teleports an agent that keeps failing to route onto its hold node.
fn force_to_hold(agent: &mut Agent, ctx: &mut FlightContext<'_>) {
    let airports = ctx.airports;
    agent.failures = 0;
    ctx.metrics.forced_placements += 1;

    let Some(airport) = airports.get(agent.origin) else {
        recycle(agent, ctx);
        return;
    };

    if agent.runway.as_ref().and_then(|r| runway_of(airports, r)).is_none() {
        agent.runway = ctx.runways.pick_runway(agent.origin, airport, &mut *ctx.rng);
    }
    let Some(runway) = agent.runway.as_ref().and_then(|r| runway_of(airports, r)) else {
        recycle(agent, ctx);
        return;
    };

    let hold_position = agent
        .hold_node
        .as_deref()
        .and_then(|hold| ctx.graphs.position(&airport.network, hold).ok());
    let mut position = hold_position.unwrap_or_else(|| runway.departure_threshold());
    position.y = ctx.ground(&position);

    warn!(
        agent = %agent.callsign,
        airport = %airport.id,
        runway = %runway.id,
        "Forced placement at hold-short after repeated route failures"
    );

    agent.clear_route();
    agent.position = position;
    agent.heading = runway.heading;
    agent.speed = 0.0;
    agent.state = FlightState::Holding;
}

/// Follows the current taxi route. Returns true once the last node is
/// reached (or the route can no longer be followed).
fn follow_route(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) -> bool {
    let config = ctx.config;
    let airports = ctx.airports;
    let Some(airport) = airports.get(agent.route_airport()) else {
        return true;
    };
    let Some(node) = agent.route_node().map(str::to_owned) else {
        return true;
    };

    let target = match agent.target {
        Some(target) => target,
        None => match ctx.graphs.position(&airport.network, &node) {
            Ok(position) => {
                agent.target = Some(position);
                position
            }
            Err(e) => {
                warn!(agent = %agent.callsign, "Abandoning taxi route: {}", e);
                return true;
            }
        },
    };

    if horizontal_distance(&agent.position, &target) <= config.node_arrival_radius {
        agent.position.x = target.x;
        agent.position.z = target.z;
        agent.route_idx += 1;
        agent.target = None;
        return agent.route_idx >= agent.route.as_ref().map_or(0, Vec::len);
    }

    agent.speed = config.taxi_speed;
    steer_to(agent, &target, config.taxi_turn_rate, dt, config.max_bank, false);
    advance(agent, dt);
    agent.position.y = ctx.ground(&agent.position);
    agent.pitch = 0.0;
    false
}

fn taxi_out(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    if follow_route(agent, ctx, dt) {
        agent.clear_route();
        agent.speed = 0.0;
        agent.state = FlightState::Holding;
        debug!(agent = %agent.callsign, hold = ?agent.hold_node, "Holding short");
    }
}

fn holding(agent: &mut Agent, ctx: &mut FlightContext<'_>) {
    let airports = ctx.airports;
    agent.speed = 0.0;
    agent.pitch = 0.0;
    agent.roll = 0.0;
    agent.position.y = ctx.ground(&agent.position);

    let assigned = agent
        .runway
        .clone()
        .filter(|r| runway_of(airports, r).is_some());
    let runway_ref = match assigned {
        Some(r) => r,
        None => {
            let Some(airport) = airports.get(agent.origin) else {
                return;
            };
            match ctx.runways.pick_runway(agent.origin, airport, &mut *ctx.rng) {
                Some(r) => {
                    agent.runway = Some(r.clone());
                    r
                }
                None => return,
            }
        }
    };

    if !ctx.runways.is_clear(&runway_ref, ctx.others) {
        ctx.metrics.runway_waits += 1;
        return;
    }
    let Some(runway) = runway_of(airports, &runway_ref) else {
        return;
    };

    ctx.runways.acquire(&runway_ref);

    let mut position = runway.departure_threshold();
    position.y = ctx.ground(&position);
    agent.position = position;
    agent.heading = runway.heading;
    agent.course = airports
        .get(agent.destination)
        .map_or(runway.heading, |d| bearing(&position, &d.position));
    agent.state = FlightState::TakeoffRoll;

    debug!(agent = %agent.callsign, runway = %runway_ref, "Cleared for takeoff");
}

fn takeoff_roll(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    let config = ctx.config;
    let airports = ctx.airports;

    agent.speed += config.takeoff_acceleration * dt;
    advance(agent, dt);
    if let Some(runway) = agent.runway.as_ref().and_then(|r| runway_of(airports, r)) {
        runway.lock_to_centerline(&mut agent.position);
    }
    agent.position.y = ctx.ground(&agent.position);
    agent.pitch = 0.0;
    agent.roll = 0.0;

    if agent.speed < config.rotate_speed {
        return;
    }

    agent.pitch = config.rotate_pitch;
    if let Some(runway) = agent.runway.take() {
        ctx.runways
            .schedule_delayed_release(&runway, secs(config.release_delay), ctx.now);
        debug!(agent = %agent.callsign, %runway, "Liftoff");
    }
    agent.state = FlightState::Climb;
    ctx.metrics.departures += 1;
}

// =============================================================================
// AIR
// =============================================================================

fn climb(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    let config = ctx.config;

    let course = agent.course;
    turn_toward(agent, course, config.climb_turn_rate, dt, config.max_bank, true);
    agent.speed = approach_value(agent.speed, config.cruise_speed, config.climb_acceleration, dt);
    advance(agent, dt);

    let before = agent.position.y;
    agent.position.y = (before + config.climb_rate * dt).min(agent.cruise_altitude.max(before));
    agent.pitch = pitch_for(config.climb_rate, agent.speed);

    if agent.position.y >= agent.cruise_altitude {
        agent.pitch = 0.0;
        agent.state = FlightState::Cruise;
    }
}

fn cruise(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    let config = ctx.config;
    let airports = ctx.airports;
    let Some(destination) = airports.get(agent.destination) else {
        return;
    };

    steer_to(agent, &destination.position, config.cruise_turn_rate, dt, config.max_bank, true);
    agent.speed = approach_value(agent.speed, config.cruise_speed, config.climb_acceleration, dt);
    let cruise_altitude = agent.cruise_altitude;
    interpolate_altitude(agent, cruise_altitude, config.max_vertical_speed, dt);
    advance(agent, dt);

    if horizontal_distance(&agent.position, &destination.position) < config.descent_distance {
        agent.runway = ctx
            .runways
            .pick_runway(agent.destination, destination, &mut *ctx.rng);
        if agent.runway.is_some() {
            agent.state = FlightState::Descent;
            debug!(agent = %agent.callsign, runway = ?agent.runway, "Starting descent");
        }
    }
}

fn descent(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    let config = ctx.config;
    let airports = ctx.airports;
    let Some(destination) = airports.get(agent.destination) else {
        return;
    };

    let distance = horizontal_distance(&agent.position, &destination.position);

    // Linear profile from cruise altitude down to glideslope height at the
    // approach trigger distance
    let floor = ctx.ground(&destination.position) + config.glideslope_height(config.approach_distance);
    let span = (config.descent_distance - config.approach_distance).max(1.0);
    let t = ((distance - config.approach_distance) / span).clamp(0.0, 1.0);
    let target_altitude = floor + t * (agent.cruise_altitude - floor).max(0.0);

    agent.speed = approach_value(agent.speed, config.descent_speed, config.air_deceleration, dt);
    interpolate_altitude(agent, target_altitude, config.max_vertical_speed, dt);

    if distance < config.approach_distance {
        if let Some(runway_ref) = agent.runway.clone() {
            if let Some(runway) = runway_of(airports, &runway_ref) {
                if ctx.runways.is_clear(&runway_ref, ctx.others) {
                    begin_approach(agent, ctx, &runway_ref, runway);
                    return;
                }
            }
        }

        // Runway busy: orbit and look for another one
        ctx.metrics.runway_waits += 1;
        let desired = agent.heading + config.holding_turn_rate * dt;
        turn_toward(agent, desired, config.holding_turn_rate, dt, config.max_bank, true);
        advance(agent, dt);
        if let Some(runway) = ctx
            .runways
            .pick_runway(agent.destination, destination, &mut *ctx.rng)
        {
            agent.runway = Some(runway);
        }
        return;
    }

    steer_to(agent, &destination.position, config.descent_turn_rate, dt, config.max_bank, true);
    advance(agent, dt);
}

fn begin_approach(agent: &mut Agent, ctx: &mut FlightContext<'_>, runway_ref: &RunwayRef, runway: &Runway) {
    ctx.runways.acquire(runway_ref);

    let end = runway.approach_end(&agent.position);
    let (mut point, heading) = runway.touchdown(end, ctx.config.touchdown_fraction);
    point.y = ctx.ground(&point);

    agent.touchdown = Some(point);
    agent.final_heading = heading;
    agent.state = FlightState::Approach;

    debug!(agent = %agent.callsign, runway = %runway_ref, end, "Cleared to land");
}

fn approach(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    let config = ctx.config;
    let airports = ctx.airports;
    let touchdown = match (agent.touchdown, airports.get(agent.destination)) {
        (Some(point), _) => point,
        (None, Some(destination)) => destination.position,
        (None, None) => return,
    };

    let final_dir = Vector3::new(agent.final_heading.sin(), 0.0, agent.final_heading.cos());
    let distance = horizontal_distance(&agent.position, &touchdown);
    let lead = (distance - FINAL_FIX_DISTANCE).max(0.0) * FINAL_LEAD_FRACTION;
    let aim = touchdown - final_dir * lead;

    agent.speed = approach_value(agent.speed, config.approach_speed, config.air_deceleration, dt);
    steer_to(agent, &aim, config.approach_turn_rate, dt, config.max_bank, true);
    interpolate_altitude(
        agent,
        touchdown.y + config.glideslope_height(distance),
        config.max_vertical_speed,
        dt,
    );
    advance(agent, dt);

    let distance = horizontal_distance(&agent.position, &touchdown);
    let along = (agent.position.x - touchdown.x) * final_dir.x + (agent.position.z - touchdown.z) * final_dir.z;
    let overflown = along > 0.0 && distance < OVERFLY_LANDING_RADIUS;
    if distance > config.touchdown_radius && !overflown {
        return;
    }

    agent.heading = agent.final_heading;
    agent.pitch = 0.0;
    agent.roll = 0.0;
    if let Some(runway) = agent.runway.as_ref().and_then(|r| runway_of(airports, r)) {
        runway.lock_to_centerline(&mut agent.position);
    }
    agent.position.y = ctx.ground(&agent.position);
    agent.state = FlightState::Landing;
    ctx.metrics.arrivals += 1;

    debug!(agent = %agent.callsign, runway = ?agent.runway, "Touchdown");
}

// =============================================================================
// ARRIVAL
// =============================================================================

fn landing(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    let config = ctx.config;
    let airports = ctx.airports;

    agent.speed = (agent.speed - config.landing_deceleration * dt).max(0.0);
    advance(agent, dt);
    if let Some(runway) = agent.runway.as_ref().and_then(|r| runway_of(airports, r)) {
        runway.lock_to_centerline(&mut agent.position);
    }
    agent.position.y = ctx.ground(&agent.position);

    if agent.speed > config.stop_speed {
        return;
    }

    agent.speed = 0.0;
    if let Some(runway) = agent.runway.take() {
        ctx.runways.release(&runway);
    }

    match plan_taxi_in(agent, ctx) {
        Ok((gate, route)) if route.len() >= 2 => {
            agent.gate = Some(gate);
            agent.set_route(route);
            // Start with the node nearest the runway exit point
            agent.route_idx = 0;
            agent.state = FlightState::TaxiIn;
        }
        Ok(_) => {
            recycle(agent, ctx);
        }
        Err(e) => {
            ctx.metrics.landing_recycles += 1;
            warn!(agent = %agent.callsign, "No route to a gate after landing, recycling: {}", e);
            recycle(agent, ctx);
        }
    }
}

/// Picks a gate at the destination and routes the rollout point to it.
fn plan_taxi_in(agent: &Agent, ctx: &mut FlightContext<'_>) -> Result<(String, Vec<String>)> {
    let airports = ctx.airports;
    let airport = airports
        .get(agent.destination)
        .ok_or_else(|| TrafficError::UnknownAirport(agent.destination.to_string()))?;
    if airport.gates.is_empty() {
        return Err(TrafficError::MissingGate(airport.id.clone()));
    }

    let gate = airport.gates[ctx.rng.gen_range(0..airport.gates.len())].clone();
    let from = ctx.graphs.nearest_node(&airport.network, &agent.position)?;
    let route = ctx.graphs.shortest_path(&airport.network, &from, &gate)?;
    Ok((gate, route))
}

fn taxi_in(agent: &mut Agent, ctx: &mut FlightContext<'_>, dt: f64) {
    if follow_route(agent, ctx, dt) {
        debug!(agent = %agent.callsign, gate = ?agent.gate, "Arrived at gate");
        recycle(agent, ctx);
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Where a fresh leg starts.
struct Spawn {
    origin: usize,
    destination: usize,
    gate: String,
    position: Vector3<f64>,
    heading: f64,
    cruise_altitude: f64,
}

fn plan_spawn(ctx: &mut FlightContext<'_>) -> Result<Spawn> {
    let config = ctx.config;
    let airports = ctx.airports;
    if airports.len() < 2 {
        return Err(TrafficError::NotEnoughAirports(airports.len()));
    }

    let origin = ctx.rng.gen_range(0..airports.len());
    let destination = (origin + ctx.rng.gen_range(1..airports.len())) % airports.len();
    let airport = &airports[origin];
    if airport.gates.is_empty() {
        return Err(TrafficError::MissingGate(airport.id.clone()));
    }

    let gate = airport.gates[ctx.rng.gen_range(0..airport.gates.len())].clone();
    let mut position = ctx.graphs.position(&airport.network, &gate)?;
    position.y = ctx.ground(&position);

    // Face the first taxiway out of the gate
    let exit = ctx
        .graphs
        .adjacency(&airport.network)?
        .neighbors(&gate)
        .and_then(|n| n.first())
        .cloned();
    let heading = match exit {
        Some(node) => ctx
            .graphs
            .position(&airport.network, &node)
            .map_or(0.0, |p| bearing(&position, &p)),
        None => 0.0,
    };

    let trip = horizontal_distance(&airport.position, &airports[destination].position);
    let drawn = Normal::new(config.cruise_altitude_mean, config.cruise_altitude_std)
        .map(|n| n.sample(&mut *ctx.rng))
        .unwrap_or(config.cruise_altitude_mean);

    Ok(Spawn {
        origin,
        destination,
        gate,
        position,
        heading,
        cruise_altitude: position.y + config.cruise_altitude_for(drawn, trip),
    })
}

/// Places an agent at a random gate of a random origin with a fresh wait
/// timer. On missing configuration the agent is marked `awaiting_spawn`
/// and retried after `retry_wait`.
pub fn spawn_at_gate(agent: &mut Agent, ctx: &mut FlightContext<'_>) -> bool {
    agent.clear_leg();
    agent.state = FlightState::Parked;

    match plan_spawn(ctx) {
        Ok(spawn) => {
            agent.origin = spawn.origin;
            agent.destination = spawn.destination;
            agent.gate = Some(spawn.gate);
            agent.position = spawn.position;
            agent.heading = spawn.heading;
            agent.cruise_altitude = spawn.cruise_altitude;
            agent.wait_timer = wait_between(
                &mut *ctx.rng,
                ctx.config.parked_wait_min,
                ctx.config.parked_wait_max,
            );
            true
        }
        Err(e) => {
            agent.gate = None;
            agent.awaiting_spawn = true;
            agent.wait_timer = ctx.config.retry_wait;
            ctx.metrics.spawn_failures += 1;
            warn!(agent = %agent.callsign, "Spawn abandoned, retrying: {}", e);
            false
        }
    }
}

/// Ends the agent's current leg and starts a new one at a gate.
pub fn recycle(agent: &mut Agent, ctx: &mut FlightContext<'_>) -> bool {
    if agent.state.occupies_runway() {
        if let Some(runway) = agent.runway.take() {
            ctx.runways.release(&runway);
        }
    }

    let placed = spawn_at_gate(agent, ctx);
    if placed {
        ctx.metrics.recycles += 1;
    }
    placed
}

/// Spawns an agent in cruise somewhere along its route.
pub fn spawn_airborne(agent: &mut Agent, ctx: &mut FlightContext<'_>) -> bool {
    if !spawn_at_gate(agent, ctx) {
        return false;
    }

    let airports = ctx.airports;
    let from = airports[agent.origin].position;
    let to = airports[agent.destination].position;
    let t = ctx.rng.gen_range(0.2..0.5);

    let mut position = from + (to - from) * t;
    position.y = agent.cruise_altitude;

    agent.position = position;
    agent.heading = bearing(&position, &to);
    agent.speed = ctx.config.cruise_speed;
    agent.gate = None;
    agent.wait_timer = 0.0;
    agent.state = FlightState::Cruise;
    true
}

fn wait_between(rng: &mut ChaCha8Rng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airport::AirportSet;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use skytraffic_env::{AgentId, FlatTerrain, SizeClass};

    struct Fixture {
        config: TrafficConfig,
        world: AirportSet,
        graphs: TaxiGraphs,
        runways: RunwayArbiter,
        terrain: FlatTerrain,
        rng: ChaCha8Rng,
        metrics: TrafficMetrics,
        now: Duration,
    }

    impl Fixture {
        fn new(world: AirportSet) -> Self {
            Self {
                config: TrafficConfig::default(),
                graphs: TaxiGraphs::new(world.networks.clone()),
                world,
                runways: RunwayArbiter::new(),
                terrain: FlatTerrain::default(),
                rng: ChaCha8Rng::seed_from_u64(42),
                metrics: TrafficMetrics::new(),
                now: Duration::ZERO,
            }
        }

        fn ctx(&mut self) -> FlightContext<'_> {
            FlightContext {
                config: &self.config,
                airports: &self.world.airports,
                graphs: &mut self.graphs,
                runways: &mut self.runways,
                others: OtherAgents::none(),
                terrain: &self.terrain,
                rng: &mut self.rng,
                metrics: &mut self.metrics,
                now: self.now,
            }
        }

        /// Steps until the agent leaves `state` or the budget runs out.
        fn run_while(&mut self, agent: &mut Agent, state: FlightState, max_ticks: usize) {
            for _ in 0..max_ticks {
                if agent.state != state {
                    return;
                }
                self.now += Duration::from_millis(100);
                let now = self.now;
                self.runways.advance(now);
                step(agent, &mut self.ctx(), 0.1);
            }
        }
    }

    /// Hub gate G2, bound for the regional airport, ready to push back.
    fn parked_agent(fixture: &Fixture) -> Agent {
        let mut agent = Agent::new(AgentId::from_seed(1), "SKY100", SizeClass::Narrowbody);
        agent.origin = 0;
        agent.destination = 2;
        agent.gate = Some("G2".to_string());
        agent.position = Vector3::new(-300.0, 0.0, -400.0);
        agent.cruise_altitude = fixture.config.cruise_altitude_min + 500.0;
        agent.wait_timer = 0.0;
        agent
    }

    #[test]
    fn test_parked_departs_along_valid_route() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::TaxiOut);

        let route = agent.route.clone().unwrap();
        assert!(route.len() >= 2);
        assert_eq!(route[0], "G2");
        assert_eq!(Some(route.last().unwrap()), agent.hold_node.as_ref());

        let adjacency = fixture.graphs.adjacency("hub").unwrap();
        for pair in route.windows(2) {
            assert!(adjacency.is_edge(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn test_taxi_out_reaches_hold() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        step(&mut agent, &mut fixture.ctx(), 0.1);

        fixture.run_while(&mut agent, FlightState::TaxiOut, 20_000);
        assert_eq!(agent.state, FlightState::Holding);
        assert!(agent.route.is_none());
    }

    #[test]
    fn test_repeated_route_failure_forces_hold() {
        let mut world = AirportSet::default_world();
        // Hold nodes that exist in no network
        for holds in world.airports[0].hold_short.values_mut() {
            *holds = vec!["NOWHERE".to_string()];
        }
        let mut fixture = Fixture::new(world);
        let mut agent = parked_agent(&fixture);

        for expected in 1..fixture.config.max_path_failures {
            step(&mut agent, &mut fixture.ctx(), 0.1);
            assert_eq!(agent.state, FlightState::Parked);
            assert_eq!(agent.failures, expected);
            assert_relative_eq!(agent.wait_timer, fixture.config.retry_wait);
            agent.wait_timer = 0.0;
        }

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Holding);
        assert_eq!(agent.failures, 0);
        assert_eq!(fixture.metrics.forced_placements, 1);
        assert_eq!(fixture.metrics.path_failures, 3);
    }

    #[test]
    fn test_holding_lines_up_and_rolls() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Holding;
        agent.runway = Some(RunwayRef::new(0, "09"));
        agent.cruise_altitude = 2000.0;

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::TakeoffRoll);
        assert!(fixture.runways.is_occupied(&RunwayRef::new(0, "09")));
        assert_relative_eq!(agent.position.x, -1500.0);

        fixture.run_while(&mut agent, FlightState::TakeoffRoll, 1_000);
        assert_eq!(agent.state, FlightState::Climb);
        assert!(agent.runway.is_none());
        assert_relative_eq!(agent.position.z, 0.0);
        assert_eq!(fixture.metrics.departures, 1);

        // Flag stays up through the grace delay, then drops
        let r09 = RunwayRef::new(0, "09");
        assert!(fixture.runways.is_occupied(&r09));
        assert_eq!(fixture.runways.pending_releases(), 1);
        fixture.now += secs(fixture.config.release_delay);
        fixture.runways.advance(fixture.now);
        assert!(!fixture.runways.is_occupied(&r09));
    }

    #[test]
    fn test_busy_runway_keeps_holding() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Holding;
        agent.runway = Some(RunwayRef::new(0, "09"));
        fixture.runways.acquire(&RunwayRef::new(0, "09"));

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Holding);
        assert_eq!(fixture.metrics.runway_waits, 1);
    }

    #[test]
    fn test_climb_levels_off_at_cruise() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Climb;
        agent.speed = 80.0;
        agent.cruise_altitude = 1800.0;

        fixture.run_while(&mut agent, FlightState::Climb, 2_000);
        assert_eq!(agent.state, FlightState::Cruise);
        assert!(agent.position.y >= 1800.0 - 1e-9);
    }

    #[test]
    fn test_cruise_inside_descent_distance_picks_runway() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Cruise;
        agent.destination = 0;
        agent.position = Vector3::new(0.0, 3000.0, 20_000.0);
        agent.heading = std::f64::consts::PI;
        agent.speed = 230.0;

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Descent);
        assert_eq!(agent.runway.as_ref().map(|r| r.airport), Some(0));
    }

    #[test]
    fn test_descent_waits_for_busy_runway() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Descent;
        agent.destination = 2;
        agent.position = Vector3::new(-45_000.0, 500.0, 44_000.0);
        agent.speed = 120.0;
        agent.runway = Some(RunwayRef::new(2, "36"));
        fixture.runways.acquire(&RunwayRef::new(2, "36"));

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Descent);
        assert_eq!(fixture.metrics.runway_waits, 1);

        fixture.runways.release(&RunwayRef::new(2, "36"));
        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Approach);
        assert!(fixture.runways.is_occupied(&RunwayRef::new(2, "36")));
    }

    #[test]
    fn test_approach_lands_and_taxis_in() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Descent;
        agent.destination = 2;
        agent.position = Vector3::new(-45_000.0, 400.0, 43_500.0);
        agent.heading = 0.0;
        agent.speed = 120.0;
        agent.runway = Some(RunwayRef::new(2, "36"));

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Approach);

        fixture.run_while(&mut agent, FlightState::Approach, 5_000);
        assert_eq!(agent.state, FlightState::Landing);
        assert_eq!(fixture.metrics.arrivals, 1);
        assert_relative_eq!(agent.position.x, -45_000.0);

        fixture.run_while(&mut agent, FlightState::Landing, 2_000);
        assert_eq!(agent.state, FlightState::TaxiIn);
        assert!(!fixture.runways.is_occupied(&RunwayRef::new(2, "36")));
        assert!(agent.gate.as_deref().unwrap().starts_with("C_G"));

        fixture.run_while(&mut agent, FlightState::TaxiIn, 50_000);
        assert_eq!(agent.state, FlightState::Parked);
        assert_eq!(fixture.metrics.recycles, 1);
    }

    #[test]
    fn test_landing_without_gate_route_recycles() {
        let mut world = AirportSet::default_world();
        world.airports[2].gates = vec!["C_NOPE".to_string()];
        let mut fixture = Fixture::new(world);
        let mut agent = parked_agent(&fixture);
        agent.state = FlightState::Landing;
        agent.destination = 2;
        agent.position = Vector3::new(-45_000.0, 0.0, 49_500.0);
        agent.heading = 0.0;
        agent.speed = 0.2;
        agent.runway = Some(RunwayRef::new(2, "36"));
        fixture.runways.acquire(&RunwayRef::new(2, "36"));

        step(&mut agent, &mut fixture.ctx(), 0.1);
        assert_eq!(agent.state, FlightState::Parked);
        assert!(agent.route.is_none());
        assert_eq!(fixture.metrics.landing_recycles, 1);
        assert!(!fixture.runways.is_occupied(&RunwayRef::new(2, "36")));
    }

    #[test]
    fn test_spawn_picks_distinct_airports() {
        let mut fixture = Fixture::new(AirportSet::default_world());
        let mut agent = Agent::new(AgentId::from_seed(3), "SKY300", SizeClass::Regional);

        for _ in 0..100 {
            assert!(spawn_at_gate(&mut agent, &mut fixture.ctx()));
            assert_ne!(agent.origin, agent.destination);
            let gates = &fixture.world.airports[agent.origin].gates;
            assert!(gates.contains(agent.gate.as_ref().unwrap()));
            assert!(agent.wait_timer >= fixture.config.parked_wait_min);
            assert!(agent.cruise_altitude >= fixture.config.cruise_altitude_min);
        }
    }

    #[test]
    fn test_spawn_failure_marks_awaiting() {
        let mut world = AirportSet::default_world();
        for airport in &mut world.airports {
            airport.gates.clear();
        }
        let mut fixture = Fixture::new(world);
        let mut agent = Agent::new(AgentId::from_seed(4), "SKY400", SizeClass::Light);

        assert!(!spawn_at_gate(&mut agent, &mut fixture.ctx()));
        assert!(agent.awaiting_spawn);
        assert_eq!(agent.state, FlightState::Parked);
        assert_relative_eq!(agent.wait_timer, fixture.config.retry_wait);
        assert_eq!(fixture.metrics.spawn_failures, 1);
    }
}
