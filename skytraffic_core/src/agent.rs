//! The traffic agent record and its flight states.

use crate::runway::RunwayRef;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use skytraffic_env::{AgentId, AgentSnapshot, ModelHandle, SizeClass};

/// Flight state of one agent.
///
/// The canonical cycle is
/// `Parked → TaxiOut → Holding → TakeoffRoll → Climb → Cruise → Descent →
/// Approach → Landing → TaxiIn → Parked`, plus the recovery edges
/// `Parked → Holding` (forced placement) and `Landing → Parked` (recycle
/// when no route to a gate exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightState {
    Parked,
    TaxiOut,
    Holding,
    TakeoffRoll,
    Climb,
    Cruise,
    Descent,
    Approach,
    Landing,
    TaxiIn,
}

impl FlightState {
    pub const ALL: [FlightState; 10] = [
        FlightState::Parked,
        FlightState::TaxiOut,
        FlightState::Holding,
        FlightState::TakeoffRoll,
        FlightState::Climb,
        FlightState::Cruise,
        FlightState::Descent,
        FlightState::Approach,
        FlightState::Landing,
        FlightState::TaxiIn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlightState::Parked => "PARKED",
            FlightState::TaxiOut => "TAXI_OUT",
            FlightState::Holding => "HOLDING",
            FlightState::TakeoffRoll => "TAKEOFF_ROLL",
            FlightState::Climb => "CLIMB",
            FlightState::Cruise => "CRUISE",
            FlightState::Descent => "DESCENT",
            FlightState::Approach => "APPROACH",
            FlightState::Landing => "LANDING",
            FlightState::TaxiIn => "TAXI_IN",
        }
    }

    pub fn is_airborne(&self) -> bool {
        matches!(
            self,
            FlightState::Climb | FlightState::Cruise | FlightState::Descent | FlightState::Approach
        )
    }

    pub fn is_rolling(&self) -> bool {
        matches!(self, FlightState::TakeoffRoll | FlightState::Landing)
    }

    /// States in which the agent physically occupies its runway.
    pub fn occupies_runway(&self) -> bool {
        matches!(
            self,
            FlightState::TakeoffRoll | FlightState::Approach | FlightState::Landing
        )
    }

    /// States whose altitude follows the terrain.
    pub fn is_ground(&self) -> bool {
        !self.is_airborne()
    }

    /// Whether a single tick may move an agent from `self` to `next`.
    pub fn can_transition_to(&self, next: FlightState) -> bool {
        use FlightState::*;

        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Parked, TaxiOut)
                | (Parked, Holding)
                | (TaxiOut, Holding)
                | (Holding, TakeoffRoll)
                | (TakeoffRoll, Climb)
                | (Climb, Cruise)
                | (Cruise, Descent)
                | (Descent, Approach)
                | (Approach, Landing)
                | (Landing, TaxiIn)
                | (Landing, Parked)
                | (TaxiIn, Parked)
        )
    }
}

impl std::fmt::Display for FlightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One simulated aircraft.
///
/// Records are created once by the lifecycle manager and recycled in place
/// when a leg completes; they are never destroyed mid-run.
#[derive(Debug, Clone)]
pub struct Agent {
    /// Stable identity
    pub id: AgentId,

    /// Radio callsign
    pub callsign: String,

    /// Airframe class
    pub size_class: SizeClass,

    /// Visual model, owned exclusively by this agent
    pub model: Option<ModelHandle>,

    /// World position [x east, y up, z north]
    pub position: Vector3<f64>,

    /// Ground or air speed (m/s)
    pub speed: f64,

    /// Heading, pitch and roll (rad)
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,

    /// Current flight state
    pub state: FlightState,

    /// Airport indices
    pub origin: usize,
    pub destination: usize,

    /// Assigned runway (origin while departing, destination while arriving)
    pub runway: Option<RunwayRef>,

    /// Assigned hold-short node at the origin
    pub hold_node: Option<String>,

    /// Gate node the agent is parked at or taxiing to
    pub gate: Option<String>,

    /// Taxi route, always two or more node ids when present
    pub route: Option<Vec<String>>,

    /// Index of the node currently steered to
    pub route_idx: usize,

    /// Position currently steered to
    pub target: Option<Vector3<f64>>,

    /// Countdown used while parked (s)
    pub wait_timer: f64,

    /// Cruise altitude for this leg (m)
    pub cruise_altitude: f64,

    /// Departure course flown after liftoff (rad)
    pub course: f64,

    /// Touchdown point on the destination runway
    pub touchdown: Option<Vector3<f64>>,

    /// Landing heading along the destination runway (rad)
    pub final_heading: f64,

    /// Consecutive taxi-out route failures
    pub failures: u8,

    /// The last recycle failed on missing configuration; retry when the
    /// wait timer expires
    pub awaiting_spawn: bool,
}

impl Agent {
    pub fn new(id: AgentId, callsign: impl Into<String>, size_class: SizeClass) -> Self {
        Self {
            id,
            callsign: callsign.into(),
            size_class,
            model: None,
            position: Vector3::zeros(),
            speed: 0.0,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            state: FlightState::Parked,
            origin: 0,
            destination: 0,
            runway: None,
            hold_node: None,
            gate: None,
            route: None,
            route_idx: 0,
            target: None,
            wait_timer: 0.0,
            cruise_altitude: 0.0,
            course: 0.0,
            touchdown: None,
            final_heading: 0.0,
            failures: 0,
            awaiting_spawn: false,
        }
    }

    /// Installs a taxi route and steers to its second node.
    pub fn set_route(&mut self, route: Vec<String>) {
        debug_assert!(route.len() >= 2);
        self.route = Some(route);
        self.route_idx = 1;
        self.target = None;
    }

    pub fn clear_route(&mut self) {
        self.route = None;
        self.route_idx = 0;
        self.target = None;
    }

    /// Node currently steered to.
    pub fn route_node(&self) -> Option<&str> {
        self.route
            .as_ref()
            .and_then(|r| r.get(self.route_idx))
            .map(String::as_str)
    }

    /// Airport whose taxi network the current route lives in.
    pub fn route_airport(&self) -> usize {
        match self.state {
            FlightState::TaxiIn | FlightState::Landing => self.destination,
            _ => self.origin,
        }
    }

    /// Forgets everything tied to the previous leg.
    pub fn clear_leg(&mut self) {
        self.clear_route();
        self.runway = None;
        self.hold_node = None;
        self.touchdown = None;
        self.failures = 0;
        self.awaiting_spawn = false;
        self.speed = 0.0;
        self.pitch = 0.0;
        self.roll = 0.0;
    }

    /// Value copy handed to collaborators.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            callsign: self.callsign.clone(),
            size_class: self.size_class,
            position: self.position,
            heading: self.heading,
            pitch: self.pitch,
            roll: self.roll,
            speed: self.speed,
            airborne: self.state.is_airborne(),
            rolling: self.state.is_rolling(),
            state: self.state.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_cycle_is_legal() {
        let cycle = FlightState::ALL;
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(FlightState::TaxiIn.can_transition_to(FlightState::Parked));
    }

    #[test]
    fn test_shortcuts_are_illegal() {
        assert!(!FlightState::Cruise.can_transition_to(FlightState::Landing));
        assert!(!FlightState::Holding.can_transition_to(FlightState::Climb));
        assert!(!FlightState::Parked.can_transition_to(FlightState::TakeoffRoll));
        assert!(!FlightState::Climb.can_transition_to(FlightState::Holding));
    }

    #[test]
    fn test_route_bookkeeping() {
        let mut agent = Agent::new(AgentId::from_seed(1), "SKY101", SizeClass::Narrowbody);
        agent.set_route(vec!["G1".into(), "T1".into(), "H09".into()]);
        assert_eq!(agent.route_node(), Some("T1"));

        agent.clear_route();
        assert_eq!(agent.route_node(), None);
        assert_eq!(agent.route_idx, 0);
    }

    #[test]
    fn test_snapshot_flags() {
        let mut agent = Agent::new(AgentId::from_seed(2), "SKY202", SizeClass::Light);
        agent.state = FlightState::TakeoffRoll;
        let snap = agent.snapshot();
        assert!(snap.rolling);
        assert!(!snap.airborne);
        assert_eq!(snap.state, "TAKEOFF_ROLL");
    }
}
