//! Tunable constants for the traffic engine.
//!
//! Units are SI throughout: meters, seconds, meters per second, radians.
//! Turn rates are per second and get scaled by the tick `dt`.

use serde::{Deserialize, Serialize};

/// Configuration for a traffic pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    // --- Ground ---
    /// Taxi speed (m/s)
    pub taxi_speed: f64,

    /// Maximum heading change while taxiing (rad/s)
    pub taxi_turn_rate: f64,

    /// Distance at which a taxi node counts as reached (m)
    pub node_arrival_radius: f64,

    // --- Departure ---
    /// Acceleration during the takeoff roll (m/s²)
    pub takeoff_acceleration: f64,

    /// Speed at which the aircraft rotates and leaves the runway (m/s)
    pub rotate_speed: f64,

    /// Pitch attitude at rotation (rad)
    pub rotate_pitch: f64,

    /// Vertical speed in the climb (m/s)
    pub climb_rate: f64,

    /// Acceleration toward cruise speed while climbing (m/s²)
    pub climb_acceleration: f64,

    /// Maximum heading change while climbing (rad/s)
    pub climb_turn_rate: f64,

    // --- Cruise ---
    /// Cruise speed (m/s)
    pub cruise_speed: f64,

    /// Mean cruise altitude (m)
    pub cruise_altitude_mean: f64,

    /// Standard deviation of the cruise altitude draw (m)
    pub cruise_altitude_std: f64,

    /// Lowest cruise altitude handed out (m)
    pub cruise_altitude_min: f64,

    /// Cruise altitude cap per meter of trip length, keeps short hops low
    pub cruise_gradient: f64,

    /// Maximum heading change in cruise (rad/s)
    pub cruise_turn_rate: f64,

    // --- Arrival ---
    /// Horizontal distance to destination that starts the descent (m)
    pub descent_distance: f64,

    /// Target speed during descent (m/s)
    pub descent_speed: f64,

    /// Deceleration while airborne (m/s²)
    pub air_deceleration: f64,

    /// Maximum vertical speed when interpolating altitude (m/s)
    pub max_vertical_speed: f64,

    /// Maximum heading change during descent (rad/s)
    pub descent_turn_rate: f64,

    /// Horizontal distance to destination that starts the approach (m)
    pub approach_distance: f64,

    /// Target speed on final (m/s)
    pub approach_speed: f64,

    /// Maximum heading change on final (rad/s)
    pub approach_turn_rate: f64,

    /// Glideslope angle (rad)
    pub glideslope: f64,

    /// Distance to the touchdown point that counts as touchdown (m)
    pub touchdown_radius: f64,

    /// Touchdown point position along the runway, as a fraction of length
    pub touchdown_fraction: f64,

    /// Turn rate flown while waiting for an occupied destination runway (rad/s)
    pub holding_turn_rate: f64,

    /// Deceleration during the landing roll (m/s²)
    pub landing_deceleration: f64,

    /// Speed at which a rolling aircraft counts as stopped (m/s)
    pub stop_speed: f64,

    // --- Arbitration & recovery ---
    /// Runway stays occupied this long after liftoff (s)
    pub release_delay: f64,

    /// Wait before retrying a failed taxi route (s)
    pub retry_wait: f64,

    /// Consecutive route failures before forced placement at the hold node
    pub max_path_failures: u8,

    // --- Lifecycle ---
    /// Shortest wait at the gate after a recycle (s)
    pub parked_wait_min: f64,

    /// Longest wait at the gate after a recycle (s)
    pub parked_wait_max: f64,

    /// Extra gate wait per pool index at startup (s)
    pub initial_stagger: f64,

    /// Share of the pool spawned mid-flight at startup
    pub airborne_fraction: f64,

    /// Largest `dt` a single tick will integrate (s)
    pub max_tick_dt: f64,

    /// Bank angle at full turn rate (rad)
    pub max_bank: f64,

    // --- Audio ---
    /// Engine loops are muted beyond this distance from the focus (m)
    pub audio_max_distance: f64,

    /// Speed at which engine volume and pitch reach their nominal value (m/s)
    pub audio_reference_speed: f64,

    // --- Callouts ---
    /// Closest distance at which traffic is called out (m)
    pub callout_min_distance: f64,

    /// Farthest distance at which traffic is called out (m)
    pub callout_max_distance: f64,

    /// Minimum time between two callouts for the same agent (s)
    pub callout_agent_interval: f64,

    /// Minimum time between any two callouts (s)
    pub callout_global_interval: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            taxi_speed: 8.0,
            taxi_turn_rate: 1.5,
            node_arrival_radius: 6.0,

            takeoff_acceleration: 2.5,
            rotate_speed: 75.0,
            rotate_pitch: 10f64.to_radians(),
            climb_rate: 20.0,
            climb_acceleration: 1.5,
            climb_turn_rate: 0.12,

            cruise_speed: 230.0,
            cruise_altitude_mean: 3200.0,
            cruise_altitude_std: 500.0,
            cruise_altitude_min: 1500.0,
            cruise_gradient: 0.045,
            cruise_turn_rate: 0.05,

            descent_distance: 30_000.0,
            descent_speed: 120.0,
            air_deceleration: 1.2,
            max_vertical_speed: 15.0,
            descent_turn_rate: 0.08,
            approach_distance: 7_000.0,
            approach_speed: 70.0,
            approach_turn_rate: 0.3,
            glideslope: 3f64.to_radians(),
            touchdown_radius: 80.0,
            touchdown_fraction: 0.15,
            holding_turn_rate: 0.06,
            landing_deceleration: 2.8,
            stop_speed: 0.5,

            release_delay: 8.0,
            retry_wait: 2.0,
            max_path_failures: 3,

            parked_wait_min: 5.0,
            parked_wait_max: 45.0,
            initial_stagger: 4.0,
            airborne_fraction: 0.35,
            max_tick_dt: 0.1,
            max_bank: 25f64.to_radians(),

            audio_max_distance: 6_000.0,
            audio_reference_speed: 250.0,

            callout_min_distance: 1_000.0,
            callout_max_distance: 15_000.0,
            callout_agent_interval: 60.0,
            callout_global_interval: 8.0,
        }
    }
}

impl TrafficConfig {
    /// Altitude above the touchdown point on the glideslope at a distance.
    pub fn glideslope_height(&self, distance: f64) -> f64 {
        distance * self.glideslope.tan()
    }

    /// Clamps a drawn cruise altitude to what a trip of `trip_length` allows.
    pub fn cruise_altitude_for(&self, drawn: f64, trip_length: f64) -> f64 {
        let cap = (trip_length * self.cruise_gradient).max(self.cruise_altitude_min);
        drawn.clamp(self.cruise_altitude_min, cap)
    }
}
