//! Traffic Metrics
//! ===============
//!
//! Running counters for the events the lifecycle manager cares about:
//! - **Flow**: departures (liftoffs), arrivals (touchdowns), recycles
//! - **Recovery**: path failures, forced placements, landing recycles,
//!   spawn failures
//! - **Contention**: ticks spent waiting for a runway, delayed releases fired
//!
//! Counters only grow. A full reset bumps `resets` and keeps the rest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event counters for one traffic pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficMetrics {
    /// Agents that rotated and left the runway
    pub departures: u64,

    /// Agents that touched down
    pub arrivals: u64,

    /// Completed legs re-spawned at a gate
    pub recycles: u64,

    /// Failed taxi-out route computations
    pub path_failures: u64,

    /// Agents teleported to their hold node after repeated failures
    pub forced_placements: u64,

    /// Landing rollouts with no route to a gate
    pub landing_recycles: u64,

    /// Recycle attempts abandoned on missing gates or nodes
    pub spawn_failures: u64,

    /// Model-library build failures
    pub model_failures: u64,

    /// Ticks an agent spent waiting on a busy runway
    pub runway_waits: u64,

    /// Delayed runway releases that fired
    pub releases_fired: u64,

    /// Traffic callouts announced
    pub callouts: u64,

    /// Full resets of the pool
    pub resets: u64,
}

impl TrafficMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recovery events of any kind.
    pub fn recoveries(&self) -> u64 {
        self.forced_placements + self.landing_recycles + self.spawn_failures
    }

    /// Adds every counter of `other` into `self`.
    pub fn absorb(&mut self, other: &TrafficMetrics) {
        self.departures += other.departures;
        self.arrivals += other.arrivals;
        self.recycles += other.recycles;
        self.path_failures += other.path_failures;
        self.forced_placements += other.forced_placements;
        self.landing_recycles += other.landing_recycles;
        self.spawn_failures += other.spawn_failures;
        self.model_failures += other.model_failures;
        self.runway_waits += other.runway_waits;
        self.releases_fired += other.releases_fired;
        self.callouts += other.callouts;
        self.resets += other.resets;
    }
}

impl fmt::Display for TrafficMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dep={} arr={} recycle={} path_fail={} forced={} landing_recycle={} spawn_fail={} waits={} releases={} callouts={} resets={}",
            self.departures,
            self.arrivals,
            self.recycles,
            self.path_failures,
            self.forced_placements,
            self.landing_recycles,
            self.spawn_failures,
            self.runway_waits,
            self.releases_fired,
            self.callouts,
            self.resets,
        )
    }
}
