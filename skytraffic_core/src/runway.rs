//! Runway arbitration.
//!
//! The occupancy table is the only state shared between agents. Every
//! mutation goes through [`RunwayArbiter`]: `acquire`, `release`, and
//! `schedule_delayed_release`. Delayed releases live in a cancelable timer
//! registry driven by simulation time, so a full reset can drop all of them
//! at once.

use crate::agent::Agent;
use crate::airport::Airport;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// A runway at a specific airport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunwayRef {
    /// Airport index
    pub airport: usize,
    /// Runway id within the airport
    pub runway: String,
}

impl RunwayRef {
    pub fn new(airport: usize, runway: impl Into<String>) -> Self {
        Self {
            airport,
            runway: runway.into(),
        }
    }
}

impl fmt::Display for RunwayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/{}", self.airport, self.runway)
    }
}

/// Handle to a pending delayed release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct PendingRelease {
    runway: RunwayRef,
    due: Duration,
}

/// Read-only view of every agent except the one being updated.
#[derive(Clone, Copy)]
pub struct OtherAgents<'a> {
    pub before: &'a [Agent],
    pub after: &'a [Agent],
}

impl<'a> OtherAgents<'a> {
    pub fn none() -> Self {
        Self {
            before: &[],
            after: &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Agent> {
        self.before.iter().chain(self.after.iter())
    }

    /// Whether another agent is physically using `runway`.
    pub fn occupying(&self, runway: &RunwayRef) -> bool {
        self.iter()
            .any(|a| a.state.occupies_runway() && a.runway.as_ref() == Some(runway))
    }
}

/// Per-runway exclusive occupancy plus delayed-release timers.
#[derive(Debug, Default)]
pub struct RunwayArbiter {
    occupied: HashMap<RunwayRef, bool>,
    pending: BTreeMap<TimerId, PendingRelease>,
    next_timer: u64,
}

impl RunwayArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current occupancy flag.
    pub fn is_occupied(&self, runway: &RunwayRef) -> bool {
        self.occupied.get(runway).copied().unwrap_or(false)
    }

    /// True only if the flag is down AND no other agent is rolling on,
    /// approaching or landing on the runway.
    pub fn is_clear(&self, runway: &RunwayRef, others: OtherAgents<'_>) -> bool {
        !self.is_occupied(runway) && !others.occupying(runway)
    }

    /// Raises the flag. Idempotent. Stale delayed releases for the same
    /// runway are cancelled so they cannot clear the new owner's flag.
    pub fn acquire(&mut self, runway: &RunwayRef) {
        let stale: Vec<TimerId> = self
            .pending
            .iter()
            .filter(|(_, p)| &p.runway == runway)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.pending.remove(&id);
        }

        self.occupied.insert(runway.clone(), true);
        debug!(%runway, "Runway acquired");
    }

    /// Lowers the flag immediately.
    pub fn release(&mut self, runway: &RunwayRef) {
        self.occupied.insert(runway.clone(), false);
        debug!(%runway, "Runway released");
    }

    /// Lowers the flag once simulation time reaches `now + delay`.
    pub fn schedule_delayed_release(
        &mut self,
        runway: &RunwayRef,
        delay: Duration,
        now: Duration,
    ) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending.insert(
            id,
            PendingRelease {
                runway: runway.clone(),
                due: now + delay,
            },
        );
        trace!(%runway, ?delay, "Delayed release scheduled");
        id
    }

    /// Fires every release due at `now`; returns the runways released.
    pub fn advance(&mut self, now: Duration) -> Vec<RunwayRef> {
        let due: Vec<TimerId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut released = Vec::with_capacity(due.len());
        for id in due {
            if let Some(pending) = self.pending.remove(&id) {
                self.release(&pending.runway);
                released.push(pending.runway);
            }
        }
        released
    }

    /// Cancels one pending release. Returns false if it already fired.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Cancels every pending release.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Drops all occupancy flags (full reset).
    pub fn clear(&mut self) {
        self.occupied.clear();
    }

    pub fn pending_releases(&self) -> usize {
        self.pending.len()
    }

    /// Whether a delayed release is outstanding for `runway`.
    pub fn has_pending_release(&self, runway: &RunwayRef) -> bool {
        self.pending.values().any(|p| &p.runway == runway)
    }

    /// Every runway whose flag is currently up.
    pub fn occupied_runways(&self) -> impl Iterator<Item = &RunwayRef> {
        self.occupied.iter().filter(|(_, &up)| up).map(|(r, _)| r)
    }

    /// Picks a runway at `airport`: a random free one if any, otherwise a
    /// random one. Never blocks; conflicts are caught later by `is_clear`.
    pub fn pick_runway<R: Rng>(
        &self,
        airport_index: usize,
        airport: &Airport,
        rng: &mut R,
    ) -> Option<RunwayRef> {
        if airport.runways.is_empty() {
            return None;
        }

        let free: Vec<RunwayRef> = airport
            .runways
            .iter()
            .map(|r| RunwayRef::new(airport_index, r.id.clone()))
            .filter(|r| !self.is_occupied(r))
            .collect();

        if free.is_empty() {
            let pick = &airport.runways[rng.gen_range(0..airport.runways.len())];
            Some(RunwayRef::new(airport_index, pick.id.clone()))
        } else {
            Some(free[rng.gen_range(0..free.len())].clone())
        }
    }
}
