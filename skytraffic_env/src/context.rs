//! Core environment context trait for SkyTraffic hosts.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for the host environment.
///
/// This trait abstracts the "real world" so that the traffic engine can be
/// driven both by a real-time host loop and by a deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` - virtual clock, seeded entropy
///
/// # Determinism
///
/// For deterministic runs, all methods that would normally introduce
/// non-determinism (time, randomness) are controlled by the implementation.
#[async_trait]
pub trait TrafficContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends the host loop for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Derives a deterministic seed for one consumer of randomness.
    ///
    /// The implementation combines the global seed with `seed_extension`
    /// so that independent streams (spawning, callouts, ...) do not
    /// perturb each other.
    fn derive_seed(&self, seed_extension: u64) -> u64;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
