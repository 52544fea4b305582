//! Traffic stress scenarios for the simulation harness.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Default world, default pool, nothing injected
    BusySkies,

    /// Every airport reduced to one runway, departures released at once
    SingleRunway,

    /// Hold-short nodes and gates pointing at taxiways that do not exist
    BrokenTaxiways,

    /// Full resets at short, jittered intervals
    ResetStorm,

    /// The whole pool arrives at one airport together
    RushHour,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::BusySkies,
            ScenarioId::SingleRunway,
            ScenarioId::BrokenTaxiways,
            ScenarioId::ResetStorm,
            ScenarioId::RushHour,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::BusySkies => "busy_skies",
            ScenarioId::SingleRunway => "single_runway",
            ScenarioId::BrokenTaxiways => "broken_taxiways",
            ScenarioId::ResetStorm => "reset_storm",
            ScenarioId::RushHour => "rush_hour",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::BusySkies => "Default world and pool, invariants checked every tick",
            ScenarioId::SingleRunway => "One runway per airport, every departure ready at once",
            ScenarioId::BrokenTaxiways => {
                "Missing hold-short and gate nodes, forcing retry-then-place and landing recycles"
            }
            ScenarioId::ResetStorm => "Full resets every few seconds, no leaked models or timers",
            ScenarioId::RushHour => "Whole pool inside descent range of one airport",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "busy_skies" | "busy" => Ok(ScenarioId::BusySkies),
            "single_runway" | "single" => Ok(ScenarioId::SingleRunway),
            "broken_taxiways" | "broken" => Ok(ScenarioId::BrokenTaxiways),
            "reset_storm" | "reset" => Ok(ScenarioId::ResetStorm),
            "rush_hour" | "rush" => Ok(ScenarioId::RushHour),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert!(!id.description().is_empty());
        }
        assert_eq!("Rush-Hour".parse::<ScenarioId>(), Ok(ScenarioId::RushHour));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
