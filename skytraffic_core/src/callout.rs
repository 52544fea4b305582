//! Traffic advisories for the listener.
//!
//! [`CalloutScheduler`] picks at most one nearby airborne aircraft per
//! call, rate-limited per agent and globally, and phrases it the way a
//! controller would: callsign, type, bearing, distance, altitude.

use crate::airport::bearing;
use crate::config::TrafficConfig;
use crate::taxi::horizontal_distance;
use nalgebra::Vector3;
use skytraffic_env::{AgentId, AgentSnapshot, Callout};
use std::collections::HashMap;

const METERS_PER_NM: f64 = 1852.0;
const FEET_PER_METER: f64 = 3.28084;

/// Airline prefixes handed out to callsigns, with their radio telephony.
pub const AIRLINES: [(&str, &str); 4] = [
    ("SKY", "Skyline"),
    ("BAY", "Bayside"),
    ("CDR", "Cedar"),
    ("NVA", "Nova"),
];

/// Rate-limited traffic callouts.
#[derive(Debug, Default)]
pub struct CalloutScheduler {
    last_by_agent: HashMap<AgentId, f64>,
    last_any: Option<f64>,
}

impl CalloutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callout for the nearest eligible aircraft, if the global
    /// interval has elapsed and one exists.
    pub fn poll(
        &mut self,
        snapshots: &[AgentSnapshot],
        focus: &Vector3<f64>,
        now: f64,
        config: &TrafficConfig,
    ) -> Option<Callout> {
        if let Some(last) = self.last_any {
            if now - last < config.callout_global_interval {
                return None;
            }
        }

        let candidate = snapshots
            .iter()
            .filter(|s| s.airborne)
            .map(|s| (s, horizontal_distance(&s.position, focus)))
            .filter(|(_, d)| *d >= config.callout_min_distance && *d <= config.callout_max_distance)
            .filter(|(s, _)| {
                self.last_by_agent
                    .get(&s.id)
                    .map_or(true, |last| now - last >= config.callout_agent_interval)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| s)?;

        self.last_any = Some(now);
        self.last_by_agent.insert(candidate.id, now);

        Some(Callout {
            agent: candidate.id,
            text: traffic_message(candidate, focus),
            issued_at: now,
        })
    }

    /// Forgets every cooldown.
    pub fn clear(&mut self) {
        self.last_by_agent.clear();
        self.last_any = None;
    }
}

/// "Traffic, Skyline one-two-three, Airbus, bearing two-seven-zero, eight
/// miles, three thousand five hundred."
pub fn traffic_message(snapshot: &AgentSnapshot, focus: &Vector3<f64>) -> String {
    let degrees = bearing(focus, &snapshot.position).to_degrees();
    let miles = (horizontal_distance(focus, &snapshot.position) / METERS_PER_NM).round().max(1.0) as u32;
    let unit = if miles == 1 { "mile" } else { "miles" };

    format!(
        "Traffic, {}, {}, bearing {}, {} {}, {}.",
        spoken_callsign(&snapshot.callsign),
        snapshot.size_class.type_designator(),
        speak_heading(degrees),
        number_words(miles),
        unit,
        speak_altitude(snapshot.position.y * FEET_PER_METER),
    )
}

/// "SKY123" -> "Skyline one-two-three". Unknown prefixes are spelled as-is.
pub fn spoken_callsign(callsign: &str) -> String {
    let split = callsign
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(callsign.len());
    let (prefix, number) = callsign.split_at(split);

    let name = AIRLINES
        .iter()
        .find(|(code, _)| *code == prefix)
        .map_or(prefix, |&(_, telephony)| telephony);

    if number.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, speak_digits(number))
    }
}

fn digit_word(digit: u32) -> &'static str {
    match digit {
        0 => "zero",
        1 => "one",
        2 => "two",
        3 => "three",
        4 => "four",
        5 => "five",
        6 => "six",
        7 => "seven",
        8 => "eight",
        _ => "niner",
    }
}

/// "2451" -> "two-four-five-one"
pub fn speak_digits(text: &str) -> String {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .map(digit_word)
        .collect::<Vec<_>>()
        .join("-")
}

/// Degrees, any range -> three spoken digits ("zero-niner-zero").
pub fn speak_heading(degrees: f64) -> String {
    let mut whole = degrees.rem_euclid(360.0).round() as u32;
    if whole == 0 {
        whole = 360;
    }
    speak_digits(&format!("{whole:03}"))
}

/// Feet -> "three thousand five hundred", rounded to the nearest hundred.
pub fn speak_altitude(feet: f64) -> String {
    let hundreds_total = (feet / 100.0).round().max(0.0) as u32;
    let thousands = hundreds_total / 10;
    let hundreds = hundreds_total % 10;

    match (thousands, hundreds) {
        (0, 0) => "field elevation".to_string(),
        (0, h) => format!("{} hundred", number_words(h)),
        (t, 0) => format!("{} thousand", number_words(t)),
        (t, h) => format!("{} thousand {} hundred", number_words(t), number_words(h)),
    }
}

/// Small cardinal numbers as words; larger ones fall back to digits.
fn number_words(n: u32) -> String {
    const WORDS: [&str; 21] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "niner", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
        "eighteen", "nineteen", "twenty",
    ];
    WORDS
        .get(n as usize)
        .map_or_else(|| speak_digits(&n.to_string()), |w| w.to_string())
}
