//! Engine sound model.
//!
//! Maps an agent snapshot to engine-loop parameters relative to the
//! listener focus. Only airborne and rolling aircraft are audible.

use crate::config::TrafficConfig;
use nalgebra::Vector3;
use skytraffic_env::{AgentSnapshot, EngineSound};

/// Floor of the speed contribution to volume, so slow aircraft stay audible.
const IDLE_VOLUME: f64 = 0.3;

/// Engine pitch at zero speed, before the size-class multiplier.
const IDLE_PITCH: f64 = 0.7;

/// Engine loop parameters for one agent, or `None` when it should be muted.
///
/// Volume falls off linearly with distance and grows with speed; pitch
/// rises with speed and is scaled by the airframe size class.
pub fn engine_sound(
    snapshot: &AgentSnapshot,
    focus: &Vector3<f64>,
    config: &TrafficConfig,
) -> Option<EngineSound> {
    if !snapshot.airborne && !snapshot.rolling {
        return None;
    }

    let distance = (snapshot.position - focus).norm();
    if distance > config.audio_max_distance || config.audio_max_distance <= 0.0 {
        return None;
    }

    let speed_factor = if config.audio_reference_speed > 0.0 {
        (snapshot.speed / config.audio_reference_speed).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let falloff = 1.0 - distance / config.audio_max_distance;
    let volume = (falloff * (IDLE_VOLUME + (1.0 - IDLE_VOLUME) * speed_factor)).clamp(0.0, 1.0);
    let pitch = snapshot.size_class.base_pitch() * (IDLE_PITCH + (1.0 - IDLE_PITCH) * speed_factor);

    Some(EngineSound { volume, pitch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use skytraffic_env::{AgentId, SizeClass};

    fn snapshot(position: Vector3<f64>, speed: f64, airborne: bool) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::from_seed(1),
            callsign: "SKY1".to_string(),
            size_class: SizeClass::Narrowbody,
            position,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            speed,
            airborne,
            rolling: false,
            state: "CRUISE".to_string(),
        }
    }

    #[test]
    fn test_parked_aircraft_are_silent() {
        let config = TrafficConfig::default();
        let snap = snapshot(Vector3::new(10.0, 0.0, 0.0), 0.0, false);
        assert!(engine_sound(&snap, &Vector3::zeros(), &config).is_none());
    }

    #[test]
    fn test_out_of_range_is_muted() {
        let config = TrafficConfig::default();
        let snap = snapshot(Vector3::new(config.audio_max_distance + 1.0, 0.0, 0.0), 200.0, true);
        assert!(engine_sound(&snap, &Vector3::zeros(), &config).is_none());
    }

    #[test]
    fn test_volume_falls_with_distance() {
        let config = TrafficConfig::default();
        let focus = Vector3::zeros();
        let near = engine_sound(&snapshot(Vector3::new(500.0, 0.0, 0.0), 150.0, true), &focus, &config).unwrap();
        let far = engine_sound(&snapshot(Vector3::new(4000.0, 0.0, 0.0), 150.0, true), &focus, &config).unwrap();

        assert!(near.volume > far.volume);
        assert_relative_eq!(near.pitch, far.pitch);
    }

    #[test]
    fn test_pitch_rises_with_speed() {
        let config = TrafficConfig::default();
        let focus = Vector3::zeros();
        let slow = engine_sound(&snapshot(Vector3::new(100.0, 0.0, 0.0), 20.0, true), &focus, &config).unwrap();
        let fast = engine_sound(&snapshot(Vector3::new(100.0, 0.0, 0.0), 250.0, true), &focus, &config).unwrap();

        assert!(fast.pitch > slow.pitch);
        assert_relative_eq!(fast.pitch, SizeClass::Narrowbody.base_pitch());
    }
}
