//! Shared kinematics for every flight state.
//!
//! Motion is simplified on purpose: heading turns at a bounded rate, the
//! aircraft advances along its heading, and altitude either follows the
//! terrain (ground states) or is interpolated toward a target (air states).

use crate::agent::Agent;
use crate::airport::bearing;
use nalgebra::Vector3;
use std::f64::consts::{PI, TAU};

/// Wraps an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle.rem_euclid(TAU);
    if a > PI {
        a -= TAU;
    }
    a
}

/// Signed shortest rotation from `from` to `to`.
pub fn angle_error(from: f64, to: f64) -> f64 {
    wrap_angle(to - from)
}

/// Turns toward `desired` by at most `max_rate * dt`. Airborne agents bank
/// in proportion to the turn rate actually used; ground agents stay level.
pub fn turn_toward(agent: &mut Agent, desired: f64, max_rate: f64, dt: f64, max_bank: f64, airborne: bool) {
    let limit = max_rate * dt;
    let change = angle_error(agent.heading, desired).clamp(-limit, limit);
    agent.heading = wrap_angle(agent.heading + change);

    agent.roll = if airborne && limit > 0.0 {
        (change / limit) * max_bank
    } else {
        0.0
    };
}

/// Turns toward a world position.
pub fn steer_to(agent: &mut Agent, target: &Vector3<f64>, max_rate: f64, dt: f64, max_bank: f64, airborne: bool) {
    let desired = bearing(&agent.position, target);
    turn_toward(agent, desired, max_rate, dt, max_bank, airborne);
}

/// Moves along the current heading by `speed * dt`.
pub fn advance(agent: &mut Agent, dt: f64) {
    let step = agent.speed * dt;
    agent.position.x += agent.heading.sin() * step;
    agent.position.z += agent.heading.cos() * step;
}

/// Moves `value` toward `target` by at most `rate * dt`.
pub fn approach_value(value: f64, target: f64, rate: f64, dt: f64) -> f64 {
    let step = rate * dt;
    if (target - value).abs() <= step {
        target
    } else if target > value {
        value + step
    } else {
        value - step
    }
}

/// Interpolates altitude toward `target` at no more than `max_vs`, and sets
/// pitch from the resulting vertical rate.
pub fn interpolate_altitude(agent: &mut Agent, target: f64, max_vs: f64, dt: f64) {
    let before = agent.position.y;
    agent.position.y = approach_value(before, target, max_vs, dt);

    if dt > 0.0 {
        let vs = (agent.position.y - before) / dt;
        agent.pitch = pitch_for(vs, agent.speed);
    }
}

/// Flight-path angle for a vertical rate at a given speed.
pub fn pitch_for(vertical_speed: f64, speed: f64) -> f64 {
    if speed <= f64::EPSILON {
        0.0
    } else {
        vertical_speed.atan2(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use skytraffic_env::{AgentId, SizeClass};
    use std::f64::consts::FRAC_PI_2;

    fn agent() -> Agent {
        Agent::new(AgentId::from_seed(9), "SKY9", SizeClass::Narrowbody)
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(3.0 * PI), PI);
        assert_relative_eq!(wrap_angle(-FRAC_PI_2), -FRAC_PI_2);
        assert_relative_eq!(angle_error(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_turn_is_rate_limited() {
        let mut a = agent();
        turn_toward(&mut a, FRAC_PI_2, 0.1, 1.0, 0.4, true);
        assert_relative_eq!(a.heading, 0.1);
        assert_relative_eq!(a.roll, 0.4);

        let mut g = agent();
        turn_toward(&mut g, 0.05, 1.5, 0.1, 0.4, false);
        assert_relative_eq!(g.heading, 0.05);
        assert_eq!(g.roll, 0.0);
    }

    #[test]
    fn test_advance_follows_heading() {
        let mut a = agent();
        a.heading = FRAC_PI_2;
        a.speed = 10.0;
        advance(&mut a, 2.0);
        assert_relative_eq!(a.position.x, 20.0);
        assert_relative_eq!(a.position.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_altitude_interpolation_sets_pitch() {
        let mut a = agent();
        a.speed = 100.0;
        interpolate_altitude(&mut a, 500.0, 10.0, 1.0);
        assert_relative_eq!(a.position.y, 10.0);
        assert!(a.pitch > 0.0);

        interpolate_altitude(&mut a, 12.0, 10.0, 1.0);
        assert_relative_eq!(a.position.y, 12.0);
    }
}
