use pantrack_core::{ActuatorLimits, ControlConfig, DetectionResult, Direction, GateConfig};
use pantrack_servo::{CommandGate, ControlLaw, ControlState, GateDecision};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn arb_control() -> impl Strategy<Value = ControlConfig> {
    (0.01f64..5.0, any::<bool>(), 0.0f64..5.0, 0.0f64..=1.0).prop_map(
        |(gain, inverted, deadband_degrees, alpha)| ControlConfig {
            gain,
            direction: if inverted {
                Direction::Inverted
            } else {
                Direction::Normal
            },
            deadband_degrees,
            alpha,
        },
    )
}

proptest! {
    #[test]
    fn test_angles_stay_within_limits(
        config in arb_control(),
        errors in prop::collection::vec((-40.0f64..40.0, any::<bool>()), 1..50),
    ) {
        let limits = ActuatorLimits::default();
        let law = ControlLaw::new();
        let mut state = ControlState::seeded(&limits);
        for (error, found) in errors {
            let detection = if found {
                DetectionResult::at(0, 0, 100.0)
            } else {
                DetectionResult::not_found()
            };
            let out = law.update(&mut state, &detection, error, &config, &limits);
            prop_assert!(out >= limits.min && out <= limits.max);
            prop_assert!(state.raw_angle >= limits.min && state.raw_angle <= limits.max);
        }
    }

    #[test]
    fn test_alpha_one_tracks_raw(config in arb_control(), error in -40.0f64..40.0) {
        let config = ControlConfig { alpha: 1.0, ..config };
        let limits = ActuatorLimits::default();
        let mut state = ControlState::seeded(&limits);
        ControlLaw::new().update(&mut state, &DetectionResult::at(0, 0, 100.0), error, &config, &limits);
        prop_assert_eq!(state.smoothed_angle, state.raw_angle);
    }

    #[test]
    fn test_alpha_zero_holds_seed(config in arb_control(), errors in prop::collection::vec(-40.0f64..40.0, 1..30)) {
        let config = ControlConfig { alpha: 0.0, ..config };
        let limits = ActuatorLimits::default();
        let mut state = ControlState::seeded(&limits);
        for error in errors {
            ControlLaw::new().update(&mut state, &DetectionResult::at(0, 0, 100.0), error, &config, &limits);
        }
        prop_assert_eq!(state.smoothed_angle, limits.center);
    }

    #[test]
    fn test_gate_sends_only_when_both_checks_pass(
        last in 0i32..=180,
        candidate in -10.0f64..190.0,
        elapsed_ms in 0u64..200,
        min_step in 0.0f64..5.0,
        min_interval_ms in 0u64..100,
    ) {
        let config = GateConfig {
            min_step_units: min_step,
            min_interval_secs: min_interval_ms as f64 / 1000.0,
        };
        let t0 = Instant::now();
        let mut gate = CommandGate::new();
        gate.commit(last, t0);

        let now = t0 + Duration::from_millis(elapsed_ms);
        let step_ok = (candidate - last as f64).abs() >= min_step;
        let interval_ok = Duration::from_millis(elapsed_ms) >= config.min_interval();

        match gate.evaluate(candidate, &config, &ActuatorLimits::default(), now) {
            GateDecision::Send(command) => {
                prop_assert!(step_ok && interval_ok);
                prop_assert!((0..=180).contains(&command));
            }
            GateDecision::SuppressedStep => prop_assert!(!step_ok),
            GateDecision::SuppressedInterval => prop_assert!(step_ok && !interval_ok),
        }
    }
}
