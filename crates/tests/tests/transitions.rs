//! Order transitions and bypass while audio is running

use cascade_eq_core::domain::{CascadeConfig, FilterSpec, FilterStage, TransitionState};
use cascade_eq_tests::{generate_sine_wave, max_step, prepared_stage, SAMPLE_RATE};

const TONE: f32 = 200.0;

fn run(stage: &mut FilterStage, input: &[f32]) -> Vec<f32> {
    input.iter().map(|&x| stage.process_sample(x)).collect()
}

/// Largest per-sample step of the settled output of a fixed-order stage
fn reference_step(order: u8, input: &[f32]) -> f32 {
    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, order, false));
    let output = run(&mut stage, input);
    max_step(&output[input.len() / 2..])
}

#[test]
fn test_order_change_mid_stream_has_no_click() {
    let input = generate_sine_wave(TONE, SAMPLE_RATE, 48000);
    let bound = reference_step(2, &input).max(reference_step(7, &input)) * 1.5 + 0.005;

    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 2, false));
    let (before, after) = input.split_at(24000);
    run(&mut stage, before);

    stage.set_order(7);
    let output = run(&mut stage, after);
    assert_eq!(stage.current_config(), Some(CascadeConfig::cut(7)));

    let transition = &output[..2000];
    let step = max_step(transition);
    assert!(step <= bound, "step {step} exceeds {bound}");
    assert!(transition.iter().all(|y| y.abs() < 1.1));
}

#[test]
fn test_superseded_transition_has_no_click() {
    let input = generate_sine_wave(TONE, SAMPLE_RATE, 30000);
    let bound = (2..=7)
        .map(|order| reference_step(order, &input))
        .fold(0.0, f32::max)
        * 1.5
        + 0.005;

    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 2, false));
    let mut output = run(&mut stage, &input[..10000]);

    // Three requests inside one fade: the last one is queued
    stage.set_order(4);
    output.extend(run(&mut stage, &input[10000..10300]));
    stage.set_order(6);
    output.extend(run(&mut stage, &input[10300..10600]));
    stage.set_order(3);
    output.extend(run(&mut stage, &input[10600..]));

    assert_eq!(stage.transition_state(), TransitionState::Stable);
    assert_eq!(stage.current_config(), Some(CascadeConfig::cut(3)));

    let step = max_step(&output[9000..]);
    assert!(step <= bound, "step {step} exceeds {bound}");
}

#[test]
fn test_crossfade_completes_after_fade_length() {
    let mut stage = prepared_stage(FilterSpec::high_pass("high1", 100.0, 3, false));
    let fade = stage.fade_length().unwrap_or(0) as usize;
    stage.set_order(6);

    let input = generate_sine_wave(TONE, SAMPLE_RATE, fade);
    run(&mut stage, &input[..fade - 1]);
    assert_eq!(stage.transition_state(), TransitionState::Transitioning);
    run(&mut stage, &input[fade - 1..]);

    assert_eq!(stage.transition_state(), TransitionState::Stable);
    assert_eq!(stage.current_config(), Some(CascadeConfig::cut(6)));
    assert_eq!(stage.pending_config(), None);
}

#[test]
fn test_repeated_order_request_is_noop() {
    let input = generate_sine_wave(TONE, SAMPLE_RATE, 4000);
    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 2, false));
    let mut reference = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 5, false));

    stage.set_order(5);
    run(&mut stage, &input[..2000]);
    assert_eq!(stage.transition_state(), TransitionState::Stable);

    stage.set_order(5);
    stage.parameter_changed("low1-order", 5.2).unwrap();
    stage.process_sample(input[2000]);
    assert_eq!(stage.transition_state(), TransitionState::Stable);

    // Same configuration, so after both settle they track each other
    run(&mut reference, &input[..2001]);
    let a = run(&mut stage, &input[2001..]);
    let b = run(&mut reference, &input[2001..]);
    let diff = a.iter().zip(&b).fold(0.0, |m: f32, (x, y)| m.max((x - y).abs()));
    assert!(diff < 1e-3, "diff {diff}");
}

#[test]
fn test_bypass_round_trip_never_amplifies() {
    let input = generate_sine_wave(3000.0, SAMPLE_RATE, 4000);
    let mut stage = prepared_stage(FilterSpec::peak("peak1", 3000.0));
    let mut unbypassed = prepared_stage(FilterSpec::peak("peak1", 3000.0));
    stage.set_gain(-12.0);
    unbypassed.set_gain(-12.0);

    let settle = run(&mut stage, &input[..2000]);
    run(&mut unbypassed, &input[..2000]);
    assert!(settle.iter().all(|y| y.is_finite()));

    stage.set_bypass(true);
    let mut output = run(&mut stage, &input[2000..2100]);
    stage.set_bypass(false);
    output.extend(run(&mut stage, &input[2100..]));
    let reference = run(&mut unbypassed, &input[2000..]);

    for ((y, x), wet) in output.iter().zip(&input[2000..]).zip(&reference) {
        let ceiling = x.abs().max(wet.abs()) + 1e-4;
        assert!(y.abs() <= ceiling, "{y} exceeds {ceiling}");
    }
}

#[test]
fn test_shelf_toggle_is_click_free() {
    let input = generate_sine_wave(TONE, SAMPLE_RATE, 12000);
    let mut stage = prepared_stage(FilterSpec::high_pass("high1", 100.0, 2, true));
    let mut output = run(&mut stage, &input[..6000]);
    stage.set_shelf_mode(true);
    output.extend(run(&mut stage, &input[6000..]));

    assert_eq!(stage.current_config(), Some(CascadeConfig::shelf(2)));
    let settled = max_step(&output[3000..6000]);
    let step = max_step(&output[5000..]);
    assert!(step <= settled * 1.5 + 0.005, "step {step} vs {settled}");
}
