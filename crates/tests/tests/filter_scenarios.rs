//! End-to-end response scenarios for single stages
//!
//! These drive stages sample-by-sample with sine waves and compare the
//! measured gain against expectations and against the visualization curve.

use cascade_eq_core::domain::{FilterSpec, FilterStage};
use cascade_eq_tests::{measure_gain_db, prepared_stage, SAMPLE_RATE};

fn predicted_db(stage: &FilterStage, frequency: f32) -> f32 {
    let mut out = [0.0];
    stage.get_magnitude_response(&[frequency], &mut out);
    out[0]
}

// ============================================================================
// LOW-PASS SCENARIO
// ============================================================================

#[test]
fn test_fourth_order_low_pass_passband() {
    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 4, false));
    let db = measure_gain_db(&mut stage, 100.0);
    assert!(db.abs() < 0.5, "100 Hz: {db} dB");
}

#[test]
fn test_fourth_order_low_pass_stopband() {
    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 4, false));
    let octave = measure_gain_db(&mut stage, 2000.0);
    assert!(octave < -23.5, "2 kHz: {octave} dB");

    let decade = measure_gain_db(&mut stage, 10000.0);
    assert!(decade < -70.0, "10 kHz: {decade} dB");
}

#[test]
fn test_cutoff_is_minus_3db_for_every_order() {
    for order in 1..=7 {
        let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, order, false));
        let db = measure_gain_db(&mut stage, 1000.0);
        assert!((db + 3.01).abs() < 0.1, "order {order}: {db} dB");
    }
}

#[test]
fn test_high_pass_slope_grows_with_order() {
    let mut previous = 0.0;
    for order in 1..=7 {
        let mut stage = prepared_stage(FilterSpec::high_pass("high1", 1000.0, order, false));
        let db = measure_gain_db(&mut stage, 250.0);
        assert!(db < previous - 5.0, "order {order}: {db} dB after {previous} dB");
        previous = db;
    }
}

// ============================================================================
// RESPONSE / PROCESS CONSISTENCY
// ============================================================================

#[test]
fn test_response_matches_measured_gain() {
    let cases = [
        (FilterSpec::low_pass("low1", 1000.0, 4, false), None),
        (FilterSpec::high_pass("high1", 300.0, 7, false), None),
        (FilterSpec::high_pass("high1", 300.0, 3, true), Some(-9.0)),
        (FilterSpec::low_pass("low2", 4000.0, 2, true), Some(6.0)),
        (FilterSpec::peak("peak1", 2000.0), Some(-8.0)),
        (FilterSpec::gain("gain"), Some(3.5)),
    ];

    for (spec, gain) in cases {
        let shelf = spec.shelf_capable;
        let mut stage = prepared_stage(spec);
        if shelf {
            stage.set_shelf_mode(true);
        }
        if let Some(db) = gain {
            stage.set_gain(db);
        }

        for frequency in [100.0, 500.0, 2000.0, 8000.0] {
            let expected = predicted_db(&stage, frequency);
            let measured = measure_gain_db(&mut stage, frequency);
            assert!(
                (measured - expected).abs() < 0.1,
                "{} at {frequency} Hz: measured {measured}, predicted {expected}",
                stage.spec().name
            );
        }
    }
}

#[test]
fn test_resonance_raises_cutoff_peak() {
    let mut flat = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 2, false));
    let mut resonant = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 2, false));
    resonant.set_resonance(4.0);

    let flat_db = measure_gain_db(&mut flat, 1000.0);
    let resonant_db = measure_gain_db(&mut resonant, 1000.0);
    assert!(resonant_db > flat_db + 10.0);
}

#[test]
fn test_frequency_near_nyquist_stays_stable() {
    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 7, false));
    stage.set_frequency(SAMPLE_RATE);
    let db = measure_gain_db(&mut stage, 5000.0);
    assert!(db.is_finite());
    assert!(db.abs() < 0.5);
}
