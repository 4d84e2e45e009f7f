//! Parameter routing, cross-thread control and configuration persistence

use cascade_eq_core::domain::params::suffix;
use cascade_eq_core::domain::{
    EqError, Equalizer, EqualizerConfig, FilterSpec, ResponseListener, StageKind,
};
use cascade_eq_tests::{generate_sine_wave, prepared_stage, SAMPLE_RATE};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const ALL_SUFFIXES: [&str; 8] = [
    suffix::FREQUENCY,
    suffix::RESONANCE,
    suffix::Q,
    suffix::ORDER,
    suffix::SHELF,
    suffix::SHELF_GAIN,
    suffix::GAIN,
    suffix::BYPASS,
];

fn factory() -> Equalizer {
    let mut eq = Equalizer::new(&EqualizerConfig::factory_default()).unwrap();
    eq.prepare(SAMPLE_RATE, 512).unwrap();
    eq
}

// ============================================================================
// ID ROUTING
// ============================================================================

#[test]
fn test_ids_accepted_exactly_when_declared() {
    let eq = factory();
    let declared: HashSet<String> = eq.blueprints().into_iter().map(|b| b.id).collect();

    for stage in eq.stages() {
        for suffix in ALL_SUFFIXES {
            let id = format!("{}-{suffix}", stage.spec().name);
            let result = stage.parameter_changed(&id, 0.0);
            assert_eq!(result.is_ok(), declared.contains(&id), "{id}");
            if let Err(err) = result {
                assert!(matches!(err, EqError::UnknownParameter { .. }));
            }
        }
    }
}

#[test]
fn test_stage_ids_follow_naming_convention() {
    let eq = factory();
    for stage in eq.stages() {
        let prefix = format!("{}-", stage.spec().name);
        for blueprint in stage.blueprints() {
            assert!(blueprint.id.starts_with(&prefix), "{}", blueprint.id);
        }
        let expected = match stage.kind() {
            StageKind::HighPass | StageKind::LowPass if stage.spec().shelf_capable => 6,
            StageKind::HighPass | StageKind::LowPass => 4,
            StageKind::Peak => 4,
            StageKind::Gain => 2,
        };
        assert_eq!(stage.blueprints().len(), expected, "{}", stage.spec().name);
    }
}

#[test]
fn test_normalized_routing() {
    let eq = factory();
    eq.handle()
        .parameter_changed_normalized("peak1-gain", 1.0)
        .unwrap();
    eq.handle()
        .parameter_changed_normalized("low1-order", 0.0)
        .unwrap();

    let peak = eq.handle().stage("peak1").map(|s| s.state());
    assert_eq!(peak.map(|s| s.gain_db), Some(24.0));
    let low = eq.handle().stage("low1").map(|s| s.state());
    assert_eq!(low.map(|s| s.order), Some(1));

    assert!(matches!(
        eq.handle().parameter_changed_normalized("nothing-freq", 0.5),
        Err(EqError::StageNotFound(_))
    ));
}

// ============================================================================
// CROSS-THREAD CONTROL
// ============================================================================

#[test]
fn test_control_thread_while_processing() {
    let mut stage = prepared_stage(FilterSpec::low_pass("low1", 1000.0, 2, true));
    let handle = stage.handle().clone();
    let running = Arc::new(AtomicBool::new(true));

    let flag = Arc::clone(&running);
    let control = thread::spawn(move || {
        let mut i = 0u32;
        while flag.load(Ordering::Relaxed) {
            handle.set_frequency(200.0 + (i % 50) as f32 * 300.0);
            handle.set_order((i % 7) as u8 + 1);
            handle.set_shelf_mode(i % 11 == 0);
            handle.set_gain((i % 13) as f32 - 6.0);
            i = i.wrapping_add(1);
            thread::yield_now();
        }
        handle.set_shelf_mode(false);
        handle.set_order(4);
        handle.set_frequency(2000.0);
    });

    let input = generate_sine_wave(440.0, SAMPLE_RATE, 48000);
    for &x in &input {
        let y = stage.process_sample(x);
        assert!(y.is_finite());
        assert!(y.abs() < 100.0);
    }

    running.store(false, Ordering::Relaxed);
    control.join().unwrap();

    // Let the last requests and ramps settle
    for &x in &input {
        stage.process_sample(x);
    }
    let state = stage.handle().state();
    assert_eq!(state.order, 4);
    assert!(!state.shelf);
    assert!(!stage.is_smoothing());
}

#[test]
fn test_listener_notified_from_control_thread() {
    let eq = factory();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let listener: Arc<dyn ResponseListener> = Arc::new(move |_: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    eq.handle().add_listener(listener);

    let handle = eq.handle().clone();
    thread::spawn(move || {
        for db in [1.0, 2.0, 2.0, 3.0] {
            handle.parameter_changed("peak2-gain", db).unwrap();
        }
    })
    .join()
    .unwrap();

    // Two repeated values are not changes
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_strip_state_survives_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("strip.toml");

    let eq = factory();
    eq.parameter_changed("high1-order", 6.0).unwrap();
    eq.parameter_changed("high1-shelf", 1.0).unwrap();
    eq.parameter_changed("peak2-q", 3.0).unwrap();
    eq.to_config().save_to_file(&path).await.unwrap();

    let loaded = EqualizerConfig::load_from_file(&path).await.unwrap();
    let restored = Equalizer::new(&loaded).unwrap();

    let high1 = restored.handle().stage("high1").map(|s| s.state());
    assert_eq!(high1.map(|s| (s.order, s.shelf)), Some((6, true)));
    let peak2 = restored.handle().stage("peak2").map(|s| s.state());
    assert_eq!(peak2.map(|s| s.resonance), Some(3.0));

    let freqs = [60.0, 1000.0, 9000.0];
    let mut before = [0.0; 3];
    let mut after = [0.0; 3];
    eq.get_magnitude_response(&freqs, &mut before);
    restored.get_magnitude_response(&freqs, &mut after);
    for (a, b) in before.iter().zip(&after) {
        assert!((a - b).abs() < 1e-4);
    }
}

// ============================================================================
// ROBUSTNESS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_any_parameters_give_finite_output(
        frequency in -100.0f32..100_000.0,
        resonance in -1.0f32..50.0,
        gain in -100.0f32..100.0,
        order in 0u8..12,
        shelf in any::<bool>(),
    ) {
        let mut stage = prepared_stage(FilterSpec::high_pass("high1", 100.0, 2, true));
        stage.set_frequency(frequency);
        stage.set_resonance(resonance);
        stage.set_gain(gain);
        stage.set_order(order);
        stage.set_shelf_mode(shelf);

        let input = generate_sine_wave(1000.0, SAMPLE_RATE, 4096);
        for &x in &input {
            let y = stage.process_sample(x);
            prop_assert!(y.is_finite());
        }
    }
}
