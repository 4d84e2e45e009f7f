//! Shared signal helpers for the integration tests

use cascade_eq_core::domain::{EngineConfig, FilterSpec, FilterStage};

pub const SAMPLE_RATE: f32 = 48000.0;

/// Build a stage with the default engine configuration and prepare it at 48 kHz
pub fn prepared_stage(spec: FilterSpec) -> FilterStage {
    let mut stage = FilterStage::new(spec, &EngineConfig::default()).expect("valid spec");
    stage.prepare(SAMPLE_RATE, 512).expect("valid sample rate");
    stage
}

pub fn generate_sine_wave(frequency: f32, sample_rate: f32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate)
        .map(|phase| phase.sin())
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / samples.len() as f64).sqrt() as f32
}

pub fn amplitude_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(1e-12).log10()
}

/// Largest absolute difference between consecutive samples
pub fn max_step(samples: &[f32]) -> f32 {
    samples
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .fold(0.0, f32::max)
}

/// Steady-state gain of `stage` at `frequency`, in dB
///
/// Drives a unit sine, discards the first 200 ms and measures the RMS of the
/// next second (an integer number of periods for integer frequencies).
pub fn measure_gain_db(stage: &mut FilterStage, frequency: f32) -> f32 {
    let settle = (SAMPLE_RATE * 0.2) as usize;
    let window = SAMPLE_RATE as usize;
    let input = generate_sine_wave(frequency, SAMPLE_RATE, settle + window);
    let output: Vec<f32> = input.iter().map(|&x| stage.process_sample(x)).collect();
    amplitude_to_db(rms(&output[settle..]) * std::f32::consts::SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_rms() {
        let sine = generate_sine_wave(1000.0, SAMPLE_RATE, 4800);
        assert!((rms(&sine) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn test_max_step() {
        assert_eq!(max_step(&[0.0, 0.5, 0.25]), 0.5);
        assert_eq!(max_step(&generate_silence(16)), 0.0);
    }
}
