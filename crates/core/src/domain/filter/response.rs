//! Magnitude response evaluation for display
//!
//! Each section's transfer function is evaluated at `z = e^{jw}`; the cascade
//! magnitude is the sum of the per-section magnitudes in dB.

use super::coeffs::BiquadCoeffs;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Floor applied to magnitudes before taking the logarithm
pub const MIN_MAGNITUDE_DB: f32 = -200.0;

/// Evaluates cascades of sections at arbitrary display frequencies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnitudeResponseEngine {
    sample_rate: f32,
}

impl MagnitudeResponseEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Linear magnitude of one section at `frequency` (Hz)
    pub fn section_magnitude(&self, coeffs: &BiquadCoeffs, frequency: f32) -> f64 {
        let w = 2.0 * PI * f64::from(frequency) / f64::from(self.sample_rate);
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let numerator = f64::from(coeffs.b0) + f64::from(coeffs.b1) * z1 + f64::from(coeffs.b2) * z2;
        let denominator = 1.0 + f64::from(coeffs.a1) * z1 + f64::from(coeffs.a2) * z2;

        let den = denominator.norm();
        if den <= f64::EPSILON {
            return f64::INFINITY;
        }
        numerator.norm() / den
    }

    /// Cascade magnitude in dB at a single frequency
    pub fn magnitude_db<'a, I>(&self, sections: I, frequency: f32) -> f32
    where
        I: IntoIterator<Item = &'a BiquadCoeffs>,
    {
        let db: f64 = sections
            .into_iter()
            .map(|coeffs| to_db(self.section_magnitude(coeffs, frequency)))
            .sum();
        (db as f32).max(MIN_MAGNITUDE_DB)
    }

    /// Fill `out[i]` with the cascade magnitude in dB at `frequencies[i]`
    ///
    /// Only `min(frequencies.len(), out.len())` entries are written. An empty
    /// cascade is flat at 0 dB.
    pub fn evaluate<'a, I>(&self, sections: I, frequencies: &[f32], out: &mut [f32])
    where
        I: IntoIterator<Item = &'a BiquadCoeffs> + Clone,
    {
        for (slot, &frequency) in out.iter_mut().zip(frequencies) {
            *slot = self.magnitude_db(sections.clone(), frequency);
        }
    }
}

impl Default for MagnitudeResponseEngine {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

#[inline]
fn to_db(magnitude: f64) -> f64 {
    20.0 * magnitude.max(1e-10).log10()
}

/// Log-spaced display frequencies between `low` and `high` (inclusive)
pub fn log_frequencies(low: f32, high: f32, points: usize) -> Vec<f32> {
    match points {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let ratio = (high / low).ln();
            (0..points)
                .map(|i| low * (ratio * i as f32 / (points - 1) as f32).exp())
                .collect()
        }
    }
}
