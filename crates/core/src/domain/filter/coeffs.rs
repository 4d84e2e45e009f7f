//! Section coefficient derivation
//!
//! Second-order sections follow the RBJ Audio EQ Cookbook; first-order
//! sections use the bilinear transform with frequency prewarping. All
//! intermediate math runs in f64 and is rounded once into [`BiquadCoeffs`].

use super::section::SECTION_COUNT;
use super::transition::CascadeConfig;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Lowest frequency any section is designed at (Hz)
pub const MIN_FREQUENCY: f32 = 20.0;
/// Upper design limit as a fraction of Nyquist
pub const MAX_NYQUIST_RATIO: f32 = 0.999;
/// Smallest Q accepted by the designers
pub const MIN_Q: f32 = 0.025;
/// Resonance value at which a cut cascade is exactly maximally flat
pub const BUTTERWORTH_RESONANCE: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Biquad filter coefficients
///
/// Direct Form I convention, `a0` normalized to 1.0:
/// `y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`.
/// First-order sections leave `b2` and `a2` at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Shape of one cascade section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionDesign {
    LowPass,
    HighPass,
    LowShelf,
    HighShelf,
    Peak,
    FirstOrderLowPass,
    FirstOrderHighPass,
    FirstOrderLowShelf,
    FirstOrderHighShelf,
}

/// Response family of a cascaded stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    HighPass,
    LowPass,
    Peak,
}

/// Parameter values a slot is designed from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotParams {
    pub frequency: f32,
    /// Resonance for cut stages, Q for the peak stage
    pub resonance: f32,
    /// Peak gain or total shelf gain, in dB
    pub gain_db: f32,
}

impl BiquadCoeffs {
    /// Unity gain (no filtering)
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Flat linear gain
    #[must_use]
    pub fn gain(linear: f32) -> Self {
        Self {
            b0: linear,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub fn lowpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let (cos_w0, alpha) = Self::prepare(sample_rate, freq, q);
        let b1 = 1.0 - cos_w0;
        Self::normalize(b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    #[must_use]
    pub fn highpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let (cos_w0, alpha) = Self::prepare(sample_rate, freq, q);
        let b0 = (1.0 + cos_w0) / 2.0;
        Self::normalize(b0, -(1.0 + cos_w0), b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// Peaking (bell) filter around `freq`
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let (cos_w0, alpha) = Self::prepare(sample_rate, freq, q);
        let a = 10.0_f64.powf(f64::from(gain_db) / 40.0);
        Self::normalize(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// Second-order low shelf: `gain_db` below `freq`, unity above
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let (cos_w0, alpha) = Self::prepare(sample_rate, freq, q);
        let a = 10.0_f64.powf(f64::from(gain_db) / 40.0);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalize(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }

    /// Second-order high shelf: unity below `freq`, `gain_db` above
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let (cos_w0, alpha) = Self::prepare(sample_rate, freq, q);
        let a = 10.0_f64.powf(f64::from(gain_db) / 40.0);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalize(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }

    #[must_use]
    pub fn first_order_lowpass(sample_rate: f32, freq: f32) -> Self {
        let k = Self::prewarp(sample_rate, freq);
        Self::normalize(k, k, 0.0, 1.0 + k, k - 1.0, 0.0)
    }

    #[must_use]
    pub fn first_order_highpass(sample_rate: f32, freq: f32) -> Self {
        let k = Self::prewarp(sample_rate, freq);
        Self::normalize(1.0, -1.0, 0.0, 1.0 + k, k - 1.0, 0.0)
    }

    /// First-order low shelf, geometrically centred on `freq`
    #[must_use]
    pub fn first_order_low_shelf(sample_rate: f32, freq: f32, gain_db: f32) -> Self {
        let k = Self::prewarp(sample_rate, freq);
        let root_g = 10.0_f64.powf(f64::from(gain_db) / 40.0);

        // H(s) = (s + sqrt(G)) / (s + 1/sqrt(G)), s normalized to the corner
        Self::normalize(
            1.0 + root_g * k,
            root_g * k - 1.0,
            0.0,
            1.0 + k / root_g,
            k / root_g - 1.0,
            0.0,
        )
    }

    /// First-order high shelf, geometrically centred on `freq`
    #[must_use]
    pub fn first_order_high_shelf(sample_rate: f32, freq: f32, gain_db: f32) -> Self {
        let k = Self::prewarp(sample_rate, freq);
        let root_g = 10.0_f64.powf(f64::from(gain_db) / 40.0);
        let g = root_g * root_g;

        // H(s) = G * (s + 1/sqrt(G)) / (s + sqrt(G))
        Self::normalize(
            g * (1.0 + k / root_g),
            g * (k / root_g - 1.0),
            0.0,
            1.0 + root_g * k,
            root_g * k - 1.0,
            0.0,
        )
    }

    /// Design one section of the given shape
    #[must_use]
    pub fn design(design: SectionDesign, sample_rate: f32, freq: f32, q: f32, gain_db: f32) -> Self {
        match design {
            SectionDesign::LowPass => Self::lowpass(sample_rate, freq, q),
            SectionDesign::HighPass => Self::highpass(sample_rate, freq, q),
            SectionDesign::LowShelf => Self::low_shelf(sample_rate, freq, gain_db, q),
            SectionDesign::HighShelf => Self::high_shelf(sample_rate, freq, gain_db, q),
            SectionDesign::Peak => Self::peaking(sample_rate, freq, gain_db, q),
            SectionDesign::FirstOrderLowPass => Self::first_order_lowpass(sample_rate, freq),
            SectionDesign::FirstOrderHighPass => Self::first_order_highpass(sample_rate, freq),
            SectionDesign::FirstOrderLowShelf => {
                Self::first_order_low_shelf(sample_rate, freq, gain_db)
            }
            SectionDesign::FirstOrderHighShelf => {
                Self::first_order_high_shelf(sample_rate, freq, gain_db)
            }
        }
    }

    /// Pole-radius stability check (strictly inside the unit circle)
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }

    fn prepare(sample_rate: f32, freq: f32, q: f32) -> (f64, f64) {
        let freq = f64::from(clamp_frequency(freq, sample_rate));
        let q = f64::from(clamp_q(q));
        let w0 = 2.0 * PI * freq / f64::from(sample_rate);
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    fn prewarp(sample_rate: f32, freq: f32) -> f64 {
        let freq = f64::from(clamp_frequency(freq, sample_rate));
        (PI * freq / f64::from(sample_rate)).tan()
    }

    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: (b0 * inv_a0) as f32,
            b1: (b1 * inv_a0) as f32,
            b2: (b2 * inv_a0) as f32,
            a1: (a1 * inv_a0) as f32,
            a2: (a2 * inv_a0) as f32,
        }
    }
}

/// Clamp a design frequency into `[MIN_FREQUENCY, 0.999 * Nyquist]`
pub fn clamp_frequency(freq: f32, sample_rate: f32) -> f32 {
    let max = (sample_rate * 0.5 * MAX_NYQUIST_RATIO).max(MIN_FREQUENCY);
    if freq.is_nan() {
        return MIN_FREQUENCY;
    }
    freq.clamp(MIN_FREQUENCY, max)
}

/// Clamp Q away from zero (and NaN)
pub fn clamp_q(q: f32) -> f32 {
    if q.is_nan() {
        return MIN_Q;
    }
    q.max(MIN_Q)
}

/// Q of pole pair `pair` (0-based) in a Butterworth filter of order `order`
///
/// Pole pair `k` (1-based) has `Q = 1 / (2 sin((2k - 1) pi / 2n))`.
/// Returns `None` when the order has no such pair.
pub fn butterworth_q(order: u8, pair: usize) -> Option<f32> {
    let n = usize::from(order);
    if pair >= n / 2 {
        return None;
    }
    let k = (pair + 1) as f64;
    let angle = (2.0 * k - 1.0) * PI / (2.0 * n as f64);
    Some((1.0 / (2.0 * angle.sin())) as f32)
}

/// Coefficients for one cascade slot of a stage
///
/// `slot` 0..=2 are the second-order sections, 3 is the first-order section.
/// Slot Q is re-derived from the effective order of `config`, so the same
/// slot designs differently at order 4 than at order 6. Slots disabled by
/// `config` return identity coefficients.
pub fn compute_slot(
    slot: usize,
    filter_type: FilterType,
    config: CascadeConfig,
    params: &SlotParams,
    sample_rate: f32,
) -> BiquadCoeffs {
    debug_assert!(slot < SECTION_COUNT);

    if filter_type == FilterType::Peak {
        return if slot == 0 {
            BiquadCoeffs::peaking(sample_rate, params.frequency, params.gain_db, params.resonance)
        } else {
            BiquadCoeffs::IDENTITY
        };
    }

    let mask = config.mask();
    if !mask.is_enabled(slot) {
        return BiquadCoeffs::IDENTITY;
    }

    let effective_order = mask.effective_order();
    let is_first_order = slot == SECTION_COUNT - 1;

    let design = match (filter_type, config.shelf, is_first_order) {
        (FilterType::LowPass, false, false) => SectionDesign::LowPass,
        (FilterType::LowPass, false, true) => SectionDesign::FirstOrderLowPass,
        (FilterType::LowPass, true, false) => SectionDesign::HighShelf,
        (FilterType::LowPass, true, true) => SectionDesign::FirstOrderHighShelf,
        (FilterType::HighPass, false, false) => SectionDesign::HighPass,
        (FilterType::HighPass, false, true) => SectionDesign::FirstOrderHighPass,
        (FilterType::HighPass, true, false) => SectionDesign::LowShelf,
        (FilterType::HighPass, true, true) => SectionDesign::FirstOrderLowShelf,
        (FilterType::Peak, _, _) => unreachable!("peak handled above"),
    };

    let q = butterworth_q(effective_order, slot).unwrap_or(BUTTERWORTH_RESONANCE)
        * (clamp_q(params.resonance) / BUTTERWORTH_RESONANCE);

    // Shelf gain is split in proportion to section order
    let section_order = if is_first_order { 1.0 } else { 2.0 };
    let gain_db = params.gain_db * section_order / f32::from(effective_order.max(1));

    BiquadCoeffs::design(design, sample_rate, params.frequency, q, gain_db)
}
