//! Per-sample parameter ramping
//!
//! A [`ParameterSmoother`] turns a control-rate target change into a ramp of
//! bounded slope. The ramp has a fixed length in samples and always lands on
//! the target exactly, without overshoot.

use serde::{Deserialize, Serialize};

/// Domain in which the ramp is linear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingStyle {
    /// Constant step in value units (gain, crossfade factors)
    Linear,
    /// Constant step in log units; values must be strictly positive (frequency, Q)
    Logarithmic,
}

/// Linear (or log-linear) ramp toward a target value
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSmoother {
    style: SmoothingStyle,
    /// Current position, in ramp-domain units
    current: f32,
    /// Destination, in value units
    target: f32,
    /// Destination, in ramp-domain units
    target_domain: f32,
    step: f32,
    countdown: u32,
    ramp_samples: u32,
}

impl ParameterSmoother {
    /// Create a settled smoother with no ramp configured
    pub fn new(initial: f32, style: SmoothingStyle) -> Self {
        let domain = Self::to_domain(style, initial);
        Self {
            style,
            current: domain,
            target: initial,
            target_domain: domain,
            step: 0.0,
            countdown: 0,
            ramp_samples: 0,
        }
    }

    /// Convert a ramp duration in milliseconds to samples
    pub fn samples_for(duration_ms: f32, sample_rate: f32) -> u32 {
        (duration_ms.max(0.0) * 0.001 * sample_rate).round() as u32
    }

    /// Set the ramp duration in samples
    ///
    /// A ramp in progress keeps its current step; the new length applies
    /// from the next target change.
    pub fn set_ramp_length(&mut self, samples: u32) {
        self.ramp_samples = samples;
    }

    pub fn ramp_length(&self) -> u32 {
        self.ramp_samples
    }

    /// Set a new destination
    ///
    /// The ramp restarts from the current value and spans the full ramp length.
    pub fn set_target(&mut self, value: f32) {
        let value = self.sanitize(value);
        if value == self.target {
            return;
        }

        self.target = value;
        self.target_domain = Self::to_domain(self.style, value);

        if self.ramp_samples == 0 {
            self.current = self.target_domain;
            self.countdown = 0;
            return;
        }

        self.step = (self.target_domain - self.current) / self.ramp_samples as f32;
        self.countdown = self.ramp_samples;
    }

    /// Jump to `value` immediately, cancelling any ramp
    pub fn reset(&mut self, value: f32) {
        let value = self.sanitize(value);
        self.target = value;
        self.target_domain = Self::to_domain(self.style, value);
        self.current = self.target_domain;
        self.step = 0.0;
        self.countdown = 0;
    }

    /// Advance one sample and return the new current value
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.countdown == 0 {
            return self.target;
        }

        self.countdown -= 1;
        if self.countdown == 0 {
            self.current = self.target_domain;
            return self.target;
        }

        // Clamp toward the target so rounding can never overshoot
        let next = self.current + self.step;
        self.current = if self.step > 0.0 {
            next.min(self.target_domain)
        } else {
            next.max(self.target_domain)
        };
        Self::from_domain(self.style, self.current)
    }

    /// Current value without advancing
    pub fn current(&self) -> f32 {
        if self.countdown == 0 {
            self.target
        } else {
            Self::from_domain(self.style, self.current)
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the current value still differs from the target
    pub fn is_smoothing(&self) -> bool {
        self.countdown > 0
    }

    fn sanitize(&self, value: f32) -> f32 {
        match self.style {
            SmoothingStyle::Linear => value,
            SmoothingStyle::Logarithmic => value.max(f32::MIN_POSITIVE),
        }
    }

    #[inline]
    fn to_domain(style: SmoothingStyle, value: f32) -> f32 {
        match style {
            SmoothingStyle::Linear => value,
            SmoothingStyle::Logarithmic => value.max(f32::MIN_POSITIVE).ln(),
        }
    }

    #[inline]
    fn from_domain(style: SmoothingStyle, value: f32) -> f32 {
        match style {
            SmoothingStyle::Linear => value,
            SmoothingStyle::Logarithmic => value.exp(),
        }
    }
}
