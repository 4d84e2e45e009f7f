//! Cascade sections and the bank that runs them in series

use super::coeffs::BiquadCoeffs;
use serde::{Deserialize, Serialize};

/// Number of cascade slots: three second-order sections, then one first-order section
pub const SECTION_COUNT: usize = 4;

/// Which cascade slots participate in processing
///
/// Bit `i` set means slot `i` is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SectionMask(u8);

impl SectionMask {
    pub const NONE: Self = Self(0);
    pub const FIRST_ORDER_SLOT: usize = SECTION_COUNT - 1;

    /// Mask for a high/low-pass cascade of `order` (1..=7)
    ///
    /// Slot 0 iff order >= 2, slot 1 iff order >= 4, slot 2 iff order >= 6,
    /// first-order slot iff the order is odd or the stage is in shelf mode.
    pub fn for_order(order: u8, shelf: bool) -> Self {
        let mut bits = 0u8;
        if order >= 2 {
            bits |= 1 << 0;
        }
        if order >= 4 {
            bits |= 1 << 1;
        }
        if order >= 6 {
            bits |= 1 << 2;
        }
        if order % 2 == 1 || shelf {
            bits |= 1 << Self::FIRST_ORDER_SLOT;
        }
        Self(bits)
    }

    /// Mask with only `slot` enabled
    pub fn single(slot: usize) -> Self {
        debug_assert!(slot < SECTION_COUNT);
        Self(1 << slot)
    }

    #[inline]
    pub fn is_enabled(self, slot: usize) -> bool {
        self.0 & (1 << slot) != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Sum of the orders of the enabled sections
    pub fn effective_order(self) -> u8 {
        (0..SECTION_COUNT)
            .filter(|&slot| self.is_enabled(slot))
            .map(|slot| if slot == Self::FIRST_ORDER_SLOT { 1 } else { 2 })
            .sum()
    }

    /// Slots enabled in `self` but not in `previous`
    pub fn newly_enabled(self, previous: Self) -> Self {
        Self(self.0 & !previous.0)
    }
}

/// Stateful section using Direct Form I
///
/// Direct Form I keeps the input history separate from the output history,
/// which tolerates per-sample coefficient updates without state rescaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl Section {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Update coefficients, keeping the delay state
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        // Flush denormals so silent tails do not stall the FPU
        self.y1 = if y.abs() < 1.0e-20 { 0.0 } else { y };

        self.y1
    }

    /// Clear the delay state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    pub fn is_silent(&self) -> bool {
        self.x1 == 0.0 && self.x2 == 0.0 && self.y1 == 0.0 && self.y2 == 0.0
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new(BiquadCoeffs::IDENTITY)
    }
}

/// Fixed series chain of up to four sections (slots 0 -> 1 -> 2 -> 3)
///
/// Disabled sections are skipped entirely and accumulate no history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionBank {
    sections: [Section; SECTION_COUNT],
    mask: SectionMask,
}

impl SectionBank {
    pub fn new(mask: SectionMask) -> Self {
        Self {
            sections: Default::default(),
            mask,
        }
    }

    pub fn mask(&self) -> SectionMask {
        self.mask
    }

    /// Change which sections participate
    ///
    /// Sections that go from disabled to enabled have their history cleared
    /// so they never replay stale state.
    pub fn set_mask(&mut self, mask: SectionMask) {
        let fresh = mask.newly_enabled(self.mask);
        for slot in 0..SECTION_COUNT {
            if fresh.is_enabled(slot) {
                self.sections[slot].reset();
            }
        }
        self.mask = mask;
    }

    /// Update one slot without disturbing the others
    pub fn set_section_coefficients(&mut self, slot: usize, coeffs: BiquadCoeffs) {
        self.sections[slot].set_coeffs(coeffs);
    }

    pub fn section(&self, slot: usize) -> &Section {
        &self.sections[slot]
    }

    /// Run the enabled sections in series
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let mut y = x;
        for (slot, section) in self.sections.iter_mut().enumerate() {
            if self.mask.is_enabled(slot) {
                y = section.process_sample(y);
            }
        }
        y
    }

    /// Clear all delay elements
    pub fn reset_state(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Take over another bank's delay history, keeping this bank's mask
    ///
    /// Sections enabled here but not in `other` start from silence.
    pub fn copy_state_from(&mut self, other: &SectionBank) {
        let fresh = self.mask.newly_enabled(other.mask);
        for slot in 0..SECTION_COUNT {
            let coeffs = self.sections[slot].coeffs;
            self.sections[slot] = other.sections[slot].clone();
            self.sections[slot].coeffs = coeffs;
            if fresh.is_enabled(slot) {
                self.sections[slot].reset();
            }
        }
    }

    /// Coefficients of the enabled sections, in series order
    pub fn active_coeffs(&self) -> impl Iterator<Item = &BiquadCoeffs> + '_ {
        self.sections
            .iter()
            .enumerate()
            .filter(move |(slot, _)| self.mask.is_enabled(*slot))
            .map(|(_, section)| &section.coeffs)
    }
}
