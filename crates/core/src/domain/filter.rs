//! Cascaded IIR filter engine
//!
//! This module provides the building blocks of a filter stage:
//! - Per-sample parameter smoothing
//! - Biquad / first-order coefficient derivation (including Butterworth slot Q)
//! - A bank of up to four series sections with independent enablement
//! - The order-transition crossfade controller
//! - Magnitude response evaluation for display
//!
//! All per-sample paths are designed for:
//! - Zero allocations
//! - No locking and no logging
//! - Deterministic, branch-light inner loops

pub mod coeffs;
pub mod response;
pub mod section;
pub mod smoother;
pub mod transition;

pub use coeffs::{BiquadCoeffs, SectionDesign};
pub use response::{log_frequencies, MagnitudeResponseEngine};
pub use section::{Section, SectionBank, SectionMask, SECTION_COUNT};
pub use smoother::{ParameterSmoother, SmoothingStyle};
pub use transition::{CascadeConfig, OrderTransitionController, TransitionState, MAX_LANES};

/// Lowest order a cut stage accepts
pub const MIN_ORDER: u8 = 1;
/// Highest order a cut stage accepts (three biquads plus one first-order section)
pub const MAX_ORDER: u8 = 7;
