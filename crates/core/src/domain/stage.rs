//! Filter stages (high-pass, low-pass, peak, gain)
//!
//! One generic engine serves every stage kind. The kind only selects the
//! section designs and which parameters exist; the audio path is the same:
//! 1. Pull new targets from the control side when its generation moved
//! 2. Advance the smoothers one sample
//! 3. Redesign the live lanes if any coefficient input changed
//! 4. Run the (possibly crossfading) transition controller
//! 5. Blend with the dry input by the smoothed bypass weight

use super::config::{EngineConfig, SmoothingConfig};
use super::control::{db_to_linear, ResponseListener, StageHandle, StageState};
use super::error::{EqError, Result};
use super::filter::coeffs::SlotParams;
use super::filter::{
    CascadeConfig, OrderTransitionController, ParameterSmoother, SmoothingStyle, TransitionState,
};
use super::params::{FilterSpec, ParameterBlueprint, StageKind};
use std::sync::Arc;
use tracing::debug;

/// Placeholder sample rate until the first `prepare`
const UNPREPARED_SAMPLE_RATE: f32 = 48000.0;

/// Audio effect trait - all effects must implement this
///
/// Effects process audio in-place for zero-copy performance.
pub trait Effect: Send + Sync {
    /// Process a buffer of mono samples in-place
    ///
    /// No allocations, no locking, any buffer length.
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Clear filter memory and settle all ramps
    fn reset(&mut self);

    fn is_bypassed(&self) -> bool;

    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

/// One stage of the equalizer
pub struct FilterStage {
    kind: StageKind,
    handle: StageHandle,
    smoothing: SmoothingConfig,

    frequency: ParameterSmoother,
    resonance: ParameterSmoother,
    gain: ParameterSmoother,
    /// 1 = fully active, 0 = fully bypassed
    bypass_mix: ParameterSmoother,

    /// `None` for the flat gain stage
    controller: Option<OrderTransitionController>,
    gain_linear: f32,

    last_generation: u64,
    needs_design: bool,
    /// Fully bypassed: sections skipped and cleared
    sections_idle: bool,

    sample_rate: f32,
    max_block_size: usize,
    prepared: bool,
}

impl FilterStage {
    pub fn new(spec: FilterSpec, engine: &EngineConfig) -> Result<Self> {
        spec.validate()?;

        let kind = spec.kind;
        let fade_length = if spec.shelf_capable {
            engine.fade.shelf_samples
        } else {
            engine.fade.cut_samples
        };
        let state = StageState::defaults_for(&spec);
        let controller = kind.filter_type().map(|filter_type| {
            OrderTransitionController::new(
                filter_type,
                state.cascade_config(kind),
                state.slot_params(),
                UNPREPARED_SAMPLE_RATE,
                fade_length,
            )
        });

        debug!(stage = %spec.name, ?kind, fade_length, "Creating filter stage");

        Ok(Self {
            kind,
            handle: StageHandle::new(Arc::new(spec)),
            smoothing: engine.smoothing,
            frequency: ParameterSmoother::new(state.frequency, SmoothingStyle::Logarithmic),
            resonance: ParameterSmoother::new(state.resonance, SmoothingStyle::Logarithmic),
            gain: ParameterSmoother::new(state.gain_db, SmoothingStyle::Linear),
            bypass_mix: ParameterSmoother::new(1.0, SmoothingStyle::Linear),
            controller,
            gain_linear: db_to_linear(state.gain_db),
            last_generation: 0,
            needs_design: false,
            sections_idle: false,
            sample_rate: UNPREPARED_SAMPLE_RATE,
            max_block_size: 0,
            prepared: false,
        })
    }

    /// Control surface to hand to another thread
    pub fn handle(&self) -> &StageHandle {
        &self.handle
    }

    pub fn spec(&self) -> &FilterSpec {
        self.handle.spec()
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn blueprints(&self) -> &[ParameterBlueprint] {
        self.handle.blueprints()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Configure for a sample rate and clear all state
    ///
    /// Ramps are re-derived for the new rate, smoothers snap to their targets
    /// and any pending order change is committed without a fade.
    pub fn prepare(&mut self, sample_rate: f32, max_block_size: usize) -> Result<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EqError::InvalidConfiguration(format!(
                "stage '{}': sample rate must be positive, got {sample_rate}",
                self.handle.name()
            )));
        }

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.handle.shared().set_sample_rate(sample_rate);

        let s = &self.smoothing;
        self.frequency
            .set_ramp_length(ParameterSmoother::samples_for(s.frequency_ms, sample_rate));
        self.resonance
            .set_ramp_length(ParameterSmoother::samples_for(s.resonance_ms, sample_rate));
        self.gain
            .set_ramp_length(ParameterSmoother::samples_for(s.gain_ms, sample_rate));
        self.bypass_mix
            .set_ramp_length(ParameterSmoother::samples_for(s.bypass_ms, sample_rate));

        if let Some(controller) = self.controller.as_mut() {
            controller.set_sample_rate(sample_rate);
        }
        self.reinitialize();
        self.prepared = true;

        debug!(
            stage = %self.handle.name(),
            sample_rate,
            max_block_size,
            "Stage prepared"
        );
        Ok(())
    }

    /// Same as [`prepare`](Self::prepare); hosts call it on transport reset
    pub fn reset(&mut self, sample_rate: f32, max_block_size: usize) -> Result<()> {
        self.prepare(sample_rate, max_block_size)
    }

    /// Snap everything to the published targets and clear filter memory
    fn reinitialize(&mut self) {
        // Generation before snapshot: a racing update is picked up by the next poll
        self.last_generation = self.handle.shared().generation();
        let state = self.handle.shared().snapshot();

        self.frequency.reset(state.frequency);
        self.resonance.reset(state.resonance);
        self.gain.reset(state.gain_db);
        self.bypass_mix.reset(if state.bypass { 0.0 } else { 1.0 });
        self.gain_linear = db_to_linear(state.gain_db);

        if let Some(controller) = self.controller.as_mut() {
            controller.request(state.cascade_config(self.kind));
            controller.reset();
            controller.update_params(state.slot_params());
        }

        self.needs_design = false;
        self.sections_idle = state.bypass;
    }

    // ========================================================================
    // Audio path
    // ========================================================================

    /// Process one sample
    ///
    /// Must only be called after [`prepare`](Self::prepare).
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        debug_assert!(self.prepared, "process_sample called before prepare");

        self.poll_control();

        let mix = self.bypass_mix.next_value();
        if mix <= 0.0 {
            if !self.sections_idle {
                if let Some(controller) = self.controller.as_mut() {
                    controller.reset();
                }
                self.sections_idle = true;
            }
            return x;
        }
        self.sections_idle = false;

        if self.advance_smoothers() || self.needs_design {
            self.redesign();
        }

        let wet = match self.controller.as_mut() {
            Some(controller) => controller.process_sample(x),
            None => x * self.gain_linear,
        };

        if mix >= 1.0 {
            wet
        } else {
            mix * wet + (1.0 - mix) * x
        }
    }

    /// Process a buffer in place
    pub fn process_block(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    #[inline]
    fn poll_control(&mut self) {
        let generation = self.handle.shared().generation();
        if generation == self.last_generation {
            return;
        }
        self.last_generation = generation;

        let state = self.handle.shared().snapshot();
        self.frequency.set_target(state.frequency);
        self.resonance.set_target(state.resonance);
        self.gain.set_target(state.gain_db);
        self.bypass_mix.set_target(if state.bypass { 0.0 } else { 1.0 });

        if let Some(controller) = self.controller.as_mut() {
            controller.request(state.cascade_config(self.kind));
        }

        if self.sections_idle {
            // Nothing audible to ramp while fully bypassed
            self.frequency.reset(state.frequency);
            self.resonance.reset(state.resonance);
            self.gain.reset(state.gain_db);
            if let Some(controller) = self.controller.as_mut() {
                controller.reset();
            }
        }
        self.needs_design = true;
    }

    /// Step the coefficient-affecting smoothers; true if any of them moved
    #[inline]
    fn advance_smoothers(&mut self) -> bool {
        let moving =
            self.frequency.is_smoothing() || self.resonance.is_smoothing() || self.gain.is_smoothing();
        if moving {
            self.frequency.next_value();
            self.resonance.next_value();
            self.gain.next_value();
        }
        moving
    }

    fn redesign(&mut self) {
        self.needs_design = false;
        let params = SlotParams {
            frequency: self.frequency.current(),
            resonance: self.resonance.current(),
            gain_db: self.gain.current(),
        };
        match self.controller.as_mut() {
            Some(controller) => controller.update_params(params),
            None => self.gain_linear = db_to_linear(params.gain_db),
        }
    }

    // ========================================================================
    // State queries
    // ========================================================================

    pub fn transition_state(&self) -> TransitionState {
        self.controller
            .as_ref()
            .map_or(TransitionState::Stable, OrderTransitionController::state)
    }

    /// Configuration the audio path has committed to
    pub fn current_config(&self) -> Option<CascadeConfig> {
        self.controller.as_ref().map(OrderTransitionController::current)
    }

    pub fn pending_config(&self) -> Option<CascadeConfig> {
        self.controller.as_ref().and_then(OrderTransitionController::pending)
    }

    /// Fade length used for order changes, if the stage has sections
    pub fn fade_length(&self) -> Option<u32> {
        self.controller.as_ref().map(OrderTransitionController::fade_length)
    }

    /// Whether any parameter ramp is still running
    pub fn is_smoothing(&self) -> bool {
        self.frequency.is_smoothing()
            || self.resonance.is_smoothing()
            || self.gain.is_smoothing()
            || self.bypass_mix.is_smoothing()
    }

    // ========================================================================
    // Control delegation
    // ========================================================================

    pub fn set_frequency(&self, hz: f32) {
        self.handle.set_frequency(hz);
    }

    pub fn set_resonance(&self, value: f32) {
        self.handle.set_resonance(value);
    }

    pub fn set_gain(&self, db: f32) {
        self.handle.set_gain(db);
    }

    pub fn set_order(&self, order: u8) {
        self.handle.set_order(order);
    }

    pub fn set_shelf_mode(&self, shelf: bool) {
        self.handle.set_shelf_mode(shelf);
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.handle.set_bypass(bypass);
    }

    pub fn parameter_changed(&self, id: &str, value: f32) -> Result<()> {
        self.handle.parameter_changed(id, value)
    }

    pub fn parameter_changed_normalized(&self, id: &str, normalized: f32) -> Result<()> {
        self.handle.parameter_changed_normalized(id, normalized)
    }

    pub fn add_listener(&self, listener: Arc<dyn ResponseListener>) {
        self.handle.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ResponseListener>) {
        self.handle.remove_listener(listener);
    }

    /// Destination magnitude response in dB
    pub fn get_magnitude_response(&self, frequencies: &[f32], out: &mut [f32]) {
        self.handle.magnitude_response(frequencies, out);
    }
}

impl std::fmt::Debug for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterStage")
            .field("name", &self.handle.name())
            .field("kind", &self.kind)
            .field("sample_rate", &self.sample_rate)
            .field("transition", &self.transition_state())
            .finish()
    }
}

impl Effect for FilterStage {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.process_block(buffer);
        Ok(())
    }

    fn reset(&mut self) {
        self.reinitialize();
    }

    fn is_bypassed(&self) -> bool {
        self.handle.state().bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.handle.set_bypass(bypass);
    }

    fn name(&self) -> &str {
        self.handle.name()
    }
}
