//! Control-context side of a stage
//!
//! Setters run on a thread other than the audio thread. They only ever write
//! single-word atomics and then publish a new generation number; the audio
//! thread polls the generation once per sample and pulls fresh targets when
//! it moves. No setter allocates, locks, or logs.
//!
//! Listener registration clones the listener list and swaps it in with
//! `arc_swap`, so notifying from a setter is a lock-free load.

use super::error::{EqError, Result};
use super::filter::coeffs::{compute_slot, SlotParams};
use super::filter::section::{SectionMask, SECTION_COUNT};
use super::filter::{BiquadCoeffs, CascadeConfig, MagnitudeResponseEngine, MAX_ORDER, MIN_ORDER};
use super::params::{FilterSpec, ParameterBlueprint, ParameterKind, ParameterRange, StageKind};
use arc_swap::ArcSwap;
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Observer notified when a stage's audible response changes
pub trait ResponseListener: Send + Sync {
    fn response_changed(&self, stage: &str);
}

impl<F> ResponseListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn response_changed(&self, stage: &str) {
        self(stage)
    }
}

/// Target values of a stage, as set from the control side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub frequency: f32,
    /// Resonance for cut stages, Q for peak stages
    pub resonance: f32,
    /// Peak/stage gain or total shelf gain, in dB
    pub gain_db: f32,
    pub order: u8,
    pub shelf: bool,
    pub bypass: bool,
}

impl StageState {
    /// Initial targets of a freshly built stage
    pub fn defaults_for(spec: &FilterSpec) -> Self {
        Self {
            frequency: spec.default_frequency,
            resonance: spec.default_resonance(),
            gain_db: 0.0,
            order: spec.default_order.clamp(MIN_ORDER, MAX_ORDER),
            shelf: false,
            bypass: false,
        }
    }

    pub(crate) fn cascade_config(&self, kind: StageKind) -> CascadeConfig {
        if kind.is_cut() {
            CascadeConfig::new(self.order, self.shelf)
        } else {
            // Peak stages run a single biquad in slot 0
            CascadeConfig::cut(2)
        }
    }

    pub(crate) fn slot_params(&self) -> SlotParams {
        SlotParams {
            frequency: self.frequency,
            resonance: self.resonance,
            gain_db: self.gain_db,
        }
    }
}

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store and return the previous value
    #[inline]
    fn swap(&self, value: f32) -> f32 {
        f32::from_bits(self.0.swap(value.to_bits(), Ordering::Relaxed))
    }
}

/// Scalar targets shared between the control and audio contexts
#[derive(Debug)]
pub(crate) struct SharedParams {
    frequency: AtomicF32,
    resonance: AtomicF32,
    gain_db: AtomicF32,
    order: AtomicU8,
    shelf: AtomicBool,
    bypass: AtomicBool,
    sample_rate: AtomicF32,
    /// Bumped after every published change (Release); polled by the audio side (Acquire)
    generation: CachePadded<AtomicU64>,
}

impl SharedParams {
    fn new(state: &StageState) -> Self {
        Self {
            frequency: AtomicF32::new(state.frequency),
            resonance: AtomicF32::new(state.resonance),
            gain_db: AtomicF32::new(state.gain_db),
            order: AtomicU8::new(state.order),
            shelf: AtomicBool::new(state.shelf),
            bypass: AtomicBool::new(state.bypass),
            sample_rate: AtomicF32::new(48000.0),
            generation: CachePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    fn publish(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> StageState {
        StageState {
            frequency: self.frequency.load(),
            resonance: self.resonance.load(),
            gain_db: self.gain_db.load(),
            order: self.order.load(Ordering::Relaxed),
            shelf: self.shelf.load(Ordering::Relaxed),
            bypass: self.bypass.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn sample_rate(&self) -> f32 {
        self.sample_rate.load()
    }

    pub(crate) fn set_sample_rate(&self, sample_rate: f32) {
        self.sample_rate.swap(sample_rate);
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    frequency: ParameterRange,
    resonance: ParameterRange,
    gain: ParameterRange,
}

type ListenerList = Vec<Arc<dyn ResponseListener>>;

/// Cloneable, thread-safe control surface of one stage
#[derive(Clone)]
pub struct StageHandle {
    spec: Arc<FilterSpec>,
    shared: Arc<SharedParams>,
    listeners: Arc<ArcSwap<ListenerList>>,
    blueprints: Arc<Vec<ParameterBlueprint>>,
    limits: Limits,
    owned: u16,
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("stage", &self.spec.name)
            .field("state", &self.state())
            .field("listeners", &self.listeners.load().len())
            .finish()
    }
}

impl StageHandle {
    pub(crate) fn new(spec: Arc<FilterSpec>) -> Self {
        let resonance_kind = if spec.kind == StageKind::Peak {
            ParameterKind::Q
        } else {
            ParameterKind::Resonance
        };
        let limits = Limits {
            frequency: spec.blueprint(ParameterKind::Frequency).range,
            resonance: spec.blueprint(resonance_kind).range,
            gain: spec.blueprint(ParameterKind::Gain).range,
        };
        let owned = spec
            .parameters()
            .into_iter()
            .fold(0, |mask, kind| mask | kind.bit());

        Self {
            shared: Arc::new(SharedParams::new(&StageState::defaults_for(&spec))),
            listeners: Arc::new(ArcSwap::from_pointee(Vec::new())),
            blueprints: Arc::new(spec.blueprints()),
            limits,
            owned,
            spec,
        }
    }

    pub(crate) fn shared(&self) -> &SharedParams {
        &self.shared
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn blueprints(&self) -> &[ParameterBlueprint] {
        &self.blueprints
    }

    #[inline]
    fn owns(&self, kind: ParameterKind) -> bool {
        self.owned & kind.bit() != 0
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_frequency(&self, hz: f32) {
        if !self.owns(ParameterKind::Frequency) || hz.is_nan() {
            return;
        }
        let hz = self.limits.frequency.clamp(hz);
        if self.shared.frequency.swap(hz) != hz {
            self.changed();
        }
    }

    /// Resonance of a cut stage or Q of a peak stage
    pub fn set_resonance(&self, value: f32) {
        if !(self.owns(ParameterKind::Resonance) || self.owns(ParameterKind::Q)) || value.is_nan() {
            return;
        }
        let value = self.limits.resonance.clamp(value);
        if self.shared.resonance.swap(value) != value {
            self.changed();
        }
    }

    /// Peak gain, stage gain, or total shelf gain (dB)
    pub fn set_gain(&self, db: f32) {
        if !(self.owns(ParameterKind::Gain) || self.owns(ParameterKind::ShelfGain)) || db.is_nan() {
            return;
        }
        let db = self.limits.gain.clamp(db);
        if self.shared.gain_db.swap(db) != db {
            self.changed();
        }
    }

    /// Cut order, clamped to `1..=7`
    pub fn set_order(&self, order: u8) {
        if !self.owns(ParameterKind::Order) {
            return;
        }
        let order = order.clamp(MIN_ORDER, MAX_ORDER);
        if self.shared.order.swap(order, Ordering::Relaxed) != order {
            self.changed();
        }
    }

    pub fn set_shelf_mode(&self, shelf: bool) {
        if !self.owns(ParameterKind::Shelf) {
            return;
        }
        if self.shared.shelf.swap(shelf, Ordering::Relaxed) != shelf {
            self.changed();
        }
    }

    pub fn set_bypass(&self, bypass: bool) {
        if self.shared.bypass.swap(bypass, Ordering::Relaxed) != bypass {
            self.changed();
        }
    }

    /// Apply a full set of targets
    pub fn apply_state(&self, state: &StageState) {
        self.set_frequency(state.frequency);
        self.set_resonance(state.resonance);
        self.set_gain(state.gain_db);
        self.set_order(state.order);
        self.set_shelf_mode(state.shelf);
        self.set_bypass(state.bypass);
    }

    #[inline]
    fn changed(&self) {
        self.shared.publish();
        for listener in self.listeners.load().iter() {
            listener.response_changed(&self.spec.name);
        }
    }

    // ========================================================================
    // Parameter store routing
    // ========================================================================

    /// Route a real-valued parameter change by id
    ///
    /// Order values are rounded; two-state fields are on at `>= 0.5`.
    pub fn parameter_changed(&self, id: &str, value: f32) -> Result<()> {
        let kind = self.resolve(id)?;
        match kind {
            ParameterKind::Frequency => self.set_frequency(value),
            ParameterKind::Resonance | ParameterKind::Q => self.set_resonance(value),
            ParameterKind::Gain | ParameterKind::ShelfGain => self.set_gain(value),
            ParameterKind::Order if !value.is_nan() => {
                let order = value.round().clamp(f32::from(MIN_ORDER), f32::from(MAX_ORDER));
                self.set_order(order as u8);
            }
            ParameterKind::Order => {}
            ParameterKind::Shelf => self.set_shelf_mode(value >= 0.5),
            ParameterKind::Bypass => self.set_bypass(value >= 0.5),
        }
        Ok(())
    }

    /// Route a host-normalized (`0..=1`) parameter change by id
    pub fn parameter_changed_normalized(&self, id: &str, normalized: f32) -> Result<()> {
        let kind = self.resolve(id)?;
        let range = self.spec.blueprint(kind).range;
        self.parameter_changed(id, range.from_normalized(normalized))
    }

    fn resolve(&self, id: &str) -> Result<ParameterKind> {
        let kind = self
            .spec
            .suffix_of(id)
            .and_then(ParameterKind::from_suffix)
            .filter(|kind| self.owns(*kind));

        kind.ok_or_else(|| {
            warn!(stage = %self.spec.name, id, "Parameter id not owned by stage");
            EqError::UnknownParameter {
                stage: self.spec.name.clone(),
                id: id.to_string(),
            }
        })
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn ResponseListener>) {
        self.listeners.rcu(|current| {
            let mut next = ListenerList::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Remove a listener previously added (compared by pointer)
    pub fn remove_listener(&self, listener: &Arc<dyn ResponseListener>) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|registered| !Arc::ptr_eq(registered, listener))
                .cloned()
                .collect::<ListenerList>()
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    // ========================================================================
    // Visualization
    // ========================================================================

    /// Current targets
    pub fn state(&self) -> StageState {
        self.shared.snapshot()
    }

    /// Destination response in dB at `frequencies`
    ///
    /// Reflects the target values and the configuration any in-flight
    /// transition is heading to, not the blended intermediate. A bypassed
    /// stage is flat.
    pub fn magnitude_response(&self, frequencies: &[f32], out: &mut [f32]) {
        let state = self.shared.snapshot();
        if state.bypass {
            for value in out.iter_mut().take(frequencies.len()) {
                *value = 0.0;
            }
            return;
        }

        let engine = MagnitudeResponseEngine::new(self.shared.sample_rate());
        let (sections, mask) = design_sections(self.spec.kind, &state, engine.sample_rate());
        let active = sections
            .iter()
            .enumerate()
            .filter(|(slot, _)| mask.is_enabled(*slot))
            .map(|(_, coeffs)| coeffs);
        engine.evaluate(active, frequencies, out);
    }
}

/// Section coefficients and enablement for a set of targets
pub(crate) fn design_sections(
    kind: StageKind,
    state: &StageState,
    sample_rate: f32,
) -> ([BiquadCoeffs; SECTION_COUNT], SectionMask) {
    let mut sections = [BiquadCoeffs::IDENTITY; SECTION_COUNT];
    match kind.filter_type() {
        Some(filter_type) => {
            let config = state.cascade_config(kind);
            let params = state.slot_params();
            for (slot, coeffs) in sections.iter_mut().enumerate() {
                *coeffs = compute_slot(slot, filter_type, config, &params, sample_rate);
            }
            (sections, config.mask())
        }
        None => {
            sections[0] = BiquadCoeffs::gain(db_to_linear(state.gain_db));
            (sections, SectionMask::single(0))
        }
    }
}

#[inline]
pub(crate) fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
