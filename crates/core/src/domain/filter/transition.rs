//! Artifact-free order changes while audio is streaming
//!
//! Switching which sections sit in the signal path is audible as a click,
//! since every section has its own gain and group delay at the transition
//! frequency. Instead of switching, [`OrderTransitionController`] runs the
//! old and the new configuration side by side and crossfades their outputs
//! over a fixed number of samples.
//!
//! Each configuration runs in a *lane*: a [`SectionBank`] with its own
//! coefficients. A new lane starts from a copy of the dominant lane's delay
//! history, so both share history up to the point of divergence. A request
//! that supersedes an in-flight fade freezes the live lanes at their current
//! weights and fades them out together as the new "before".

use super::coeffs::{compute_slot, FilterType, SlotParams};
use super::section::{SectionBank, SectionMask, SECTION_COUNT};
use super::{MAX_ORDER, MIN_ORDER};
use serde::{Deserialize, Serialize};

/// Maximum number of simultaneously running configurations
pub const MAX_LANES: usize = 3;

/// Section topology of a cascade: order plus cut/shelf mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CascadeConfig {
    pub order: u8,
    pub shelf: bool,
}

impl CascadeConfig {
    /// Build a configuration, clamping the order into `1..=7`
    pub fn new(order: u8, shelf: bool) -> Self {
        Self {
            order: order.clamp(MIN_ORDER, MAX_ORDER),
            shelf,
        }
    }

    pub fn cut(order: u8) -> Self {
        Self::new(order, false)
    }

    pub fn shelf(order: u8) -> Self {
        Self::new(order, true)
    }

    /// Sections enabled by this configuration
    pub fn mask(self) -> SectionMask {
        SectionMask::for_order(self.order, self.shelf)
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self::cut(2)
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionState {
    /// One configuration is evaluated
    Stable,
    /// Crossfading toward the pending configuration
    Transitioning,
}

#[derive(Debug, Clone)]
struct Lane {
    config: CascadeConfig,
    bank: SectionBank,
    /// Gain of an outgoing lane at the moment its fade-out began
    scale: f32,
    live: bool,
}

impl Lane {
    fn idle() -> Self {
        Self {
            config: CascadeConfig::default(),
            bank: SectionBank::default(),
            scale: 0.0,
            live: false,
        }
    }
}

/// Crossfading state machine over up to [`MAX_LANES`] section banks
#[derive(Debug, Clone)]
pub struct OrderTransitionController {
    lanes: [Lane; MAX_LANES],
    /// Lane holding the destination (the only live lane when stable)
    incoming: usize,
    current: CascadeConfig,
    pending: Option<CascadeConfig>,
    /// Request received while every lane was busy; latest wins
    queued: Option<CascadeConfig>,
    fade_length: u32,
    fade_samples: u32,
    filter_type: FilterType,
    params: SlotParams,
    sample_rate: f32,
}

impl OrderTransitionController {
    pub fn new(
        filter_type: FilterType,
        config: CascadeConfig,
        params: SlotParams,
        sample_rate: f32,
        fade_length: u32,
    ) -> Self {
        let mut lanes = [Lane::idle(), Lane::idle(), Lane::idle()];
        lanes[0] = Lane {
            config,
            bank: SectionBank::new(config.mask()),
            scale: 1.0,
            live: true,
        };

        let mut controller = Self {
            lanes,
            incoming: 0,
            current: config,
            pending: None,
            queued: None,
            fade_length,
            fade_samples: 0,
            filter_type,
            params,
            sample_rate,
        };
        controller.design_lane(0);
        controller
    }

    pub fn state(&self) -> TransitionState {
        if self.pending.is_some() {
            TransitionState::Transitioning
        } else {
            TransitionState::Stable
        }
    }

    /// Last committed configuration
    pub fn current(&self) -> CascadeConfig {
        self.current
    }

    /// Configuration being faded in, if any
    pub fn pending(&self) -> Option<CascadeConfig> {
        self.pending
    }

    /// Configuration the controller will settle on once all fades finish
    pub fn destination(&self) -> CascadeConfig {
        self.queued.or(self.pending).unwrap_or(self.current)
    }

    pub fn fade_samples(&self) -> u32 {
        self.fade_samples
    }

    pub fn fade_length(&self) -> u32 {
        self.fade_length
    }

    /// Set the fade length used by the next transition
    pub fn set_fade_length(&mut self, samples: u32) {
        self.fade_length = samples;
    }

    pub fn live_lanes(&self) -> usize {
        self.lanes.iter().filter(|lane| lane.live).count()
    }

    /// Bank of the destination lane
    pub fn destination_bank(&self) -> &SectionBank {
        &self.lanes[self.incoming].bank
    }

    /// Stage a configuration change
    ///
    /// Requesting the configuration that is already the destination is a no-op.
    pub fn request(&mut self, config: CascadeConfig) {
        let target = self.pending.unwrap_or(self.current);
        if config == target {
            self.queued = None;
            return;
        }
        if self.queued == Some(config) {
            return;
        }

        if self.pending.is_none() {
            self.start_fade(config);
            return;
        }

        if self.free_lane().is_none() {
            self.queued = Some(config);
            return;
        }

        // Freeze the blend as it stands; it becomes the new "before"
        let weight = self.weight();
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            if !lane.live {
                continue;
            }
            lane.scale = if index == self.incoming {
                1.0 - weight
            } else {
                lane.scale * weight
            };
        }
        self.start_fade(config);
    }

    /// Redesign every live lane for new parameter values
    pub fn update_params(&mut self, params: SlotParams) {
        self.params = params;
        for index in 0..MAX_LANES {
            if self.lanes[index].live {
                self.design_lane(index);
            }
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_params(self.params);
    }

    /// Produce one output sample, advancing any fade in progress
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        if self.pending.is_none() {
            return self.lanes[self.incoming].bank.process_sample(x);
        }

        self.fade_samples = self.fade_samples.saturating_sub(1);
        let weight = self.weight();

        let mut y = 0.0;
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            if !lane.live {
                continue;
            }
            let gain = if index == self.incoming {
                1.0 - weight
            } else {
                lane.scale * weight
            };
            y += gain * lane.bank.process_sample(x);
        }

        if self.fade_samples == 0 {
            self.commit();
        }
        y
    }

    /// Settle on the destination immediately and clear all filter memory
    pub fn reset(&mut self) {
        let destination = self.destination();
        if self.lanes[self.incoming].config != destination {
            self.lanes[self.incoming].config = destination;
            self.lanes[self.incoming].bank = SectionBank::new(destination.mask());
            self.design_lane(self.incoming);
        }
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            if index != self.incoming {
                lane.live = false;
            }
        }

        let lane = &mut self.lanes[self.incoming];
        lane.bank.reset_state();
        lane.scale = 1.0;
        self.current = destination;
        self.pending = None;
        self.queued = None;
        self.fade_samples = 0;
    }

    /// Weight of the "before" side: `fade_samples / fade_length`
    #[inline]
    fn weight(&self) -> f32 {
        if self.fade_length == 0 {
            0.0
        } else {
            self.fade_samples as f32 / self.fade_length as f32
        }
    }

    fn free_lane(&self) -> Option<usize> {
        self.lanes.iter().position(|lane| !lane.live)
    }

    /// Live lane with the largest output gain right now
    fn dominant_lane(&self) -> usize {
        let weight = self.weight();
        let mut best = self.incoming;
        let mut best_gain = if self.pending.is_some() { 1.0 - weight } else { 1.0 };
        for (index, lane) in self.lanes.iter().enumerate() {
            if !lane.live || index == self.incoming {
                continue;
            }
            let gain = lane.scale * weight;
            if gain > best_gain {
                best = index;
                best_gain = gain;
            }
        }
        best
    }

    fn start_fade(&mut self, config: CascadeConfig) {
        let Some(slot) = self.free_lane() else {
            self.queued = Some(config);
            return;
        };

        let source = self.dominant_lane();
        let mut bank = SectionBank::new(config.mask());
        bank.copy_state_from(&self.lanes[source].bank);

        self.lanes[slot] = Lane {
            config,
            bank,
            scale: 0.0,
            live: true,
        };
        self.design_lane(slot);

        if self.pending.is_none() {
            // Stable -> Transitioning: the previous lane fades out from full gain
            self.lanes[self.incoming].scale = 1.0;
        }
        self.incoming = slot;
        self.pending = Some(config);
        self.fade_samples = self.fade_length;

        if self.fade_length == 0 {
            self.commit();
        }
    }

    fn commit(&mut self) {
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            if index != self.incoming {
                lane.live = false;
            }
        }
        self.lanes[self.incoming].scale = 1.0;
        self.current = self.lanes[self.incoming].config;
        self.pending = None;
        self.fade_samples = 0;

        if let Some(next) = self.queued.take() {
            if next != self.current {
                self.start_fade(next);
            }
        }
    }

    fn design_lane(&mut self, index: usize) {
        let lane = &mut self.lanes[index];
        for slot in 0..SECTION_COUNT {
            let coeffs = compute_slot(slot, self.filter_type, lane.config, &self.params, self.sample_rate);
            lane.bank.set_section_coefficients(slot, coeffs);
        }
    }
}
