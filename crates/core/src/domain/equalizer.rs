//! Multi-stage equalizer strip
//!
//! Stages run in configuration order. Parameter ids are routed to a stage by
//! the prefix before the first `-`.

use super::config::{EngineConfig, EqualizerConfig, StageConfig};
use super::control::{ResponseListener, StageHandle};
use super::error::{EqError, Result};
use super::params::{ParameterBlueprint, ID_SEPARATOR};
use super::stage::{Effect, FilterStage};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Control surface for every stage of an [`Equalizer`]
#[derive(Debug, Clone)]
pub struct EqualizerHandle {
    stages: Arc<Vec<StageHandle>>,
}

impl EqualizerHandle {
    pub fn stages(&self) -> &[StageHandle] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&StageHandle> {
        self.stages.iter().find(|stage| stage.name() == name)
    }

    /// Stage owning the prefix of `id`
    pub fn route(&self, id: &str) -> Result<&StageHandle> {
        let prefix = id.split_once(ID_SEPARATOR).map_or(id, |(prefix, _)| prefix);
        self.stage(prefix).ok_or_else(|| {
            warn!(id, "No stage for parameter id");
            EqError::StageNotFound(id.to_string())
        })
    }

    pub fn parameter_changed(&self, id: &str, value: f32) -> Result<()> {
        self.route(id)?.parameter_changed(id, value)
    }

    pub fn parameter_changed_normalized(&self, id: &str, normalized: f32) -> Result<()> {
        self.route(id)?.parameter_changed_normalized(id, normalized)
    }

    /// Every stage's blueprints, in stage order
    pub fn blueprints(&self) -> Vec<ParameterBlueprint> {
        self.stages
            .iter()
            .flat_map(|stage| stage.blueprints().iter().cloned())
            .collect()
    }

    /// Register one listener on every stage
    pub fn add_listener(&self, listener: Arc<dyn ResponseListener>) {
        for stage in self.stages.iter() {
            stage.add_listener(Arc::clone(&listener));
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ResponseListener>) {
        for stage in self.stages.iter() {
            stage.remove_listener(listener);
        }
    }

    /// Combined destination response: the sum of every stage's dB curve
    pub fn magnitude_response(&self, frequencies: &[f32], out: &mut [f32]) {
        let len = frequencies.len().min(out.len());
        let out = &mut out[..len];
        out.fill(0.0);

        let mut scratch = vec![0.0; len];
        for stage in self.stages.iter() {
            stage.magnitude_response(&frequencies[..len], &mut scratch);
            for (total, db) in out.iter_mut().zip(&scratch) {
                *total += db;
            }
        }
    }
}

/// Ordered chain of filter stages
pub struct Equalizer {
    engine: EngineConfig,
    stages: Vec<FilterStage>,
    handle: EqualizerHandle,
}

impl Equalizer {
    pub fn new(config: &EqualizerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EqError::InvalidConfiguration(e.to_string()))?;

        let stages = config
            .stages
            .iter()
            .map(|stage_config| Self::build_stage(stage_config, &config.engine))
            .collect::<Result<Vec<_>>>()?;

        let mut ids = HashSet::new();
        for blueprint in stages.iter().flat_map(FilterStage::blueprints) {
            if !ids.insert(blueprint.id.clone()) {
                return Err(EqError::InvalidConfiguration(format!(
                    "parameter id '{}' is declared twice",
                    blueprint.id
                )));
            }
        }

        let handle = EqualizerHandle {
            stages: Arc::new(stages.iter().map(|stage| stage.handle().clone()).collect()),
        };

        info!(
            stages = stages.len(),
            parameters = ids.len(),
            "Equalizer created"
        );

        Ok(Self {
            engine: config.engine.clone(),
            stages,
            handle,
        })
    }

    fn build_stage(config: &StageConfig, engine: &EngineConfig) -> Result<FilterStage> {
        let stage = FilterStage::new(config.spec.clone(), engine)?;
        if let Some(state) = &config.state {
            debug!(stage = %config.spec.name, "Applying saved stage state");
            stage.handle().apply_state(state);
        }
        Ok(stage)
    }

    pub fn handle(&self) -> &EqualizerHandle {
        &self.handle
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&FilterStage> {
        self.stages.iter().find(|stage| stage.spec().name == name)
    }

    pub fn prepare(&mut self, sample_rate: f32, max_block_size: usize) -> Result<()> {
        for stage in &mut self.stages {
            stage.prepare(sample_rate, max_block_size)?;
        }
        debug!(sample_rate, max_block_size, "Equalizer prepared");
        Ok(())
    }

    pub fn reset(&mut self, sample_rate: f32, max_block_size: usize) -> Result<()> {
        self.prepare(sample_rate, max_block_size)
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(x, |y, stage| stage.process_sample(y))
    }

    pub fn process_block(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn parameter_changed(&self, id: &str, value: f32) -> Result<()> {
        self.handle.parameter_changed(id, value)
    }

    pub fn blueprints(&self) -> Vec<ParameterBlueprint> {
        self.handle.blueprints()
    }

    pub fn get_magnitude_response(&self, frequencies: &[f32], out: &mut [f32]) {
        self.handle.magnitude_response(frequencies, out);
    }

    /// Configuration reproducing the current targets
    pub fn to_config(&self) -> EqualizerConfig {
        EqualizerConfig {
            engine: self.engine.clone(),
            stages: self
                .stages
                .iter()
                .map(|stage| StageConfig {
                    spec: stage.spec().clone(),
                    state: Some(stage.handle().state()),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Equalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Equalizer")
            .field("stages", &self.stages)
            .finish()
    }
}

impl Effect for Equalizer {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.process_block(buffer);
        Ok(())
    }

    fn reset(&mut self) {
        for stage in &mut self.stages {
            Effect::reset(stage);
        }
    }

    fn is_bypassed(&self) -> bool {
        self.stages.iter().all(Effect::is_bypassed)
    }

    fn set_bypass(&mut self, bypass: bool) {
        for stage in &mut self.stages {
            Effect::set_bypass(stage, bypass);
        }
    }

    fn name(&self) -> &str {
        "equalizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::FilterSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn factory() -> Equalizer {
        let mut eq = Equalizer::new(&EqualizerConfig::factory_default()).unwrap();
        eq.prepare(48000.0, 512).unwrap();
        eq
    }

    #[test]
    fn test_factory_strip_is_transparent() {
        let mut eq = factory();
        let freqs = [50.0, 1000.0, 10000.0];
        let mut out = [f32::NAN; 3];
        eq.get_magnitude_response(&freqs, &mut out);
        // Default high-pass at 30 Hz and low-pass at 18 kHz only bend the extremes
        assert!(out[1].abs() < 0.1, "1 kHz: {}", out[1]);

        let mut buffer = vec![0.0; 256];
        eq.process_block(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_routes_by_prefix() {
        let eq = factory();
        eq.parameter_changed("peak2-gain", 4.0).unwrap();
        eq.parameter_changed("low2-shelf-gain", -2.0).unwrap();

        let handle = eq.handle();
        assert_eq!(handle.stage("peak2").map(|s| s.state().gain_db), Some(4.0));
        assert_eq!(handle.stage("low2").map(|s| s.state().gain_db), Some(-2.0));
        assert_eq!(handle.stage("peak1").map(|s| s.state().gain_db), Some(0.0));
    }

    #[test]
    fn test_routing_errors() {
        let eq = factory();
        assert_eq!(
            eq.parameter_changed("mid1-gain", 1.0),
            Err(EqError::StageNotFound("mid1-gain".into()))
        );
        assert!(matches!(
            eq.parameter_changed("high2-shelf", 1.0),
            Err(EqError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_blueprints_collision_free() {
        let eq = factory();
        let blueprints = eq.blueprints();
        let ids: HashSet<_> = blueprints.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids.len(), blueprints.len());
        assert!(ids.contains("high1-shelf-gain"));
        assert!(ids.contains("gain-gain"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut config = EqualizerConfig::factory_default();
        config.stages.push(FilterSpec::gain("gain").into());
        assert!(matches!(
            Equalizer::new(&config),
            Err(EqError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_combined_response_sums_stages() {
        let eq = factory();
        eq.parameter_changed("peak2-gain", 6.0).unwrap();
        eq.parameter_changed("gain-gain", -2.0).unwrap();

        let freqs = [1000.0];
        let mut total = [0.0];
        eq.get_magnitude_response(&freqs, &mut total);

        let mut expected = 0.0;
        for stage in eq.handle().stages() {
            let mut db = [0.0];
            stage.magnitude_response(&freqs, &mut db);
            expected += db[0];
        }
        assert!((total[0] - expected).abs() < 1e-4);
        assert!((total[0] - 4.0).abs() < 0.1);
    }

    #[test]
    fn test_saved_state_is_applied() {
        let eq = factory();
        eq.parameter_changed("high1-order", 5.0).unwrap();
        eq.parameter_changed("peak3-freq", 7000.0).unwrap();

        let restored = Equalizer::new(&eq.to_config()).unwrap();
        let state = restored.handle().stage("high1").map(StageHandle::state);
        assert_eq!(state.map(|s| s.order), Some(5));
        let state = restored.handle().stage("peak3").map(StageHandle::state);
        assert_eq!(state.map(|s| s.frequency), Some(7000.0));
    }

    #[test]
    fn test_listener_on_every_stage() {
        let eq = factory();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let listener: Arc<dyn ResponseListener> = Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        eq.handle().add_listener(Arc::clone(&listener));

        eq.parameter_changed("high1-freq", 40.0).unwrap();
        eq.parameter_changed("low1-order", 3.0).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        eq.handle().remove_listener(&listener);
        eq.parameter_changed("low1-order", 4.0).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_effect_bypass_all() {
        let mut eq = factory();
        Effect::set_bypass(&mut eq, true);
        assert!(eq.is_bypassed());
        assert_eq!(eq.name(), "equalizer");
    }
}
