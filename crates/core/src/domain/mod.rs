//! Domain entities and business rules

pub mod error;
pub mod filter;
pub mod params;
pub mod control;
pub mod stage;
pub mod equalizer;
pub mod config;

// Re-export specific items to avoid ambiguous glob imports
pub use config::{ConfigError, EngineConfig, EqualizerConfig, FadeConfig, SmoothingConfig, StageConfig};
pub use control::{ResponseListener, StageHandle, StageState};
pub use equalizer::{Equalizer, EqualizerHandle};
pub use error::{EqError, Result};
pub use filter::{
    BiquadCoeffs, CascadeConfig, MagnitudeResponseEngine, ParameterSmoother, Section, SectionBank,
    SectionMask, TransitionState,
};
pub use params::{DisplayFormat, FilterSpec, ParameterBlueprint, ParameterKind, ParameterRange, StageKind};
pub use stage::{Effect, FilterStage};
