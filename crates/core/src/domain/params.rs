//! Stage identity and host-exposed parameter descriptors
//!
//! Every parameter id follows `"<stage name>-<suffix>"`, e.g. `high1-freq` or
//! `low2-shelf-gain`. The external parameter store and the UI both route on
//! this convention, so stage names must not contain the `-` separator.

use super::error::{EqError, Result};
use super::filter::coeffs::{FilterType, BUTTERWORTH_RESONANCE};
use super::filter::{MAX_ORDER, MIN_ORDER};
use serde::{Deserialize, Serialize};

/// Separator between the stage name and the field suffix
pub const ID_SEPARATOR: char = '-';

/// Field suffixes
pub mod suffix {
    pub const FREQUENCY: &str = "freq";
    pub const RESONANCE: &str = "res";
    pub const Q: &str = "q";
    pub const ORDER: &str = "order";
    pub const SHELF: &str = "shelf";
    pub const SHELF_GAIN: &str = "shelf-gain";
    pub const GAIN: &str = "gain";
    pub const BYPASS: &str = "bypass";
}

/// Kind of processing a stage performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    HighPass,
    LowPass,
    Peak,
    Gain,
}

impl StageKind {
    /// Section response family, `None` for the flat gain stage
    pub fn filter_type(self) -> Option<FilterType> {
        match self {
            StageKind::HighPass => Some(FilterType::HighPass),
            StageKind::LowPass => Some(FilterType::LowPass),
            StageKind::Peak => Some(FilterType::Peak),
            StageKind::Gain => None,
        }
    }

    /// High-pass and low-pass stages have a variable order
    pub fn is_cut(self) -> bool {
        matches!(self, StageKind::HighPass | StageKind::LowPass)
    }
}

/// One controllable field of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Frequency,
    Resonance,
    Q,
    Order,
    Shelf,
    ShelfGain,
    Gain,
    Bypass,
}

impl ParameterKind {
    pub fn suffix(self) -> &'static str {
        match self {
            ParameterKind::Frequency => suffix::FREQUENCY,
            ParameterKind::Resonance => suffix::RESONANCE,
            ParameterKind::Q => suffix::Q,
            ParameterKind::Order => suffix::ORDER,
            ParameterKind::Shelf => suffix::SHELF,
            ParameterKind::ShelfGain => suffix::SHELF_GAIN,
            ParameterKind::Gain => suffix::GAIN,
            ParameterKind::Bypass => suffix::BYPASS,
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        const ALL: [ParameterKind; 8] = [
            ParameterKind::Frequency,
            ParameterKind::Resonance,
            ParameterKind::Q,
            ParameterKind::Order,
            ParameterKind::Shelf,
            ParameterKind::ShelfGain,
            ParameterKind::Gain,
            ParameterKind::Bypass,
        ];
        ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }

    /// Bit of this kind in an ownership mask
    pub(crate) fn bit(self) -> u16 {
        1 << (self as u16)
    }

    fn display_name(self) -> &'static str {
        match self {
            ParameterKind::Frequency => "Frequency",
            ParameterKind::Resonance => "Resonance",
            ParameterKind::Q => "Q",
            ParameterKind::Order => "Order",
            ParameterKind::Shelf => "Mode",
            ParameterKind::ShelfGain => "Shelf Gain",
            ParameterKind::Gain => "Gain",
            ParameterKind::Bypass => "Bypass",
        }
    }
}

/// Immutable identity of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Id prefix for every parameter of the stage
    pub name: String,
    pub kind: StageKind,
    #[serde(default = "default_frequency")]
    pub default_frequency: f32,
    #[serde(default = "default_order")]
    pub default_order: u8,
    /// Whether a high/low-pass stage can switch into shelf mode
    #[serde(default)]
    pub shelf_capable: bool,
}

fn default_frequency() -> f32 {
    1000.0
}

fn default_order() -> u8 {
    2
}

impl FilterSpec {
    pub fn high_pass(name: impl Into<String>, frequency: f32, order: u8, shelf_capable: bool) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::HighPass,
            default_frequency: frequency,
            default_order: order,
            shelf_capable,
        }
    }

    pub fn low_pass(name: impl Into<String>, frequency: f32, order: u8, shelf_capable: bool) -> Self {
        Self {
            kind: StageKind::LowPass,
            ..Self::high_pass(name, frequency, order, shelf_capable)
        }
    }

    pub fn peak(name: impl Into<String>, frequency: f32) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Peak,
            default_frequency: frequency,
            default_order: 2,
            shelf_capable: false,
        }
    }

    pub fn gain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Gain,
            default_frequency: default_frequency(),
            default_order: 2,
            shelf_capable: false,
        }
    }

    /// Reject names that would break id routing
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EqError::InvalidConfiguration("stage name is empty".into()));
        }
        if self.name.contains(ID_SEPARATOR) || self.name.chars().any(char::is_whitespace) {
            return Err(EqError::InvalidConfiguration(format!(
                "stage name '{}' must not contain '{ID_SEPARATOR}' or whitespace",
                self.name
            )));
        }
        if !(MIN_ORDER..=MAX_ORDER).contains(&self.default_order) {
            return Err(EqError::InvalidConfiguration(format!(
                "stage '{}': default order {} is outside {MIN_ORDER}..={MAX_ORDER}",
                self.name, self.default_order
            )));
        }
        if !self.default_frequency.is_finite() || self.default_frequency <= 0.0 {
            return Err(EqError::InvalidConfiguration(format!(
                "stage '{}': default frequency must be positive",
                self.name
            )));
        }
        Ok(())
    }

    /// Fields this stage exposes, in blueprint order
    pub fn parameters(&self) -> Vec<ParameterKind> {
        use ParameterKind::*;
        match self.kind {
            StageKind::HighPass | StageKind::LowPass => {
                let mut fields = vec![Frequency, Resonance, Order];
                if self.shelf_capable {
                    fields.extend([Shelf, ShelfGain]);
                }
                fields.push(Bypass);
                fields
            }
            StageKind::Peak => vec![Frequency, Q, Gain, Bypass],
            StageKind::Gain => vec![Gain, Bypass],
        }
    }

    pub fn owns(&self, kind: ParameterKind) -> bool {
        self.parameters().contains(&kind)
    }

    /// Full id of one of this stage's fields
    pub fn parameter_id(&self, kind: ParameterKind) -> String {
        format!("{}{ID_SEPARATOR}{}", self.name, kind.suffix())
    }

    /// Field suffix of `id` if it carries this stage's prefix
    pub fn suffix_of<'a>(&self, id: &'a str) -> Option<&'a str> {
        id.strip_prefix(self.name.as_str())?.strip_prefix(ID_SEPARATOR)
    }

    /// Default resonance (cut stages) or Q (peak stage)
    pub fn default_resonance(&self) -> f32 {
        match self.kind {
            StageKind::Peak => 1.0,
            _ => BUTTERWORTH_RESONANCE,
        }
    }

    pub fn blueprints(&self) -> Vec<ParameterBlueprint> {
        self.parameters()
            .into_iter()
            .map(|kind| self.blueprint(kind))
            .collect()
    }

    /// Descriptor of one field, whether or not this stage exposes it
    pub fn blueprint(&self, kind: ParameterKind) -> ParameterBlueprint {
        let (range, default, format) = match kind {
            ParameterKind::Frequency => (
                ParameterRange::with_centre(20.0, 20000.0, 1000.0),
                self.default_frequency,
                DisplayFormat::numeric("Hz", 0, false),
            ),
            ParameterKind::Resonance => (
                ParameterRange::with_centre(0.1, 10.0, 1.0),
                self.default_resonance(),
                DisplayFormat::numeric("", 2, false),
            ),
            ParameterKind::Q => (
                ParameterRange::with_centre(0.1, 18.0, 1.0),
                self.default_resonance(),
                DisplayFormat::numeric("", 2, false),
            ),
            ParameterKind::Order => (
                ParameterRange::new(f32::from(MIN_ORDER), f32::from(MAX_ORDER)).with_step(1.0),
                f32::from(self.default_order),
                DisplayFormat::numeric("", 0, false),
            ),
            ParameterKind::Shelf => (
                ParameterRange::toggle(),
                0.0,
                DisplayFormat::two_state("Cut", "Shelf"),
            ),
            ParameterKind::ShelfGain | ParameterKind::Gain => (
                ParameterRange::new(-24.0, 24.0).with_step(0.1),
                0.0,
                DisplayFormat::numeric("dB", 1, true),
            ),
            ParameterKind::Bypass => (
                ParameterRange::toggle(),
                0.0,
                DisplayFormat::two_state("On", "Bypassed"),
            ),
        };

        ParameterBlueprint {
            id: self.parameter_id(kind),
            name: format!("{} {}", self.name, kind.display_name()),
            range,
            default,
            format,
        }
    }
}

/// Numeric range with optional step quantization and perceptual skew
///
/// Normalized position `p` maps to `min + (max - min) * p^(1/skew)`; a skew
/// below 1 spreads the low end of the range over more of the control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    /// Quantization step, 0 for continuous
    pub step: f32,
    pub skew: f32,
}

impl ParameterRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            step: 0.0,
            skew: 1.0,
        }
    }

    /// Range whose skew puts `centre` at the normalized midpoint
    pub fn with_centre(min: f32, max: f32, centre: f32) -> Self {
        let proportion = (centre - min) / (max - min);
        let skew = if proportion > 0.0 && proportion < 1.0 {
            0.5_f32.ln() / proportion.ln()
        } else {
            1.0
        };
        Self {
            skew,
            ..Self::new(min, max)
        }
    }

    /// Discrete 0/1 range
    pub fn toggle() -> Self {
        Self::new(0.0, 1.0).with_step(1.0)
    }

    #[must_use]
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Quantize to the nearest step, then clamp
    pub fn snap(&self, value: f32) -> f32 {
        if self.step > 0.0 {
            self.clamp(self.min + ((value - self.min) / self.step).round() * self.step)
        } else {
            self.clamp(value)
        }
    }

    pub fn to_normalized(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        let proportion = (self.clamp(value) - self.min) / span;
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }

    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let p = normalized.clamp(0.0, 1.0);
        let proportion = if self.skew == 1.0 || p == 0.0 {
            p
        } else {
            (p.ln() / self.skew).exp()
        };
        self.snap(self.min + (self.max - self.min) * proportion)
    }
}

/// Text formatting hints for a parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFormat {
    pub unit: String,
    pub decimals: u8,
    /// Prefix positive values with `+`
    pub show_sign: bool,
    /// Labels for the off/on states of a two-state parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<(String, String)>,
}

impl DisplayFormat {
    pub fn numeric(unit: &str, decimals: u8, show_sign: bool) -> Self {
        Self {
            unit: unit.to_string(),
            decimals,
            show_sign,
            labels: None,
        }
    }

    pub fn two_state(off: &str, on: &str) -> Self {
        Self {
            unit: String::new(),
            decimals: 0,
            show_sign: false,
            labels: Some((off.to_string(), on.to_string())),
        }
    }

    pub fn format(&self, value: f32) -> String {
        if let Some((off, on)) = &self.labels {
            return if value >= 0.5 { on.clone() } else { off.clone() };
        }

        let decimals = usize::from(self.decimals);
        let number = if self.show_sign {
            format!("{value:+.decimals$}")
        } else {
            format!("{value:.decimals$}")
        };
        if self.unit.is_empty() {
            number
        } else {
            format!("{number} {}", self.unit)
        }
    }
}

/// Declarative descriptor of one host-visible parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBlueprint {
    pub id: String,
    pub name: String,
    pub range: ParameterRange,
    pub default: f32,
    pub format: DisplayFormat,
}

impl ParameterBlueprint {
    pub fn format_value(&self, value: f32) -> String {
        self.format.format(value)
    }
}
