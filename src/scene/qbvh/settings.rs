use std::{fmt, str::FromStr};

use bon::bon;
use log::warn;
use thiserror::Error;

use super::MAX_LEAF_PRIMITIVES;
use crate::geometry::FloatType;

/// How the builder partitions primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SplitMode {
    /// Binned SAH object partitioning (QBVH)
    #[default]
    Object,
    /// Object partitioning plus spatial splits that may reference a primitive
    /// from several leaves (SQBVH)
    Spatial,
}

impl FromStr for SplitMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qbvh" => Ok(SplitMode::Object),
            "sqbvh" => Ok(SplitMode::Spatial),
            _ => Err(SettingsError::UnknownAccelerator(s.to_owned())),
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Object => f.write_str("QBVH"),
            SplitMode::Spatial => f.write_str("SQBVH"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Invalid value {value:?} for parameter {key}")]
    InvalidValue { key: String, value: String },
    #[error("Unknown accelerator {0:?}, expected qbvh or sqbvh")]
    UnknownAccelerator(String),
    #[error("max_prims_per_leaf must be between 1 and {max}, got {0}", max = MAX_LEAF_PRIMITIVES)]
    MaxPrimsPerLeaf(usize),
    #[error("skip_factor must be at least 1")]
    ZeroSkipFactor,
    #[error("alpha must be a non-negative number, got {0}")]
    InvalidAlpha(FloatType),
}

#[derive(Clone, Debug, PartialEq)]
pub struct QbvhSettings {
    /// Ranges with at most this many primitives become leaves
    pub max_prims_per_leaf: usize,
    /// Ranges at least this large are binned from a sample of every `skip_factor`-th primitive
    pub full_sweep_threshold: usize,
    pub skip_factor: usize,
    /// Spatial splits are only tried when the object split children overlap by more than
    /// this fraction of the scene surface area
    pub alpha: FloatType,
    pub split_mode: SplitMode,
}

#[bon]
impl QbvhSettings {
    #[builder]
    pub fn new(
        #[builder(default = 4)] max_prims_per_leaf: usize,
        // Four times max_prims_per_leaf when missing
        full_sweep_threshold: Option<usize>,
        #[builder(default = 1)] skip_factor: usize,
        #[builder(default = 1e-5)] alpha: FloatType,
        #[builder(default)] split_mode: SplitMode,
    ) -> QbvhSettings {
        QbvhSettings {
            max_prims_per_leaf,
            full_sweep_threshold: full_sweep_threshold.unwrap_or(4 * max_prims_per_leaf),
            skip_factor,
            alpha,
            split_mode,
        }
    }

    /// Reads settings from textual key/value pairs, as found in scene descriptions.
    /// Missing keys keep their defaults, unknown keys are ignored with a warning.
    pub fn from_params<K, V>(
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<QbvhSettings, SettingsError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut max_prims_per_leaf = None;
        let mut full_sweep_threshold = None;
        let mut skip_factor = None;
        let mut alpha = None;
        let mut split_mode = None;

        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "maxprimsperleaf" => max_prims_per_leaf = Some(parse_value(key, value)?),
                "fullsweepthreshold" => full_sweep_threshold = Some(parse_value(key, value)?),
                "skipfactor" => skip_factor = Some(parse_value(key, value)?),
                "alpha" => alpha = Some(parse_value(key, value)?),
                "accelerator" => split_mode = Some(value.parse()?),
                _ => warn!("Ignoring unknown accelerator parameter {key:?}"),
            }
        }

        let settings = QbvhSettings::builder()
            .maybe_max_prims_per_leaf(max_prims_per_leaf)
            .maybe_full_sweep_threshold(full_sweep_threshold)
            .maybe_skip_factor(skip_factor)
            .maybe_alpha(alpha)
            .maybe_split_mode(split_mode)
            .build();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=MAX_LEAF_PRIMITIVES).contains(&self.max_prims_per_leaf) {
            return Err(SettingsError::MaxPrimsPerLeaf(self.max_prims_per_leaf));
        }
        if self.skip_factor == 0 {
            return Err(SettingsError::ZeroSkipFactor);
        }
        if !(self.alpha >= 0.0) {
            return Err(SettingsError::InvalidAlpha(self.alpha));
        }
        Ok(())
    }
}

impl Default for QbvhSettings {
    fn default() -> Self {
        QbvhSettings::builder().build()
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })
}
