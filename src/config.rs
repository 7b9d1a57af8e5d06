//! Run configuration, loadable from TOML
//!
//! ```toml
//! tile_size = 256
//! reference = "first"
//!
//! [filter]
//! white_threshold = 0.01
//! min_white_ratio = 0.01
//!
//! [preprocess]
//! color_balance = true
//! histogram_match = true
//!
//! [normalization.percentile_stretch]
//! low = 2.0
//! high = 98.0
//! ```

use crate::core::accumulator::{AccumulatorParams, ReferenceCapture, WriterPolicy};
use crate::core::cloud_filter::CloudFilterParams;
use crate::core::preprocess::PreprocessParams;
use crate::io::band_loader::Normalization;
use crate::types::{MosaicError, MosaicResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Side of the square grid cells, in pixels
    pub tile_size: usize,
    pub filter: CloudFilterParams,
    pub preprocess: PreprocessParams,
    pub reference: ReferenceCapture,
    pub normalization: Normalization,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            filter: CloudFilterParams::default(),
            preprocess: PreprocessParams::default(),
            reference: ReferenceCapture::default(),
            normalization: Normalization::default(),
        }
    }
}

impl CompositeConfig {
    pub fn from_toml_str(text: &str) -> MosaicResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| MosaicError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> MosaicResult<Self> {
        log::info!("Loading configuration from {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> MosaicResult<()> {
        if self.tile_size == 0 {
            return Err(MosaicError::Config("tile_size must be a positive integer".to_string()));
        }
        if !(self.preprocess.epsilon > 0.0) {
            return Err(MosaicError::Config(format!(
                "preprocess.epsilon must be positive, got {}",
                self.preprocess.epsilon
            )));
        }
        self.filter
            .validate()
            .and_then(|_| self.normalization.validate())
            .map_err(|e| MosaicError::Config(e.to_string()))
    }

    pub fn accumulator_params(&self) -> AccumulatorParams {
        AccumulatorParams {
            tile_size: self.tile_size,
            filter: self.filter,
            reference: self.reference,
            policy: WriterPolicy::FirstWins,
        }
    }
}
