use crate::types::{MosaicError, MosaicResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Cloud filter policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudFilterParams {
    /// Mask value from which a pixel counts as cloud
    pub white_threshold: f32,
    /// Fraction of cloud pixels from which the tile is unusable
    pub min_white_ratio: f32,
}

impl Default for CloudFilterParams {
    fn default() -> Self {
        Self {
            white_threshold: 0.01,
            min_white_ratio: 0.01,
        }
    }
}

impl CloudFilterParams {
    pub fn validate(&self) -> MosaicResult<()> {
        for (name, value) in [
            ("white_threshold", self.white_threshold),
            ("min_white_ratio", self.min_white_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MosaicError::InvalidParameter(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Decides whether a tile is usable from its cloud probability mask
#[derive(Debug, Clone, Default)]
pub struct CloudFilter {
    params: CloudFilterParams,
}

impl CloudFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: CloudFilterParams) -> MosaicResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &CloudFilterParams {
        &self.params
    }

    /// Fraction of mask entries at or above the white threshold
    pub fn cloud_fraction(&self, mask: &Array2<f32>) -> f32 {
        cloud_fraction(mask, self.params.white_threshold)
    }

    /// True when the tile is cloudy (unusable)
    pub fn is_cloudy(&self, mask: &Array2<f32>) -> bool {
        is_cloudy(mask, self.params.white_threshold, self.params.min_white_ratio)
    }
}

/// Fraction of entries `>= white_threshold`; an empty mask has fraction 0
pub fn cloud_fraction(mask: &Array2<f32>, white_threshold: f32) -> f32 {
    if mask.is_empty() {
        return 0.0;
    }
    let white = mask.iter().filter(|&&v| v >= white_threshold).count();
    white as f32 / mask.len() as f32
}

/// A tile is cloudy when its cloud fraction reaches `min_white_ratio`.
///
/// An all-zero mask is never cloudy, whatever the thresholds.
pub fn is_cloudy(mask: &Array2<f32>, white_threshold: f32, min_white_ratio: f32) -> bool {
    if mask.iter().all(|&v| v == 0.0) {
        return false;
    }
    cloud_fraction(mask, white_threshold) >= min_white_ratio
}
