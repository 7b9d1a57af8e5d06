use crate::core::tile_grid::Tile;
use crate::types::{CloudProbabilityMask, MosaicError, MosaicResult, STACK_CHANNELS};
use ndarray::{Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Maps a tile's pixels to a per-pixel cloud probability mask
pub trait TileClassifier: Send + Sync {
    fn predict(&self, tile: &Tile) -> MosaicResult<CloudProbabilityMask>;
}

impl<F> TileClassifier for F
where
    F: Fn(&Tile) -> MosaicResult<CloudProbabilityMask> + Send + Sync,
{
    fn predict(&self, tile: &Tile) -> MosaicResult<CloudProbabilityMask> {
        self(tile)
    }
}

/// Enforces the tile/mask contract around an external classifier
pub struct ClassifierAdapter<'a> {
    inner: &'a dyn TileClassifier,
    tile_size: usize,
}

impl<'a> ClassifierAdapter<'a> {
    pub fn new(inner: &'a dyn TileClassifier, tile_size: usize) -> Self {
        Self { inner, tile_size }
    }

    /// Validate the tile, run the classifier once, validate and clamp its mask
    pub fn predict(&self, tile: &Tile) -> MosaicResult<CloudProbabilityMask> {
        let (rows, cols) = tile.size();
        if rows != self.tile_size || cols != self.tile_size {
            return Err(MosaicError::Classifier(format!(
                "Tile {:?} is {}x{}, classifier expects {}x{}",
                tile.index, cols, rows, self.tile_size, self.tile_size
            )));
        }
        if tile.channels() != STACK_CHANNELS {
            return Err(MosaicError::Classifier(format!(
                "Tile {:?} has {} channels, classifier expects {}",
                tile.index,
                tile.channels(),
                STACK_CHANNELS
            )));
        }

        let mut mask = self.inner.predict(tile)?;

        if mask.dim() != (self.tile_size, self.tile_size) {
            return Err(MosaicError::Classifier(format!(
                "Mask for tile {:?} has shape {:?}, expected ({}, {})",
                tile.index,
                mask.dim(),
                self.tile_size,
                self.tile_size
            )));
        }
        if mask.iter().any(|v| !v.is_finite()) {
            return Err(MosaicError::Classifier(format!(
                "Mask for tile {:?} contains non-finite values",
                tile.index
            )));
        }

        mask.mapv_inplace(|v| v.clamp(0.0, 1.0));
        Ok(mask)
    }
}

/// Model-free classifier for bright, spectrally flat pixels.
///
/// Probability ramps linearly from 0 at `low` to 1 at `high` on the per-pixel
/// minimum of the red, green and blue channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightnessClassifier {
    pub low: f32,
    pub high: f32,
}

impl Default for BrightnessClassifier {
    fn default() -> Self {
        Self { low: 0.3, high: 0.6 }
    }
}

impl BrightnessClassifier {
    pub fn new(low: f32, high: f32) -> MosaicResult<Self> {
        if !(low < high) {
            return Err(MosaicError::InvalidParameter(format!(
                "Brightness ramp requires low < high, got {} and {}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }
}

impl TileClassifier for BrightnessClassifier {
    fn predict(&self, tile: &Tile) -> MosaicResult<CloudProbabilityMask> {
        let (rows, cols) = tile.size();
        let mut mask = Array2::from_elem((rows, cols), f32::INFINITY);
        for c in 0..tile.channels().min(3) {
            Zip::from(&mut mask)
                .and(tile.data.index_axis(Axis(2), c))
                .for_each(|m, &v| *m = m.min(v));
        }

        let span = self.high - self.low;
        mask.mapv_inplace(|v| {
            if v.is_finite() {
                ((v - self.low) / span).clamp(0.0, 1.0)
            } else {
                0.0
            }
        });
        Ok(mask)
    }
}
