use crate::types::{MosaicError, MosaicResult, TileIndex, RGB_CHANNELS};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
use std::collections::BTreeMap;

const ALPHA_CHANNEL: usize = 3;

/// Composite raster (rows x cols x 4): RGB plus a coverage alpha channel
#[derive(Debug, Clone, PartialEq)]
pub struct Mosaic {
    pub data: Array3<f32>,
}

impl Mosaic {
    /// Fully transparent black mosaic
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, RGB_CHANNELS + 1)),
        }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn alpha(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), ALPHA_CHANNEL)
    }

    pub fn rgb(&self) -> ArrayView3<'_, f32> {
        self.data.slice(s![.., .., ..RGB_CHANNELS])
    }

    /// Fraction of pixels with alpha = 1
    pub fn coverage(&self) -> f32 {
        let alpha = self.alpha();
        if alpha.is_empty() {
            return 0.0;
        }
        let covered = alpha.iter().filter(|&&a| a >= 1.0).count();
        covered as f32 / alpha.len() as f32
    }

    /// Interleaved RGBA8 buffer, row-major
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0) as u8)
            .collect()
    }

    fn write_patch(&mut self, index: TileIndex, tile_size: usize, patch: ArrayView3<f32>) -> MosaicResult<()> {
        let (rows, cols, channels) = patch.dim();
        let (row, col) = index;
        let y = row * tile_size;
        let x = col * tile_size;

        if y + rows > self.height() || x + cols > self.width() {
            return Err(MosaicError::InvalidParameter(format!(
                "Tile {:?} ({}x{}) falls outside the {}x{} mosaic",
                index,
                cols,
                rows,
                self.width(),
                self.height()
            )));
        }

        let channels = channels.min(RGB_CHANNELS);
        self.data
            .slice_mut(s![y..y + rows, x..x + cols, ..channels])
            .assign(&patch.slice(s![.., .., ..channels]));
        self.data
            .slice_mut(s![y..y + rows, x..x + cols, ALPHA_CHANNEL])
            .fill(1.0);
        Ok(())
    }
}

/// Stitch resolved RGB patches into a full-size mosaic.
///
/// Each patch lands at `(row * tile_size, col * tile_size)` with alpha set to 1
/// over its footprint; everything else stays RGB = 0, alpha = 0.
pub fn reconstruct(
    resolved: &BTreeMap<TileIndex, Array3<f32>>,
    width: usize,
    height: usize,
    tile_size: usize,
) -> MosaicResult<Mosaic> {
    log::debug!("Reconstructing {}x{} mosaic from {} tiles", width, height, resolved.len());

    let mut mosaic = Mosaic::empty(width, height);
    for (&index, patch) in resolved {
        mosaic.write_patch(index, tile_size, patch.view())?;
    }
    Ok(mosaic)
}

/// Render cloud probability tiles as a grayscale mosaic with coverage alpha
pub fn reconstruct_mask(
    masks: &BTreeMap<TileIndex, Array2<f32>>,
    width: usize,
    height: usize,
    tile_size: usize,
) -> MosaicResult<Mosaic> {
    log::debug!("Reconstructing {}x{} cloud mask from {} tiles", width, height, masks.len());

    let mut mosaic = Mosaic::empty(width, height);
    for (&index, mask) in masks {
        let gray = mask.view().insert_axis(Axis(2));
        let gray = gray
            .broadcast((mask.nrows(), mask.ncols(), RGB_CHANNELS))
            .ok_or_else(|| MosaicError::InvalidParameter("Failed to broadcast mask tile".to_string()))?;
        mosaic.write_patch(index, tile_size, gray)?;
    }
    Ok(mosaic)
}
