use crate::io::capture::CapturePaths;
use crate::types::{Band, BandSet, MosaicError, MosaicResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Radiometric normalization applied to raw band values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Values are already reflectances in [0, 1]; clip only
    Unit,
    /// Divide by a fixed scale factor, then clip
    Divisor(f32),
    /// Divide by 65535 (16-bit digital numbers)
    BitDepth16,
    /// Linear stretch between two percentiles (0-100), then clip
    PercentileStretch { low: f32, high: f32 },
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::PercentileStretch { low: 2.0, high: 98.0 }
    }
}

impl Normalization {
    pub fn validate(&self) -> MosaicResult<()> {
        match *self {
            Normalization::Divisor(d) if !(d > 0.0) => Err(MosaicError::InvalidParameter(format!(
                "Normalization divisor must be positive, got {}",
                d
            ))),
            Normalization::PercentileStretch { low, high }
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high =>
            {
                Err(MosaicError::InvalidParameter(format!(
                    "Percentile stretch needs 0 <= low < high <= 100, got {} and {}",
                    low, high
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Source of normalized single-band rasters
pub trait BandLoader: Send + Sync {
    /// Decode one band as `f32` in [0, 1]; `SourceUnavailable` when it cannot be read
    fn load_band(&self, path: &Path) -> MosaicResult<Band>;
}

/// Load the four bands of one capture
pub fn load_band_set(loader: &dyn BandLoader, paths: &CapturePaths) -> MosaicResult<BandSet> {
    log::debug!("Loading bands for capture {}", paths.label());
    Ok(BandSet::new(
        loader.load_band(&paths.red)?,
        loader.load_band(&paths.green)?,
        loader.load_band(&paths.blue)?,
        loader.load_band(&paths.nir)?,
    ))
}

/// Apply `normalization` to a raw band
pub fn normalize_band(raw: Band, normalization: &Normalization) -> Band {
    match *normalization {
        Normalization::Unit => raw.mapv(|v| v.clamp(0.0, 1.0)),
        Normalization::Divisor(d) => raw.mapv(|v| (v / d).clamp(0.0, 1.0)),
        Normalization::BitDepth16 => raw.mapv(|v| (v / 65535.0).clamp(0.0, 1.0)),
        Normalization::PercentileStretch { low, high } => {
            let (lo, hi) = match (percentile(&raw, low), percentile(&raw, high)) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return raw,
            };
            let span = hi - lo;
            if span <= 0.0 {
                log::warn!("Flat band (p{}={}, p{}={}), stretch skipped", low, lo, high, hi);
                return raw.mapv(|v| if v > lo { 1.0 } else { 0.0 });
            }
            raw.mapv(|v| ((v - lo) / span).clamp(0.0, 1.0))
        }
    }
}

/// Percentile with linear interpolation between closest ranks; NaN ignored
pub fn percentile(band: &Band, q: f32) -> Option<f32> {
    let mut values: Vec<f32> = band.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) as f64 / 100.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some((values[lower] as f64 + frac * (values[upper] as f64 - values[lower] as f64)) as f32)
}

/// GDAL-backed loader reading band 1 of any raster GDAL can open (JP2, GeoTIFF)
#[cfg(feature = "gdal")]
#[derive(Debug, Clone, Default)]
pub struct GdalBandLoader {
    normalization: Normalization,
}

#[cfg(feature = "gdal")]
impl GdalBandLoader {
    pub fn new(normalization: Normalization) -> MosaicResult<Self> {
        normalization.validate()?;
        Ok(Self { normalization })
    }

    fn read_raw(path: &Path) -> MosaicResult<Band> {
        use gdal::Dataset;
        use ndarray::Array2;

        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        log::debug!("Band {}: {}x{}", path.display(), width, height);

        let rasterband = dataset.rasterband(1)?;
        let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| MosaicError::InvalidParameter(format!("Failed to reshape band data: {}", e)))
    }
}

#[cfg(feature = "gdal")]
impl BandLoader for GdalBandLoader {
    fn load_band(&self, path: &Path) -> MosaicResult<Band> {
        log::info!("Reading band from: {}", path.display());
        let raw = Self::read_raw(path).map_err(|e| MosaicError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(normalize_band(raw, &self.normalization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn ramp() -> Band {
        Array2::from_shape_fn((1, 101), |(_, x)| x as f32)
    }

    #[test]
    fn test_percentile_linear() {
        let band = ramp();
        assert_relative_eq!(percentile(&band, 2.0).unwrap(), 2.0, epsilon = 1e-4);
        assert_relative_eq!(percentile(&band, 98.0).unwrap(), 98.0, epsilon = 1e-4);

        let small = Array2::from_shape_vec((1, 4), vec![4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_relative_eq!(percentile(&small, 50.0).unwrap(), 2.5);
        assert!(percentile(&Array2::from_elem((1, 1), f32::NAN), 50.0).is_none());
    }

    #[test]
    fn test_percentile_stretch() {
        let stretched = normalize_band(ramp(), &Normalization::default());
        assert_relative_eq!(stretched[[0, 0]], 0.0);
        assert_relative_eq!(stretched[[0, 50]], 0.5, epsilon = 1e-4);
        assert_relative_eq!(stretched[[0, 100]], 1.0);
        assert!(stretched.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_fixed_scale_policies() {
        let raw = Array2::from_shape_vec((1, 3), vec![0.0, 32767.5, 70000.0]).unwrap();
        let scaled = normalize_band(raw.clone(), &Normalization::BitDepth16);
        assert_relative_eq!(scaled[[0, 1]], 0.5, epsilon = 1e-6);
        assert_relative_eq!(scaled[[0, 2]], 1.0);

        let divided = normalize_band(Array2::from_elem((1, 1), 5.0), &Normalization::Divisor(10.0));
        assert_relative_eq!(divided[[0, 0]], 0.5);

        let unit = normalize_band(Array2::from_elem((1, 1), -0.2), &Normalization::Unit);
        assert_relative_eq!(unit[[0, 0]], 0.0);
    }

    #[test]
    fn test_flat_band_stretch() {
        let flat = normalize_band(Array2::from_elem((3, 3), 7.0), &Normalization::default());
        assert!(flat.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalization_validation() {
        assert!(Normalization::Divisor(0.0).validate().is_err());
        assert!(Normalization::PercentileStretch { low: 98.0, high: 2.0 }.validate().is_err());
        assert!(Normalization::PercentileStretch { low: 1.0, high: 99.0 }.validate().is_ok());
        assert!(Normalization::BitDepth16.validate().is_ok());
    }
}
