use ndarray::{Array2, Array3};
use std::path::PathBuf;

/// Single normalized spectral band (rows x cols), values in [0, 1]
pub type Band = Array2<f32>;

/// Channel-stacked capture (rows x cols x channels)
pub type StackedImage = Array3<f32>;

/// Per-pixel cloud likelihood for one tile (tile_size x tile_size)
pub type CloudProbabilityMask = Array2<f32>;

/// Grid position of a tile as (row, col)
pub type TileIndex = (usize, usize);

/// Number of channels in a stacked capture (red, green, blue, near-infrared)
pub const STACK_CHANNELS: usize = 4;

/// Number of colour channels carried into the mosaic
pub const RGB_CHANNELS: usize = 3;

/// Spectral bands of one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralBand {
    Red,
    Green,
    Blue,
    NearInfrared,
}

impl std::fmt::Display for SpectralBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpectralBand::Red => write!(f, "red"),
            SpectralBand::Green => write!(f, "green"),
            SpectralBand::Blue => write!(f, "blue"),
            SpectralBand::NearInfrared => write!(f, "nir"),
        }
    }
}

/// The four co-registered bands of one capture
#[derive(Debug, Clone)]
pub struct BandSet {
    pub red: Band,
    pub green: Band,
    pub blue: Band,
    pub nir: Band,
}

impl BandSet {
    pub fn new(red: Band, green: Band, blue: Band, nir: Band) -> Self {
        Self { red, green, blue, nir }
    }

    /// Bands in stacking order
    pub fn bands(&self) -> [(SpectralBand, &Band); STACK_CHANNELS] {
        [
            (SpectralBand::Red, &self.red),
            (SpectralBand::Green, &self.green),
            (SpectralBand::Blue, &self.blue),
            (SpectralBand::NearInfrared, &self.nir),
        ]
    }

    /// Shared (rows, cols), or `ShapeMismatch` naming the first band that disagrees with red
    pub fn shape(&self) -> MosaicResult<(usize, usize)> {
        let expected = self.red.dim();
        for (band, data) in self.bands() {
            if data.dim() != expected {
                return Err(MosaicError::ShapeMismatch {
                    band: band.to_string(),
                    expected,
                    found: data.dim(),
                });
            }
        }
        Ok(expected)
    }
}

/// Error types for mosaic compositing
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("Band shape mismatch: {band} band is {found:?}, expected {expected:?}")]
    ShapeMismatch {
        band: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error(
        "Tile grid drift at capture {capture}: grid is {found_width}x{found_height} with {found_tiles} tiles, \
         first capture was {expected_width}x{expected_height} with {expected_tiles} tiles"
    )]
    GridShapeDrift {
        capture: usize,
        expected_width: usize,
        expected_height: usize,
        expected_tiles: usize,
        found_width: usize,
        found_height: usize,
        found_tiles: usize,
    },

    #[error("No tiles were processed; check the input captures and tile size")]
    NoTilesProcessed,

    #[error("Source unavailable: {}: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for mosaic operations
pub type MosaicResult<T> = Result<T, MosaicError>;
