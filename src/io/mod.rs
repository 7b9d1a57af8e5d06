//! I/O modules for reading band rasters, locating captures, and writing mosaics

pub mod band_loader;
pub mod capture;
pub mod writer;

pub use band_loader::{BandLoader, Normalization, load_band_set, normalize_band, percentile};
#[cfg(feature = "gdal")]
pub use band_loader::GdalBandLoader;
pub use capture::{CapturePaths, discover_captures, date_from_path};
pub use writer::{save_png, to_rgba_image};
