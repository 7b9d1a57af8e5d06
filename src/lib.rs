//! cloudmosaic: progressive multi-temporal cloud-free mosaicking
//!
//! Builds one cloud-free composite of a ground tile from a time series of
//! four-band (red, green, blue, near-infrared) captures. Each capture is cut into
//! a fixed grid, every still-unresolved cell is classified for cloud cover, and
//! the first clear observation of a cell fills it. Later captures are consulted
//! only for cells that remain unresolved, and loading stops once the grid is full.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Band, BandSet, StackedImage, CloudProbabilityMask, TileIndex, SpectralBand,
    MosaicError, MosaicResult,
};
pub use config::CompositeConfig;
pub use core::{
    BandStackPreprocessor, BrightnessClassifier, CloudFilter, CompositePipeline, CompositeProduct,
    Mosaic, MosaicAccumulator, MosaicEvent, MosaicObserver, ReferenceCapture, TerminationReason,
    Tile, TileClassifier, TileGrid,
};
pub use io::{BandLoader, CapturePaths, Normalization};

#[cfg(feature = "python")]
mod python {
    use crate::config::CompositeConfig;
    use crate::core::{BrightnessClassifier, CompositePipeline, Tile, TileClassifier};
    use crate::types::{CloudProbabilityMask, MosaicError, MosaicResult, StackedImage};
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray2, PyReadonlyArray3, ToPyArray};
    use pyo3::prelude::*;

    /// Python callable mapping an (H, W, 4) float32 tile to an (H, W) probability mask
    struct PyTileClassifier {
        callable: PyObject,
    }

    impl TileClassifier for PyTileClassifier {
        fn predict(&self, tile: &Tile) -> MosaicResult<CloudProbabilityMask> {
            Python::with_gil(|py| {
                let input = tile.data.to_pyarray(py);
                let output = self
                    .callable
                    .call1(py, (input,))
                    .map_err(|e| MosaicError::Classifier(format!("{}", e)))?;
                let mask: PyReadonlyArray2<f32> = output
                    .extract(py)
                    .map_err(|e| MosaicError::Classifier(format!("{}", e)))?;
                Ok(mask.as_array().to_owned())
            })
        }
    }

    fn to_py_err(e: MosaicError) -> PyErr {
        match e {
            MosaicError::ShapeMismatch { .. }
            | MosaicError::GridShapeDrift { .. }
            | MosaicError::InvalidParameter(_)
            | MosaicError::Config(_) => PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e)),
            _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
        }
    }

    /// Composite stacked captures; returns (mosaic, cloud_mask) as float32 (H, W, 4) arrays
    #[pyfunction]
    #[pyo3(signature = (
        captures,
        classifier = None,
        tile_size = 256,
        white_threshold = 0.01,
        min_white_ratio = 0.01,
        color_balance = true,
        histogram_match = true
    ))]
    #[allow(clippy::too_many_arguments)]
    fn composite<'py>(
        py: Python<'py>,
        captures: Vec<PyReadonlyArray3<'py, f32>>,
        classifier: Option<PyObject>,
        tile_size: usize,
        white_threshold: f32,
        min_white_ratio: f32,
        color_balance: bool,
        histogram_match: bool,
    ) -> PyResult<(&'py PyArray3<f32>, &'py PyArray3<f32>)> {
        let images: Vec<StackedImage> = captures.iter().map(|c| c.as_array().to_owned()).collect();

        let mut config = CompositeConfig::default();
        config.tile_size = tile_size;
        config.filter.white_threshold = white_threshold;
        config.filter.min_white_ratio = min_white_ratio;
        config.preprocess.color_balance = color_balance;
        config.preprocess.histogram_match = histogram_match;
        let pipeline = CompositePipeline::new(&config).map_err(to_py_err)?;

        // The GIL is released so classifier callbacks can re-acquire it from worker threads
        let product = match classifier {
            Some(callable) => {
                let classifier = PyTileClassifier { callable };
                py.allow_threads(|| pipeline.run_stacked(&images, &classifier))
            }
            None => {
                let classifier = BrightnessClassifier::default();
                py.allow_threads(|| pipeline.run_stacked(&images, &classifier))
            }
        }
        .map_err(to_py_err)?;

        Ok((
            product.mosaic.data.into_pyarray(py),
            product.cloud_mask.data.into_pyarray(py),
        ))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(composite, m)?)?;
        Ok(())
    }
}
