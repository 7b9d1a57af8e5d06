use crate::config::CompositeConfig;
use crate::core::accumulator::{AccumulatorParams, CompositeProduct, MosaicAccumulator};
use crate::core::classifier::TileClassifier;
use crate::core::events::{LogObserver, MosaicObserver};
use crate::core::preprocess::BandStackPreprocessor;
use crate::io::band_loader::{load_band_set, BandLoader};
use crate::io::capture::CapturePaths;
use crate::types::{MosaicResult, StackedImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// End-to-end compositing over an ordered capture sequence.
///
/// Captures are loaded lazily, one at a time, and loading stops as soon as
/// every grid cell is resolved.
pub struct CompositePipeline {
    preprocessor: BandStackPreprocessor,
    params: AccumulatorParams,
    observer: Arc<dyn MosaicObserver>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CompositePipeline {
    pub fn new(config: &CompositeConfig) -> MosaicResult<Self> {
        config.validate()?;
        Ok(Self {
            preprocessor: BandStackPreprocessor::with_params(config.preprocess.clone()),
            params: config.accumulator_params(),
            observer: Arc::new(LogObserver),
            cancel: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn MosaicObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Flag checked between captures; once set the run stops with a partial product
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Composite captures read from disk through `loader`
    pub fn run(
        &self,
        captures: &[CapturePaths],
        loader: &dyn BandLoader,
        classifier: &dyn TileClassifier,
    ) -> MosaicResult<CompositeProduct> {
        let labels: Vec<String> = captures.iter().map(|c| c.label()).collect();
        self.run_with(
            &labels,
            |i| {
                let bands = load_band_set(loader, &captures[i])?;
                self.preprocessor.stack(&bands)
            },
            classifier,
        )
    }

    /// Composite captures that are already stacked in memory
    pub fn run_stacked(
        &self,
        images: &[StackedImage],
        classifier: &dyn TileClassifier,
    ) -> MosaicResult<CompositeProduct> {
        let labels: Vec<String> = (0..images.len()).map(|i| format!("capture {}", i)).collect();
        self.run_with(&labels, |i| Ok(images[i].clone()), classifier)
    }

    fn run_with<F>(
        &self,
        labels: &[String],
        mut load: F,
        classifier: &dyn TileClassifier,
    ) -> MosaicResult<CompositeProduct>
    where
        F: FnMut(usize) -> MosaicResult<StackedImage>,
    {
        let count = labels.len();
        log::info!("Compositing {} captures with {}px tiles", count, self.params.tile_size);

        let reference_index = if self.preprocessor.params().histogram_match {
            self.params.reference.resolve(count)?
        } else {
            None
        };
        let reference = match reference_index {
            Some(i) => {
                log::info!("Using capture {} ({}) as radiometric reference", i, labels[i]);
                Some(load(i)?)
            }
            None => None,
        };

        let mut accumulator = MosaicAccumulator::with_observer(self.params.clone(), self.observer.clone())?;

        for (i, label) in labels.iter().enumerate() {
            if accumulator.is_done() {
                break;
            }
            if self.is_cancelled() {
                accumulator.cancel();
                break;
            }

            let is_reference = reference_index == Some(i);
            let raw = match (&reference, is_reference) {
                (Some(reference), true) => reference.clone(),
                _ => load(i)?,
            };
            let matching = if is_reference { None } else { reference.as_ref() };

            let image = self.preprocessor.preprocess(raw, matching)?;
            accumulator.process_capture(&image, label, classifier)?;
        }

        accumulator.finish()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accumulator::TerminationReason;
    use crate::core::tile_grid::Tile;
    use crate::types::{CloudProbabilityMask, MosaicError};
    use ndarray::{Array3, Axis};

    fn nir_classifier(tile: &Tile) -> MosaicResult<CloudProbabilityMask> {
        Ok(tile.data.index_axis(Axis(2), 3).to_owned())
    }

    fn config() -> CompositeConfig {
        let mut config = CompositeConfig::default();
        config.tile_size = 2;
        config.preprocess.color_balance = false;
        config.preprocess.histogram_match = false;
        config.filter.white_threshold = 0.5;
        config.filter.min_white_ratio = 0.5;
        config
    }

    #[test]
    fn test_run_stacked_empty_is_error() {
        let pipeline = CompositePipeline::new(&config()).unwrap();
        assert!(matches!(
            pipeline.run_stacked(&[], &nir_classifier),
            Err(MosaicError::NoTilesProcessed)
        ));
    }

    #[test]
    fn test_cancel_flag_before_first_capture() {
        let flag = Arc::new(AtomicBool::new(true));
        let pipeline = CompositePipeline::new(&config()).unwrap().with_cancel_flag(flag);
        let images = vec![Array3::zeros((4, 4, 4))];
        // Nothing was tiled, so there is nothing to reconstruct
        assert!(matches!(
            pipeline.run_stacked(&images, &nir_classifier),
            Err(MosaicError::NoTilesProcessed)
        ));
    }

    #[test]
    fn test_run_stacked_resolves_clear_capture() {
        let pipeline = CompositePipeline::new(&config()).unwrap();
        let images = vec![Array3::from_elem((4, 4, 4), 0.0), Array3::from_elem((4, 4, 4), 0.3)];
        let product = pipeline.run_stacked(&images, &nir_classifier).unwrap();

        assert_eq!(product.termination, TerminationReason::AllResolved);
        assert_eq!(product.captures_processed, 1);
        assert_eq!(product.mosaic.coverage(), 1.0);
    }
}
