//! Core compositing modules

pub mod tile_grid;
pub mod preprocess;
pub mod classifier;
pub mod cloud_filter;
pub mod events;
pub mod accumulator;
pub mod reconstruct;
pub mod pipeline;

// Re-export main types
pub use tile_grid::{Tile, TileGrid, GridShape};
pub use preprocess::{BandStackPreprocessor, PreprocessParams};
pub use classifier::{TileClassifier, ClassifierAdapter, BrightnessClassifier};
pub use cloud_filter::{CloudFilter, CloudFilterParams, is_cloudy, cloud_fraction};
pub use events::{MosaicEvent, MosaicObserver, LogObserver, NullObserver, RecordingObserver};
pub use accumulator::{
    MosaicAccumulator, AccumulatorParams, AccumulatorState, CaptureSummary, CompositeProduct,
    ReferenceCapture, ResolvedTileMap, MaskTileMap, TerminationReason, WriterPolicy,
};
pub use reconstruct::{Mosaic, reconstruct, reconstruct_mask};
pub use pipeline::CompositePipeline;
