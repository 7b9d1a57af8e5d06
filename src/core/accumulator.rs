use crate::core::classifier::{ClassifierAdapter, TileClassifier};
use crate::core::cloud_filter::{CloudFilter, CloudFilterParams};
use crate::core::events::{LogObserver, MosaicEvent, MosaicObserver};
use crate::core::reconstruct::{reconstruct, reconstruct_mask, Mosaic};
use crate::core::tile_grid::{GridShape, Tile, TileGrid};
use crate::types::{CloudProbabilityMask, MosaicError, MosaicResult, StackedImage, TileIndex};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Resolved RGB patch per grid index
pub type ResolvedTileMap = BTreeMap<TileIndex, Array3<f32>>;

/// Latest cloud probability mask per classified grid index
pub type MaskTileMap = BTreeMap<TileIndex, CloudProbabilityMask>;

/// How a capture is chosen as the radiometric reference.
///
/// A reference only applies when more than one capture is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCapture {
    /// No histogram matching
    None,
    /// First capture of the sequence
    #[default]
    First,
    /// Capture at the given position in the sequence
    Index(usize),
}

impl ReferenceCapture {
    /// Position of the reference capture for a sequence of `count` captures
    pub fn resolve(&self, count: usize) -> MosaicResult<Option<usize>> {
        if count < 2 {
            return Ok(None);
        }
        match *self {
            ReferenceCapture::None => Ok(None),
            ReferenceCapture::First => Ok(Some(0)),
            ReferenceCapture::Index(i) if i < count => Ok(Some(i)),
            ReferenceCapture::Index(i) => Err(MosaicError::InvalidParameter(format!(
                "Reference capture {} is out of range for {} captures",
                i, count
            ))),
        }
    }
}

/// Admission policy for tiles that more than one capture finds clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriterPolicy {
    /// The earliest processed clear capture supplies the tile; never overwritten
    #[default]
    FirstWins,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Every grid cell was resolved
    AllResolved,
    /// Captures ran out with cells still unresolved
    CapturesExhausted,
    /// Caller aborted between captures
    Cancelled,
}

/// Accumulator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    AwaitingCapture,
    ProcessingTiles,
    Done(TerminationReason),
}

/// Accumulator construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorParams {
    pub tile_size: usize,
    pub filter: CloudFilterParams,
    pub reference: ReferenceCapture,
    pub policy: WriterPolicy,
}

impl Default for AccumulatorParams {
    fn default() -> Self {
        Self {
            tile_size: 256,
            filter: CloudFilterParams::default(),
            reference: ReferenceCapture::default(),
            policy: WriterPolicy::default(),
        }
    }
}

/// Outcome of one capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSummary {
    pub capture: usize,
    /// Complete tiles in this capture's grid
    pub tiles: usize,
    /// Tiles sent to the classifier
    pub classified: usize,
    /// Tiles newly admitted from this capture
    pub resolved: usize,
    /// Tiles found cloudy
    pub skipped: usize,
    /// Cells still unresolved afterwards
    pub unresolved: usize,
}

/// Final product of a compositing run
#[derive(Debug, Clone)]
pub struct CompositeProduct {
    pub mosaic: Mosaic,
    /// Cloud probability of every classified tile, as grayscale + coverage
    pub cloud_mask: Mosaic,
    pub resolved: ResolvedTileMap,
    /// Capture that supplied each resolved tile
    pub provenance: BTreeMap<TileIndex, usize>,
    /// Captures that supplied at least one tile, in processing order
    pub contributing_captures: Vec<usize>,
    pub unresolved: Vec<TileIndex>,
    pub captures_processed: usize,
    pub grid: GridShape,
    pub termination: TerminationReason,
}

struct TileVerdict {
    index: TileIndex,
    mask: CloudProbabilityMask,
    cloud_fraction: f32,
    cloudy: bool,
}

/// Folds an ordered capture sequence into a progressively filled mosaic
pub struct MosaicAccumulator {
    params: AccumulatorParams,
    filter: CloudFilter,
    observer: Arc<dyn MosaicObserver>,
    state: AccumulatorState,
    resolved: ResolvedTileMap,
    masks: MaskTileMap,
    provenance: BTreeMap<TileIndex, usize>,
    unresolved: Option<BTreeSet<TileIndex>>,
    grid_shape: Option<GridShape>,
    contributing: Vec<usize>,
    captures_processed: usize,
    tiles_seen: usize,
}

impl MosaicAccumulator {
    /// Create an accumulator that reports progress through the `log` facade
    pub fn new(params: AccumulatorParams) -> MosaicResult<Self> {
        Self::with_observer(params, Arc::new(LogObserver))
    }

    pub fn with_observer(params: AccumulatorParams, observer: Arc<dyn MosaicObserver>) -> MosaicResult<Self> {
        if params.tile_size == 0 {
            return Err(MosaicError::InvalidParameter(
                "tile_size must be a positive integer".to_string(),
            ));
        }
        let filter = CloudFilter::with_params(params.filter)?;

        Ok(Self {
            params,
            filter,
            observer,
            state: AccumulatorState::AwaitingCapture,
            resolved: BTreeMap::new(),
            masks: BTreeMap::new(),
            provenance: BTreeMap::new(),
            unresolved: None,
            grid_shape: None,
            contributing: Vec::new(),
            captures_processed: 0,
            tiles_seen: 0,
        })
    }

    pub fn params(&self) -> &AccumulatorParams {
        &self.params
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, AccumulatorState::Done(_))
    }

    pub fn resolved(&self) -> &ResolvedTileMap {
        &self.resolved
    }

    /// Unresolved cells; `None` until the first capture has been processed
    pub fn unresolved(&self) -> Option<&BTreeSet<TileIndex>> {
        self.unresolved.as_ref()
    }

    pub fn captures_processed(&self) -> usize {
        self.captures_processed
    }

    /// Stop consuming captures; the state gathered so far stays consistent
    pub fn cancel(&mut self) {
        if !self.is_done() {
            log::warn!("Compositing cancelled after {} captures", self.captures_processed);
            self.state = AccumulatorState::Done(TerminationReason::Cancelled);
        }
    }

    /// Classify the eligible tiles of one preprocessed capture and admit the clear ones
    pub fn process_capture(
        &mut self,
        image: &StackedImage,
        label: &str,
        classifier: &dyn TileClassifier,
    ) -> MosaicResult<CaptureSummary> {
        if self.is_done() {
            return Err(MosaicError::InvalidParameter(format!(
                "Accumulator already finished ({:?})",
                self.state
            )));
        }

        let capture = self.captures_processed;
        self.observer.on_event(&MosaicEvent::CaptureStarted {
            capture,
            label: label.to_string(),
            unresolved: self.unresolved.as_ref().map(|u| u.len()),
        });

        let grid = TileGrid::from_array(image, self.params.tile_size)?;
        let shape = grid.shape();
        if let Some(expected) = self.grid_shape {
            if expected != shape {
                return Err(MosaicError::GridShapeDrift {
                    capture,
                    expected_width: expected.width,
                    expected_height: expected.height,
                    expected_tiles: expected.tile_count(),
                    found_width: shape.width,
                    found_height: shape.height,
                    found_tiles: shape.tile_count(),
                });
            }
        }

        self.state = AccumulatorState::ProcessingTiles;

        let eligible: Vec<&Tile> = grid
            .tiles
            .iter()
            .filter(|tile| match &self.unresolved {
                None => true,
                Some(unresolved) => unresolved.contains(&tile.index),
            })
            .collect();
        log::debug!("Capture {}: {} of {} tiles eligible", capture, eligible.len(), grid.len());

        let verdicts = self.classify(&eligible, classifier);
        let verdicts = match verdicts {
            Ok(verdicts) => verdicts,
            Err(e) => {
                self.state = AccumulatorState::AwaitingCapture;
                return Err(e);
            }
        };

        let mut resolved_now = 0;
        let mut skipped = 0;
        for (tile, verdict) in eligible.iter().zip(verdicts) {
            self.masks.insert(verdict.index, verdict.mask);

            if verdict.cloudy {
                skipped += 1;
                self.observer.on_event(&MosaicEvent::TileSkipped {
                    capture,
                    index: verdict.index,
                    cloud_fraction: verdict.cloud_fraction,
                });
                continue;
            }

            if self.admit(tile, capture) {
                resolved_now += 1;
                self.observer.on_event(&MosaicEvent::TileResolved {
                    capture,
                    index: verdict.index,
                    cloud_fraction: verdict.cloud_fraction,
                });
            }
        }

        if resolved_now > 0 {
            self.contributing.push(capture);
        }

        let unresolved: BTreeSet<TileIndex> = grid
            .indices()
            .filter(|index| !self.resolved.contains_key(index))
            .collect();
        let remaining = unresolved.len();
        self.unresolved = Some(unresolved);
        self.grid_shape.get_or_insert(shape);
        self.tiles_seen += grid.len();
        self.captures_processed += 1;

        self.state = if remaining == 0 {
            log::info!("All tiles resolved, no remaining tiles to process");
            AccumulatorState::Done(TerminationReason::AllResolved)
        } else {
            AccumulatorState::AwaitingCapture
        };

        self.observer.on_event(&MosaicEvent::CaptureCompleted {
            capture,
            resolved: self.resolved.len(),
            unresolved: remaining,
        });

        Ok(CaptureSummary {
            capture,
            tiles: grid.len(),
            classified: eligible.len(),
            resolved: resolved_now,
            skipped,
            unresolved: remaining,
        })
    }

    /// Reconstruct the mosaic from everything admitted so far
    pub fn finish(self) -> MosaicResult<CompositeProduct> {
        let termination = match self.state {
            AccumulatorState::Done(reason) => reason,
            _ => TerminationReason::CapturesExhausted,
        };

        let grid = match self.grid_shape {
            Some(grid) if self.tiles_seen > 0 => grid,
            _ => return Err(MosaicError::NoTilesProcessed),
        };

        let mosaic = reconstruct(&self.resolved, grid.width, grid.height, grid.tile_size)?;
        let cloud_mask = reconstruct_mask(&self.masks, grid.width, grid.height, grid.tile_size)?;
        let unresolved: Vec<TileIndex> = self
            .unresolved
            .map(|u| u.into_iter().collect())
            .unwrap_or_default();

        self.observer.on_event(&MosaicEvent::RunCompleted {
            captures_processed: self.captures_processed,
            resolved: self.resolved.len(),
            unresolved: unresolved.len(),
            termination,
        });

        Ok(CompositeProduct {
            mosaic,
            cloud_mask,
            resolved: self.resolved,
            provenance: self.provenance,
            contributing_captures: self.contributing,
            unresolved,
            captures_processed: self.captures_processed,
            grid,
            termination,
        })
    }

    fn admit(&mut self, tile: &Tile, capture: usize) -> bool {
        match self.params.policy {
            WriterPolicy::FirstWins => {
                if self.resolved.contains_key(&tile.index) {
                    return false;
                }
                self.resolved.insert(tile.index, tile.rgb());
                self.provenance.insert(tile.index, capture);
                true
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn classify(&self, tiles: &[&Tile], classifier: &dyn TileClassifier) -> MosaicResult<Vec<TileVerdict>> {
        use rayon::prelude::*;

        let adapter = ClassifierAdapter::new(classifier, self.params.tile_size);
        tiles
            .par_iter()
            .map(|tile| Self::verdict(&adapter, &self.filter, tile))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn classify(&self, tiles: &[&Tile], classifier: &dyn TileClassifier) -> MosaicResult<Vec<TileVerdict>> {
        let adapter = ClassifierAdapter::new(classifier, self.params.tile_size);
        tiles
            .iter()
            .map(|tile| Self::verdict(&adapter, &self.filter, tile))
            .collect()
    }

    fn verdict(adapter: &ClassifierAdapter<'_>, filter: &CloudFilter, tile: &Tile) -> MosaicResult<TileVerdict> {
        let mask = adapter.predict(tile)?;
        Ok(TileVerdict {
            index: tile.index,
            cloud_fraction: filter.cloud_fraction(&mask),
            cloudy: filter.is_cloudy(&mask),
            mask,
        })
    }
}
