//! Progress events emitted while compositing

use crate::core::accumulator::TerminationReason;
use crate::types::TileIndex;
use std::sync::Mutex;

/// Structured progress event
#[derive(Debug, Clone, PartialEq)]
pub enum MosaicEvent {
    CaptureStarted {
        capture: usize,
        label: String,
        /// `None` before the first capture has been tiled
        unresolved: Option<usize>,
    },
    TileResolved {
        capture: usize,
        index: TileIndex,
        cloud_fraction: f32,
    },
    TileSkipped {
        capture: usize,
        index: TileIndex,
        cloud_fraction: f32,
    },
    CaptureCompleted {
        capture: usize,
        resolved: usize,
        unresolved: usize,
    },
    RunCompleted {
        captures_processed: usize,
        resolved: usize,
        unresolved: usize,
        termination: TerminationReason,
    },
}

/// Receives progress events from the accumulator
pub trait MosaicObserver: Send + Sync {
    fn on_event(&self, event: &MosaicEvent);
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl MosaicObserver for LogObserver {
    fn on_event(&self, event: &MosaicEvent) {
        match event {
            MosaicEvent::CaptureStarted { capture, label, unresolved } => match unresolved {
                Some(n) => log::info!("Processing capture {} ({}): {} tiles remaining", capture, label, n),
                None => log::info!("Processing capture {} ({}): all tiles", capture, label),
            },
            MosaicEvent::TileResolved { index, cloud_fraction, .. } => {
                log::debug!("Tile {:?} resolved (cloud fraction {:.3})", index, cloud_fraction)
            }
            MosaicEvent::TileSkipped { index, cloud_fraction, .. } => {
                log::debug!("Tile {:?} is cloudy (cloud fraction {:.3}), skipping", index, cloud_fraction)
            }
            MosaicEvent::CaptureCompleted { capture, resolved, unresolved } => log::info!(
                "Capture {} done: {} tiles resolved, {} unresolved",
                capture, resolved, unresolved
            ),
            MosaicEvent::RunCompleted {
                captures_processed,
                resolved,
                unresolved,
                termination,
            } => log::info!(
                "Compositing finished after {} captures ({:?}): {} resolved, {} unresolved",
                captures_processed, termination, resolved, unresolved
            ),
        }
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl MosaicObserver for NullObserver {
    fn on_event(&self, _event: &MosaicEvent) {}
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MosaicEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MosaicEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl MosaicObserver for RecordingObserver {
    fn on_event(&self, event: &MosaicEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
