use cloudmosaic::core::{
    AccumulatorParams, CloudFilterParams, CompositeProduct, MosaicAccumulator, MosaicEvent,
    RecordingObserver, TerminationReason, Tile,
};
use cloudmosaic::{CloudProbabilityMask, MosaicError, MosaicResult, StackedImage, TileIndex};
use ndarray::{s, Array3, Axis};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SIZE: usize = 4;
const TILE: usize = 2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Cloud probability is carried in the nir channel of these synthetic captures
fn nir_classifier(tile: &Tile) -> MosaicResult<CloudProbabilityMask> {
    Ok(tile.data.index_axis(Axis(2), 3).to_owned())
}

/// 4x4 capture with a per-pixel gradient offset by `base`, cloudy over `cloudy`
fn synthetic_capture(base: f32, cloudy: &[TileIndex]) -> StackedImage {
    let mut image = Array3::from_shape_fn((SIZE, SIZE, 4), |(y, x, c)| {
        if c == 3 {
            0.0
        } else {
            base + 0.01 * (y * SIZE + x) as f32 + 0.001 * c as f32
        }
    });
    for &(row, col) in cloudy {
        image
            .slice_mut(s![row * TILE..(row + 1) * TILE, col * TILE..(col + 1) * TILE, 3])
            .fill(1.0);
    }
    image
}

fn params() -> AccumulatorParams {
    AccumulatorParams {
        tile_size: TILE,
        filter: CloudFilterParams {
            white_threshold: 0.5,
            min_white_ratio: 0.5,
        },
        ..Default::default()
    }
}

fn run(captures: &[StackedImage]) -> MosaicResult<CompositeProduct> {
    let mut accumulator = MosaicAccumulator::new(params())?;
    for (i, capture) in captures.iter().enumerate() {
        if accumulator.is_done() {
            break;
        }
        accumulator.process_capture(capture, &format!("capture {}", i), &nir_classifier)?;
    }
    accumulator.finish()
}

#[test]
fn test_two_capture_scenario() {
    init_logging();
    let first = synthetic_capture(0.1, &[(0, 1), (1, 0)]);
    let second = synthetic_capture(0.5, &[]);

    let product = run(&[first.clone(), second.clone()]).unwrap();

    assert_eq!(product.resolved.len(), 4);
    assert_eq!(product.provenance[&(0, 0)], 0);
    assert_eq!(product.provenance[&(1, 1)], 0);
    assert_eq!(product.provenance[&(0, 1)], 1);
    assert_eq!(product.provenance[&(1, 0)], 1);
    assert_eq!(product.termination, TerminationReason::AllResolved);

    // Patches carry the RGB content of the capture that supplied them
    assert_eq!(product.resolved[&(0, 0)], first.slice(s![0..2, 0..2, 0..3]).to_owned());
    assert_eq!(product.resolved[&(0, 1)], second.slice(s![0..2, 2..4, 0..3]).to_owned());
    assert!(product.mosaic.alpha().iter().all(|&a| a == 1.0));

    // Mosaic RGB equals the patches placed at their grid offsets
    let mosaic_rgb = product.mosaic.rgb();
    assert_eq!(mosaic_rgb.slice(s![0..2, 0..2, ..]), first.slice(s![0..2, 0..2, 0..3]));
    assert_eq!(mosaic_rgb.slice(s![2..4, 0..2, ..]), second.slice(s![2..4, 0..2, 0..3]));
}

#[test]
fn test_single_all_cloudy_capture() {
    init_logging();
    let all = [(0, 0), (0, 1), (1, 0), (1, 1)];
    let product = run(&[synthetic_capture(0.3, &all)]).unwrap();

    assert!(product.resolved.is_empty());
    assert!(product.mosaic.rgb().iter().all(|&v| v == 0.0));
    assert!(product.mosaic.alpha().iter().all(|&a| a == 0.0));
    assert_eq!(product.termination, TerminationReason::CapturesExhausted);
    assert_eq!(product.unresolved.len(), 4);
}

#[test]
fn test_empty_capture_list() {
    init_logging();
    assert!(matches!(run(&[]), Err(MosaicError::NoTilesProcessed)));
}

#[test]
fn test_first_writer_wins_over_later_clear_capture() {
    init_logging();
    let first = synthetic_capture(0.2, &[(1, 1)]);
    let second = synthetic_capture(0.8, &[]);
    let product = run(&[first.clone(), second]).unwrap();

    assert_eq!(product.resolved[&(0, 0)], first.slice(s![0..2, 0..2, 0..3]).to_owned());
    assert_eq!(product.provenance[&(0, 0)], 0);
    assert_eq!(product.provenance[&(1, 1)], 1);
}

#[test]
fn test_runs_are_deterministic() {
    init_logging();
    let captures = vec![
        synthetic_capture(0.1, &[(0, 0), (1, 1)]),
        synthetic_capture(0.4, &[(1, 1)]),
        synthetic_capture(0.7, &[]),
    ];

    let a = run(&captures).unwrap();
    let b = run(&captures).unwrap();
    assert_eq!(a.resolved, b.resolved);
    assert_eq!(a.mosaic, b.mosaic);
    assert_eq!(a.mosaic.to_rgba8(), b.mosaic.to_rgba8());
    assert_eq!(a.provenance, b.provenance);
}

#[test]
fn test_resolution_is_monotone() {
    init_logging();
    let captures = vec![
        synthetic_capture(0.1, &[(0, 0), (0, 1), (1, 1)]),
        synthetic_capture(0.2, &[(0, 0), (0, 1), (1, 1), (1, 0)]),
        synthetic_capture(0.3, &[(0, 1)]),
        synthetic_capture(0.4, &[]),
    ];

    let mut accumulator = MosaicAccumulator::new(params()).unwrap();
    let mut previous = 0;
    for (i, capture) in captures.iter().enumerate() {
        accumulator
            .process_capture(capture, &format!("capture {}", i), &nir_classifier)
            .unwrap();
        let now = accumulator.resolved().len();
        assert!(now >= previous, "capture {} shrank resolved set", i);
        previous = now;
    }
    assert_eq!(previous, 4);
}

#[test]
fn test_early_termination_skips_later_captures() {
    init_logging();
    let calls = AtomicUsize::new(0);
    let seen = Mutex::new(Vec::new());
    let counting = |tile: &Tile| -> MosaicResult<CloudProbabilityMask> {
        calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = seen.lock() {
            seen.push(tile.data[[0, 0, 0]]);
        }
        nir_classifier(tile)
    };

    let captures = vec![
        synthetic_capture(0.1, &[]),
        synthetic_capture(0.5, &[]),
        synthetic_capture(0.9, &[]),
    ];

    let mut accumulator = MosaicAccumulator::new(params()).unwrap();
    let mut processed = 0;
    for capture in &captures {
        if accumulator.is_done() {
            break;
        }
        accumulator.process_capture(capture, "c", &counting).unwrap();
        processed += 1;
    }

    assert_eq!(processed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // Every classified tile came from the first capture
    assert!(seen.lock().unwrap().iter().all(|&v| v < 0.5));
    assert_eq!(accumulator.finish().unwrap().captures_processed, 1);
}

#[test]
fn test_alpha_matches_resolution() {
    init_logging();
    let product = run(&[synthetic_capture(0.3, &[(0, 1), (1, 0)])]).unwrap();
    let resolved: HashSet<TileIndex> = product.resolved.keys().copied().collect();
    let alpha = product.mosaic.alpha();

    for row in 0..SIZE / TILE {
        for col in 0..SIZE / TILE {
            let region = alpha.slice(s![row * TILE..(row + 1) * TILE, col * TILE..(col + 1) * TILE]);
            let expected = if resolved.contains(&(row, col)) { 1.0 } else { 0.0 };
            assert!(region.iter().all(|&a| a == expected), "tile ({}, {})", row, col);
        }
    }
    assert_eq!(product.unresolved, vec![(0, 1), (1, 0)]);
}

#[test]
fn test_partial_strips_never_reach_the_mosaic() {
    init_logging();
    let mut image = Array3::from_elem((5, 5, 4), 0.4);
    image.slice_mut(s![.., .., 3]).fill(0.0);

    let mut accumulator = MosaicAccumulator::new(params()).unwrap();
    accumulator.process_capture(&image, "odd", &nir_classifier).unwrap();
    let product = accumulator.finish().unwrap();

    // Canvas keeps the source size; the trailing strip stays transparent
    assert_eq!(product.mosaic.width(), 5);
    assert_eq!(product.mosaic.height(), 5);
    assert_eq!(product.grid.tile_count(), 4);
    let alpha = product.mosaic.alpha();
    assert!(alpha.slice(s![4, ..]).iter().all(|&a| a == 0.0));
    assert!(alpha.slice(s![.., 4]).iter().all(|&a| a == 0.0));
    assert!(alpha.slice(s![0..4, 0..4]).iter().all(|&a| a == 1.0));
}

#[test]
fn test_observer_sees_full_run() {
    init_logging();
    let observer = Arc::new(RecordingObserver::new());
    let mut accumulator = MosaicAccumulator::with_observer(params(), observer.clone()).unwrap();
    accumulator
        .process_capture(&synthetic_capture(0.1, &[(1, 1)]), "first", &nir_classifier)
        .unwrap();
    accumulator
        .process_capture(&synthetic_capture(0.2, &[]), "second", &nir_classifier)
        .unwrap();
    accumulator.finish().unwrap();

    let events = observer.events();
    let started: Vec<Option<usize>> = events
        .iter()
        .filter_map(|e| match e {
            MosaicEvent::CaptureStarted { unresolved, .. } => Some(*unresolved),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![None, Some(1)]);

    let resolved = events
        .iter()
        .filter(|e| matches!(e, MosaicEvent::TileResolved { .. }))
        .count();
    assert_eq!(resolved, 4);
    assert!(matches!(
        events.last(),
        Some(MosaicEvent::RunCompleted {
            termination: TerminationReason::AllResolved,
            ..
        })
    ));
}
