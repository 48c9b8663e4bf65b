#[allow(dead_code)]
mod common;

use std::collections::BTreeMap;

use echelle_core::background::{sample_nodes, SamplingParams};
use echelle_core::error::EchelleError;
use echelle_core::frame::Fiber;

use common::{echelle_frame, single_fiber, straight_apertures};

fn params(scan_step: usize, extend: bool) -> SamplingParams {
    SamplingParams {
        scan_step,
        block_mask: 4,
        extend,
    }
}

const ORDER_ROWS: [f64; 6] = [30.0, 60.0, 90.0, 120.0, 150.0, 180.0];

// ---------------------------------------------------------------------------
// Direct troughs
// ---------------------------------------------------------------------------

#[test]
fn test_troughs_at_gap_midpoints() {
    let frame = echelle_frame(220, 100, &ORDER_ROWS, |_, _| 10.0);
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(20, false)).unwrap();

    // Columns 0, 20, 40, 60, 80, 99 with five gaps each.
    assert_eq!(nodes.len(), 6 * 5);
    assert_eq!(nodes.rows_at(40.0), vec![45.0, 75.0, 105.0, 135.0, 165.0]);
    assert_eq!(nodes.rows_at(99.0), vec![45.0, 75.0, 105.0, 135.0, 165.0]);
}

#[test]
fn test_node_values_come_from_filtered_image() {
    let mut frame = echelle_frame(220, 100, &ORDER_ROWS, |_, _| 10.0);
    // A hot pixel on a trough must not leak into the node value.
    frame.data[[75, 40]] = 5000.0;
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(20, false)).unwrap();
    for (x, y, z) in nodes.iter() {
        if x == 40.0 && y == 75.0 {
            assert!((z - 10.0).abs() < 0.05, "z = {z}");
        }
    }
}

#[test]
fn test_close_midpoints_are_skipped() {
    // scan_step 100 -> midpoints within 60 rows of the last accepted one are skipped.
    let frame = echelle_frame(220, 100, &ORDER_ROWS, |_, _| 10.0);
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(100, false)).unwrap();
    assert_eq!(nodes.rows_at(0.0), vec![45.0, 135.0]);
}

#[test]
fn test_scan_includes_last_column() {
    let frame = echelle_frame(220, 101, &ORDER_ROWS, |_, _| 10.0);
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(50, false)).unwrap();
    let mut cols: Vec<f64> = nodes.x.clone();
    cols.dedup();
    assert_eq!(cols, vec![0.0, 50.0, 100.0]);
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

#[test]
fn test_extension_reaches_frame_edges() {
    let frame = echelle_frame(220, 100, &ORDER_ROWS, |_, _| 10.0);
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(20, true)).unwrap();
    assert_eq!(
        nodes.rows_at(0.0),
        vec![15.0, 45.0, 75.0, 105.0, 135.0, 165.0, 195.0]
    );
}

#[test]
fn test_no_extension_below_four_gaps() {
    let rows = [50.0, 100.0, 150.0];
    let frame = echelle_frame(200, 60, &rows, |_, _| 10.0);
    let apers = single_fiber(straight_apertures(&rows));
    let nodes = sample_nodes(&frame, &apers, &params(20, true)).unwrap();
    assert_eq!(nodes.rows_at(0.0), vec![75.0, 125.0]);
}

#[test]
fn test_rows_strictly_increase_per_column() {
    let frame = echelle_frame(220, 200, &ORDER_ROWS, |r, c| {
        10.0 + 0.05 * c as f32 + 0.02 * r as f32
    });
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(20, true)).unwrap();
    assert!(!nodes.is_empty());

    let mut cols: Vec<f64> = nodes.x.clone();
    cols.dedup();
    for x in cols {
        let rows = nodes.rows_at(x);
        assert!(rows.windows(2).all(|p| p[1] > p[0]), "column {x}: {rows:?}");
        assert!(rows.iter().all(|&r| (0.0..=219.0).contains(&r)));
    }
}

// ---------------------------------------------------------------------------
// Masks, channels, edge cases
// ---------------------------------------------------------------------------

#[test]
fn test_masked_pixels_are_dropped() {
    let mut frame = echelle_frame(220, 100, &ORDER_ROWS, |_, _| 10.0);
    frame.mask[[75, 0]] = 4;
    // Bit outside block_mask: still usable.
    frame.mask[[105, 0]] = 1;
    let apers = single_fiber(straight_apertures(&ORDER_ROWS));
    let nodes = sample_nodes(&frame, &apers, &params(20, false)).unwrap();
    assert_eq!(nodes.rows_at(0.0), vec![45.0, 105.0, 135.0, 165.0]);
}

#[test]
fn test_two_fibers_only_gaps_between_apertures() {
    // Fiber A and B alternate; the gap A(n)->B(n) holds light of both fibers
    // and is not sampled.
    let a_rows = [30.0, 90.0, 150.0];
    let b_rows = [60.0, 120.0, 180.0];
    let all: Vec<f64> = a_rows.iter().chain(&b_rows).copied().collect();
    let frame = echelle_frame(220, 60, &all, |_, _| 10.0);

    let mut apers = BTreeMap::new();
    apers.insert(Fiber::A, straight_apertures(&a_rows));
    apers.insert(Fiber::B, straight_apertures(&b_rows));
    let nodes = sample_nodes(&frame, &apers, &params(20, false)).unwrap();
    assert_eq!(nodes.rows_at(0.0), vec![75.0, 135.0]);
}

#[test]
fn test_no_apertures_gives_empty_set() {
    let frame = echelle_frame(50, 50, &[], |_, _| 10.0);
    let nodes = sample_nodes(&frame, &BTreeMap::new(), &params(10, true)).unwrap();
    assert!(nodes.is_empty());
}

#[test]
fn test_zero_scan_step_is_config_error() {
    let frame = echelle_frame(50, 50, &[], |_, _| 10.0);
    let apers = single_fiber(straight_apertures(&[10.0, 40.0]));
    let err = sample_nodes(&frame, &apers, &params(0, true)).unwrap_err();
    assert!(matches!(err, EchelleError::InvalidConfig(_)));
}
