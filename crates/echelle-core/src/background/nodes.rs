use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use tracing::{info, trace};

use crate::aperture::ApertureSet;
use crate::consts::{
    EXTENSION_POLY_DEGREE, MAX_EXTRAPOLATION_STEPS, MIDPOINT_SEARCH_FRACTION,
    MIDPOINT_SPACING_FRACTION, MIN_EXTENSION_NODES,
};
use crate::error::{EchelleError, Result};
use crate::filters::median_filter_3x3;
use crate::frame::{Fiber, Frame};
use crate::math::poly::{polyfit, polyval};

/// Inter-order background samples: parallel `(x, y, z)` sequences, in scan
/// order (column by column, rows increasing within a column).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeSet {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((&x, &y), &z)| (x, y, z))
    }

    /// Rows of the nodes sampled at column `x`.
    pub fn rows_at(&self, x: f64) -> Vec<f64> {
        self.iter()
            .filter(|&(nx, _, _)| nx == x)
            .map(|(_, y, _)| y)
            .collect()
    }
}

/// Parameters of the inter-order node scan.
#[derive(Clone, Copy, Debug)]
pub struct SamplingParams {
    /// Column stride of the scan.
    pub scan_step: usize,
    /// Mask bits that disqualify a pixel as a node.
    pub block_mask: u16,
    /// Extrapolate each column's node sequence to the frame edges.
    pub extend: bool,
}

/// Locate inter-order background nodes.
///
/// The frame is 3x3 median filtered first; node values are read from the
/// filtered image. `apertures` holds one aperture set per illuminated
/// fiber, visited in fiber order within each aperture index.
pub fn sample_nodes(
    frame: &Frame,
    apertures: &BTreeMap<Fiber, ApertureSet>,
    params: &SamplingParams,
) -> Result<NodeSet> {
    if params.scan_step == 0 {
        return Err(EchelleError::InvalidConfig(
            "scan_step must be positive".into(),
        ));
    }
    let (h, w) = frame.shape();
    let mut nodes = NodeSet::new();
    if h == 0 || w == 0 {
        return Ok(nodes);
    }

    let (Some(min_aper), Some(max_aper)) = (
        apertures.values().filter_map(ApertureSet::min_index).min(),
        apertures.values().filter_map(ApertureSet::max_index).max(),
    ) else {
        return Ok(nodes);
    };

    let filtered = median_filter_3x3(&frame.data);

    for x in scan_columns(w, params.scan_step) {
        let column = filtered.column(x);
        let direct = column_troughs(column, apertures, min_aper, max_aper, x, params.scan_step);

        let rows = if params.extend {
            extend_rows(&direct, h)
        } else {
            direct.clone()
        };
        let rows = monotonic_rows(&rows, h);

        let mut masked = 0usize;
        let mut kept = 0usize;
        for row in rows {
            if is_blocked(&frame.mask, row, x, params.block_mask) {
                masked += 1;
                continue;
            }
            nodes.push(x as f64, row as f64, column[row] as f64);
            kept += 1;
        }
        trace!(column = x, direct = direct.len(), kept, masked, "Sampled column");
    }

    info!(nodes = nodes.len(), "Found background nodes");
    Ok(nodes)
}

/// Scanned columns: `0, step, 2*step, ...` plus the last column.
pub fn scan_columns(width: usize, step: usize) -> Vec<usize> {
    if width == 0 || step == 0 {
        return Vec::new();
    }
    let mut cols: Vec<usize> = (0..width).step_by(step).collect();
    if cols.last() != Some(&(width - 1)) {
        cols.push(width - 1);
    }
    cols
}

/// Trough rows between consecutive order centers of one column.
fn column_troughs(
    column: ArrayView1<f32>,
    apertures: &BTreeMap<Fiber, ApertureSet>,
    min_aper: i32,
    max_aper: i32,
    x: usize,
    scan_step: usize,
) -> Vec<usize> {
    let h = column.len();
    let min_spacing = MIDPOINT_SPACING_FRACTION * scan_step as f64;
    let mut troughs: Vec<usize> = Vec::new();
    let mut prev_center: Option<f64> = None;

    for aper in min_aper..=max_aper {
        let mut first_channel = true;
        for set in apertures.values() {
            let Some(trace) = set.get(aper) else {
                continue;
            };
            let center = trace.position(x as f64);
            if !center.is_finite() {
                continue;
            }
            if first_channel {
                first_channel = false;
                if let Some(prev) = prev_center {
                    let mid = 0.5 * (prev + center);
                    let far_enough = troughs
                        .last()
                        .is_none_or(|&last| (mid - last as f64).abs() > min_spacing);
                    if far_enough {
                        if let Some(row) = find_trough(column, prev, center, h) {
                            troughs.push(row);
                        }
                    }
                }
            }
            prev_center = Some(center);
        }
    }
    troughs
}

/// Row of minimum intensity in the central part of the gap between two
/// order centers. Ties go to the row nearest the midpoint, then the lower
/// row.
fn find_trough(column: ArrayView1<f32>, a: f64, b: f64, h: usize) -> Option<usize> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let gap = hi - lo;
    let mid = (0.5 * (lo + hi)).round();
    let radius = (MIDPOINT_SEARCH_FRACTION * gap).round().max(1.0);

    let start = (mid - radius).max(lo.ceil()).max(0.0);
    let end = (mid + radius).min(hi.floor()).min(h as f64 - 1.0);
    if start > end {
        return None;
    }

    let (start, end) = (start as usize, end as usize);
    let offset = |row: usize| (row as f64 - mid).abs();
    let mut best = start;
    for row in start..=end {
        let (v, b) = (column[row], column[best]);
        if v < b || (v == b && offset(row) < offset(best)) {
            best = row;
        }
    }
    Some(best)
}

/// Extrapolate a column's trough sequence to both frame edges with a
/// cubic fit of sequence index to row. Columns with too few troughs, or
/// whose walk does not leave the frame, keep the direct troughs only.
fn extend_rows(direct: &[usize], h: usize) -> Vec<usize> {
    if direct.len() < MIN_EXTENSION_NODES {
        return direct.to_vec();
    }
    let idx: Vec<f64> = (0..direct.len()).map(|i| i as f64).collect();
    let rows: Vec<f64> = direct.iter().map(|&r| r as f64).collect();
    let Ok(coeffs) = polyfit(&idx, &rows, EXTENSION_POLY_DEGREE) else {
        return direct.to_vec();
    };

    let (Some(after), Some(before)) = (
        walk(&coeffs, direct.len() as i64 - 1, 1, h),
        walk(&coeffs, 0, -1, h),
    ) else {
        trace!(troughs = direct.len(), "Extrapolation did not leave the frame");
        return direct.to_vec();
    };

    before
        .into_iter()
        .rev()
        .chain(direct.iter().copied())
        .chain(after)
        .collect()
}

/// Predicted rows stepping from index `from` in direction `dir` until the
/// prediction leaves `[0, h-1]`. `None` if the walk does not terminate.
fn walk(coeffs: &[f64], from: i64, dir: i64, h: usize) -> Option<Vec<usize>> {
    let mut out = Vec::new();
    let mut i = from;
    for _ in 0..MAX_EXTRAPOLATION_STEPS {
        i += dir;
        let y = polyval(coeffs, i as f64).round();
        if !y.is_finite() || y < 0.0 || y > h as f64 - 1.0 {
            return Some(out);
        }
        out.push(y as usize);
    }
    None
}

/// Keep rows inside the frame that strictly increase.
fn monotonic_rows(rows: &[usize], h: usize) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::with_capacity(rows.len());
    for &row in rows {
        if row >= h {
            continue;
        }
        if out.last().is_none_or(|&last| row > last) {
            out.push(row);
        }
    }
    out
}

fn is_blocked(mask: &Array2<u16>, row: usize, col: usize, block_mask: u16) -> bool {
    mask[[row, col]] & block_mask != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_scan_columns_includes_last() {
        assert_eq!(scan_columns(200, 50), vec![0, 50, 100, 150, 199]);
        assert_eq!(scan_columns(201, 50), vec![0, 50, 100, 150, 200]);
        assert_eq!(scan_columns(1, 50), vec![0]);
    }

    #[test]
    fn test_find_trough_picks_minimum() {
        let mut col = Array1::from_elem(100, 10.0f32);
        col[44] = 2.0;
        assert_eq!(find_trough(col.view(), 20.0, 60.0, 100), Some(44));
    }

    #[test]
    fn test_find_trough_tie_goes_to_midpoint() {
        let col = Array1::from_elem(100, 5.0f32);
        assert_eq!(find_trough(col.view(), 20.0, 60.0, 100), Some(40));
    }

    #[test]
    fn test_find_trough_window_is_central_half() {
        let mut col = Array1::from_elem(100, 5.0f32);
        // gap 40 -> window 40 +/- 10; row 25 is outside it.
        col[25] = 0.0;
        col[31] = 1.0;
        assert_eq!(find_trough(col.view(), 20.0, 60.0, 100), Some(31));
    }

    #[test]
    fn test_monotonic_rows() {
        assert_eq!(monotonic_rows(&[3, 10, 8, 12, 12, 250], 200), vec![3, 10, 12]);
    }

    #[test]
    fn test_extend_linear_sequence() {
        let direct = vec![40, 60, 80, 100];
        let rows = extend_rows(&direct, 150);
        assert_eq!(rows, vec![0, 20, 40, 60, 80, 100, 120, 140]);
    }

    #[test]
    fn test_extend_needs_four_troughs() {
        let direct = vec![40, 60, 80];
        assert_eq!(extend_rows(&direct, 150), direct);
    }

    #[test]
    fn test_walk_bounded_for_flat_prediction() {
        // Constant polynomial never leaves the frame.
        assert!(walk(&[50.0], 0, 1, 100).is_none());
    }
}
