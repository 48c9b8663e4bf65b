use std::collections::BTreeSet;

use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::consts::{EPSILON, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{EchelleError, Result};
use crate::math::poly::{polyval, Poly2d};
use crate::math::rbf::CubicRbf;
use crate::math::stats::masked_mean_std;

use super::config::{FitMethod, FitScale, PolynomialParams};
use super::nodes::NodeSet;

/// Statistics of one fit/clip round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationStats {
    pub iteration: usize,
    pub sigma: f64,
    pub accepted_before: usize,
    pub accepted_after: usize,
}

/// A fitted background surface and its per-node diagnostics.
#[derive(Clone, Debug)]
pub struct SurfaceFit {
    /// Background over the full frame, in counts.
    pub surface: Array2<f32>,
    /// Nodes used by the final fit.
    pub accepted: Vec<bool>,
    /// Node residuals in fit space (log10 when fitting in log scale).
    pub residuals: Vec<f64>,
    pub iterations: Vec<IterationStats>,
}

impl SurfaceFit {
    pub fn accepted_count(&self) -> usize {
        self.accepted.iter().filter(|&&a| a).count()
    }
}

/// Fit a smooth background surface of `shape = (h, w)` through `nodes`.
///
/// `initial_mask` restricts the first polynomial round to the given nodes;
/// refitting with a converged fit's `accepted` mask reproduces its surface.
pub fn fit_surface(
    shape: (usize, usize),
    nodes: &NodeSet,
    method: &FitMethod,
    scale: FitScale,
    initial_mask: Option<&[bool]>,
) -> Result<SurfaceFit> {
    if let Some(mask) = initial_mask {
        if mask.len() != nodes.len() {
            return Err(EchelleError::InvalidConfig(format!(
                "initial mask has {} entries for {} nodes",
                mask.len(),
                nodes.len()
            )));
        }
    }

    let z = match scale {
        FitScale::Linear => nodes.z.clone(),
        FitScale::Log => log_values(&nodes.z)?,
    };

    let mut fit = match method {
        FitMethod::Polynomial(params) => fit_polynomial(shape, nodes, &z, params, initial_mask)?,
        FitMethod::Interpolation => fit_interpolation(shape, nodes, &z)?,
    };

    if scale == FitScale::Log {
        fit.surface.mapv_inplace(|v| 10f32.powf(v));
    }
    Ok(fit)
}

/// `log10` of node values. Non-positive values are clamped to the smallest
/// positive one first.
fn log_values(z: &[f64]) -> Result<Vec<f64>> {
    let min_positive = z
        .iter()
        .copied()
        .filter(|&v| v > 0.0)
        .min_by(|a, b| a.total_cmp(b))
        .ok_or_else(|| {
            EchelleError::InvalidConfig("log scale needs at least one positive node".into())
        })?;
    Ok(z.iter()
        .map(|&v| (if v > 0.0 { v } else { min_positive }).log10())
        .collect())
}

fn fit_polynomial(
    shape: (usize, usize),
    nodes: &NodeSet,
    z: &[f64],
    params: &PolynomialParams,
    initial_mask: Option<&[bool]>,
) -> Result<SurfaceFit> {
    let (h, w) = shape;
    let xs: Vec<f64> = nodes.x.iter().map(|&x| x / w as f64).collect();
    let ys: Vec<f64> = nodes.y.iter().map(|&y| y / h as f64).collect();

    let mut mask: Vec<bool> = match initial_mask {
        Some(m) => m.to_vec(),
        None => vec![true; z.len()],
    };

    let xorder = conditioned_order(&nodes.x, &mask, params.xorder, "x");
    let yorder = conditioned_order(&nodes.y, &mask, params.yorder, "y");

    let mut poly = Poly2d::fit(&xs, &ys, z, &mask, xorder, yorder)?;
    let mut residuals = node_residuals(&poly, &xs, &ys, z);
    let mut iterations = Vec::new();
    let min_accepted = Poly2d::n_terms(xorder, yorder);

    for iteration in 0..params.maxiter {
        let before = count(&mask);
        let Some((_, sigma)) = masked_mean_std(&residuals, &mask) else {
            break;
        };
        let new_mask: Vec<bool> = mask
            .iter()
            .zip(&residuals)
            .map(|(&m, &r)| m && r < params.upper_clip * sigma && r > -params.lower_clip * sigma)
            .collect();
        let after = count(&new_mask);

        debug!(iteration, sigma, accepted = before, accepted_new = after, "Background fit round");
        iterations.push(IterationStats {
            iteration,
            sigma,
            accepted_before: before,
            accepted_after: after,
        });

        if sigma < EPSILON || after == before {
            break;
        }
        if after < min_accepted {
            warn!(
                accepted = after,
                required = min_accepted,
                "Clipping left too few nodes, keeping previous fit"
            );
            break;
        }
        if iteration + 1 == params.maxiter {
            break;
        }

        mask = new_mask;
        poly = Poly2d::fit(&xs, &ys, z, &mask, xorder, yorder)?;
        residuals = node_residuals(&poly, &xs, &ys, z);
    }

    let surface = evaluate_grid(shape, |row, mut out| {
        let coeffs = poly.column_coeffs(row as f64 / h as f64);
        for (col, v) in out.iter_mut().enumerate() {
            *v = polyval(&coeffs, col as f64 / w as f64) as f32;
        }
    });

    Ok(SurfaceFit {
        surface,
        accepted: mask,
        residuals,
        iterations,
    })
}

fn fit_interpolation(shape: (usize, usize), nodes: &NodeSet, z: &[f64]) -> Result<SurfaceFit> {
    let points: Vec<(f64, f64)> = nodes.x.iter().copied().zip(nodes.y.iter().copied()).collect();
    let rbf = CubicRbf::fit(&points, z)?;
    let residuals = points
        .iter()
        .zip(z)
        .map(|(&(x, y), &v)| v - rbf.eval(x, y))
        .collect();

    let surface = evaluate_grid(shape, |row, mut out| {
        for (col, v) in out.iter_mut().enumerate() {
            *v = rbf.eval(col as f64, row as f64) as f32;
        }
    });

    Ok(SurfaceFit {
        surface,
        accepted: vec![true; z.len()],
        residuals,
        iterations: Vec::new(),
    })
}

/// Lower the polynomial order on one axis when the accepted nodes do not
/// have enough distinct coordinates to constrain it.
fn conditioned_order(coords: &[f64], mask: &[bool], order: usize, axis: &str) -> usize {
    let distinct: BTreeSet<u64> = coords
        .iter()
        .zip(mask)
        .filter(|(_, &m)| m)
        .map(|(&c, _)| c.to_bits())
        .collect();
    let limit = distinct.len().saturating_sub(1);
    if order > limit {
        warn!(axis, order, distinct = distinct.len(), "Reducing background polynomial order");
        limit
    } else {
        order
    }
}

fn node_residuals(poly: &Poly2d, xs: &[f64], ys: &[f64], z: &[f64]) -> Vec<f64> {
    xs.iter()
        .zip(ys)
        .zip(z)
        .map(|((&x, &y), &v)| v - poly.eval(x, y))
        .collect()
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

/// Fill an `h x w` grid row by row, in parallel for large frames.
fn evaluate_grid<F>(shape: (usize, usize), fill_row: F) -> Array2<f32>
where
    F: Fn(usize, ArrayViewMut1<f32>) + Sync,
{
    let (h, w) = shape;
    let mut grid = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        grid.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out)| fill_row(row, out));
    } else {
        for (row, out) in grid.axis_iter_mut(Axis(0)).enumerate() {
            fill_row(row, out);
        }
    }
    grid
}
