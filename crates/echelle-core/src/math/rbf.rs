use nalgebra::{DMatrix, DVector};

use crate::error::{EchelleError, Result};

/// Polyharmonic cubic spline interpolant, `phi(r) = r^3` with an affine
/// tail, through scattered 2-D points.
///
/// Point coordinates are rescaled to the unit square spanned by the input
/// points before solving, so pixel-unit inputs stay well conditioned.
#[derive(Clone, Debug)]
pub struct CubicRbf {
    centers: Vec<(f64, f64)>,
    weights: Vec<f64>,
    affine: [f64; 3],
    offset: (f64, f64),
    scale: (f64, f64),
}

impl CubicRbf {
    /// Build the interpolant. Needs at least three non-collinear points.
    pub fn fit(points: &[(f64, f64)], values: &[f64]) -> Result<Self> {
        debug_assert_eq!(points.len(), values.len());
        let n = points.len();
        if n < 3 {
            return Err(EchelleError::InsufficientNodes {
                found: n,
                required: 3,
            });
        }

        let (offset, scale) = unit_square(points);
        let centers: Vec<(f64, f64)> = points
            .iter()
            .map(|&(x, y)| ((x - offset.0) / scale.0, (y - offset.1) / scale.1))
            .collect();

        // [K  P] [w]   [v]
        // [P' 0] [a] = [0]
        let size = n + 3;
        let mut m = DMatrix::<f64>::zeros(size, size);
        for i in 0..n {
            for j in (i + 1)..n {
                let k = kernel(centers[i], centers[j]);
                m[(i, j)] = k;
                m[(j, i)] = k;
            }
            let (x, y) = centers[i];
            m[(i, n)] = 1.0;
            m[(i, n + 1)] = x;
            m[(i, n + 2)] = y;
            m[(n, i)] = 1.0;
            m[(n + 1, i)] = x;
            m[(n + 2, i)] = y;
        }

        let mut rhs = DVector::<f64>::zeros(size);
        for (i, &v) in values.iter().enumerate() {
            rhs[i] = v;
        }

        let solution = m.lu().solve(&rhs).ok_or(EchelleError::SingularSystem)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(EchelleError::SingularSystem);
        }

        Ok(Self {
            weights: solution.rows(0, n).iter().copied().collect(),
            affine: [solution[n], solution[n + 1], solution[n + 2]],
            centers,
            offset,
            scale,
        })
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let p = ((x - self.offset.0) / self.scale.0, (y - self.offset.1) / self.scale.1);
        let mut value = self.affine[0] + self.affine[1] * p.0 + self.affine[2] * p.1;
        for (c, w) in self.centers.iter().zip(&self.weights) {
            value += w * kernel(p, *c);
        }
        value
    }
}

#[inline]
fn kernel(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    let r = (dx * dx + dy * dy).sqrt();
    r * r * r
}

fn unit_square(points: &[(f64, f64)]) -> ((f64, f64), (f64, f64)) {
    let (mut xmin, mut xmax) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut ymin, mut ymax) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        xmin = xmin.min(x);
        xmax = xmax.max(x);
        ymin = ymin.min(y);
        ymax = ymax.max(y);
    }
    let sx = if xmax > xmin { xmax - xmin } else { 1.0 };
    let sy = if ymax > ymin { ymax - ymin } else { 1.0 };
    ((xmin, ymin), (sx, sy))
}
