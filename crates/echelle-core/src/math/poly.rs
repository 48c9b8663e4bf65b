use nalgebra::{DMatrix, DVector};

use crate::consts::SVD_EPSILON;
use crate::error::{EchelleError, Result};

/// Evaluate a 1-D polynomial (coefficients lowest order first) with Horner's rule.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Least-squares 1-D polynomial fit. Returns coefficients lowest order first.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
    debug_assert_eq!(x.len(), y.len());
    let nterms = degree + 1;
    if x.len() < nterms {
        return Err(EchelleError::InsufficientNodes {
            found: x.len(),
            required: nterms,
        });
    }

    let mut a = DMatrix::<f64>::zeros(x.len(), nterms);
    for (row, &xv) in x.iter().enumerate() {
        let mut p = 1.0;
        for col in 0..nterms {
            a[(row, col)] = p;
            p *= xv;
        }
    }
    let b = DVector::from_column_slice(y);
    Ok(lstsq(a, b)?.iter().copied().collect())
}

/// Solve `min |A c - b|` via SVD.
pub fn lstsq(a: DMatrix<f64>, b: DVector<f64>) -> Result<DVector<f64>> {
    let svd = a.svd(true, true);
    svd.solve(&b, SVD_EPSILON)
        .map_err(|_| EchelleError::SingularSystem)
}

/// Tensor-product 2-D polynomial `sum c[i][j] x^i y^j` with
/// `0 <= i <= xorder`, `0 <= j <= yorder`.
#[derive(Clone, Debug, PartialEq)]
pub struct Poly2d {
    pub xorder: usize,
    pub yorder: usize,
    /// Row-major `(xorder + 1) x (yorder + 1)`: index `i * (yorder + 1) + j`.
    pub coeffs: Vec<f64>,
}

impl Poly2d {
    pub fn n_terms(xorder: usize, yorder: usize) -> usize {
        (xorder + 1) * (yorder + 1)
    }

    /// Least-squares fit over the points where `mask` is true.
    pub fn fit(
        x: &[f64],
        y: &[f64],
        z: &[f64],
        mask: &[bool],
        xorder: usize,
        yorder: usize,
    ) -> Result<Self> {
        let nterms = Self::n_terms(xorder, yorder);
        let npts = mask.iter().filter(|&&m| m).count();
        if npts < nterms {
            return Err(EchelleError::InsufficientNodes {
                found: npts,
                required: nterms,
            });
        }

        let mut a = DMatrix::<f64>::zeros(npts, nterms);
        let mut b = DVector::<f64>::zeros(npts);
        let mut xpow = vec![0.0; xorder + 1];
        let mut ypow = vec![0.0; yorder + 1];
        let mut row = 0;
        for k in 0..z.len() {
            if !mask[k] {
                continue;
            }
            fill_powers(x[k], &mut xpow);
            fill_powers(y[k], &mut ypow);
            for i in 0..=xorder {
                for j in 0..=yorder {
                    a[(row, i * (yorder + 1) + j)] = xpow[i] * ypow[j];
                }
            }
            b[row] = z[k];
            row += 1;
        }

        let coeffs = lstsq(a, b)?.iter().copied().collect();
        Ok(Self {
            xorder,
            yorder,
            coeffs,
        })
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        polyval(&self.column_coeffs(y), x)
    }

    /// Collapse the `y` dependence: coefficients of the 1-D polynomial in `x`
    /// along the line at fixed `y`.
    pub fn column_coeffs(&self, y: f64) -> Vec<f64> {
        let ny = self.yorder + 1;
        (0..=self.xorder)
            .map(|i| polyval(&self.coeffs[i * ny..(i + 1) * ny], y))
            .collect()
    }
}

fn fill_powers(v: f64, out: &mut [f64]) {
    let mut p = 1.0;
    for o in out.iter_mut() {
        *o = p;
        p *= v;
    }
}
