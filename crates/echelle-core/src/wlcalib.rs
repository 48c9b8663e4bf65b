use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EchelleError, Result};
use crate::math::poly::Poly2d;

/// Maps an aperture and a dispersion pixel to its diffraction order and
/// wavelength.
pub trait WavelengthSolution {
    fn order_and_wavelength(&self, aperture: i32, pixel: f64) -> Option<(i32, f64)>;
}

impl<F> WavelengthSolution for F
where
    F: Fn(i32, f64) -> Option<(i32, f64)>,
{
    fn order_and_wavelength(&self, aperture: i32, pixel: f64) -> Option<(i32, f64)> {
        self(aperture, pixel)
    }
}

/// Echelle dispersion relation: `order = k * aperture + offset` and
/// `order * wavelength = P(pixel / (npixel - 1), order)`, with `P` a
/// tensor-product polynomial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EchelleDispersion {
    pub k: i32,
    pub offset: i32,
    pub npixel: usize,
    pub xorder: usize,
    pub yorder: usize,
    /// Row-major `(xorder + 1) x (yorder + 1)` coefficients.
    pub coeffs: Vec<f64>,
}

impl EchelleDispersion {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(EchelleError::InvalidConfig(
                "dispersion k must be +1 or -1".into(),
            ));
        }
        if self.npixel < 2 {
            return Err(EchelleError::InvalidConfig(
                "dispersion npixel must be at least 2".into(),
            ));
        }
        let expected = Poly2d::n_terms(self.xorder, self.yorder);
        if self.coeffs.len() != expected {
            return Err(EchelleError::InvalidConfig(format!(
                "dispersion has {} coefficients, expected {expected}",
                self.coeffs.len()
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let solution: Self = toml::from_str(&contents)?;
        solution.validate()?;
        Ok(solution)
    }

    pub fn order(&self, aperture: i32) -> i32 {
        self.k * aperture + self.offset
    }

    fn poly(&self) -> Poly2d {
        Poly2d {
            xorder: self.xorder,
            yorder: self.yorder,
            coeffs: self.coeffs.clone(),
        }
    }
}

impl WavelengthSolution for EchelleDispersion {
    fn order_and_wavelength(&self, aperture: i32, pixel: f64) -> Option<(i32, f64)> {
        let order = self.order(aperture);
        if order <= 0 || self.npixel < 2 {
            return None;
        }
        let u = pixel / (self.npixel - 1) as f64;
        let wavelength = self.poly().eval(u, order as f64) / order as f64;
        wavelength.is_finite().then_some((order, wavelength))
    }
}
