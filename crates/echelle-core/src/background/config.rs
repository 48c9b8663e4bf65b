use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_BLOCK_MASK, DEFAULT_CLIP_SIGMA, DEFAULT_MAXITER, DEFAULT_SCAN_STEP, DEFAULT_XORDER,
    DEFAULT_YORDER,
};
use crate::error::{EchelleError, Result};

use super::nodes::SamplingParams;

/// Parameters of the iterative sigma-clipped polynomial fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolynomialParams {
    /// Polynomial order along the dispersion (x) axis.
    #[serde(default = "default_xorder")]
    pub xorder: usize,
    /// Polynomial order along the cross-dispersion (y) axis.
    #[serde(default = "default_yorder")]
    pub yorder: usize,
    /// Maximum number of fit/clip rounds.
    #[serde(default = "default_maxiter")]
    pub maxiter: usize,
    /// Nodes with residual above `upper_clip * sigma` are rejected.
    #[serde(default = "default_clip")]
    pub upper_clip: f64,
    /// Nodes with residual below `-lower_clip * sigma` are rejected.
    #[serde(default = "default_clip")]
    pub lower_clip: f64,
}

fn default_xorder() -> usize {
    DEFAULT_XORDER
}
fn default_yorder() -> usize {
    DEFAULT_YORDER
}
fn default_maxiter() -> usize {
    DEFAULT_MAXITER
}
fn default_clip() -> f64 {
    DEFAULT_CLIP_SIGMA
}

impl Default for PolynomialParams {
    fn default() -> Self {
        Self {
            xorder: DEFAULT_XORDER,
            yorder: DEFAULT_YORDER,
            maxiter: DEFAULT_MAXITER,
            upper_clip: DEFAULT_CLIP_SIGMA,
            lower_clip: DEFAULT_CLIP_SIGMA,
        }
    }
}

/// How the background surface is built from the nodes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FitMethod {
    /// Robust 2-D polynomial with asymmetric sigma clipping.
    Polynomial(PolynomialParams),
    /// Cubic scattered-data interpolation through every node.
    Interpolation,
}

impl Default for FitMethod {
    fn default() -> Self {
        Self::Polynomial(PolynomialParams::default())
    }
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polynomial(p) => write!(f, "Polynomial (x{}, y{})", p.xorder, p.yorder),
            Self::Interpolation => write!(f, "Cubic interpolation"),
        }
    }
}

impl FromStr for FitMethod {
    type Err = EchelleError;

    /// Parses a method name; polynomial parameters take their defaults.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poly" | "polynomial" => Ok(Self::default()),
            "interp" | "interpolation" => Ok(Self::Interpolation),
            other => Err(EchelleError::InvalidConfig(format!(
                "unknown background method '{other}' (expected poly or interp)"
            ))),
        }
    }
}

/// Intensity scale the fit is done in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitScale {
    #[default]
    Linear,
    /// Fit `log10` of the node values and map the surface back with `10^x`.
    Log,
}

impl fmt::Display for FitScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Log => write!(f, "log"),
        }
    }
}

impl FromStr for FitScale {
    type Err = EchelleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "log" => Ok(Self::Log),
            other => Err(EchelleError::InvalidConfig(format!(
                "unknown background scale '{other}' (expected linear or log)"
            ))),
        }
    }
}

/// Configuration of one background-light fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default)]
    pub method: FitMethod,
    #[serde(default)]
    pub scale: FitScale,
    /// Mask bits that disqualify a pixel as a node.
    #[serde(default = "default_block_mask")]
    pub block_mask: u16,
    /// Column stride of the node scan.
    #[serde(default = "default_scan_step")]
    pub scan_step: usize,
    /// Extrapolate node columns to the frame edges.
    #[serde(default = "default_extend")]
    pub extend: bool,
}

fn default_block_mask() -> u16 {
    DEFAULT_BLOCK_MASK
}
fn default_scan_step() -> usize {
    DEFAULT_SCAN_STEP
}
fn default_extend() -> bool {
    true
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            method: FitMethod::default(),
            scale: FitScale::default(),
            block_mask: DEFAULT_BLOCK_MASK,
            scan_step: DEFAULT_SCAN_STEP,
            extend: true,
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_step == 0 {
            return Err(EchelleError::InvalidConfig(
                "scan_step must be positive".into(),
            ));
        }
        if let FitMethod::Polynomial(p) = &self.method {
            if p.maxiter == 0 {
                return Err(EchelleError::InvalidConfig(
                    "maxiter must be at least 1".into(),
                ));
            }
            if !(p.upper_clip > 0.0 && p.lower_clip > 0.0) {
                return Err(EchelleError::InvalidConfig(
                    "clip thresholds must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            scan_step: self.scan_step,
            block_mask: self.block_mask,
            extend: self.extend,
        }
    }
}
