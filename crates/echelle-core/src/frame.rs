use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{EchelleError, Result};

/// A single CCD exposure after overscan, bias and flat correction.
/// Pixel values are counts, row-major, shape = (height, width).
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Array2<f32>,
    /// Per-pixel bitmask; a pixel is bad when `mask & block_mask != 0`.
    pub mask: Array2<u16>,
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Create a frame with an all-good mask.
    pub fn new(data: Array2<f32>) -> Self {
        let mask = Array2::zeros(data.dim());
        Self {
            data,
            mask,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn with_mask(data: Array2<f32>, mask: Array2<u16>) -> Result<Self> {
        if data.dim() != mask.dim() {
            return Err(EchelleError::ShapeMismatch {
                expected: data.dim(),
                actual: mask.dim(),
            });
        }
        Ok(Self {
            data,
            mask,
            metadata: FrameMetadata::default(),
        })
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub file_id: String,
    /// Object string as logged at the telescope; fibers separated by `|`.
    pub object: String,
    /// Exposure time in seconds.
    pub exptime: f64,
    pub obs_date: Option<NaiveDateTime>,
}

/// Fiber label of a multi-fiber instrument (`A`, `B`, ...).
///
/// Serialized as its label; deserialization goes through [`FromStr`], so
/// only single ASCII letters are accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fiber(char);

impl Fiber {
    pub const A: Fiber = Fiber('A');
    pub const B: Fiber = Fiber('B');

    /// Fiber for the `index`-th slot of an object string (0 -> `A`).
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|&i| i < 26)
            .map(|i| Fiber((b'A' + i) as char))
    }
}

impl TryFrom<String> for Fiber {
    type Error = EchelleError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Fiber> for String {
    fn from(fiber: Fiber) -> Self {
        fiber.0.to_string()
    }
}

impl fmt::Display for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fiber {
    type Err = EchelleError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(Fiber(c.to_ascii_uppercase())),
            _ => Err(EchelleError::InvalidConfig(format!(
                "invalid fiber label '{s}'"
            ))),
        }
    }
}

/// Split a multi-fiber object string into `(fiber, object)` pairs.
///
/// Slots are separated by `delimiter`; empty slots are unilluminated fibers
/// and are left out: `"Star | | Comb"` gives `[(A, "Star"), (C, "Comb")]`.
pub fn parse_fiber_objects(object: &str, delimiter: char) -> Vec<(Fiber, String)> {
    object
        .split(delimiter)
        .map(str::trim)
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .filter_map(|(i, name)| Fiber::from_index(i).map(|f| (f, name.to_string())))
        .collect()
}
