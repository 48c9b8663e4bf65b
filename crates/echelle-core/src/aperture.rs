use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::poly::polyval;

/// Cross-dispersion center of one spectral order as a polynomial in the
/// dispersion pixel. Coefficients are lowest order first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApertureTrace {
    pub coeffs: Vec<f64>,
}

impl ApertureTrace {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    /// A straight trace at a fixed row.
    pub fn constant(row: f64) -> Self {
        Self { coeffs: vec![row] }
    }

    /// Center row at dispersion pixel `x`.
    pub fn position(&self, x: f64) -> f64 {
        polyval(&self.coeffs, x)
    }
}

/// Apertures of one fiber, keyed by aperture index. Indices need not be
/// contiguous.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ApertureSetRepr", into = "ApertureSetRepr")]
pub struct ApertureSet {
    apertures: BTreeMap<i32, ApertureTrace>,
}

impl ApertureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: i32, trace: ApertureTrace) {
        self.apertures.insert(index, trace);
    }

    pub fn get(&self, index: i32) -> Option<&ApertureTrace> {
        self.apertures.get(&index)
    }

    pub fn contains(&self, index: i32) -> bool {
        self.apertures.contains_key(&index)
    }

    pub fn min_index(&self) -> Option<i32> {
        self.apertures.keys().next().copied()
    }

    pub fn max_index(&self) -> Option<i32> {
        self.apertures.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.apertures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apertures.is_empty()
    }

    /// Apertures in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &ApertureTrace)> {
        self.apertures.iter().map(|(&i, t)| (i, t))
    }

    /// Load an aperture set from a TOML file with `[[aperture]]` tables.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

impl FromIterator<(i32, ApertureTrace)> for ApertureSet {
    fn from_iter<I: IntoIterator<Item = (i32, ApertureTrace)>>(iter: I) -> Self {
        Self {
            apertures: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct ApertureSetRepr {
    #[serde(default, rename = "aperture")]
    apertures: Vec<ApertureEntry>,
}

#[derive(Clone, Serialize, Deserialize)]
struct ApertureEntry {
    index: i32,
    coeffs: Vec<f64>,
}

impl From<ApertureSetRepr> for ApertureSet {
    fn from(repr: ApertureSetRepr) -> Self {
        repr.apertures
            .into_iter()
            .map(|e| (e.index, ApertureTrace::new(e.coeffs)))
            .collect()
    }
}

impl From<ApertureSet> for ApertureSetRepr {
    fn from(set: ApertureSet) -> Self {
        Self {
            apertures: set
                .apertures
                .into_iter()
                .map(|(index, t)| ApertureEntry {
                    index,
                    coeffs: t.coeffs,
                })
                .collect(),
        }
    }
}
