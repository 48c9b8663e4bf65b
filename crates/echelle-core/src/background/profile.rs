use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aperture::ApertureSet;
use crate::math::stats::median;
use crate::wlcalib::WavelengthSolution;

/// Background brightness along one aperture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub aperture: i32,
    /// Diffraction order; 0 when no wavelength solution was given.
    pub order: i32,
    /// Cross-dispersion position of the trace at the reference column.
    pub position: f64,
    /// Wavelength at the reference column; 0 when uncalibrated.
    pub wavelength: f64,
    /// Median background along the trace.
    pub brightness: f64,
}

/// Per-aperture brightness of a background map or frame, ordered by
/// aperture index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrightnessProfile {
    entries: Vec<ProfileEntry>,
}

impl BrightnessProfile {
    /// Build from entries in any order. A repeated aperture keeps its last
    /// entry.
    pub fn from_entries(mut entries: Vec<ProfileEntry>) -> Self {
        entries.reverse();
        entries.sort_by_key(|e| e.aperture);
        entries.dedup_by_key(|e| e.aperture);
        Self { entries }
    }

    /// Profile from `(aperture, brightness)` pairs only.
    pub fn from_brightness(values: &[(i32, f64)]) -> Self {
        Self::from_entries(
            values
                .iter()
                .map(|&(aperture, brightness)| ProfileEntry {
                    aperture,
                    order: 0,
                    position: 0.0,
                    wavelength: 0.0,
                    brightness,
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, aperture: i32) -> Option<&ProfileEntry> {
        self.entries
            .binary_search_by_key(&aperture, |e| e.aperture)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn brightness(&self, aperture: i32) -> Option<f64> {
        self.get(aperture).map(|e| e.brightness)
    }

    pub fn apertures(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.iter().map(|e| e.aperture)
    }
}

/// Sample `image` along every aperture trace.
///
/// The brightness of an aperture is the median of the pixels nearest to its
/// trace over all columns. Position, order and wavelength are taken at the
/// reference column `w / 2`; apertures outside the frame there are skipped.
pub fn derive_profile(
    image: &Array2<f32>,
    apertures: &ApertureSet,
    solution: Option<&dyn WavelengthSolution>,
) -> BrightnessProfile {
    let (h, w) = image.dim();
    let mut entries = Vec::with_capacity(apertures.len());
    if h == 0 || w == 0 {
        return BrightnessProfile::default();
    }
    let ref_col = (w / 2) as f64;

    for (aperture, trace) in apertures.iter() {
        let position = trace.position(ref_col);
        if nearest_row(position, h).is_none() {
            continue;
        }

        let mut samples: Vec<f64> = (0..w)
            .filter_map(|col| {
                nearest_row(trace.position(col as f64), h).map(|row| image[[row, col]] as f64)
            })
            .collect();
        let Some(brightness) = median(&mut samples) else {
            continue;
        };

        let (order, wavelength) = solution
            .and_then(|s| s.order_and_wavelength(aperture, ref_col))
            .unwrap_or((0, 0.0));

        entries.push(ProfileEntry {
            aperture,
            order,
            position,
            wavelength,
            brightness,
        });
    }

    debug!(apertures = entries.len(), "Derived brightness profile");
    BrightnessProfile::from_entries(entries)
}

fn nearest_row(position: f64, h: usize) -> Option<usize> {
    let row = position.round();
    (row.is_finite() && row >= 0.0 && row <= h as f64 - 1.0).then_some(row as usize)
}
