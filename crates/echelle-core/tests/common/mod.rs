use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use echelle_core::aperture::{ApertureSet, ApertureTrace};
use echelle_core::background::{BackgroundInfo, BackgroundLightModel, BrightnessProfile};
use echelle_core::frame::{Fiber, Frame};

/// Straight, horizontal apertures at the given rows, numbered from 1.
pub fn straight_apertures(rows: &[f64]) -> ApertureSet {
    rows.iter()
        .enumerate()
        .map(|(i, &r)| (i as i32 + 1, ApertureTrace::constant(r)))
        .collect()
}

/// A single-fiber aperture map for the sampler.
pub fn single_fiber(set: ApertureSet) -> BTreeMap<Fiber, ApertureSet> {
    [(Fiber::A, set)].into_iter().collect()
}

/// Synthetic echelle frame: Gaussian order profiles (sigma 3 px, peak 1000)
/// at `order_rows` on top of `background(row, col)`.
pub fn echelle_frame<F>(h: usize, w: usize, order_rows: &[f64], background: F) -> Frame
where
    F: Fn(usize, usize) -> f32,
{
    echelle_frame_with_peak(h, w, order_rows, 1000.0, background)
}

/// [`echelle_frame`] with orders of the given peak brightness.
pub fn echelle_frame_with_peak<F>(
    h: usize,
    w: usize,
    order_rows: &[f64],
    peak: f64,
    background: F,
) -> Frame
where
    F: Fn(usize, usize) -> f32,
{
    let data = Array2::from_shape_fn((h, w), |(r, c)| {
        let orders: f64 = order_rows
            .iter()
            .map(|&center| {
                let d = r as f64 - center;
                peak * (-d * d / 18.0).exp()
            })
            .sum();
        background(r, c) + orders as f32
    });
    Frame::new(data)
}

/// Add seeded Gaussian noise (Box-Muller) to a frame.
pub fn add_noise(frame: &mut Frame, sigma: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for v in frame.data.iter_mut() {
        let u1: f64 = rng.random::<f64>().max(1e-12);
        let u2: f64 = rng.random::<f64>();
        let n = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        *v += sigma * n as f32;
    }
}

pub fn date(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

/// A stored background with a constant surface and the given profile.
pub fn model(
    file_id: &str,
    fiber: Fiber,
    object: &str,
    profile: &[(i32, f64)],
    shape: (usize, usize),
    fill: f32,
    obs_date: Option<NaiveDateTime>,
) -> BackgroundLightModel {
    let mut info = BackgroundInfo::new(file_id, fiber, object);
    info.obs_date = obs_date;
    info.exptime = 300.0;
    BackgroundLightModel::new(
        info,
        Array2::from_elem(shape, fill),
        BrightnessProfile::from_brightness(profile),
    )
}
