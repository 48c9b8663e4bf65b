use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// 3x3 median filter. Borders repeat the edge pixel, which for a 3x3
/// window is the same as half-sample reflection.
pub fn median_filter_3x3(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    if h == 0 || w == 0 {
        return result;
    }

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out)| filter_row(data, row, out));
    } else {
        for (row, out) in result.axis_iter_mut(Axis(0)).enumerate() {
            filter_row(data, row, out);
        }
    }
    result
}

fn filter_row(data: &Array2<f32>, row: usize, mut out: ArrayViewMut1<f32>) {
    let (h, w) = data.dim();
    let mut window = [0.0f32; 9];
    for col in 0..w {
        let mut k = 0;
        for dr in -1isize..=1 {
            let r = (row as isize + dr).clamp(0, h as isize - 1) as usize;
            for dc in -1isize..=1 {
                let c = (col as isize + dc).clamp(0, w as isize - 1) as usize;
                window[k] = data[[r, c]];
                k += 1;
            }
        }
        window.sort_unstable_by(|a, b| a.total_cmp(b));
        out[col] = window[4];
    }
}
