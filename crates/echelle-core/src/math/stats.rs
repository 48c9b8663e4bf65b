/// Mean and population standard deviation over the entries where `mask` is
/// true. Returns `None` when nothing is selected.
pub fn masked_mean_std(values: &[f64], mask: &[bool]) -> Option<(f64, f64)> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (&v, &m) in values.iter().zip(mask) {
        if m {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;

    let mut var_sum = 0.0;
    for (&v, &m) in values.iter().zip(mask) {
        if m {
            let d = v - mean;
            var_sum += d * d;
        }
    }
    Some((mean, (var_sum / count as f64).sqrt()))
}

/// Median of a slice (mean of the two middle values for even length).
/// Non-finite values are ignored. Reorders `values`.
pub fn median(values: &mut Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    Some(if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    })
}
