//! Separate the fragments of one precursor from co-fragmenting interferences
//! by comparing each fragment's elution profile with the precursor's.
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeconvolutionParams {
    pub correlation_threshold: f64,
    pub min_points: usize,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.7,
            min_points: 3,
        }
    }
}

/// A fragment trace that follows the model profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeconvolutedFragment {
    /// Position of the fragment trace in the input
    pub index: usize,
    pub intensity: f64,
    pub correlation: f64,
}

/// Pearson correlation of two equal length series. `None` when either is
/// constant.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x[..n].iter().zip(y[..n].iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

/// Subtract the straight line joining the two ends of `values`, clamping at zero
fn baseline_corrected(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }
    let first = values[0];
    let slope = (values[n - 1] - first) / (n - 1) as f64;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (v - (first + slope * i as f64)).max(0.0))
        .collect()
}

/// The bounds of the model peak around `top`, following the trace downhill
/// on both sides
fn model_bounds(model: &[f64], top: usize) -> (usize, usize) {
    let mut left = top;
    while left > 0 && model[left - 1] <= model[left] {
        left -= 1;
    }
    let mut right = top;
    while right + 1 < model.len() && model[right + 1] <= model[right] {
        right += 1;
    }
    (left, right)
}

/// Keep the fragment traces whose baseline-corrected profile correlates with
/// the model profile. Each kept fragment's intensity is its least squares
/// scale on the model times the model apex, never more than the fragment's
/// own intensity at the apex.
///
/// Returns `None` when the model has too few points or no fragment correlates.
pub fn deconvolute(
    model: &[f64],
    fragments: &[Vec<f64>],
    top: usize,
    params: &DeconvolutionParams,
) -> Option<Vec<DeconvolutedFragment>> {
    if model.len() < params.min_points || top >= model.len() {
        return None;
    }
    let (left, right) = model_bounds(model, top);
    if right - left + 1 < params.min_points {
        return None;
    }
    let model_region = baseline_corrected(&model[left..=right]);
    let model_apex = model_region[top - left];
    let model_norm: f64 = model_region.iter().map(|v| v * v).sum();
    if model_apex <= 0.0 || model_norm <= 0.0 {
        return None;
    }

    let mut kept = Vec::new();
    for (index, trace) in fragments.iter().enumerate() {
        if trace.len() != model.len() {
            continue;
        }
        let region = baseline_corrected(&trace[left..=right]);
        let Some(correlation) = pearson_correlation(&model_region, &region) else {
            continue;
        };
        if correlation < params.correlation_threshold {
            continue;
        }
        let scale = region
            .iter()
            .zip(model_region.iter())
            .map(|(f, m)| f * m)
            .sum::<f64>()
            / model_norm;
        let intensity = (scale * model_apex).min(trace[top]);
        if intensity <= 0.0 {
            continue;
        }
        kept.push(DeconvolutedFragment {
            index,
            intensity,
            correlation,
        });
    }
    trace!("{} of {} fragments correlate with the model", kept.len(), fragments.len());
    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}
