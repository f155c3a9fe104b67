//! Spectrum and precursor similarity measures
use mzpeaks::peak::MZPoint;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SpectrumSimilarity {
    pub simple_dot_product: f64,
    pub weighted_dot_product: f64,
    pub reverse_dot_product: f64,
    pub matched_peaks_count: usize,
    /// Fraction of reference peaks with a query counterpart
    pub matched_peaks_percentage: f64,
}

/// Gaussian similarity of two masses, 1.0 when equal and `exp(-0.5)` when
/// they differ by exactly `tolerance`
pub fn gaussian_similarity(actual: f64, reference: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return if actual == reference { 1.0 } else { 0.0 };
    }
    let z = (actual - reference) / tolerance;
    (-0.5 * z * z).exp()
}

fn intensity_weight(mz: f64, intensity: f64) -> f64 {
    intensity.max(0.0).sqrt() * mz
}

fn cosine(pairs: &[(f64, f64)]) -> f64 {
    let mut xy = 0.0;
    let mut xx = 0.0;
    let mut yy = 0.0;
    for (x, y) in pairs {
        xy += x * y;
        xx += x * x;
        yy += y * y;
    }
    if xx <= 0.0 || yy <= 0.0 {
        0.0
    } else {
        (xy / (xx * yy).sqrt()).clamp(0.0, 1.0)
    }
}

/// Pair every reference peak with the summed intensity of the query peaks
/// within `tolerance`. Query peaks claimed by no reference peak are returned
/// separately. Both spectra must be sorted by m/z.
fn align(query: &[MZPoint], reference: &[MZPoint], tolerance: f64) -> (Vec<(f64, f64, f64)>, Vec<(f64, f64)>) {
    let mut claimed = vec![false; query.len()];
    let aligned = reference
        .iter()
        .map(|r| {
            let start = query.partition_point(|q| q.mz < r.mz - tolerance);
            let mut total = 0.0;
            for (offset, q) in query[start..].iter().enumerate() {
                if q.mz > r.mz + tolerance {
                    break;
                }
                total += q.intensity as f64;
                claimed[start + offset] = true;
            }
            (r.mz, r.intensity as f64, total)
        })
        .collect();
    let unclaimed = query
        .iter()
        .zip(claimed)
        .filter(|(_, c)| !c)
        .map(|(q, _)| (q.mz, q.intensity as f64))
        .collect();
    (aligned, unclaimed)
}

/// Compare a query spectrum with a reference spectrum. Both must be sorted by
/// m/z. All scores lie in `[0, 1]`.
pub fn compare_spectra(query: &[MZPoint], reference: &[MZPoint], tolerance: f64) -> SpectrumSimilarity {
    if query.is_empty() || reference.is_empty() {
        return SpectrumSimilarity::default();
    }
    let (aligned, unclaimed) = align(query, reference, tolerance);

    let mut forward: Vec<(f64, f64)> = aligned.iter().map(|(_, r, q)| (*r, *q)).collect();
    forward.extend(unclaimed.iter().map(|(_, q)| (0.0, *q)));

    let mut weighted: Vec<(f64, f64)> = aligned
        .iter()
        .map(|(mz, r, q)| (intensity_weight(*mz, *r), intensity_weight(*mz, *q)))
        .collect();
    weighted.extend(unclaimed.iter().map(|(mz, q)| (0.0, intensity_weight(*mz, *q))));

    let reverse: Vec<(f64, f64)> = aligned.iter().map(|(_, r, q)| (*r, *q)).collect();

    let matched_peaks_count = aligned.iter().filter(|(_, _, q)| *q > 0.0).count();
    SpectrumSimilarity {
        simple_dot_product: cosine(&forward),
        weighted_dot_product: cosine(&weighted),
        reverse_dot_product: cosine(&reverse),
        matched_peaks_count,
        matched_peaks_percentage: matched_peaks_count as f64 / reference.len() as f64,
    }
}
