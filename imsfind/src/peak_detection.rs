//! Derivative-based peak detection over a smoothed one dimensional trace.
//!
//! Noise levels are estimated from the trace itself: the median of the small
//! first differences, derivative magnitudes and curvatures. A peak starts where
//! the slope rises above the slope noise, climbs to its apex and ends where the
//! trace flattens out again or starts rising into the next peak.
use tracing::trace;

use crate::chromatogram::Chromatogram;

const NOISE_FLOOR: f64 = 1e-4;
const NOISE_QUANTILE_FRACTION: f64 = 0.05;

/// A peak found in a [`Chromatogram`], addressed by point indices
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeakDetectionResult {
    pub peak_id: usize,
    pub left: usize,
    pub top: usize,
    pub right: usize,
    /// The ids of the chromatogram points at the left, top and right edges
    pub scan_left: usize,
    pub scan_top: usize,
    pub scan_right: usize,
    pub time_left: f64,
    pub time_top: f64,
    pub time_right: f64,
    pub intensity_left: f64,
    pub intensity_top: f64,
    pub intensity_right: f64,
    pub mz_top: f64,
    pub area_above_zero: f64,
    pub area_above_baseline: f64,
    pub estimated_noise: f64,
    pub signal_to_noise: f64,
    /// Rank of this peak's apex among the peaks of the same trace, scaled to
    /// (0, 1] with the tallest peak at 1
    pub amplitude_score: f64,
}

impl PeakDetectionResult {
    /// The apex height above the taller of the two edges
    pub fn amplitude(&self) -> f64 {
        self.intensity_top - self.intensity_left.max(self.intensity_right)
    }

    pub fn width(&self) -> f64 {
        self.time_right - self.time_left
    }

    pub fn is_consistent(&self) -> bool {
        self.left <= self.top
            && self.top <= self.right
            && self.intensity_top >= self.intensity_left
            && self.intensity_top >= self.intensity_right
    }
}

/// Noise levels derived from a trace
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NoiseEstimate {
    pub amplitude: f64,
    pub slope: f64,
    pub peak_top: f64,
}

fn median_of(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2])
    } else {
        Some((values[n / 2 - 1] + values[n / 2]) / 2.0)
    }
}

fn small_magnitude_median(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().fold(0.0, f64::max);
    let cutoff = max * NOISE_QUANTILE_FRACTION;
    median_of(values.filter(|v| *v > 0.0 && *v < cutoff).collect())
        .unwrap_or(NOISE_FLOOR)
        .max(NOISE_FLOOR)
}

/// Five point first and second derivatives, clamping at the ends of the trace
pub(crate) fn derivatives(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = values.len() as isize;
    let at = |i: isize| values[i.clamp(0, n - 1) as usize];
    let mut first = Vec::with_capacity(values.len());
    let mut second = Vec::with_capacity(values.len());
    for i in 0..n {
        first.push((-2.0 * at(i - 2) - at(i - 1) + at(i + 1) + 2.0 * at(i + 2)) / 10.0);
        second.push(
            (2.0 * at(i - 2) - at(i - 1) - 2.0 * at(i) - at(i + 1) + 2.0 * at(i + 2)) / 7.0,
        );
    }
    (first, second)
}

pub fn estimate_noise(values: &[f64], first: &[f64], second: &[f64]) -> NoiseEstimate {
    let amplitude = small_magnitude_median(values.windows(2).map(|w| (w[1] - w[0]).abs()));
    let slope = small_magnitude_median(first.iter().map(|v| v.abs()));
    let peak_top = small_magnitude_median(second.iter().filter(|v| **v < 0.0).map(|v| v.abs()));
    NoiseEstimate {
        amplitude,
        slope,
        peak_top,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetector {
    pub min_datapoints: usize,
    pub min_amplitude: f64,
    pub amplitude_noise_fold: f64,
    pub slope_noise_fold: f64,
    pub peak_top_noise_fold: f64,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self {
            min_datapoints: 5,
            min_amplitude: 0.0,
            amplitude_noise_fold: 4.0,
            slope_noise_fold: 2.0,
            peak_top_noise_fold: 2.0,
        }
    }
}

impl PeakDetector {
    pub fn new(min_datapoints: usize, min_amplitude: f64) -> Self {
        Self {
            min_datapoints,
            min_amplitude,
            ..Default::default()
        }
    }

    /// Find all peaks in `chromatogram`. Every returned peak satisfies
    /// [`PeakDetectionResult::is_consistent`] and is ordered by its left edge.
    pub fn detect(&self, chromatogram: &Chromatogram) -> Vec<PeakDetectionResult> {
        let values = chromatogram.intensities();
        let n = values.len();
        if n < self.min_datapoints.max(3) {
            return Vec::new();
        }
        let (first, second) = derivatives(&values);
        let noise = estimate_noise(&values, &first, &second);
        let slope_threshold = noise.slope * self.slope_noise_fold;
        let peak_top_threshold = noise.peak_top * self.peak_top_noise_fold;
        let amplitude_threshold = noise.amplitude * self.amplitude_noise_fold;
        trace!(
            "Noise estimates: amplitude {:0.4}, slope {:0.4}, peak top {:0.4}",
            noise.amplitude,
            noise.slope,
            noise.peak_top
        );

        let mut peaks: Vec<PeakDetectionResult> = Vec::new();
        let mut i = 0;
        while i + 1 < n {
            if !(first[i] > slope_threshold && values[i + 1] > values[i]) {
                i += 1;
                continue;
            }
            let left = i;

            let mut top = left;
            while top + 1 < n && values[top + 1] >= values[top] {
                top += 1;
            }

            let mut right = top;
            while right + 1 < n {
                if values[right + 1] > values[right] {
                    break;
                }
                right += 1;
                if right > top + 1 && first[right].abs() <= slope_threshold {
                    break;
                }
            }

            i = right.max(i + 1);

            if right - left + 1 < self.min_datapoints || top == left || top == right {
                continue;
            }
            if second[top] > -peak_top_threshold {
                continue;
            }
            let amplitude = values[top] - values[left].max(values[right]);
            if amplitude <= 0.0 || amplitude < self.min_amplitude || amplitude < amplitude_threshold {
                continue;
            }
            peaks.push(self.build_result(chromatogram, &values, left, top, right, noise.amplitude));
        }

        score_amplitudes(&mut peaks);
        for (k, p) in peaks.iter_mut().enumerate() {
            p.peak_id = k;
        }
        peaks
    }

    /// Detect peaks and keep the one whose apex is nearest to `time`
    pub fn detect_nearest(&self, chromatogram: &Chromatogram, time: f64) -> Option<PeakDetectionResult> {
        let peaks = self.detect(chromatogram);
        let mut best: Option<PeakDetectionResult> = None;
        for p in peaks {
            let better = match &best {
                Some(b) => (p.time_top - time).abs() < (b.time_top - time).abs(),
                None => true,
            };
            if better {
                best = Some(p);
            }
        }
        best
    }

    fn build_result(
        &self,
        chromatogram: &Chromatogram,
        values: &[f64],
        left: usize,
        top: usize,
        right: usize,
        noise: f64,
    ) -> PeakDetectionResult {
        let points = &chromatogram.points;
        let area_above_zero = chromatogram.area(left, right);
        let baseline = 0.5 * (values[left] + values[right]) * (points[right].time - points[left].time);
        let amplitude = values[top] - values[left].max(values[right]);
        PeakDetectionResult {
            peak_id: 0,
            left,
            top,
            right,
            scan_left: points[left].id,
            scan_top: points[top].id,
            scan_right: points[right].id,
            time_left: points[left].time,
            time_top: points[top].time,
            time_right: points[right].time,
            intensity_left: values[left],
            intensity_top: values[top],
            intensity_right: values[right],
            mz_top: points[top].mz,
            area_above_zero,
            area_above_baseline: (area_above_zero - baseline).max(0.0),
            estimated_noise: noise,
            signal_to_noise: amplitude / noise,
            amplitude_score: 0.0,
        }
    }
}

fn score_amplitudes(peaks: &mut [PeakDetectionResult]) {
    let n = peaks.len();
    if n == 0 {
        return;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| peaks[*a].intensity_top.total_cmp(&peaks[*b].intensity_top));
    for (rank, idx) in order.into_iter().enumerate() {
        peaks[idx].amplitude_score = (rank + 1) as f64 / n as f64;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub(crate) fn gaussian(n: usize, center: f64, sigma: f64, height: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64 - center;
                height * (-x * x / (2.0 * sigma * sigma)).exp()
            })
            .collect()
    }

    fn chromatogram(values: &[f64]) -> Chromatogram {
        let times: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        Chromatogram::from_arrays(&times, values, 200.0)
    }

    #[test]
    fn test_single_gaussian() {
        let values = gaussian(100, 50.0, 5.0, 1000.0);
        let detector = PeakDetector::new(5, 100.0);
        let peaks = detector.detect(&chromatogram(&values));
        assert_eq!(peaks.len(), 1);
        let p = &peaks[0];
        assert_eq!(p.top, 50);
        assert!(p.left < 50 && p.right > 50);
        assert!(p.is_consistent());
        assert!((p.intensity_top - 1000.0).abs() < 1e-9);
        assert_eq!(p.amplitude_score, 1.0);
    }

    #[test]
    fn test_two_separated_peaks() {
        let mut values = gaussian(120, 30.0, 3.0, 500.0);
        for (v, w) in values.iter_mut().zip(gaussian(120, 85.0, 3.0, 900.0)) {
            *v += w;
        }
        let detector = PeakDetector::new(5, 50.0);
        let peaks = detector.detect(&chromatogram(&values));
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].top, 30);
        assert_eq!(peaks[1].top, 85);
        assert!(peaks[0].amplitude_score < peaks[1].amplitude_score);
        for p in peaks.iter() {
            assert!(p.is_consistent());
        }
        let nearest = detector.detect_nearest(&chromatogram(&values), 80.0).unwrap();
        assert_eq!(nearest.top, 85);
    }

    #[test]
    fn test_flat_and_short_traces() {
        let detector = PeakDetector::new(5, 0.0);
        assert!(detector.detect(&chromatogram(&[0.0; 30])).is_empty());
        assert!(detector.detect(&chromatogram(&[1.0, 5.0, 1.0])).is_empty());
        assert!(detector.detect(&Chromatogram::default()).is_empty());
    }

    #[test]
    fn test_min_amplitude_filter() {
        let values = gaussian(100, 50.0, 5.0, 1000.0);
        let detector = PeakDetector::new(5, 5000.0);
        assert!(detector.detect(&chromatogram(&values)).is_empty());
    }

    #[test]
    fn test_noise_floor() {
        let values = vec![0.0; 10];
        let (first, second) = derivatives(&values);
        let noise = estimate_noise(&values, &first, &second);
        assert_eq!(noise.amplitude, NOISE_FLOOR);
        assert_eq!(noise.slope, NOISE_FLOOR);
        assert_eq!(noise.peak_top, NOISE_FLOOR);
    }
}
