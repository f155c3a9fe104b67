//! Extracted ion chromatograms along the drift time axis and the smoothing
//! filters applied to them before peak detection.
use std::fmt::Display;

use mzsignal::smooth;
use tracing::trace;

/// One point of an extracted ion chromatogram
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromatogramPoint {
    /// The index of the raw spectrum this point was extracted from
    pub id: usize,
    /// The drift time of the source spectrum
    pub time: f64,
    /// The m/z of the most intense peak contributing to this point, or
    /// the window center if none contributed
    pub mz: f64,
    pub intensity: f64,
}

impl ChromatogramPoint {
    pub fn new(id: usize, time: f64, mz: f64, intensity: f64) -> Self {
        Self {
            id,
            time,
            mz,
            intensity,
        }
    }
}

/// An intensity trace ordered by time
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Chromatogram {
    pub points: Vec<ChromatogramPoint>,
}

impl FromIterator<ChromatogramPoint> for Chromatogram {
    fn from_iter<T: IntoIterator<Item = ChromatogramPoint>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Chromatogram {
    pub fn new(points: Vec<ChromatogramPoint>) -> Self {
        Self { points }
    }

    /// Build a chromatogram from parallel time and intensity arrays, numbering
    /// points by position. Mostly used for synthetic traces.
    pub fn from_arrays(times: &[f64], intensities: &[f64], mz: f64) -> Self {
        times
            .iter()
            .zip(intensities.iter())
            .enumerate()
            .map(|(i, (t, y))| ChromatogramPoint::new(i, *t, mz, *y))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChromatogramPoint> {
        self.points.iter()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    pub fn max_intensity(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.intensity)
            .fold(0.0, f64::max)
    }

    /// Whether every point has zero or negative intensity
    pub fn is_flat(&self) -> bool {
        self.points.iter().all(|p| p.intensity <= 0.0)
    }

    /// The index of the point whose time is closest to `time`
    pub fn closest_index(&self, time: f64) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let i = self.points.partition_point(|p| p.time < time);
        if i == 0 {
            Some(0)
        } else if i == self.points.len() {
            Some(i - 1)
        } else if (self.points[i].time - time).abs() < (time - self.points[i - 1].time).abs() {
            Some(i)
        } else {
            Some(i - 1)
        }
    }

    /// Linearly interpolate the intensity of the trace at `time`, treating the
    /// signal as zero outside of the observed time range.
    pub fn interpolate(&self, time: f64) -> f64 {
        let i = self.points.partition_point(|p| p.time < time);
        if i == self.points.len() {
            return match self.points.last() {
                Some(p) if p.time == time => p.intensity,
                _ => 0.0,
            };
        }
        let after = &self.points[i];
        if after.time == time || i == 0 {
            return if after.time == time { after.intensity } else { 0.0 };
        }
        let before = &self.points[i - 1];
        let span = after.time - before.time;
        if span <= 0.0 {
            return before.intensity;
        }
        let w = (time - before.time) / span;
        before.intensity * (1.0 - w) + after.intensity * w
    }

    /// Trapezoidal area between two point indices, inclusive
    pub fn area(&self, start: usize, end: usize) -> f64 {
        if start >= end || end >= self.points.len() {
            return 0.0;
        }
        self.points[start..=end]
            .windows(2)
            .map(|w| 0.5 * (w[0].intensity + w[1].intensity) * (w[1].time - w[0].time))
            .sum()
    }

    /// Smooth the intensity trace, keeping ids, times and m/z values
    pub fn smooth(&self, method: SmoothingMethod, level: usize) -> Chromatogram {
        let smoothed = smooth_intensities(&self.intensities(), method, level);
        self.points
            .iter()
            .zip(smoothed)
            .map(|(p, y)| ChromatogramPoint { intensity: y, ..*p })
            .collect()
    }
}

/// The smoothing filters applied to chromatograms prior to peak detection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SmoothingMethod {
    SimpleMovingAverage,
    #[default]
    LinearWeightedMovingAverage,
    SavitzkyGolay,
    BinomialFilter,
}

impl Display for SmoothingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The widest half window `mzsignal`'s moving average dispatches to
const MAX_MOVING_AVERAGE_HALF_WIDTH: usize = 9;

/// Smooth `values` with a window of `level` points on either side.
///
/// The trace is padded with its first and last values so every point sees a
/// full window. The weighted filters renormalize truncated windows instead.
pub fn smooth_intensities(values: &[f64], method: SmoothingMethod, level: usize) -> Vec<f64> {
    if level == 0 || values.len() < 2 {
        return values.to_vec();
    }
    match method {
        SmoothingMethod::SimpleMovingAverage => moving_average(values, level),
        SmoothingMethod::LinearWeightedMovingAverage => {
            let weights: Vec<f64> = (0..=2 * level)
                .map(|j| (level + 1) as f64 - (j as f64 - level as f64).abs())
                .collect();
            weighted_window(values, &weights)
        }
        SmoothingMethod::BinomialFilter => weighted_window(values, &binomial_weights(2 * level)),
        SmoothingMethod::SavitzkyGolay => savitzky_golay(values, level),
    }
}

fn pad_edges(values: &[f64], width: usize) -> Vec<f64> {
    let first = values[0];
    let last = values[values.len() - 1];
    let mut padded = Vec::with_capacity(values.len() + 2 * width);
    padded.extend(std::iter::repeat(first).take(width));
    padded.extend_from_slice(values);
    padded.extend(std::iter::repeat(last).take(width));
    padded
}

fn moving_average(values: &[f64], level: usize) -> Vec<f64> {
    let level = level.min(MAX_MOVING_AVERAGE_HALF_WIDTH);
    let padded = pad_edges(values, level);
    let mut out = padded.clone();
    smooth::moving_average_dyn(&padded, &mut out, 2 * level + 1);
    out[level..level + values.len()].to_vec()
}

/// Savitzky-Golay smoothing over `2 * level + 1` points, quadratic for narrow
/// windows. Negative outputs are clipped to zero.
fn savitzky_golay(values: &[f64], level: usize) -> Vec<f64> {
    // `mzsignal` refits the leading edge over `[level, order)`, so the order
    // may not fall below the half width, and both refit edges must land in
    // the padding.
    let order = level.max(2);
    let pad = level + order;
    let padded = pad_edges(values, pad);
    let smoothed = smooth::SavitskyGolay::<f64>::new(2 * level + 1, order, 0)
        .and_then(|filter| filter.smooth(&padded));
    match smoothed {
        Ok(smoothed) => smoothed[pad..pad + values.len()].to_vec(),
        Err(e) => {
            trace!("Savitzky-Golay filter unavailable for {} points: {e}", values.len());
            values.to_vec()
        }
    }
}

fn binomial_weights(n: usize) -> Vec<f64> {
    let mut row = vec![1.0f64];
    for _ in 0..n {
        let mut next = Vec::with_capacity(row.len() + 1);
        next.push(1.0);
        for w in row.windows(2) {
            next.push(w[0] + w[1]);
        }
        next.push(1.0);
        row = next;
    }
    row
}

fn weighted_window(values: &[f64], weights: &[f64]) -> Vec<f64> {
    let half = weights.len() / 2;
    let n = values.len();
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            let mut norm = 0.0;
            for (j, w) in weights.iter().enumerate() {
                let k = i as isize + j as isize - half as isize;
                if k < 0 || k >= n as isize {
                    continue;
                }
                acc += w * values[k as usize];
                norm += w;
            }
            if norm > 0.0 {
                acc / norm
            } else {
                values[i]
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_smoothing_preserves_constant() {
        let values = vec![5.0; 20];
        for method in [
            SmoothingMethod::SimpleMovingAverage,
            SmoothingMethod::LinearWeightedMovingAverage,
            SmoothingMethod::SavitzkyGolay,
            SmoothingMethod::BinomialFilter,
        ] {
            for level in [1, 3] {
                let smoothed = smooth_intensities(&values, method, level);
                assert_eq!(smoothed.len(), values.len());
                for v in smoothed {
                    assert!((v - 5.0).abs() < 1e-6, "{method} produced {v}");
                }
            }
        }
    }

    #[test]
    fn test_moving_average_window() {
        let values = [0.0, 0.0, 3.0, 6.0, 9.0, 0.0, 0.0];
        let smoothed = smooth_intensities(&values, SmoothingMethod::SimpleMovingAverage, 1);
        let expected = [0.0, 1.0, 3.0, 6.0, 5.0, 3.0, 0.0];
        for (v, e) in smoothed.iter().zip(expected) {
            assert!((v - e).abs() < 1e-9, "{smoothed:?}");
        }
        let wide = smooth_intensities(&[1.0; 60], SmoothingMethod::SimpleMovingAverage, 30);
        assert_eq!(wide.len(), 60);
        assert!(wide.iter().all(|v| (v - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_savitzky_golay_keeps_quadratic_apex() {
        let values: Vec<f64> = (0..15).map(|i| 100.0 - ((i as f64) - 7.0).powi(2)).collect();
        let smoothed = smooth_intensities(&values, SmoothingMethod::SavitzkyGolay, 2);
        assert_eq!(smoothed.len(), values.len());
        for (v, e) in smoothed.iter().zip(values.iter()).skip(2).take(11) {
            assert!((v - e).abs() < 1e-6, "{v} != {e}");
        }
        let short = smooth_intensities(&[1.0, 2.0], SmoothingMethod::SavitzkyGolay, 3);
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn test_lwma_spreads_spike() {
        let mut values = vec![0.0; 9];
        values[4] = 9.0;
        let smoothed = smooth_intensities(&values, SmoothingMethod::LinearWeightedMovingAverage, 1);
        assert!((smoothed[4] - 4.5).abs() < 1e-9);
        assert!((smoothed[3] - 2.25).abs() < 1e-9);
        assert_eq!(smoothed[0], 0.0);
    }

    #[test]
    fn test_binomial_weights() {
        assert_eq!(binomial_weights(4), vec![1.0, 4.0, 6.0, 4.0, 1.0]);
    }

    #[test]
    fn test_closest_and_interpolate() {
        let chrom = Chromatogram::from_arrays(&[0.0, 1.0, 2.0, 3.0], &[0.0, 10.0, 20.0, 0.0], 100.0);
        assert_eq!(chrom.closest_index(1.4), Some(1));
        assert_eq!(chrom.closest_index(1.6), Some(2));
        assert_eq!(chrom.closest_index(-5.0), Some(0));
        assert_eq!(chrom.closest_index(50.0), Some(3));
        assert!((chrom.interpolate(1.5) - 15.0).abs() < 1e-9);
        assert_eq!(chrom.interpolate(-1.0), 0.0);
        assert_eq!(chrom.interpolate(3.0), 0.0);
        assert!((chrom.area(0, 3) - 30.0).abs() < 1e-9);
    }
}
