use crate::feature::ChromatogramPeakFeature;

/// Distribution of feature widths along the drift time axis
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakWidthSummary {
    pub count: usize,
    pub min_width: f64,
    pub max_width: f64,
    pub average_width: f64,
    pub median_width: f64,
    pub stdev_width: f64,
}

impl PeakWidthSummary {
    pub fn from_features(features: &[ChromatogramPeakFeature]) -> Self {
        Self::from_widths(features.iter().map(|f| f.width()).collect())
    }

    pub fn from_widths(mut widths: Vec<f64>) -> Self {
        widths.retain(|w| w.is_finite());
        let count = widths.len();
        if count == 0 {
            return Self::default();
        }
        widths.sort_by(|a, b| a.total_cmp(b));
        let average = widths.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 1 {
            widths[count / 2]
        } else {
            (widths[count / 2 - 1] + widths[count / 2]) / 2.0
        };
        let stdev = if count > 1 {
            (widths.iter().map(|w| (w - average).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        Self {
            count,
            min_width: widths[0],
            max_width: widths[count - 1],
            average_width: average,
            median_width: median,
            stdev_width: stdev,
        }
    }

    /// The width of the drift time window searched around a feature's apex
    pub fn search_width(&self) -> f64 {
        (self.average_width + 3.0 * self.stdev_width).max(self.median_width)
    }
}
