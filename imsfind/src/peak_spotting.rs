//! Find chromatographic peak features by walking the m/z axis in fixed-width
//! slices and detecting peaks along the drift time axis of each slice.
use std::mem;

use itertools::Itertools;
use mzpeaks::coordinate::SimpleInterval;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::adduct::AdductIon;
use crate::cancel::CancellationToken;
use crate::chromatogram::Chromatogram;
use crate::error::ProcessError;
use crate::feature::{ChromatogramPeakFeature, CollisionEnergyScan};
use crate::match_result::argmax_first;
use crate::parameters::PeakPickParameter;
use crate::peak_detection::PeakDetector;
use crate::progress::{ReportProgress, ScaledProgress, WorkCounter};
use crate::raw::{IonMode, RawSpectra, RawSpectrum};

const SPIKE_COUNT_THRESHOLD: usize = 4;
const MAX_TRACKING_WIDTH: usize = 50;
const MAX_APEX_DIFFERENCE: f64 = 0.03;
const REFIT_MIN_DATAPOINTS: usize = 3;

/// Drive slice-wise peak detection over one acquisition
#[derive(Debug, Clone)]
pub struct PeakSpotting {
    parameter: PeakPickParameter,
    ion_mode: IonMode,
}

impl PeakSpotting {
    pub fn new(parameter: PeakPickParameter, ion_mode: IonMode) -> Self {
        Self {
            parameter,
            ion_mode,
        }
    }

    pub fn parameter(&self) -> &PeakPickParameter {
        &self.parameter
    }

    /// The m/z range to slice: the configured range clipped to what was observed
    pub fn usable_mass_range<R: RawSpectra + ?Sized>(&self, provider: &R) -> Option<(f64, f64)> {
        let (observed_start, observed_end) = provider.ms1_mz_range()?;
        let start = self.parameter.mass_range_begin.max(observed_start);
        let end = self.parameter.mass_range_end.min(observed_end);
        if start > end {
            None
        } else {
            Some((start, end))
        }
    }

    /// Run peak spotting on the calling thread pool.
    ///
    /// The returned features are ordered by apex drift time then mass and
    /// numbered sequentially by `master_peak_id`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        progress: &dyn ReportProgress,
        token: &CancellationToken,
    ) -> Result<Vec<ChromatogramPeakFeature>, ProcessError> {
        self.parameter.validate()?;
        let Some((start_mass, end_mass)) = self.usable_mass_range(provider) else {
            debug!("No MS1 signal within the configured mass range");
            progress.report(1.0);
            return Ok(Vec::new());
        };
        let mass_step = self.parameter.mass_step();
        let time_range = SimpleInterval::new(self.parameter.drift_time_begin, self.parameter.drift_time_end);
        let n_slices = (((end_mass - start_mass) / mass_step).floor() as usize) + 1;
        info!(
            "Spotting peaks from {start_mass:0.4} to {end_mass:0.4} in {n_slices} slices of {mass_step}"
        );

        let slice_progress = ScaledProgress::new(progress, 0.0, 0.5);
        let counter = WorkCounter::new(n_slices, &slice_progress);
        let slices: Vec<Vec<ChromatogramPeakFeature>> = (0..n_slices)
            .into_par_iter()
            .map(|i| {
                if token.is_cancelled() {
                    return Vec::new();
                }
                let mass = start_mass + i as f64 * mass_step;
                let found = self.spot_slice(provider, mass, mass_step, &time_range);
                counter.increment();
                found
            })
            .collect();
        token.check()?;

        let slices = remove_redundancy_across_slices(slices, mass_step);
        let mut features: Vec<ChromatogramPeakFeature> = slices.into_iter().flatten().collect();
        sort_and_number(&mut features);
        for f in features.iter_mut() {
            f.amplitude_score = 0.0;
        }
        debug!("{} peaks remain after slice redundancy removal", features.len());

        let ms2_spectra = provider.spectra_at_level(2);
        let refit_progress = ScaledProgress::new(progress, 0.5, 0.5);
        let counter = WorkCounter::new(features.len(), &refit_progress);
        let reevaluated: Vec<Option<ChromatogramPeakFeature>> = features
            .into_par_iter()
            .map(|feature| {
                if token.is_cancelled() {
                    return None;
                }
                let result = self.reevaluate(provider, feature, &ms2_spectra);
                counter.increment();
                result
            })
            .collect();
        token.check()?;

        let mut features: Vec<ChromatogramPeakFeature> = reevaluated.into_iter().flatten().collect();
        sort_and_number(&mut features);
        if features.is_empty() {
            progress.report(1.0);
        }
        info!("Found {} peak features", features.len());
        Ok(features)
    }

    /// Detect, filter and background-check the peaks of one mass slice
    pub fn spot_slice<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        mass: f64,
        mass_step: f64,
        time_range: &SimpleInterval<f64>,
    ) -> Vec<ChromatogramPeakFeature> {
        let chromatogram =
            provider.extract_ms1_chromatogram(&SimpleInterval::new(mass, mass + mass_step), time_range);
        if chromatogram.is_empty() || chromatogram.is_flat() {
            return Vec::new();
        }
        let smoothed = chromatogram.smooth(self.parameter.smoothing_method, self.parameter.smoothing_level);
        let detector = PeakDetector::new(self.parameter.min_datapoints, self.parameter.min_amplitude);
        let adduct = AdductIon::default_for(self.ion_mode);
        let features: Vec<ChromatogramPeakFeature> = detector
            .detect(&smoothed)
            .iter()
            .filter(|p| p.amplitude() > 0.0)
            .map(|p| {
                let apex_mz = chromatogram.points[p.top].mz;
                let focused = if apex_mz >= mass && apex_mz < mass + mass_step {
                    apex_mz
                } else {
                    mass + mass_step / 2.0
                };
                ChromatogramPeakFeature::from_detection(p, focused, adduct.clone())
            })
            .filter(|f| !self.parameter.is_excluded(f.mass))
            .collect();
        if !features.is_empty() {
            trace!("Slice {mass:0.4} yielded {} peaks", features.len());
        }
        // Spike counting needs this slice's smoothed trace, so it runs before
        // redundancy removal across slices.
        subtract_background(features, &smoothed)
    }

    /// Re-extract a feature with a tighter m/z window and wider time window,
    /// refit its boundaries and link its MS2 spectra. Returns `None` when the
    /// refit no longer finds an acceptable peak.
    pub fn reevaluate<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        mut feature: ChromatogramPeakFeature,
        ms2_spectra: &[&RawSpectrum],
    ) -> Option<ChromatogramPeakFeature> {
        let half_width = feature.width() * 0.5;
        let time_range = SimpleInterval::new(
            feature.chrom_xs_left - half_width,
            feature.chrom_xs_right + half_width,
        );
        let tolerance = self.parameter.centroid_ms1_tolerance;
        let mz_range = SimpleInterval::new(feature.mass - tolerance, feature.mass + tolerance);
        let chromatogram = provider.extract_ms1_chromatogram(&mz_range, &time_range);
        if chromatogram.is_empty() {
            return None;
        }
        let smoothed = chromatogram.smooth(self.parameter.smoothing_method, self.parameter.smoothing_level);
        let detector = PeakDetector::new(REFIT_MIN_DATAPOINTS, 0.0);
        let refit = detector.detect_nearest(&smoothed, feature.chrom_xs_top)?;
        if refit.amplitude() < self.parameter.min_amplitude {
            trace!(
                "Dropping peak at {:0.4} {:0.3} with refit amplitude {:0.2}",
                feature.mass,
                feature.chrom_xs_top,
                refit.amplitude()
            );
            return None;
        }
        feature.update_geometry(&refit);
        assign_ms2_spectra(&mut feature, ms2_spectra);
        Some(feature)
    }
}

fn sort_and_number(features: &mut [ChromatogramPeakFeature]) {
    features.sort_by(|a, b| {
        a.chrom_xs_top
            .total_cmp(&b.chrom_xs_top)
            .then_with(|| a.mass.total_cmp(&b.mass))
    });
    for (i, f) in features.iter_mut().enumerate() {
        f.master_peak_id = i;
    }
}

/// Link a feature to the MS2 spectra whose isolation window contains its mass
/// and whose drift time (or pASEF drift time window) falls inside its
/// boundaries. Spectra are grouped by collision energy rounded to 0.01 and
/// the highest total ion current spectrum of each group is kept.
pub fn assign_ms2_spectra(feature: &mut ChromatogramPeakFeature, ms2_spectra: &[&RawSpectrum]) {
    let scans: Vec<CollisionEnergyScan> = ms2_spectra
        .iter()
        .filter_map(|spectrum| {
            let precursor = spectrum.precursor.as_ref()?;
            if !precursor.contains_mz(feature.mass) {
                return None;
            }
            let in_time = match precursor.drift_time_window {
                Some((start, end)) => start <= feature.chrom_xs_right && feature.chrom_xs_left <= end,
                None => {
                    feature.chrom_xs_left <= spectrum.drift_time
                        && spectrum.drift_time <= feature.chrom_xs_right
                }
            };
            in_time.then(|| CollisionEnergyScan {
                collision_energy: (precursor.collision_energy * 100.0).round() / 100.0,
                spectrum_id: spectrum.index,
                total_ion_current: spectrum.total_ion_current,
            })
        })
        .sorted_by(|a, b| a.collision_energy.total_cmp(&b.collision_energy))
        .coalesce(|a, b| {
            if (a.collision_energy - b.collision_energy).abs() < 1e-9 {
                Ok(if b.total_ion_current > a.total_ion_current { b } else { a })
            } else {
                Err((a, b))
            }
        })
        .collect();

    feature.ms2_raw_spectrum_id = argmax_first(&scans, |s| s.total_ion_current).map(|s| s.spectrum_id);
    feature.ms2_raw_spectrum_id_to_ce = scans;
}

fn is_redundant_pair(current: &ChromatogramPeakFeature, previous: &ChromatogramPeakFeature, mass_step: f64) -> bool {
    if (current.mass - previous.mass).abs() > mass_step * 0.5 {
        return false;
    }
    if !current.overlaps(previous) {
        return false;
    }
    let hwhm = (current.width() + previous.width()) * 0.25;
    (current.chrom_xs_top - previous.chrom_xs_top).abs() <= hwhm.min(MAX_APEX_DIFFERENCE)
}

/// Resolve peaks that were detected in two neighboring mass slices.
///
/// Returns the peaks of `current` and `previous` that survive. Of each
/// redundant pair the peak with the lower apex is dropped, the earlier slice
/// winning ties. Applying the function to its own output changes nothing.
pub fn remove_redundant_peaks(
    current: Vec<ChromatogramPeakFeature>,
    previous: Vec<ChromatogramPeakFeature>,
    mass_step: f64,
) -> (Vec<ChromatogramPeakFeature>, Vec<ChromatogramPeakFeature>) {
    let mut keep_current = vec![true; current.len()];
    let mut keep_previous = vec![true; previous.len()];
    for (i, c) in current.iter().enumerate() {
        for (j, p) in previous.iter().enumerate() {
            if !keep_previous[j] || !is_redundant_pair(c, p, mass_step) {
                continue;
            }
            if c.peak_height_top > p.peak_height_top {
                keep_previous[j] = false;
            } else {
                keep_current[i] = false;
                break;
            }
        }
    }
    let retain = |peaks: Vec<ChromatogramPeakFeature>, keep: Vec<bool>| {
        peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect::<Vec<_>>()
    };
    (retain(current, keep_current), retain(previous, keep_previous))
}

/// Fold [`remove_redundant_peaks`] over slices in ascending mass order, each
/// slice compared only with its immediate predecessor.
pub fn remove_redundancy_across_slices(
    mut slices: Vec<Vec<ChromatogramPeakFeature>>,
    mass_step: f64,
) -> Vec<Vec<ChromatogramPeakFeature>> {
    for i in 1..slices.len() {
        if slices[i].is_empty() || slices[i - 1].is_empty() {
            continue;
        }
        let current = mem::take(&mut slices[i]);
        let previous = mem::take(&mut slices[i - 1]);
        let (current, previous) = remove_redundant_peaks(current, previous, mass_step);
        slices[i] = current;
        slices[i - 1] = previous;
    }
    slices
}

fn count_spikes(values: &[f64], indices: impl Iterator<Item = usize>, amplitude: f64) -> usize {
    let mut counter = 0;
    let mut spike_max: Option<f64> = None;
    let mut spike_min: Option<f64> = None;
    for i in indices {
        if i == 0 || i + 1 >= values.len() {
            continue;
        }
        let (before, here, after) = (values[i - 1], values[i], values[i + 1]);
        if before < here && here > after {
            spike_max = Some(here);
        } else if before > here && here < after {
            spike_min = Some(here);
        }
        if let (Some(hi), Some(lo)) = (spike_max, spike_min) {
            let noise = 0.5 * (hi - lo).abs();
            if noise * 3.0 > amplitude {
                counter += 1;
            }
            spike_max = None;
            spike_min = None;
        }
    }
    counter
}

/// Drop peaks whose surroundings contain enough large spikes that the peak
/// is indistinguishable from background noise.
///
/// The window tracked on each side of a peak is ten times its width in
/// points, at most fifty points.
pub fn subtract_background(
    features: Vec<ChromatogramPeakFeature>,
    chromatogram: &Chromatogram,
) -> Vec<ChromatogramPeakFeature> {
    let values = chromatogram.intensities();
    features
        .into_iter()
        .filter(|f| {
            let left = f.chrom_scan_id_left;
            let right = f.chrom_scan_id_right;
            let top = f.chrom_scan_id_top;
            if right >= values.len() {
                return true;
            }
            let tracking = ((right - left) * 10).min(MAX_TRACKING_WIDTH);
            let amplitude = (values[top] - values[left]).max(values[top] - values[right]);
            let spikes = count_spikes(&values, left.saturating_sub(tracking)..=left, amplitude)
                + count_spikes(&values, right..=(right + tracking), amplitude);
            if spikes >= SPIKE_COUNT_THRESHOLD {
                trace!(
                    "Discarding peak at {:0.4} {:0.3} surrounded by {spikes} spikes",
                    f.mass,
                    f.chrom_xs_top
                );
            }
            spikes < SPIKE_COUNT_THRESHOLD
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chromatogram::Chromatogram;
    use crate::peak_detection::PeakDetectionResult;

    fn feature(mass: f64, left: f64, top: f64, right: f64, height: f64) -> ChromatogramPeakFeature {
        let peak = PeakDetectionResult {
            time_left: left,
            time_top: top,
            time_right: right,
            intensity_left: 0.0,
            intensity_top: height,
            intensity_right: 0.0,
            ..Default::default()
        };
        ChromatogramPeakFeature::from_detection(&peak, mass, AdductIon::default())
    }

    #[test]
    fn test_redundancy_keeps_taller() {
        let previous = vec![feature(100.000, 1.0, 1.2, 1.4, 800.0)];
        let current = vec![feature(100.005, 1.0, 1.2, 1.4, 1200.0)];
        let (current, previous) = remove_redundant_peaks(current, previous, 0.01);
        assert!(previous.is_empty());
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].peak_height_top, 1200.0);
    }

    #[test]
    fn test_redundancy_tie_keeps_earlier_slice() {
        let previous = vec![feature(100.000, 1.0, 1.2, 1.4, 1000.0)];
        let current = vec![feature(100.004, 1.0, 1.21, 1.4, 1000.0)];
        let (current, previous) = remove_redundant_peaks(current, previous, 0.01);
        assert!(current.is_empty());
        assert_eq!(previous.len(), 1);
    }

    #[test]
    fn test_redundancy_requires_closeness() {
        // Apexes too far apart
        let previous = vec![feature(100.000, 1.0, 1.2, 1.4, 800.0)];
        let current = vec![feature(100.005, 1.0, 1.3, 1.4, 1200.0)];
        let (current, previous) = remove_redundant_peaks(current, previous, 0.01);
        assert_eq!((current.len(), previous.len()), (1, 1));

        // Masses too far apart
        let previous = vec![feature(100.000, 1.0, 1.2, 1.4, 800.0)];
        let current = vec![feature(100.009, 1.0, 1.2, 1.4, 1200.0)];
        let (current, previous) = remove_redundant_peaks(current, previous, 0.01);
        assert_eq!((current.len(), previous.len()), (1, 1));
    }

    #[test]
    fn test_redundancy_idempotent() {
        let previous = vec![
            feature(100.000, 1.0, 1.2, 1.4, 800.0),
            feature(100.001, 3.0, 3.2, 3.4, 500.0),
            feature(100.002, 5.0, 5.2, 5.4, 900.0),
        ];
        let current = vec![
            feature(100.004, 1.0, 1.2, 1.4, 1200.0),
            feature(100.004, 3.0, 3.21, 3.4, 400.0),
            feature(100.007, 7.0, 7.2, 7.4, 100.0),
        ];
        let (c1, p1) = remove_redundant_peaks(current, previous, 0.01);
        let (c2, p2) = remove_redundant_peaks(c1.clone(), p1.clone(), 0.01);
        assert_eq!(c1, c2);
        assert_eq!(p1, p2);
        assert_eq!(c1.len(), 2);
        assert_eq!(p1.len(), 2);
    }

    #[test]
    fn test_fold_across_slices() {
        let slices = vec![
            vec![feature(100.000, 1.0, 1.2, 1.4, 800.0)],
            vec![],
            vec![feature(100.02, 1.0, 1.2, 1.4, 1200.0)],
            vec![feature(100.024, 1.0, 1.2, 1.4, 1500.0)],
        ];
        let slices = remove_redundancy_across_slices(slices, 0.01);
        assert_eq!(slices[0].len(), 1);
        assert!(slices[2].is_empty());
        assert_eq!(slices[3].len(), 1);
    }

    fn spiky_chromatogram(spikes: usize) -> Chromatogram {
        let n = 200;
        let mut values: Vec<f64> = (0..n)
            .map(|i| {
                let x = i as f64 - 150.0;
                100.0 + 1000.0 * (-x * x / 18.0).exp()
            })
            .collect();
        for k in 0..spikes {
            let at = 100 + 8 * k;
            values[at] = 2000.0;
            values[at + 2] = 0.0;
        }
        let times: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        Chromatogram::from_arrays(&times, &values, 300.0)
    }

    fn peak_on(chromatogram: &Chromatogram) -> ChromatogramPeakFeature {
        let values = chromatogram.intensities();
        let (left, top, right) = (144, 150, 156);
        let peak = PeakDetectionResult {
            left,
            top,
            right,
            intensity_left: values[left],
            intensity_top: values[top],
            intensity_right: values[right],
            ..Default::default()
        };
        ChromatogramPeakFeature::from_detection(&peak, 300.0, AdductIon::default())
    }

    #[test]
    fn test_background_spikes_discard() {
        let chromatogram = spiky_chromatogram(5);
        let kept = subtract_background(vec![peak_on(&chromatogram)], &chromatogram);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_background_few_spikes_kept() {
        let chromatogram = spiky_chromatogram(3);
        let kept = subtract_background(vec![peak_on(&chromatogram)], &chromatogram);
        assert_eq!(kept.len(), 1);
        let clean = spiky_chromatogram(0);
        assert_eq!(subtract_background(vec![peak_on(&clean)], &clean).len(), 1);
    }
}
