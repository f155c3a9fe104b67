//! Recover a clean MS2 spectrum for each peak feature.
//!
//! The MS2 spectrum linked to a feature is curated, then, when enough MS2
//! spectra of the same isolation window were acquired across the feature's
//! drift time profile, every fragment's profile is compared with the
//! precursor's MS1 profile and only fragments that follow it are kept.
use mzpeaks::coordinate::SimpleInterval;
use mzpeaks::peak::MZPoint;
use mzpeaks::prelude::*;
use mzpeaks::Tolerance;
use rayon::prelude::*;
use tracing::{debug, trace};

pub mod andromeda;
pub mod deconvolution;

use crate::cancel::CancellationToken;
use crate::chromatogram::{Chromatogram, ChromatogramPoint};
use crate::error::ProcessError;
use crate::feature::ChromatogramPeakFeature;
use crate::parameters::{MsDecParameter, PeakPickParameter};
use crate::progress::{ReportProgress, WorkCounter};
use crate::raw::{IonMode, RawSpectra, RawSpectrum};
use crate::summary::PeakWidthSummary;
use crate::threads;

use deconvolution::{deconvolute, DeconvolutionParams};

const MIN_AMPLITUDE_CUTOFF: f64 = 0.1;
const SEARCH_WIDTH_FACTOR: f64 = 1.5;
const PRECURSOR_ISOTOPE_LOWER_OFFSET: f64 = 0.5;

/// The MS2 spectrum attached to one feature
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MsDecResult {
    /// The `master_peak_id` of the feature this result belongs to
    pub scan_id: usize,
    /// The apex drift time of the feature
    pub chrom_xs: f64,
    pub raw_spectrum_id: Option<usize>,
    pub precursor_mz: f64,
    /// Fragment peaks in ascending m/z order
    pub spectrum: Vec<MZPoint>,
    pub model_peak_height: f64,
    pub model_peak_area: f64,
    /// Whether the spectrum was reconstructed from correlated profiles
    pub is_deconvoluted: bool,
}

impl MsDecResult {
    /// An empty result tagged to `feature`
    pub fn default_for(feature: &ChromatogramPeakFeature) -> Self {
        Self {
            scan_id: feature.master_peak_id,
            chrom_xs: feature.chrom_xs_top,
            raw_spectrum_id: None,
            precursor_mz: feature.mass,
            spectrum: Vec::new(),
            model_peak_height: feature.peak_height_top,
            model_peak_area: feature.peak_area_above_zero,
            is_deconvoluted: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spectrum.is_empty()
    }

    pub fn total_intensity(&self) -> f64 {
        self.spectrum.iter().map(|p| p.intensity as f64).sum()
    }

    fn canonicalize(&mut self) {
        self.spectrum.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    }
}

struct Reconstruction {
    spectrum: Vec<MZPoint>,
    model_height: f64,
    model_area: f64,
}

/// MS2 spectrum curation and chromatographic deconvolution
#[derive(Debug, Clone)]
pub struct Ms2Dec {
    parameter: MsDecParameter,
    peak_pick: PeakPickParameter,
    ion_mode: IonMode,
    num_threads: usize,
}

impl Ms2Dec {
    pub fn new(parameter: MsDecParameter, peak_pick: PeakPickParameter, ion_mode: IonMode) -> Self {
        Self {
            parameter,
            peak_pick,
            ion_mode,
            num_threads: 0,
        }
    }

    /// Process batches on a dedicated pool of this many threads instead of
    /// the calling pool
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn parameter(&self) -> &MsDecParameter {
        &self.parameter
    }

    /// Build the MS2 result for every feature. The `i`-th result belongs to
    /// the `i`-th feature regardless of the order work completes in.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn get_ms2_dec_results<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        features: &[ChromatogramPeakFeature],
        summary: &PeakWidthSummary,
        target_ce: Option<f64>,
        progress: &dyn ReportProgress,
        token: &CancellationToken,
    ) -> Result<Vec<MsDecResult>, ProcessError> {
        if features.is_empty() {
            progress.report(1.0);
            return Ok(Vec::new());
        }
        let counter = WorkCounter::new(features.len(), progress);
        let results: Vec<Option<MsDecResult>> = threads::install(self.num_threads, || {
            features
                .par_iter()
                .map(|feature| {
                    if token.is_cancelled() {
                        return None;
                    }
                    let result = self.get_ms2_dec_result(provider, feature, summary, target_ce);
                    counter.increment();
                    Some(result)
                })
                .collect()
        })?;
        token.check()?;
        let results: Vec<MsDecResult> = results.into_iter().flatten().collect();
        debug!(
            "Deconvoluted {} of {} MS2 spectra",
            results.iter().filter(|r| r.is_deconvoluted).count(),
            results.len()
        );
        Ok(results)
    }

    /// Build the MS2 result for one feature. Missing MS2 data yields an empty
    /// spectrum, never an error.
    pub fn get_ms2_dec_result<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        feature: &ChromatogramPeakFeature,
        summary: &PeakWidthSummary,
        target_ce: Option<f64>,
    ) -> MsDecResult {
        let mut result = MsDecResult::default_for(feature);
        let Some(raw) = feature
            .ms2_spectrum_for(target_ce)
            .and_then(|i| provider.spectrum(i))
            .filter(|s| s.ms_level > 1)
        else {
            return result;
        };
        result.raw_spectrum_id = Some(raw.index);

        let curated = self.curate_spectrum(raw, feature.mass);
        if curated.is_empty() {
            return result;
        }

        let windowed = raw
            .precursor
            .as_ref()
            .map(|p| p.drift_time_window.is_some())
            .unwrap_or(false);

        let reconstruction = if self.parameter.deconvolute && !windowed {
            self.reconstruct(provider, feature, raw, &curated, summary)
        } else {
            None
        };

        match reconstruction {
            Some(rec) => {
                let mut spectrum = rec.spectrum;
                if self.parameter.keep_original_precursor_isotopes {
                    spectrum = self.restore_precursor_isotopes(spectrum, &curated, feature.mass);
                }
                if self.parameter.andromeda {
                    spectrum = self.isotope_aware(&spectrum);
                }
                result.spectrum = spectrum;
                result.model_peak_height = rec.model_height;
                result.model_peak_area = rec.model_area;
                result.is_deconvoluted = true;
            }
            None => {
                result.spectrum = if self.parameter.andromeda {
                    self.isotope_aware(&curated)
                } else {
                    curated
                };
            }
        }
        result.canonicalize();
        result
    }

    fn isotope_aware(&self, spectrum: &[MZPoint]) -> Vec<MZPoint> {
        andromeda::isotope_aware_spectrum(
            spectrum,
            self.parameter.andromeda_max_charge,
            self.parameter.andromeda_error_tolerance,
            self.ion_mode,
        )
    }

    /// Drop noise and, optionally, everything heavier than the precursor's
    /// isotopic envelope
    pub fn curate_spectrum(&self, raw: &RawSpectrum, precursor_mz: f64) -> Vec<MZPoint> {
        let cutoff = self.parameter.amplitude_cutoff.max(MIN_AMPLITUDE_CUTOFF);
        let upper = precursor_mz + self.parameter.kept_isotope_range;
        raw.peaks
            .iter()
            .filter(|p| p.intensity() as f64 >= cutoff)
            .filter(|p| !self.parameter.remove_after_precursor || p.mz() <= upper)
            .map(|p| MZPoint::new(p.mz(), p.intensity()))
            .collect()
    }

    fn restore_precursor_isotopes(
        &self,
        spectrum: Vec<MZPoint>,
        curated: &[MZPoint],
        precursor_mz: f64,
    ) -> Vec<MZPoint> {
        let lower = precursor_mz - PRECURSOR_ISOTOPE_LOWER_OFFSET;
        let upper = precursor_mz + self.parameter.kept_isotope_range;
        let in_range = |p: &MZPoint| lower <= p.mz && p.mz <= upper;
        spectrum
            .into_iter()
            .filter(|p| !in_range(p))
            .chain(curated.iter().filter(|p| in_range(p)).cloned())
            .collect()
    }

    /// The MS2 spectra of the same isolation window and collision energy as
    /// `raw` within `time_range`, ordered by drift time
    fn sibling_spectra<'a, R: RawSpectra + ?Sized>(
        &self,
        provider: &'a R,
        raw: &RawSpectrum,
        time_range: &SimpleInterval<f64>,
    ) -> Vec<&'a RawSpectrum> {
        let Some(precursor) = raw.precursor.as_ref() else {
            return Vec::new();
        };
        let mut siblings: Vec<&RawSpectrum> = provider
            .spectra_at_level(raw.ms_level)
            .into_iter()
            .filter(|s| time_range.start <= s.drift_time && s.drift_time <= time_range.end)
            .filter(|s| {
                s.precursor
                    .as_ref()
                    .map(|p| p.same_window(precursor))
                    .unwrap_or(false)
            })
            .collect();
        siblings.sort_by(|a, b| a.drift_time.total_cmp(&b.drift_time));
        siblings
    }

    fn reconstruct<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        feature: &ChromatogramPeakFeature,
        raw: &RawSpectrum,
        curated: &[MZPoint],
        summary: &PeakWidthSummary,
    ) -> Option<Reconstruction> {
        let mut width = summary.search_width();
        if !(width > 0.0) {
            width = feature.width();
        }
        if !(width > 0.0) {
            return None;
        }
        let time_range = SimpleInterval::new(
            feature.chrom_xs_top - SEARCH_WIDTH_FACTOR * width,
            feature.chrom_xs_top + SEARCH_WIDTH_FACTOR * width,
        );
        let tolerance = self.peak_pick.centroid_ms1_tolerance;
        let method = self.peak_pick.smoothing_method;
        let level = self.peak_pick.smoothing_level;
        let model = provider
            .extract_ms1_chromatogram(
                &SimpleInterval::new(feature.mass - tolerance, feature.mass + tolerance),
                &time_range,
            )
            .smooth(method, level);
        let siblings = self.sibling_spectra(provider, raw, &time_range);
        if model.len() < 3 || siblings.len() < 3 {
            trace!(
                "Too few points to deconvolute peak {}: {} MS1, {} MS2",
                feature.master_peak_id,
                model.len(),
                siblings.len()
            );
            return None;
        }

        let grid: Vec<f64> = siblings.iter().map(|s| s.drift_time).collect();
        let aligned_model: Vec<f64> = grid.iter().map(|t| model.interpolate(*t)).collect();
        let ms2_tolerance = Tolerance::Da(self.peak_pick.centroid_ms2_tolerance);
        let fragment_traces: Vec<Vec<f64>> = curated
            .iter()
            .map(|fragment| {
                let trace: Chromatogram = siblings
                    .iter()
                    .map(|s| {
                        let intensity: f64 = s
                            .peaks
                            .all_peaks_for(fragment.mz, ms2_tolerance)
                            .iter()
                            .map(|p| p.intensity() as f64)
                            .sum();
                        ChromatogramPoint::new(s.index, s.drift_time, fragment.mz, intensity)
                    })
                    .collect();
                trace.smooth(method, level).intensities()
            })
            .collect();

        let top = grid
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (**a - feature.chrom_xs_top)
                    .abs()
                    .total_cmp(&(**b - feature.chrom_xs_top).abs())
            })
            .map(|(i, _)| i)?;

        let params = DeconvolutionParams {
            correlation_threshold: self.parameter.correlation_threshold,
            ..Default::default()
        };
        let kept = deconvolute(&aligned_model, &fragment_traces, top, &params)?;
        let spectrum = kept
            .into_iter()
            .map(|k| MZPoint::new(curated[k.index].mz, k.intensity as f32))
            .collect();
        let model_top = model.closest_index(feature.chrom_xs_top).unwrap_or_default();
        Some(Reconstruction {
            spectrum,
            model_height: model.points[model_top].intensity,
            model_area: model.area(0, model.len() - 1),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::raw::{RawPrecursor, SpectrumStore};
    use mzpeaks::{CentroidPeak, MZPeakSetType};

    fn spectrum_of(peaks: &[(f64, f32)], ms_level: u8, dt: f64, precursor: Option<RawPrecursor>) -> RawSpectrum {
        let peaks: MZPeakSetType<CentroidPeak> = peaks
            .iter()
            .enumerate()
            .map(|(i, (mz, inten))| CentroidPeak::new(*mz, *inten, i as u32))
            .collect();
        RawSpectrum::new(String::new(), ms_level, dt, IonMode::Positive, precursor, peaks)
    }

    fn feature_with_ms2(ms2: Option<usize>) -> ChromatogramPeakFeature {
        ChromatogramPeakFeature {
            master_peak_id: 4,
            mass: 300.1,
            chrom_xs_left: 0.9,
            chrom_xs_top: 1.0,
            chrom_xs_right: 1.1,
            ms2_raw_spectrum_id: ms2,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_ms2_is_empty() {
        let store = SpectrumStore::new(vec![spectrum_of(&[(300.1, 100.0)], 1, 1.0, None)]);
        let msdec = Ms2Dec::new(MsDecParameter::default(), PeakPickParameter::default(), IonMode::Positive);
        let summary = PeakWidthSummary::default();
        let feature = feature_with_ms2(None);
        let result = msdec.get_ms2_dec_result(&store, &feature, &summary, None);
        assert!(result.is_empty());
        assert_eq!(result.scan_id, 4);
        assert_eq!(result.precursor_mz, 300.1);

        let out_of_range = feature_with_ms2(Some(99));
        assert!(msdec.get_ms2_dec_result(&store, &out_of_range, &summary, None).is_empty());
    }

    #[test]
    fn test_curation() {
        let precursor = RawPrecursor::new(300.1, 299.6, 300.6, 20.0);
        let raw = spectrum_of(
            &[(80.0, 0.05), (150.0, 50.0), (301.1, 20.0), (320.0, 30.0)],
            2,
            1.0,
            Some(precursor),
        );
        let mut parameter = MsDecParameter::default();
        parameter.kept_isotope_range = 5.0;
        let msdec = Ms2Dec::new(parameter.clone(), PeakPickParameter::default(), IonMode::Positive);
        let curated = msdec.curate_spectrum(&raw, 300.1);
        let mzs: Vec<f64> = curated.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![150.0, 301.1]);

        parameter.remove_after_precursor = false;
        let msdec = Ms2Dec::new(parameter, PeakPickParameter::default(), IonMode::Positive);
        assert_eq!(msdec.curate_spectrum(&raw, 300.1).len(), 3);
    }

    #[test]
    fn test_pasef_window_returns_curated() {
        let precursor = RawPrecursor::new(300.1, 299.6, 300.6, 20.0).with_drift_time_window(0.8, 1.2);
        let store = SpectrumStore::new(vec![
            spectrum_of(&[(300.1, 1000.0)], 1, 1.0, None),
            spectrum_of(&[(180.0, 10.0), (150.0, 50.0)], 2, 1.0, Some(precursor)),
        ]);
        let msdec = Ms2Dec::new(MsDecParameter::default(), PeakPickParameter::default(), IonMode::Positive);
        let feature = feature_with_ms2(Some(1));
        let result = msdec.get_ms2_dec_result(&store, &feature, &PeakWidthSummary::default(), None);
        assert!(!result.is_deconvoluted);
        assert_eq!(result.raw_spectrum_id, Some(1));
        let mzs: Vec<f64> = result.spectrum.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![150.0, 180.0]);
    }

    #[test]
    fn test_batch_empty() {
        let store = SpectrumStore::default();
        let msdec = Ms2Dec::new(MsDecParameter::default(), PeakPickParameter::default(), IonMode::Positive);
        let results = msdec
            .get_ms2_dec_results(
                &store,
                &[],
                &PeakWidthSummary::default(),
                None,
                &crate::progress::NullProgress,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(results.is_empty());
    }
}
