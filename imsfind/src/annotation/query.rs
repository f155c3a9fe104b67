use mzpeaks::peak::MZPoint;

use crate::feature::ChromatogramPeakFeature;
use crate::isotope::IsotopicPeak;
use crate::msdec::MsDecResult;
use crate::parameters::MsRefSearchParameter;
use crate::raw::IonMode;

/// Everything an annotator may look at when searching for one feature
#[derive(Debug, Clone, Copy)]
pub struct AnnotationQuery<'a> {
    pub feature: &'a ChromatogramPeakFeature,
    pub precursor_mz: f64,
    pub drift_time: f64,
    /// The feature's MS2 spectrum in ascending m/z order
    pub spectrum: &'a [MZPoint],
    pub isotopes: &'a [IsotopicPeak],
    pub ion_mode: IonMode,
    pub parameter: &'a MsRefSearchParameter,
}

impl<'a> AnnotationQuery<'a> {
    pub fn new(
        feature: &'a ChromatogramPeakFeature,
        dec_result: &'a MsDecResult,
        parameter: &'a MsRefSearchParameter,
        ion_mode: IonMode,
    ) -> Self {
        Self {
            feature,
            precursor_mz: feature.mass,
            drift_time: feature.chrom_xs_top,
            spectrum: &dec_result.spectrum,
            isotopes: &feature.peak_character.isotopes,
            ion_mode,
            parameter,
        }
    }

    /// The query spectrum without peaks below the absolute or relative
    /// intensity cutoffs
    pub fn filtered_spectrum(&self) -> Vec<MZPoint> {
        let base = self
            .spectrum
            .iter()
            .map(|p| p.intensity as f64)
            .fold(0.0, f64::max);
        let relative = base * self.parameter.relative_amp_cutoff / 100.0;
        let cutoff = relative.max(self.parameter.absolute_amp_cutoff);
        self.spectrum
            .iter()
            .filter(|p| p.intensity as f64 >= cutoff && p.intensity > 0.0)
            .cloned()
            .collect()
    }

    pub fn in_mass_range(&self) -> bool {
        self.parameter.mass_range_begin <= self.precursor_mz
            && self.precursor_mz <= self.parameter.mass_range_end
    }
}
