//! Isotope-aware fragment spectra.
//!
//! Fragment isotopic envelopes are charge-state deconvolved and each envelope
//! is collapsed into a single peak at the singly charged monoisotopic m/z,
//! carrying the intensity of the whole envelope.
use mzdeisotope::deconvolute_peaks;
use mzdeisotope::isotopic_model::{IsotopicModels, IsotopicPatternParams, PROTON};
use mzdeisotope::scorer::{MSDeconvScorer, MaximizingFitFilter};
use mzpeaks::peak::MZPoint;
use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, IndexType, MZPeakSetType, Tolerance};
use tracing::warn;

use crate::raw::IonMode;

/// Collapse the isotopic envelopes of `spectrum`. When deconvolution fails the
/// input is returned unchanged.
pub fn isotope_aware_spectrum(
    spectrum: &[MZPoint],
    max_charge: i32,
    error_tolerance_ppm: f64,
    ion_mode: IonMode,
) -> Vec<MZPoint> {
    if spectrum.is_empty() {
        return Vec::new();
    }
    let peaks: MZPeakSetType<CentroidPeak> = spectrum
        .iter()
        .enumerate()
        .map(|(i, p)| CentroidPeak::new(p.mz, p.intensity, i as IndexType))
        .collect();
    let sign = ion_mode.sign();
    let max_charge = max_charge.max(1);
    let charge_range = (sign, sign * max_charge);

    match deconvolute_peaks(
        peaks,
        IsotopicModels::Peptide,
        Tolerance::PPM(error_tolerance_ppm),
        charge_range,
        MSDeconvScorer::default(),
        MaximizingFitFilter::new(0.0),
        1,
        IsotopicPatternParams::default(),
        true,
    ) {
        Ok(deconvoluted) => {
            let mut collapsed: Vec<MZPoint> = deconvoluted
                .iter()
                .map(|p| MZPoint::new(p.neutral_mass + sign as f64 * PROTON, p.intensity))
                .collect();
            collapsed.sort_by(|a, b| a.mz.total_cmp(&b.mz));
            collapsed
        }
        Err(err) => {
            warn!("Failed to deconvolute fragment spectrum: {err}");
            spectrum.to_vec()
        }
    }
}
