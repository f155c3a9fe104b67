//! Isotopic evidence for a feature, read from the MS1 spectrum at its apex.
use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, MZPeakSetType, Tolerance};

pub const C13_C12_DIFF: f64 = 1.003354838;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopicPeak {
    pub mass: f64,
    pub mass_difference_from_monoisotopic: f64,
    pub absolute_abundance: f64,
    /// Abundance as a percentage of the monoisotopic peak
    pub relative_abundance: f64,
}

/// Collect the monoisotopic peak and up to `max_isotopes` heavier isotopes of
/// an ion at `monoisotopic_mz` with the given `charge`.
///
/// Every expected position yields an entry, with zero abundance when no peak
/// falls within `tolerance` of it. Intensities of all peaks within tolerance
/// are summed and their m/z averaged by intensity.
pub fn find_isotopic_peaks(
    peaks: &MZPeakSetType<CentroidPeak>,
    monoisotopic_mz: f64,
    charge: i32,
    tolerance: f64,
    max_isotopes: usize,
) -> Vec<IsotopicPeak> {
    let charge = charge.unsigned_abs().max(1) as f64;
    let mut isotopes: Vec<IsotopicPeak> = (0..=max_isotopes)
        .map(|k| {
            let shift = k as f64 * C13_C12_DIFF / charge;
            let target = monoisotopic_mz + shift;
            let matches = peaks.all_peaks_for(target, Tolerance::Da(tolerance));
            let total: f64 = matches.iter().map(|p| p.intensity() as f64).sum();
            let mass = if total > 0.0 {
                matches
                    .iter()
                    .map(|p| p.mz() * p.intensity() as f64)
                    .sum::<f64>()
                    / total
            } else {
                target
            };
            IsotopicPeak {
                mass,
                mass_difference_from_monoisotopic: shift,
                absolute_abundance: total,
                relative_abundance: 0.0,
            }
        })
        .collect();
    let base = isotopes.first().map(|p| p.absolute_abundance).unwrap_or_default();
    if base > 0.0 {
        for iso in isotopes.iter_mut() {
            iso.relative_abundance = iso.absolute_abundance / base * 100.0;
        }
    }
    isotopes
}
