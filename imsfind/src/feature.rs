//! The chromatographic peak feature, the unit every stage works on.
use std::fmt::Display;

use crate::adduct::AdductIon;
use crate::isotope::IsotopicPeak;
use crate::match_result::MatchResultContainer;
use crate::peak_detection::PeakDetectionResult;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnnotationState {
    #[default]
    Unknown,
    Suggested,
    Matched,
}

impl Display for AnnotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The ion form of a feature
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakCharacter {
    pub adduct: AdductIon,
    pub charge: i32,
    pub isotopes: Vec<IsotopicPeak>,
}

impl PeakCharacter {
    pub fn new(adduct: AdductIon) -> Self {
        let charge = adduct.charge;
        Self {
            adduct,
            charge,
            isotopes: Vec::new(),
        }
    }
}

/// Descriptive properties of an identified molecule
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoleculeProperties {
    pub name: String,
    pub formula: String,
    pub ontology: String,
    pub smiles: String,
    pub inchikey: String,
}

/// The best MS2 spectrum acquired at one collision energy
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionEnergyScan {
    pub collision_energy: f64,
    pub spectrum_id: usize,
    pub total_ion_current: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromatogramPeakFeature {
    pub master_peak_id: usize,
    /// The index of this peak within the mass slice it was found in
    pub peak_id: usize,
    pub mass: f64,

    pub chrom_scan_id_left: usize,
    pub chrom_scan_id_top: usize,
    pub chrom_scan_id_right: usize,
    pub ms1_raw_spectrum_id_left: usize,
    pub ms1_raw_spectrum_id_top: usize,
    pub ms1_raw_spectrum_id_right: usize,
    pub chrom_xs_left: f64,
    pub chrom_xs_top: f64,
    pub chrom_xs_right: f64,
    pub peak_height_left: f64,
    pub peak_height_top: f64,
    pub peak_height_right: f64,
    pub peak_area_above_zero: f64,
    pub peak_area_above_baseline: f64,
    pub amplitude_score: f64,
    pub estimated_noise: f64,
    pub signal_to_noise: f64,

    pub ms2_raw_spectrum_id: Option<usize>,
    /// One entry per distinct collision energy, ascending
    pub ms2_raw_spectrum_id_to_ce: Vec<CollisionEnergyScan>,

    pub peak_character: PeakCharacter,
    pub match_results: MatchResultContainer,
    pub molecule: MoleculeProperties,
    pub annotation_state: AnnotationState,
}

impl ChromatogramPeakFeature {
    pub fn from_detection(peak: &PeakDetectionResult, mass: f64, adduct: AdductIon) -> Self {
        let mut feature = Self {
            peak_id: peak.peak_id,
            mass,
            peak_character: PeakCharacter::new(adduct),
            ..Default::default()
        };
        feature.update_geometry(peak);
        feature.amplitude_score = peak.amplitude_score;
        feature
    }

    /// Replace the boundaries and shape statistics with those of `peak`,
    /// leaving the amplitude score alone
    pub fn update_geometry(&mut self, peak: &PeakDetectionResult) {
        self.chrom_scan_id_left = peak.left;
        self.chrom_scan_id_top = peak.top;
        self.chrom_scan_id_right = peak.right;
        self.ms1_raw_spectrum_id_left = peak.scan_left;
        self.ms1_raw_spectrum_id_top = peak.scan_top;
        self.ms1_raw_spectrum_id_right = peak.scan_right;
        self.chrom_xs_left = peak.time_left;
        self.chrom_xs_top = peak.time_top;
        self.chrom_xs_right = peak.time_right;
        self.peak_height_left = peak.intensity_left;
        self.peak_height_top = peak.intensity_top;
        self.peak_height_right = peak.intensity_right;
        self.peak_area_above_zero = peak.area_above_zero;
        self.peak_area_above_baseline = peak.area_above_baseline;
        self.estimated_noise = peak.estimated_noise;
        self.signal_to_noise = peak.signal_to_noise;
    }

    pub fn width(&self) -> f64 {
        self.chrom_xs_right - self.chrom_xs_left
    }

    pub fn amplitude(&self) -> f64 {
        self.peak_height_top - self.peak_height_left.max(self.peak_height_right)
    }

    pub fn overlaps(&self, other: &ChromatogramPeakFeature) -> bool {
        self.chrom_xs_left <= other.chrom_xs_right && other.chrom_xs_left <= self.chrom_xs_right
    }

    pub fn is_consistent(&self) -> bool {
        self.chrom_scan_id_left <= self.chrom_scan_id_top
            && self.chrom_scan_id_top <= self.chrom_scan_id_right
            && self.peak_height_top >= self.peak_height_left
            && self.peak_height_top >= self.peak_height_right
    }

    /// The MS2 spectrum to use for a collision energy, falling back to the
    /// most intense spectrum when none was acquired at that energy
    pub fn ms2_spectrum_for(&self, collision_energy: Option<f64>) -> Option<usize> {
        collision_energy
            .and_then(|ce| {
                self.ms2_raw_spectrum_id_to_ce
                    .iter()
                    .find(|scan| (scan.collision_energy - ce).abs() < 0.01)
                    .map(|scan| scan.spectrum_id)
            })
            .or(self.ms2_raw_spectrum_id)
    }

    pub fn is_annotated(&self) -> bool {
        self.annotation_state != AnnotationState::Unknown
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ms2_lookup() {
        let mut feature = ChromatogramPeakFeature {
            ms2_raw_spectrum_id: Some(7),
            ..Default::default()
        };
        feature.ms2_raw_spectrum_id_to_ce = vec![
            CollisionEnergyScan {
                collision_energy: 10.0,
                spectrum_id: 3,
                total_ion_current: 10.0,
            },
            CollisionEnergyScan {
                collision_energy: 40.0,
                spectrum_id: 7,
                total_ion_current: 50.0,
            },
        ];
        assert_eq!(feature.ms2_spectrum_for(None), Some(7));
        assert_eq!(feature.ms2_spectrum_for(Some(10.0)), Some(3));
        assert_eq!(feature.ms2_spectrum_for(Some(25.0)), Some(7));
        feature.ms2_raw_spectrum_id = None;
        feature.ms2_raw_spectrum_id_to_ce.clear();
        assert_eq!(feature.ms2_spectrum_for(Some(10.0)), None);
    }

    #[test]
    fn test_geometry() {
        let peak = PeakDetectionResult {
            left: 2,
            top: 5,
            right: 9,
            time_left: 1.0,
            time_top: 1.5,
            time_right: 2.2,
            intensity_left: 10.0,
            intensity_top: 100.0,
            intensity_right: 30.0,
            ..Default::default()
        };
        let feature = ChromatogramPeakFeature::from_detection(&peak, 250.1, AdductIon::default());
        assert!(feature.is_consistent());
        assert!((feature.width() - 1.2).abs() < 1e-9);
        assert_eq!(feature.amplitude(), 70.0);
        assert_eq!(feature.peak_character.charge, 1);
    }
}
