//! Parameter packages for each processing stage.
//!
//! Every package has a [`Default`] tuned for small molecule ion mobility data
//! and is (de)serializable when the `serde` feature is enabled, so that partial
//! tables in a configuration file fall back to those defaults field by field.
use crate::chromatogram::SmoothingMethod;
use crate::error::ProcessError;
use crate::raw::IonMode;

/// How precise the m/z axis of the instrument is
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccuracyType {
    #[default]
    Accurate,
    /// Unit resolution, every mass slice is one Dalton wide
    Nominal,
}

/// A mass to ignore during peak spotting, e.g. a known contaminant
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExcludedMass {
    pub mass: f64,
    pub tolerance: f64,
}

impl ExcludedMass {
    pub fn new(mass: f64, tolerance: f64) -> Self {
        Self { mass, tolerance }
    }

    pub fn excludes(&self, mass: f64) -> bool {
        (mass - self.mass).abs() <= self.tolerance
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PeakPickParameter {
    /// The width of each m/z slice chromatograms are extracted for
    pub mass_slice_width: f64,
    pub accuracy_type: AccuracyType,
    pub min_datapoints: usize,
    pub min_amplitude: f64,
    pub smoothing_method: SmoothingMethod,
    pub smoothing_level: usize,
    pub mass_range_begin: f64,
    pub mass_range_end: f64,
    pub drift_time_begin: f64,
    pub drift_time_end: f64,
    /// The m/z tolerance used when re-extracting a peak's chromatogram
    pub centroid_ms1_tolerance: f64,
    /// The m/z tolerance used to trace fragments across MS2 spectra
    pub centroid_ms2_tolerance: f64,
    pub excluded_masses: Vec<ExcludedMass>,
}

impl Default for PeakPickParameter {
    fn default() -> Self {
        Self {
            mass_slice_width: 0.1,
            accuracy_type: AccuracyType::Accurate,
            min_datapoints: 5,
            min_amplitude: 1000.0,
            smoothing_method: SmoothingMethod::LinearWeightedMovingAverage,
            smoothing_level: 3,
            mass_range_begin: 0.0,
            mass_range_end: 2000.0,
            drift_time_begin: 0.0,
            drift_time_end: f64::INFINITY,
            centroid_ms1_tolerance: 0.01,
            centroid_ms2_tolerance: 0.025,
            excluded_masses: Vec::new(),
        }
    }
}

impl PeakPickParameter {
    pub fn mass_step(&self) -> f64 {
        match self.accuracy_type {
            AccuracyType::Nominal => 1.0,
            AccuracyType::Accurate => self.mass_slice_width,
        }
    }

    pub fn is_excluded(&self, mass: f64) -> bool {
        self.excluded_masses.iter().any(|e| e.excludes(mass))
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        if !(self.mass_step() > 0.0) {
            return Err(ProcessError::InvalidParameter {
                name: "mass_slice_width",
                reason: format!("must be positive, got {}", self.mass_slice_width),
            });
        }
        if self.mass_range_begin > self.mass_range_end {
            return Err(ProcessError::InvalidParameter {
                name: "mass_range_begin",
                reason: format!(
                    "{} is greater than the end of the range {}",
                    self.mass_range_begin, self.mass_range_end
                ),
            });
        }
        if self.drift_time_begin > self.drift_time_end {
            return Err(ProcessError::InvalidParameter {
                name: "drift_time_begin",
                reason: format!(
                    "{} is greater than the end of the range {}",
                    self.drift_time_begin, self.drift_time_end
                ),
            });
        }
        if self.min_datapoints == 0 {
            return Err(ProcessError::InvalidParameter {
                name: "min_datapoints",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MsDecParameter {
    /// Whether to separate co-fragmenting precursors by chromatographic
    /// correlation, or only curate the raw MS2 spectrum
    pub deconvolute: bool,
    /// Collapse fragment isotopic envelopes into singly charged monoisotopic peaks
    pub andromeda: bool,
    pub andromeda_max_charge: i32,
    pub andromeda_error_tolerance: f64,
    pub amplitude_cutoff: f64,
    pub remove_after_precursor: bool,
    pub kept_isotope_range: f64,
    pub keep_original_precursor_isotopes: bool,
    pub correlation_threshold: f64,
    /// The collision energy whose MS2 spectrum is used, or the most intense
    /// spectrum when unset
    pub target_collision_energy: Option<f64>,
}

impl Default for MsDecParameter {
    fn default() -> Self {
        Self {
            deconvolute: true,
            andromeda: false,
            andromeda_max_charge: 2,
            andromeda_error_tolerance: 20.0,
            amplitude_cutoff: 0.0,
            remove_after_precursor: true,
            kept_isotope_range: 5.0,
            keep_original_precursor_isotopes: false,
            correlation_threshold: 0.7,
            target_collision_energy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct IsotopeParameter {
    pub tolerance: f64,
    pub max_isotopes: usize,
}

impl Default for IsotopeParameter {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_isotopes: 2,
        }
    }
}

/// Thresholds applied when matching against a reference library
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MsRefSearchParameter {
    pub ms1_tolerance: f64,
    pub ms2_tolerance: f64,
    pub mass_range_begin: f64,
    pub mass_range_end: f64,
    /// Query peaks below this percentage of the base peak are ignored
    pub relative_amp_cutoff: f64,
    pub absolute_amp_cutoff: f64,
    pub simple_dot_product_cutoff: f64,
    pub weighted_dot_product_cutoff: f64,
    pub reverse_dot_product_cutoff: f64,
    pub matched_peaks_percentage_cutoff: f64,
    pub minimum_spectrum_match: usize,
    pub total_score_cutoff: f64,
}

impl Default for MsRefSearchParameter {
    fn default() -> Self {
        Self {
            ms1_tolerance: 0.01,
            ms2_tolerance: 0.05,
            mass_range_begin: 0.0,
            mass_range_end: 2000.0,
            relative_amp_cutoff: 0.0,
            absolute_amp_cutoff: 0.0,
            simple_dot_product_cutoff: 0.5,
            weighted_dot_product_cutoff: 0.5,
            reverse_dot_product_cutoff: 0.5,
            matched_peaks_percentage_cutoff: 0.3,
            minimum_spectrum_match: 1,
            total_score_cutoff: 0.7,
        }
    }
}

/// Everything a single file run needs
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ProcessParameter {
    pub ion_mode: IonMode,
    pub peak_pick: PeakPickParameter,
    pub msdec: MsDecParameter,
    pub isotope: IsotopeParameter,
    /// The number of worker threads, zero to use the ambient thread pool
    pub num_threads: usize,
}
