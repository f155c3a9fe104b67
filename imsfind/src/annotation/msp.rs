//! Spectral library search against MSP reference spectra
use tracing::trace;

use crate::match_result::MatchResult;
use crate::parameters::MsRefSearchParameter;

use super::annotator::{Annotator, AnnotatorKind};
use super::query::AnnotationQuery;
use super::reference::{ReferenceEntry, ReferenceLibrary};
use super::scoring::{compare_spectra, gaussian_similarity};

/// Scores a feature's MS2 spectrum against every library entry whose
/// precursor lies within the MS1 tolerance
#[derive(Debug, Clone)]
pub struct MspAnnotator {
    id: String,
    library: ReferenceLibrary,
    kind: AnnotatorKind,
    priority: i32,
}

impl MspAnnotator {
    pub fn new(id: impl Into<String>, library: ReferenceLibrary, priority: i32) -> Self {
        Self {
            id: id.into(),
            library,
            kind: AnnotatorKind::Msp,
            priority,
        }
    }

    /// Report results as coming from a generic source instead of the
    /// dedicated MSP slot
    pub fn with_kind(mut self, kind: AnnotatorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    fn score(
        &self,
        query: &AnnotationQuery<'_>,
        spectrum: &[mzpeaks::peak::MZPoint],
        entry: &ReferenceEntry,
    ) -> MatchResult {
        let parameter = query.parameter;
        let similarity = compare_spectra(spectrum, &entry.spectrum, parameter.ms2_tolerance);
        let mass_similarity =
            gaussian_similarity(query.precursor_mz, entry.precursor_mz, parameter.ms1_tolerance);

        let mut result = MatchResult::new(entry.library_id, self.id.clone(), self.kind, self.priority);
        result.name = entry.name.clone();
        result.simple_dot_product = similarity.simple_dot_product;
        result.weighted_dot_product = similarity.weighted_dot_product;
        result.reverse_dot_product = similarity.reverse_dot_product;
        result.matched_peaks_count = similarity.matched_peaks_count;
        result.matched_peaks_percentage = similarity.matched_peaks_percentage;
        result.accurate_mass_similarity = mass_similarity;
        result.total_score = (mass_similarity
            + similarity.simple_dot_product
            + similarity.weighted_dot_product
            + similarity.reverse_dot_product
            + similarity.matched_peaks_percentage)
            / 5.0;
        result.is_precursor_mz_match =
            (query.precursor_mz - entry.precursor_mz).abs() <= parameter.ms1_tolerance;
        result.is_spectrum_match = similarity.simple_dot_product >= parameter.simple_dot_product_cutoff
            && similarity.weighted_dot_product >= parameter.weighted_dot_product_cutoff
            && similarity.reverse_dot_product >= parameter.reverse_dot_product_cutoff
            && similarity.matched_peaks_percentage >= parameter.matched_peaks_percentage_cutoff
            && similarity.matched_peaks_count >= parameter.minimum_spectrum_match;
        result
    }
}

impl Annotator for MspAnnotator {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AnnotatorKind {
        self.kind
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn find_candidates(&self, query: &AnnotationQuery<'_>) -> Vec<MatchResult> {
        if !query.in_mass_range() {
            return Vec::new();
        }
        let spectrum = query.filtered_spectrum();
        if spectrum.is_empty() {
            return Vec::new();
        }
        let candidates: Vec<MatchResult> = self
            .library
            .search(query.precursor_mz, query.parameter.ms1_tolerance)
            .iter()
            .filter(|entry| entry.ion_mode.map_or(true, |mode| mode == query.ion_mode))
            .map(|entry| self.score(query, &spectrum, entry))
            .collect();
        trace!(
            "{} found {} candidates for m/z {:.4}",
            self.id,
            candidates.len(),
            query.precursor_mz
        );
        candidates
    }

    fn filter_by_threshold(
        &self,
        candidates: &[MatchResult],
        parameter: &MsRefSearchParameter,
    ) -> Vec<MatchResult> {
        candidates
            .iter()
            .filter(|r| r.is_precursor_mz_match && r.total_score >= parameter.total_score_cutoff)
            .cloned()
            .collect()
    }

    fn select_reference_match_results(
        &self,
        candidates: &[MatchResult],
        parameter: &MsRefSearchParameter,
    ) -> Vec<MatchResult> {
        self.filter_by_threshold(candidates, parameter)
            .into_iter()
            .filter(|r| r.is_spectrum_match)
            .collect()
    }

    fn refer(&self, result: &MatchResult) -> Option<&ReferenceEntry> {
        self.library.get(result.library_id)
    }
}
