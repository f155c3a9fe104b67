//! Precursor-mass-only search against a tabular compound list
use crate::match_result::MatchResult;
use crate::parameters::MsRefSearchParameter;

use super::annotator::{Annotator, AnnotatorKind};
use super::query::AnnotationQuery;
use super::reference::{ReferenceEntry, ReferenceLibrary};
use super::scoring::gaussian_similarity;

/// Matches features to library entries by precursor m/z alone. The score is
/// the Gaussian mass similarity, and a hit within the MS1 tolerance that
/// passes the score cutoff counts as a reference match.
#[derive(Debug, Clone)]
pub struct TextAnnotator {
    id: String,
    library: ReferenceLibrary,
    priority: i32,
}

impl TextAnnotator {
    pub fn new(id: impl Into<String>, library: ReferenceLibrary, priority: i32) -> Self {
        Self {
            id: id.into(),
            library,
            priority,
        }
    }

    pub fn library(&self) -> &ReferenceLibrary {
        &self.library
    }
}

impl Annotator for TextAnnotator {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AnnotatorKind {
        AnnotatorKind::TextDb
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn find_candidates(&self, query: &AnnotationQuery<'_>) -> Vec<MatchResult> {
        if !query.in_mass_range() {
            return Vec::new();
        }
        let tolerance = query.parameter.ms1_tolerance;
        self.library
            .search(query.precursor_mz, tolerance)
            .iter()
            .filter(|entry| entry.ion_mode.map_or(true, |mode| mode == query.ion_mode))
            .map(|entry| {
                let mut result =
                    MatchResult::new(entry.library_id, self.id.clone(), AnnotatorKind::TextDb, self.priority);
                result.name = entry.name.clone();
                result.accurate_mass_similarity =
                    gaussian_similarity(query.precursor_mz, entry.precursor_mz, tolerance);
                result.total_score = result.accurate_mass_similarity;
                result.is_precursor_mz_match = (query.precursor_mz - entry.precursor_mz).abs() <= tolerance;
                result
            })
            .collect()
    }

    fn filter_by_threshold(
        &self,
        candidates: &[MatchResult],
        parameter: &MsRefSearchParameter,
    ) -> Vec<MatchResult> {
        candidates
            .iter()
            .filter(|r| r.total_score >= parameter.total_score_cutoff)
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
            .filter(|r| r.is_precursor_mz_match)
            .collect()
    }

    fn refer(&self, result: &MatchResult) -> Option<&ReferenceEntry> {
        self.library.get(result.library_id)
    }
}
