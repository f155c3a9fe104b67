use crate::match_result::{argmax_first, MatchResult};

/// Decides how much trust a match result deserves and which result
/// represents a feature
pub trait MatchResultEvaluator: Send + Sync {
    fn is_reference_matched(&self, result: &MatchResult) -> bool;

    fn is_annotation_suggested(&self, result: &MatchResult) -> bool;

    /// The highest (priority, total score) result, the earliest winning ties
    fn select_representative<'a>(&self, results: &'a [MatchResult]) -> Option<&'a MatchResult> {
        argmax_first(results, MatchResult::representative_key)
    }
}

/// Trusts the flags the annotation process stamped on each result
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMatchResultEvaluator;

impl MatchResultEvaluator for DefaultMatchResultEvaluator {
    fn is_reference_matched(&self, result: &MatchResult) -> bool {
        result.is_reference_matched
    }

    fn is_annotation_suggested(&self, result: &MatchResult) -> bool {
        !result.is_reference_matched && result.is_annotation_suggested
    }
}
