//! The interface every reference source implements
use std::sync::Arc;

use crate::match_result::MatchResult;
use crate::parameters::MsRefSearchParameter;

use super::query::AnnotationQuery;
use super::reference::ReferenceEntry;

pub use crate::match_result::AnnotatorKind;

/// A reference source that can propose identities for a feature.
///
/// Searching is split into three steps so that the annotation process can
/// keep a full audit trail: every candidate, the candidates passing the
/// source's score threshold, and the subset confident enough to count as a
/// reference match.
pub trait Annotator: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> AnnotatorKind;

    /// Results from sources with a higher priority are preferred over better
    /// scoring results from lower priority sources
    fn priority(&self) -> i32 {
        0
    }

    fn find_candidates(&self, query: &AnnotationQuery<'_>) -> Vec<MatchResult>;

    fn filter_by_threshold(
        &self,
        candidates: &[MatchResult],
        parameter: &MsRefSearchParameter,
    ) -> Vec<MatchResult>;

    fn select_reference_match_results(
        &self,
        candidates: &[MatchResult],
        parameter: &MsRefSearchParameter,
    ) -> Vec<MatchResult>;

    /// The library entry a result was produced from
    fn refer(&self, result: &MatchResult) -> Option<&ReferenceEntry>;
}

/// An annotator paired with the search thresholds it is run with
#[derive(Clone)]
pub struct AnnotatorContainer {
    annotator: Arc<dyn Annotator>,
    parameter: MsRefSearchParameter,
}

impl std::fmt::Debug for AnnotatorContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotatorContainer")
            .field("id", &self.annotator.id())
            .field("kind", &self.annotator.kind())
            .field("parameter", &self.parameter)
            .finish()
    }
}

impl AnnotatorContainer {
    pub fn new(annotator: Arc<dyn Annotator>, parameter: MsRefSearchParameter) -> Self {
        Self {
            annotator,
            parameter,
        }
    }

    pub fn from_annotator<A: Annotator + 'static>(annotator: A, parameter: MsRefSearchParameter) -> Self {
        Self::new(Arc::new(annotator), parameter)
    }

    pub fn annotator(&self) -> &dyn Annotator {
        self.annotator.as_ref()
    }

    pub fn parameter(&self) -> &MsRefSearchParameter {
        &self.parameter
    }

    pub fn id(&self) -> &str {
        self.annotator.id()
    }
}
