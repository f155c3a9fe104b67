//! Library match results and the per-feature container that collects them.
use std::collections::BTreeMap;
use std::fmt::Display;

/// The kind of annotator that produced a result
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnnotatorKind {
    #[default]
    Msp,
    TextDb,
    Generic,
}

impl Display for AnnotatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchResult {
    /// The index of the matched entry in its reference library
    pub library_id: usize,
    pub annotator_id: String,
    pub source: AnnotatorKind,
    pub priority: i32,
    pub name: String,
    pub simple_dot_product: f64,
    pub weighted_dot_product: f64,
    pub reverse_dot_product: f64,
    pub matched_peaks_count: usize,
    pub matched_peaks_percentage: f64,
    pub accurate_mass_similarity: f64,
    pub total_score: f64,
    pub is_precursor_mz_match: bool,
    pub is_spectrum_match: bool,
    pub is_reference_matched: bool,
    pub is_annotation_suggested: bool,
}

impl MatchResult {
    pub fn new(library_id: usize, annotator_id: impl Into<String>, source: AnnotatorKind, priority: i32) -> Self {
        Self {
            library_id,
            annotator_id: annotator_id.into(),
            source,
            priority,
            ..Default::default()
        }
    }

    /// The ordering key used to choose a representative across sources
    pub fn representative_key(&self) -> (i32, f64) {
        (self.priority, self.total_score)
    }
}

/// Return the first item with the greatest key. Later items only replace the
/// current best when they compare strictly greater, so ties resolve to the
/// earliest occurrence and unordered keys (NaN) never win.
pub fn argmax_first<T, K: PartialOrd>(items: &[T], key: impl Fn(&T) -> K) -> Option<&T> {
    let mut best: Option<(&T, K)> = None;
    for item in items {
        let k = key(item);
        let replace = match &best {
            Some((_, bk)) => k > *bk,
            None => k.partial_cmp(&k).is_some(),
        };
        if replace {
            best = Some((item, k));
        }
    }
    best.map(|(item, _)| item)
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchResultContainer {
    results: Vec<MatchResult>,
    /// The library ids of every candidate each annotator produced
    candidate_ids: BTreeMap<String, Vec<usize>>,
}

impl MatchResultContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: MatchResult) {
        self.results.push(result);
    }

    pub fn add_results(&mut self, results: impl IntoIterator<Item = MatchResult>) {
        self.results.extend(results);
    }

    pub fn record_candidates(&mut self, annotator_id: &str, ids: impl IntoIterator<Item = usize>) {
        self.candidate_ids
            .entry(annotator_id.to_string())
            .or_default()
            .extend(ids);
    }

    pub fn candidate_ids(&self, annotator_id: &str) -> &[usize] {
        self.candidate_ids
            .get(annotator_id)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    pub fn all_candidate_ids(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.candidate_ids.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.candidate_ids.clear();
    }

    /// The result with the highest (priority, total score), first added wins ties
    pub fn representative(&self) -> Option<&MatchResult> {
        argmax_first(&self.results, MatchResult::representative_key)
    }

    pub fn is_reference_matched(&self) -> bool {
        self.results.iter().any(|r| r.is_reference_matched)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn result(library_id: usize, priority: i32, score: f64) -> MatchResult {
        let mut r = MatchResult::new(library_id, "test", AnnotatorKind::Msp, priority);
        r.total_score = score;
        r
    }

    #[test]
    fn test_argmax_first_ties() {
        let items = [result(0, 0, 0.9), result(1, 0, 0.9), result(2, 0, 0.5)];
        let best = argmax_first(&items, |r| r.total_score).unwrap();
        assert_eq!(best.library_id, 0);
        assert!(argmax_first::<MatchResult, f64>(&[], |r| r.total_score).is_none());
        let nan_first = [result(0, 0, f64::NAN), result(1, 0, 0.1)];
        assert_eq!(argmax_first(&nan_first, |r| r.total_score).unwrap().library_id, 1);
    }

    #[test]
    fn test_representative_prefers_priority() {
        let mut container = MatchResultContainer::new();
        container.add_result(result(0, 0, 0.95));
        container.add_result(result(1, 1, 0.75));
        container.add_result(result(2, 1, 0.75));
        assert_eq!(container.representative().unwrap().library_id, 1);
        container.record_candidates("test", [4, 2]);
        container.record_candidates("test", [7]);
        assert_eq!(container.candidate_ids("test"), &[4, 2, 7]);
        assert!(container.candidate_ids("other").is_empty());
    }
}
