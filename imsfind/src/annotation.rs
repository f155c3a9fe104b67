//! Assign identities to peak features by searching reference collections.
//!
//! Each configured source is an [`Annotator`] wrapped in an [`AnnotatorContainer`]
//! with its search thresholds. Sources are consulted in a fixed order: the MSP
//! library, the text library, then any number of generic sources. The best
//! result of each source is stored on the feature, and a
//! [`MatchResultEvaluator`] picks the representative that decides the
//! feature's final identity.
use rayon::prelude::*;
use tracing::{debug, trace};

pub mod annotator;
pub mod evaluator;
pub mod msp;
pub mod query;
pub mod reference;
pub mod scoring;
pub mod text;

pub use annotator::{Annotator, AnnotatorContainer, AnnotatorKind};
pub use evaluator::{DefaultMatchResultEvaluator, MatchResultEvaluator};
pub use msp::MspAnnotator;
pub use query::AnnotationQuery;
pub use reference::{LibraryReadError, ReferenceEntry, ReferenceLibrary};
pub use text::TextAnnotator;

use crate::cancel::CancellationToken;
use crate::error::ProcessError;
use crate::feature::{AnnotationState, ChromatogramPeakFeature, MoleculeProperties};
use crate::isotope::find_isotopic_peaks;
use crate::match_result::argmax_first;
use crate::msdec::MsDecResult;
use crate::parameters::IsotopeParameter;
use crate::progress::{ReportProgress, WorkCounter};
use crate::raw::{IonMode, RawSpectra};
use crate::threads;

/// The reference sources to search, in the order they are consulted
#[derive(Debug, Default, Clone)]
pub struct AnnotationSources {
    pub msp: Option<AnnotatorContainer>,
    pub text: Option<AnnotatorContainer>,
    pub generic: Vec<AnnotatorContainer>,
}

impl AnnotationSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_msp(mut self, container: AnnotatorContainer) -> Self {
        self.msp = Some(container);
        self
    }

    pub fn with_text(mut self, container: AnnotatorContainer) -> Self {
        self.text = Some(container);
        self
    }

    pub fn add_generic(mut self, container: AnnotatorContainer) -> Self {
        self.generic.push(container);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotatorContainer> {
        self.msp
            .iter()
            .chain(self.text.iter())
            .chain(self.generic.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.msp.is_none() && self.text.is_none() && self.generic.is_empty()
    }

    /// The first source with the given annotator id
    pub fn find(&self, annotator_id: &str) -> Option<&AnnotatorContainer> {
        self.iter().find(|c| c.id() == annotator_id)
    }
}

fn apply_reference(feature: &mut ChromatogramPeakFeature, entry: &ReferenceEntry) {
    feature.molecule = MoleculeProperties {
        name: entry.name.clone(),
        formula: entry.formula.clone(),
        ontology: entry.ontology.clone(),
        smiles: entry.smiles.clone(),
        inchikey: entry.inchikey.clone(),
    };
    if let Some(adduct) = entry.adduct.as_ref() {
        feature.peak_character.charge = adduct.charge;
        feature.peak_character.adduct = adduct.clone();
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationProcess<E: MatchResultEvaluator = DefaultMatchResultEvaluator> {
    sources: AnnotationSources,
    evaluator: E,
    isotope: IsotopeParameter,
    ion_mode: IonMode,
    num_threads: usize,
}

impl AnnotationProcess<DefaultMatchResultEvaluator> {
    pub fn new(sources: AnnotationSources, isotope: IsotopeParameter, ion_mode: IonMode) -> Self {
        Self::with_evaluator(sources, DefaultMatchResultEvaluator, isotope, ion_mode)
    }
}

impl<E: MatchResultEvaluator> AnnotationProcess<E> {
    pub fn with_evaluator(
        sources: AnnotationSources,
        evaluator: E,
        isotope: IsotopeParameter,
        ion_mode: IonMode,
    ) -> Self {
        Self {
            sources,
            evaluator,
            isotope,
            ion_mode,
            num_threads: 0,
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn sources(&self) -> &AnnotationSources {
        &self.sources
    }

    /// Annotate every feature with the MS2 result at the same position.
    ///
    /// Features finished before a cancellation keep their annotations.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        features: &mut [ChromatogramPeakFeature],
        dec_results: &[MsDecResult],
        progress: &dyn ReportProgress,
        token: &CancellationToken,
    ) -> Result<(), ProcessError> {
        if features.len() != dec_results.len() {
            return Err(ProcessError::MismatchedInputLengths {
                features: features.len(),
                results: dec_results.len(),
            });
        }
        if self.sources.is_empty() {
            debug!("No annotation sources configured");
            progress.report(1.0);
            return Ok(());
        }
        if features.is_empty() {
            progress.report(1.0);
            return Ok(());
        }

        let counter = WorkCounter::new(features.len(), progress);
        threads::install(self.num_threads, || {
            features
                .par_iter_mut()
                .zip(dec_results.par_iter())
                .for_each(|(feature, dec_result)| {
                    if token.is_cancelled() {
                        return;
                    }
                    self.annotate(provider, feature, dec_result);
                    counter.increment();
                });
        })?;
        token.check()?;
        debug!(
            "Annotated {} of {} features",
            features.iter().filter(|f| f.is_annotated()).count(),
            features.len()
        );
        Ok(())
    }

    /// Search every source for one feature and settle its identity
    pub fn annotate<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        feature: &mut ChromatogramPeakFeature,
        dec_result: &MsDecResult,
    ) {
        if let Some(ms1) = provider
            .spectrum(feature.ms1_raw_spectrum_id_top)
            .filter(|s| s.ms_level == 1)
        {
            feature.peak_character.isotopes = find_isotopic_peaks(
                &ms1.peaks,
                feature.mass,
                feature.peak_character.charge,
                self.isotope.tolerance,
                self.isotope.max_isotopes,
            );
        }

        for container in self.sources.iter() {
            let annotator = container.annotator();
            let parameter = container.parameter();
            let (candidates, filtered, confident) = {
                let query = AnnotationQuery::new(feature, dec_result, parameter, self.ion_mode);
                let candidates = annotator.find_candidates(&query);
                let filtered = annotator.filter_by_threshold(&candidates, parameter);
                let confident = annotator.select_reference_match_results(&candidates, parameter);
                (candidates, filtered, confident)
            };
            trace!(
                "{}: {} candidates, {} above threshold, {} confident for feature {}",
                container.id(),
                candidates.len(),
                filtered.len(),
                confident.len(),
                feature.master_peak_id
            );
            feature
                .match_results
                .record_candidates(container.id(), candidates.iter().map(|r| r.library_id));

            if let Some(best) = argmax_first(&confident, |r| r.total_score) {
                let mut best = best.clone();
                best.is_reference_matched = true;
                best.is_annotation_suggested = false;
                if let Some(entry) = annotator.refer(&best) {
                    apply_reference(feature, entry);
                }
                feature.annotation_state = AnnotationState::Matched;
                feature.match_results.add_result(best);
            } else if let Some(best) = argmax_first(&filtered, |r| r.total_score) {
                let mut best = best.clone();
                best.is_reference_matched = false;
                best.is_annotation_suggested = true;
                if feature.annotation_state != AnnotationState::Matched {
                    if let Some(entry) = annotator.refer(&best) {
                        apply_reference(feature, entry);
                    }
                    feature.annotation_state = AnnotationState::Suggested;
                }
                feature.match_results.add_result(best);
            }
        }

        self.set_representative(feature);
    }

    fn set_representative(&self, feature: &mut ChromatogramPeakFeature) {
        let Some(representative) = self
            .evaluator
            .select_representative(feature.match_results.results())
            .cloned()
        else {
            return;
        };
        let state = if self.evaluator.is_reference_matched(&representative) {
            AnnotationState::Matched
        } else if self.evaluator.is_annotation_suggested(&representative) {
            AnnotationState::Suggested
        } else {
            AnnotationState::Unknown
        };
        if let Some(entry) = self
            .sources
            .find(&representative.annotator_id)
            .and_then(|c| c.annotator().refer(&representative))
        {
            apply_reference(feature, entry);
        }
        feature.annotation_state = state;
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use mzpeaks::peak::MZPoint;

    use super::*;
    use crate::parameters::MsRefSearchParameter;
    use crate::match_result::MatchResult;
    use crate::progress::{NullProgress, RecordingProgress};
    use crate::raw::SpectrumStore;

    /// Hands out a fixed list of candidates, each carrying its own flags
    struct FixedAnnotator {
        id: String,
        library: ReferenceLibrary,
        scores: Vec<(usize, f64, bool)>,
        priority: i32,
    }

    impl FixedAnnotator {
        fn new(id: &str, names: &[&str], scores: Vec<(usize, f64, bool)>, priority: i32) -> Self {
            let library = ReferenceLibrary::new(
                names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| ReferenceEntry::new(*n, 100.0 + i as f64))
                    .collect(),
            );
            Self {
                id: id.to_string(),
                library,
                scores,
                priority,
            }
        }
    }

    impl Annotator for FixedAnnotator {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> AnnotatorKind {
            AnnotatorKind::Generic
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn find_candidates(&self, _query: &AnnotationQuery<'_>) -> Vec<MatchResult> {
            self.scores
                .iter()
                .map(|(library_id, score, spectrum_match)| {
                    let mut r = MatchResult::new(*library_id, self.id.clone(), self.kind(), self.priority);
                    r.total_score = *score;
                    r.is_precursor_mz_match = true;
                    r.is_spectrum_match = *spectrum_match;
                    r
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
                .filter(|r| r.is_spectrum_match)
                .collect()
        }

        fn refer(&self, result: &MatchResult) -> Option<&ReferenceEntry> {
            self.library.get(result.library_id)
        }
    }

    fn container(annotator: FixedAnnotator) -> AnnotatorContainer {
        AnnotatorContainer::new(Arc::new(annotator), MsRefSearchParameter::default())
    }

    fn inputs() -> (SpectrumStore, Vec<ChromatogramPeakFeature>, Vec<MsDecResult>) {
        let feature = ChromatogramPeakFeature {
            mass: 300.1,
            ..Default::default()
        };
        let mut dec = MsDecResult::default_for(&feature);
        dec.spectrum = vec![MZPoint::new(150.05, 100.0)];
        (SpectrumStore::default(), vec![feature], vec![dec])
    }

    #[test]
    fn test_matched_and_suggested() {
        let sources = AnnotationSources::new().add_generic(container(FixedAnnotator::new(
            "fixed",
            &["confident", "close", "closer"],
            vec![(0, 0.9, true), (1, 0.75, false), (2, 0.72, false)],
            0,
        )));
        let process = AnnotationProcess::new(sources, IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, decs) = inputs();
        process
            .run(&store, &mut features, &decs, &RecordingProgress::new(), &CancellationToken::new())
            .unwrap();

        let feature = &features[0];
        assert_eq!(feature.annotation_state, AnnotationState::Matched);
        assert_eq!(feature.molecule.name, "confident");
        assert_eq!(feature.match_results.len(), 1);
        assert_eq!(feature.match_results.candidate_ids("fixed"), &[0, 1, 2]);
    }

    #[test]
    fn test_suggested_only() {
        let sources = AnnotationSources::new().add_generic(container(FixedAnnotator::new(
            "fixed",
            &["weak", "close"],
            vec![(0, 0.3, false), (1, 0.75, false)],
            0,
        )));
        let process = AnnotationProcess::new(sources, IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, decs) = inputs();
        process
            .run(&store, &mut features, &decs, &RecordingProgress::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(features[0].annotation_state, AnnotationState::Suggested);
        assert_eq!(features[0].molecule.name, "close");
    }

    #[test]
    fn test_first_source_wins_ties() {
        let sources = AnnotationSources::new()
            .add_generic(container(FixedAnnotator::new("first", &["a"], vec![(0, 0.9, true)], 1)))
            .add_generic(container(FixedAnnotator::new("second", &["b"], vec![(0, 0.9, true)], 1)));
        let process = AnnotationProcess::new(sources, IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, decs) = inputs();
        process
            .run(&store, &mut features, &decs, &RecordingProgress::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(features[0].match_results.len(), 2);
        assert_eq!(features[0].molecule.name, "a");
    }

    #[test]
    fn test_priority_beats_score() {
        let sources = AnnotationSources::new()
            .add_generic(container(FixedAnnotator::new("low", &["a"], vec![(0, 0.99, true)], 0)))
            .add_generic(container(FixedAnnotator::new("high", &["b"], vec![(0, 0.8, true)], 5)));
        let process = AnnotationProcess::new(sources, IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, decs) = inputs();
        process
            .run(&store, &mut features, &decs, &RecordingProgress::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(features[0].molecule.name, "b");
    }

    #[test]
    fn test_no_sources() {
        let process = AnnotationProcess::new(AnnotationSources::new(), IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, decs) = inputs();
        let progress = RecordingProgress::new();
        process
            .run(&store, &mut features, &decs, &progress, &CancellationToken::new())
            .unwrap();
        assert_eq!(progress.values(), vec![1.0]);
        assert!(features[0].match_results.is_empty());
        assert_eq!(features[0].annotation_state, AnnotationState::Unknown);
    }

    #[test]
    fn test_mismatched_lengths() {
        let process = AnnotationProcess::new(AnnotationSources::new(), IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, _) = inputs();
        let err = process
            .run(&store, &mut features, &[], &NullProgress, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(
            err,
            ProcessError::MismatchedInputLengths {
                features: 1,
                results: 0
            }
        );
    }

    #[test]
    fn test_cancelled() {
        let sources = AnnotationSources::new()
            .add_generic(container(FixedAnnotator::new("fixed", &["a"], vec![(0, 0.9, true)], 0)));
        let process = AnnotationProcess::new(sources, IsotopeParameter::default(), IonMode::Positive);
        let (store, mut features, decs) = inputs();
        let token = CancellationToken::new();
        token.cancel();
        let err = process
            .run(&store, &mut features, &decs, &NullProgress, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

}
