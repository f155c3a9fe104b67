//! Run every processing stage over one acquisition
use tracing::info;

use crate::annotation::{AnnotationProcess, AnnotationSources};
use crate::cancel::CancellationToken;
use crate::error::ProcessError;
use crate::feature::ChromatogramPeakFeature;
use crate::msdec::{Ms2Dec, MsDecResult};
use crate::parameters::ProcessParameter;
use crate::peak_spotting::PeakSpotting;
use crate::progress::{ReportProgress, ScaledProgress};
use crate::raw::RawSpectra;
use crate::summary::PeakWidthSummary;
use crate::threads;

const SPOTTING_SPAN: f64 = 0.4;
const MSDEC_SPAN: f64 = 0.4;
const ANNOTATION_SPAN: f64 = 0.2;

#[derive(Debug, Default, Clone)]
pub struct FileProcessResult {
    pub features: Vec<ChromatogramPeakFeature>,
    /// One entry per feature, in the same order
    pub dec_results: Vec<MsDecResult>,
    pub summary: PeakWidthSummary,
}

impl FileProcessResult {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChromatogramPeakFeature, &MsDecResult)> {
        self.features.iter().zip(self.dec_results.iter())
    }
}

/// Peak spotting, MS2 deconvolution and annotation with a shared
/// cancellation token and a single progress sink
#[derive(Debug, Clone)]
pub struct FileProcess {
    parameter: ProcessParameter,
    sources: AnnotationSources,
}

impl FileProcess {
    pub fn new(parameter: ProcessParameter, sources: AnnotationSources) -> Self {
        Self { parameter, sources }
    }

    pub fn parameter(&self) -> &ProcessParameter {
        &self.parameter
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        progress: &dyn ReportProgress,
        token: &CancellationToken,
    ) -> Result<FileProcessResult, ProcessError> {
        threads::install(self.parameter.num_threads, || {
            self.run_stages(provider, progress, token)
        })?
    }

    fn run_stages<R: RawSpectra + ?Sized>(
        &self,
        provider: &R,
        progress: &dyn ReportProgress,
        token: &CancellationToken,
    ) -> Result<FileProcessResult, ProcessError> {
        let parameter = &self.parameter;

        let spotting = PeakSpotting::new(parameter.peak_pick.clone(), parameter.ion_mode);
        let mut features = spotting.run(
            provider,
            &ScaledProgress::new(progress, 0.0, SPOTTING_SPAN),
            token,
        )?;
        let summary = PeakWidthSummary::from_features(&features);
        info!(
            "Spotted {} features, median width {:.3}",
            features.len(),
            summary.median_width
        );

        let msdec = Ms2Dec::new(
            parameter.msdec.clone(),
            parameter.peak_pick.clone(),
            parameter.ion_mode,
        );
        let dec_results = msdec.get_ms2_dec_results(
            provider,
            &features,
            &summary,
            parameter.msdec.target_collision_energy,
            &ScaledProgress::new(progress, SPOTTING_SPAN, MSDEC_SPAN),
            token,
        )?;

        let annotation = AnnotationProcess::new(self.sources.clone(), parameter.isotope, parameter.ion_mode);
        annotation.run(
            provider,
            &mut features,
            &dec_results,
            &ScaledProgress::new(progress, SPOTTING_SPAN + MSDEC_SPAN, ANNOTATION_SPAN),
            token,
        )?;
        info!(
            "Annotated {} of {} features",
            features.iter().filter(|f| f.is_annotated()).count(),
            features.len()
        );

        Ok(FileProcessResult {
            features,
            dec_results,
            summary,
        })
    }
}
