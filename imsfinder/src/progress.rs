use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicUsize, Ordering};

use imsfind::feature::AnnotationState;
use imsfind::pipeline::FileProcessResult;
use imsfind::progress::ReportProgress;
use imsfind::SpectrumStore;
use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub ms1_spectra: usize,
    pub ms2_spectra: usize,
    pub features: usize,
    pub features_with_ms2: usize,
    pub deconvoluted: usize,
    pub matched: usize,
    pub suggested: usize,
}

impl ProgressRecord {
    pub fn from_spectra(store: &SpectrumStore) -> Self {
        Self {
            ms1_spectra: store.ms1_len(),
            ms2_spectra: store.ms2_len(),
            ..Default::default()
        }
    }

    pub fn from_result(result: &FileProcessResult) -> Self {
        let mut prog = Self {
            features: result.len(),
            ..Default::default()
        };
        for (feature, dec) in result.iter() {
            if feature.ms2_raw_spectrum_id.is_some() {
                prog.features_with_ms2 += 1;
            }
            if dec.is_deconvoluted {
                prog.deconvoluted += 1;
            }
            match feature.annotation_state {
                AnnotationState::Matched => prog.matched += 1,
                AnnotationState::Suggested => prog.suggested += 1,
                AnnotationState::Unknown => {}
            }
        }
        prog
    }

    pub fn log(&self) {
        info!("MS1 Spectra: {}", self.ms1_spectra);
        info!("MS2 Spectra: {}", self.ms2_spectra);
        info!(
            "Features: {} | With MS2: {} | Deconvoluted: {}",
            self.features, self.features_with_ms2, self.deconvoluted
        );
        info!("Matched: {} | Suggested: {}", self.matched, self.suggested);
    }
}

impl Add for ProgressRecord {
    type Output = ProgressRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ProgressRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.ms1_spectra += rhs.ms1_spectra;
        self.ms2_spectra += rhs.ms2_spectra;
        self.features += rhs.features;
        self.features_with_ms2 += rhs.features_with_ms2;
        self.deconvoluted += rhs.deconvoluted;
        self.matched += rhs.matched;
        self.suggested += rhs.suggested;
    }
}

/// Writes a log line every time another tenth of the work is done
#[derive(Debug, Default)]
pub struct LogProgress {
    decile: AtomicUsize,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportProgress for LogProgress {
    fn report(&self, fraction: f64) {
        let decile = (fraction.clamp(0.0, 1.0) * 10.0).floor() as usize;
        let previous = self.decile.fetch_max(decile, Ordering::AcqRel);
        if decile > previous {
            info!("{}% complete", decile * 10);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_sum() {
        let a = ProgressRecord {
            ms1_spectra: 10,
            ms2_spectra: 20,
            ..Default::default()
        };
        let b = ProgressRecord {
            features: 3,
            matched: 1,
            ..Default::default()
        };
        let c = a + b;
        assert_eq!(c.ms1_spectra, 10);
        assert_eq!(c.features, 3);
        assert_eq!(c.matched, 1);
    }

    #[test]
    fn test_log_progress_is_monotonic() {
        let sink = LogProgress::new();
        sink.report(0.25);
        assert_eq!(sink.decile.load(Ordering::SeqCst), 2);
        sink.report(0.1);
        assert_eq!(sink.decile.load(Ordering::SeqCst), 2);
        sink.report(1.0);
        assert_eq!(sink.decile.load(Ordering::SeqCst), 10);
    }
}
