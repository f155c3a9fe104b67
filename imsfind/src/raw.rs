//! Access to the centroided spectra of one acquisition.
//!
//! The processing stages only ever read spectra through [`RawSpectra`], which
//! lets the driver decide how they are loaded while the algorithms stay
//! oblivious to file formats.
use std::fmt::Display;

use mzpeaks::coordinate::SimpleInterval;
use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, MZPeakSetType};

use crate::chromatogram::{Chromatogram, ChromatogramPoint};

/// The polarity of an acquisition
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IonMode {
    #[default]
    Positive,
    Negative,
}

impl IonMode {
    pub fn sign(&self) -> i32 {
        match self {
            IonMode::Positive => 1,
            IonMode::Negative => -1,
        }
    }
}

impl Display for IonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IonMode::Positive => f.write_str("Positive"),
            IonMode::Negative => f.write_str("Negative"),
        }
    }
}

/// The precursor selection of an MS2 spectrum
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawPrecursor {
    pub selected_mz: f64,
    /// Lower bound of the isolation window in m/z
    pub isolation_lower: f64,
    /// Upper bound of the isolation window in m/z
    pub isolation_upper: f64,
    pub collision_energy: f64,
    /// The drift time range the quadrupole was held on this window for, as in
    /// pASEF acquisitions. When present, the spectrum already integrates over
    /// the whole mobility range of the precursor.
    pub drift_time_window: Option<(f64, f64)>,
}

impl RawPrecursor {
    pub fn new(selected_mz: f64, isolation_lower: f64, isolation_upper: f64, collision_energy: f64) -> Self {
        Self {
            selected_mz,
            isolation_lower,
            isolation_upper,
            collision_energy,
            drift_time_window: None,
        }
    }

    pub fn with_drift_time_window(mut self, start: f64, end: f64) -> Self {
        self.drift_time_window = Some((start, end));
        self
    }

    pub fn contains_mz(&self, mz: f64) -> bool {
        self.isolation_lower <= mz && mz <= self.isolation_upper
    }

    /// Whether two precursors describe the same isolation window at the same
    /// collision energy
    pub fn same_window(&self, other: &RawPrecursor) -> bool {
        (self.isolation_lower - other.isolation_lower).abs() < 1e-6
            && (self.isolation_upper - other.isolation_upper).abs() < 1e-6
            && (self.collision_energy - other.collision_energy).abs() < 0.01
    }
}

/// A centroided spectrum with the metadata the processing stages need
#[derive(Debug, Default, Clone)]
pub struct RawSpectrum {
    /// Position in the owning [`SpectrumStore`], assigned by the store
    pub index: usize,
    pub id: String,
    pub ms_level: u8,
    pub drift_time: f64,
    pub scan_start_time: f64,
    pub polarity: IonMode,
    pub precursor: Option<RawPrecursor>,
    pub peaks: MZPeakSetType<CentroidPeak>,
    pub total_ion_current: f64,
}

impl RawSpectrum {
    pub fn new(
        id: String,
        ms_level: u8,
        drift_time: f64,
        polarity: IonMode,
        precursor: Option<RawPrecursor>,
        peaks: MZPeakSetType<CentroidPeak>,
    ) -> Self {
        let total_ion_current = peaks.iter().map(|p| p.intensity() as f64).sum();
        Self {
            index: 0,
            id,
            ms_level,
            drift_time,
            scan_start_time: 0.0,
            polarity,
            precursor,
            peaks,
            total_ion_current,
        }
    }

    /// Sum and locate the most intense peak with `start <= mz < end`
    fn integrate(&self, start: f64, end: f64) -> Option<(f64, f64)> {
        let peaks = &self.peaks[0..];
        let i = peaks.partition_point(|p| p.mz < start);
        let mut total = 0.0;
        let mut best: Option<&CentroidPeak> = None;
        for p in peaks[i..].iter().take_while(|p| p.mz < end) {
            total += p.intensity as f64;
            if best.map(|b| p.intensity > b.intensity).unwrap_or(true) {
                best = Some(p);
            }
        }
        best.map(|b| (b.mz, total))
    }
}

/// Read access to the spectra of one acquisition.
pub trait RawSpectra: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spectrum(&self, index: usize) -> Option<&RawSpectrum>;

    /// All spectra of the given MS level ordered by drift time
    fn spectra_at_level(&self, ms_level: u8) -> Vec<&RawSpectrum>;

    /// The smallest and largest m/z observed in any MS1 spectrum
    fn ms1_mz_range(&self) -> Option<(f64, f64)>;

    /// Sum MS1 intensities in `[mz_range.start, mz_range.end)` for every MS1
    /// spectrum whose drift time lies within `time_range`
    fn extract_ms1_chromatogram(
        &self,
        mz_range: &SimpleInterval<f64>,
        time_range: &SimpleInterval<f64>,
    ) -> Chromatogram;
}

/// An in-memory [`RawSpectra`] implementation
#[derive(Debug, Default, Clone)]
pub struct SpectrumStore {
    spectra: Vec<RawSpectrum>,
    ms1: Vec<usize>,
    ms1_times: Vec<f64>,
    ms2: Vec<usize>,
    mz_range: Option<(f64, f64)>,
}

impl FromIterator<RawSpectrum> for SpectrumStore {
    fn from_iter<T: IntoIterator<Item = RawSpectrum>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl SpectrumStore {
    /// Build a store, ordering spectra by drift time and re-numbering them.
    /// Spectra sharing a drift time keep their input order.
    pub fn new(mut spectra: Vec<RawSpectrum>) -> Self {
        spectra.sort_by(|a, b| a.drift_time.total_cmp(&b.drift_time));
        let mut ms1 = Vec::new();
        let mut ms1_times = Vec::new();
        let mut ms2 = Vec::new();
        let mut mz_range: Option<(f64, f64)> = None;
        for (i, s) in spectra.iter_mut().enumerate() {
            s.index = i;
            if s.ms_level == 1 {
                ms1.push(i);
                ms1_times.push(s.drift_time);
                let peaks = &s.peaks[0..];
                if let (Some(first), Some(last)) = (peaks.first(), peaks.last()) {
                    mz_range = Some(match mz_range {
                        Some((lo, hi)) => (lo.min(first.mz), hi.max(last.mz)),
                        None => (first.mz, last.mz),
                    });
                }
            } else {
                ms2.push(i);
            }
        }
        Self {
            spectra,
            ms1,
            ms1_times,
            ms2,
            mz_range,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawSpectrum> {
        self.spectra.iter()
    }

    pub fn ms1_len(&self) -> usize {
        self.ms1.len()
    }

    pub fn ms2_len(&self) -> usize {
        self.ms2.len()
    }
}

impl RawSpectra for SpectrumStore {
    fn len(&self) -> usize {
        self.spectra.len()
    }

    fn spectrum(&self, index: usize) -> Option<&RawSpectrum> {
        self.spectra.get(index)
    }

    fn spectra_at_level(&self, ms_level: u8) -> Vec<&RawSpectrum> {
        let indices = if ms_level == 1 { &self.ms1 } else { &self.ms2 };
        indices
            .iter()
            .map(|i| &self.spectra[*i])
            .filter(|s| s.ms_level == ms_level)
            .collect()
    }

    fn ms1_mz_range(&self) -> Option<(f64, f64)> {
        self.mz_range
    }

    fn extract_ms1_chromatogram(
        &self,
        mz_range: &SimpleInterval<f64>,
        time_range: &SimpleInterval<f64>,
    ) -> Chromatogram {
        let start = self.ms1_times.partition_point(|t| *t < time_range.start);
        let end = self.ms1_times.partition_point(|t| *t <= time_range.end);
        if start >= end {
            return Chromatogram::default();
        }
        let center = (mz_range.start + mz_range.end) / 2.0;
        self.ms1[start..end]
            .iter()
            .map(|i| {
                let s = &self.spectra[*i];
                let (mz, intensity) = s.integrate(mz_range.start, mz_range.end).unwrap_or((center, 0.0));
                ChromatogramPoint::new(s.index, s.drift_time, mz, intensity)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spectrum(dt: f64, ms_level: u8, peaks: &[(f64, f32)]) -> RawSpectrum {
        let peaks: MZPeakSetType<CentroidPeak> = peaks
            .iter()
            .enumerate()
            .map(|(i, (mz, inten))| CentroidPeak::new(*mz, *inten, i as u32))
            .collect();
        RawSpectrum::new(format!("dt={dt}"), ms_level, dt, IonMode::Positive, None, peaks)
    }

    #[test]
    fn test_store_ordering_and_ranges() {
        let store = SpectrumStore::new(vec![
            spectrum(2.0, 1, &[(150.0, 10.0), (300.0, 5.0)]),
            spectrum(1.0, 1, &[(100.0, 20.0)]),
            spectrum(1.5, 2, &[(80.0, 1.0)]),
        ]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.spectrum(0).unwrap().drift_time, 1.0);
        assert_eq!(store.spectrum(1).unwrap().ms_level, 2);
        assert_eq!(store.ms1_mz_range(), Some((100.0, 300.0)));
        assert_eq!(store.spectra_at_level(1).len(), 2);
        assert_eq!(store.spectra_at_level(2).len(), 1);
        assert!(store.spectrum(5).is_none());
    }

    #[test]
    fn test_extract_chromatogram() {
        let store = SpectrumStore::new(vec![
            spectrum(1.0, 1, &[(100.001, 20.0), (100.004, 30.0), (100.02, 5.0)]),
            spectrum(2.0, 1, &[(99.0, 20.0)]),
            spectrum(3.0, 1, &[(100.002, 7.0)]),
        ]);
        let chrom = store.extract_ms1_chromatogram(
            &SimpleInterval::new(100.0, 100.01),
            &SimpleInterval::new(0.0, 2.5),
        );
        assert_eq!(chrom.len(), 2);
        assert!((chrom.points[0].intensity - 50.0).abs() < 1e-6);
        assert!((chrom.points[0].mz - 100.004).abs() < 1e-9);
        assert_eq!(chrom.points[1].intensity, 0.0);
        assert_eq!(chrom.points[1].id, 1);
    }

    #[test]
    fn test_precursor_window() {
        let p = RawPrecursor::new(200.0, 199.5, 200.5, 20.0);
        assert!(p.contains_mz(200.3));
        assert!(!p.contains_mz(201.0));
        let q = RawPrecursor::new(200.1, 199.5, 200.5, 20.004).with_drift_time_window(1.0, 2.0);
        assert!(p.same_window(&q));
    }
}
