use std::fs;
use std::io;

#[cfg(feature = "mzmlb")]
use mzdata::io::mzmlb::MzMLbReaderType;
use mzdata::io::{
    infer_format,
    mgf::MGFReaderType,
    mzml::MzMLReaderType,
    MassSpectrometryFormat, RestartableGzDecoder, StreamingSpectrumIterator,
};
use mzdata::prelude::*;
use mzdata::spectrum::{MultiLayerSpectrum, ScanPolarity};
use mzpeaks::{CentroidPeak, DeconvolutedPeak};
use tracing::{debug, info, warn};

use imsfind::raw::{IonMode, RawPrecursor};
use imsfind::{RawSpectrum, SpectrumStore};

use crate::driver::ImsfinderError;
use crate::time_range::DriftTimeRange;

pub(crate) type CPeak = CentroidPeak;
pub(crate) type DPeak = DeconvolutedPeak;
pub(crate) type SpectrumType = MultiLayerSpectrum<CPeak, DPeak>;

/// Used when a spectrum does not report the bounds of its isolation window
const DEFAULT_ISOLATION_HALF_WIDTH: f64 = 0.5;
const PEAK_PICKING_SNR: f32 = 1.0;

fn convert_polarity(polarity: ScanPolarity) -> IonMode {
    match polarity {
        ScanPolarity::Negative => IonMode::Negative,
        _ => IonMode::Positive,
    }
}

fn convert_precursor(spectrum: &SpectrumType) -> Option<RawPrecursor> {
    let prec = spectrum.precursor()?;
    let mz = prec.ion().mz;
    let window = &prec.isolation_window;
    let (lower, upper) = if window.upper_bound > window.lower_bound {
        (window.lower_bound as f64, window.upper_bound as f64)
    } else {
        (
            mz - DEFAULT_ISOLATION_HALF_WIDTH,
            mz + DEFAULT_ISOLATION_HALF_WIDTH,
        )
    };
    Some(RawPrecursor::new(
        mz,
        lower,
        upper,
        prec.activation.energy as f64,
    ))
}

/// Centroid `spectrum` if needed and convert it, or return `None` if it falls
/// outside of `drift_time_range` or has no usable signal.
pub(crate) fn convert_spectrum(
    mut spectrum: SpectrumType,
    drift_time_range: &DriftTimeRange,
) -> Option<RawSpectrum> {
    let scan_start_time = spectrum.start_time();
    let drift_time = spectrum.ion_mobility().unwrap_or(scan_start_time);
    if !drift_time_range.contains(drift_time) {
        return None;
    }
    if spectrum.peaks.is_none() {
        if let Err(e) = spectrum.pick_peaks(PEAK_PICKING_SNR) {
            warn!("Failed to pick peaks for {}: {e}", spectrum.id());
            return None;
        }
    }
    let precursor = if spectrum.ms_level() > 1 {
        convert_precursor(&spectrum)
    } else {
        None
    };
    let mut raw = RawSpectrum::new(
        spectrum.id().to_string(),
        spectrum.ms_level(),
        drift_time,
        convert_polarity(spectrum.polarity()),
        precursor,
        spectrum.peaks.take().unwrap_or_default(),
    );
    raw.scan_start_time = scan_start_time;
    Some(raw)
}

fn collect_spectra<I: Iterator<Item = SpectrumType>>(
    reader: I,
    drift_time_range: &DriftTimeRange,
) -> SpectrumStore {
    let mut skipped = 0usize;
    let spectra: Vec<RawSpectrum> = reader
        .filter_map(|s| {
            let converted = convert_spectrum(s, drift_time_range);
            if converted.is_none() {
                skipped += 1;
            }
            converted
        })
        .collect();
    if skipped > 0 {
        debug!("Skipped {skipped} spectra outside of the drift time range or without peaks");
    }
    SpectrumStore::new(spectra)
}

/// Read every spectrum of an mzML or MGF file, optionally gzip compressed,
/// into memory.
pub fn read_spectra(
    input_file: &str,
    drift_time_range: Option<DriftTimeRange>,
) -> Result<SpectrumStore, ImsfinderError> {
    let drift_time_range = drift_time_range.unwrap_or_default();
    if !drift_time_range.is_unbounded() {
        info!(
            "Restricting to drift times {}-{}",
            drift_time_range.start, drift_time_range.end
        );
    }
    let (ms_format, compressed) = infer_format(input_file)?;
    debug!("Detected {ms_format:?} from path (compressed? {compressed})");
    let store = match ms_format {
        MassSpectrometryFormat::MGF => {
            if compressed {
                let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(input_file)?));
                let reader =
                    StreamingSpectrumIterator::new(MGFReaderType::<_, CPeak, DPeak>::new(fh));
                collect_spectra(reader, &drift_time_range)
            } else {
                let reader = MGFReaderType::<_, CPeak, DPeak>::open_path(input_file.to_string())?;
                collect_spectra(reader, &drift_time_range)
            }
        }
        MassSpectrometryFormat::MzML => {
            if compressed {
                let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(input_file)?));
                let reader =
                    StreamingSpectrumIterator::new(MzMLReaderType::<_, CPeak, DPeak>::new(fh));
                collect_spectra(reader, &drift_time_range)
            } else {
                let reader = MzMLReaderType::<_, CPeak, DPeak>::open_path(input_file.to_string())?;
                collect_spectra(reader, &drift_time_range)
            }
        }
        #[cfg(feature = "mzmlb")]
        MassSpectrometryFormat::MzMLb => {
            let reader = MzMLbReaderType::<CPeak, DPeak>::open_path(input_file.to_string())?;
            collect_spectra(reader, &drift_time_range)
        }
        _ => {
            return Err(ImsfinderError::FormatUnknownOrNotSupportedError(
                input_file.to_string(),
                ms_format,
            ))
        }
    };
    info!(
        "Read {} MS1 and {} MS2 spectra",
        store.ms1_len(),
        store.ms2_len()
    );
    Ok(store)
}
