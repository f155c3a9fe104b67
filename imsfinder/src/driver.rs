use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use mzdata::io::MassSpectrometryFormat;

use imsfind::annotation::{
    AnnotationSources, AnnotatorContainer, LibraryReadError, MspAnnotator, ReferenceLibrary,
    TextAnnotator,
};
use imsfind::parameters::{
    IsotopeParameter, MsDecParameter, MsRefSearchParameter, PeakPickParameter, ProcessParameter,
};
use imsfind::raw::IonMode;
use imsfind::{CancellationToken, FileProcess, ProcessError, SpectrumStore};

use crate::args::{ArgIonMode, ArgSmoothingMethod, OutputFormat};
use crate::load::read_spectra;
use crate::progress::{LogProgress, ProgressRecord};
use crate::time_range::DriftTimeRange;
use crate::write::write_output;

const MSP_PRIORITY: i32 = 1;
const TEXT_PRIORITY: i32 = 0;

fn positive_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value <= 0.0 {
        Err(format!("`{s}` is not greater than zero"))
    } else {
        Ok(value)
    }
}

fn default_output_file() -> PathBuf {
    PathBuf::from("-")
}

fn default_threads() -> i32 {
    -1
}

#[derive(Debug, Error)]
pub enum ImsfinderError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("The input file format for {0} was either unknown or not supported ({1:?})")]
    FormatUnknownOrNotSupportedError(String, MassSpectrometryFormat),
    #[error("Failed to read reference library {path}: {1}", path = .0.display())]
    LibraryError(PathBuf, #[source] LibraryReadError),
    #[error("Processing failed: {0}")]
    ProcessError(
        #[source]
        #[from]
        ProcessError,
    ),
    #[error("Failed to serialize the output: {0}")]
    SerializationError(
        #[source]
        #[from]
        serde_json::Error,
    ),
}

/// Feature spotting, MS2 deconvolution and library annotation of ion mobility
/// mass spectrometry files.
///
/// Read an mzML or MGF file whose spectra are ordered along the drift time axis,
/// detect features, reconstruct their MS2 spectra and search them against
/// reference libraries, then write a feature table.
#[derive(Parser, Debug, Deserialize, Serialize)]
#[command(author, version)]
pub struct Imsfinder {
    /// The path to read the input spectra from
    #[arg()]
    pub input_file: String,

    /// The path to write the feature table to, or if '-' is passed, write to STDOUT.
    ///
    /// A path ending in `.gz` is gzip compressed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// The format to write the features in. Inferred from the output path if not given.
    #[arg(short = 'f', long = "output-format")]
    pub output_format: Option<OutputFormat>,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `imsfinder.toml` in the working directory.
    /// Environment variables prefixed with `IMSFINDER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    #[serde(default = "default_threads")]
    pub threads: i32,

    /// The drift time range to process, denoted (begin?)-(end?)
    #[arg(
        short='r',
        long="drift-time-range",
        value_parser=DriftTimeRange::from_str,
        value_name="BEGIN-END",
        long_help=r#"The drift time range to process, denoted BEGIN-END, BEGIN:END or "BEGIN END".

Either bound may be omitted to leave that side of the range open. Spectra
outside of the range are skipped while reading.
"#
    )]
    pub drift_time_range: Option<DriftTimeRange>,

    /// The polarity to process the run in. Taken from the MS1 spectra if not given.
    #[arg(short = 'p', long = "ion-mode")]
    pub ion_mode: Option<ArgIonMode>,

    /// The width of the m/z slices chromatograms are extracted over
    #[arg(short = 'w', long = "mass-slice-width", value_parser = positive_float)]
    pub mass_slice_width: Option<f64>,

    /// The minimum apex height of a feature
    #[arg(short = 'a', long = "min-amplitude")]
    pub min_amplitude: Option<f64>,

    /// The minimum number of points a feature must span
    #[arg(short = 'd', long = "min-datapoints")]
    pub min_datapoints: Option<usize>,

    /// The smoothing filter applied to chromatograms before peak detection
    #[arg(short = 's', long = "smoothing-method")]
    pub smoothing_method: Option<ArgSmoothingMethod>,

    /// The number of points on either side of the smoothing window
    #[arg(short = 'L', long = "smoothing-level")]
    pub smoothing_level: Option<usize>,

    /// An MSP spectral library to annotate features with
    #[arg(short = 'm', long = "msp-library")]
    pub msp_library: Option<PathBuf>,

    /// A tab-separated library of names and precursor m/z to annotate features with
    #[arg(short = 'T', long = "text-library")]
    pub text_library: Option<PathBuf>,

    /// Use the raw MS2 spectrum of each feature without correlation-based deconvolution
    #[arg(long = "no-deconvolution")]
    #[serde(default)]
    pub no_deconvolution: bool,

    /// Collapse fragment isotopic envelopes into singly charged monoisotopic peaks
    #[arg(long = "andromeda")]
    #[serde(default)]
    pub andromeda: bool,

    /// Prefer MS2 spectra acquired at this collision energy, falling back to
    /// the most intense MS2 spectrum of a feature when none were acquired at it
    #[arg(short = 'e', long = "collision-energy")]
    pub collision_energy: Option<f64>,

    #[arg(skip)]
    #[serde(default)]
    pub peak_pick: PeakPickParameter,

    #[arg(skip)]
    #[serde(default)]
    pub msdec: MsDecParameter,

    #[arg(skip)]
    #[serde(default)]
    pub isotope: IsotopeParameter,

    #[arg(skip)]
    #[serde(default)]
    pub msp_search: MsRefSearchParameter,

    #[arg(skip)]
    #[serde(default)]
    pub text_search: MsRefSearchParameter,
}

impl Imsfinder {
    fn num_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads as usize
        } else {
            std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)
        }
    }

    /// Apply the command line overrides on top of the configured parameter tables
    pub fn process_parameter(&self) -> ProcessParameter {
        let mut peak_pick = self.peak_pick.clone();
        if let Some(width) = self.mass_slice_width {
            peak_pick.mass_slice_width = width;
        }
        if let Some(amplitude) = self.min_amplitude {
            peak_pick.min_amplitude = amplitude;
        }
        if let Some(points) = self.min_datapoints {
            peak_pick.min_datapoints = points;
        }
        if let Some(method) = self.smoothing_method {
            peak_pick.smoothing_method = method.into();
        }
        if let Some(level) = self.smoothing_level {
            peak_pick.smoothing_level = level;
        }
        if let Some(range) = self.drift_time_range {
            (peak_pick.drift_time_begin, peak_pick.drift_time_end) =
                range.restrict(peak_pick.drift_time_begin, peak_pick.drift_time_end);
        }

        let mut msdec = self.msdec.clone();
        if self.no_deconvolution {
            msdec.deconvolute = false;
        }
        if self.andromeda {
            msdec.andromeda = true;
        }
        if self.collision_energy.is_some() {
            msdec.target_collision_energy = self.collision_energy;
        }

        ProcessParameter {
            ion_mode: self.ion_mode.map(IonMode::from).unwrap_or_default(),
            peak_pick,
            msdec,
            isotope: self.isotope,
            num_threads: self.num_threads(),
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
            .unwrap_or_else(|| OutputFormat::infer_from_path(&self.output_file))
    }

    fn load_sources(&self) -> Result<AnnotationSources, ImsfinderError> {
        let mut sources = AnnotationSources::new();
        if let Some(path) = self.msp_library.as_ref() {
            let library = ReferenceLibrary::read_msp_file(path)
                .map_err(|e| ImsfinderError::LibraryError(path.clone(), e))?;
            info!("Read {} entries from {}", library.len(), path.display());
            sources = sources.with_msp(AnnotatorContainer::from_annotator(
                MspAnnotator::new("msp", library, MSP_PRIORITY),
                self.msp_search.clone(),
            ));
        }
        if let Some(path) = self.text_library.as_ref() {
            let library = ReferenceLibrary::read_text_file(path)
                .map_err(|e| ImsfinderError::LibraryError(path.clone(), e))?;
            info!("Read {} entries from {}", library.len(), path.display());
            sources = sources.with_text(AnnotatorContainer::from_annotator(
                TextAnnotator::new("text", library, TEXT_PRIORITY),
                self.text_search.clone(),
            ));
        }
        if sources.is_empty() {
            warn!("No reference library was given, features will not be annotated");
        }
        Ok(sources)
    }

    /// The polarity of the first MS1 spectrum when none was configured
    fn infer_ion_mode(&self, store: &SpectrumStore) -> Option<IonMode> {
        if self.ion_mode.is_some() {
            return None;
        }
        store.iter().find(|s| s.ms_level == 1).map(|s| s.polarity)
    }

    pub fn main(&self) -> Result<(), ImsfinderError> {
        info!(
            "imsfinder v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Input: {}", self.input_file);
        info!("Output: {}", self.output_file.display());
        let start = Instant::now();

        let sources = self.load_sources()?;
        let store = read_spectra(&self.input_file, self.drift_time_range)?;
        let mut parameter = self.process_parameter();
        if let Some(ion_mode) = self.infer_ion_mode(&store) {
            debug!("Detected {ion_mode} ion mode");
            parameter.ion_mode = ion_mode;
        }
        debug!("Using {} threads", parameter.num_threads);
        info!("Processing in {} ion mode", parameter.ion_mode);

        let process = FileProcess::new(parameter, sources);
        let result = process.run(&store, &LogProgress::new(), &CancellationToken::new())?;
        let processing_elapsed = start.elapsed();

        write_output(&result, &self.output_file, self.output_format())?;

        let prog = ProgressRecord::from_spectra(&store) + ProgressRecord::from_result(&result);
        prog.log();
        info!("Elapsed Time: {:0.3?}", processing_elapsed);
        let elapsed = start.elapsed();
        if (elapsed - processing_elapsed).as_secs_f64() > 2.0 {
            info!("Total Elapsed Time: {:0.3?}", elapsed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use imsfind::chromatogram::SmoothingMethod;

    #[test]
    fn test_cli_overrides() {
        let args = Imsfinder::parse_from([
            "imsfinder",
            "run.mzML",
            "-w",
            "0.05",
            "-s",
            "savitzky-golay",
            "-r",
            "2-8",
            "--no-deconvolution",
            "-e",
            "40",
            "-t",
            "2",
        ]);
        let params = args.process_parameter();
        assert_eq!(params.peak_pick.mass_slice_width, 0.05);
        assert_eq!(params.peak_pick.smoothing_method, SmoothingMethod::SavitzkyGolay);
        assert_eq!(params.peak_pick.drift_time_begin, 2.0);
        assert_eq!(params.peak_pick.drift_time_end, 8.0);
        assert_eq!(params.peak_pick.min_datapoints, PeakPickParameter::default().min_datapoints);
        assert!(!params.msdec.deconvolute);
        assert_eq!(params.msdec.target_collision_energy, Some(40.0));
        assert_eq!(params.num_threads, 2);
        assert_eq!(args.output_format(), OutputFormat::Tsv);
    }

    #[test]
    fn test_defaults_keep_parameter_tables() {
        let mut args = Imsfinder::parse_from(["imsfinder", "run.mzML", "-o", "features.json.gz"]);
        args.peak_pick.min_amplitude = 50.0;
        let params = args.process_parameter();
        assert_eq!(params.peak_pick.min_amplitude, 50.0);
        assert!(params.msdec.deconvolute);
        assert_eq!(args.output_format(), OutputFormat::Json);
    }

    #[test]
    fn test_drift_time_range_narrows_table() {
        let mut args = Imsfinder::parse_from(["imsfinder", "run.mzML", "-r", "2:"]);
        args.peak_pick.drift_time_begin = 3.0;
        args.peak_pick.drift_time_end = 12.0;
        let params = args.process_parameter();
        assert_eq!(params.peak_pick.drift_time_begin, 3.0);
        assert_eq!(params.peak_pick.drift_time_end, 12.0);

        let args = Imsfinder::parse_from(["imsfinder", "run.mzML", "-r", "2:8"]);
        let params = args.process_parameter();
        assert_eq!(params.peak_pick.drift_time_begin, 2.0);
        assert_eq!(params.peak_pick.drift_time_end, 8.0);
        assert!(Imsfinder::try_parse_from(["imsfinder", "run.mzML", "-r", "8:2"]).is_err());
    }
}
