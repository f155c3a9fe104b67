use std::fmt::Display;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use imsfind::chromatogram::SmoothingMethod;
use imsfind::raw::IonMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgIonMode {
    Positive,
    Negative,
}

impl From<ArgIonMode> for IonMode {
    fn from(value: ArgIonMode) -> Self {
        match value {
            ArgIonMode::Positive => IonMode::Positive,
            ArgIonMode::Negative => IonMode::Negative,
        }
    }
}

impl Display for ArgIonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgSmoothingMethod {
    /// Simple moving average
    Sma,
    /// Linear weighted moving average
    Lwma,
    /// Quadratic Savitzky-Golay filter
    SavitzkyGolay,
    Binomial,
}

impl From<ArgSmoothingMethod> for SmoothingMethod {
    fn from(value: ArgSmoothingMethod) -> Self {
        match value {
            ArgSmoothingMethod::Sma => SmoothingMethod::SimpleMovingAverage,
            ArgSmoothingMethod::Lwma => SmoothingMethod::LinearWeightedMovingAverage,
            ArgSmoothingMethod::SavitzkyGolay => SmoothingMethod::SavitzkyGolay,
            ArgSmoothingMethod::Binomial => SmoothingMethod::BinomialFilter,
        }
    }
}

impl Display for ArgSmoothingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// A tab-separated feature table
    #[default]
    Tsv,
    /// A JSON array of features with their deconvoluted MS2 spectra
    Json,
}

impl OutputFormat {
    /// Guess the format from a path's extension, looking past a trailing `.gz`
    pub fn infer_from_path(path: &Path) -> Self {
        let name = path.to_string_lossy().to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(name.as_str());
        if name.ends_with(".json") {
            Self::Json
        } else {
            Self::Tsv
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
