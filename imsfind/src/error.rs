use thiserror::Error;

/// An error that interrupts one of the processing stages.
///
/// The absence of data is never reported through this type. An empty
/// chromatogram, a missing MS2 scan or a spectrum without candidates
/// all produce empty collections instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessError {
    #[error("Processing was cancelled")]
    Cancelled,
    #[error("Received {features} peak features but {results} deconvolution results")]
    MismatchedInputLengths { features: usize, results: usize },
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Failed to build a thread pool: {0}")]
    ThreadPool(String),
}

impl ProcessError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
