mod args;
mod driver;
mod load;
mod progress;
mod time_range;
mod write;

pub use args::*;
pub use driver::{Imsfinder, ImsfinderError};
pub use load::read_spectra;
pub use progress::{LogProgress, ProgressRecord};
pub use time_range::{DriftTimeRange, DriftTimeRangeParseError};
pub use write::{write_json, write_output, write_tsv};
