//! Peak spotting, MS2 deconvolution and reference library annotation for
//! ion mobility mass spectrometry acquisitions.
//!
//! The three processing stages share one data model and run in order:
//!
//! 1. [`peak_spotting::PeakSpotting`] walks the m/z axis in fixed-width slices, detects
//!    peaks along the drift time axis and refines them into [`feature::ChromatogramPeakFeature`]s.
//! 2. [`msdec::Ms2Dec`] attaches a cleaned MS2 spectrum ([`msdec::MsDecResult`]) to each feature.
//! 3. [`annotation::AnnotationProcess`] scores each spectrum against one or more reference
//!    collections and records the best identity.
//!
//! [`pipeline::FileProcess`] drives all three for a single [`raw::RawSpectra`] source.
pub mod adduct;
pub mod annotation;
pub mod cancel;
pub mod chromatogram;
pub mod error;
pub mod feature;
pub mod isotope;
pub mod match_result;
pub mod msdec;
pub mod parameters;
pub mod peak_detection;
pub mod peak_spotting;
pub mod pipeline;
pub mod progress;
pub mod raw;
pub mod summary;
mod threads;

pub use cancel::CancellationToken;
pub use error::ProcessError;
pub use feature::ChromatogramPeakFeature;
pub use msdec::{Ms2Dec, MsDecResult};
pub use peak_spotting::PeakSpotting;
pub use pipeline::FileProcess;
pub use raw::{RawSpectra, RawSpectrum, SpectrumStore};
