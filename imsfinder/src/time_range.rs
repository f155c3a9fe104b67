use std::{num::ParseFloatError, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The drift time window given on the command line, inclusive at both ends.
/// Either end may be left open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftTimeRange {
    pub start: f64,
    pub end: f64,
}

impl Default for DriftTimeRange {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }
}

impl DriftTimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, drift_time: f64) -> bool {
        self.start <= drift_time && drift_time <= self.end
    }

    pub fn is_unbounded(&self) -> bool {
        self.start <= 0.0 && self.end.is_infinite()
    }

    /// Narrow a configured `(begin, end)` drift time window to this range
    pub fn restrict(&self, begin: f64, end: f64) -> (f64, f64) {
        (begin.max(self.start), end.min(self.end))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriftTimeRangeParseError {
    #[error("Failed to parse drift time range start {0}")]
    MalformedStart(ParseFloatError),
    #[error("Failed to parse drift time range end {0}")]
    MalformedEnd(ParseFloatError),
    #[error("Drift times cannot be negative, got {0}")]
    Negative(f64),
    #[error("Drift time range ends at {end} before it starts at {start}")]
    Inverted { start: f64, end: f64 },
}

impl FromStr for DriftTimeRange {
    type Err = DriftTimeRangeParseError;

    /// Parse `BEGIN-END`, `BEGIN:END` or `BEGIN END`, where either bound may be empty
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (start_s, end_s) = s
            .split_once(':')
            .or_else(|| s.split_once(' '))
            .or_else(|| s.split_once('-'))
            .unwrap_or((s, ""));
        let (start_s, end_s) = (start_s.trim(), end_s.trim());

        let start = if start_s.is_empty() {
            0.0
        } else {
            start_s
                .parse()
                .map_err(DriftTimeRangeParseError::MalformedStart)?
        };
        let end = if end_s.is_empty() {
            f64::INFINITY
        } else {
            end_s.parse().map_err(DriftTimeRangeParseError::MalformedEnd)?
        };
        if start < 0.0 {
            return Err(DriftTimeRangeParseError::Negative(start));
        }
        if end < start {
            return Err(DriftTimeRangeParseError::Inverted { start, end });
        }
        Ok(Self::new(start, end))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_bounds() -> Result<(), DriftTimeRangeParseError> {
        let r: DriftTimeRange = "12.5-".parse()?;
        assert_eq!(r, DriftTimeRange::new(12.5, f64::INFINITY));

        let r: DriftTimeRange = "-30".parse()?;
        assert_eq!(r, DriftTimeRange::new(0.0, 30.0));

        let r: DriftTimeRange = " 10 : 30.0 ".parse()?;
        assert_eq!(r, DriftTimeRange::new(10.0, 30.0));

        let r: DriftTimeRange = "18.2 24".parse()?;
        assert_eq!(r, DriftTimeRange::new(18.2, 24.0));

        let r: DriftTimeRange = "-".parse()?;
        assert!(r.is_unbounded());
        assert_eq!(r, DriftTimeRange::default());
        Ok(())
    }

    #[test]
    fn test_parse_rejects() {
        assert!(matches!(
            "a-4".parse::<DriftTimeRange>(),
            Err(DriftTimeRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "4:b".parse::<DriftTimeRange>(),
            Err(DriftTimeRangeParseError::MalformedEnd(_))
        ));
        assert_eq!(
            "30-10".parse::<DriftTimeRange>(),
            Err(DriftTimeRangeParseError::Inverted {
                start: 30.0,
                end: 10.0
            })
        );
        assert_eq!(
            "-2:5".parse::<DriftTimeRange>(),
            Err(DriftTimeRangeParseError::Negative(-2.0))
        );
    }

    #[test]
    fn test_contains_and_restrict() {
        let r = DriftTimeRange::new(1.0, 2.0);
        assert!(r.contains(1.0));
        assert!(r.contains(2.0));
        assert!(!r.contains(2.01));
        assert!(!r.is_unbounded());
        assert_eq!(r.restrict(0.0, 1.5), (1.0, 1.5));
        assert_eq!(DriftTimeRange::default().restrict(3.0, 8.0), (3.0, 8.0));
    }
}
