//! Reference libraries and readers for the MSP and tab-separated text formats
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use mzpeaks::peak::MZPoint;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adduct::AdductIon;
use crate::raw::IonMode;

#[derive(Debug, Error)]
pub enum LibraryReadError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
    #[error("The text library header has no {0} column")]
    MissingColumn(&'static str),
}

/// One compound of a reference library
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReferenceEntry {
    /// The position of this entry in its library once sorted by precursor m/z
    pub library_id: usize,
    pub name: String,
    pub precursor_mz: f64,
    pub adduct: Option<AdductIon>,
    pub ion_mode: Option<IonMode>,
    pub formula: String,
    pub ontology: String,
    pub smiles: String,
    pub inchikey: String,
    pub collision_energy: Option<f64>,
    pub ccs: Option<f64>,
    pub comment: String,
    /// Fragment peaks in ascending m/z order
    pub spectrum: Vec<MZPoint>,
}

impl ReferenceEntry {
    pub fn new(name: impl Into<String>, precursor_mz: f64) -> Self {
        Self {
            name: name.into(),
            precursor_mz,
            ..Default::default()
        }
    }

    pub fn with_spectrum(mut self, mut spectrum: Vec<MZPoint>) -> Self {
        spectrum.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        self.spectrum = spectrum;
        self
    }
}

/// A collection of reference entries ordered by precursor m/z
#[derive(Debug, Default, Clone)]
pub struct ReferenceLibrary {
    entries: Vec<ReferenceEntry>,
}

impl FromIterator<ReferenceEntry> for ReferenceLibrary {
    fn from_iter<T: IntoIterator<Item = ReferenceEntry>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl ReferenceLibrary {
    pub fn new(mut entries: Vec<ReferenceEntry>) -> Self {
        entries.sort_by(|a, b| a.precursor_mz.total_cmp(&b.precursor_mz));
        for (i, e) in entries.iter_mut().enumerate() {
            e.library_id = i;
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, library_id: usize) -> Option<&ReferenceEntry> {
        self.entries.get(library_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceEntry> {
        self.entries.iter()
    }

    /// All entries whose precursor m/z is within `tolerance` of `mz`
    pub fn search(&self, mz: f64, tolerance: f64) -> &[ReferenceEntry] {
        let start = self.entries.partition_point(|e| e.precursor_mz < mz - tolerance);
        let end = self.entries.partition_point(|e| e.precursor_mz <= mz + tolerance);
        &self.entries[start..end.max(start)]
    }

    pub fn read_msp_file<P: AsRef<Path>>(path: P) -> Result<Self, LibraryReadError> {
        let handle = io::BufReader::new(fs::File::open(path.as_ref())?);
        let entries = read_msp(handle)?;
        debug!("Read {} MSP entries from {}", entries.len(), path.as_ref().display());
        Ok(Self::new(entries))
    }

    pub fn read_text_file<P: AsRef<Path>>(path: P) -> Result<Self, LibraryReadError> {
        let handle = io::BufReader::new(fs::File::open(path.as_ref())?);
        let entries = read_text_library(handle)?;
        debug!("Read {} text library entries from {}", entries.len(), path.as_ref().display());
        Ok(Self::new(entries))
    }
}

fn parse_ion_mode(value: &str) -> Option<IonMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "positive" | "pos" | "p" | "+" => Some(IonMode::Positive),
        "negative" | "neg" | "n" | "-" => Some(IonMode::Negative),
        _ => None,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
        .parse()
        .ok()
}

#[derive(Default)]
struct MspRecord {
    entry: ReferenceEntry,
    has_precursor: bool,
    start_line: usize,
}

impl MspRecord {
    fn finish(self, entries: &mut Vec<ReferenceEntry>) {
        if self.has_precursor {
            let mut entry = self.entry;
            let spectrum = std::mem::take(&mut entry.spectrum);
            entries.push(entry.with_spectrum(spectrum));
        } else if !self.entry.name.is_empty() {
            warn!(
                "Skipping MSP record \"{}\" starting on line {} without a precursor m/z",
                self.entry.name, self.start_line
            );
        }
    }
}

/// Read NIST MSP formatted records.
///
/// Records are separated by blank lines. Header keys are case-insensitive.
/// Records without a precursor m/z are skipped.
pub fn read_msp<R: BufRead>(reader: R) -> Result<Vec<ReferenceEntry>, LibraryReadError> {
    let mut entries = Vec::new();
    let mut record: Option<MspRecord> = None;
    let mut in_peaks = false;
    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            if let Some(r) = record.take() {
                r.finish(&mut entries);
            }
            in_peaks = false;
            continue;
        }
        let current = record.get_or_insert_with(|| MspRecord {
            start_line: line_no,
            ..Default::default()
        });
        if in_peaks {
            let mut tokens = line.split(|c: char| c.is_whitespace() || c == ',' || c == ';');
            let mz = tokens.next().and_then(|t| t.parse::<f64>().ok());
            let intensity = tokens
                .find(|t| !t.is_empty())
                .and_then(|t| t.parse::<f32>().ok());
            match (mz, intensity) {
                (Some(mz), Some(intensity)) => current.entry.spectrum.push(MZPoint::new(mz, intensity)),
                _ => {
                    return Err(LibraryReadError::MalformedRecord {
                        line: line_no,
                        reason: format!("expected a peak, found \"{line}\""),
                    })
                }
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(LibraryReadError::MalformedRecord {
                line: line_no,
                reason: format!("expected a \"key: value\" pair, found \"{line}\""),
            });
        };
        let value = value.trim();
        match key.trim().to_ascii_uppercase().as_str() {
            "NAME" => current.entry.name = value.to_string(),
            "PRECURSORMZ" | "PRECURSOR_MZ" => match parse_number(value) {
                Some(mz) => {
                    current.entry.precursor_mz = mz;
                    current.has_precursor = true;
                }
                None => {
                    return Err(LibraryReadError::MalformedRecord {
                        line: line_no,
                        reason: format!("invalid precursor m/z \"{value}\""),
                    })
                }
            },
            "PRECURSORTYPE" | "ADDUCT" => current.entry.adduct = AdductIon::parse(value),
            "IONMODE" | "ION_MODE" => current.entry.ion_mode = parse_ion_mode(value),
            "FORMULA" => current.entry.formula = value.to_string(),
            "ONTOLOGY" | "COMPOUNDCLASS" => current.entry.ontology = value.to_string(),
            "SMILES" => current.entry.smiles = value.to_string(),
            "INCHIKEY" => current.entry.inchikey = value.to_string(),
            "COLLISIONENERGY" => current.entry.collision_energy = parse_number(value),
            "CCS" => current.entry.ccs = parse_number(value),
            "COMMENT" | "COMMENTS" => current.entry.comment = value.to_string(),
            "NUM PEAKS" | "NUMPEAKS" => in_peaks = true,
            _ => {}
        }
    }
    if let Some(r) = record.take() {
        r.finish(&mut entries);
    }
    Ok(entries)
}

/// Read a tab-separated compound table. The first line is a header naming the
/// columns; an m/z column is required, all others are optional.
pub fn read_text_library<R: BufRead>(reader: R) -> Result<Vec<ReferenceEntry>, LibraryReadError> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => return Ok(Vec::new()),
    };
    let columns: Vec<String> = header
        .split('\t')
        .map(|c| c.trim().to_ascii_lowercase().replace(&[' ', '_'][..], ""))
        .collect();
    let find = |names: &[&str]| columns.iter().position(|c| names.contains(&c.as_str()));
    let mz_col = find(&["mz", "m/z", "precursormz", "precursorm/z", "accuratemass"])
        .ok_or(LibraryReadError::MissingColumn("m/z"))?;
    let name_col = find(&["name", "metabolitename", "compound"]);
    let adduct_col = find(&["adduct", "precursortype", "adducttype"]);
    let formula_col = find(&["formula"]);
    let inchikey_col = find(&["inchikey"]);
    let smiles_col = find(&["smiles"]);
    let ontology_col = find(&["ontology", "compoundclass"]);
    let ccs_col = find(&["ccs"]);

    let mut entries = Vec::new();
    for (i, line) in lines.enumerate() {
        let line_no = i + 2;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(|f| f.trim()).collect();
        let get = |col: Option<usize>| {
            col.and_then(|c| fields.get(c))
                .map(|s| s.to_string())
                .unwrap_or_default()
        };
        let mz = fields
            .get(mz_col)
            .and_then(|f| f.parse::<f64>().ok())
            .ok_or_else(|| LibraryReadError::MalformedRecord {
                line: line_no,
                reason: format!("invalid m/z in \"{line}\""),
            })?;
        let mut entry = ReferenceEntry::new(get(name_col), mz);
        entry.adduct = adduct_col.and_then(|c| fields.get(c)).and_then(|a| AdductIon::parse(a));
        entry.formula = get(formula_col);
        entry.inchikey = get(inchikey_col);
        entry.smiles = get(smiles_col);
        entry.ontology = get(ontology_col);
        entry.ccs = ccs_col.and_then(|c| fields.get(c)).and_then(|v| parse_number(v));
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod test {
    use super::*;

    const MSP: &str = "NAME: Caffeine
PRECURSORMZ: 195.0877
PRECURSORTYPE: [M+H]+
IONMODE: Positive
FORMULA: C8H10N4O2
INCHIKEY: RYYVLZVUVIJVGH-UHFFFAOYSA-N
Num Peaks: 2
138.0662\t100
110.0713\t25

NAME: No precursor
Num Peaks: 1
50.0 1

Name: Adenine
PrecursorMZ: 136.0618
Num Peaks: 1
119.0352 100 \"c\"
";

    #[test]
    fn test_read_msp() {
        let entries = read_msp(io::Cursor::new(MSP)).unwrap();
        assert_eq!(entries.len(), 2);
        let caffeine = &entries[0];
        assert_eq!(caffeine.name, "Caffeine");
        assert_eq!(caffeine.precursor_mz, 195.0877);
        assert_eq!(caffeine.adduct.as_ref().unwrap().name, "[M+H]+");
        assert_eq!(caffeine.ion_mode, Some(IonMode::Positive));
        assert_eq!(caffeine.spectrum.len(), 2);
        assert_eq!(caffeine.spectrum[0].mz, 110.0713);
        assert_eq!(entries[1].spectrum[0].mz, 119.0352);

        let library = ReferenceLibrary::new(entries);
        assert_eq!(library.get(0).unwrap().name, "Adenine");
        assert_eq!(library.search(195.09, 0.01).len(), 1);
        assert!(library.search(300.0, 0.01).is_empty());
    }

    #[test]
    fn test_read_msp_malformed() {
        let text = "NAME: Broken\nPRECURSORMZ: 100\nNum Peaks: 1\nfifty ten\n";
        assert!(matches!(
            read_msp(io::Cursor::new(text)),
            Err(LibraryReadError::MalformedRecord { line: 4, .. })
        ));
    }

    #[test]
    fn test_read_text_library() {
        let text = "Name\tMZ\tAdduct\tFormula\nGlucose\t203.0526\t[M+Na]+\tC6H12O6\nUnknown thing\t150.1\t\t\n";
        let entries = read_text_library(io::Cursor::new(text)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].adduct.as_ref().unwrap().name, "[M+Na]+");
        assert_eq!(entries[0].formula, "C6H12O6");
        assert!(entries[1].adduct.is_none());

        let missing = read_text_library(io::Cursor::new("Name\tFormula\nx\ty\n"));
        assert!(matches!(missing, Err(LibraryReadError::MissingColumn(_))));
    }
}
