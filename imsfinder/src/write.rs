use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::debug;

use imsfind::pipeline::FileProcessResult;
use imsfind::{ChromatogramPeakFeature, MsDecResult};

use crate::args::OutputFormat;
use crate::driver::ImsfinderError;

const TSV_HEADER: &[&str] = &[
    "peak_id",
    "mz",
    "drift_time_left",
    "drift_time_top",
    "drift_time_right",
    "height",
    "area_above_zero",
    "area_above_baseline",
    "signal_to_noise",
    "adduct",
    "ms2_spectrum_index",
    "ms2_peak_count",
    "deconvoluted",
    "annotation_state",
    "name",
    "formula",
    "ontology",
    "smiles",
    "inchikey",
    "annotation_source",
    "total_score",
];

#[derive(Debug, Serialize)]
struct MsDecRecord {
    raw_spectrum_id: Option<usize>,
    precursor_mz: f64,
    model_peak_height: f64,
    model_peak_area: f64,
    is_deconvoluted: bool,
    /// (m/z, intensity) pairs
    spectrum: Vec<(f64, f32)>,
}

impl From<&MsDecResult> for MsDecRecord {
    fn from(value: &MsDecResult) -> Self {
        Self {
            raw_spectrum_id: value.raw_spectrum_id,
            precursor_mz: value.precursor_mz,
            model_peak_height: value.model_peak_height,
            model_peak_area: value.model_peak_area,
            is_deconvoluted: value.is_deconvoluted,
            spectrum: value.spectrum.iter().map(|p| (p.mz, p.intensity)).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FeatureRecord<'a> {
    #[serde(flatten)]
    feature: &'a ChromatogramPeakFeature,
    ms2: MsDecRecord,
}

fn tsv_row(feature: &ChromatogramPeakFeature, dec: &MsDecResult) -> String {
    let (source, score) = match feature.match_results.representative() {
        Some(best) if feature.is_annotated() => (best.annotator_id.clone(), format!("{:.4}", best.total_score)),
        _ => (String::new(), String::new()),
    };
    let ms2_index = dec
        .raw_spectrum_id
        .map(|i| i.to_string())
        .unwrap_or_default();
    [
        feature.master_peak_id.to_string(),
        format!("{:.5}", feature.mass),
        format!("{:.4}", feature.chrom_xs_left),
        format!("{:.4}", feature.chrom_xs_top),
        format!("{:.4}", feature.chrom_xs_right),
        format!("{:.2}", feature.peak_height_top),
        format!("{:.2}", feature.peak_area_above_zero),
        format!("{:.2}", feature.peak_area_above_baseline),
        format!("{:.2}", feature.signal_to_noise),
        feature.peak_character.adduct.to_string(),
        ms2_index,
        dec.spectrum.len().to_string(),
        dec.is_deconvoluted.to_string(),
        feature.annotation_state.to_string(),
        feature.molecule.name.clone(),
        feature.molecule.formula.clone(),
        feature.molecule.ontology.clone(),
        feature.molecule.smiles.clone(),
        feature.molecule.inchikey.clone(),
        source,
        score,
    ]
    .into_iter()
    .map(|field| field.replace(['\t', '\n'], " "))
    .collect::<Vec<_>>()
    .join("\t")
}

pub fn write_tsv<W: Write>(result: &FileProcessResult, mut writer: W) -> io::Result<()> {
    writeln!(writer, "{}", TSV_HEADER.join("\t"))?;
    for (feature, dec) in result.iter() {
        writeln!(writer, "{}", tsv_row(feature, dec))?;
    }
    writer.flush()
}

pub fn write_json<W: Write>(result: &FileProcessResult, mut writer: W) -> Result<(), ImsfinderError> {
    let records: Vec<FeatureRecord> = result
        .iter()
        .map(|(feature, dec)| FeatureRecord {
            feature,
            ms2: dec.into(),
        })
        .collect();
    serde_json::to_writer(&mut writer, &records)?;
    writer.flush()?;
    Ok(())
}

fn write_format<W: Write>(
    result: &FileProcessResult,
    format: OutputFormat,
    writer: W,
) -> Result<(), ImsfinderError> {
    match format {
        OutputFormat::Tsv => write_tsv(result, writer)?,
        OutputFormat::Json => write_json(result, writer)?,
    }
    Ok(())
}

fn is_gzipped_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or_default()
}

/// Write `result` to `output_file`, or to STDOUT if it is `-`
pub fn write_output(
    result: &FileProcessResult,
    output_file: &PathBuf,
    format: OutputFormat,
) -> Result<(), ImsfinderError> {
    if *output_file == PathBuf::from("-") {
        let handle = io::BufWriter::new(io::stdout().lock());
        write_format(result, format, handle)
    } else {
        let handle = io::BufWriter::new(fs::File::create(output_file)?);
        if is_gzipped_path(output_file) {
            debug!("Compressing output with gzip");
            let mut encoder = GzEncoder::new(handle, Compression::best());
            write_format(result, format, &mut encoder)?;
            encoder.finish()?.flush()?;
            Ok(())
        } else {
            write_format(result, format, handle)
        }
    }
}
