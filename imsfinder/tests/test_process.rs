use std::{error::Error, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("imsfinder")?;

    cmd.arg("not_real.mzML").arg("-o").arg("-");
    cmd.assert().failure().stderr(predicate::str::contains("NotFound"));
    Ok(())
}

#[test]
fn test_library_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("imsfinder")?;

    cmd.arg("tests/data/small.mgf")
        .args(["-o", "-", "-m", "not_real.msp"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("LibraryError"));
    Ok(())
}

#[test]
fn test_malformed_drift_time_range() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("imsfinder")?;

    cmd.arg("not_real.mzML").args(["-o", "-", "-r", "a-z"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "Failed to parse drift time range start invalid float literal",
    ));

    let mut cmd = Command::cargo_bin("imsfinder")?;

    cmd.arg("not_real.mzML").args(["-o", "-", "-r", "25:20"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "Drift time range ends at 20 before it starts at 25",
    ));

    Ok(())
}

#[test]
fn test_run_tsv() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("imsfinder")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("tests/data/small.mgf").args([
        "-o",
        "-",
        "-m",
        "tests/data/library.msp",
        "-T",
        "tests/data/library.tsv",
    ]);
    let result = cmd.assert().success();
    result
        .stdout(predicate::str::starts_with("peak_id\tmz\t"))
        .stderr(predicate::str::contains("Read 2 entries from tests/data/library.msp"))
        .stderr(predicate::str::contains("Features: 0"));
    Ok(())
}
