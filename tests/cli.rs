use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::path::Path;
use std::process::Command; // Run programs
use swathprep::model::{AncillarySample, Record, RecordKind, SurveyPing};
use swathprep::parser::sdw::SdwWriter;
use swathprep::parser::SwathWriter;

fn write_line(path: &Path) {
    let mut w = SdwWriter::create(path).unwrap();
    w.put(&Record::Comment("cli test".to_string())).unwrap();
    w.put(&Record::Ancillary {
        kind: RecordKind::Heading,
        samples: vec![
            AncillarySample {
                heading: Some(90.0),
                ..AncillarySample::at(0.0)
            },
            AncillarySample {
                heading: Some(92.0),
                ..AncillarySample::at(4.0)
            },
        ],
    })
    .unwrap();
    for t in 1..=3 {
        w.put(&Record::Survey(SurveyPing {
            time_d: t as f64,
            ..Default::default()
        }))
        .unwrap();
    }
    w.close().unwrap();
}

#[test]
fn count_records() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("line.sdw");
    write_line(&path);
    let mut cmd = Command::cargo_bin("swathprep")?;

    cmd.arg("count").arg(&path);
    cmd.assert().success().stdout(
        predicate::str::contains("3\tsurvey")
            .and(predicate::str::contains("1\tcomment"))
            .and(predicate::str::contains("1\theading")),
    );

    Ok(())
}

#[test]
fn count_records_no_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("swathprep")?;

    cmd.arg("count").arg("assets/missing.sdw");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No such file or directory"));

    Ok(())
}

#[test]
fn preprocess_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("line.sdw");
    write_line(&path);
    let config = dir.path().join("run.json");
    std::fs::write(
        &config,
        serde_json::json!({
            "input": [path],
            "filter": {"length": 0.5}
        })
        .to_string(),
    )?;
    let mut cmd = Command::cargo_bin("swathprep")?;

    cmd.arg("preprocess").arg("--config").arg(&config).arg("-v");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("liner.sdw\t3"))
        .stderr(predicate::str::contains("heading samples available: 2"));
    assert!(dir.path().join("liner.sdw.bah").exists());

    Ok(())
}

#[test]
fn preprocess_rejects_unknown_formats() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("line.xyz");
    write_line(&path);
    let mut cmd = Command::cargo_bin("swathprep")?;

    cmd.arg("preprocess").arg("--input").arg(&path);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("UnknownFormat"));

    Ok(())
}
