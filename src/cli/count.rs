//! Count the records of each kind in a swath file
use crate::error::Result;
use crate::model::RecordKind;
use crate::parser::{Format, SwathReader};
use std::collections::BTreeMap;
use std::io::{stdout, Write};
use std::path::PathBuf;

/// Tally records by kind, returning the counts and the number of records
/// that could not be decoded
pub fn count_records(reader: Box<dyn SwathReader>) -> (BTreeMap<RecordKind, usize>, usize) {
    let mut counts = BTreeMap::new();
    let mut malformed = 0;
    for record in reader {
        match record {
            Ok(r) => *counts.entry(r.kind()).or_insert(0) += 1,
            Err(_) => malformed += 1,
        }
    }
    (counts, malformed)
}

fn write_counts<W: Write>(
    mut writer: W,
    counts: &BTreeMap<RecordKind, usize>,
    malformed: usize,
) -> Result<()> {
    for (key, value) in counts {
        writeln!(writer, "{}\t{}", value, key)?;
    }
    if malformed > 0 {
        writeln!(writer, "{}\tmalformed", malformed)?;
    }
    Ok(())
}

pub fn count(path: PathBuf, output: Option<PathBuf>, format: Option<Format>) -> Result<()> {
    let format = match format {
        Some(f) => f,
        None => Format::from_path(&path)?,
    };
    let (counts, malformed) = count_records(format.open_reader(&path)?);

    match output {
        Some(path) => {
            let writer = std::fs::File::create(path)?;
            write_counts(writer, &counts, malformed)?;
        }
        None => {
            write_counts(stdout().lock(), &counts, malformed)?;
        }
    };
    Ok(())
}
