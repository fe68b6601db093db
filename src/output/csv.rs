//! CSV results writer
//!
//! Writes the flat results file for one run. CSV keeps the output trivially
//! loadable in pandas, R, and spreadsheets, which is where these numbers
//! end up. The schema is fixed at compile time; see [`super::METRIC_COLUMNS`]
//! for the metric column order.

use super::{METRIC_COLUMNS, NO_ERROR, UNAVAILABLE};
use crate::bench::{MetricRecord, RunResults};
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub struct CsvWriter {
    file: File,
}

impl CsvWriter {
    /// Create the results file and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        let mut header = String::from("node,domain,device,interface,peer,workload,blocksize,threads,flags");
        for column in METRIC_COLUMNS {
            header.push(',');
            header.push_str(column);
        }
        header.push_str(",error");
        writeln!(file, "{header}")?;
        Ok(Self { file })
    }

    /// Append one record as one row.
    pub fn write_record(&mut self, record: &MetricRecord) -> Result<()> {
        let mut row = String::new();
        push_field(&mut row, &record.node);
        row.push(',');
        row.push_str(&record.domain.to_string());
        for field in [
            &record.device,
            &record.interface,
            &record.peer,
            &record.workload,
            &record.blocksize,
        ] {
            row.push(',');
            push_field(&mut row, field.as_deref().unwrap_or(UNAVAILABLE));
        }
        row.push(',');
        match record.threads {
            Some(threads) => row.push_str(&threads.to_string()),
            None => row.push_str(UNAVAILABLE),
        }
        row.push(',');
        push_field(&mut row, record.flags.as_deref().unwrap_or(UNAVAILABLE));
        for column in METRIC_COLUMNS {
            row.push(',');
            match record.metrics.get(*column) {
                Some(value) => row.push_str(&value.to_string()),
                None => row.push_str(UNAVAILABLE),
            }
        }
        row.push(',');
        push_field(&mut row, record.error.as_deref().unwrap_or(NO_ERROR));
        writeln!(self.file, "{row}")?;
        Ok(())
    }

    /// Write every collected record and flush.
    pub fn write_results(&mut self, results: &RunResults) -> Result<()> {
        for record in results.records() {
            self.write_record(record)?;
        }
        self.file.flush()?;
        info!(rows = results.len(), degraded = results.degraded(), "results file written");
        Ok(())
    }
}

/// Append a field, quoted per RFC 4180 when it carries a delimiter. Error
/// markers embed raw tool stderr (`mount: ... wrong fs type, bad option,
/// bad superblock`), which routinely contains commas.
fn push_field(row: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        row.push('"');
        row.push_str(&field.replace('"', "\"\""));
        row.push('"');
    } else {
        row.push_str(field);
    }
}
