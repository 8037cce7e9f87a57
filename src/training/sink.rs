//! Scalar metric sinks
//!
//! The trainer only ever writes to a sink; nothing is read back.
//!
//! Output file of [`CsvScalarWriter`]: `{dir}/scalars.csv`
//!
//! ```text
//! step,name,value
//! 10,total_loss,3.124500
//! 10,individual_losses/seg_loss,2.890100
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Result;

/// Destination for scalar training/evaluation metrics
pub trait MetricsSink {
    fn record_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()>;

    fn record_grouped_scalars(
        &mut self,
        group: &str,
        values: &[(&str, f64)],
        step: usize,
    ) -> Result<()>;
}

/// Appends scalars as CSV rows
pub struct CsvScalarWriter {
    csv_path: PathBuf,
}

impl CsvScalarWriter {
    /// Create the directory and header row if they don't exist yet
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("scalars.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "step,name,value")?;
            log::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    fn append(&self, rows: &[(String, f64)], step: usize) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        for (name, value) in rows {
            writeln!(f, "{},{},{:.6}", step, name, value)?;
        }
        Ok(())
    }
}

impl MetricsSink for CsvScalarWriter {
    fn record_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        self.append(&[(name.to_string(), value)], step)
    }

    fn record_grouped_scalars(
        &mut self,
        group: &str,
        values: &[(&str, f64)],
        step: usize,
    ) -> Result<()> {
        let rows: Vec<(String, f64)> = values
            .iter()
            .map(|(name, value)| (format!("{}/{}", group, name), *value))
            .collect();
        self.append(&rows, step)
    }
}

/// One recorded scalar write
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarRecord {
    Scalar {
        name: String,
        value: f64,
        step: usize,
    },
    Grouped {
        group: String,
        values: Vec<(String, f64)>,
        step: usize,
    },
}

/// Keeps every write in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<ScalarRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records whose name (or group name) matches
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ScalarRecord> + 'a {
        self.records.iter().filter(move |r| match r {
            ScalarRecord::Scalar { name: n, .. } => n == name,
            ScalarRecord::Grouped { group, .. } => group == name,
        })
    }
}

impl MetricsSink for MemorySink {
    fn record_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        self.records.push(ScalarRecord::Scalar {
            name: name.to_string(),
            value,
            step,
        });
        Ok(())
    }

    fn record_grouped_scalars(
        &mut self,
        group: &str,
        values: &[(&str, f64)],
        step: usize,
    ) -> Result<()> {
        self.records.push(ScalarRecord::Grouped {
            group: group.to_string(),
            values: values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
            step,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_writer_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvScalarWriter::new(dir.path().join("metrics")).unwrap();

        writer.record_scalar("total_loss", 1.5, 10).unwrap();
        writer
            .record_grouped_scalars("individual_losses", &[("seg_loss", 1.0), ("ae_loss", 0.05)], 10)
            .unwrap();

        let content = fs::read_to_string(writer.csv_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "step,name,value",
                "10,total_loss,1.500000",
                "10,individual_losses/seg_loss,1.000000",
                "10,individual_losses/ae_loss,0.050000",
            ]
        );

        // Reopening keeps existing rows and does not repeat the header
        let mut writer = CsvScalarWriter::new(dir.path().join("metrics")).unwrap();
        writer.record_scalar("total_loss", 2.0, 20).unwrap();
        let content = fs::read_to_string(writer.csv_path()).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_memory_sink_filters_by_name() {
        let mut sink = MemorySink::new();
        sink.record_scalar("a", 1.0, 1).unwrap();
        sink.record_grouped_scalars("g", &[("x", 2.0)], 1).unwrap();
        sink.record_scalar("a", 3.0, 2).unwrap();

        assert_eq!(sink.named("a").count(), 2);
        assert_eq!(sink.named("g").count(), 1);
        assert_eq!(sink.named("missing").count(), 0);
    }
}
