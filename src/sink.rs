use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;

use crate::types::linalg::*;

/// Destination for the firing position
pub trait ResultSink: Send {
    fn persist(&mut self, state: &StateVec) -> anyhow::Result<()>;
}

/// Writes the firing position as one CSV record with a header row.
pub struct CsvResultSink {
    path: PathBuf,
}

const HEADER: [&str; STATE_DIM] = [
    "x", "y", "z", "yaw", "pitch", "roll", "vx", "vy", "vz", "p", "q", "r",
];

impl CsvResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvResultSink {
    fn persist(&mut self, state: &StateVec) -> anyhow::Result<()> {
        if state.len() != STATE_DIM {
            anyhow::bail!(
                "firing position has {} components, expected {}",
                state.len(),
                STATE_DIM
            );
        }

        let file = File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;
        writer.write_record(state.iter().map(|v| format!("{:.6}", v)))?;
        writer.flush()?;

        info!("Firing position written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_sink_writes_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firing_position.csv");
        let mut sink = CsvResultSink::new(&path);

        let mut state = StateVec::zeros(STATE_DIM);
        state[POS_X] = 0.25;
        state[POS_Z] = 1.5;
        sink.persist(&state).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), STATE_DIM);
        assert_eq!(&headers[2], "z");

        let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][0].parse::<f64>().unwrap(), 0.25);
        assert_eq!(records[0][2].parse::<f64>().unwrap(), 1.5);
    }

    #[test]
    fn test_csv_sink_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvResultSink::new(dir.path().join("out.csv"));
        assert!(sink.persist(&StateVec::zeros(3)).is_err());
    }

    #[test]
    fn test_csv_sink_reports_io_failure() {
        let mut sink = CsvResultSink::new("/nonexistent/dir/out.csv");
        let err = sink.persist(&StateVec::zeros(STATE_DIM)).unwrap_err();
        assert!(err.to_string().contains("failed to create"));
    }
}
