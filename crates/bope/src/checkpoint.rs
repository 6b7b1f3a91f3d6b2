//! Checkpoint files of an experiment.
//!
//! Every file is first written next to its destination then renamed over it, so
//! that an interrupted write never leaves a truncated result behind.
use crate::data::OutcomeSamples;
use crate::errors::Result;
use crate::results::{ExperimentLog, RunRecord};

use log::debug;
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the whole experiment log
pub const LOG_FILE: &str = "bope_log.json";
/// Suffix of the evaluated designs file of a pipeline
pub const INPUTS_SUFFIX: &str = "x.npy";
/// Suffix of the observed outcomes file of a pipeline
pub const OUTCOMES_SUFFIX: &str = "y.npy";

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `value` as JSON at `path` through a temporary file
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temporary_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!("Checkpoint written to {}", path.display());
    Ok(())
}

/// Reads a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Writes `array` as a npy file at `path` through a temporary file
pub fn write_npy_atomic(path: &Path, array: &Array2<f64>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temporary_path(path);
    write_npy(&tmp, array)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Saves experiment results within a directory
#[derive(Clone, Debug)]
pub struct Checkpointer {
    directory: PathBuf,
}

impl Checkpointer {
    /// Checkpointer writing in `directory`, created on first write
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Checkpointer {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Checkpoint directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn run_stem(trial: u64, method: &str, strategy: &str) -> String {
        format!("trial{trial}_{method}_{strategy}")
    }

    /// Path of the record file of a pipeline
    pub fn run_path(&self, trial: u64, method: &str, strategy: &str) -> PathBuf {
        self.directory
            .join(format!("{}.json", Self::run_stem(trial, method, strategy)))
    }

    /// Saves the record of a pipeline
    pub fn save_run(&self, record: &RunRecord) -> Result<()> {
        write_json_atomic(
            &self.run_path(record.trial, &record.method, &record.strategy),
            record,
        )
    }

    /// Loads the record of a pipeline
    pub fn load_run(&self, trial: u64, method: &str, strategy: &str) -> Result<RunRecord> {
        read_json(&self.run_path(trial, method, strategy))
    }

    /// Saves the designs evaluated by a pipeline
    pub fn save_samples(
        &self,
        trial: u64,
        method: &str,
        strategy: &str,
        samples: &OutcomeSamples,
    ) -> Result<()> {
        let stem = Self::run_stem(trial, method, strategy);
        write_npy_atomic(
            &self.directory.join(format!("{stem}_{INPUTS_SUFFIX}")),
            &samples.x,
        )?;
        write_npy_atomic(
            &self.directory.join(format!("{stem}_{OUTCOMES_SUFFIX}")),
            &samples.y,
        )
    }

    /// Loads the designs evaluated by a pipeline
    pub fn load_samples(&self, trial: u64, method: &str, strategy: &str) -> Result<OutcomeSamples> {
        let stem = Self::run_stem(trial, method, strategy);
        let x: Array2<f64> = read_npy(self.directory.join(format!("{stem}_{INPUTS_SUFFIX}")))?;
        let y: Array2<f64> = read_npy(self.directory.join(format!("{stem}_{OUTCOMES_SUFFIX}")))?;
        OutcomeSamples::new(x, y)
    }

    /// Saves the whole experiment log
    pub fn save_log(&self, log: &ExperimentLog) -> Result<()> {
        write_json_atomic(&self.directory.join(LOG_FILE), log)
    }

    /// Loads the experiment log if one was saved
    pub fn load_log(&self) -> Result<Option<ExperimentLog>> {
        let path = self.directory.join(LOG_FILE);
        if path.exists() {
            Ok(Some(read_json(&path)?))
        } else {
            Ok(None)
        }
    }
}
