// ============================================================
// Layer 4 — Dataset Readers
// ============================================================
// One reader per benchmark, all behind the ExampleSource trait.
// DatasetReader is the tagged variant the application layer holds,
// chosen once from the task of the run.
//
//   Task::Dream  → DreamReader   (dialogue QA, 3 choices)
//   Task::Mctest → MctestReader  (story QA, 4 choices)
//   Task::Race   → RaceReader    (exam passages, 4 choices)

pub mod dream;
pub mod mctest;
pub mod race;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use crate::domain::error::McError;
use crate::domain::example::{Example, Split};
use crate::domain::traits::ExampleSource;

pub use dream::DreamReader;
pub use mctest::MctestReader;
pub use race::RaceReader;

// ─── Task ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Dream,
    Mctest,
    Race,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Dream  => "dream",
            Task::Mctest => "mctest",
            Task::Race   => "race",
        }
    }

    /// Lower encoder layers frozen when the run does not say otherwise.
    /// MCTest is small enough that tuning the whole encoder overfits.
    pub fn default_freeze_layers(&self) -> usize {
        match self {
            Task::Mctest => 6,
            Task::Dream | Task::Race => 0,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dream"  => Ok(Task::Dream),
            "mctest" => Ok(Task::Mctest),
            "race"   => Ok(Task::Race),
            other    => Err(McError::config(format!("unknown task '{other}'"))),
        }
    }
}

// ─── DatasetReader ────────────────────────────────────────────────────────────
pub enum DatasetReader {
    Dream(DreamReader),
    Mctest(MctestReader),
    Race(RaceReader),
}

impl DatasetReader {
    pub fn new(task: Task, data_dir: &Path, mctest_set: &str) -> Self {
        match task {
            Task::Dream  => DatasetReader::Dream(DreamReader::new(data_dir)),
            Task::Mctest => DatasetReader::Mctest(MctestReader::new(data_dir, mctest_set)),
            Task::Race   => DatasetReader::Race(RaceReader::new(data_dir)),
        }
    }
}

impl ExampleSource for DatasetReader {
    fn read(&self, split: Split) -> Result<Vec<Example>> {
        match self {
            DatasetReader::Dream(r)  => r.read(split),
            DatasetReader::Mctest(r) => r.read(split),
            DatasetReader::Race(r)   => r.read(split),
        }
    }
}
