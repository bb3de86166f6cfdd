// ============================================================
// Layer 6 — Result Reporter
// ============================================================
// Writes the outcome of a run into the output directory.
//
// Files per evaluated split:
//   eval_results_<split>.txt  — sorted "key = value" lines
//   logits_<split>.txt        — one line of N scores per example
//   logits_<split>.npy        — float32 array (examples, N)
//   labels_<split>.npy        — int64 array (examples,)
//
// Training adds:
//   train_results.txt         — "<examples> <avg loss>" lines
//
// Example eval_results_dev.txt:
//   eval_accuracy = 0.6341
//   eval_loss = 0.9127
//   global_step = 2100
//   loss = 0.4410
//
// The .npy files use format version 1.0: magic, a little-endian u16
// header length, a Python dict literal padded with spaces so the
// data starts on a 64-byte boundary, then the raw values.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::PathBuf,
};

use crate::ml::evaluator::EvalOutcome;
use crate::ml::trainer::TrainSummary;

pub const TRAIN_RESULTS_FILE: &str = "train_results.txt";

const NPY_MAGIC: &[u8] = b"\x93NUMPY\x01\x00";
const NPY_ALIGN: usize = 64;

/// Writes report files under one output directory.
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Fresh `train_results.txt`, handed to the training loop as its loss log.
    pub fn train_log(&self) -> Result<BufWriter<File>> {
        let path = self.dir.join(TRAIN_RESULTS_FILE);
        let file = File::create(&path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        Ok(BufWriter::new(file))
    }

    /// Write every report file of one evaluated split.
    pub fn write_split(&self, split: &str, outcome: &EvalOutcome, train: Option<&TrainSummary>) -> Result<()> {
        self.write_eval_results(split, &eval_results(outcome, train))?;
        self.write_logits_txt(split, &outcome.logits)?;
        self.write_logits_npy(split, &outcome.logits)?;
        self.write_labels_npy(split, &outcome.labels)?;
        tracing::info!(
            "Wrote reports for '{}' ({} examples x {} choices) to '{}'",
            split, outcome.num_examples(), outcome.num_choices(), self.dir.display()
        );
        Ok(())
    }

    pub fn write_eval_results(&self, split: &str, results: &BTreeMap<&'static str, String>) -> Result<()> {
        let path = self.dir.join(format!("eval_results_{split}.txt"));
        let mut f = BufWriter::new(
            File::create(&path).with_context(|| format!("Cannot create '{}'", path.display()))?,
        );

        tracing::info!("***** Eval results ({split}) *****");
        for (key, value) in results {
            tracing::info!("  {} = {}", key, value);
            writeln!(f, "{key} = {value}")?;
        }
        f.flush()?;
        Ok(())
    }

    pub fn write_logits_txt(&self, split: &str, logits: &[Vec<f32>]) -> Result<()> {
        let path = self.dir.join(format!("logits_{split}.txt"));
        let mut f = BufWriter::new(
            File::create(&path).with_context(|| format!("Cannot create '{}'", path.display()))?,
        );
        for row in logits {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        f.flush()?;
        Ok(())
    }

    pub fn write_logits_npy(&self, split: &str, logits: &[Vec<f32>]) -> Result<()> {
        let cols = logits.first().map(Vec::len).unwrap_or(0);
        let mut bytes = npy_header("<f4", &[logits.len(), cols]);
        for v in logits.iter().flatten() {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.write_bytes(&format!("logits_{split}.npy"), &bytes)
    }

    pub fn write_labels_npy(&self, split: &str, labels: &[usize]) -> Result<()> {
        let mut bytes = npy_header("<i8", &[labels.len()]);
        for &label in labels {
            bytes.extend_from_slice(&(label as i64).to_le_bytes());
        }
        self.write_bytes(&format!("labels_{split}.npy"), &bytes)
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, bytes).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Wrote {} bytes to '{}'", bytes.len(), path.display());
        Ok(())
    }
}

/// Key/value lines of `eval_results_<split>.txt`. Floats keep their full
/// round-trip representation.
pub fn eval_results(outcome: &EvalOutcome, train: Option<&TrainSummary>) -> BTreeMap<&'static str, String> {
    let mut results = BTreeMap::new();
    results.insert("eval_accuracy", format!("{:?}", outcome.eval_accuracy));
    results.insert("eval_loss", format!("{:?}", outcome.eval_loss));
    if let Some(summary) = train {
        results.insert("global_step", summary.global_step.to_string());
        results.insert("loss", format!("{:?}", summary.loss));
    }
    results
}

fn npy_header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let shape = match shape {
        [n] => format!("({n},)"),
        dims => {
            let dims: Vec<String> = dims.iter().map(usize::to_string).collect();
            format!("({})", dims.join(", "))
        }
    };
    let mut dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");

    // magic + version (8) + length (2) + dict + trailing newline
    let unpadded = NPY_MAGIC.len() + 2 + dict.len() + 1;
    let padding  = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut out = Vec::with_capacity(NPY_MAGIC.len() + 2 + dict.len());
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> EvalOutcome {
        EvalOutcome {
            eval_loss:     0.75,
            eval_accuracy: 0.5,
            logits:        vec![vec![1.5, -0.5, 0.25], vec![0.0, 2.0, 1.0]],
            labels:        vec![0, 2],
        }
    }

    #[test]
    fn test_eval_results_sorted_with_training_keys() {
        let dir    = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        let summary = TrainSummary { global_step: 12, loss: 0.125, examples: 96 };
        writer.write_split("dev", &outcome(), Some(&summary)).unwrap();

        let text = fs::read_to_string(dir.path().join("eval_results_dev.txt")).unwrap();
        assert_eq!(
            text,
            "eval_accuracy = 0.5\neval_loss = 0.75\nglobal_step = 12\nloss = 0.125\n"
        );
    }

    #[test]
    fn test_eval_only_run_has_no_training_keys() {
        let results = eval_results(&outcome(), None);
        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec!["eval_accuracy", "eval_loss"]);
    }

    #[test]
    fn test_logits_text_one_line_per_example() {
        let dir    = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        writer.write_logits_txt("test", &outcome().logits).unwrap();

        let text = fs::read_to_string(dir.path().join("logits_test.txt")).unwrap();
        assert_eq!(text, "1.5 -0.5 0.25\n0 2 1\n");
    }

    #[test]
    fn test_npy_layout() {
        let dir    = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        writer.write_split("dev", &outcome(), None).unwrap();

        let logits = fs::read(dir.path().join("logits_dev.npy")).unwrap();
        assert_eq!(&logits[..8], NPY_MAGIC);
        let header_len = u16::from_le_bytes([logits[8], logits[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);

        let header = std::str::from_utf8(&logits[10..10 + header_len]).unwrap();
        assert!(header.contains("'descr': '<f4'"));
        assert!(header.contains("'shape': (2, 3)"));
        assert!(header.ends_with('\n'));

        let data = &logits[10 + header_len..];
        assert_eq!(data.len(), 6 * 4);
        assert_eq!(f32::from_le_bytes([data[0], data[1], data[2], data[3]]), 1.5);

        let labels = fs::read(dir.path().join("labels_dev.npy")).unwrap();
        let header_len = u16::from_le_bytes([labels[8], labels[9]]) as usize;
        let header = std::str::from_utf8(&labels[10..10 + header_len]).unwrap();
        assert!(header.contains("'descr': '<i8'"));
        assert!(header.contains("'shape': (2,)"));
        let data = &labels[10 + header_len..];
        assert_eq!(data.len(), 16);
        assert_eq!(i64::from_le_bytes(data[8..16].try_into().unwrap()), 2);
    }

    #[test]
    fn test_train_log_is_truncated() {
        let dir    = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        fs::write(dir.path().join(TRAIN_RESULTS_FILE), "stale\n").unwrap();

        let mut log = writer.train_log().unwrap();
        writeln!(log, "512 0.5").unwrap();
        log.flush().unwrap();

        let text = fs::read_to_string(dir.path().join(TRAIN_RESULTS_FILE)).unwrap();
        assert_eq!(text, "512 0.5\n");
    }
}
