// ============================================================
// Layer 5 — Evaluation Loop
// ============================================================
// One routine for every split: a sequential DataLoader feeds the
// model in eval mode, one forward pass per batch.
//
//   eval_loss     = Σ batch-mean losses / number of batches
//   eval_accuracy = correct predictions / number of examples
//
// The two denominators differ on purpose, so a short final batch
// weighs as much as a full one in the loss but not in accuracy.
//
// Logits leave the device once per batch; the prediction is the
// first maximum of each row.

use anyhow::Result;
use burn::{data::dataset::Dataset, prelude::*};

use crate::data::{dataset::ChoiceDataset, loader::sequential_loader};
use crate::domain::error::McError;
use crate::ml::model::BertMultipleChoice;

// ─── EvalOutcome ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub eval_loss:     f64,
    pub eval_accuracy: f64,
    /// One row of N scores per example, in dataset order.
    pub logits:        Vec<Vec<f32>>,
    pub labels:        Vec<usize>,
}

impl EvalOutcome {
    pub fn num_examples(&self) -> usize {
        self.labels.len()
    }

    pub fn num_choices(&self) -> usize {
        self.logits.first().map(Vec::len).unwrap_or(0)
    }
}

/// Index of the first maximum; NaN scores never win.
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] || row[best].is_nan() {
            best = i;
        }
    }
    best
}

// ─── EvalAccumulator ──────────────────────────────────────────────────────────
/// Running totals over the batches of one split.
#[derive(Debug, Clone)]
pub struct EvalAccumulator {
    num_choices: usize,
    loss_sum:    f64,
    batches:     usize,
    correct:     usize,
    logits:      Vec<Vec<f32>>,
    labels:      Vec<usize>,
}

impl EvalAccumulator {
    pub fn new(num_choices: usize) -> Self {
        Self {
            num_choices,
            loss_sum: 0.0,
            batches:  0,
            correct:  0,
            logits:   Vec::new(),
            labels:   Vec::new(),
        }
    }

    /// Add one batch: its mean loss, its logits flattened row-major
    /// `[batch, N]` and the true labels.
    pub fn push(&mut self, batch_loss: f64, flat_logits: &[f32], labels: &[usize]) -> Result<(), McError> {
        if self.num_choices == 0 || flat_logits.len() != labels.len() * self.num_choices {
            return Err(McError::backend(format!(
                "{} logits for {} labels with {} choices",
                flat_logits.len(),
                labels.len(),
                self.num_choices
            )));
        }

        for (row, &label) in flat_logits.chunks(self.num_choices).zip(labels) {
            if argmax(row) == label {
                self.correct += 1;
            }
            self.logits.push(row.to_vec());
            self.labels.push(label);
        }
        self.loss_sum += batch_loss;
        self.batches  += 1;
        Ok(())
    }

    pub fn finish(self, split: &str) -> Result<EvalOutcome, McError> {
        if self.labels.is_empty() {
            return Err(McError::EmptySplit(split.to_string()));
        }
        Ok(EvalOutcome {
            eval_loss:     self.loss_sum / self.batches as f64,
            eval_accuracy: self.correct as f64 / self.labels.len() as f64,
            logits:        self.logits,
            labels:        self.labels,
        })
    }
}

// ─── Loop ─────────────────────────────────────────────────────────────────────
/// Score every group of `dataset`. The model should already be the
/// inference copy (`model.valid()`) so dropout is off.
pub fn evaluate<B: Backend>(
    model:      &BertMultipleChoice<B>,
    dataset:    ChoiceDataset,
    batch_size: usize,
    device:     &B::Device,
    split:      &str,
) -> Result<EvalOutcome> {
    if dataset.is_empty() {
        return Err(McError::EmptySplit(split.to_string()).into());
    }

    tracing::info!("Evaluating '{}': {} examples, batch size {}", split, dataset.len(), batch_size);

    let mut acc = EvalAccumulator::new(dataset.num_choices());
    let loader  = sequential_loader::<B>(dataset, batch_size, device);

    for batch in loader.iter() {
        let logits = model.forward(batch.input_ids, batch.segment_ids, batch.attention_mask);
        let loss: f64 = BertMultipleChoice::loss(logits.clone(), batch.labels)
            .into_scalar()
            .elem::<f64>();

        let flat = logits
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| McError::backend(format!("cannot read logits: {e:?}")))?;

        acc.push(loss, &flat, &batch.label_indices)?;
    }

    let outcome = acc.finish(split)?;
    tracing::info!(
        "{} | eval_loss={:.4} | eval_accuracy={:.4}",
        split, outcome.eval_loss, outcome.eval_accuracy,
    );
    Ok(outcome)
}
