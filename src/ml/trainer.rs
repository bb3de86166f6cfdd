// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch/batch loop with gradient accumulation and AdamW.
//
// Per batch:
//   1. forward → cross-entropy over the [B, N] choice logits
//   2. loss × loss_factor (static loss scale / accumulation steps)
//   3. backward, gradients added to a GradientsAccumulator
//   4. every G-th batch: lr from the warmup-linear schedule,
//      optimizer step, accumulator drained
//
// The loop only talks to the Learner trait so the step/accumulate
// bookkeeping can be tested without a model.
//
// Key Burn 0.20 insight:
//   - GradientsAccumulator::grads() returns the sum and resets it
//   - optim.step consumes the model and returns the updated one
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::Result;
use burn::{
    data::dataloader::DataLoader,
    optim::{GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::io::Write;

use crate::data::batcher::ChoiceBatch;
use crate::ml::model::BertMultipleChoice;

// ─── Learner ──────────────────────────────────────────────────────────────────
/// The two things the loop asks of a trainable model.
pub trait Learner<B: Backend> {
    /// Forward + backward on one batch; the gradients are added to the
    /// pending sum. Returns the loss after `loss_factor` is applied.
    fn accumulate(&mut self, batch: ChoiceBatch<B>, loss_factor: f64) -> Result<f64>;

    /// Apply the pending gradients with learning rate `lr` and clear them.
    fn step(&mut self, lr: f64);
}

pub struct BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BertMultipleChoice<B>, B>,
{
    model:       BertMultipleChoice<B>,
    optim:       O,
    accumulator: GradientsAccumulator<BertMultipleChoice<B>>,
}

impl<B, O> BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BertMultipleChoice<B>, B>,
{
    pub fn new(model: BertMultipleChoice<B>, optim: O) -> Self {
        Self { model, optim, accumulator: GradientsAccumulator::new() }
    }

    pub fn model(&self) -> &BertMultipleChoice<B> {
        &self.model
    }
}

impl<B, O> Learner<B> for BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BertMultipleChoice<B>, B>,
{
    fn accumulate(&mut self, batch: ChoiceBatch<B>, loss_factor: f64) -> Result<f64> {
        let (loss, _) = self.model.forward_loss(
            batch.input_ids,
            batch.segment_ids,
            batch.attention_mask,
            batch.labels,
        );

        let loss = if loss_factor == 1.0 { loss } else { loss.mul_scalar(loss_factor) };
        let value: f64 = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.accumulator.accumulate(&self.model, grads);
        Ok(value)
    }

    fn step(&mut self, lr: f64) {
        let grads  = self.accumulator.grads();
        self.model = self.optim.step(lr, self.model.clone(), grads);
    }
}

// ─── Learning-rate schedule ───────────────────────────────────────────────────
/// Linear warmup over the first `warmup` fraction of training, then
/// linear decay to zero at `p = 1`.
pub fn warmup_linear(p: f64, warmup: f64) -> f64 {
    if p < warmup {
        p / warmup
    } else {
        ((p - 1.0) / (warmup - 1.0)).max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WarmupLinear {
    pub warmup:  f64,
    pub t_total: usize,
}

impl WarmupLinear {
    /// Multiplier for the base learning rate at `global_step`.
    /// Without a known step budget the rate stays constant.
    pub fn factor(&self, global_step: usize) -> f64 {
        if self.t_total == 0 {
            return 1.0;
        }
        warmup_linear(global_step as f64 / self.t_total as f64, self.warmup)
    }
}

/// Number of optimizer steps a run will take: groups / batch / G × epochs.
pub fn total_steps(num_groups: usize, batch_size: usize, accumulation: usize, epochs: usize) -> usize {
    if batch_size == 0 || accumulation == 0 {
        return 0;
    }
    (num_groups as f64 / batch_size as f64 / accumulation as f64 * epochs as f64).floor() as usize
}

// ─── Settings / Summary ───────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub epochs:             usize,
    /// Groups per forward pass (already divided by the accumulation steps).
    pub batch_size:         usize,
    pub accumulation_steps: usize,
    pub learning_rate:      f64,
    pub warmup_proportion:  f64,
    pub loss_scale:         f64,
    /// Examples between two lines of the loss log; 0 disables the log.
    pub log_interval:       usize,
    pub t_total:            usize,
}

impl TrainSettings {
    /// Factor applied to each batch loss before backward.
    pub fn loss_factor(&self) -> f64 {
        let scale = if self.loss_scale > 0.0 && self.loss_scale != 1.0 { self.loss_scale } else { 1.0 };
        scale / self.accumulation_steps.max(1) as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub global_step: usize,
    /// Mean per-batch loss of the last epoch.
    pub loss:        f64,
    pub examples:    usize,
}

// ─── Loop ─────────────────────────────────────────────────────────────────────
/// Train for `settings.epochs` epochs. Each crossing of a multiple of
/// `log_interval` examples appends `"<examples> <avg>"` to `loss_log`.
pub fn run_training<B: Backend, L: Learner<B>, W: Write>(
    learner:  &mut L,
    loader:   &dyn DataLoader<B, ChoiceBatch<B>>,
    settings: &TrainSettings,
    loss_log: &mut W,
) -> Result<TrainSummary> {
    let schedule    = WarmupLinear { warmup: settings.warmup_proportion, t_total: settings.t_total };
    let accumulate  = settings.accumulation_steps.max(1);
    let loss_factor = settings.loss_factor();

    tracing::info!(
        "Training on {} groups | batch={} | accumulation={} | epochs={} | steps={}",
        loader.num_items(), settings.batch_size, accumulate, settings.epochs, settings.t_total,
    );

    let mut global_step   = 0usize;
    let mut last_loss     = f64::NAN;
    let mut total_examples = 0usize;

    for epoch in 0..settings.epochs {
        let mut tr_loss        = 0.0f64;
        let mut nb_tr_steps    = 0usize;
        let mut nb_tr_examples = 0usize;
        let mut loss_since_log = 0.0f64;

        for (i, batch) in loader.iter().enumerate() {
            // ── Forward + backward ────────────────────────────────────────────
            let size = batch.label_indices.len();
            let loss = learner.accumulate(batch, loss_factor)?;

            tr_loss        += loss;
            loss_since_log += loss;
            nb_tr_steps    += 1;

            let before = nb_tr_examples;
            nb_tr_examples += size;

            // ── Loss log ──────────────────────────────────────────────────────
            if settings.log_interval > 0
                && nb_tr_examples / settings.log_interval > before / settings.log_interval
            {
                let avg = loss_since_log / settings.log_interval as f64;
                writeln!(loss_log, "{} {}", nb_tr_examples, avg)?;
                tracing::info!("epoch {} | examples {} | loss {:.4}", epoch + 1, nb_tr_examples, avg);
                loss_since_log = 0.0;
            }

            // ── Optimizer step ────────────────────────────────────────────────
            if (i + 1) % accumulate == 0 {
                let lr = settings.learning_rate * schedule.factor(global_step);
                learner.step(lr);
                global_step += 1;
            }
        }

        last_loss = if nb_tr_steps > 0 { tr_loss / nb_tr_steps as f64 } else { f64::NAN };
        total_examples += nb_tr_examples;

        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | global_step={}",
            epoch + 1, settings.epochs, last_loss, global_step,
        );
    }

    loss_log.flush()?;
    tracing::info!("Training complete!");

    Ok(TrainSummary { global_step, loss: last_loss, examples: total_examples })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        batcher::ChoiceBatcher,
        dataset::{tests::group, ChoiceDataset, FeatureGroup},
        loader::{sequential_loader, training_loader, ChoiceLoader},
    };
    use crate::ml::model::BertConfig;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend  = burn::backend::NdArray;
    type TestAutodiff = burn::backend::Autodiff<TestBackend>;

    #[derive(Default)]
    struct MockLearner {
        batches:      usize,
        pending:      usize,
        steps:        Vec<(usize, f64)>,
        loss_factors: Vec<f64>,
    }

    impl Learner<TestBackend> for MockLearner {
        fn accumulate(&mut self, batch: ChoiceBatch<TestBackend>, loss_factor: f64) -> Result<f64> {
            self.batches += 1;
            self.pending += 1;
            self.loss_factors.push(loss_factor);
            Ok(batch.label_indices.len() as f64 * loss_factor)
        }

        fn step(&mut self, lr: f64) {
            self.steps.push((self.pending, lr));
            self.pending = 0;
        }
    }

    fn dataset(n: usize) -> ChoiceDataset {
        ChoiceDataset::new((0..n).map(|i| group(&format!("g{i}"), 3, 4, i % 3)).collect()).unwrap()
    }

    fn in_order(n: usize, batch_size: usize) -> ChoiceLoader<TestBackend> {
        sequential_loader::<TestBackend>(dataset(n), batch_size, &Default::default())
    }

    fn settings(batch_size: usize, accumulation_steps: usize) -> TrainSettings {
        TrainSettings {
            epochs: 1,
            batch_size,
            accumulation_steps,
            learning_rate: 1.0,
            warmup_proportion: 0.1,
            loss_scale: 0.0,
            log_interval: 0,
            t_total: 0,
        }
    }

    #[test]
    fn test_accumulation_steps_every_third_batch() {
        // 11 groups in batches of 1 → 11 batches → 3 optimizer steps
        let mut learner = MockLearner::default();
        let summary = run_training(&mut learner, &*in_order(11, 1), &settings(1, 3), &mut Vec::new()).unwrap();

        assert_eq!(learner.batches, 11);
        assert_eq!(summary.global_step, 3);
        assert_eq!(learner.steps.len(), 3);
        // gradients of three batches are pending at every step
        assert!(learner.steps.iter().all(|&(pending, _)| pending == 3));
        // the two trailing batches never reach an optimizer step
        assert_eq!(learner.pending, 2);
    }

    #[test]
    fn test_loss_factor_divides_by_accumulation() {
        let mut learner = MockLearner::default();
        let mut s = settings(2, 2);
        s.loss_scale = 128.0;
        run_training(&mut learner, &*in_order(4, 2), &s, &mut Vec::new()).unwrap();
        assert!(learner.loss_factors.iter().all(|&f| f == 64.0));

        s.loss_scale = 1.0;
        assert_eq!(s.loss_factor(), 0.5);
    }

    #[test]
    fn test_learning_rate_follows_schedule() {
        let mut learner = MockLearner::default();
        let mut s = settings(1, 1);
        s.warmup_proportion = 0.2;
        s.t_total = 10;
        run_training(&mut learner, &*in_order(10, 1), &s, &mut Vec::new()).unwrap();

        let lrs: Vec<f64> = learner.steps.iter().map(|&(_, lr)| lr).collect();
        assert_eq!(lrs.len(), 10);
        assert!((lrs[0] - 0.0).abs() < 1e-12);
        assert!((lrs[1] - 0.5).abs() < 1e-12);
        assert!((lrs[2] - 1.0).abs() < 1e-12);
        assert!((lrs[6] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_loss_log_lines_on_interval_crossings() {
        let mut learner = MockLearner::default();
        let mut s = settings(3, 1);
        s.log_interval = 4;

        let mut log = Vec::new();
        run_training(&mut learner, &*in_order(10, 3), &s, &mut log).unwrap();

        // example counts 3, 6, 9, 10 → crossings at 6 (past 4) and 9 (past 8)
        let text = String::from_utf8(log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("6 "));
        assert!(lines[1].starts_with("9 "));
    }

    #[test]
    fn test_summary_reports_last_epoch_mean() {
        let device = Default::default();
        let loader = training_loader::<TestBackend>(dataset(6), 2, 3, None, &device);
        let mut learner = MockLearner::default();
        let mut s = settings(2, 1);
        s.epochs = 2;
        let summary = run_training(&mut learner, &*loader, &s, &mut Vec::new()).unwrap();

        assert_eq!(summary.global_step, 6);
        assert_eq!(summary.examples, 12);
        // every batch reports its size as loss
        assert!((summary.loss - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_warmup_linear_shape() {
        assert_eq!(warmup_linear(0.05, 0.1), 0.5);
        assert_eq!(warmup_linear(0.1, 0.1), 1.0);
        assert!((warmup_linear(0.55, 0.1) - 0.5).abs() < 1e-12);
        assert_eq!(warmup_linear(1.2, 0.1), 0.0);
        assert_eq!(WarmupLinear { warmup: 0.1, t_total: 0 }.factor(123), 1.0);
    }

    #[test]
    fn test_total_steps() {
        assert_eq!(total_steps(100, 8, 2, 3), 18);
        assert_eq!(total_steps(7, 8, 1, 1), 0);
        assert_eq!(total_steps(10, 0, 1, 1), 0);
    }

    fn tiny_model(device: &<TestAutodiff as Backend>::Device) -> BertMultipleChoice<TestAutodiff> {
        BertConfig::new(2000)
            .with_hidden_size(8)
            .with_num_hidden_layers(1)
            .with_num_attention_heads(2)
            .with_intermediate_size(16)
            .with_max_position_embeddings(8)
            .with_hidden_dropout_prob(0.0)
            .with_attention_probs_dropout_prob(0.0)
            .init_multiple_choice::<TestAutodiff>(device)
    }

    fn batch(groups: Vec<FeatureGroup>) -> ChoiceBatch<TestAutodiff> {
        ChoiceBatcher::<TestAutodiff>::new().batch(groups, &Default::default())
    }

    fn head_weights(model: &BertMultipleChoice<TestAutodiff>) -> Vec<f32> {
        model.classifier.weight.val().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_burn_learner_updates_the_head() {
        use burn::optim::AdamWConfig;

        let device = Default::default();
        let model  = tiny_model(&device);
        let before = head_weights(&model);

        let optim = AdamWConfig::new().with_weight_decay(0.01).init();
        let mut learner = BurnLearner::new(model, optim);

        let loss = learner.accumulate(batch(vec![group("a", 3, 4, 0), group("b", 3, 4, 2)]), 0.5).unwrap();
        assert!(loss.is_finite() && loss > 0.0);
        learner.step(1e-2);

        assert_ne!(before, head_weights(learner.model()));
    }

    #[test]
    fn test_burn_learner_sums_gradients_until_step() {
        use burn::optim::SgdConfig;

        let device  = Default::default();
        let model   = tiny_model(&device);
        let groups  = vec![group("a", 3, 4, 0), group("b", 3, 4, 1), group("c", 3, 4, 2)];
        let lr      = 0.5;

        // three single-group batches, one step
        let mut accumulated = BurnLearner::new(model.clone(), SgdConfig::new().init());
        for g in &groups {
            accumulated.accumulate(batch(vec![g.clone()]), 1.0).unwrap();
        }
        accumulated.step(lr);

        // the same three groups as one batch; its mean loss × 3 has the summed gradient
        let mut combined = BurnLearner::new(model.clone(), SgdConfig::new().init());
        combined.accumulate(batch(groups.clone()), 3.0).unwrap();
        combined.step(lr);

        // only the last batch
        let mut last_only = BurnLearner::new(model, SgdConfig::new().init());
        last_only.accumulate(batch(vec![groups[2].clone()]), 1.0).unwrap();
        last_only.step(lr);

        let a = head_weights(accumulated.model());
        let b = head_weights(combined.model());
        let c = head_weights(last_only.model());

        assert!(a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-5), "{a:?} vs {b:?}");
        assert!(a.iter().zip(&c).any(|(x, y)| (x - y).abs() > 1e-4), "{a:?} vs {c:?}");
    }
}
