// ============================================================
// Layer 2 — FineTuneUseCase
// ============================================================
// Orchestrates one fine-tuning run in order:
//
//   Step 1: Validate the run configuration   (before any work)
//   Step 2: Load encoder config + tokenizer  (Layer 6 - infra)
//   Step 3: Read and featurize train split   (Layer 4 - data)
//   Step 4: Run the training loop            (Layer 5 - ml)
//   Step 5: Save the checkpoint              (Layer 6 - infra)
//   Step 6: Reload it for inference          (Layer 6 - infra)
//   Step 7: Evaluate and report every split  (Layers 4, 5, 6)
//
// The use case is generic over the autodiff backend; the CLI picks
// Wgpu or NdArray. Evaluation runs on the inner backend so no
// autodiff graph is recorded and dropout is off.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::Result;
use burn::{
    data::dataset::Dataset,
    module::Module,
    optim::AdamWConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::data::{
    dataset::ChoiceDataset,
    features::{FeatureBuilder, QuestionPlacement},
    loader::{training_loader, Shard},
    reader::{DatasetReader, Task},
};
use crate::domain::error::McError;
use crate::domain::example::Split;
use crate::domain::traits::ExampleSource;
use crate::infra::{
    checkpoint::{load_pretrained_encoder, CheckpointManager, PRETRAINED_CONFIG_FILE},
    report::ReportWriter,
    tokenizer_store::BertTokenizer,
};
use crate::ml::{
    evaluator::evaluate,
    model::{BertConfig, BertMultipleChoice},
    trainer::{run_training, total_steps, BurnLearner, TrainSettings, TrainSummary},
};

// ─── Run Configuration ───────────────────────────────────────────────────────
// All settings of one run. Serialisable so it can be saved next to
// the checkpoint as a record of how the model was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub task:                        Task,
    pub data_dir:                    PathBuf,
    pub bert_model:                  PathBuf,
    pub output_dir:                  PathBuf,
    pub max_seq_length:              usize,
    pub train_batch_size:            usize,
    pub eval_batch_size:             usize,
    pub learning_rate:               f64,
    pub num_train_epochs:            usize,
    pub warmup_proportion:           f64,
    pub gradient_accumulation_steps: usize,
    pub loss_scale:                  f64,
    pub seed:                        u64,
    pub do_train:                    bool,
    pub do_eval:                     bool,
    pub do_lower_case:               bool,
    pub freeze_layers:               usize,
    pub question_placement:          QuestionPlacement,
    pub eval_splits:                 Vec<Split>,
    pub mctest_set:                  String,
    pub log_interval:                usize,
    pub local_rank:                  i64,
    pub world_size:                  usize,
}

impl RunConfig {
    /// Reject flag combinations that cannot produce a run.
    pub fn validate(&self) -> Result<(), McError> {
        if self.gradient_accumulation_steps < 1 {
            return Err(McError::config(format!(
                "invalid gradient_accumulation_steps {}, should be >= 1",
                self.gradient_accumulation_steps
            )));
        }
        if !self.do_train && !self.do_eval {
            return Err(McError::config("at least one of do_train or do_eval must be set"));
        }
        if self.do_train && self.per_step_batch_size() == 0 {
            return Err(McError::config(format!(
                "train_batch_size {} is smaller than gradient_accumulation_steps {}",
                self.train_batch_size, self.gradient_accumulation_steps
            )));
        }
        if self.do_eval && self.eval_batch_size == 0 {
            return Err(McError::config("eval_batch_size must be at least 1"));
        }
        if self.do_eval && self.eval_splits.is_empty() {
            return Err(McError::config("do_eval needs at least one split in eval_splits"));
        }
        if self.do_train && dir_has_entries(&self.output_dir) {
            return Err(McError::config(format!(
                "output directory '{}' already exists and is not empty",
                self.output_dir.display()
            )));
        }
        if self.local_rank >= 0 && self.local_rank as usize >= self.world_size {
            return Err(McError::config(format!(
                "local_rank {} is outside world_size {}",
                self.local_rank, self.world_size
            )));
        }
        Ok(())
    }

    /// Sequence length must fit the encoder's position table.
    pub fn check_encoder(&self, config: &BertConfig) -> Result<(), McError> {
        if self.max_seq_length > config.max_position_embeddings {
            return Err(McError::config(format!(
                "cannot use sequence length {} because the encoder was trained up to {}",
                self.max_seq_length, config.max_position_embeddings
            )));
        }
        Ok(())
    }

    /// Groups per forward pass once the batch is spread over G passes.
    pub fn per_step_batch_size(&self) -> usize {
        self.train_batch_size / self.gradient_accumulation_steps.max(1)
    }

    pub fn is_distributed(&self) -> bool {
        self.local_rank >= 0
    }

    /// This process's share of the training data in distributed mode.
    pub fn shard(&self) -> Option<Shard> {
        self.is_distributed().then(|| Shard {
            rank:       self.local_rank as usize,
            world_size: self.world_size,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(output_dir: &Path) -> Self {
        Self {
            task:                        Task::Dream,
            data_dir:                    PathBuf::from("data"),
            bert_model:                  PathBuf::from("bert"),
            output_dir:                  output_dir.to_path_buf(),
            max_seq_length:              128,
            train_batch_size:            32,
            eval_batch_size:             8,
            learning_rate:               5e-5,
            num_train_epochs:            3,
            warmup_proportion:           0.1,
            gradient_accumulation_steps: 1,
            loss_scale:                  0.0,
            seed:                        42,
            do_train:                    true,
            do_eval:                     true,
            do_lower_case:               true,
            freeze_layers:               0,
            question_placement:          QuestionPlacement::Context,
            eval_splits:                 vec![Split::Dev, Split::Test],
            mctest_set:                  "mc500".to_string(),
            log_interval:                512,
            local_rank:                  -1,
            world_size:                  1,
        }
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}

// ─── FineTuneUseCase ──────────────────────────────────────────────────────────
pub struct FineTuneUseCase {
    config: RunConfig,
}

impl FineTuneUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Execute the run end to end on `device`.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate before touching any data ─────────────────────────
        cfg.validate()?;
        tracing::info!(
            "task={} | device={:?} | distributed={} | train={} | eval={}",
            cfg.task, device, cfg.is_distributed(), cfg.do_train, cfg.do_eval,
        );

        let reader  = DatasetReader::new(cfg.task, &cfg.data_dir, &cfg.mctest_set);
        let reports = ReportWriter::new(&cfg.output_dir)?;
        let ckpt    = CheckpointManager::new(&cfg.output_dir);

        // ── Steps 2–5: Train and checkpoint ───────────────────────────────────
        let summary = if cfg.do_train {
            Some(self.train::<B>(&reader, &reports, &ckpt, &device)?)
        } else {
            None
        };

        // ── Steps 6–7: Reload and evaluate ────────────────────────────────────
        if cfg.do_eval {
            if !ckpt.exists() {
                return Err(McError::config(format!(
                    "no checkpoint in '{}' to evaluate; train first with --do_train",
                    cfg.output_dir.display()
                ))
                .into());
            }
            let tokenizer     = ckpt.load_tokenizer()?;
            let (model, bert) = ckpt.load::<B::InnerBackend>(&device)?;
            cfg.check_encoder(&bert)?;
            let builder = FeatureBuilder::new(&tokenizer, cfg.max_seq_length, cfg.question_placement)?;

            for &split in &cfg.eval_splits {
                let examples = reader.read(split)?;
                let dataset  = ChoiceDataset::new(builder.build_all(&examples)?)?;
                let outcome  = evaluate(&model, dataset, cfg.eval_batch_size, &device, split.as_str())?;
                reports.write_split(split.as_str(), &outcome, summary.as_ref())?;
            }
        }

        Ok(())
    }

    fn train<B: AutodiffBackend>(
        &self,
        reader:  &DatasetReader,
        reports: &ReportWriter,
        ckpt:    &CheckpointManager,
        device:  &B::Device,
    ) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 2: Encoder config and its tokenizer ──────────────────────────
        let bert_config = BertConfig::from_pretrained_file(&cfg.bert_model.join(PRETRAINED_CONFIG_FILE))?;
        cfg.check_encoder(&bert_config)?;
        let tokenizer = BertTokenizer::from_pretrained_dir(&cfg.bert_model, cfg.do_lower_case)?;
        if tokenizer.vocab_size() > bert_config.vocab_size {
            tracing::warn!(
                "Tokenizer has {} entries but the encoder only embeds {}",
                tokenizer.vocab_size(),
                bert_config.vocab_size
            );
        }

        // ── Step 3: Featurize the training split ──────────────────────────────
        let examples = reader.read(Split::Train)?;
        let builder  = FeatureBuilder::new(&tokenizer, cfg.max_seq_length, cfg.question_placement)?;
        let dataset  = ChoiceDataset::new(builder.build_all(&examples)?)?;
        if dataset.is_empty() {
            return Err(McError::EmptySplit(Split::Train.to_string()).into());
        }

        let num_groups = dataset.len();
        let batch_size = cfg.per_step_batch_size();
        let mut t_total = total_steps(
            num_groups,
            batch_size,
            cfg.gradient_accumulation_steps,
            cfg.num_train_epochs,
        );
        if cfg.is_distributed() {
            t_total /= cfg.world_size.max(1);
        }
        tracing::info!(
            "***** Running training ***** examples={} batch={} steps={}",
            num_groups, cfg.train_batch_size, t_total,
        );

        // ── Step 4: Model, optimiser and loop ─────────────────────────────────
        let encoder = load_pretrained_encoder::<B>(&cfg.bert_model, &bert_config, device)?;
        let model   = BertMultipleChoice::new(&bert_config, encoder, device).freeze_lower(cfg.freeze_layers);
        tracing::info!("Model ready: {} parameters", model.num_params());

        let optim = AdamWConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(1e-6)
            .with_weight_decay(0.01)
            .init();
        let mut learner = BurnLearner::new(model, optim);
        let loader      = training_loader::<B>(dataset, batch_size, cfg.seed, cfg.shard(), device);

        let settings = TrainSettings {
            epochs:             cfg.num_train_epochs,
            batch_size,
            accumulation_steps: cfg.gradient_accumulation_steps,
            learning_rate:      cfg.learning_rate,
            warmup_proportion:  cfg.warmup_proportion,
            loss_scale:         cfg.loss_scale,
            log_interval:       cfg.log_interval,
            t_total,
        };
        let mut loss_log = reports.train_log()?;
        let summary = run_training(&mut learner, &*loader, &settings, &mut loss_log)?;

        // ── Step 5: Persist ───────────────────────────────────────────────────
        ckpt.save(learner.model(), &bert_config, &tokenizer, cfg)?;
        Ok(summary)
    }
}
