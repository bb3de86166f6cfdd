// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// One subcommand per benchmark; all three share the same run
// flags. Flag names keep their underscore spelling
// (--data_dir, --max_seq_length, ...).
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, Split, ...)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::finetune_use_case::RunConfig;
use crate::data::{features::QuestionPlacement, reader::Task};
use crate::domain::example::Split;

/// The benchmarks a run can fine-tune on
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dialogue-based multiple choice (3 choices)
    Dream(RunArgs),

    /// MCTest story comprehension (4 choices)
    Mctest(RunArgs),

    /// RACE exam passages (4 choices)
    Race(RunArgs),
}

impl Commands {
    pub fn into_parts(self) -> (Task, RunArgs) {
        match self {
            Commands::Dream(args)  => (Task::Dream, args),
            Commands::Mctest(args) => (Task::Mctest, args),
            Commands::Race(args)   => (Task::Race, args),
        }
    }
}

/// All arguments of a fine-tuning run.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory holding the dataset files of the chosen benchmark
    #[arg(long = "data_dir")]
    pub data_dir: PathBuf,

    /// Pretrained encoder directory: config.json, vocab.txt or
    /// tokenizer.json, optionally model.mpk.gz
    #[arg(long = "bert_model")]
    pub bert_model: PathBuf,

    /// Where the checkpoint and reports are written
    #[arg(long = "output_dir")]
    pub output_dir: PathBuf,

    /// Total tokens per choice sequence after WordPiece tokenization.
    /// Longer inputs are truncated, shorter ones padded
    #[arg(long = "max_seq_length", default_value_t = 128)]
    pub max_seq_length: usize,

    /// Questions per optimizer step (split over the accumulation steps)
    #[arg(long = "train_batch_size", default_value_t = 32)]
    pub train_batch_size: usize,

    #[arg(long = "eval_batch_size", default_value_t = 8)]
    pub eval_batch_size: usize,

    /// Peak learning rate for AdamW
    #[arg(long = "learning_rate", default_value_t = 5e-5)]
    pub learning_rate: f64,

    #[arg(long = "num_train_epochs", default_value_t = 3)]
    pub num_train_epochs: usize,

    /// Fraction of training during which the learning rate ramps up
    #[arg(long = "warmup_proportion", default_value_t = 0.1)]
    pub warmup_proportion: f64,

    /// Forward/backward passes summed before one optimizer step
    #[arg(long = "gradient_accumulation_steps", default_value_t = 1)]
    pub gradient_accumulation_steps: usize,

    /// Static loss scale; 0 keeps the loss unscaled
    #[arg(long = "loss_scale", default_value_t = 0.0)]
    pub loss_scale: f64,

    /// Seed for the per-epoch shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long = "do_train")]
    pub do_train: bool,

    #[arg(long = "do_eval")]
    pub do_eval: bool,

    /// Lowercase input when building the tokenizer from vocab.txt
    #[arg(long = "do_lower_case")]
    pub do_lower_case: bool,

    /// Encoder layers (plus embeddings) kept fixed during training.
    /// Defaults to 6 for MCTest and 0 otherwise
    #[arg(long = "freeze_layers")]
    pub freeze_layers: Option<usize>,

    /// Segment the question joins: "context" or "choice"
    #[arg(long = "question_placement", default_value = "context")]
    pub question_placement: QuestionPlacement,

    /// Comma-separated splits to evaluate
    #[arg(long = "eval_splits", value_delimiter = ',', default_value = "dev,test")]
    pub eval_splits: Vec<Split>,

    /// MCTest story set (mc160 or mc500)
    #[arg(long = "mctest_set", default_value = "mc500")]
    pub mctest_set: String,

    /// Training examples between two lines of train_results.txt
    #[arg(long = "log_interval", default_value_t = 512)]
    pub log_interval: usize,

    /// Rank of this process for distributed data partitioning; -1 disables
    #[arg(long = "local_rank", default_value_t = -1, allow_negative_numbers = true)]
    pub local_rank: i64,

    #[arg(long = "world_size", default_value_t = 1)]
    pub world_size: usize,

    /// Run on the CPU (NdArray) instead of the GPU (Wgpu)
    #[arg(long = "no_gpu")]
    pub no_gpu: bool,
}

/// Convert CLI RunArgs into the application-layer RunConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<(Task, RunArgs)> for RunConfig {
    fn from((task, a): (Task, RunArgs)) -> Self {
        RunConfig {
            task,
            data_dir:                    a.data_dir,
            bert_model:                  a.bert_model,
            output_dir:                  a.output_dir,
            max_seq_length:              a.max_seq_length,
            train_batch_size:            a.train_batch_size,
            eval_batch_size:             a.eval_batch_size,
            learning_rate:               a.learning_rate,
            num_train_epochs:            a.num_train_epochs,
            warmup_proportion:           a.warmup_proportion,
            gradient_accumulation_steps: a.gradient_accumulation_steps,
            loss_scale:                  a.loss_scale,
            seed:                        a.seed,
            do_train:                    a.do_train,
            do_eval:                     a.do_eval,
            do_lower_case:               a.do_lower_case,
            freeze_layers:               a.freeze_layers.unwrap_or_else(|| task.default_freeze_layers()),
            question_placement:          a.question_placement,
            eval_splits:                 a.eval_splits,
            mctest_set:                  a.mctest_set,
            log_interval:                a.log_interval,
            local_rank:                  a.local_rank,
            world_size:                  a.world_size,
        }
    }
}
