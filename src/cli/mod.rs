// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported, one per benchmark:
//   mcqa dream  --data_dir .. --bert_model .. --output_dir .. [flags]
//   mcqa mctest ...
//   mcqa race   ...
//
// The CLI also picks the Burn backend: Wgpu by default, NdArray
// on the CPU with --no_gpu. Both run under Autodiff for training.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use clap::Parser;
use commands::{Commands, RunArgs};

use crate::application::finetune_use_case::FineTuneUseCase;
use crate::data::reader::Task;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "mcqa",
    version = "0.1.0",
    about = "Fine-tune a BERT encoder for multiple-choice reading comprehension."
)]
pub struct Cli {
    /// The benchmark to run on (dream, mctest or race)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to the fine-tuning use case.
    pub fn run(self) -> Result<()> {
        let (task, args) = self.command.into_parts();
        run_task(task, args)
    }
}

fn run_task(task: Task, args: RunArgs) -> Result<()> {
    let no_gpu   = args.no_gpu;
    let use_case = FineTuneUseCase::new((task, args).into());

    if no_gpu {
        let device = NdArrayDevice::default();
        tracing::info!("Using NdArray device: {:?}", device);
        use_case.execute::<Autodiff<NdArray>>(device)?;
    } else {
        let device = WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        use_case.execute::<Autodiff<Wgpu>>(device)?;
    }

    println!("Run complete.");
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::finetune_use_case::RunConfig;
    use crate::data::features::QuestionPlacement;
    use crate::domain::example::Split;

    fn parse(args: &[&str]) -> (Task, RunConfig) {
        let cli = Cli::try_parse_from(args).unwrap();
        let (task, run_args) = cli.command.into_parts();
        (task, (task, run_args).into())
    }

    #[test]
    fn test_defaults() {
        let (task, cfg) = parse(&[
            "mcqa", "dream", "--data_dir", "d", "--bert_model", "b", "--output_dir", "o", "--do_train",
        ]);
        assert_eq!(task, Task::Dream);
        assert_eq!(cfg.max_seq_length, 128);
        assert_eq!(cfg.train_batch_size, 32);
        assert_eq!(cfg.eval_batch_size, 8);
        assert_eq!(cfg.learning_rate, 5e-5);
        assert_eq!(cfg.gradient_accumulation_steps, 1);
        assert_eq!(cfg.local_rank, -1);
        assert_eq!(cfg.freeze_layers, 0);
        assert_eq!(cfg.eval_splits, vec![Split::Dev, Split::Test]);
        assert_eq!(cfg.question_placement, QuestionPlacement::Context);
        assert!(cfg.do_train && !cfg.do_eval);
    }

    #[test]
    fn test_mctest_freezes_six_layers_unless_told_otherwise() {
        let base = ["mcqa", "mctest", "--data_dir", "d", "--bert_model", "b", "--output_dir", "o"];
        assert_eq!(parse(&base).1.freeze_layers, 6);

        let mut args = base.to_vec();
        args.extend(["--freeze_layers", "0"]);
        assert_eq!(parse(&args).1.freeze_layers, 0);
    }

    #[test]
    fn test_list_and_enum_flags() {
        let (_, cfg) = parse(&[
            "mcqa", "race", "--data_dir", "d", "--bert_model", "b", "--output_dir", "o",
            "--eval_splits", "dev", "--question_placement", "choice",
            "--local_rank", "0", "--world_size", "2",
        ]);
        assert_eq!(cfg.eval_splits, vec![Split::Dev]);
        assert_eq!(cfg.question_placement, QuestionPlacement::Choice);
        assert_eq!(cfg.local_rank, 0);
        assert_eq!(cfg.world_size, 2);
    }

    #[test]
    fn test_required_paths() {
        assert!(Cli::try_parse_from(["mcqa", "dream", "--data_dir", "d"]).is_err());
    }
}
