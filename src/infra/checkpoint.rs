// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the fine-tuned model using Burn's named
// MessagePack + gzip recorder at full precision.
//
// What gets saved at the end of training:
//   1. model.mpk.gz      — all learned parameters (encoder + head)
//   2. bert_config.json  — encoder architecture
//   3. tokenizer.json    — the exact vocabulary used for features
//   4. run_config.json   — the flags of the run
//
// Why save the config separately?
//   Loading needs the exact architecture (hidden size, layer
//   count, ...) to rebuild the model before the weights can be
//   loaded into it. The recorder fails on any shape mismatch.
//
// The same recorder reads a pretrained encoder's `model.mpk.gz`
// from the --bert_model directory.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use std::{fs, path::{Path, PathBuf}};

use crate::application::finetune_use_case::RunConfig;
use crate::infra::tokenizer_store::{BertTokenizer, TOKENIZER_FILE};
use crate::ml::model::{BertConfig, BertModel, BertMultipleChoice};

/// File stem of the weights; the recorder appends `.mpk.gz`.
pub const WEIGHTS_STEM: &str = "model";
pub const BERT_CONFIG_FILE: &str = "bert_config.json";
pub const RUN_CONFIG_FILE: &str = "run_config.json";
pub const PRETRAINED_CONFIG_FILE: &str = "config.json";

type ModelRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

fn weights_file(dir: &Path) -> PathBuf {
    dir.join(format!("{WEIGHTS_STEM}.mpk.gz"))
}

/// Manages saving and loading of the fine-tuned checkpoint.
/// All files are stored in the run's output directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// True once a run has written its weights here.
    pub fn exists(&self) -> bool {
        weights_file(&self.dir).exists() && self.dir.join(BERT_CONFIG_FILE).exists()
    }

    /// Persist weights, encoder config, tokenizer and run config.
    pub fn save<B: Backend>(
        &self,
        model:      &BertMultipleChoice<B>,
        config:     &BertConfig,
        tokenizer:  &BertTokenizer,
        run_config: &RunConfig,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let path = self.dir.join(WEIGHTS_STEM);
        ModelRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let config_path = self.dir.join(BERT_CONFIG_FILE);
        config
            .save(&config_path)
            .with_context(|| format!("Cannot write config to '{}'", config_path.display()))?;

        tokenizer.save(&self.dir.join(TOKENIZER_FILE))?;

        let run_path = self.dir.join(RUN_CONFIG_FILE);
        fs::write(&run_path, serde_json::to_string_pretty(run_config)?)
            .with_context(|| format!("Cannot write run config to '{}'", run_path.display()))?;

        tracing::info!("Checkpoint saved to '{}'", self.dir.display());
        Ok(())
    }

    /// Rebuild the fine-tuned model on `device` from this directory.
    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<(BertMultipleChoice<B>, BertConfig)> {
        let config = self.load_config()?;
        let model  = config.init_multiple_choice::<B>(device);

        let path   = self.dir.join(WEIGHTS_STEM);
        let record = ModelRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;

        tracing::info!("Loaded fine-tuned model from '{}'", self.dir.display());
        Ok((model.load_record(record), config))
    }

    pub fn load_config(&self) -> Result<BertConfig> {
        let path = self.dir.join(BERT_CONFIG_FILE);
        BertConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read config from '{}': {:?}", path.display(), e))
    }

    pub fn load_tokenizer(&self) -> Result<BertTokenizer> {
        BertTokenizer::from_file(&self.dir.join(TOKENIZER_FILE))
    }
}

/// Encoder for fine-tuning: pretrained weights when the directory has
/// them, random initialisation otherwise.
pub fn load_pretrained_encoder<B: Backend>(
    dir:    &Path,
    config: &BertConfig,
    device: &B::Device,
) -> Result<BertModel<B>> {
    let encoder = config.init::<B>(device);
    if !weights_file(dir).exists() {
        tracing::warn!(
            "No pretrained weights at '{}', encoder starts from random initialisation",
            weights_file(dir).display()
        );
        return Ok(encoder);
    }

    let path   = dir.join(WEIGHTS_STEM);
    let record = ModelRecorder::new()
        .load(path.clone(), device)
        .with_context(|| format!("Cannot load pretrained encoder '{}'", path.display()))?;
    tracing::info!("Loaded pretrained encoder from '{}'", dir.display());
    Ok(encoder.load_record(record))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn tiny_config() -> BertConfig {
        BertConfig::new(12)
            .with_hidden_size(8)
            .with_num_hidden_layers(1)
            .with_num_attention_heads(2)
            .with_intermediate_size(16)
            .with_max_position_embeddings(16)
    }

    fn tokenizer(dir: &Path) -> BertTokenizer {
        fs::write(dir.join("vocab.txt"), "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nthe\n").unwrap();
        BertTokenizer::from_pretrained_dir(dir, true).unwrap()
    }

    fn weights(model: &BertMultipleChoice<TestBackend>) -> Vec<f32> {
        model.classifier.weight.val().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_save_then_load_restores_weights() {
        let vocab_dir = tempfile::tempdir().unwrap();
        let out       = tempfile::tempdir().unwrap();
        let device    = Default::default();

        let config = tiny_config();
        let model  = config.init_multiple_choice::<TestBackend>(&device);
        let ckpt   = CheckpointManager::new(out.path());
        assert!(!ckpt.exists());

        ckpt.save(&model, &config, &tokenizer(vocab_dir.path()), &RunConfig::for_tests(out.path()))
            .unwrap();
        assert!(ckpt.exists());
        for name in ["model.mpk.gz", BERT_CONFIG_FILE, TOKENIZER_FILE, RUN_CONFIG_FILE] {
            assert!(out.path().join(name).exists(), "missing {name}");
        }

        let (loaded, loaded_config) = ckpt.load::<TestBackend>(&device).unwrap();
        assert_eq!(loaded_config.hidden_size, 8);
        assert_eq!(weights(&loaded), weights(&model));
        assert!(ckpt.load_tokenizer().is_ok());
    }

    #[test]
    fn test_missing_pretrained_weights_fall_back_to_random() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let encoder = load_pretrained_encoder::<TestBackend>(dir.path(), &tiny_config(), &device).unwrap();
        assert_eq!(encoder.layers.len(), 1);
    }

    #[test]
    fn test_pretrained_encoder_weights_are_loaded() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_config();

        let encoder = config.init::<TestBackend>(&device);
        ModelRecorder::new()
            .record(encoder.clone().into_record(), dir.path().join(WEIGHTS_STEM))
            .unwrap();

        let loaded = load_pretrained_encoder::<TestBackend>(dir.path(), &config, &device).unwrap();
        let a: Vec<f32> = encoder.pooler.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.pooler.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
