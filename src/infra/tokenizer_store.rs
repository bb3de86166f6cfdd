// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads the WordPiece tokenizer that belongs to a pretrained
// encoder and saves it next to the fine-tuned checkpoint.
//
// A pretrained directory ships either:
//   tokenizer.json  — loaded as is
//   vocab.txt       — one token per line, id = line number; a
//                     tokenizer JSON is assembled around it
//                     (BertNormalizer, BertPreTokenizer, WordPiece)
//
// Building the JSON by hand and parsing it keeps us on the stable
// serialisation format instead of the builder API, which shifts
// between tokenizers releases.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::{fs, path::Path};
use tokenizers::Tokenizer;

use crate::domain::error::McError;
use crate::domain::traits::TokenEncoder;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const VOCAB_FILE: &str = "vocab.txt";

const SPECIAL_TOKENS: [&str; 5] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"];

pub struct BertTokenizer {
    inner:  Tokenizer,
    cls_id: u32,
    sep_id: u32,
}

impl BertTokenizer {
    /// Prefer `tokenizer.json`, fall back to `vocab.txt`.
    /// `lowercase` only applies to the vocab.txt path; a tokenizer.json
    /// carries its own normalizer settings.
    pub fn from_pretrained_dir(dir: &Path, lowercase: bool) -> Result<Self> {
        let json_path = dir.join(TOKENIZER_FILE);
        if json_path.exists() {
            tracing::info!("Loading tokenizer from '{}'", json_path.display());
            return Self::from_file(&json_path);
        }

        let vocab_path = dir.join(VOCAB_FILE);
        tracing::info!("Building WordPiece tokenizer from '{}' (lowercase={})", vocab_path.display(), lowercase);
        Self::from_vocab_file(&vocab_path, lowercase)
    }

    /// Load a previously saved tokenizer from JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e)
        })?;
        Ok(Self::from_tokenizer(inner)?)
    }

    pub fn from_vocab_file(path: &Path, lowercase: bool) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read vocabulary '{}'", path.display()))?;

        let json  = wordpiece_json(&text, lowercase);
        let inner = json.to_string().parse::<Tokenizer>().map_err(|e| {
            anyhow::anyhow!("Cannot build tokenizer from '{}': {}", path.display(), e)
        })?;
        Ok(Self::from_tokenizer(inner)?)
    }

    fn from_tokenizer(inner: Tokenizer) -> Result<Self, McError> {
        let lookup = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| McError::config(format!("vocabulary has no {token} token")))
        };
        let cls_id = lookup("[CLS]")?;
        let sep_id = lookup("[SEP]")?;
        Ok(Self { inner, cls_id, sep_id })
    }

    /// Write the tokenizer so a checkpoint directory is self-contained.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner
            .save(path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {}", path.display(), e))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(())
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TokenEncoder for BertTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| McError::backend(format!("tokenization failed: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn cls_id(&self) -> u32 {
        self.cls_id
    }

    fn sep_id(&self) -> u32 {
        self.sep_id
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }
}

/// HuggingFace tokenizer JSON for a BERT WordPiece vocabulary.
fn wordpiece_json(vocab_text: &str, lowercase: bool) -> Value {
    let mut vocab = Map::new();
    for (id, line) in vocab_text.lines().enumerate() {
        let token = line.trim_end_matches('\r');
        if !token.is_empty() && !vocab.contains_key(token) {
            vocab.insert(token.to_string(), json!(id));
        }
    }

    let added_tokens: Vec<Value> = SPECIAL_TOKENS
        .iter()
        .filter_map(|&token| {
            vocab.get(token).map(|id| {
                json!({
                    "id": id, "content": token, "single_word": false, "lstrip": false,
                    "rstrip": false, "normalized": false, "special": true
                })
            })
        })
        .collect();

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": lowercase
        },
        "pre_tokenizer": { "type": "BertPreTokenizer" },
        "post_processor": null,
        "decoder": { "type": "WordPiece", "prefix": "##", "cleanup": true },
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": vocab
        }
    })
}
