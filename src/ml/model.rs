// ============================================================
// Layer 5 — BERT Encoder + Multiple-Choice Head
// ============================================================
// Architecture (post-norm, as in Devlin et al. 2019):
//
//   input_ids, segment_ids  [B*N, L]
//       │
//       ▼
//   word + position + token_type embeddings → LayerNorm → Dropout
//       │
//       ▼
//   num_hidden_layers × EncoderLayer
//       x = LN(x + Drop(MHA(x, pad_mask)))
//       x = LN(x + Drop(W2·gelu(W1·x)))
//       │
//       ▼
//   pooler: tanh(W·h[CLS])                       [B*N, H]
//       │
//       ▼
//   classifier: Linear(H, 1) → reshape           [B, N]
//
// Each choice of a question is encoded independently; the N scalars
// of a group are then compared by a softmax over choices.
//
// Reference: Burn Book §3 (Building Blocks)
//            Vaswani et al. (2017) Attention Is All You Need

use anyhow::{Context, Result};
use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::domain::error::McError;

// ─── BertConfig ───────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct BertConfig {
    pub vocab_size: usize,
    #[config(default = 768)]
    pub hidden_size: usize,
    #[config(default = 12)]
    pub num_hidden_layers: usize,
    #[config(default = 12)]
    pub num_attention_heads: usize,
    #[config(default = 3072)]
    pub intermediate_size: usize,
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,
    #[config(default = 0.1)]
    pub attention_probs_dropout_prob: f64,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
    #[config(default = 0.02)]
    pub initializer_range: f64,
}

/// Field layout of a pretrained `config.json`. Unknown keys such as
/// `hidden_act` or `architectures` are ignored.
#[derive(Debug, Deserialize)]
struct PretrainedConfigFile {
    vocab_size: usize,
    #[serde(default = "defaults::hidden_size")]
    hidden_size: usize,
    #[serde(default = "defaults::num_hidden_layers")]
    num_hidden_layers: usize,
    #[serde(default = "defaults::num_attention_heads")]
    num_attention_heads: usize,
    #[serde(default = "defaults::intermediate_size")]
    intermediate_size: usize,
    #[serde(default = "defaults::dropout")]
    hidden_dropout_prob: f64,
    #[serde(default = "defaults::dropout")]
    attention_probs_dropout_prob: f64,
    #[serde(default = "defaults::max_position_embeddings")]
    max_position_embeddings: usize,
    #[serde(default = "defaults::type_vocab_size")]
    type_vocab_size: usize,
    #[serde(default = "defaults::layer_norm_eps")]
    layer_norm_eps: f64,
    #[serde(default = "defaults::initializer_range")]
    initializer_range: f64,
}

mod defaults {
    pub fn hidden_size() -> usize { 768 }
    pub fn num_hidden_layers() -> usize { 12 }
    pub fn num_attention_heads() -> usize { 12 }
    pub fn intermediate_size() -> usize { 3072 }
    pub fn dropout() -> f64 { 0.1 }
    pub fn max_position_embeddings() -> usize { 512 }
    pub fn type_vocab_size() -> usize { 2 }
    pub fn layer_norm_eps() -> f64 { 1e-12 }
    pub fn initializer_range() -> f64 { 0.02 }
}

impl BertConfig {
    /// Read the `config.json` shipped with a pretrained encoder.
    pub fn from_pretrained_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Cannot read encoder config '{}'", path.display()))?;
        let file: PretrainedConfigFile = serde_json::from_str(&raw).map_err(|e| {
            McError::MalformedInput { path: path.display().to_string(), reason: e.to_string() }
        })?;

        let config = BertConfig::new(file.vocab_size)
            .with_hidden_size(file.hidden_size)
            .with_num_hidden_layers(file.num_hidden_layers)
            .with_num_attention_heads(file.num_attention_heads)
            .with_intermediate_size(file.intermediate_size)
            .with_hidden_dropout_prob(file.hidden_dropout_prob)
            .with_attention_probs_dropout_prob(file.attention_probs_dropout_prob)
            .with_max_position_embeddings(file.max_position_embeddings)
            .with_type_vocab_size(file.type_vocab_size)
            .with_layer_norm_eps(file.layer_norm_eps)
            .with_initializer_range(file.initializer_range);
        config.check()?;
        Ok(config)
    }

    /// Shape sanity that the attention layer would otherwise panic on.
    pub fn check(&self) -> Result<(), McError> {
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(McError::config(format!(
                "hidden_size {} is not a multiple of num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        Ok(())
    }

    fn normal(&self) -> Initializer {
        Initializer::Normal { mean: 0.0, std: self.initializer_range }
    }

    fn linear<B: Backend>(&self, d_in: usize, d_out: usize, device: &B::Device) -> Linear<B> {
        LinearConfig::new(d_in, d_out).with_initializer(self.normal()).init(device)
    }

    fn layer_norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.hidden_size).with_epsilon(self.layer_norm_eps).init(device)
    }

    /// The bare encoder (embeddings, layers, pooler).
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertModel<B> {
        let embedding = |n: usize| {
            EmbeddingConfig::new(n, self.hidden_size).with_initializer(self.normal()).init(device)
        };
        let embeddings = BertEmbeddings {
            word_embeddings:       embedding(self.vocab_size),
            position_embeddings:   embedding(self.max_position_embeddings),
            token_type_embeddings: embedding(self.type_vocab_size),
            layer_norm:            self.layer_norm(device),
            dropout:               DropoutConfig::new(self.hidden_dropout_prob).init(),
        };
        let layers = (0..self.num_hidden_layers)
            .map(|_| self.build_encoder_layer(device))
            .collect();
        let pooler = self.linear(self.hidden_size, self.hidden_size, device);

        BertModel { embeddings, layers, pooler }
    }

    /// Encoder plus a freshly initialised one-logit scoring head.
    pub fn init_multiple_choice<B: Backend>(&self, device: &B::Device) -> BertMultipleChoice<B> {
        BertMultipleChoice::new(self, self.init(device), device)
    }

    fn build_encoder_layer<B: Backend>(&self, device: &B::Device) -> EncoderLayer<B> {
        let self_attn = MultiHeadAttentionConfig::new(self.hidden_size, self.num_attention_heads)
            .with_dropout(self.attention_probs_dropout_prob)
            .with_initializer(self.normal())
            .init(device);
        EncoderLayer {
            self_attn,
            ffn_linear1: self.linear(self.hidden_size, self.intermediate_size, device),
            ffn_linear2: self.linear(self.intermediate_size, self.hidden_size, device),
            norm1:       self.layer_norm(device),
            norm2:       self.layer_norm(device),
            dropout:     DropoutConfig::new(self.hidden_dropout_prob).init(),
        }
    }
}

// ─── Embeddings ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertEmbeddings<B: Backend> {
    pub word_embeddings:       Embedding<B>,
    pub position_embeddings:   Embedding<B>,
    pub token_type_embeddings: Embedding<B>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
}

impl<B: Backend> BertEmbeddings<B> {
    /// input_ids, segment_ids: [batch, seq_len] → [batch, seq_len, hidden]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, segment_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);

        let x = self.word_embeddings.forward(input_ids)
            + self.position_embeddings.forward(positions)
            + self.token_type_embeddings.forward(segment_ids);
        self.dropout.forward(self.layer_norm.forward(x))
    }
}

// ─── Encoder layer ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderLayer<B> {
    /// `pad_mask` is true at padding positions, which no token attends to.
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input       = MhaInput::self_attn(x.clone()).mask_pad(pad_mask);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

// ─── BertModel ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertModel<B: Backend> {
    pub embeddings: BertEmbeddings<B>,
    pub layers:     Vec<EncoderLayer<B>>,
    pub pooler:     Linear<B>,
}

impl<B: Backend> BertModel<B> {
    /// All inputs [batch, seq_len] → pooled [CLS] representation [batch, hidden]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        segment_ids:    Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let pad_mask = attention_mask.equal_elem(0);

        let mut x = self.embeddings.forward(input_ids, segment_ids);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }

        let [batch_size, _, hidden] = x.dims();
        let cls = x.slice([0..batch_size, 0..1, 0..hidden]).reshape([batch_size, hidden]);
        activation::tanh(self.pooler.forward(cls))
    }
}

// ─── BertMultipleChoice ───────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertMultipleChoice<B: Backend> {
    pub bert:       BertModel<B>,
    pub dropout:    Dropout,
    pub classifier: Linear<B>,
}

impl<B: Backend> BertMultipleChoice<B> {
    pub fn new(config: &BertConfig, bert: BertModel<B>, device: &B::Device) -> Self {
        Self {
            bert,
            dropout:    DropoutConfig::new(config.hidden_dropout_prob).init(),
            classifier: config.linear(config.hidden_size, 1, device),
        }
    }

    /// All inputs [batch, num_choices, seq_len] → logits [batch, num_choices]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 3, Int>,
        segment_ids:    Tensor<B, 3, Int>,
        attention_mask: Tensor<B, 3, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, num_choices, seq_len] = input_ids.dims();
        let flat = [batch_size * num_choices, seq_len];

        let pooled = self.bert.forward(
            input_ids.reshape(flat),
            segment_ids.reshape(flat),
            attention_mask.reshape(flat),
        );
        self.classifier
            .forward(self.dropout.forward(pooled))
            .reshape([batch_size, num_choices])
    }

    /// Mean negative log-likelihood of the correct choice.
    pub fn loss(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, labels)
    }

    /// Forward pass and loss in one call, as used by the training loop.
    pub fn forward_loss(
        &self,
        input_ids:      Tensor<B, 3, Int>,
        segment_ids:    Tensor<B, 3, Int>,
        attention_mask: Tensor<B, 3, Int>,
        labels:         Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(input_ids, segment_ids, attention_mask);
        (Self::loss(logits.clone(), labels), logits)
    }

    /// Exclude the embeddings and the lowest `num_layers` encoder layers
    /// from gradient computation.
    pub fn freeze_lower(mut self, num_layers: usize) -> Self {
        if num_layers == 0 {
            return self;
        }
        let total = self.bert.layers.len();
        if num_layers > total {
            tracing::warn!("Asked to freeze {} layers but the encoder has {}", num_layers, total);
        }

        self.bert.embeddings = self.bert.embeddings.no_grad();
        self.bert.layers = self
            .bert
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| if i < num_layers { layer.no_grad() } else { layer })
            .collect();

        tracing::info!("Froze embeddings and {} encoder layers", num_layers.min(total));
        self
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::optim::GradientsParams;

    type TestBackend = burn::backend::NdArray;
    type TestAutodiff = burn::backend::Autodiff<TestBackend>;

    fn tiny_config() -> BertConfig {
        BertConfig::new(50)
            .with_hidden_size(16)
            .with_num_hidden_layers(2)
            .with_num_attention_heads(2)
            .with_intermediate_size(32)
            .with_max_position_embeddings(32)
    }

    fn inputs<B: Backend>(
        ids: Vec<i32>,
        mask: Vec<i32>,
        shape: [usize; 3],
        device: &B::Device,
    ) -> (Tensor<B, 3, Int>, Tensor<B, 3, Int>, Tensor<B, 3, Int>) {
        let segments = vec![0; ids.len()];
        (
            Tensor::from_data(TensorData::new(ids, shape), device),
            Tensor::from_data(TensorData::new(segments, shape), device),
            Tensor::from_data(TensorData::new(mask, shape), device),
        )
    }

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model  = tiny_config().init_multiple_choice::<TestBackend>(&device);

        let shape = [2, 3, 8];
        let ids   = (0..48).map(|i| (i % 50) as i32).collect();
        let mask  = vec![1; 48];
        let (ids, segs, mask) = inputs::<TestBackend>(ids, mask, shape, &device);

        let logits = model.forward(ids, segs, mask);
        assert_eq!(logits.dims(), [2, 3]);
    }

    #[test]
    fn test_padding_does_not_change_scores() {
        let device = Default::default();
        let model  = tiny_config().init_multiple_choice::<TestBackend>(&device);

        let mask = vec![1, 1, 1, 1, 0, 0];
        let (a_ids, a_segs, a_mask) =
            inputs::<TestBackend>(vec![1, 5, 6, 2, 0, 0], mask.clone(), [1, 1, 6], &device);
        let (b_ids, b_segs, b_mask) =
            inputs::<TestBackend>(vec![1, 5, 6, 2, 33, 44], mask, [1, 1, 6], &device);

        let a: Vec<f32> = model.forward(a_ids, a_segs, a_mask).into_data().to_vec().unwrap();
        let b: Vec<f32> = model.forward(b_ids, b_segs, b_mask).into_data().to_vec().unwrap();
        assert!((a[0] - b[0]).abs() < 1e-4, "{a:?} vs {b:?}");
    }

    #[test]
    fn test_frozen_parameters_receive_no_gradient() {
        let device = Default::default();
        let model  = tiny_config()
            .init_multiple_choice::<TestAutodiff>(&device)
            .freeze_lower(1);

        let (ids, segs, mask) =
            inputs::<TestAutodiff>((0..16).collect(), vec![1; 16], [2, 2, 4], &device);
        let labels = Tensor::<TestAutodiff, 1, Int>::from_data(TensorData::new(vec![0, 1], [2]), &device);

        let (loss, _) = model.forward_loss(ids, segs, mask, labels);
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        let word = model.bert.embeddings.word_embeddings.weight.id;
        let low  = model.bert.layers[0].ffn_linear1.weight.id;
        let high = model.bert.layers[1].ffn_linear1.weight.id;
        let head = model.classifier.weight.id;

        assert!(grads.get::<TestBackend, 2>(word).is_none());
        assert!(grads.get::<TestBackend, 2>(low).is_none());
        assert!(grads.get::<TestBackend, 2>(high).is_some());
        assert!(grads.get::<TestBackend, 2>(head).is_some());
    }

    #[test]
    fn test_pretrained_config_ignores_unknown_keys() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"vocab_size": 30522, "hidden_size": 256, "num_attention_heads": 4,
                "hidden_act": "gelu", "architectures": ["BertForMaskedLM"]}"#,
        )
        .unwrap();

        let cfg = BertConfig::from_pretrained_file(&path).unwrap();
        assert_eq!(cfg.vocab_size, 30522);
        assert_eq!(cfg.hidden_size, 256);
        assert_eq!(cfg.num_hidden_layers, 12);
        assert_eq!(cfg.max_position_embeddings, 512);
    }

    #[test]
    fn test_bad_head_count_is_rejected() {
        let cfg = BertConfig::new(10).with_hidden_size(10).with_num_attention_heads(3);
        assert!(cfg.check().is_err());
    }
}
