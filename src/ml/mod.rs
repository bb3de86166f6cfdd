// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn model and the two loops that drive
// it. Data preparation and reporting live in other layers.
//
// What's in this layer:
//
//   model.rs     — BERT encoder with a multiple-choice head
//                  • Token, position and segment embeddings
//                  • Multi-head self-attention with padding mask
//                  • Feed-forward networks (GELU activation)
//                  • Post-norm residual connections
//                  • tanh pooler over [CLS], one logit per choice
//
//   trainer.rs   — The training loop
//                  Loss scaling, gradient accumulation, AdamW
//                  with a warmup-linear learning-rate schedule
//
//   evaluator.rs — The evaluation loop
//                  Loss, accuracy, and the raw per-choice logits
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

/// BERT encoder and multiple-choice scoring head
pub mod model;

/// Training loop with gradient accumulation
pub mod trainer;

/// Evaluation loop over one split
pub mod evaluator;
