// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles everything that touches the filesystem on behalf of
// the other layers:
//
//   checkpoint.rs      — Saving and loading model weights
//                        Uses Burn's named MessagePack recorder
//                        for the fine-tuned model and for the
//                        pretrained encoder. Also saves the
//                        encoder and run configs as JSON.
//
//   tokenizer_store.rs — WordPiece tokenizer loading/saving
//                        From a pretrained tokenizer.json or a
//                        plain vocab.txt, so features use the
//                        encoder's own vocabulary.
//
//   report.rs          — Evaluation and training reports
//                        eval_results, logits (text and .npy),
//                        labels and the training loss log.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// WordPiece tokenizer loading and saving
pub mod tokenizer_store;

/// Result files for evaluated splits and training
pub mod report;
