// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from raw benchmark files all the
// way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   DREAM / MCTest / RACE files
//       │
//       ▼
//   DatasetReader     → parses a split into Examples
//       │
//       ▼
//   Preprocessor      → cleans story text (escapes, whitespace)
//       │
//       ▼
//   FeatureBuilder    → tokenizes, truncates and pads each choice
//       │
//       ▼
//   ChoiceDataset     → validated FeatureGroups (same N, same L)
//       │
//       ▼
//   DataLoader        → sequential or shuffled order, sharded when
//       │               distributed, cut into batches
//       ▼
//   ChoiceBatcher     → stacks groups into [B, N, L] tensors
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Per-benchmark readers behind the ExampleSource trait
pub mod reader;

/// Cleans and normalises raw story text
pub mod preprocessor;

/// Turns examples into fixed-length per-choice features
pub mod features;

/// Validated collection of feature groups
pub mod dataset;

/// Converts feature groups into tensor batches
pub mod batcher;

/// Burn DataLoaders for evaluation and (sharded) training
pub mod loader;
