// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams the rest of the pipeline is written against:
//
//   ExampleSource — anything that can produce the examples of a
//                   split (DREAM json, MCTest tsv, RACE json, …)
//   TokenEncoder  — anything that turns text into subword ids and
//                   knows the [CLS]/[SEP] ids of its vocabulary
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::example::{Example, Split};

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// A dataset reader with a uniform `read(split)` contract.
///
/// Implementations:
///   - DreamReader  → `<dir>/<split>.json`
///   - MctestReader → `<dir>/<set>.<split>.tsv` + `.ans`
///   - RaceReader   → `<dir>/<split>/{high,middle}/*.txt`
pub trait ExampleSource {
    /// Load every example of one split, in file order.
    fn read(&self, split: Split) -> Result<Vec<Example>>;
}

// ─── TokenEncoder ─────────────────────────────────────────────────────────────
/// Subword tokenizer as seen by the feature builder.
pub trait TokenEncoder {
    /// Tokenize one text span without adding special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Id of the `[CLS]` marker.
    fn cls_id(&self) -> u32;

    /// Id of the `[SEP]` marker.
    fn sep_id(&self) -> u32;

    /// Render ids back to token strings, used for debug dumps only.
    fn id_to_token(&self, _id: u32) -> Option<String> {
        None
    }
}
