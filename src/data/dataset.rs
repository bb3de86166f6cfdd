use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::error::McError;

/// One (example, choice) pair, tokenised and padded to the run's
/// maximum sequence length.
/// Sequence format: [CLS] segment_a [SEP] segment_b [SEP] [PAD]...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub input_ids:   Vec<u32>,
    pub input_mask:  Vec<u32>,
    pub segment_ids: Vec<u32>,
    pub label:       usize,
}

impl Feature {
    pub fn seq_len(&self) -> usize {
        self.input_ids.len()
    }

    /// Number of real (non-padding) tokens.
    pub fn real_len(&self) -> usize {
        self.input_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// The N features built from one example, in choice order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroup {
    pub example_id: String,
    pub features:   Vec<Feature>,
    pub label:      usize,
}

impl FeatureGroup {
    pub fn num_choices(&self) -> usize {
        self.features.len()
    }

    pub fn seq_len(&self) -> usize {
        self.features.first().map(Feature::seq_len).unwrap_or(0)
    }
}

/// Feature groups that agree on choice count and sequence length,
/// so any subset of them can be stacked into one batch tensor.
#[derive(Debug, Clone)]
pub struct ChoiceDataset {
    groups:      Vec<FeatureGroup>,
    num_choices: usize,
}

impl ChoiceDataset {
    pub fn new(groups: Vec<FeatureGroup>) -> Result<Self, McError> {
        let num_choices = groups.first().map(FeatureGroup::num_choices).unwrap_or(0);
        let seq_len     = groups.first().map(FeatureGroup::seq_len).unwrap_or(0);

        for g in &groups {
            if g.num_choices() != num_choices {
                return Err(McError::ChoiceCountMismatch {
                    example_id: g.example_id.clone(),
                    expected:   num_choices,
                    found:      g.num_choices(),
                });
            }
            if g.features.iter().any(|f| f.seq_len() != seq_len) {
                return Err(McError::config(format!(
                    "example '{}' was built with a sequence length other than {seq_len}",
                    g.example_id
                )));
            }
        }

        Ok(Self { groups, num_choices })
    }

    pub fn num_choices(&self) -> usize {
        self.num_choices
    }
}

impl Dataset<FeatureGroup> for ChoiceDataset {
    fn get(&self, index: usize) -> Option<FeatureGroup> {
        self.groups.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.groups.len()
    }
}
