// ============================================================
// Layer 4 — Feature Builder
// ============================================================
// Turns one Example into N fixed-length Features, one per choice.
//
// Three text parts take part in every sequence:
//   text_a = context, text_b = choice, text_c = question
//
// Layouts (segment id 0 up to and including the SEP that closes
// segment A, 1 from there through the final SEP):
//
//   QuestionPlacement::Context (default)
//     [CLS] question [SEP] context [SEP] | choice [SEP]
//   QuestionPlacement::Choice
//     [CLS] context [SEP] | question [SEP] choice [SEP]
//   empty question (pair)
//     [CLS] context [SEP] | choice [SEP]
//
// Truncation pops the last token of the longest part, one at a
// time, until the parts fit L minus the marker overhead (3 for a
// pair, 4 for a triple). Ties go to text_a, then text_b, then text_c.
//
// Reference: Devlin et al. (2019) BERT, §4 (SWAG fine-tuning)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::data::dataset::{Feature, FeatureGroup};
use crate::domain::error::McError;
use crate::domain::example::Example;
use crate::domain::traits::TokenEncoder;

const PAIR_OVERHEAD:   usize = 3;
const TRIPLE_OVERHEAD: usize = 4;
const LOGGED_EXAMPLES: usize = 5;

/// Which segment the question joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionPlacement {
    /// Question precedes the context in segment A.
    #[default]
    Context,
    /// Question precedes the choice in segment B.
    Choice,
}

impl FromStr for QuestionPlacement {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "context" => Ok(Self::Context),
            "choice"  => Ok(Self::Choice),
            other => Err(McError::config(format!(
                "unknown question placement '{other}' (expected 'context' or 'choice')"
            ))),
        }
    }
}

pub struct FeatureBuilder<'a, T: TokenEncoder + ?Sized> {
    tokenizer:      &'a T,
    max_seq_length: usize,
    placement:      QuestionPlacement,
}

impl<'a, T: TokenEncoder + ?Sized> FeatureBuilder<'a, T> {
    pub fn new(
        tokenizer:      &'a T,
        max_seq_length: usize,
        placement:      QuestionPlacement,
    ) -> Result<Self, McError> {
        if max_seq_length <= TRIPLE_OVERHEAD {
            return Err(McError::config(format!(
                "max_seq_length {max_seq_length} leaves no room for text after {TRIPLE_OVERHEAD} markers"
            )));
        }
        Ok(Self { tokenizer, max_seq_length, placement })
    }

    /// Build the feature groups of a whole split, in example order.
    pub fn build_all(&self, examples: &[Example]) -> Result<Vec<FeatureGroup>> {
        let mut groups = Vec::with_capacity(examples.len());
        for (index, example) in examples.iter().enumerate() {
            let group = self.build(example)?;
            if index < LOGGED_EXAMPLES {
                self.log_group(example, &group);
            }
            groups.push(group);
        }
        tracing::info!("Built {} feature groups (max_seq_length={})", groups.len(), self.max_seq_length);
        Ok(groups)
    }

    /// Build the N features of one example.
    pub fn build(&self, example: &Example) -> Result<FeatureGroup> {
        if example.label >= example.num_choices() {
            return Err(McError::InvalidAnswerKey {
                example_id: example.id.clone(),
                key:        example.label.to_string(),
            }
            .into());
        }

        let context  = self.tokenizer.encode(&example.context)?;
        let question = self.tokenizer.encode(&example.question)?;

        let mut features = Vec::with_capacity(example.num_choices());
        for choice in &example.choices {
            let mut a = context.clone();
            let mut b = self.tokenizer.encode(choice)?;
            let mut c = question.clone();

            let (segment_a, segment_b): (Vec<Vec<u32>>, Vec<Vec<u32>>) = if c.is_empty() {
                truncate_pair(&mut a, &mut b, self.max_seq_length - PAIR_OVERHEAD);
                (vec![a], vec![b])
            } else {
                truncate_triple(&mut a, &mut b, &mut c, self.max_seq_length - TRIPLE_OVERHEAD);
                match self.placement {
                    QuestionPlacement::Context => (vec![c, a], vec![b]),
                    QuestionPlacement::Choice  => (vec![a], vec![c, b]),
                }
            };

            features.push(self.assemble(&segment_a, &segment_b, example.label));
        }

        Ok(FeatureGroup {
            example_id: example.id.clone(),
            features,
            label:      example.label,
        })
    }

    /// Lay the parts out behind [CLS], close every part with [SEP],
    /// then zero-pad all three sequences to max_seq_length.
    fn assemble(&self, segment_a: &[Vec<u32>], segment_b: &[Vec<u32>], label: usize) -> Feature {
        let cls = self.tokenizer.cls_id();
        let sep = self.tokenizer.sep_id();

        let mut input_ids   = Vec::with_capacity(self.max_seq_length);
        let mut segment_ids = Vec::with_capacity(self.max_seq_length);

        input_ids.push(cls);
        segment_ids.push(0);

        for (segment, parts) in [(0u32, segment_a), (1u32, segment_b)] {
            for part in parts {
                input_ids.extend_from_slice(part);
                input_ids.push(sep);
                segment_ids.extend(std::iter::repeat(segment).take(part.len() + 1));
            }
        }

        let mut input_mask = vec![1u32; input_ids.len()];

        input_ids.resize(self.max_seq_length, 0);
        input_mask.resize(self.max_seq_length, 0);
        segment_ids.resize(self.max_seq_length, 0);

        Feature { input_ids, input_mask, segment_ids, label }
    }

    fn log_group(&self, example: &Example, group: &FeatureGroup) {
        for feature in &group.features {
            let real = &feature.input_ids[..feature.real_len()];
            let tokens: Vec<String> = real
                .iter()
                .map(|&id| self.tokenizer.id_to_token(id).unwrap_or_else(|| id.to_string()))
                .collect();
            tracing::debug!(
                "*** Example *** id: {} | tokens: {} | input_ids: {:?} | input_mask: {:?} | segment_ids: {:?} | label: {}",
                example.id,
                tokens.join(" "),
                feature.input_ids,
                feature.input_mask,
                feature.segment_ids,
                group.label,
            );
        }
    }
}

/// Shrink `a` and `b` in place until their combined length fits
/// `max_len`, always popping from the longer one (`a` on ties).
pub fn truncate_pair(a: &mut Vec<u32>, b: &mut Vec<u32>, max_len: usize) {
    while a.len() + b.len() > max_len {
        if a.len() >= b.len() {
            a.pop();
        } else {
            b.pop();
        }
    }
}

/// Three-part variant of [`truncate_pair`]; ties go to `a`, then `b`.
pub fn truncate_triple(a: &mut Vec<u32>, b: &mut Vec<u32>, c: &mut Vec<u32>, max_len: usize) {
    while a.len() + b.len() + c.len() > max_len {
        if a.len() >= b.len() && a.len() >= c.len() {
            a.pop();
        } else if b.len() >= c.len() {
            b.pop();
        } else {
            c.pop();
        }
    }
}
