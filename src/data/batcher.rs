// ============================================================
// Layer 4 — Multiple-Choice Batcher
// ============================================================
// Implements Burn's Batcher trait so the DataLoader can turn a
// Vec<FeatureGroup> into device tensors.
//
// How batching works here:
//   Input:  B groups, each with N features of length L
//   Output: ChoiceBatch with id/mask/segment tensors [B, N, L]
//           and one label per group [B]
//
//   Every sequence is flattened in group-major, choice-minor order:
//   [g1_c1_t1 .. g1_c1_tL, g1_c2_t1 .. gB_cN_tL] → reshape [B, N, L]
//
// All sequences are already padded to the same length by the
// feature builder, so no dynamic padding happens here.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use std::marker::PhantomData;

use crate::data::dataset::FeatureGroup;

// ─── ChoiceBatch ──────────────────────────────────────────────────────────────
/// A batch of multiple-choice groups ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct ChoiceBatch<B: Backend> {
    /// Token ids — shape: [batch_size, num_choices, seq_len]
    pub input_ids: Tensor<B, 3, Int>,

    /// 1 = real token, 0 = padding — shape: [batch_size, num_choices, seq_len]
    pub attention_mask: Tensor<B, 3, Int>,

    /// 0 = segment A, 1 = segment B — shape: [batch_size, num_choices, seq_len]
    pub segment_ids: Tensor<B, 3, Int>,

    /// Index of the correct choice per group — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,

    /// The same labels kept on the host for accuracy bookkeeping
    pub label_indices: Vec<usize>,
}

/// Host-side flattening of a batch, before any tensor is created.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatBatch {
    pub shape:       [usize; 3],
    pub input_ids:   Vec<i32>,
    pub input_mask:  Vec<i32>,
    pub segment_ids: Vec<i32>,
    pub labels:      Vec<i32>,
}

impl FlatBatch {
    pub fn from_groups(groups: &[FeatureGroup]) -> Self {
        let batch_size  = groups.len();
        let num_choices = groups.first().map(|g| g.num_choices()).unwrap_or(0);
        let seq_len     = groups.first().map(|g| g.seq_len()).unwrap_or(0);

        let capacity        = batch_size * num_choices * seq_len;
        let mut input_ids   = Vec::with_capacity(capacity);
        let mut input_mask  = Vec::with_capacity(capacity);
        let mut segment_ids = Vec::with_capacity(capacity);

        for feature in groups.iter().flat_map(|g| g.features.iter()) {
            input_ids.extend(feature.input_ids.iter().map(|&x| x as i32));
            input_mask.extend(feature.input_mask.iter().map(|&x| x as i32));
            segment_ids.extend(feature.segment_ids.iter().map(|&x| x as i32));
        }

        Self {
            shape: [batch_size, num_choices, seq_len],
            input_ids,
            input_mask,
            segment_ids,
            labels: groups.iter().map(|g| g.label as i32).collect(),
        }
    }
}

// ─── ChoiceBatcher ────────────────────────────────────────────────────────────
/// Stateless; the DataLoader hands over the target device with every
/// call, the type parameter only pins the backend.
#[derive(Clone, Debug, Default)]
pub struct ChoiceBatcher<B: Backend> {
    backend: PhantomData<B>,
}

impl<B: Backend> ChoiceBatcher<B> {
    pub fn new() -> Self {
        Self { backend: PhantomData }
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<B, FeatureGroup, ChoiceBatch<B>> for ChoiceBatcher<B> {
    fn batch(&self, items: Vec<FeatureGroup>, device: &B::Device) -> ChoiceBatch<B> {
        let flat  = FlatBatch::from_groups(&items);
        let shape = flat.shape;

        let input_ids = Tensor::<B, 3, Int>::from_data(TensorData::new(flat.input_ids, shape), device);
        let attention_mask = Tensor::<B, 3, Int>::from_data(TensorData::new(flat.input_mask, shape), device);
        let segment_ids = Tensor::<B, 3, Int>::from_data(TensorData::new(flat.segment_ids, shape), device);
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(flat.labels, [shape[0]]), device);

        ChoiceBatch {
            input_ids,
            attention_mask,
            segment_ids,
            labels,
            label_indices: items.iter().map(|g| g.label).collect(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::group;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_flat_batch_layout() {
        let a = group("a", 3, 4, 2);
        let b = group("b", 3, 4, 0);
        let flat = FlatBatch::from_groups(&[a, b]);

        assert_eq!(flat.shape, [2, 3, 4]);
        assert_eq!(flat.input_ids.len(), 24);
        assert_eq!(flat.labels, vec![2, 0]);
        // group a, choice 1, token 0
        assert_eq!(flat.input_ids[4], 100);
        // group b, choice 0, token 3
        assert_eq!(flat.input_ids[12 + 3], 3);
    }

    #[test]
    fn test_tensor_shapes() {
        let device  = Default::default();
        let batcher = ChoiceBatcher::<TestBackend>::new();
        let groups  = vec![group("a", 4, 6, 1), group("b", 4, 6, 3), group("c", 4, 6, 0)];

        let batch = batcher.batch(groups, &device);
        assert_eq!(batch.input_ids.dims(), [3, 4, 6]);
        assert_eq!(batch.attention_mask.dims(), [3, 4, 6]);
        assert_eq!(batch.segment_ids.dims(), [3, 4, 6]);
        assert_eq!(batch.labels.dims(), [3]);
        assert_eq!(batch.label_indices, vec![1, 3, 0]);
    }
}
