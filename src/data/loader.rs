// ============================================================
// Layer 4 — Data Loaders
// ============================================================
// Wires a ChoiceDataset into Burn's DataLoader.
//
//   sequential — dataset order, used for evaluation
//   training   — reshuffled every epoch from the run seed
//
// Distributed runs first narrow the dataset to this rank's shard:
// indices are padded by wrapping to a multiple of world_size, then
// every world_size-th index starting at rank is kept, so all ranks
// see the same number of groups. Only the data is partitioned;
// gradients are not synchronised across processes.
//
// Reference: Burn Book §4 (DataLoader)

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
};
use std::{marker::PhantomData, sync::Arc};

use crate::data::{
    batcher::{ChoiceBatch, ChoiceBatcher},
    dataset::ChoiceDataset,
};

pub type ChoiceLoader<B> = Arc<dyn DataLoader<B, ChoiceBatch<B>>>;

// ─── Shard ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub rank:       usize,
    pub world_size: usize,
}

impl Shard {
    /// Dataset indices this rank owns out of `len`.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        if len == 0 || self.world_size == 0 {
            return Vec::new();
        }
        let total = len.div_ceil(self.world_size) * self.world_size;
        (0..total)
            .map(|i| i % len)
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }
}

/// A view of `dataset` restricted to one shard's indices.
pub struct ShardDataset<D, I> {
    dataset: D,
    indices: Vec<usize>,
    input:   PhantomData<I>,
}

impl<D, I> ShardDataset<D, I>
where
    D: Dataset<I>,
{
    pub fn new(dataset: D, shard: Shard) -> Self {
        let indices = shard.indices(dataset.len());
        Self { dataset, indices, input: PhantomData }
    }
}

impl<D, I> Dataset<I> for ShardDataset<D, I>
where
    D: Dataset<I>,
    I: Clone + Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        self.indices.get(index).and_then(|&i| self.dataset.get(i))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

// ─── Builders ─────────────────────────────────────────────────────────────────
/// Batches in dataset order; the last one may be short.
pub fn sequential_loader<B: Backend>(
    dataset:    ChoiceDataset,
    batch_size: usize,
    device:     &B::Device,
) -> ChoiceLoader<B> {
    DataLoaderBuilder::new(ChoiceBatcher::<B>::new())
        .batch_size(batch_size)
        .set_device(device.clone())
        .build(dataset)
}

/// Shuffled batches for training, optionally restricted to a shard.
pub fn training_loader<B: Backend>(
    dataset:    ChoiceDataset,
    batch_size: usize,
    seed:       u64,
    shard:      Option<Shard>,
    device:     &B::Device,
) -> ChoiceLoader<B> {
    let builder = DataLoaderBuilder::new(ChoiceBatcher::<B>::new())
        .batch_size(batch_size)
        .shuffle(seed)
        .num_workers(1)
        .set_device(device.clone());

    match shard {
        Some(shard) => builder.build(ShardDataset::new(dataset, shard)),
        None => builder.build(dataset),
    }
}
