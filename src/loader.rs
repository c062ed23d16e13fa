use std::sync::Arc;

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};
use tracing::info;

use crate::batcher::{RoadBatch, RoadBatcher};
use crate::cache::CacheConfig;
use crate::error;
use crate::road_dataset::{RoadDataset, RoadDatasetConfig};

#[derive(Config)]
pub struct LoaderConfig {
    pub dataset: RoadDatasetConfig,

    pub cache: CacheConfig,

    #[config(default = 32)]
    pub batch_size: usize,
}

/// Opens the cache and wraps it in a single-worker data loader.
///
/// The dataset reads its source sequentially, so the loader neither shuffles
/// indices nor spreads one dataset across worker threads.
pub fn build_dataloader<B: Backend>(
    config: &LoaderConfig,
    device: B::Device,
) -> error::Result<Arc<dyn DataLoader<RoadBatch<B>>>> {
    let mut cache = config.cache.open()?;
    if let Some(seed) = config.dataset.seed {
        cache = cache.with_seed(seed);
    }
    let dataset = RoadDataset::new(config.dataset.clone(), cache);

    info!(
        "road loader: image size {}, batch size {}, {} virtual samples",
        config.dataset.image_size, config.batch_size, config.dataset.size
    );

    let batcher = RoadBatcher::<B>::new(device);
    Ok(DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .build(dataset))
}
