//! Directory-backed batch cache.
//!
//! A cache directory holds JSON shards, each one serialised as
//! `{ "input_features": [n, d], "img": [n, h, w, c] }` in ndarray's serde form.
//! [`CacheGen`] cycles over the shards forever, passes their samples through a
//! shuffle buffer and rebatches them into [`BATCH_SIZE`] sample batches.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use burn::config::Config;
use ndarray::{Array, Array1, Array2, Array3, Array4, ArrayView, Axis, Dimension, RemoveAxis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::error::{self, Error};
use crate::source::{RawBatch, BATCH_SIZE};

#[derive(Config)]
pub struct CacheConfig {
    /// Cache directory holding the shards
    pub path: String,

    /// Number of samples held in the shuffle buffer
    #[config(default = 50000)]
    pub shuffle_size: usize,
}

impl CacheConfig {
    pub fn open(&self) -> error::Result<CacheGen> {
        CacheGen::open(&self.path, self.shuffle_size)
    }
}

/// On-disk layout of one shard.
#[derive(Deserialize)]
struct Shard {
    input_features: Array2<f32>,
    img: Array4<f32>,
}

type Sample = (Array1<f32>, Array3<f32>);

/// Endless, shuffled stream of raw batches read from a cache directory.
pub struct CacheGen {
    shards: Vec<PathBuf>,
    next_shard: usize,
    shuffle_size: usize,
    buffer: Vec<Sample>,
    rng: StdRng,
}

impl CacheGen {
    pub fn open(path: impl AsRef<Path>, shuffle_size: usize) -> error::Result<Self> {
        let path = path.as_ref();
        let mut shards = Vec::new();
        for entry in fs::read_dir(path)? {
            let shard = entry?.path();
            if shard.is_file() && shard.extension().is_some_and(|ext| ext == "json") {
                shards.push(shard);
            }
        }
        if shards.is_empty() {
            return Err(Error::EmptyCache {
                path: path.display().to_string(),
            });
        }
        shards.sort();

        info!(
            "opened batch cache {} with {} shards (shuffle buffer {shuffle_size})",
            path.display(),
            shards.len()
        );

        Ok(Self {
            shards,
            next_shard: 0,
            shuffle_size: shuffle_size.max(1),
            buffer: Vec::new(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Reseeds the shuffle buffer.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn load_next_shard(&mut self) -> error::Result<()> {
        let path = &self.shards[self.next_shard];
        self.next_shard = (self.next_shard + 1) % self.shards.len();
        trace!("loading shard {}", path.display());

        let shard: Shard = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let batch = RawBatch::new(shard.input_features, shard.img)?;
        let (features, images) = batch.into_parts();
        self.buffer.extend(
            features
                .outer_iter()
                .zip(images.outer_iter())
                .map(|(feature, image)| (feature.to_owned(), image.to_owned())),
        );
        Ok(())
    }

    fn fill_buffer_if_needed_and_shuffle(&mut self) -> error::Result<()> {
        let mut added_item = false;
        // Empty shards make no progress; give up after one full cycle of them.
        let mut empty_loads = 0;
        while self.buffer.len() < self.shuffle_size {
            let before = self.buffer.len();
            self.load_next_shard()?;
            if self.buffer.len() == before {
                empty_loads += 1;
                if empty_loads >= self.shards.len() {
                    break;
                }
            } else {
                empty_loads = 0;
                added_item = true;
            }
        }
        if added_item {
            self.buffer.shuffle(&mut self.rng);
        }
        Ok(())
    }

    fn next_sample(&mut self) -> error::Result<Sample> {
        self.fill_buffer_if_needed_and_shuffle()?;
        self.buffer.pop().ok_or(Error::SourceExhausted)
    }

    fn next_raw_batch(&mut self) -> error::Result<RawBatch> {
        let mut features = Vec::with_capacity(BATCH_SIZE);
        let mut images = Vec::with_capacity(BATCH_SIZE);
        for _ in 0..BATCH_SIZE {
            let (feature, image) = self.next_sample()?;
            features.push(feature);
            images.push(image);
        }
        let batch = RawBatch::new(stack(&features)?, stack(&images)?)?;
        debug!(
            "assembled batch of {} samples, {} buffered",
            batch.len(),
            self.buffer.len()
        );
        Ok(batch)
    }
}

fn stack<D>(arrays: &[Array<f32, D>]) -> error::Result<Array<f32, D::Larger>>
where
    D: Dimension,
    D::Larger: RemoveAxis,
{
    let views: Vec<ArrayView<f32, D>> = arrays.iter().map(|array| array.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

impl Iterator for CacheGen {
    type Item = error::Result<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_raw_batch())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::BatchSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Fresh, empty directory under the system temp dir.
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "road_data_{name}_{}_{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes a shard whose feature vectors hold `first..first + n` in every slot.
    pub(crate) fn write_shard(dir: &Path, name: &str, first: usize, n: usize, feature_dim: usize) {
        let features = Array2::from_shape_fn((n, feature_dim), |(i, _)| (first + i) as f32);
        let images = Array4::<f32>::zeros((n, 2, 2, 6));
        let json = serde_json::json!({
            "input_features": features,
            "img": images,
        });
        fs::write(dir.join(name), serde_json::to_vec(&json).unwrap()).unwrap();
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = scratch_dir("empty");
        fs::write(dir.join("notes.txt"), b"not a shard").unwrap();
        assert!(matches!(CacheGen::open(&dir, 16), Err(Error::EmptyCache { .. })));
    }

    #[test]
    fn batches_are_full_and_cycle_over_shards() {
        let dir = scratch_dir("cycle");
        write_shard(&dir, "a.json", 0, 300, 3);
        write_shard(&dir, "b.json", 300, 100, 3);

        let mut cache = CacheGen::open(&dir, 64).unwrap().with_seed(7);
        for _ in 0..3 {
            let batch = cache.next_batch().unwrap();
            assert_eq!(batch.len(), BATCH_SIZE);
            assert_eq!(batch.feature_dim(), 3);
        }
    }

    #[test]
    fn shuffle_keeps_every_sample() {
        let dir = scratch_dir("shuffle");
        write_shard(&dir, "a.json", 0, BATCH_SIZE, 1);

        // A one-sample buffer refills only when empty, so one batch drains exactly one shard.
        let mut cache = CacheGen::open(&dir, 1).unwrap().with_seed(3);
        let batch = cache.next_batch().unwrap();
        let mut seen: Vec<usize> = (0..batch.len())
            .map(|i| batch.sample(i).unwrap().1[0] as usize)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..BATCH_SIZE).collect::<Vec<_>>());
    }

    #[test]
    fn corrupt_shard_is_propagated() {
        let dir = scratch_dir("corrupt");
        fs::write(dir.join("bad.json"), b"{ not json").unwrap();
        let mut cache = CacheGen::open(&dir, 4).unwrap();
        assert!(matches!(cache.next_batch(), Err(Error::Json(_))));
    }

    #[test]
    fn config_opens_cache() {
        let dir = scratch_dir("config");
        write_shard(&dir, "a.json", 0, 8, 2);
        let config = CacheConfig::new(dir.display().to_string()).with_shuffle_size(8);
        assert!(config.open().is_ok());
    }
}
