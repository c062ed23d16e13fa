use std::sync::{Mutex, MutexGuard};

use burn::{config::Config, data::dataset::Dataset};
use ndarray::{Array1, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{self, Error};
use crate::reconstruct::{reconstruct_dynamic, FrameSize};
use crate::source::{BatchSource, RawBatch, BATCH_SIZE};
use crate::transform::Augmentation;

#[derive(Config)]
pub struct RoadDatasetConfig {
    /// Side of the square output images
    pub image_size: u32,
    /// Emit RGBA tensors instead of RGB
    #[config(default = false)]
    pub transparent: bool,
    /// Probability of a random-resized crop instead of a centre crop
    #[config(default = 0.0)]
    pub aug_prob: f64,
    /// Reserved for tile generation; has no effect on cached batches
    #[config(default = 8)]
    pub max_zoom: usize,
    /// Virtual length reported to samplers
    #[config(default = 1000000)]
    pub size: usize,
    /// Rows of each raw frame
    #[config(default = 256)]
    pub frame_height: usize,
    /// Columns of each raw frame
    #[config(default = 512)]
    pub frame_width: usize,
    /// Seed for the augmentation rng, entropy when unset
    pub seed: Option<u64>,
}

impl RoadDatasetConfig {
    pub fn frame(&self) -> FrameSize {
        FrameSize {
            height: self.frame_height,
            width: self.frame_width,
        }
    }
}

/// One transformed image and its feature vector.
#[derive(Clone, Debug)]
pub struct RoadItem {
    /// `[C, H, W]` in [0, 1]
    pub image: Array3<f32>,
    pub features: Array1<f32>,
}

struct Cursor<S> {
    source: S,
    batch: Option<RawBatch>,
    position: usize,
    pulls: usize,
    rng: StdRng,
}

/// Dataset over an endless batch source.
///
/// Samples are handed out in source order: the index passed to `get` only
/// bounds the request, it does not pick the sample. The cursor lives behind a
/// mutex, so concurrent readers are serialised but race for positions. Give
/// every loader worker its own dataset.
pub struct RoadDataset<S> {
    config: RoadDatasetConfig,
    frame: FrameSize,
    transform: Augmentation,
    cursor: Mutex<Cursor<S>>,
}

impl<S: BatchSource> RoadDataset<S> {
    pub fn new(config: RoadDatasetConfig, source: S) -> Self {
        let transform = Augmentation::new(config.image_size, config.transparent, config.aug_prob);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        RoadDataset {
            frame: config.frame(),
            config,
            transform,
            cursor: Mutex::new(Cursor {
                source,
                batch: None,
                position: 0,
                pulls: 0,
                rng,
            }),
        }
    }

    pub fn config(&self) -> &RoadDatasetConfig {
        &self.config
    }

    /// Number of batches pulled from the source so far.
    pub fn pulls(&self) -> usize {
        self.lock().pulls
    }

    /// Position of the next read within the current batch.
    pub fn position(&self) -> usize {
        self.lock().position
    }

    fn lock(&self) -> MutexGuard<'_, Cursor<S>> {
        // A panicked read never leaves the cursor half-updated.
        self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reads the sample under the cursor and advances it, pulling a fresh
    /// batch whenever the cursor is back at zero.
    pub fn get_sample(&self, _index: usize) -> error::Result<RoadItem> {
        let mut guard = self.lock();
        let cursor = &mut *guard;

        if cursor.position == 0 || cursor.batch.is_none() {
            let batch = cursor.source.next_batch()?;
            cursor.pulls += 1;
            debug!("pulled batch {} of {} samples", cursor.pulls, batch.len());
            cursor.batch = Some(batch);
        }
        let batch = cursor.batch.as_ref().ok_or(Error::SourceExhausted)?;

        let (raw, features) = batch.sample(cursor.position)?;
        let img = reconstruct_dynamic(raw, self.frame)?;
        let features = features.to_owned();
        cursor.position = (cursor.position + 1) % BATCH_SIZE;

        let image = self.transform.apply(img, &mut cursor.rng)?;
        Ok(RoadItem { image, features })
    }
}

impl<S: BatchSource> Dataset<RoadItem> for RoadDataset<S> {
    fn get(&self, index: usize) -> Option<RoadItem> {
        if index >= self.len() {
            return None;
        }

        match self.get_sample(index) {
            Ok(item) => Some(item),
            Err(err) => panic!("failed to load road sample {index}: {err}"),
        }
    }

    fn len(&self) -> usize {
        self.config.size
    }
}
