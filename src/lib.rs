//! Dataset adapter feeding pre-generated road image/feature batches to a
//! burn training loop.
//!
//! A [`BatchSource`] such as [`CacheGen`] yields raw batches of 512 samples.
//! [`RoadDataset`] walks them with a cursor, stacks each sample's two frames
//! into one RGB image, runs the [`Augmentation`] pipeline and hands out
//! `[C, H, W]` tensors with their feature vectors. Call
//! [`runtime::pin_cpu_device`] and [`runtime::init_tracing`] once at startup.

pub mod batcher;
pub mod cache;
pub mod error;
pub mod loader;
pub mod reconstruct;
pub mod road_dataset;
pub mod runtime;
pub mod source;
pub mod transform;

pub use batcher::{RoadBatch, RoadBatcher};
pub use cache::{CacheConfig, CacheGen};
pub use error::{Error, Result};
pub use loader::{build_dataloader, LoaderConfig};
pub use reconstruct::{reconstruct, FrameSize};
pub use road_dataset::{RoadDataset, RoadDatasetConfig, RoadItem};
pub use source::{BatchSource, RawBatch, BATCH_SIZE};
pub use transform::Augmentation;
