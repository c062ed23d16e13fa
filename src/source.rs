//! Pull-based stream of raw image/feature batches.

use ndarray::{Array2, Array4, ArrayView1, ArrayView3, Axis};

use crate::error::{Error, Result};

/// Number of samples in one raw batch.
pub const BATCH_SIZE: usize = 512;

/// One pull's worth of index-aligned samples.
#[derive(Clone, Debug)]
pub struct RawBatch {
    /// `[n, feature_dim]`
    features: Array2<f32>,
    /// `[n, height, width, channels_raw]`
    images: Array4<f32>,
}

impl RawBatch {
    pub fn new(features: Array2<f32>, images: Array4<f32>) -> Result<Self> {
        let (n_features, n_images) = (features.len_of(Axis(0)), images.len_of(Axis(0)));
        if n_features != n_images {
            return Err(Error::MalformedBatch {
                reason: format!("{n_features} feature vectors for {n_images} images"),
            });
        }
        Ok(Self { features, images })
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_parts(self) -> (Array2<f32>, Array4<f32>) {
        (self.features, self.images)
    }

    pub fn feature_dim(&self) -> usize {
        self.features.len_of(Axis(1))
    }

    /// Image and feature vector at `index`, or `MalformedBatch` if the batch is short.
    pub fn sample(&self, index: usize) -> Result<(ArrayView3<'_, f32>, ArrayView1<'_, f32>)> {
        if index >= self.len() {
            return Err(Error::MalformedBatch {
                reason: format!("sample {index} requested from a batch of {}", self.len()),
            });
        }
        Ok((
            self.images.index_axis(Axis(0), index),
            self.features.index_axis(Axis(0), index),
        ))
    }
}

/// Producer of raw batches. `next_batch` may block and may fail; callers do
/// not retry.
pub trait BatchSource: Send {
    fn next_batch(&mut self) -> Result<RawBatch>;
}

impl<I> BatchSource for I
where
    I: Iterator<Item = Result<RawBatch>> + Send,
{
    fn next_batch(&mut self) -> Result<RawBatch> {
        self.next().ok_or(Error::SourceExhausted)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_misaligned_batch() {
        let features = Array2::zeros((3, 4));
        let images = Array4::zeros((2, 1, 1, 6));
        assert!(matches!(
            RawBatch::new(features, images),
            Err(Error::MalformedBatch { .. })
        ));
    }

    #[test]
    fn short_batch_sample_is_an_error() {
        let batch = RawBatch::new(Array2::zeros((2, 4)), Array4::zeros((2, 1, 1, 6))).unwrap();
        assert_eq!(batch.feature_dim(), 4);
        assert!(batch.sample(1).is_ok());
        assert!(batch.sample(2).is_err());
    }

    #[test]
    fn iterator_source_reports_exhaustion() {
        let batch = RawBatch::new(Array2::zeros((1, 2)), Array4::zeros((1, 1, 1, 6))).unwrap();
        let mut source = vec![Ok::<_, Error>(batch)].into_iter();
        assert_eq!(source.next_batch().unwrap().len(), 1);
        assert!(matches!(source.next_batch(), Err(Error::SourceExhausted)));
    }
}
