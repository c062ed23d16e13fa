use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::road_dataset::RoadItem;

#[derive(Clone, Debug)]
pub struct RoadBatcher<B: Backend> {
    device: B::Device,
}

#[derive(Clone, Debug)]
pub struct RoadBatch<B: Backend> {
    /// `[N, C, H, W]`
    pub images: Tensor<B, 4>,
    /// `[N, feature_dim]`
    pub features: Tensor<B, 2>,
}

impl<B: Backend> RoadBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<RoadItem, RoadBatch<B>> for RoadBatcher<B> {
    fn batch(&self, items: Vec<RoadItem>) -> RoadBatch<B> {
        let images = items
            .iter()
            .map(|item| {
                let (channels, height, width) = item.image.dim();
                Data::new(
                    item.image.iter().copied().collect(),
                    Shape::new([channels, height, width]),
                )
            })
            .map(|data: Data<f32, 3>| {
                Tensor::<B, 3>::from_data(data.convert(), &self.device).unsqueeze::<4>()
            })
            .collect();

        let features = items
            .iter()
            .map(|item| Data::new(item.features.to_vec(), Shape::new([item.features.len()])))
            .map(|data: Data<f32, 1>| {
                Tensor::<B, 1>::from_data(data.convert(), &self.device).unsqueeze::<2>()
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let features = Tensor::cat(features, 0);

        RoadBatch { images, features }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{pin_cpu_device, CpuAutodiffBackend, CpuBackend};
    use ndarray::{Array1, Array3};

    #[test]
    fn stacks_items_along_the_batch_axis() {
        let batcher = RoadBatcher::<CpuBackend>::new(*pin_cpu_device());
        let items = (0..3)
            .map(|i| RoadItem {
                image: Array3::from_elem((3, 4, 4), i as f32 / 10.0),
                features: Array1::from_elem(6, i as f32),
            })
            .collect();

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [3, 3, 4, 4]);
        assert_eq!(batch.features.dims(), [3, 6]);

        let features: Vec<f32> = batch.features.into_data().convert::<f32>().value;
        assert_eq!(&features[6..12], &[1.0; 6]);
    }

    #[test]
    fn autodiff_backend_batches_on_cpu() {
        let batcher = RoadBatcher::<CpuAutodiffBackend>::new(*pin_cpu_device());
        let item = RoadItem {
            image: Array3::zeros((4, 2, 2)),
            features: Array1::zeros(3),
        };
        let batch = batcher.batch(vec![item.clone(), item]);
        assert_eq!(batch.images.dims(), [2, 4, 2, 2]);
    }
}
