use image::{DynamicImage, RgbImage};
use ndarray::{concatenate, s, ArrayView3, Axis};

use crate::error::{Error, Result};

/// Channels of a raw sample: two RGB frames stacked on the channel axis.
pub const RAW_CHANNELS: usize = 6;

/// Geometry of one raw frame. Two frames stack into a `2 * height` x `width` image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub height: usize,
    pub width: usize,
}

impl Default for FrameSize {
    /// 256 x 512 frames, reconstructing to 512 x 512 images.
    fn default() -> Self {
        Self {
            height: 256,
            width: 512,
        }
    }
}

impl FrameSize {
    pub fn raw_shape(&self) -> [usize; 3] {
        [self.height, self.width, RAW_CHANNELS]
    }

    pub fn image_shape(&self) -> [usize; 3] {
        [2 * self.height, self.width, 3]
    }
}

/// Maps a value in [-1, 1] to a byte. Out-of-range values saturate.
fn to_byte(value: f32) -> u8 {
    ((value + 1.0) * 128.0) as u8
}

/// Stacks the two frames of a raw `[h, w, 6]` sample into a `[2h, w]` RGB image.
/// The first three channels form the top half and the last three the bottom.
pub fn reconstruct(raw: ArrayView3<f32>, frame: FrameSize) -> Result<RgbImage> {
    if raw.shape() != &frame.raw_shape()[..] {
        return Err(Error::ShapeMismatch {
            expected: frame.raw_shape().to_vec(),
            got: raw.shape().to_vec(),
        });
    }

    let top = raw.slice(s![.., .., ..3]);
    let bottom = raw.slice(s![.., .., 3..]);
    let pixels = concatenate(Axis(0), &[top, bottom])?.mapv(to_byte);

    // `concatenate` yields standard layout, so the raw vec is row-major HWC.
    let [height, width, _] = frame.image_shape();
    RgbImage::from_raw(width as u32, height as u32, pixels.into_raw_vec()).ok_or(
        Error::ShapeMismatch {
            expected: frame.image_shape().to_vec(),
            got: raw.shape().to_vec(),
        },
    )
}

pub fn reconstruct_dynamic(raw: ArrayView3<f32>, frame: FrameSize) -> Result<DynamicImage> {
    reconstruct(raw, frame).map(DynamicImage::ImageRgb8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn raw_frames() -> (FrameSize, [usize; 3]) {
        let frame = FrameSize::default();
        (frame, frame.raw_shape())
    }

    #[test]
    fn zero_sample_is_mid_grey() {
        let (frame, [h, w, c]) = raw_frames();
        let img = reconstruct(Array3::<f32>::zeros((h, w, c)).view(), frame).unwrap();
        assert_eq!(img.dimensions(), (512, 512));
        assert!(img.as_raw().iter().all(|&b| b == 128));
    }

    #[test]
    fn halves_come_from_their_own_frames() {
        let (frame, [h, w, c]) = raw_frames();
        let raw = Array3::from_shape_fn((h, w, c), |(_, _, ch)| if ch < 3 { 1.0 } else { -1.0 });
        let img = reconstruct(raw.view(), frame).unwrap();
        let (top, bottom) = img.as_raw().split_at(256 * 512 * 3);
        assert!(top.iter().all(|&b| b == 255));
        assert!(bottom.iter().all(|&b| b == 0));
    }

    #[test]
    fn keeps_pixel_positions() {
        let frame = FrameSize { height: 4, width: 5 };
        let mut raw = Array3::<f32>::zeros((4, 5, RAW_CHANNELS));
        raw[[1, 2, 1]] = 0.5;
        raw[[1, 2, 5]] = -0.5;
        let img = reconstruct(raw.view(), frame).unwrap();
        assert_eq!(img.dimensions(), (5, 8));
        assert_eq!(img.get_pixel(2, 1).0, [128, 192, 128]);
        assert_eq!(img.get_pixel(2, 5).0, [128, 128, 64]);
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let (frame, [h, w, _]) = raw_frames();
        assert!(matches!(
            reconstruct(Array3::<f32>::zeros((h, w, 4)).view(), frame),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            reconstruct(Array3::<f32>::zeros((h, 256, RAW_CHANNELS)).view(), frame),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
