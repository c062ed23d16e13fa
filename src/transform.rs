//! Augmentation pipeline applied to every reconstructed image.
//!
//! Stages run in a fixed order: colour-mode conversion, minimum-size upscale,
//! exact resize, crop (random-resized with probability `aug_prob`, centre crop
//! otherwise), conversion to a `[C, H, W]` float tensor in [0, 1], and channel
//! normalisation to 3 (opaque) or 4 (transparent) channels.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use ndarray::{concatenate, s, Array3, Axis};
use rand::Rng;

use crate::error::{Error, Result};

const FILTER: FilterType = FilterType::Triangle;

/// Target colour mode of the first stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    /// RGBA images lose their alpha channel
    Rgb,
    /// RGB images gain an opaque alpha channel
    Rgba,
}

impl ColorMode {
    pub fn new(transparent: bool) -> Self {
        if transparent {
            Self::Rgba
        } else {
            Self::Rgb
        }
    }

    /// Only RGB <-> RGBA is converted; other modes pass through untouched.
    pub fn convert(self, img: DynamicImage) -> DynamicImage {
        match (self, img) {
            (Self::Rgb, DynamicImage::ImageRgba8(rgba)) => {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
            }
            (Self::Rgba, DynamicImage::ImageRgb8(rgb)) => {
                DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(rgb).to_rgba8())
            }
            (_, img) => img,
        }
    }
}

/// Resizes so the shorter edge equals `size`, keeping the aspect ratio.
fn resize_shorter_edge(img: &DynamicImage, size: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let (new_w, new_h) = if w <= h {
        (size, (u64::from(size) * u64::from(h) / u64::from(w.max(1))) as u32)
    } else {
        ((u64::from(size) * u64::from(w) / u64::from(h.max(1))) as u32, size)
    };
    img.resize_exact(new_w, new_h, FILTER)
}

/// Upscales images whose both sides are below `min_size`.
pub fn resize_to_minimum_size(min_size: u32, img: DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w.max(h) < min_size {
        return resize_shorter_edge(&img, min_size);
    }
    img
}

/// Resizes to exactly `size` x `size`.
pub fn resize(size: u32, img: DynamicImage) -> DynamicImage {
    if img.dimensions() == (size, size) {
        return img;
    }
    img.resize_exact(size, size, FILTER)
}

/// Crops a random region covering `scale` of the area with an aspect ratio
/// in `ratio`, then resizes it to `size` x `size`.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomResizedCrop {
    pub size: u32,
    pub scale: (f64, f64),
    pub ratio: (f64, f64),
}

impl RandomResizedCrop {
    const ATTEMPTS: usize = 10;

    pub fn new(size: u32) -> Self {
        Self {
            size,
            scale: (0.5, 1.0),
            ratio: (0.98, 1.02),
        }
    }

    /// Returns `(left, top, width, height)` of the crop region.
    fn region<R: Rng + ?Sized>(&self, width: u32, height: u32, rng: &mut R) -> (u32, u32, u32, u32) {
        let area = f64::from(width) * f64::from(height);
        let log_ratio = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..Self::ATTEMPTS {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            let aspect = rng.gen_range(log_ratio.0..=log_ratio.1).exp();
            let crop_w = (target_area * aspect).sqrt().round() as u32;
            let crop_h = (target_area / aspect).sqrt().round() as u32;
            if 0 < crop_w && crop_w <= width && 0 < crop_h && crop_h <= height {
                let top = rng.gen_range(0..=height - crop_h);
                let left = rng.gen_range(0..=width - crop_w);
                return (left, top, crop_w, crop_h);
            }
        }

        // Whole image, clamped to the ratio range.
        let in_ratio = f64::from(width) / f64::from(height.max(1));
        let (crop_w, crop_h) = if in_ratio < self.ratio.0 {
            (width, (f64::from(width) / self.ratio.0).round() as u32)
        } else if in_ratio > self.ratio.1 {
            ((f64::from(height) * self.ratio.1).round() as u32, height)
        } else {
            (width, height)
        };
        ((width - crop_w) / 2, (height - crop_h) / 2, crop_w, crop_h)
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> DynamicImage {
        let (width, height) = img.dimensions();
        let (left, top, crop_w, crop_h) = self.region(width, height, rng);
        img.crop_imm(left, top, crop_w, crop_h)
            .resize_exact(self.size, self.size, FILTER)
    }
}

/// Crops the central `size` x `size` region, zero-padding smaller images.
#[derive(Clone, Debug, PartialEq)]
pub struct CenterCrop {
    pub size: u32,
}

impl CenterCrop {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn apply(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width < self.size || height < self.size {
            let (padded_w, padded_h) = (width.max(self.size), height.max(self.size));
            let mut padded = DynamicImage::new(padded_w, padded_h, img.color());
            imageops::replace(
                &mut padded,
                img,
                i64::from((padded_w - width) / 2),
                i64::from((padded_h - height) / 2),
            );
            return self.apply(&padded);
        }

        let left = (f64::from(width - self.size) / 2.0).round() as u32;
        let top = (f64::from(height - self.size) / 2.0).round() as u32;
        img.crop_imm(left, top, self.size, self.size)
    }
}

/// One of the two crop variants.
#[derive(Clone, Debug, PartialEq)]
pub enum Crop {
    RandomResized(RandomResizedCrop),
    Center(CenterCrop),
}

impl Crop {
    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> DynamicImage {
        match self {
            Crop::RandomResized(crop) => crop.apply(img, rng),
            Crop::Center(crop) => crop.apply(img),
        }
    }
}

/// Picks `then` with probability `prob` and `otherwise` the rest of the time.
/// The coin is flipped again on every call.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomApply {
    pub prob: f64,
    pub then: Crop,
    pub otherwise: Crop,
}

impl RandomApply {
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &Crop {
        if rng.gen::<f64>() < self.prob {
            &self.then
        } else {
            &self.otherwise
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> DynamicImage {
        self.choose(rng).apply(img, rng)
    }
}

/// Converts an image to a `[C, H, W]` tensor with values in [0, 1].
pub fn to_tensor(img: &DynamicImage) -> Result<Array3<f32>> {
    let (width, height) = img.dimensions();
    let converted;
    let (channels, bytes) = match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => (usize::from(img.color().channel_count()), img.as_bytes()),
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            (4, converted.as_bytes())
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            (3, converted.as_bytes())
        }
    };

    let scaled = bytes.iter().map(|&b| f32::from(b) / 255.0).collect();
    let hwc = Array3::from_shape_vec((height as usize, width as usize, channels), scaled)?;
    Ok(hwc.permuted_axes([2, 0, 1]).as_standard_layout().into_owned())
}

/// Expands a `[C, H, W]` tensor to 3 colour channels, plus alpha when
/// `transparent`. One channel is grey; two channels are grey and alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpandGreyscale {
    pub transparent: bool,
}

impl ExpandGreyscale {
    pub fn new(transparent: bool) -> Self {
        Self { transparent }
    }

    pub fn target_channels(&self) -> usize {
        if self.transparent {
            4
        } else {
            3
        }
    }

    pub fn apply(&self, tensor: Array3<f32>) -> Result<Array3<f32>> {
        let (channels, height, width) = tensor.dim();
        if channels == self.target_channels() {
            return Ok(tensor);
        }

        let (color, alpha) = match channels {
            1 | 2 => {
                let grey = tensor.slice(s![..1, .., ..]);
                let color = concatenate(Axis(0), &[grey, grey, grey])?;
                let alpha = (channels == 2).then(|| tensor.slice(s![1.., .., ..]).to_owned());
                (color, alpha)
            }
            3 if self.transparent => (tensor, None),
            n => return Err(Error::InvalidChannelCount(n)),
        };

        if !self.transparent {
            return Ok(color);
        }
        let alpha = alpha.unwrap_or_else(|| Array3::ones((1, height, width)));
        Ok(concatenate(Axis(0), &[color.view(), alpha.view()])?)
    }
}

/// The full per-image pipeline, built once per dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Augmentation {
    color_mode: ColorMode,
    image_size: u32,
    crop: RandomApply,
    expand: ExpandGreyscale,
}

impl Augmentation {
    pub fn new(image_size: u32, transparent: bool, aug_prob: f64) -> Self {
        Self {
            color_mode: ColorMode::new(transparent),
            image_size,
            crop: RandomApply {
                prob: aug_prob,
                then: Crop::RandomResized(RandomResizedCrop::new(image_size)),
                otherwise: Crop::Center(CenterCrop::new(image_size)),
            },
            expand: ExpandGreyscale::new(transparent),
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: DynamicImage, rng: &mut R) -> Result<Array3<f32>> {
        let img = self.color_mode.convert(img);
        let img = resize_to_minimum_size(self.image_size, img);
        let img = resize(self.image_size, img);
        let img = self.crop.apply(&img, rng);
        let tensor = to_tensor(&img)?;
        self.expand.apply(tensor)
    }
}
