//! Image normalization for model inference.
//!
//! Produces the tensor layout the classifiers were trained on: RGB,
//! resized to a fixed size without preserving aspect ratio, scaled to
//! [0, 1], with a leading batch dimension.

use crate::config::{PreprocessingConfig, ResizeFilter};
use crate::types::ImageTensor;
use image::imageops;
use image::DynamicImage;

/// Transforms decoded images into model input tensors.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    filter: ResizeFilter,
}

impl Preprocessor {
    /// Create a preprocessor for a fixed input size.
    pub fn new(width: u32, height: u32, filter: ResizeFilter) -> Self {
        Self {
            width,
            height,
            filter,
        }
    }

    pub fn from_config(config: &PreprocessingConfig) -> Self {
        Self::new(config.width, config.height, config.filter)
    }

    /// Normalize an image of any color mode and size.
    ///
    /// Returns a tensor of shape `(1, height, width, 3)`.
    pub fn preprocess(&self, image: &DynamicImage) -> ImageTensor {
        let rgb = image.to_rgb8();
        let resized = imageops::resize(&rgb, self.width, self.height, self.filter.into());

        ImageTensor::from_shape_fn(
            (1, self.height as usize, self.width as usize, 3),
            |(_, y, x, c)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        )
    }

    /// Input size as `[width, height]`.
    pub fn input_size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(150, 150, ResizeFilter::default())
    }
}
