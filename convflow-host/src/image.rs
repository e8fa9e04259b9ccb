//! Images and filter outputs.

use itertools::{iproduct, Itertools, MinMaxResult};

use crate::error::ShapeError;

/// Grayscale image with 8-bit pixels in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    height: usize,
    width: usize,
    pixels: Vec<u8>,
}

impl Image {
    /// Creates a `height`×`width` image.
    pub fn new(height: usize, width: usize, pixels: Vec<u8>) -> Result<Self, ShapeError> {
        if pixels.len() != height * width {
            return Err(ShapeError::PixelCount { len: pixels.len(), expected: height * width });
        }
        Ok(Self { height, width, pixels })
    }

    /// Creates an image whose pixel at `(row, col)` is `f(row, col)`.
    pub fn from_fn<F: FnMut(usize, usize) -> u8>(height: usize, width: usize, mut f: F) -> Self {
        let pixels = iproduct!(0..height, 0..width).map(|(row, col)| f(row, col)).collect();
        Self { height, width, pixels }
    }

    /// Height.
    pub fn height(&self) -> usize { self.height }

    /// Width.
    pub fn width(&self) -> usize { self.width }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> &[u8] { &self.pixels }

    /// Pixel at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> u8 { self.pixels[row * self.width + col] }

    /// Checks the image against the device maxima.
    pub fn check(&self, max_height: usize, max_width: usize) -> Result<(), ShapeError> {
        if self.height > max_height || self.width > max_width {
            return Err(ShapeError::ImageTooLarge { height: self.height, width: self.width, max_height, max_width });
        }
        Ok(())
    }
}

/// Result samples of one job, one per pixel in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutput {
    height: usize,
    width: usize,
    samples: Vec<i32>,
}

impl FilterOutput {
    /// Creates an output. `samples` must hold `height * width` values.
    pub fn new(height: usize, width: usize, samples: Vec<i32>) -> Result<Self, ShapeError> {
        if samples.len() != height * width {
            return Err(ShapeError::PixelCount { len: samples.len(), expected: height * width });
        }
        Ok(Self { height, width, samples })
    }

    /// Height.
    pub fn height(&self) -> usize { self.height }

    /// Width.
    pub fn width(&self) -> usize { self.width }

    /// Samples in row-major order.
    pub fn samples(&self) -> &[i32] { &self.samples }

    /// Sample at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> i32 { self.samples[row * self.width + col] }

    /// Rows of samples.
    pub fn rows(&self) -> impl Iterator<Item = &[i32]> + '_ { self.samples.chunks(self.width.max(1)) }

    /// Smallest and largest sample.
    pub fn range(&self) -> Option<(i32, i32)> {
        match self.samples.iter().copied().minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(x) => Some((x, x)),
            MinMaxResult::MinMax(min, max) => Some((min, max)),
        }
    }

    /// Rescales the samples linearly onto `0..=255` for display.
    pub fn to_image(&self) -> Image {
        let (min, max) = self.range().unwrap_or((0, 0));
        let span = i64::from(max) - i64::from(min);
        let pixels = self
            .samples
            .iter()
            .map(|sample| if span == 0 { 0 } else { ((i64::from(*sample) - i64::from(min)) * 255 / span) as u8 })
            .collect();
        Image { height: self.height, width: self.width, pixels }
    }
}
