//! Convolution kernels.

use std::fmt;
use std::str::FromStr;

use itertools::{iproduct, Itertools};

use crate::error::ShapeError;

/// Square kernel with an odd side length and signed 16-bit coefficients in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    size: usize,
    coeffs: Vec<i16>,
}

impl Kernel {
    /// Creates a `size`×`size` kernel.
    pub fn new(size: usize, coeffs: Vec<i16>) -> Result<Self, ShapeError> {
        if size == 0 {
            return Err(ShapeError::Empty);
        }
        if size % 2 == 0 {
            return Err(ShapeError::EvenSize { size });
        }
        if coeffs.len() != size * size {
            return Err(ShapeError::CoeffCount { len: coeffs.len(), expected: size * size });
        }
        Ok(Self { size, coeffs })
    }

    /// Creates a kernel from its rows.
    pub fn from_rows<R: AsRef<[i16]>>(rows: &[R]) -> Result<Self, ShapeError> {
        let size = rows.len();
        if let Some((row, len)) = rows.iter().map(|row| row.as_ref().len()).find_position(|len| *len != size) {
            return Err(ShapeError::NotSquare { row, len, expected: size });
        }
        Self::new(size, rows.iter().flat_map(|row| row.as_ref().iter().copied()).collect())
    }

    /// Side length.
    pub fn size(&self) -> usize { self.size }

    /// Coefficients in row-major order.
    pub fn coeffs(&self) -> &[i16] { &self.coeffs }

    /// Coefficient at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> i16 { self.coeffs[row * self.size + col] }

    /// Checks the kernel against the device maximum.
    pub fn check(&self, max_size: usize) -> Result<(), ShapeError> {
        if self.size > max_size {
            return Err(ShapeError::KernelTooLarge { size: self.size, max: max_size });
        }
        Ok(())
    }

    /// Passes the image through unchanged.
    pub fn identity(size: usize) -> Result<Self, ShapeError> {
        let center = size / 2;
        Self::new(size, iproduct!(0..size, 0..size).map(|(r, c)| i16::from(r == center && c == center)).collect())
    }

    /// Unnormalized box blur.
    pub fn box_blur(size: usize) -> Result<Self, ShapeError> { Self::new(size, vec![1; size * size]) }

    /// Gaussian blur of standard deviation `sigma`, quantized so that the coefficients sum to about `scale`.
    pub fn gaussian(size: usize, sigma: f64, scale: f64) -> Result<Self, ShapeError> {
        let half = (size / 2) as f64;
        let weights = iproduct!(0..size, 0..size)
            .map(|(r, c)| {
                let (y, x) = (r as f64 - half, c as f64 - half);
                (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
            })
            .collect::<Vec<_>>();
        let total = weights.iter().sum::<f64>();
        let (min, max) = (f64::from(i16::MIN), f64::from(i16::MAX));
        Self::new(size, weights.iter().map(|w| (w * scale / total).round().clamp(min, max) as i16).collect())
    }

    /// Horizontal Sobel gradient.
    pub fn sobel_x() -> Self { Self { size: 3, coeffs: vec![-1, 0, 1, -2, 0, 2, -1, 0, 1] } }

    /// Vertical Sobel gradient.
    pub fn sobel_y() -> Self { Self { size: 3, coeffs: vec![-1, -2, -1, 0, 0, 0, 1, 2, 1] } }

    /// Sharpening filter.
    pub fn sharpen() -> Self { Self { size: 3, coeffs: vec![0, -1, 0, -1, 5, -1, 0, -1, 0] } }
}

/// Named kernels.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Identity,
    Box,
    Gaussian,
    SobelX,
    SobelY,
    Sharpen,
}

impl Preset {
    /// All presets.
    pub const ALL: [Self; 6] = [Self::Identity, Self::Box, Self::Gaussian, Self::SobelX, Self::SobelY, Self::Sharpen];

    /// The kernel of the preset at the given size. Fixed-size presets ignore `size`.
    pub fn kernel(self, size: usize) -> Result<Kernel, ShapeError> {
        match self {
            Self::Identity => Kernel::identity(size),
            Self::Box => Kernel::box_blur(size),
            Self::Gaussian => Kernel::gaussian(size, size as f64 / 4.0, 256.0),
            Self::SobelX => Ok(Kernel::sobel_x()),
            Self::SobelY => Ok(Kernel::sobel_y()),
            Self::Sharpen => Ok(Kernel::sharpen()),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Box => "box",
            Self::Gaussian => "gaussian",
            Self::SobelX => "sobel-x",
            Self::SobelY => "sobel-y",
            Self::Sharpen => "sharpen",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| format!("unknown kernel `{}`, expected one of: {}", s, Self::ALL.iter().join(", ")))
    }
}
