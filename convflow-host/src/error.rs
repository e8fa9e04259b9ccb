//! Errors.

use std::io;

use convflow::ConfigError;
use thiserror::Error;

/// Kernel or image rejected before any byte is sent.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("kernel is empty")]
    Empty,

    #[error("kernel is not square: row {row} has {len} coefficients, expected {expected}")]
    NotSquare { row: usize, len: usize, expected: usize },

    #[error("kernel has {len} coefficients, expected {expected}")]
    CoeffCount { len: usize, expected: usize },

    #[error("kernel size {size} is even")]
    EvenSize { size: usize },

    #[error("kernel size {size} exceeds the maximum of {max}")]
    KernelTooLarge { size: usize, max: usize },

    #[error("image of {height}x{width} exceeds the maximum of {max_height}x{max_width}")]
    ImageTooLarge { height: usize, width: usize, max_height: usize, max_width: usize },

    #[error("image has {len} pixels, expected {expected}")]
    PixelCount { len: usize, expected: usize },
}

/// Host-side failures.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("link error: {0}")]
    Link(#[from] io::Error),

    #[error("timed out after {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no kernel configured")]
    NoKernel,
}

impl Error {
    /// Whether the job may succeed if retried after a resync.
    pub fn is_transient(&self) -> bool { matches!(self, Self::Link(_) | Self::Timeout { .. }) }
}

/// Host result.
pub type Result<T, E = Error> = std::result::Result<T, E>;
