//! Errors.

use thiserror::Error;

/// Rejected construction parameters. Raised before any cycle is simulated.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{what} must be a nonzero power of two, got {value}")]
    NotPowerOfTwo { what: &'static str, value: usize },

    #[error("width ratio {input_w}:{output_w} is not integral")]
    NonIntegralRatio { input_w: u32, output_w: u32 },

    #[error("{what} width {width} is out of range 1..={max}")]
    WidthOutOfRange { what: &'static str, width: u32, max: u32 },

    #[error("maximum kernel size must be odd, got {size}")]
    EvenKernelSize { size: usize },

    #[error("kernel size {size} is out of range 1..={max}")]
    KernelSizeOutOfRange { size: usize, max: usize },

    #[error("maximum image dimension {dim} exceeds the padded address limit {limit}")]
    ImageTooLarge { dim: usize, limit: usize },

    #[error("{what} {value} is out of range {min}..={max}")]
    OutOfRange { what: &'static str, value: u64, min: u64, max: u64 },

    #[error("watchdog timeout of {timeout} cycles is shorter than the minimum of {min} cycles")]
    TimeoutTooShort { timeout: u64, min: u64 },
}

/// Protocol violations and stalls observed while simulating.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("egress withdrew or changed a valid value before transfer at cycle {cycle}")]
    Unstable { cycle: u64 },

    #[error("stalled after {cycles} cycles with {produced} of {expected} outputs")]
    Stalled { cycles: u64, produced: usize, expected: usize },
}
