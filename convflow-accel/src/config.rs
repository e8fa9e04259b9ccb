//! Accelerator configuration.

use convflow::ConfigError;
use convflow_std::uart::DEFAULT_CLOCK_HZ;
use convflow_std::{UartConfig, Watchdog};
use static_assertions::const_assert;

/// Largest kernel side length of the reference design.
pub const MAX_KERNEL_SIZE: usize = 11;

/// Largest image height of the reference design.
pub const MAX_IMG_HEIGHT: usize = 200;

/// Largest image width of the reference design.
pub const MAX_IMG_WIDTH: usize = 200;

/// Width of a result sample in bits.
pub const RESULT_WIDTH: u32 = 24;

/// Depth of the receive and transmit FIFOs.
pub const FIFO_DEPTH: usize = 256;

/// Idle period after which a stalled job is abandoned.
pub const TIMEOUT_SECONDS: u64 = 5;

/// Largest kernel side length the size byte can carry.
const KERNEL_SIZE_LIMIT: usize = u8::MAX as usize;

/// Exclusive bound of an image dimension for kernels up to `max_kernel_size`.
///
/// Image dimensions are 16-bit on the wire, and padding must not overflow them.
pub const fn dim_limit(max_kernel_size: usize) -> usize { (1 << 16) - max_kernel_size / 2 }

const_assert!(MAX_KERNEL_SIZE % 2 == 1);
const_assert!(MAX_IMG_HEIGHT < dim_limit(MAX_KERNEL_SIZE));
const_assert!(MAX_IMG_WIDTH < dim_limit(MAX_KERNEL_SIZE));
const_assert!(FIFO_DEPTH.is_power_of_two());

/// How a kernel smaller than the maximum is laid out in the kernel buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Footprint {
    /// The window is exactly the received kernel size.
    #[default]
    Exact,
    /// The window is always `max_kernel_size`; the received kernel is centered and the rest is zero-filled.
    Embedded,
}

/// Convolution engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest kernel side length. Must be odd.
    pub max_kernel_size: usize,
    /// Largest image height.
    pub max_height: usize,
    /// Largest image width.
    pub max_width: usize,
    /// Consecutive idle cycles while awaiting input before the job is abandoned.
    pub timeout: u64,
    /// Width of a result sample in bits. Results wrap around in two's complement.
    pub result_width: u32,
    /// Kernel buffer layout.
    pub footprint: Footprint,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_kernel_size: MAX_KERNEL_SIZE,
            max_height: MAX_IMG_HEIGHT,
            max_width: MAX_IMG_WIDTH,
            timeout: Watchdog::timeout_for(DEFAULT_CLOCK_HZ, TIMEOUT_SECONDS),
            result_width: RESULT_WIDTH,
            footprint: Footprint::Exact,
        }
    }
}

impl EngineConfig {
    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_kernel_size == 0 || self.max_kernel_size > KERNEL_SIZE_LIMIT {
            return Err(ConfigError::KernelSizeOutOfRange { size: self.max_kernel_size, max: KERNEL_SIZE_LIMIT });
        }
        if self.max_kernel_size % 2 == 0 {
            return Err(ConfigError::EvenKernelSize { size: self.max_kernel_size });
        }

        let limit = dim_limit(self.max_kernel_size);
        for dim in [self.max_height, self.max_width] {
            if dim >= limit {
                return Err(ConfigError::ImageTooLarge { dim, limit });
            }
            if dim == 0 {
                let max = limit as u64 - 1;
                return Err(ConfigError::OutOfRange { what: "maximum image dimension", value: 0, min: 1, max });
            }
        }

        if self.result_width == 0 || self.result_width > u32::BITS {
            return Err(ConfigError::WidthOutOfRange { what: "result", width: self.result_width, max: u32::BITS });
        }
        if self.timeout == 0 {
            return Err(ConfigError::TimeoutTooShort { timeout: 0, min: 1 });
        }
        Ok(())
    }

    /// Number of cells of the padded image buffer.
    pub fn padded_capacity(&self) -> usize {
        (self.max_height + self.max_kernel_size - 1) * (self.max_width + self.max_kernel_size - 1)
    }

    /// Bytes of one result sample on the wire.
    pub fn sample_bytes(&self) -> usize { (self.result_width as usize).div_ceil(8) }
}

/// Whole-device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelConfig {
    /// Convolution engine.
    pub engine: EngineConfig,
    /// Receive FIFO depth, between the serial receiver and the engine.
    pub rx_depth: usize,
    /// Transmit FIFO depth, between the width adapter and the serial transmitter.
    pub tx_depth: usize,
    /// Serial line.
    pub uart: UartConfig,
}

impl Default for AccelConfig {
    fn default() -> Self { Self::new() }
}

impl AccelConfig {
    /// Reference configuration.
    pub fn new() -> Self {
        let uart = UartConfig::default();
        Self { engine: EngineConfig::default(), rx_depth: FIFO_DEPTH, tx_depth: FIFO_DEPTH, uart }
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.uart.validate()?;

        for (what, value) in [("receive fifo depth", self.rx_depth), ("transmit fifo depth", self.tx_depth)] {
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { what, value });
            }
        }

        // One result sample must fit without stalling the engine.
        let burst = self.engine.sample_bytes();
        if self.tx_depth < burst {
            return Err(ConfigError::OutOfRange {
                what: "transmit fifo depth",
                value: self.tx_depth as u64,
                min: burst as u64,
                max: u64::MAX,
            });
        }

        // The watchdog must outlast the gap between two serial frames.
        let min = 4 * self.uart.frame_cycles();
        if self.engine.timeout < min {
            return Err(ConfigError::TimeoutTooShort { timeout: self.engine.timeout, min });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_is_valid() {
        let config = AccelConfig::new();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.engine.timeout, 1 << 28);
        assert_eq!(config.engine.sample_bytes(), 3);
        assert_eq!(config.engine.padded_capacity(), 210 * 210);
    }

    #[test]
    fn rejects_bad_engine_config() {
        let even = EngineConfig { max_kernel_size: 4, ..EngineConfig::default() };
        assert_eq!(even.validate(), Err(ConfigError::EvenKernelSize { size: 4 }));

        let huge = EngineConfig { max_width: 65531, ..EngineConfig::default() };
        assert_eq!(huge.validate(), Err(ConfigError::ImageTooLarge { dim: 65531, limit: 65531 }));

        let wide = EngineConfig { result_width: 40, ..EngineConfig::default() };
        assert!(wide.validate().is_err());
    }

    #[test]
    fn rejects_bad_device_config() {
        let depth = AccelConfig { rx_depth: 100, ..AccelConfig::new() };
        assert_eq!(depth.validate(), Err(ConfigError::NotPowerOfTwo { what: "receive fifo depth", value: 100 }));

        let mut short = AccelConfig::new();
        short.engine.timeout = 1000;
        assert_eq!(short.validate(), Err(ConfigError::TimeoutTooShort { timeout: 1000, min: 4 * 2170 }));
    }
}
