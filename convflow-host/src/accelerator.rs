//! Job orchestration.

use convflow::ConfigError;
use convflow_accel::config::{dim_limit, EngineConfig, MAX_IMG_HEIGHT, MAX_IMG_WIDTH, MAX_KERNEL_SIZE, RESULT_WIDTH};
use convflow_accel::wire::{decode_samples, encode_job};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::image::{FilterOutput, Image};
use crate::kernel::Kernel;
use crate::link::Link;

/// Host-side view of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Largest kernel side length the device accepts.
    pub max_kernel_size: usize,
    /// Largest image height the device accepts.
    pub max_height: usize,
    /// Largest image width the device accepts.
    pub max_width: usize,
    /// Width of a result sample in bits, a multiple of 8.
    pub result_width: u32,
    /// Attempts after the first one for a job that timed out or hit a link error.
    pub retries: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_kernel_size: MAX_KERNEL_SIZE,
            max_height: MAX_IMG_HEIGHT,
            max_width: MAX_IMG_WIDTH,
            result_width: RESULT_WIDTH,
            retries: 3,
        }
    }
}

impl HostConfig {
    /// Host configuration matching a device engine.
    pub fn for_device(engine: &EngineConfig) -> Self {
        Self {
            max_kernel_size: engine.max_kernel_size,
            max_height: engine.max_height,
            max_width: engine.max_width,
            result_width: engine.result_width,
            ..Self::default()
        }
    }

    /// Checks that every accepted job fits the wire format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size_limit = usize::from(u8::MAX);
        if self.max_kernel_size == 0 || self.max_kernel_size > size_limit {
            return Err(ConfigError::KernelSizeOutOfRange { size: self.max_kernel_size, max: size_limit });
        }
        if self.max_kernel_size % 2 == 0 {
            return Err(ConfigError::EvenKernelSize { size: self.max_kernel_size });
        }

        let limit = dim_limit(self.max_kernel_size);
        for dim in [self.max_height, self.max_width] {
            if dim >= limit {
                return Err(ConfigError::ImageTooLarge { dim, limit });
            }
        }

        if self.result_width == 0 || self.result_width > u32::BITS {
            return Err(ConfigError::WidthOutOfRange { what: "result", width: self.result_width, max: u32::BITS });
        }
        if self.result_width % 8 != 0 {
            return Err(ConfigError::NonIntegralRatio { input_w: 8, output_w: self.result_width });
        }
        Ok(())
    }

    fn sample_bytes(&self) -> usize { (self.result_width / 8) as usize }
}

/// Job counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostStats {
    /// Jobs answered in full.
    pub jobs: u64,
    /// Attempts repeated after a transient failure.
    pub retries: u64,
}

/// Drives the convolution device over a [`Link`].
///
/// Kernels and images are checked against the device maxima before any byte is sent. The device forgets the
/// kernel after every job, so it is sent again with each image.
#[derive(Debug)]
pub struct Accelerator<L> {
    link: L,
    config: HostConfig,
    kernel: Option<Kernel>,
    stats: HostStats,
}

impl<L: Link> Accelerator<L> {
    /// Creates an orchestrator over `link`.
    pub fn new(link: L, config: HostConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { link, config, kernel: None, stats: HostStats::default() })
    }

    /// Configuration.
    pub fn config(&self) -> &HostConfig { &self.config }

    /// Job counters.
    pub fn stats(&self) -> HostStats { self.stats }

    /// The link.
    pub fn link(&self) -> &L { &self.link }

    /// The link.
    pub fn link_mut(&mut self) -> &mut L { &mut self.link }

    /// Consumes the orchestrator and returns the link.
    pub fn into_link(self) -> L { self.link }

    /// Selects the kernel for subsequent images.
    pub fn configure_kernel(&mut self, kernel: Kernel) -> Result<()> {
        kernel.check(self.config.max_kernel_size)?;
        debug!("host: {}x{} kernel configured", kernel.size(), kernel.size());
        self.kernel = Some(kernel);
        Ok(())
    }

    /// Convolves `image` with the configured kernel.
    ///
    /// A job that times out or hits a link error is retried from the start after a resync, up to
    /// [`HostConfig::retries`] times. Partial replies are discarded.
    pub fn submit_image(&mut self, image: &Image) -> Result<FilterOutput> {
        let kernel = self.kernel.as_ref().ok_or(Error::NoKernel)?;
        image.check(self.config.max_height, self.config.max_width)?;

        let (height, width) = (image.height() as u16, image.width() as u16);
        let request = encode_job(kernel.size() as u8, kernel.coeffs(), height, width, image.pixels());
        let expected = image.pixels().len() * self.config.sample_bytes();

        let mut attempt = 0;
        let reply = loop {
            match self.exchange(&request, expected) {
                Ok(reply) => break reply,
                Err(error) if error.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    self.stats.retries += 1;
                    warn!("host: {}, retrying ({}/{})", error, attempt, self.config.retries);
                    self.link.resync()?;
                }
                Err(error) => return Err(error),
            }
        };

        let samples = decode_samples(&reply, self.config.result_width)?;
        self.stats.jobs += 1;
        info!("host: {}x{} image filtered", image.height(), image.width());
        Ok(FilterOutput::new(image.height(), image.width(), samples)?)
    }

    /// Configures `kernel` and convolves `image` with it.
    pub fn convolve(&mut self, kernel: Kernel, image: &Image) -> Result<FilterOutput> {
        self.configure_kernel(kernel)?;
        self.submit_image(image)
    }

    fn exchange(&mut self, request: &[u8], expected: usize) -> Result<Vec<u8>> {
        self.link.send(request)?;
        self.link.receive(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShapeError;

    /// Link answering every request with zeros, failing the first `failures` receives.
    #[derive(Debug, Default)]
    struct Flaky {
        failures: u32,
        requests: Vec<Vec<u8>>,
        resyncs: u32,
    }

    impl Link for Flaky {
        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.requests.push(bytes.to_vec());
            Ok(())
        }

        fn receive(&mut self, len: usize) -> Result<Vec<u8>> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Error::Timeout { expected: len, received: 0 });
            }
            Ok(vec![0; len])
        }

        fn resync(&mut self) -> Result<()> {
            self.resyncs += 1;
            Ok(())
        }
    }

    #[test]
    fn shapes_are_checked_before_sending() {
        let config = HostConfig { max_kernel_size: 3, max_height: 4, max_width: 4, ..HostConfig::default() };
        let mut host = Accelerator::new(Flaky::default(), config).unwrap();

        assert!(matches!(host.submit_image(&Image::from_fn(1, 1, |_, _| 0)), Err(Error::NoKernel)));
        assert!(matches!(
            host.configure_kernel(Kernel::box_blur(5).unwrap()),
            Err(Error::Shape(ShapeError::KernelTooLarge { size: 5, max: 3 }))
        ));
        host.configure_kernel(Kernel::sharpen()).unwrap();
        assert!(matches!(
            host.submit_image(&Image::from_fn(5, 1, |_, _| 0)),
            Err(Error::Shape(ShapeError::ImageTooLarge { .. }))
        ));
        assert!(host.link().requests.is_empty());
    }

    #[test]
    fn kernel_is_resent_with_every_image() {
        let mut host = Accelerator::new(Flaky::default(), HostConfig::default()).unwrap();
        host.configure_kernel(Kernel::identity(3).unwrap()).unwrap();
        let image = Image::from_fn(2, 2, |row, col| (row + col) as u8);
        for _ in 0..2 {
            assert_eq!(host.submit_image(&image).unwrap().samples(), &[0; 4]);
        }
        let requests = &host.link().requests;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[0][0], 3);
        assert_eq!(requests[0].len(), 1 + 18 + 4 + 4);
    }

    #[test]
    fn transient_failures_are_retried() {
        let link = Flaky { failures: 2, ..Default::default() };
        let mut host = Accelerator::new(link, HostConfig { retries: 2, ..HostConfig::default() }).unwrap();
        host.convolve(Kernel::sharpen(), &Image::from_fn(3, 3, |_, _| 1)).unwrap();
        assert_eq!(host.link().resyncs, 2);
        assert_eq!(host.stats(), HostStats { jobs: 1, retries: 2 });

        host.link_mut().failures = 3;
        assert!(matches!(host.submit_image(&Image::from_fn(1, 1, |_, _| 1)), Err(Error::Timeout { .. })));
    }

    #[test]
    fn rejects_bad_config() {
        let config = HostConfig { result_width: 20, ..HostConfig::default() };
        assert!(matches!(Accelerator::new(Flaky::default(), config), Err(Error::Config(_))));
        assert!(HostConfig { max_kernel_size: 4, ..HostConfig::default() }.validate().is_err());

        // Padding for an 11x11 kernel must fit the 16-bit dimensions.
        let tall = HostConfig { max_height: 65531, ..HostConfig::default() };
        assert!(matches!(tall.validate(), Err(ConfigError::ImageTooLarge { dim: 65531, limit: 65531 })));
        assert_eq!(HostConfig { max_height: 65530, ..HostConfig::default() }.validate(), Ok(()));
        let small = HostConfig { max_kernel_size: 1, max_height: 65535, ..HostConfig::default() };
        assert_eq!(small.validate(), Ok(()));
        assert_eq!(HostConfig::for_device(&EngineConfig::default()), HostConfig::default());
    }
}
