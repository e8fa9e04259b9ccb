//! Device top level.

use convflow::*;
use convflow_std::{Adapter, Fifo, UartRx, UartTx};
use log::info;

use crate::config::AccelConfig;
use crate::engine::ConvEngine;

type CoreChain = Chain<Chain<Chain<Fifo<u8>, ConvEngine>, Adapter<u32, u8>>, Fifo<u8>>;

/// Byte-level datapath: receive FIFO, convolution engine, width adapter and transmit FIFO.
#[derive(Debug, Clone)]
pub struct Core {
    inner: CoreChain,
}

impl Core {
    /// Creates the datapath.
    pub fn new(config: &AccelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let inner = Fifo::new(config.rx_depth)?
            .then(ConvEngine::new(config.engine)?)
            .then(Adapter::new(config.engine.result_width, 8)?)
            .then(Fifo::new(config.tx_depth)?);
        info!(
            "core: kernel up to {k}x{k}, image up to {}x{}, {}-bit results",
            config.engine.max_height,
            config.engine.max_width,
            config.engine.result_width,
            k = config.engine.max_kernel_size,
        );
        Ok(Self { inner })
    }

    /// Receive FIFO.
    pub fn rx_fifo(&self) -> &Fifo<u8> { self.inner.first().first().first() }

    /// Convolution engine.
    pub fn engine(&self) -> &ConvEngine { self.inner.first().first().second() }

    /// Transmit FIFO.
    pub fn tx_fifo(&self) -> &Fifo<u8> { self.inner.second() }
}

impl Module for Core {
    type I = VrChannel<u8>;
    type O = VrChannel<u8>;

    fn comb(&self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) -> (Valid<u8>, Ready) {
        self.inner.comb(ingress_fwd, egress_bwd)
    }

    fn comb_fwd(&self, ingress_fwd: &Valid<u8>) -> Valid<u8> { self.inner.comb_fwd(ingress_fwd) }

    fn tick(&mut self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) { self.inner.tick(ingress_fwd, egress_bwd) }

    fn reset(&mut self) { self.inner.reset() }
}

type TopChain = Chain<Chain<UartRx, Core>, UartTx>;

/// Whole device: serial line in, serial line out.
#[derive(Debug, Clone)]
pub struct Top {
    inner: TopChain,
}

impl Top {
    /// Creates the device.
    pub fn new(config: &AccelConfig) -> Result<Self, ConfigError> {
        let inner = UartRx::new(config.uart)?.then(Core::new(config)?).then(UartTx::new(config.uart)?);
        Ok(Self { inner })
    }

    /// Serial receiver.
    pub fn uart_rx(&self) -> &UartRx { self.inner.first().first() }

    /// Datapath.
    pub fn core(&self) -> &Core { self.inner.first().second() }

    /// Serial transmitter.
    pub fn uart_tx(&self) -> &UartTx { self.inner.second() }
}

impl Module for Top {
    type I = UniChannel<bool>;
    type O = UniChannel<bool>;

    fn comb(&self, ingress_fwd: &bool, egress_bwd: &()) -> (bool, ()) { self.inner.comb(ingress_fwd, egress_bwd) }

    fn comb_fwd(&self, ingress_fwd: &bool) -> bool { self.inner.comb_fwd(ingress_fwd) }

    fn tick(&mut self, ingress_fwd: &bool, egress_bwd: &()) { self.inner.tick(ingress_fwd, egress_bwd) }

    fn reset(&mut self) { self.inner.reset() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::wire::{decode_samples, encode_job};

    #[test]
    fn core_rejects_unsupported_result_width() {
        let mut config = AccelConfig::new();
        config.engine.result_width = 20;
        assert_eq!(Core::new(&config).unwrap_err(), ConfigError::NonIntegralRatio { input_w: 20, output_w: 8 });
    }

    #[test]
    fn core_answers_with_result_bytes() {
        let engine = EngineConfig { max_kernel_size: 3, max_height: 4, max_width: 4, ..EngineConfig::default() };
        let config = AccelConfig { engine, rx_depth: 4, tx_depth: 4, ..AccelConfig::new() };
        let mut tb = Testbench::new(Core::new(&config).unwrap());

        let bytes = tb.run(encode_job(1, &[-2], 1, 2, &[3, 4]), 6, 1000, |_| true).unwrap();
        assert_eq!(bytes, [0xfa, 0xff, 0xff, 0xf8, 0xff, 0xff]);
        assert_eq!(decode_samples(&bytes, 24).unwrap(), [-6, -8]);
        assert_eq!(tb.module().engine().stats().jobs_completed, 1);
        assert_eq!(tb.module().rx_fifo().level(), 0);
        assert_eq!(tb.module().tx_fifo().level(), 0);
    }

    #[test]
    fn top_idles_high() {
        let mut top = Top::new(&AccelConfig::new()).unwrap();
        for _ in 0..100 {
            let (line, ()) = top.step(&true, &());
            assert!(line);
        }
        assert!(!top.uart_tx().is_busy());
        assert_eq!(top.uart_rx().errors(), Default::default());
    }
}
