//! Byte links to the device.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use convflow::*;
use convflow_accel::{AccelConfig, Top};
use convflow_std::{RxErrors, UartRx, UartTx};
use log::{debug, trace, warn};

use crate::error::{Error, Result};

/// Bidirectional byte stream to the device.
pub trait Link {
    /// Sends all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receives exactly `len` bytes, or fails with [`Error::Timeout`].
    fn receive(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Waits until the device has abandoned any partial job, and discards stale bytes.
    fn resync(&mut self) -> Result<()>;
}

/// Link over a byte device such as a serial port configured with a read timeout.
///
/// A read that times out, would block or returns no data is reported as [`Error::Timeout`].
#[derive(Debug)]
pub struct IoLink<T> {
    io: T,
    settle: Duration,
}

fn is_timeout(error: &io::Error) -> bool { matches!(error.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) }

impl<T: Read + Write> IoLink<T> {
    /// Creates a link. `settle` must cover the device watchdog period.
    pub fn new(io: T, settle: Duration) -> Self { Self { io, settle } }

    /// The underlying device.
    pub fn get_ref(&self) -> &T { &self.io }

    /// Consumes the link and returns the underlying device.
    pub fn into_inner(self) -> T { self.io }
}

impl<T: Read + Write> Link for IoLink<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.io.write_all(bytes)?;
        self.io.flush()?;
        Ok(())
    }

    fn receive(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        let mut received = 0;
        while received < len {
            match self.io.read(&mut buf[received..]) {
                Ok(0) => return Err(Error::Timeout { expected: len, received }),
                Ok(n) => received += n,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) if is_timeout(&error) => return Err(Error::Timeout { expected: len, received }),
                Err(error) => return Err(error.into()),
            }
        }
        Ok(buf)
    }

    fn resync(&mut self) -> Result<()> {
        thread::sleep(self.settle);
        let mut scratch = [0; 256];
        let mut discarded = 0;
        loop {
            match self.io.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) if is_timeout(&error) => break,
                Err(error) => return Err(error.into()),
            }
        }
        debug!("link: resynchronized, discarded {} bytes", discarded);
        Ok(())
    }
}

/// Simulated link parameters, in device cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimLinkConfig {
    /// Cycles without progress after which a transfer times out.
    pub receive_timeout: u64,
    /// Idle cycles spent by a resync.
    pub resync_cycles: u64,
}

impl SimLinkConfig {
    /// Timeouts covering the worst-case job latency of a device.
    ///
    /// A resync outlasts the watchdog plus a whole filter pass whose results drain over the serial line.
    pub fn for_device(config: &AccelConfig) -> Self {
        let engine = &config.engine;
        let taps = (engine.max_kernel_size * engine.max_kernel_size) as u64;
        let frame = config.uart.frame_cycles();
        let buffered = (config.rx_depth + config.tx_depth + 4) as u64 * frame;
        let receive_timeout = engine.padded_capacity() as u64 + 2 * taps + buffered;
        let pixels = (engine.max_height * engine.max_width) as u64;
        let filter = pixels * (taps + engine.sample_bytes() as u64 * frame);
        Self { receive_timeout, resync_cycles: 2 * (engine.timeout + receive_timeout) + filter }
    }
}

/// Fault injected into a [`SimLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The byte at this position of the outgoing stream, counted from the creation of the link, is lost.
    DropByte {
        /// Position of the lost byte.
        index: usize,
    },
    /// Every operation fails until the faults are cleared.
    LinkDown,
}

/// Link driving a simulated byte-stream device cycle by cycle.
#[derive(Debug)]
pub struct SimLink<M> {
    device: M,
    config: SimLinkConfig,
    rx: VecDeque<u8>,
    faults: Vec<Fault>,
    sent: usize,
    cycles: u64,
}

impl<M: Module<I = VrChannel<u8>, O = VrChannel<u8>>> SimLink<M> {
    /// Creates a link to `device`.
    pub fn new(device: M, config: SimLinkConfig) -> Self {
        Self { device, config, rx: VecDeque::new(), faults: Vec::new(), sent: 0, cycles: 0 }
    }

    /// The simulated device.
    pub fn device(&self) -> &M { &self.device }

    /// Simulated cycles so far.
    pub fn cycles(&self) -> u64 { self.cycles }

    /// Bytes sent so far, including lost ones.
    pub fn bytes_sent(&self) -> usize { self.sent }

    /// Injects a fault.
    pub fn inject(&mut self, fault: Fault) { self.faults.push(fault) }

    /// Removes all pending faults.
    pub fn clear_faults(&mut self) { self.faults.clear() }

    fn check_up(&self) -> Result<()> {
        if self.faults.contains(&Fault::LinkDown) {
            return Err(io::Error::new(ErrorKind::NotConnected, "simulated link is down").into());
        }
        Ok(())
    }

    /// Runs one cycle offering `ingress`. Returns whether it was accepted.
    fn cycle(&mut self, ingress: Valid<u8>) -> bool {
        let (egress, ingress_bwd) = self.device.step(&ingress, &Ready::new(true));
        if let Some(byte) = egress.into_inner() {
            trace!("link: received {:#04x}", byte);
            self.rx.push_back(byte);
        }
        self.cycles += 1;
        ingress.fire(&ingress_bwd).is_some()
    }
}

impl<M: Module<I = VrChannel<u8>, O = VrChannel<u8>>> Link for SimLink<M> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_up()?;
        for (i, byte) in bytes.iter().copied().enumerate() {
            let index = self.sent;
            self.sent += 1;
            if let Some(pos) = self.faults.iter().position(|fault| *fault == Fault::DropByte { index }) {
                self.faults.swap_remove(pos);
                warn!("link: dropped byte {} ({:#04x})", index, byte);
                continue;
            }

            let mut stall = 0;
            while !self.cycle(Valid::valid(byte)) {
                stall += 1;
                if stall >= self.config.receive_timeout {
                    return Err(Error::Timeout { expected: bytes.len(), received: i });
                }
            }
        }
        Ok(())
    }

    fn receive(&mut self, len: usize) -> Result<Vec<u8>> {
        self.check_up()?;
        let mut stall = 0;
        while self.rx.len() < len {
            let before = self.rx.len();
            self.cycle(Valid::invalid());
            stall = if self.rx.len() > before { 0 } else { stall + 1 };
            if stall >= self.config.receive_timeout {
                return Err(Error::Timeout { expected: len, received: self.rx.len() });
            }
        }
        Ok(self.rx.drain(..len).collect())
    }

    fn resync(&mut self) -> Result<()> {
        self.check_up()?;
        for _ in 0..self.config.resync_cycles {
            self.cycle(Valid::invalid());
        }
        debug!("link: resynchronized, discarded {} bytes", self.rx.len());
        self.rx.clear();
        Ok(())
    }
}

/// The device behind host-side serial transceivers: bytes in, bytes out.
#[derive(Debug, Clone)]
pub struct SerialPhy {
    inner: Chain<Chain<UartTx, Top>, UartRx>,
}

impl SerialPhy {
    /// Creates the device and the host transceivers with the same line configuration.
    pub fn new(config: &AccelConfig) -> Result<Self, ConfigError> {
        let inner = UartTx::new(config.uart)?.then(Top::new(config)?).then(UartRx::new(config.uart)?);
        Ok(Self { inner })
    }

    /// The device.
    pub fn top(&self) -> &Top { self.inner.first().second() }

    /// Errors seen by the host receiver.
    pub fn host_rx_errors(&self) -> RxErrors { self.inner.second().errors() }
}

impl Module for SerialPhy {
    type I = VrChannel<u8>;
    type O = VrChannel<u8>;

    fn comb(&self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) -> (Valid<u8>, Ready) {
        self.inner.comb(ingress_fwd, egress_bwd)
    }

    fn comb_fwd(&self, ingress_fwd: &Valid<u8>) -> Valid<u8> { self.inner.comb_fwd(ingress_fwd) }

    fn tick(&mut self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) { self.inner.tick(ingress_fwd, egress_bwd) }

    fn reset(&mut self) { self.inner.reset() }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Byte device answering from a fixed buffer and recording writes.
    #[derive(Debug, Default)]
    struct Scripted {
        reply: io::Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { self.reply.read(buf) }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.written.write(buf) }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    #[test]
    fn io_link_reports_short_read_as_timeout() {
        let io = Scripted { reply: io::Cursor::new(vec![1, 2, 3, 4, 5]), ..Default::default() };
        let mut link = IoLink::new(io, Duration::ZERO);
        link.send(&[9, 8]).unwrap();
        assert_eq!(link.get_ref().written, [9, 8]);

        assert_eq!(link.receive(2).unwrap(), [1, 2]);
        assert!(matches!(link.receive(4), Err(Error::Timeout { expected: 4, received: 3 })));
        link.resync().unwrap();
    }

    #[test]
    fn resync_outlasts_a_full_filter_pass() {
        let mut config = AccelConfig::new();
        config.engine.max_kernel_size = 3;
        config.engine.max_height = 4;
        config.engine.max_width = 5;
        config.engine.timeout = 100_000;
        let link = SimLinkConfig::for_device(&config);

        let filter = 20 * (9 + 3 * config.uart.frame_cycles());
        assert_eq!(link.receive_timeout, 6 * 7 + 2 * 9 + 516 * 2170);
        assert_eq!(link.resync_cycles, 2 * (100_000 + link.receive_timeout) + filter);
        assert!(link.resync_cycles > config.engine.timeout + filter);
    }

    #[test]
    fn sim_link_fault_injection() {
        let config = SimLinkConfig { receive_timeout: 10, resync_cycles: 10 };
        let mut link = SimLink::new(convflow_std::Fifo::new(4).unwrap(), config);
        link.inject(Fault::DropByte { index: 1 });
        link.send(&[1, 2, 3]).unwrap();
        assert_eq!(link.bytes_sent(), 3);
        assert_eq!(link.receive(2).unwrap(), [1, 3]);
        assert!(matches!(link.receive(1), Err(Error::Timeout { expected: 1, received: 0 })));

        link.inject(Fault::LinkDown);
        assert!(matches!(link.send(&[4]), Err(Error::Link(_))));
        assert!(link.resync().is_err());
        link.clear_faults();
        link.resync().unwrap();
    }
}
