//! Asynchronous serial transceiver (UART).
//!
//! A frame is one start bit (low), `data_bits` data bits least significant first, an optional parity bit, and
//! one or two stop bits (high). Every bit lasts `divisor` cycles.

use convflow::*;
use log::{debug, warn};
use static_assertions::const_assert;

/// Reference clock of the accelerator board.
pub const DEFAULT_CLOCK_HZ: u64 = 50_000_000;

/// Reference baud rate of the serial link.
pub const DEFAULT_BAUD: u64 = 230_400;

/// Smallest divisor at which mid-bit sampling still lands inside the bit.
pub const MIN_DIVISOR: u32 = 4;

const_assert!(DEFAULT_CLOCK_HZ / DEFAULT_BAUD >= MIN_DIVISOR as u64);

/// Parity bit policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Total number of ones (data and parity) is odd.
    Odd,
    /// Total number of ones (data and parity) is even.
    Even,
    /// Parity bit is always 1.
    Mark,
    /// Parity bit is always 0.
    Space,
}

impl Parity {
    /// Parity bit for `data`, if any.
    pub fn bit(self, data: u8) -> Option<bool> {
        let odd_ones = data.count_ones() % 2 == 1;
        match self {
            Self::None => None,
            Self::Odd => Some(!odd_ones),
            Self::Even => Some(odd_ones),
            Self::Mark => Some(true),
            Self::Space => Some(false),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,
    /// Two stop bits.
    Two,
}

impl StopBits {
    fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Serial line configuration, shared by both ends of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    /// Cycles per bit.
    pub divisor: u32,
    /// Data bits per frame, 5 to 8.
    pub data_bits: u8,
    /// Parity policy.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            divisor: (DEFAULT_CLOCK_HZ / DEFAULT_BAUD) as u32,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl UartConfig {
    /// 8N1 configuration for `baud` at `clock_hz`.
    pub fn for_baud(clock_hz: u64, baud: u64) -> Result<Self, ConfigError> {
        let divisor = u32::try_from(clock_hz / baud.max(1)).unwrap_or(u32::MAX);
        let config = Self { divisor, ..Self::default() };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.divisor < MIN_DIVISOR {
            return Err(ConfigError::OutOfRange {
                what: "uart divisor",
                value: self.divisor.into(),
                min: MIN_DIVISOR.into(),
                max: u32::MAX.into(),
            });
        }
        if !(5..=8).contains(&self.data_bits) {
            let value = self.data_bits.into();
            return Err(ConfigError::OutOfRange { what: "uart data bits", value, min: 5, max: 8 });
        }
        Ok(())
    }

    /// Bits per frame, including start, parity and stop bits.
    pub fn frame_bits(&self) -> u32 {
        1 + u32::from(self.data_bits) + u32::from(self.parity.bit(0).is_some()) + u32::from(self.stop_bits.count())
    }

    /// Cycles per frame.
    pub fn frame_cycles(&self) -> u64 { u64::from(self.frame_bits()) * u64::from(self.divisor) }

    fn data_mask(&self) -> u8 { (0xffu16 >> (8 - self.data_bits)) as u8 }
}

/// Bit position within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bit {
    Idle,
    Start,
    Data { index: u8 },
    Parity,
    Stop { left: u8 },
}

/// Serial transmitter: bytes in, line level out.
#[derive(Debug, Clone)]
pub struct UartTx {
    config: UartConfig,
    bit: Bit,
    timer: u32,
    shreg: u8,
    parity: Option<bool>,
    line: bool,
}

impl UartTx {
    /// Creates a transmitter. The line idles high.
    pub fn new(config: UartConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, bit: Bit::Idle, timer: 0, shreg: 0, parity: None, line: true })
    }

    /// Whether a frame is being transmitted.
    pub fn is_busy(&self) -> bool { self.bit != Bit::Idle }

    fn next_bit(&mut self) {
        let (bit, line) = match self.bit {
            Bit::Idle => return,
            Bit::Start => (Bit::Data { index: 0 }, self.shreg & 1 == 1),
            Bit::Data { index } if index + 1 < self.config.data_bits => {
                (Bit::Data { index: index + 1 }, (self.shreg >> (index + 1)) & 1 == 1)
            }
            Bit::Data { .. } => match self.parity {
                Some(parity) => (Bit::Parity, parity),
                None => (Bit::Stop { left: self.config.stop_bits.count() - 1 }, true),
            },
            Bit::Parity => (Bit::Stop { left: self.config.stop_bits.count() - 1 }, true),
            Bit::Stop { left: 0 } => (Bit::Idle, true),
            Bit::Stop { left } => (Bit::Stop { left: left - 1 }, true),
        };
        self.bit = bit;
        self.line = line;
        self.timer = self.config.divisor - 1;
    }
}

impl Module for UartTx {
    type I = VrChannel<u8>;
    type O = UniChannel<bool>;

    fn comb(&self, _ingress_fwd: &Valid<u8>, _egress_bwd: &()) -> (bool, Ready) {
        (self.line, Ready::new(self.bit == Bit::Idle))
    }

    fn tick(&mut self, ingress_fwd: &Valid<u8>, egress_bwd: &()) {
        let (_, ingress_bwd) = self.comb(ingress_fwd, egress_bwd);

        if let Some(&data) = ingress_fwd.fire(&ingress_bwd) {
            self.shreg = data & self.config.data_mask();
            self.parity = self.config.parity.bit(self.shreg);
            self.bit = Bit::Start;
            self.line = false;
            self.timer = self.config.divisor - 1;
        } else if self.timer > 0 {
            self.timer -= 1;
        } else {
            self.next_bit();
        }
    }

    fn reset(&mut self) {
        self.bit = Bit::Idle;
        self.timer = 0;
        self.line = true;
    }
}

/// Receive error counters. Erroneous frames are dropped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RxErrors {
    /// Stop bit sampled low.
    pub frame: u64,
    /// Parity bit mismatch.
    pub parity: u64,
    /// A frame completed while the previous byte was still unclaimed.
    pub overflow: u64,
    /// Line held low for a whole frame.
    pub break_cond: u64,
}

/// Serial receiver: line level in, bytes out.
#[derive(Debug, Clone)]
pub struct UartRx {
    config: UartConfig,
    /// Two-flop synchronizer; `sync[1]` is the sampled level.
    sync: [bool; 2],
    bit: Bit,
    timer: u32,
    shreg: u8,
    parity: Option<bool>,
    stop_error: bool,
    output: Option<u8>,
    errors: RxErrors,
}

impl UartRx {
    /// Creates a receiver.
    pub fn new(config: UartConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            sync: [true; 2],
            bit: Bit::Idle,
            timer: 0,
            shreg: 0,
            parity: None,
            stop_error: false,
            output: None,
            errors: RxErrors::default(),
        })
    }

    /// Error counters.
    pub fn errors(&self) -> RxErrors { self.errors }

    fn complete(&mut self) {
        let expected = self.config.parity.bit(self.shreg);
        if self.shreg == 0 && self.stop_error && self.parity != Some(true) {
            self.errors.break_cond += 1;
            debug!("uart rx: break condition");
        } else if self.stop_error {
            self.errors.frame += 1;
            debug!("uart rx: framing error, dropped {:#04x}", self.shreg);
        } else if self.parity != expected {
            self.errors.parity += 1;
            debug!("uart rx: parity error, dropped {:#04x}", self.shreg);
        } else if self.output.is_some() {
            self.errors.overflow += 1;
            warn!("uart rx: overflow, dropped {:#04x}", self.shreg);
        } else {
            self.output = Some(self.shreg);
        }
    }
}

impl Module for UartRx {
    type I = UniChannel<bool>;
    type O = VrChannel<u8>;

    fn comb(&self, _ingress_fwd: &bool, _egress_bwd: &Ready) -> (Valid<u8>, ()) { (self.output.into(), ()) }

    fn tick(&mut self, ingress_fwd: &bool, egress_bwd: &Ready) {
        if egress_bwd.ready {
            self.output = None;
        }

        let line = self.sync[1];
        let sample = self.timer == 0;
        if self.timer > 0 && self.bit != Bit::Idle {
            self.timer -= 1;
        }

        match self.bit {
            Bit::Idle => {
                if !line {
                    self.bit = Bit::Start;
                    self.timer = (self.config.divisor / 2).saturating_sub(1);
                }
            }
            _ if !sample => {}
            Bit::Start => {
                if line {
                    // Glitch shorter than half a bit.
                    self.bit = Bit::Idle;
                } else {
                    self.bit = Bit::Data { index: 0 };
                    self.shreg = 0;
                    self.parity = None;
                    self.stop_error = false;
                    self.timer = self.config.divisor - 1;
                }
            }
            Bit::Data { index } => {
                self.shreg |= u8::from(line) << index;
                self.bit = if index + 1 < self.config.data_bits {
                    Bit::Data { index: index + 1 }
                } else if self.config.parity == Parity::None {
                    Bit::Stop { left: self.config.stop_bits.count() - 1 }
                } else {
                    Bit::Parity
                };
                self.timer = self.config.divisor - 1;
            }
            Bit::Parity => {
                self.parity = Some(line);
                self.bit = Bit::Stop { left: self.config.stop_bits.count() - 1 };
                self.timer = self.config.divisor - 1;
            }
            Bit::Stop { left } => {
                self.stop_error |= !line;
                if left == 0 {
                    self.bit = Bit::Idle;
                    self.complete();
                } else {
                    self.bit = Bit::Stop { left: left - 1 };
                    self.timer = self.config.divisor - 1;
                }
            }
        }

        self.sync = [*ingress_fwd, self.sync[0]];
    }

    fn reset(&mut self) {
        self.sync = [true; 2];
        self.bit = Bit::Idle;
        self.timer = 0;
        self.output = None;
        self.errors = RxErrors::default();
    }
}
