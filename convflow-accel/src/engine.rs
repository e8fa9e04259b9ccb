//! Convolution engine.
//!
//! A job on the ingress byte stream is laid out as follows (multi-byte fields are little-endian):
//!
//! | Field        | Bytes       | Notes                                          |
//! |--------------|-------------|------------------------------------------------|
//! | kernel size  | 1           | `K`; even sizes are coerced to `K + 1`         |
//! | coefficients | `2 K²`      | row-major, signed 16-bit                       |
//! | height       | 2           | `H`                                            |
//! | width        | 2           | `W`                                            |
//! | pixels       | `H W`       | row-major, unsigned 8-bit                      |
//!
//! The engine answers with `H W` result samples on its egress, in row-major order. Each sample is the 2D
//! convolution (the kernel is flipped) of the zero-padded image at that pixel, wrapped to the result width.

use convflow::*;
use convflow_std::Watchdog;
use log::{debug, info, trace, warn};

use crate::config::{EngineConfig, Footprint};

/// Protocol phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Receiving the kernel size and coefficients.
    ConfigKernel,
    /// Receiving the image dimensions.
    ConfigSize,
    /// Validating the dimensions.
    Pad,
    /// Receiving the pixels into the padded image buffer.
    LoadImage,
    /// Emitting the results.
    Filter,
}

/// Image geometry of the job in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Side of the kernel window.
    pub window: usize,
    /// Image height.
    pub height: usize,
    /// Image width.
    pub width: usize,
}

impl Geometry {
    /// Border added on each side of the image.
    pub fn half(&self) -> usize { self.window / 2 }

    /// Height of the padded image.
    pub fn padded_height(&self) -> usize { self.height + self.window - 1 }

    /// Width of the padded image.
    pub fn padded_width(&self) -> usize { self.width + self.window - 1 }

    /// Cells of the padded image.
    pub fn padded_cells(&self) -> usize { self.padded_height() * self.padded_width() }

    /// Pixels of the image, which is also the number of results.
    pub fn pixels(&self) -> usize { self.height * self.width }

    /// Whether the padded cell at `addr` is outside the image.
    pub fn is_border(&self, addr: usize) -> bool {
        let (row, col) = (addr / self.padded_width(), addr % self.padded_width());
        let half = self.half();
        row < half || row >= self.height + half || col < half || col >= self.width + half
    }

    /// Padded cell under kernel tap `tap` when the window is centered on result `pixel`.
    pub fn tap_addr(&self, pixel: usize, tap: usize) -> usize {
        let (row, col) = (pixel / self.width, pixel % self.width);
        let (kr, kc) = (tap / self.window, tap % self.window);
        (row + kr) * self.padded_width() + col + kc
    }
}

/// Control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the kernel size byte.
    KernelSize,
    /// Zero-filling the kernel buffer before an embedded kernel arrives.
    KernelClear {
        /// Received kernel size.
        size: usize,
        /// Next slot to clear.
        slot: usize,
    },
    /// Receiving coefficients.
    KernelCoeffs {
        /// Received kernel size.
        size: usize,
        /// Side of the window the coefficients are stored in.
        window: usize,
        /// Index of the coefficient being received.
        index: usize,
        /// Low byte of that coefficient, once received.
        low: Option<u8>,
    },
    /// Receiving the image dimensions.
    ConfigSize {
        /// Side of the kernel window.
        window: usize,
        /// Dimension bytes received so far.
        bytes: [u8; 4],
        /// Number of them.
        count: usize,
    },
    /// Checking the dimensions against the buffers.
    Pad {
        /// Geometry as received.
        geometry: Geometry,
    },
    /// Filling the padded image buffer.
    LoadImage {
        /// Geometry of the job.
        geometry: Geometry,
        /// Next padded cell.
        addr: usize,
    },
    /// Computing results, one multiply-accumulate per cycle.
    Filter {
        /// Geometry of the job.
        geometry: Geometry,
        /// Result being computed.
        pixel: usize,
        /// Next kernel tap.
        tap: usize,
        /// Partial sum.
        acc: i32,
    },
}

impl State {
    /// Protocol phase of the state.
    pub fn phase(&self) -> Phase {
        match self {
            Self::KernelSize | Self::KernelClear { .. } | Self::KernelCoeffs { .. } => Phase::ConfigKernel,
            Self::ConfigSize { .. } => Phase::ConfigSize,
            Self::Pad { .. } => Phase::Pad,
            Self::LoadImage { .. } => Phase::LoadImage,
            Self::Filter { .. } => Phase::Filter,
        }
    }

    /// Whether the state consumes an ingress byte this cycle.
    fn awaits_input(&self) -> bool {
        match self {
            Self::KernelSize | Self::KernelCoeffs { .. } | Self::ConfigSize { .. } => true,
            Self::LoadImage { geometry, addr } => !geometry.is_border(*addr),
            Self::KernelClear { .. } | Self::Pad { .. } | Self::Filter { .. } => false,
        }
    }
}

/// Registers of the engine, apart from the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Control state.
    pub state: State,
    /// Idle counter.
    pub watchdog: Watchdog,
    /// Output register.
    pub result: Option<u32>,
}

impl Registers {
    fn new(timeout: u64) -> Self { Self { state: State::KernelSize, watchdog: Watchdog::new(timeout), result: None } }
}

/// Buffer write port command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    /// Store a coefficient.
    Kernel {
        /// Slot of the kernel buffer.
        slot: usize,
        /// Coefficient.
        value: i16,
    },
    /// Store a padded image cell.
    Image {
        /// Cell of the image buffer.
        addr: usize,
        /// Pixel.
        value: u8,
    },
}

/// Job-level event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The last result of a job was computed, or the job had no pixels.
    JobCompleted,
    /// The dimensions exceeded the buffers; the job was abandoned.
    JobRejected,
    /// The watchdog expired; the job was abandoned.
    WatchdogReset,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Registers after the clock edge.
    pub next: Registers,
    /// Egress forward signal.
    pub egress_fwd: Valid<u32>,
    /// Ingress backward signal.
    pub ingress_bwd: Ready,
    /// Buffer write performed at the clock edge.
    pub write: Option<Write>,
    /// Job-level event raised at the clock edge.
    pub event: Option<Event>,
}

/// Job counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Jobs whose results were all computed.
    pub jobs_completed: u64,
    /// Jobs abandoned for oversized dimensions.
    pub jobs_rejected: u64,
    /// Jobs abandoned by the watchdog.
    pub watchdog_resets: u64,
}

/// Kernel buffer slot of coefficient `index` of a `size`×`size` kernel stored in a `window`×`window` buffer.
///
/// Coefficients arrive in row-major order but are stored point-reflected, so that the multiply-accumulate
/// loop walking both buffers in the same direction computes a convolution rather than a correlation. A kernel
/// smaller than the window is centered in it.
pub fn mirrored_slot(window: usize, size: usize, index: usize) -> usize {
    let mirrored = size * size - 1 - index;
    let offset = (window - size) / 2;
    (offset + mirrored / size) * window + offset + mirrored % size
}

/// Convolution engine: job bytes in, result samples out.
#[derive(Debug, Clone)]
pub struct ConvEngine {
    config: EngineConfig,
    registers: Registers,
    kernel: Box<[i16]>,
    image: Box<[u8]>,
    stats: EngineStats,
}

impl ConvEngine {
    /// Creates an engine with buffers sized for the configured maxima.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registers: Registers::new(config.timeout),
            kernel: vec![0; config.max_kernel_size * config.max_kernel_size].into_boxed_slice(),
            image: vec![0; config.padded_capacity()].into_boxed_slice(),
            stats: EngineStats::default(),
        })
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Registers.
    pub fn registers(&self) -> &Registers { &self.registers }

    /// Control state.
    pub fn state(&self) -> State { self.registers.state }

    /// Protocol phase.
    pub fn phase(&self) -> Phase { self.registers.state.phase() }

    /// Idle counter.
    pub fn watchdog(&self) -> Watchdog { self.registers.watchdog }

    /// Job counters.
    pub fn stats(&self) -> EngineStats { self.stats }

    /// Kernel buffer, in storage order.
    pub fn kernel(&self) -> &[i16] { &self.kernel }

    /// Kernel side length the engine uses for a received size byte.
    ///
    /// Even sizes are coerced to the next odd size, and sizes above the maximum are clamped to it.
    pub fn coerce_kernel_size(&self, byte: u8) -> usize { (usize::from(byte) | 1).min(self.config.max_kernel_size) }

    fn result_mask(&self) -> u32 { u32::MAX >> (u32::BITS - self.config.result_width) }

    /// Computes the outcome of a cycle from the registers and the signals at the boundary.
    pub fn transition(&self, registers: &Registers, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) -> Transition {
        let egress_fwd = Valid::from(registers.result);
        let result = if egress_fwd.fire(egress_bwd).is_some() { None } else { registers.result };

        let awaiting = registers.state.awaits_input();
        let ingress_bwd = Ready::new(awaiting);
        let input = ingress_fwd.fire(&ingress_bwd).copied();

        // Only a job in progress can stall.
        let stalled = awaiting && input.is_none() && registers.state != State::KernelSize;
        let watchdog = if stalled { registers.watchdog.advance() } else { registers.watchdog.kick() };
        if watchdog.expired() {
            return Transition {
                next: Registers { state: State::KernelSize, watchdog: watchdog.kick(), result },
                egress_fwd,
                ingress_bwd,
                write: None,
                event: Some(Event::WatchdogReset),
            };
        }

        let mut transition = Transition {
            next: Registers { state: registers.state, watchdog, result },
            egress_fwd,
            ingress_bwd,
            write: None,
            event: None,
        };
        self.advance(&mut transition, input);
        transition
    }

    /// Next control state, buffer write and event.
    fn advance(&self, transition: &mut Transition, input: Option<u8>) {
        let next = &mut transition.next;
        match next.state {
            State::KernelSize => {
                let Some(byte) = input else { return };
                let size = self.coerce_kernel_size(byte);
                next.state = match self.config.footprint {
                    Footprint::Exact => State::KernelCoeffs { size, window: size, index: 0, low: None },
                    Footprint::Embedded => State::KernelClear { size, slot: 0 },
                };
            }
            State::KernelClear { size, slot } => {
                transition.write = Some(Write::Kernel { slot, value: 0 });
                let window = self.config.max_kernel_size;
                next.state = if slot + 1 == window * window {
                    State::KernelCoeffs { size, window, index: 0, low: None }
                } else {
                    State::KernelClear { size, slot: slot + 1 }
                };
            }
            State::KernelCoeffs { size, window, index, low } => {
                let Some(byte) = input else { return };
                let Some(low) = low else {
                    next.state = State::KernelCoeffs { size, window, index, low: Some(byte) };
                    return;
                };
                let slot = mirrored_slot(window, size, index);
                transition.write = Some(Write::Kernel { slot, value: i16::from_le_bytes([low, byte]) });
                next.state = if index + 1 == size * size {
                    State::ConfigSize { window, bytes: [0; 4], count: 0 }
                } else {
                    State::KernelCoeffs { size, window, index: index + 1, low: None }
                };
            }
            State::ConfigSize { window, mut bytes, count } => {
                let Some(byte) = input else { return };
                bytes[count] = byte;
                next.state = if count == 3 {
                    let height = usize::from(u16::from_le_bytes([bytes[0], bytes[1]]));
                    let width = usize::from(u16::from_le_bytes([bytes[2], bytes[3]]));
                    State::Pad { geometry: Geometry { window, height, width } }
                } else {
                    State::ConfigSize { window, bytes, count: count + 1 }
                };
            }
            State::Pad { geometry } => {
                if geometry.height > self.config.max_height || geometry.width > self.config.max_width {
                    next.state = State::KernelSize;
                    transition.event = Some(Event::JobRejected);
                } else if geometry.pixels() == 0 {
                    next.state = State::KernelSize;
                    transition.event = Some(Event::JobCompleted);
                } else {
                    next.state = State::LoadImage { geometry, addr: 0 };
                }
            }
            State::LoadImage { geometry, addr } => {
                let value = if geometry.is_border(addr) {
                    0
                } else {
                    let Some(byte) = input else { return };
                    byte
                };
                transition.write = Some(Write::Image { addr, value });
                next.state = if addr + 1 == geometry.padded_cells() {
                    State::Filter { geometry, pixel: 0, tap: 0, acc: 0 }
                } else {
                    State::LoadImage { geometry, addr: addr + 1 }
                };
            }
            State::Filter { geometry, pixel, tap, acc } => {
                // Stalls until the output register is free or being drained.
                if next.result.is_some() {
                    return;
                }

                let last_tap = tap + 1 == geometry.window * geometry.window;

                let product = i32::from(self.kernel[tap]) * i32::from(self.image[geometry.tap_addr(pixel, tap)]);
                let acc = acc.wrapping_add(product);
                if !last_tap {
                    next.state = State::Filter { geometry, pixel, tap: tap + 1, acc };
                    return;
                }

                next.result = Some(acc as u32 & self.result_mask());
                if pixel + 1 == geometry.pixels() {
                    next.state = State::KernelSize;
                    transition.event = Some(Event::JobCompleted);
                } else {
                    next.state = State::Filter { geometry, pixel: pixel + 1, tap: 0, acc: 0 };
                }
            }
        }
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::Kernel { slot, value } => self.kernel[slot] = value,
            Write::Image { addr, value } => self.image[addr] = value,
        }
    }

    fn record(&mut self, event: Event) {
        match event {
            Event::JobCompleted => {
                self.stats.jobs_completed += 1;
                info!("engine: job {} completed", self.stats.jobs_completed);
            }
            Event::JobRejected => {
                self.stats.jobs_rejected += 1;
                warn!("engine: image exceeds {}x{}, job dropped", self.config.max_height, self.config.max_width);
            }
            Event::WatchdogReset => {
                self.stats.watchdog_resets += 1;
                warn!("engine: no input for {} cycles, job abandoned", self.config.timeout);
            }
        }
    }
}

impl Module for ConvEngine {
    type I = VrChannel<u8>;
    type O = VrChannel<u32>;

    fn comb(&self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) -> (Valid<u32>, Ready) {
        let transition = self.transition(&self.registers, ingress_fwd, egress_bwd);
        (transition.egress_fwd, transition.ingress_bwd)
    }

    fn comb_fwd(&self, _ingress_fwd: &Valid<u8>) -> Valid<u32> { Valid::from(self.registers.result) }

    fn tick(&mut self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) {
        let transition = self.transition(&self.registers, ingress_fwd, egress_bwd);
        if let Some(write) = transition.write {
            trace!("engine: {:?}", write);
            self.apply(write);
        }
        if let Some(event) = transition.event {
            self.record(event);
        }

        let (from, to) = (self.registers.state.phase(), transition.next.state.phase());
        if from != to {
            debug!("engine: {:?} -> {:?}", from, to);
        }
        if let State::Pad { geometry } = transition.next.state {
            debug!("engine: {}x{} image, window {}", geometry.height, geometry.width, geometry.window);
        }
        self.registers = transition.next;
    }

    fn reset(&mut self) { self.registers = Registers::new(self.config.timeout); }
}
