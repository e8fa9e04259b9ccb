//! Word-width adapter.
//!
//! Converts a stream of `input_w`-bit words into a stream of `output_w`-bit words, where the wider width is an
//! integral multiple of the narrower one. Narrow symbols are ordered least-significant first.

use std::marker::PhantomData;

use convflow::*;

/// Unsigned word that can carry up to `WIDTH` bits of a stream.
pub trait Word: Signal + Copy {
    /// Width of the word.
    const WIDTH: u32;

    /// Zero-extends the word.
    fn to_bits(self) -> u64;

    /// Truncates `bits` into a word.
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_word {
    ($($t:ty),*) => {
        $(
            impl Word for $t {
                const WIDTH: u32 = <$t>::BITS;

                fn to_bits(self) -> u64 { u64::from(self) }

                fn from_bits(bits: u64) -> Self { bits as $t }
            }
        )*
    };
}

impl_word!(u8, u16, u32, u64);

/// Direction of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Assembles `ratio` narrow symbols into one wide word.
    Widen,
    /// Splits one wide word into `ratio` narrow symbols.
    Narrow,
}

/// Width adapter between two valid/ready channels.
#[derive(Debug, Clone)]
pub struct Adapter<I, O> {
    input_w: u32,
    output_w: u32,
    ratio: u32,
    direction: Direction,

    /// Assembly (widen) or shift (narrow) register.
    data: u64,
    /// Symbols assembled so far (widen) or left to emit (narrow).
    count: u32,
    /// Completed wide word waiting for the consumer (widen only).
    word: Option<u64>,

    _marker: PhantomData<(I, O)>,
}

fn mask(width: u32) -> u64 { if width >= 64 { u64::MAX } else { (1 << width) - 1 } }

impl<I: Word, O: Word> Adapter<I, O> {
    /// Creates an adapter from `input_w`-bit words to `output_w`-bit words.
    ///
    /// Equal widths make a pass-through stage.
    pub fn new(input_w: u32, output_w: u32) -> Result<Self, ConfigError> {
        if input_w == 0 || input_w > I::WIDTH {
            return Err(ConfigError::WidthOutOfRange { what: "input", width: input_w, max: I::WIDTH });
        }
        if output_w == 0 || output_w > O::WIDTH {
            return Err(ConfigError::WidthOutOfRange { what: "output", width: output_w, max: O::WIDTH });
        }

        let (wide, narrow) = (input_w.max(output_w), input_w.min(output_w));
        if wide % narrow != 0 {
            return Err(ConfigError::NonIntegralRatio { input_w, output_w });
        }

        let direction = if output_w > input_w { Direction::Widen } else { Direction::Narrow };
        Ok(Self {
            input_w,
            output_w,
            ratio: wide / narrow,
            direction,
            data: 0,
            count: 0,
            word: None,
            _marker: PhantomData,
        })
    }

    /// Number of narrow symbols per wide word.
    pub fn ratio(&self) -> u32 { self.ratio }

    /// Direction.
    pub fn direction(&self) -> Direction { self.direction }
}

impl<I: Word, O: Word> Module for Adapter<I, O> {
    type I = VrChannel<I>;
    type O = VrChannel<O>;

    fn comb(&self, _ingress_fwd: &Valid<I>, egress_bwd: &Ready) -> (Valid<O>, Ready) {
        match self.direction {
            Direction::Widen => {
                let egress_fwd = Valid::from(self.word.map(O::from_bits));
                // Only the symbol completing a word needs the output register to be free.
                let completing = self.count == self.ratio - 1;
                let ready = !completing || self.word.is_none() || egress_bwd.ready;
                (egress_fwd, Ready::new(ready))
            }
            Direction::Narrow => {
                let egress_fwd = Valid::new(self.count > 0, O::from_bits(self.data & mask(self.output_w)));
                // The next word is accepted in the same cycle the last symbol leaves.
                let ready = self.count == 0 || (self.count == 1 && egress_bwd.ready);
                (egress_fwd, Ready::new(ready))
            }
        }
    }

    fn tick(&mut self, ingress_fwd: &Valid<I>, egress_bwd: &Ready) {
        let (egress_fwd, ingress_bwd) = self.comb(ingress_fwd, egress_bwd);
        let outgoing = egress_fwd.fire(egress_bwd).is_some();
        let incoming = ingress_fwd.fire(&ingress_bwd).map(|value| value.to_bits() & mask(self.input_w));

        match self.direction {
            Direction::Widen => {
                if outgoing {
                    self.word = None;
                }
                if let Some(symbol) = incoming {
                    self.data |= symbol << (self.count * self.input_w);
                    if self.count == self.ratio - 1 {
                        self.word = Some(self.data);
                        self.data = 0;
                        self.count = 0;
                    } else {
                        self.count += 1;
                    }
                }
            }
            Direction::Narrow => {
                if outgoing {
                    self.data = self.data.checked_shr(self.output_w).unwrap_or(0);
                    self.count -= 1;
                }
                if let Some(word) = incoming {
                    self.data = word;
                    self.count = self.ratio;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.data = 0;
        self.count = 0;
        self.word = None;
    }
}
