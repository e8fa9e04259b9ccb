//! Signals and channel interfaces.

use std::fmt;
use std::marker::PhantomData;

/// Value that can be carried on a wire for one cycle.
pub trait Signal: Clone + fmt::Debug + PartialEq {}

impl<T: Clone + fmt::Debug + PartialEq> Signal for T {}

/// Valid/ready channel's forward signal.
///
/// The payload is only meaningful while the valid bit is asserted, so it is modeled as an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Valid<V> {
    inner: Option<V>,
}

impl<V> Valid<V> {
    /// Creates a new forward signal.
    pub fn new(valid: bool, inner: V) -> Self { Self { inner: valid.then_some(inner) } }

    /// Creates a valid forward signal.
    pub fn valid(inner: V) -> Self { Self { inner: Some(inner) } }

    /// Creates an invalid forward signal.
    pub fn invalid() -> Self { Self { inner: None } }

    /// Valid bit.
    pub fn is_valid(&self) -> bool { self.inner.is_some() }

    /// Payload, if valid.
    pub fn inner(&self) -> Option<&V> { self.inner.as_ref() }

    /// Consumes the signal and returns the payload, if valid.
    pub fn into_inner(self) -> Option<V> { self.inner }

    /// Maps the inner value.
    pub fn map_inner<W, F: FnOnce(V) -> W>(self, f: F) -> Valid<W> { Valid { inner: self.inner.map(f) } }

    /// Returns the payload if a transfer happens with the given backward signal.
    ///
    /// A transfer happens exactly when both valid and ready are asserted in the same cycle.
    pub fn fire(&self, bwd: &Ready) -> Option<&V> { if bwd.ready { self.inner.as_ref() } else { None } }
}

impl<V> Default for Valid<V> {
    fn default() -> Self { Self::invalid() }
}

impl<V> From<Option<V>> for Valid<V> {
    fn from(inner: Option<V>) -> Self { Self { inner } }
}

/// Ready signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ready {
    /// Ready bit
    pub ready: bool,
}

impl Ready {
    /// Creates a new ready signal.
    pub const fn new(ready: bool) -> Self { Self { ready } }
}

/// Channel kind connecting two modules.
///
/// `Fwd` flows from producer to consumer, `Bwd` flows back from consumer to producer. The default value of
/// `Bwd` is the most conservative one (e.g., not ready).
pub trait Interface {
    /// Forward signal.
    type Fwd: Signal;
    /// Backward signal.
    type Bwd: Signal + Default;
}

/// Forward signal of an interface.
pub type Fwd<I> = <I as Interface>::Fwd;

/// Backward signal of an interface.
pub type Bwd<I> = <I as Interface>::Bwd;

/// Valid-ready channel.
#[derive(Debug)]
pub struct VrChannel<V> {
    _marker: PhantomData<V>,
}

impl<V: Signal> Interface for VrChannel<V> {
    type Bwd = Ready;
    type Fwd = Valid<V>;
}

/// Unidirectional channel. The consumer cannot stall the producer.
#[derive(Debug)]
pub struct UniChannel<V> {
    _marker: PhantomData<V>,
}

impl<V: Signal> Interface for UniChannel<V> {
    type Bwd = ();
    type Fwd = V;
}
