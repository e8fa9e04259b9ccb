//! Modules and their composition.

use crate::*;

/// Synchronous module (Mealy machine) between an ingress and an egress interface.
///
/// The module is described by two functions over the same inputs: [`Module::comb`] generates (1) the
/// current-cycle egress forward signal and (2) the current-cycle ingress backward signal, and
/// [`Module::tick`] updates the registers at the end of the cycle.
///
/// The egress forward signal must not depend on the egress backward signal (the module offers its output
/// up-front). Composition relies on this to resolve a pipeline without combinational loops.
pub trait Module {
    /// Ingress interface.
    type I: Interface;
    /// Egress interface.
    type O: Interface;

    /// Combinational logic.
    fn comb(&self, ingress_fwd: &Fwd<Self::I>, egress_bwd: &Bwd<Self::O>) -> (Fwd<Self::O>, Bwd<Self::I>);

    /// Egress forward signal only.
    fn comb_fwd(&self, ingress_fwd: &Fwd<Self::I>) -> Fwd<Self::O> { self.comb(ingress_fwd, &Default::default()).0 }

    /// Clock edge. Latches the next registers computed from the given inputs.
    fn tick(&mut self, ingress_fwd: &Fwd<Self::I>, egress_bwd: &Bwd<Self::O>);

    /// Returns the registers to their reset values.
    fn reset(&mut self);

    /// Runs one full cycle and returns the signals observed during it.
    fn step(&mut self, ingress_fwd: &Fwd<Self::I>, egress_bwd: &Bwd<Self::O>) -> (Fwd<Self::O>, Bwd<Self::I>) {
        let output = self.comb(ingress_fwd, egress_bwd);
        self.tick(ingress_fwd, egress_bwd);
        output
    }
}

/// Pipeline combinators for `Module`.
pub trait ModuleExt: Module + Sized {
    /// Feeds the egress of `self` to `next`.
    fn then<M: Module<I = Self::O>>(self, next: M) -> Chain<Self, M> { Chain { first: self, second: next } }
}

impl<M: Module> ModuleExt for M {}

/// Two modules connected back to back.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chain<A, B> {
    /// Upstream module.
    pub fn first(&self) -> &A { &self.first }

    /// Downstream module.
    pub fn second(&self) -> &B { &self.second }
}

impl<A: Module, B: Module<I = A::O>> Chain<A, B> {
    /// Resolves the signals of the inner channel: forward front-to-back, then backward back-to-front.
    fn resolve(&self, ingress_fwd: &Fwd<A::I>, egress_bwd: &Bwd<B::O>) -> (Fwd<A::O>, Bwd<A::O>, Fwd<B::O>) {
        let mid_fwd = self.first.comb_fwd(ingress_fwd);
        let (egress_fwd, mid_bwd) = self.second.comb(&mid_fwd, egress_bwd);
        (mid_fwd, mid_bwd, egress_fwd)
    }
}

impl<A: Module, B: Module<I = A::O>> Module for Chain<A, B> {
    type I = A::I;
    type O = B::O;

    fn comb(&self, ingress_fwd: &Fwd<A::I>, egress_bwd: &Bwd<B::O>) -> (Fwd<B::O>, Bwd<A::I>) {
        let (mid_fwd, mid_bwd, egress_fwd) = self.resolve(ingress_fwd, egress_bwd);
        let (mid_fwd_check, ingress_bwd) = self.first.comb(ingress_fwd, &mid_bwd);
        debug_assert_eq!(mid_fwd, mid_fwd_check, "forward signal depends on the backward signal");
        (egress_fwd, ingress_bwd)
    }

    fn comb_fwd(&self, ingress_fwd: &Fwd<A::I>) -> Fwd<B::O> {
        self.second.comb_fwd(&self.first.comb_fwd(ingress_fwd))
    }

    fn tick(&mut self, ingress_fwd: &Fwd<A::I>, egress_bwd: &Bwd<B::O>) {
        let (mid_fwd, mid_bwd, _) = self.resolve(ingress_fwd, egress_bwd);
        self.first.tick(ingress_fwd, &mid_bwd);
        self.second.tick(&mid_fwd, egress_bwd);
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-entry pipeline register.
    #[derive(Debug, Default)]
    struct Slot(Option<u8>);

    impl Module for Slot {
        type I = VrChannel<u8>;
        type O = VrChannel<u8>;

        fn comb(&self, _ingress_fwd: &Valid<u8>, egress_bwd: &Ready) -> (Valid<u8>, Ready) {
            (self.0.into(), Ready::new(self.0.is_none() || egress_bwd.ready))
        }

        fn tick(&mut self, ingress_fwd: &Valid<u8>, egress_bwd: &Ready) {
            let (egress_fwd, ingress_bwd) = self.comb(ingress_fwd, egress_bwd);
            if egress_fwd.fire(egress_bwd).is_some() {
                self.0 = None;
            }
            if let Some(value) = ingress_fwd.fire(&ingress_bwd) {
                self.0 = Some(*value);
            }
        }

        fn reset(&mut self) { self.0 = None; }
    }

    #[test]
    fn chain_propagates_backpressure() {
        let mut chain = Slot::default().then(Slot::default());

        // Fill both slots while the consumer is stalled.
        assert!(chain.step(&Valid::valid(1), &Ready::new(false)).1.ready);
        assert!(chain.step(&Valid::valid(2), &Ready::new(false)).1.ready);
        let (egress_fwd, ingress_bwd) = chain.step(&Valid::valid(3), &Ready::new(false));
        assert_eq!(egress_fwd, Valid::valid(1));
        assert!(!ingress_bwd.ready);

        // Draining the tail frees the whole pipeline in the same cycle.
        let (egress_fwd, ingress_bwd) = chain.step(&Valid::valid(3), &Ready::new(true));
        assert_eq!(egress_fwd, Valid::valid(1));
        assert!(ingress_bwd.ready);
        assert_eq!(chain.comb_fwd(&Valid::invalid()), Valid::valid(2));

        chain.reset();
        assert_eq!(chain.comb_fwd(&Valid::invalid()), Valid::invalid());
    }
}
