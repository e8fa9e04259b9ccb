//! Cycle-by-cycle driver for valid/ready modules.

use std::collections::VecDeque;

use log::trace;

use crate::*;

/// Signals observed in one simulated cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle<V> {
    /// Whether the ingress transfer happened.
    pub accepted: bool,
    /// Egress forward signal.
    pub egress: Valid<V>,
    /// Payload of the egress transfer, if any.
    pub emitted: Option<V>,
}

/// Drives a module with valid/ready interfaces on both sides and checks the egress stability invariant: once
/// the module asserts a valid output, it must hold that value until it is transferred.
#[derive(Debug)]
pub struct Testbench<M: Module> {
    module: M,
    cycle: u64,
    held: Option<Fwd<M::O>>,
}

impl<M, X, Y> Testbench<M>
where
    M: Module<I = VrChannel<X>, O = VrChannel<Y>>,
    X: Signal,
    Y: Signal,
{
    /// Creates a new testbench.
    pub fn new(module: M) -> Self { Self { module, cycle: 0, held: None } }

    /// The module under test.
    pub fn module(&self) -> &M { &self.module }

    /// The module under test.
    pub fn module_mut(&mut self) -> &mut M { &mut self.module }

    /// Number of simulated cycles.
    pub fn cycles(&self) -> u64 { self.cycle }

    /// Simulates one cycle.
    pub fn cycle(&mut self, ingress: Valid<X>, ready: bool) -> Result<Cycle<Y>, SimError> {
        let egress_bwd = Ready::new(ready);
        let (egress, ingress_bwd) = self.module.step(&ingress, &egress_bwd);

        if let Some(held) = self.held.take() {
            if held != egress {
                return Err(SimError::Unstable { cycle: self.cycle });
            }
        }

        let accepted = ingress.fire(&ingress_bwd).is_some();
        let emitted = egress.fire(&egress_bwd).cloned();
        if egress.is_valid() && emitted.is_none() {
            self.held = Some(egress.clone());
        }

        if accepted || emitted.is_some() {
            trace!("cycle {}: accepted {}, emitted {:?}", self.cycle, accepted, emitted);
        }
        self.cycle += 1;
        Ok(Cycle { accepted, egress, emitted })
    }

    /// Simulates `cycles` cycles without input while draining the egress.
    pub fn idle(&mut self, cycles: u64) -> Result<Vec<Y>, SimError> {
        let mut outputs = Vec::new();
        for _ in 0..cycles {
            outputs.extend(self.cycle(Valid::invalid(), true)?.emitted);
        }
        Ok(outputs)
    }

    /// Feeds `inputs` in order, honoring backpressure, and collects `expected` outputs.
    ///
    /// `ready` decides the egress ready bit for each cycle (relative to the start of this run). Fails if the
    /// outputs are not produced within `max_cycles` cycles.
    pub fn run<F: FnMut(u64) -> bool>(
        &mut self, inputs: impl IntoIterator<Item = X>, expected: usize, max_cycles: u64, mut ready: F,
    ) -> Result<Vec<Y>, SimError> {
        let mut inputs = inputs.into_iter().collect::<VecDeque<_>>();
        let mut outputs = Vec::with_capacity(expected);

        for cycle in 0..max_cycles {
            if inputs.is_empty() && outputs.len() >= expected {
                return Ok(outputs);
            }
            let ingress = Valid::from(inputs.front().cloned());
            let report = self.cycle(ingress, ready(cycle))?;
            if report.accepted {
                inputs.pop_front();
            }
            outputs.extend(report.emitted);
        }

        if inputs.is_empty() && outputs.len() >= expected {
            Ok(outputs)
        } else {
            Err(SimError::Stalled { cycles: max_cycles, produced: outputs.len(), expected })
        }
    }
}
