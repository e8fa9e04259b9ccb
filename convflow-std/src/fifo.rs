//! Elastic buffer.

use convflow::*;

/// Bounded FIFO queue with a power-of-two capacity.
///
/// Read and write pointers carry one extra wrap bit so that the fill level is their difference and full and
/// empty are distinguishable without a separate flag.
#[derive(Debug, Clone)]
pub struct Queue<V> {
    mem: Box<[Option<V>]>,
    wptr: usize,
    rptr: usize,
}

impl<V> Queue<V> {
    /// Creates a new queue.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if !capacity.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo { what: "queue capacity", value: capacity });
        }
        Ok(Self { mem: (0..capacity).map(|_| None).collect(), wptr: 0, rptr: 0 })
    }

    /// Capacity.
    pub fn capacity(&self) -> usize { self.mem.len() }

    /// Number of queued values, in `0..=capacity`.
    pub fn level(&self) -> usize { self.wptr.wrapping_sub(self.rptr) & self.ptr_mask() }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool { self.level() == 0 }

    /// Whether the queue is full.
    pub fn is_full(&self) -> bool { self.level() == self.capacity() }

    /// Appends `value` at the tail. Gives the value back if the queue is full.
    pub fn push(&mut self, value: V) -> Result<(), V> {
        if self.is_full() {
            return Err(value);
        }
        let slot = self.wptr & self.addr_mask();
        self.mem[slot] = Some(value);
        self.wptr = (self.wptr + 1) & self.ptr_mask();
        Ok(())
    }

    /// Removes the head.
    pub fn pop(&mut self) -> Option<V> {
        if self.is_empty() {
            return None;
        }
        let slot = self.rptr & self.addr_mask();
        self.rptr = (self.rptr + 1) & self.ptr_mask();
        self.mem[slot].take()
    }

    /// The head, if any.
    pub fn front(&self) -> Option<&V> {
        if self.is_empty() {
            return None;
        }
        self.mem[self.rptr & self.addr_mask()].as_ref()
    }

    /// Drops every queued value.
    pub fn clear(&mut self) {
        self.mem.iter_mut().for_each(|slot| *slot = None);
        self.wptr = 0;
        self.rptr = 0;
    }

    fn addr_mask(&self) -> usize { self.capacity() - 1 }

    fn ptr_mask(&self) -> usize { (self.capacity() << 1) - 1 }
}

/// FIFO stage between two valid/ready channels.
///
/// Ready depends only on the fill level and the head is offered as soon as it is written, so a value takes
/// one cycle to cross an empty FIFO.
#[derive(Debug, Clone)]
pub struct Fifo<V> {
    queue: Queue<V>,
}

impl<V> Fifo<V> {
    /// Creates a FIFO with `depth` slots.
    pub fn new(depth: usize) -> Result<Self, ConfigError> { Ok(Self { queue: Queue::new(depth)? }) }

    /// Fill level.
    pub fn level(&self) -> usize { self.queue.level() }

    /// Underlying queue.
    pub fn queue(&self) -> &Queue<V> { &self.queue }
}

impl<V: Signal> Module for Fifo<V> {
    type I = VrChannel<V>;
    type O = VrChannel<V>;

    fn comb(&self, _ingress_fwd: &Valid<V>, _egress_bwd: &Ready) -> (Valid<V>, Ready) {
        (self.queue.front().cloned().into(), Ready::new(!self.queue.is_full()))
    }

    fn tick(&mut self, ingress_fwd: &Valid<V>, egress_bwd: &Ready) {
        let (egress_fwd, ingress_bwd) = self.comb(ingress_fwd, egress_bwd);
        let enq = ingress_fwd.fire(&ingress_bwd).cloned();
        if egress_fwd.fire(egress_bwd).is_some() {
            self.queue.pop();
        }
        if let Some(value) = enq {
            // Ready is deasserted when full.
            let pushed = self.queue.push(value);
            debug_assert!(pushed.is_ok(), "fifo: enqueue while full");
        }
    }

    fn reset(&mut self) { self.queue.clear(); }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn capacity_must_be_power_of_two() {
        assert!(Queue::<u8>::new(256).is_ok());
        assert_eq!(
            Queue::<u8>::new(100).unwrap_err(),
            ConfigError::NotPowerOfTwo { what: "queue capacity", value: 100 }
        );
        assert!(Queue::<u8>::new(0).is_err());
    }

    #[test]
    fn push_rejects_when_full() {
        let mut queue = Queue::new(4).unwrap();
        for i in 0..4u8 {
            assert_eq!(queue.push(i), Ok(()));
        }
        assert!(queue.is_full());
        assert_eq!(queue.level(), 4);
        assert_eq!(queue.push(9), Err(9));
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.push(9), Ok(()));
        assert_eq!(queue.level(), 4);
    }

    #[test]
    fn pop_signals_empty() {
        let mut queue = Queue::<u8>::new(2).unwrap();
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.front(), None);
        queue.push(5).unwrap();
        assert_eq!(queue.front(), Some(&5));
        assert_eq!(queue.pop(), Some(5));
        assert!(queue.is_empty());
    }

    #[test]
    fn random_operations_preserve_order() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut queue = Queue::new(8).unwrap();
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u32;

        for _ in 0..10_000 {
            if rng.random_bool(0.55) {
                let pushed = queue.push(next).is_ok();
                assert_eq!(pushed, model.len() < 8);
                if pushed {
                    model.push_back(next);
                }
                next += 1;
            } else {
                assert_eq!(queue.pop(), model.pop_front());
            }
            assert_eq!(queue.level(), model.len());
        }
    }

    #[test]
    fn fifo_absorbs_stalled_consumer() {
        let mut tb = Testbench::new(Fifo::new(4).unwrap());

        // The consumer is stalled for 10 cycles: the FIFO takes 4 values, then withholds ready.
        let mut accepted = 0;
        for _ in 0..10 {
            if tb.cycle(Valid::valid(accepted), false).unwrap().accepted {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 4);
        assert_eq!(tb.module().level(), 4);

        let outputs = tb.run(4..10, 10, 100, |_| true).unwrap();
        assert_eq!(outputs, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn full_fifo_refuses_while_draining() {
        let mut tb = Testbench::new(Fifo::new(2).unwrap());
        assert!(tb.cycle(Valid::valid(0u8), false).unwrap().accepted);
        assert!(tb.cycle(Valid::valid(1), false).unwrap().accepted);

        // Ready only looks at the fill level, not at the concurrent dequeue.
        let cycle = tb.cycle(Valid::valid(2), true).unwrap();
        assert!(!cycle.accepted);
        assert_eq!(cycle.emitted, Some(0));
        assert_eq!(tb.module().level(), 1);

        let cycle = tb.cycle(Valid::valid(2), true).unwrap();
        assert!(cycle.accepted);
        assert_eq!(cycle.emitted, Some(1));
        assert_eq!(tb.idle(4).unwrap(), [2]);
    }

    #[test]
    fn fifo_preserves_order_under_random_backpressure() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut tb = Testbench::new(Fifo::new(2).unwrap());
        let inputs = (0..500u16).collect::<Vec<_>>();
        let outputs = tb.run(inputs.clone(), inputs.len(), 10_000, |_| rng.random_bool(0.3)).unwrap();
        assert_eq!(outputs, inputs);
    }
}
