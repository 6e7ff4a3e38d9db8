use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::config::ResetConfig;
use crate::error::BusError;
use crate::signal::{Signal, Wire};

/// Clock edges applied by bus handlers since the last driver synchronization.
///
/// Clones share one count; every bus of an agent holds a clone.
#[derive(Debug, Clone, Default)]
pub struct TickCounter(Rc<Cell<u64>>);

impl TickCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Adds `steps` edges.
    pub fn add(&self, steps: u64) {
        self.0.set(self.0.get().saturating_add(steps));
    }

    /// Overwrites the count.
    pub fn set(&self, value: u64) {
        self.0.set(value);
    }

    /// Whether both handles share one count.
    #[must_use]
    pub fn same_counter(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// The external model's evaluation entry point.
#[derive(Clone)]
pub struct Evaluator(Rc<dyn Fn()>);

impl Evaluator {
    /// Wraps the host's evaluation callback.
    pub fn new(evaluate: impl Fn() + 'static) -> Self {
        Self(Rc::new(evaluate))
    }

    /// Evaluator for models that settle on their own.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Propagates pending signal writes through the model.
    pub fn evaluate(&self) {
        (self.0)();
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Evaluator")
    }
}

/// Clock line, evaluator and tick counter of one bus.
#[derive(Debug)]
pub struct Clock<S = Wire> {
    line: S,
    evaluator: Evaluator,
    counter: TickCounter,
}

impl<S: Signal> Clock<S> {
    /// Binds a clock line to the model's evaluator with a private counter.
    pub fn new(line: S, evaluator: Evaluator) -> Self {
        Self {
            line,
            evaluator,
            counter: TickCounter::new(),
        }
    }

    /// Counter edges are accumulated into.
    #[must_use]
    pub const fn counter(&self) -> &TickCounter {
        &self.counter
    }

    /// Shares `counter` with this clock, replacing the private one.
    pub fn attach_counter(&mut self, counter: TickCounter) {
        self.counter = counter;
    }

    /// Evaluates the model without moving the clock.
    pub fn evaluate(&self) {
        self.evaluator.evaluate();
    }

    /// Drives `line` and evaluates the model.
    pub fn drive<T: Signal + ?Sized>(&self, line: &T, value: u64) {
        line.set(value);
        self.evaluate();
    }

    /// Rising half of an edge.
    pub fn rise(&self) {
        self.drive(&self.line, 1);
    }

    /// Falling half of an edge.
    pub fn fall(&self) {
        self.drive(&self.line, 0);
    }

    /// Records `steps` edges applied outside [`Clock::tick`].
    pub fn count(&self, steps: u64) {
        self.counter.add(steps);
    }

    /// Applies `steps` full clock edges, counting them when `count` is set.
    pub fn tick(&self, count: bool, steps: u64) {
        for _ in 0..steps {
            self.rise();
            self.fall();
        }
        if count {
            self.count(steps);
        }
    }

    /// Waits for `line` to go high unless it already is.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Timeout`] when `line` stays low for `timeout` edges.
    pub fn wait_high<T: Signal + ?Sized>(&self, line: &T, timeout: u64) -> Result<(), BusError> {
        if line.is_high() {
            return Ok(());
        }
        self.wait_for(line, 1, timeout).map(|_| ())
    }

    /// Asserts `line`, holds it, releases it and lets the model settle.
    pub fn pulse_reset<T: Signal + ?Sized>(&self, line: &T, reset: ResetConfig) {
        line.set(reset.active.asserted());
        self.tick(true, reset.assert_cycles);
        line.set(reset.active.released());
        self.tick(true, reset.release_cycles);
    }

    /// Ticks until `line` reads `expected`, giving up after `timeout` edges.
    ///
    /// Always ticks at least once, even if `line` already holds `expected`.
    /// Returns the number of edges applied.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Timeout`] when `line` still differs from
    /// `expected` after `timeout` edges.
    pub fn wait_for<T: Signal + ?Sized>(
        &self,
        line: &T,
        expected: u64,
        timeout: u64,
    ) -> Result<u64, BusError> {
        let mut cycles = 0;
        while cycles < timeout {
            self.tick(true, 1);
            cycles += 1;
            if line.get() == expected {
                return Ok(cycles);
            }
        }
        Err(BusError::Timeout { cycles })
    }
}
