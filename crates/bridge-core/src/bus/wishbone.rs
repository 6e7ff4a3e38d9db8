use super::{InitiatorBus, MemoryAccess, TargetBus};
use crate::clock::{Clock, TickCounter};
use crate::config::WishboneConfig;
use crate::error::{BusError, Violation};
use crate::protocol::AccessWidth;
use crate::signal::{Signal, Wire};

/// Lines of a Wishbone classic interface.
#[derive(Debug, Clone, Default)]
pub struct WishboneSignals<S = Wire> {
    /// Reset line.
    pub rst: S,
    /// Word address, already shifted by the undecoded lines.
    pub addr: S,
    /// Data towards the requester.
    pub rd_dat: S,
    /// Data towards the completer.
    pub wr_dat: S,
    /// Write enable.
    pub we: S,
    /// Byte select.
    pub sel: S,
    /// Bus cycle in progress.
    pub cyc: S,
    /// Strobe.
    pub stb: S,
    /// Acknowledge.
    pub ack: S,
    /// Pipeline stall, driven only when serving the model's requests.
    pub stall: Option<S>,
}

/// Wishbone requester driving a completer in the model.
#[derive(Debug)]
pub struct WishboneTarget<S = Wire> {
    clock: Clock<S>,
    signals: WishboneSignals<S>,
    config: WishboneConfig,
}

impl<S: Signal> WishboneTarget<S> {
    /// Binds the adapter to its clock and lines.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unsupported`] for an address line count or
    /// granularity the bus cannot have.
    pub fn new(
        clock: Clock<S>,
        signals: WishboneSignals<S>,
        config: WishboneConfig,
    ) -> Result<Self, BusError> {
        config.addressing.validate()?;
        Ok(Self {
            clock,
            signals,
            config,
        })
    }

    /// Lines driven by the adapter.
    #[must_use]
    pub const fn signals(&self) -> &WishboneSignals<S> {
        &self.signals
    }

    /// Clock driving the completer.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    fn check_granularity(&self, width: AccessWidth) -> Result<(), BusError> {
        let granularity = self.config.addressing.granularity;
        if width.bytes() < granularity {
            return Err(Violation::BelowGranularity {
                width: width.bytes(),
                granularity,
            }
            .into());
        }
        Ok(())
    }

    fn cycle(&self, width: AccessWidth, address: u64, write: Option<u64>) -> Result<u64, BusError> {
        let s = &self.signals;
        let timeout = self.config.bus.timeout_cycles;
        s.we.set(u64::from(write.is_some()));
        s.sel.set(width.strobe());
        s.cyc.set(1);
        s.stb.set(1);
        s.addr.set(address >> self.config.addressing.shift());
        if let Some(value) = write {
            s.wr_dat.set(value);
        }

        let acked = self.clock.wait_for(&s.ack, 1, timeout);
        let data = s.rd_dat.get();

        s.stb.set(0);
        s.cyc.set(0);
        s.we.set(0);
        s.sel.set(0);
        if let Err(err) = acked {
            self.clock.evaluate();
            return Err(err);
        }

        self.clock.wait_for(&s.ack, 0, timeout)?;
        if self.config.extra_wait_tick {
            self.clock.tick(true, 1);
        }
        Ok(data)
    }
}

impl<S: Signal> TargetBus for WishboneTarget<S> {
    fn name(&self) -> &'static str {
        "wishbone"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn tick(&mut self, count: bool, steps: u64) {
        self.clock.tick(count, steps);
    }

    fn reset(&mut self) {
        self.clock
            .pulse_reset(&self.signals.rst, self.config.bus.reset);
    }

    fn read(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        self.check_granularity(width)?;
        tracing::trace!(address, width = width.bytes(), "wishbone read");
        self.cycle(width, address, None)
    }

    fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
        self.check_granularity(width)?;
        tracing::trace!(address, value, width = width.bytes(), "wishbone write");
        self.cycle(width, address, Some(value)).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Acknowledge,
}

/// Wishbone completer answering cycles the model starts.
///
/// Each access is acknowledged one edge after it is seen; the data word is
/// four bytes wide.
#[derive(Debug)]
pub struct WishboneInitiator<S = Wire> {
    clock: Clock<S>,
    signals: WishboneSignals<S>,
    config: WishboneConfig,
    read_phase: Phase,
    write_phase: Phase,
    data: u64,
}

impl<S: Signal> WishboneInitiator<S> {
    /// Binds the adapter to its clock and lines.
    ///
    /// # Errors
    ///
    /// Same as [`WishboneTarget::new`].
    pub fn new(
        clock: Clock<S>,
        signals: WishboneSignals<S>,
        config: WishboneConfig,
    ) -> Result<Self, BusError> {
        config.addressing.validate()?;
        Ok(Self {
            clock,
            signals,
            config,
            read_phase: Phase::Idle,
            write_phase: Phase::Idle,
            data: 0,
        })
    }

    /// Lines shared with the model.
    #[must_use]
    pub const fn signals(&self) -> &WishboneSignals<S> {
        &self.signals
    }

    /// Clock driving the model.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    fn byte_address(&self) -> u64 {
        self.signals.addr.get() << self.config.addressing.shift()
    }

    fn present(&self, stall: u64, ack: u64) {
        if let Some(line) = &self.signals.stall {
            line.set(stall);
        }
        self.signals.ack.set(ack);
    }

    fn selected(&self, write: bool) -> bool {
        let s = &self.signals;
        s.cyc.is_high() && s.stb.is_high() && s.we.is_high() == write
    }

    fn read_handler(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        match self.read_phase {
            Phase::Idle => {
                if self.selected(false) {
                    self.present(0, 0);
                    let (address, sel) = (self.byte_address(), self.signals.sel.get());
                    tracing::trace!(address, sel, "wishbone read from model");
                    self.data = self.read_word(memory, address, sel)?;
                    self.read_phase = Phase::Acknowledge;
                }
            }
            Phase::Acknowledge => {
                self.present(1, 1);
                self.signals.rd_dat.set(self.data);
                self.read_phase = Phase::Idle;
            }
        }
        Ok(())
    }

    fn write_handler(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        match self.write_phase {
            Phase::Idle => {
                if self.selected(true) {
                    self.present(0, 0);
                    let s = &self.signals;
                    let (address, data, sel) = (self.byte_address(), s.wr_dat.get(), s.sel.get());
                    tracing::trace!(address, data, sel, "wishbone write from model");
                    self.write_word(memory, address, data, sel)?;
                    self.write_phase = Phase::Acknowledge;
                }
            }
            Phase::Acknowledge => {
                self.present(1, 1);
                self.write_phase = Phase::Idle;
            }
        }
        Ok(())
    }

    fn step(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        self.signals.ack.set(0);
        self.read_handler(memory)?;
        self.write_handler(memory)?;
        self.clock.rise();
        self.clock.fall();
        Ok(())
    }
}

impl<S: Signal> InitiatorBus for WishboneInitiator<S> {
    fn name(&self) -> &'static str {
        "wishbone-initiator"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn bus_bytes(&self) -> u8 {
        AccessWidth::DoubleWord.bytes()
    }

    fn tick(
        &mut self,
        memory: &mut dyn MemoryAccess,
        count: bool,
        steps: u64,
    ) -> Result<(), BusError> {
        let mut applied = 0;
        let mut result = Ok(());
        while applied < steps {
            if let Err(err) = self.step(memory) {
                result = Err(err);
                break;
            }
            applied += 1;
        }
        self.present(1, 0);
        if count {
            self.clock.count(applied);
        }
        result
    }

    fn reset(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        self.read_phase = Phase::Idle;
        self.write_phase = Phase::Idle;
        let reset = self.config.bus.reset;
        self.signals.rst.set(reset.active.asserted());
        self.tick(memory, true, reset.assert_cycles)?;
        self.signals.rst.set(reset.active.released());
        self.tick(memory, true, reset.release_cycles)
    }

    fn has_address(&self) -> bool {
        self.signals.cyc.is_high() && self.signals.stb.is_high()
    }

    fn address(&self) -> u64 {
        self.signals.addr.get()
    }
}
