use super::AxiLiteSignals;
use crate::bus::{lane_strobe, TargetBus};
use crate::clock::{Clock, TickCounter};
use crate::config::AxiLiteConfig;
use crate::error::{BusError, Violation};
use crate::protocol::AccessWidth;
use crate::signal::{Signal, Wire};

/// AXI4-Lite manager driving a subordinate in the model.
///
/// Narrow accesses are placed in their byte lanes with a matching write
/// strobe; reads shift the addressed lanes back down.
#[derive(Debug)]
pub struct AxiLiteTarget<S = Wire> {
    clock: Clock<S>,
    signals: AxiLiteSignals<S>,
    config: AxiLiteConfig,
}

impl<S: Signal> AxiLiteTarget<S> {
    /// Binds the adapter to its clock and lines.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unsupported`] for a data bus other than 4 or 8
    /// bytes wide.
    pub fn new(
        clock: Clock<S>,
        signals: AxiLiteSignals<S>,
        config: AxiLiteConfig,
    ) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self {
            clock,
            signals,
            config,
        })
    }

    /// Lines driven by the adapter.
    #[must_use]
    pub const fn signals(&self) -> &AxiLiteSignals<S> {
        &self.signals
    }

    /// Clock driving the subordinate.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    fn lane_offset(&self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        let bus_bytes = u64::from(self.config.bus_bytes);
        let offset = address % bus_bytes;
        if offset + u64::from(width.bytes()) > bus_bytes {
            return Err(Violation::LaneOverflow {
                offset,
                width: width.bytes(),
            }
            .into());
        }
        Ok(offset)
    }

    /// Presents `value` on `channel` with `valid` raised until `ready` is seen.
    fn handshake_src(&self, ready: &S, valid: &S, channel: &S, value: u64) -> Result<(), BusError> {
        channel.set(value);
        self.clock.drive(valid, 1);
        self.clock
            .wait_high(ready, self.config.bus.timeout_cycles)?;
        self.clock.tick(true, 1);
        channel.set(0);
        self.clock.drive(valid, 0);
        Ok(())
    }

    fn run_write(&self, address: u64, data: u64, strobe: u64) -> Result<(), BusError> {
        let s = &self.signals;
        s.wstrb.set(strobe);
        self.handshake_src(&s.awready, &s.awvalid, &s.awaddr, address)?;
        self.handshake_src(&s.wready, &s.wvalid, &s.wdata, data)?;
        s.wstrb.set(0);

        self.clock.drive(&s.bready, 1);
        self.clock
            .wait_high(&s.bvalid, self.config.bus.timeout_cycles)?;
        if s.bresp.get() != 0 {
            tracing::warn!(address, bresp = s.bresp.get(), "axi-lite write response is not OKAY");
        }
        self.clock.tick(true, 1);
        self.clock.drive(&s.bready, 0);
        Ok(())
    }

    fn run_read(&self, address: u64) -> Result<u64, BusError> {
        let s = &self.signals;
        self.handshake_src(&s.arready, &s.arvalid, &s.araddr, address)?;

        self.clock.drive(&s.rready, 1);
        self.clock
            .wait_high(&s.rvalid, self.config.bus.timeout_cycles)?;
        let data = s.rdata.get();
        if s.rresp.get() != 0 {
            tracing::warn!(address, rresp = s.rresp.get(), "axi-lite read response is not OKAY");
        }
        self.clock.tick(true, 1);
        self.clock.drive(&s.rready, 0);
        Ok(data)
    }

    fn release(&self) {
        let s = &self.signals;
        for line in [&s.awvalid, &s.wvalid, &s.wstrb, &s.bready, &s.arvalid, &s.rready] {
            line.set(0);
        }
        self.clock.evaluate();
    }
}

impl<S: Signal> TargetBus for AxiLiteTarget<S> {
    fn name(&self) -> &'static str {
        "axi-lite"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn tick(&mut self, count: bool, steps: u64) {
        self.clock.tick(count, steps);
    }

    fn reset(&mut self) {
        self.clock
            .pulse_reset(&self.signals.reset, self.config.bus.reset);
    }

    fn read(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        let offset = self.lane_offset(width, address)?;
        tracing::trace!(address, width = width.bytes(), "axi-lite read");
        match self.run_read(address) {
            Ok(data) => Ok((data >> (offset * 8)) & width.mask()),
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
        let offset = self.lane_offset(width, address)?;
        tracing::trace!(address, value, width = width.bytes(), "axi-lite write");
        let data = (value & width.mask()) << (offset * 8);
        let result = self.run_write(address, data, lane_strobe(width, offset));
        if result.is_err() {
            self.release();
        }
        result
    }
}
