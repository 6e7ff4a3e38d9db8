use super::TargetBus;
use crate::clock::{Clock, TickCounter};
use crate::config::BusConfig;
use crate::error::{BusError, Unsupported};
use crate::protocol::AccessWidth;
use crate::signal::{Signal, Wire};

/// Lines of an APB3 completer, seen from the requester side.
#[derive(Debug, Clone, Default)]
pub struct Apb3Signals<S = Wire> {
    /// Reset input of the completer.
    pub reset: S,
    /// Address.
    pub paddr: S,
    /// Select.
    pub psel: S,
    /// Enable, raised for the access phase.
    pub penable: S,
    /// Direction, high for writes.
    pub pwrite: S,
    /// Write data.
    pub pwdata: S,
    /// Completer ready.
    pub pready: S,
    /// Read data.
    pub prdata: S,
    /// Optional byte strobe, all lanes on writes and none on reads.
    pub pstrb: Option<S>,
}

/// APB3 requester driving a completer in the model.
///
/// Only four-byte transfers exist on this bus.
#[derive(Debug)]
pub struct Apb3<S = Wire> {
    clock: Clock<S>,
    signals: Apb3Signals<S>,
    config: BusConfig,
}

impl<S: Signal> Apb3<S> {
    /// Binds the adapter to its clock and lines.
    pub const fn new(clock: Clock<S>, signals: Apb3Signals<S>, config: BusConfig) -> Self {
        Self {
            clock,
            signals,
            config,
        }
    }

    /// Lines driven by the adapter.
    #[must_use]
    pub const fn signals(&self) -> &Apb3Signals<S> {
        &self.signals
    }

    /// Clock driving the completer.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    fn check_width(width: AccessWidth) -> Result<(), BusError> {
        if width == AccessWidth::DoubleWord {
            Ok(())
        } else {
            Err(Unsupported::AccessWidth(u64::from(width.bytes())).into())
        }
    }

    fn transfer(&self, address: u64, write: Option<u64>) -> Result<u64, BusError> {
        let s = &self.signals;
        s.psel.set(1);
        s.pwrite.set(u64::from(write.is_some()));
        s.paddr.set(address);
        if let Some(value) = write {
            s.pwdata.set(value);
        }
        if let Some(pstrb) = &s.pstrb {
            pstrb.set(if write.is_some() {
                AccessWidth::DoubleWord.strobe()
            } else {
                0
            });
        }
        self.clock.tick(true, 1);

        s.penable.set(1);
        // Zero-wait path assumes no combinational path from penable to pready.
        let data = if s.pready.is_high() {
            let data = s.prdata.get();
            self.clock.tick(true, 1);
            Ok(data)
        } else {
            self.clock
                .wait_for(&s.pready, 1, self.config.timeout_cycles)
                .map(|_| s.prdata.get())
        };

        s.psel.set(0);
        s.penable.set(0);
        match data {
            Ok(data) => {
                self.clock.tick(true, 1);
                Ok(data)
            }
            Err(err) => {
                self.clock.evaluate();
                Err(err)
            }
        }
    }
}

impl<S: Signal> TargetBus for Apb3<S> {
    fn name(&self) -> &'static str {
        "apb3"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn tick(&mut self, count: bool, steps: u64) {
        self.clock.tick(count, steps);
    }

    fn reset(&mut self) {
        self.clock
            .pulse_reset(&self.signals.reset, self.config.reset);
    }

    fn read(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        Self::check_width(width)?;
        tracing::trace!(address, "apb3 read");
        self.transfer(address, None)
    }

    fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
        Self::check_width(width)?;
        tracing::trace!(address, value, "apb3 write");
        self.transfer(address, Some(value)).map(|_| ())
    }
}
