use crate::clock::{Clock, TickCounter};
use crate::config::BusConfig;
use crate::error::{BusError, ErrorClass};
use crate::signal::{Signal, Wire};

/// Lines of a custom function unit port.
#[derive(Debug, Clone, Default)]
pub struct CfuSignals<S = Wire> {
    /// Reset line.
    pub reset: S,
    /// Request valid.
    pub req_valid: S,
    /// Unit ready to accept a request.
    pub req_ready: S,
    /// Function selector, ten bits.
    pub req_func_id: S,
    /// First operand.
    pub req_data0: S,
    /// Second operand.
    pub req_data1: S,
    /// Response valid.
    pub resp_valid: S,
    /// Requester ready for the response.
    pub resp_ready: S,
    /// Response payload.
    pub resp_data: S,
}

/// Outcome code of one [`Cfu::execute`] call, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(i32)]
pub enum CfuStatus {
    /// The unit answered.
    #[default]
    Ok = 0,
    /// The call failed for a reason other than a timeout.
    Fail = 1,
    /// A handshake wait ran out of cycles.
    Timeout = 2,
}

impl CfuStatus {
    /// Status reported for `result`.
    #[must_use]
    pub const fn of<T>(result: &Result<T, BusError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) => match err.class() {
                ErrorClass::Timeout => Self::Timeout,
                ErrorClass::Protocol | ErrorClass::Transport => Self::Fail,
            },
        }
    }

    /// Code written to the host's status slot.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Value and status of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CfuResult {
    /// Response payload; zero when the call failed.
    pub value: u64,
    /// Outcome code.
    pub status: CfuStatus,
}

impl From<Result<u64, BusError>> for CfuResult {
    fn from(result: Result<u64, BusError>) -> Self {
        let status = CfuStatus::of(&result);
        Self {
            value: result.unwrap_or(0),
            status,
        }
    }
}

/// Requester side of a custom function unit port.
///
/// The unit has no error line: a response that arrives is always a success.
#[derive(Debug)]
pub struct Cfu<S = Wire> {
    clock: Clock<S>,
    signals: CfuSignals<S>,
    config: BusConfig,
}

impl<S: Signal> Cfu<S> {
    /// Binds the adapter to its clock and lines.
    pub const fn new(clock: Clock<S>, signals: CfuSignals<S>, config: BusConfig) -> Self {
        Self {
            clock,
            signals,
            config,
        }
    }

    /// Lines driven by the adapter.
    #[must_use]
    pub const fn signals(&self) -> &CfuSignals<S> {
        &self.signals
    }

    /// Clock driving the unit.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    /// Shares `counter` with this port.
    pub fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    /// Applies `steps` clock edges.
    pub fn tick(&self, count: bool, steps: u64) {
        self.clock.tick(count, steps);
    }

    /// Runs the reset sequence.
    pub fn reset(&self) {
        self.clock
            .pulse_reset(&self.signals.reset, self.config.reset);
    }

    /// Issues one instruction and returns the unit's response.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Timeout`] when the unit never accepts the request
    /// or never responds. `req_valid` is dropped either way.
    pub fn execute(&self, function_id: u32, data0: u32, data1: u32) -> Result<u64, BusError> {
        let s = &self.signals;
        let timeout = self.config.timeout_cycles;
        tracing::trace!(function_id, data0, data1, "cfu execute");
        s.req_func_id.set(u64::from(function_id));
        s.req_data0.set(u64::from(data0));
        s.req_data1.set(u64::from(data1));
        s.req_valid.set(1);
        s.resp_ready.set(1);
        self.clock.evaluate();

        let result = self.clock.wait_high(&s.req_ready, timeout).and_then(|()| {
            if s.resp_valid.is_high() {
                let data = s.resp_data.get();
                self.clock.tick(true, 1);
                Ok(data)
            } else {
                self.clock
                    .wait_for(&s.resp_valid, 1, timeout)
                    .map(|_| s.resp_data.get())
            }
        });

        s.req_valid.set(0);
        self.clock.evaluate();
        if result.is_ok() {
            self.clock.tick(true, 1);
        }
        result
    }
}
