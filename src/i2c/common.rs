// Licensed under the Apache-2.0 license

//! Common types for the I2C master engine.
//!
//! This module provides shared definitions for error handling and engine
//! configuration used across the I2C driver implementation.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

/// Errors reported by the I2C engine.
///
/// A single taxonomy covers admission-time rejections (`Busy`, `Disabled`,
/// `InFaultState`, the buffer-overflow pair), runtime protocol faults latched
/// by the completion handler (`SlaveNack`, `CollisionDetected`, `Internal`)
/// and result-retrieval failures (`NothingReceived`, `RxBufferOverflow`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The completion handler fired in a state it cannot make progress from.
    Internal,
    /// An operation was attempted while a fault is latched.
    InFaultState,
    /// A transaction is already in flight.
    Busy,
    /// The encoded request does not fit the transaction buffer.
    TxBufferOverflow,
    /// The requested read length does not fit the transaction buffer, or the
    /// retrieval destination is shorter than the captured data.
    RxBufferOverflow,
    /// The slave did not acknowledge an address or data byte.
    SlaveNack,
    /// No bytes were captured by the last transaction.
    NothingReceived,
    /// The hardware reported loss of bus ownership.
    CollisionDetected,
    /// The engine is disabled.
    Disabled,
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::SlaveNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::CollisionDetected => ErrorKind::ArbitrationLoss,
            Error::TxBufferOverflow | Error::RxBufferOverflow => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

/// Static configuration for the I2C engine.
///
/// Captured at construction and retained so that [`enable`] can reprogram the
/// peripheral after a [`disable`] without the caller restating it.
///
/// [`enable`]: crate::i2c::engine::I2cEngine::enable
/// [`disable`]: crate::i2c::engine::I2cEngine::disable
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cConfig {
    /// Baud-rate generator reload value, written verbatim to the peripheral.
    pub baud_rate_reload: u16,
    /// Whether the peripheral's slew-rate control is enabled.
    pub slew_rate_control: bool,
    /// Completion-interrupt priority, 0..=7. Out-of-range values clamp to 1.
    pub irq_priority: u8,
    /// Fault-persistence policy: when true, any fault holds the engine in the
    /// faulted state until an explicit reset; when false, the engine emits a
    /// stop condition and drains back to idle while the fault kind remains
    /// readable.
    pub stays_faulted: bool,
}

pub struct I2cConfigBuilder {
    baud_rate_reload: u16,
    slew_rate_control: bool,
    irq_priority: u8,
    stays_faulted: bool,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            baud_rate_reload: 0,
            slew_rate_control: true,
            irq_priority: 1,
            stays_faulted: true,
        }
    }
    #[must_use]
    pub fn baud_rate_reload(mut self, reload: u16) -> Self {
        self.baud_rate_reload = reload;
        self
    }
    #[must_use]
    pub fn slew_rate_control(mut self, enabled: bool) -> Self {
        self.slew_rate_control = enabled;
        self
    }
    #[must_use]
    pub fn irq_priority(mut self, priority: u8) -> Self {
        self.irq_priority = priority;
        self
    }
    #[must_use]
    pub fn stays_faulted(mut self, enabled: bool) -> Self {
        self.stays_faulted = enabled;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            baud_rate_reload: self.baud_rate_reload,
            slew_rate_control: self.slew_rate_control,
            irq_priority: self.irq_priority,
            stays_faulted: self.stays_faulted,
        }
    }
}
