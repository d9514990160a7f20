// Licensed under the Apache-2.0 license

//! Shared infrastructure for driver modules.
//!
//! Provides the logging seam used throughout the crate. Drivers take a
//! `Logger` type parameter so that diagnostic output can be routed to a UART,
//! a semihosting channel, or discarded entirely without touching driver code.

/// Minimal logging interface for driver diagnostics.
///
/// Implementations must be callable from interrupt context: no blocking, no
/// allocation. The engine only logs on fault paths, so a real implementation
/// sees at most one message per failed transaction.
pub trait Logger {
    /// Emit a single diagnostic message.
    fn log(&self, message: &str);
}

/// Logger that discards all messages. Compiles to nothing.
#[derive(Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _message: &str) {}
}
