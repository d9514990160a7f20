// Licensed under the Apache-2.0 license

//! # I2C Hardware Abstraction — the Bus Signal Port
//!
//! This module defines the capability the engine consumes from the hardware:
//! the primitive signalling operations of a byte-oriented, single-master I2C
//! peripheral. The engine contains all protocol knowledge; an implementation
//! of [`BusSignalPort`] contains none. It only translates each method into
//! the corresponding register access.
//!
//! ## Command acceptance contract
//!
//! Every bus command (`emit_start`, `emit_restart`, `emit_stop`, `emit_ack`,
//! `arm_receive`, `write_byte`) is a single-cycle peripheral operation.
//! Implementations must guarantee that a command issued from the completion
//! handler is accepted immediately once the previously issued command has
//! settled — typically a handful of peripheral clock cycles, absorbed inside
//! the implementation. The engine itself never spins on hardware status.
//!
//! ## Interrupt wiring
//!
//! The port manages the completion-interrupt enable, priority and pending
//! flag, but not vector dispatch: binding the peripheral's interrupt vector
//! to [`I2cEngine::handle_interrupt`] is the runtime's job (for example a
//! `#[interrupt]` handler forwarding into a shared engine instance).
//!
//! [`I2cEngine::handle_interrupt`]: crate::i2c::engine::I2cEngine::handle_interrupt

/// Primitive hardware operations of a byte-oriented I2C master peripheral.
///
/// One completion event is raised per finished command: after a start,
/// restart, stop or acknowledge sequence completes, after a transmitted byte
/// has been clocked out (with the slave's acknowledge bit valid), and after
/// an armed receive has clocked a byte in.
pub trait BusSignalPort {
    /// Program the baud-rate generator reload value.
    fn set_baud_rate(&mut self, reload: u16);

    /// Enable or disable the peripheral's slew-rate control.
    fn set_slew_rate_control(&mut self, enabled: bool);

    /// Enable the bus module.
    fn enable(&mut self);

    /// Disable the bus module, releasing the pins.
    fn disable(&mut self);

    /// Begin a start condition.
    fn emit_start(&mut self);

    /// Begin a repeated-start condition.
    fn emit_restart(&mut self);

    /// Begin a stop condition.
    fn emit_stop(&mut self);

    /// Send an acknowledge bit for the last received byte.
    fn emit_ack(&mut self);

    /// Arm the receiver to clock in one byte.
    fn arm_receive(&mut self);

    /// Load one byte into the transmit register and clock it out.
    fn write_byte(&mut self, byte: u8);

    /// Read the last received byte out of the receive register.
    fn read_byte(&mut self) -> u8;

    /// Whether the slave acknowledged the last transmitted byte.
    fn slave_acknowledged(&self) -> bool;

    /// Whether the hardware has latched a bus collision.
    fn collision_detected(&self) -> bool;

    /// Clear the hardware collision latch.
    fn clear_collision(&mut self);

    /// Enable the bus-completion interrupt.
    fn enable_completion_irq(&mut self);

    /// Disable the bus-completion interrupt.
    fn disable_completion_irq(&mut self);

    /// Set the completion-interrupt priority (0..=7).
    fn set_irq_priority(&mut self, priority: u8);

    /// Current completion-interrupt priority.
    fn irq_priority(&self) -> u8;

    /// Clear a pending completion signal.
    fn clear_pending_irq(&mut self);
}
