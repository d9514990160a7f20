// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C master engine.
//!
//! This module implements a single-master I2C/SMBus protocol engine that
//! drives the bus entirely from hardware completion events. Callers submit a
//! request (write N bytes to a device register, or read N bytes from one) and
//! poll for the outcome; the engine never blocks the foreground context
//! waiting for bus activity.
//!
//! The hardware is reached through the [`BusSignalPort`] trait, which models
//! the primitive signalling operations of a byte-oriented I2C peripheral
//! (start/restart/stop generation, single-byte transmit/receive, acknowledge
//! and collision status). Any peripheral that can express those primitives
//! can host the engine.

pub mod buffer;
pub mod common;
pub mod engine;
pub mod traits;

pub use buffer::TransactionBuffer;
pub use common::{Error, I2cConfig, I2cConfigBuilder};
pub use engine::{EngineState, I2cEngine};
pub use traits::BusSignalPort;
