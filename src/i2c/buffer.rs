// Licensed under the Apache-2.0 license

//! Fixed-capacity transaction buffer.
//!
//! A single bounded byte arena does double duty as transmit and receive
//! storage for the one transaction that can be in flight. The outgoing frame
//! (encoded address, register, payload) is written at admission time; during
//! the receive phase of a register read the same storage is overwritten from
//! index 0 with the bytes clocked in off the bus.
//!
//! Invariant: `0 <= cursor <= len <= CAP` while a transaction is active.
//! Byte 0 always holds the encoded 8-bit address: the 7-bit device address
//! shifted left by one, with bit 0 carrying the read/write direction.

use crate::i2c::common::Error;
use heapless::Vec;

/// Direction bit of the encoded address byte: 0 = write, 1 = read.
const DIRECTION_READ: u8 = 0x01;

/// Shared transmit/receive storage for one bus transaction.
pub struct TransactionBuffer<const CAP: usize> {
    data: Vec<u8, CAP>,
    cursor: usize,
}

impl<const CAP: usize> Default for TransactionBuffer<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> TransactionBuffer<CAP> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            cursor: 0,
        }
    }

    /// Encode a write request: address byte (write direction), register
    /// selector, then the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TxBufferOverflow`] when `2 + payload.len()` exceeds
    /// the buffer capacity. The buffer contents are unspecified after a
    /// failed encode; the engine latches a fault and requires a reset.
    pub fn encode_write(&mut self, address: u8, register: u8, payload: &[u8]) -> Result<(), Error> {
        self.encode_header(address, register)?;
        self.data
            .extend_from_slice(payload)
            .map_err(|()| Error::TxBufferOverflow)
    }

    /// Encode the write-phase header of a read request: address byte (write
    /// direction) and register selector only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TxBufferOverflow`] when the capacity is below 2.
    pub fn encode_read_header(&mut self, address: u8, register: u8) -> Result<(), Error> {
        self.encode_header(address, register)
    }

    fn encode_header(&mut self, address: u8, register: u8) -> Result<(), Error> {
        self.data.clear();
        self.cursor = 0;
        self.data
            .push((address << 1) & 0xfe)
            .map_err(|_| Error::TxBufferOverflow)?;
        self.data.push(register).map_err(|_| Error::TxBufferOverflow)
    }

    /// Next outgoing byte, advancing the cursor. `None` once the frame is
    /// exhausted.
    pub fn take_next(&mut self) -> Option<u8> {
        let byte = self.data.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    /// Store one received byte at the cursor, advancing it. Received bytes
    /// overwrite the now-stale outgoing frame starting at index 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the byte falls outside the buffer
    /// capacity. Admission bounds the expected receive count, so this only
    /// fires on a protocol-logic defect.
    pub fn store_received(&mut self, byte: u8) -> Result<(), Error> {
        match self.data.get_mut(self.cursor) {
            Some(slot) => *slot = byte,
            None => self.data.push(byte).map_err(|_| Error::Internal)?,
        }
        self.cursor += 1;
        Ok(())
    }

    /// Pivot the buffer for the read phase of a register read: rewind the
    /// cursor, flip the direction bit on the address byte and shrink the
    /// frame to the address byte alone, so only the re-addressed header is
    /// resent after the restart.
    pub fn pivot_to_read(&mut self) {
        self.cursor = 0;
        if let Some(address) = self.data.get_mut(0) {
            *address |= DIRECTION_READ;
        }
        self.data.truncate(1);
    }

    /// Whether the encoded address byte already carries the read direction.
    #[must_use]
    pub fn direction_is_read(&self) -> bool {
        self.data
            .first()
            .is_some_and(|address| address & DIRECTION_READ != 0)
    }

    /// Rewind the cursor to index 0 without touching the frame.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Next unprocessed index.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of valid bytes for the current phase.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes processed so far: after a completed read transaction, the bytes
    /// captured off the bus in receipt order.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        self.data.get(..self.cursor).unwrap_or(&[])
    }

    /// Drop all contents and rewind.
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }
}
