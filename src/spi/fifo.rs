//! Moving bytes between the in-flight transfer's buffers and the controller FIFO.
//!
//! Everything here runs with the controller lock held, either from the interrupt handler or
//! while the worker starts a transfer.

use alloc::vec::Vec;

use super::{
    registers::{Control, Registers, FIFO},
    Error,
};

/// Depth of the hardware FIFOs, in entries.
pub const FIFO_DEPTH: usize = 16;
/// Entries read (and then written) per RX-ready interrupt. The RXR flag is raised at 3/4 full,
/// so this never overruns the RX FIFO while the DONE interrupt is still pending.
pub const RX_THRESHOLD: usize = 12;

/// Read position in a transmit buffer.
#[derive(Debug)]
pub struct TxCursor {
    buf: Vec<u8>,
    pos: usize,
}

impl TxCursor {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.buf.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }

    /// Two buffer bytes as one LoSSI FIFO entry.
    fn next_u16(&mut self) -> u16 {
        let lo = self.next_byte();
        let hi = self.next_byte();
        u16::from_le_bytes([lo, hi])
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Write position in a receive buffer. Bytes past the end of the buffer are dropped.
#[derive(Debug)]
pub struct RxCursor {
    buf: Vec<u8>,
    pos: usize,
}

impl RxCursor {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    fn push(&mut self, byte: u8) {
        if let Some(slot) = self.buf.get_mut(self.pos) {
            *slot = byte;
            self.pos += 1;
        }
    }

    #[cfg(test)]
    pub fn filled(&self) -> usize {
        self.pos
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// The transfer currently owned by the hardware.
#[derive(Debug, Default)]
pub struct InFlight {
    pub tx: Option<TxCursor>,
    pub rx: Option<RxCursor>,
    /// Bytes not yet written to the FIFO.
    pub remaining: usize,
    /// Set when the pump had to abandon the transfer.
    pub fault: Option<Error>,
}

impl InFlight {
    pub fn new(tx: Option<Vec<u8>>, rx: Option<Vec<u8>>, len: usize) -> Self {
        Self {
            tx: tx.map(TxCursor::new),
            rx: rx.map(RxCursor::new),
            remaining: len,
            fault: None,
        }
    }
}

/// Read `len` entries from the FIFO into the receive buffer, or discard them if there is none.
pub fn read_burst<R: Registers>(regs: &R, xfer: &mut InFlight, len: usize) {
    for _ in 0..len {
        let byte = regs.read(FIFO) as u8;
        if let Some(rx) = xfer.rx.as_mut() {
            rx.push(byte);
        }
    }
}

/// Write up to `len` bytes of the transfer into the FIFO, zero filled when there is no transmit
/// buffer.
pub fn write_burst<R: Registers>(regs: &R, xfer: &mut InFlight, len: usize) {
    let mut len = len.min(xfer.remaining);

    if regs.control().contains(Control::LEN) {
        if len % 2 != 0 {
            error!("write_burst: length must be even in LoSSI mode, skipping");
            xfer.remaining = 0;
            xfer.fault = Some(Error::Parameter);
            return;
        }
        while len > 0 {
            let val = xfer.tx.as_mut().map_or(0, TxCursor::next_u16);
            regs.write(FIFO, u32::from(val));
            xfer.remaining -= 2;
            len -= 2;
        }
        return;
    }

    for _ in 0..len {
        let byte = xfer.tx.as_mut().map_or(0, TxCursor::next_byte);
        regs.write(FIFO, u32::from(byte));
        xfer.remaining -= 1;
    }
}
