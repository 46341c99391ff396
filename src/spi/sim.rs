//! A software model of the SPI0 controller, good enough to run the engine without hardware.
//!
//! TX entries are shifted one at a time into the RX FIFO (MOSI wired to MISO), status bits are
//! derived from FIFO occupancy, and the interrupt line follows the enabled conditions.

use core::{
    cell::RefCell,
    future::Future,
    pin::pin,
    task::{Context, Poll, Waker},
};
use std::collections::VecDeque;

use alloc::vec::Vec;

use super::{
    fifo::{FIFO_DEPTH, RX_THRESHOLD},
    registers::{Control, Registers, CS, FIFO},
    Spi,
};

#[derive(Default)]
struct Hardware {
    control: Control,
    other: [u32; 6],
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    fifo_writes: Vec<u32>,
    writes: Vec<(usize, u32)>,
    stalled: bool,
}

impl Hardware {
    fn status(&self) -> Control {
        let mut status = self.control;
        if self.control.contains(Control::TA) && self.tx.is_empty() {
            status |= Control::DONE;
        }
        if !self.rx.is_empty() {
            status |= Control::RXD;
        }
        if self.rx.len() >= RX_THRESHOLD {
            status |= Control::RXR;
        }
        if self.rx.len() >= FIFO_DEPTH {
            status |= Control::RXF;
        }
        if self.tx.len() < FIFO_DEPTH {
            status |= Control::TXD;
        }
        status
    }
}

#[derive(Default)]
pub struct SimRegisters {
    hw: RefCell<Hardware>,
}

impl SimRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries accepted by the TX FIFO, in order.
    pub fn fifo_writes(&self) -> Vec<u32> {
        self.hw.borrow().fifo_writes.clone()
    }

    /// Every register write, FIFO included.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.hw.borrow().writes.clone()
    }

    pub fn push_rx(&self, bytes: &[u8]) {
        self.hw
            .borrow_mut()
            .rx
            .extend(bytes.iter().map(|&b| u32::from(b)));
    }

    pub fn rx_level(&self) -> usize {
        self.hw.borrow().rx.len()
    }

    /// A stalled controller neither shifts data nor raises interrupts.
    pub fn stall(&self, stalled: bool) {
        self.hw.borrow_mut().stalled = stalled;
    }

    pub fn irq_pending(&self) -> bool {
        let hw = self.hw.borrow();
        if hw.stalled {
            return false;
        }
        let status = hw.status();
        (status.contains(Control::INTD) && status.contains(Control::DONE))
            || (status.contains(Control::INTR) && status.contains(Control::RXR))
    }

    /// Clock one FIFO entry out and back in. Returns whether anything moved.
    pub fn shift(&self) -> bool {
        let mut hw = self.hw.borrow_mut();
        if hw.stalled || !hw.control.contains(Control::TA) || hw.rx.len() >= FIFO_DEPTH {
            return false;
        }
        match hw.tx.pop_front() {
            Some(entry) => {
                hw.rx.push_back(entry);
                true
            }
            None => false,
        }
    }
}

impl Registers for SimRegisters {
    fn read(&self, offset: usize) -> u32 {
        let mut hw = self.hw.borrow_mut();
        match offset {
            CS => hw.status().bits(),
            FIFO => hw.rx.pop_front().unwrap_or(0),
            _ => hw.other[offset / 4],
        }
    }

    fn write(&self, offset: usize, value: u32) {
        let mut hw = self.hw.borrow_mut();
        hw.writes.push((offset, value));
        match offset {
            CS => {
                let control = Control::from_bits_retain(value);
                if control.contains(Control::CLEAR_TX) {
                    hw.tx.clear();
                }
                if control.contains(Control::CLEAR_RX) {
                    hw.rx.clear();
                }
                hw.control = control - Control::STATUS - Control::CLEAR_RX - Control::CLEAR_TX;
            }
            FIFO => {
                if hw.tx.len() < FIFO_DEPTH {
                    hw.tx.push_back(value);
                    hw.fifo_writes.push(value);
                }
            }
            _ => hw.other[offset / 4] = value,
        }
    }
}

/// Poll `fut` to completion, playing the part of the hardware between polls.
pub fn drive<F: Future>(spi: &Spi<SimRegisters>, fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        loop {
            if spi.regs.irq_pending() {
                spi.on_interrupt();
            } else if !spi.regs.shift() {
                break;
            }
        }
        std::thread::yield_now();
    }
}
