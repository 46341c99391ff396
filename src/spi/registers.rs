//! SPI0 register map and the register access capability.
//!
//! Offsets are in bytes from the controller base. BCM2835 manual, section 10.5.

use bitflags::bitflags;

use crate::data_memory_barrier;

/// Physical base of SPI0 on the BCM2835 (ARM view of the peripheral bus).
pub const SPI0_BASE: usize = 0x2020_4000;

// BCM2835 manual Page 153
pub const CS: usize = 0x00;
// BCM2835 manual Page 155
pub const FIFO: usize = 0x04;
// BCM2835 manual Page 156
pub const CLK: usize = 0x08;
// BCM2835 manual Page 156
pub const DLEN: usize = 0x0C;
// BCM2835 manual Page 157
pub const LTOH: usize = 0x10;
// BCM2835 manual Page 158, DMA is not driven by this crate.
pub const DC: usize = 0x14;

bitflags! {
    /// Bits of the control/status (`CS`) register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Control: u32 {
        const LEN_LONG = 1 << 25;
        const DMA_LEN = 1 << 24;
        const CSPOL2 = 1 << 23;
        const CSPOL1 = 1 << 22;
        const CSPOL0 = 1 << 21;
        /// RX FIFO full.
        const RXF = 1 << 20;
        /// RX FIFO needs reading (3/4 full).
        const RXR = 1 << 19;
        /// TX FIFO can accept data.
        const TXD = 1 << 18;
        /// RX FIFO contains data.
        const RXD = 1 << 17;
        /// Transfer complete, TX FIFO empty.
        const DONE = 1 << 16;
        /// LoSSI (9 bit) mode.
        const LEN = 1 << 13;
        const REN = 1 << 12;
        const ADCS = 1 << 11;
        const INTR = 1 << 10;
        const INTD = 1 << 9;
        const DMAEN = 1 << 8;
        /// Transfer active.
        const TA = 1 << 7;
        const CSPOL = 1 << 6;
        const CLEAR_RX = 1 << 5;
        const CLEAR_TX = 1 << 4;
        const CPOL = 1 << 3;
        const CPHA = 1 << 2;
        const CS_10 = 1 << 1;
        const CS_01 = 1 << 0;
    }
}

impl Control {
    /// Read-only status bits, never part of a programmed control word.
    pub const STATUS: Self = Self::RXF
        .union(Self::RXR)
        .union(Self::TXD)
        .union(Self::RXD)
        .union(Self::DONE);

    /// Per-line chip select polarity bit for `chip_select` (0..=2).
    pub const fn cspol(chip_select: u8) -> Self {
        Self::from_bits_retain(Self::CSPOL0.bits() << chip_select as u32)
    }
}

/// Word-level access to the controller's registers.
///
/// Everything above this trait talks to the hardware only through it, so the engine can run
/// against a simulated register file.
pub trait Registers {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);

    fn control(&self) -> Control {
        Control::from_bits_retain(self.read(CS))
    }

    fn set_control(&self, control: Control) {
        self.write(CS, control.bits());
    }
}

/// Memory-mapped registers of a real controller.
pub struct Mmio {
    base: *mut u32,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must point to the register block of an SPI controller, stay mapped for as long as
    /// the value lives, and not be accessed through anything else in the meantime.
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    /// SPI0 at its physical address, for identity-mapped kernels.
    ///
    /// # Safety
    ///
    /// Same as [`Mmio::new`].
    pub const unsafe fn spi0() -> Self {
        // Safety: Forwarded to the caller.
        unsafe { Self::new(SPI0_BASE as *mut u32) }
    }
}

// Safety: The pointer is only used for volatile register accesses, and the caller of `new`
// guaranteed exclusive ownership of the register block.
unsafe impl Send for Mmio {}
// Safety: Same as above; concurrent accesses are serialized by the controller's lock.
unsafe impl Sync for Mmio {}

impl Registers for Mmio {
    fn read(&self, offset: usize) -> u32 {
        data_memory_barrier();
        // Safety: Address valid per the contract of `new`, data memory barrier used.
        unsafe { self.base.byte_add(offset).read_volatile() }
    }

    fn write(&self, offset: usize, value: u32) {
        data_memory_barrier();
        // Safety: As above.
        unsafe { self.base.byte_add(offset).write_volatile(value) };
    }
}
