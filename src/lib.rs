//! Interrupt-driven driver for the BCM2708/BCM2835 SPI0 master controller.
//!
//! Clients queue [`spi::Message`]s; a single worker programs the controller for each transfer
//! and the interrupt handler keeps the 16-entry FIFO fed until the transfer is done.
//! See [`spi::Spi`] for the three execution contexts and how they share state.

// IMPORTANT: After the last register read of a peripheral inside of a function, a memory barrier
// must be issued.
// That is because the BCM2835 says that two reads to different peripherals can come out of order.
// This is not a concern for the writes, as they target different peripherals.
// See the BCM2835 manual section 1.3 for more details.
#![cfg_attr(not(test), no_std)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

// This must go first so the macros are visible to the other modules.
#[macro_use]
mod fmt;

pub mod spi;

pub use spi::{Config, Error, Message, ModeFlags, Peer, Spi, SpiDevice, Status, Transfer};

/// Perform a data memory barrier operation.
///
/// All explicit memory accesses occurring in program order before this operation
/// will be globally observed before any memory accesses occurring in program
/// order after this operation. This includes both read and write accesses.
///
/// See section B2.6.1 of the ARMv6 manual for more details. On other targets (host tests)
/// this degrades to a sequentially consistent fence.
#[inline]
pub fn data_memory_barrier() {
    #[cfg(target_arch = "arm")]
    // Safety: The operation is defined in the ARMv6 manual. See section B2.6.1 of the ARMv6 manual,
    // and section 3.2.22 of the ARM1176JZFS manual.
    unsafe {
        core::arch::asm!("mcr p15, 0, {}, c7, c10, 5", in(reg) 0, options(nostack, nomem, preserves_flags));
    };
    #[cfg(not(target_arch = "arm"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
