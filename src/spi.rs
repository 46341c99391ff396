//! SPI0 master: queued messages, one worker, one interrupt handler.
//!
//! Three contexts touch the controller:
//! - callers, through [`Spi::setup`], [`Spi::submit`], [`Spi::release`] and [`Spi::shutdown`],
//! - the worker, [`Spi::run`] (or [`Spi::process_queue`]), which must have exactly one instance,
//! - the SPI interrupt, which must call [`Spi::on_interrupt`].
//!
//! They share one [`State`] behind a critical section. Critical sections are short and never
//! wait; the only place anything blocks is the worker awaiting the end of a transfer.

mod device;
mod fifo;
mod interrupt;
mod message;
mod mode;
pub mod registers;
mod resolver;
#[cfg(test)]
mod sim;
mod worker;

use alloc::collections::VecDeque;
use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};

pub use device::SpiDevice;
pub use fifo::{FIFO_DEPTH, RX_THRESHOLD};
pub use message::{Complete, Message, Status, Transfer};
pub use mode::ModeFlags;
pub use resolver::{clock_divider, PeerConfig, MAX_CLOCK_DIVIDER};
pub use worker::TRANSFER_TIMEOUT;

use fifo::InFlight;
use registers::{Control, Registers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The controller is shutting down.
    Shutdown,
    /// Bad chip select, word width, buffer layout or LoSSI length.
    Parameter,
    /// The requested clock is too slow for the divider.
    Range,
    /// The hardware did not finish a transfer in time.
    Timeout,
    /// The message queue could not grow.
    Resource,
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Core clock feeding the controller.
    pub bus_hz: u32,
    /// Chip select lines wired up, at most 3.
    pub num_chip_select: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_hz: 250_000_000,
            num_chip_select: 3,
        }
    }
}

/// What a peer asked for in its last setup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PeerSettings {
    pub max_speed_hz: u32,
    pub chip_select: u8,
    pub mode: ModeFlags,
    pub bits_per_word: u8,
}

/// A device on the bus, as seen by the controller.
#[derive(Debug, Default)]
pub struct Peer {
    settings: PeerSettings,
    config: Option<PeerConfig>,
}

impl Peer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> &PeerSettings {
        &self.settings
    }

    /// The cached register values, if setup succeeded.
    pub fn config(&self) -> Option<&PeerConfig> {
        self.config.as_ref()
    }
}

/// A peer as captured when one of its messages was queued.
#[derive(Debug, Clone, Copy)]
struct Target {
    settings: PeerSettings,
    config: PeerConfig,
}

struct Pending {
    target: Target,
    message: Message,
}

struct State {
    stopping: bool,
    /// The worker holds a message.
    busy: bool,
    queue: VecDeque<Pending>,
    xfer: InFlight,
}

pub struct Spi<R> {
    regs: R,
    config: Config,
    state: Mutex<RefCell<State>>,
    /// Raised by the interrupt handler when the in-flight transfer is done.
    done: Signal<CriticalSectionRawMutex, ()>,
    /// Raised when a message is queued.
    work: Signal<CriticalSectionRawMutex, ()>,
    /// Raised when the worker runs out of messages.
    idle: Signal<CriticalSectionRawMutex, ()>,
}

impl<R: Registers> Spi<R> {
    /// Take over the controller and reset it: FIFOs cleared, transfer inactive.
    pub fn new(regs: R, config: Config) -> Self {
        regs.set_control(Control::REN | Control::CLEAR_RX | Control::CLEAR_TX);
        info!(
            "SPI controller ready, bus {} Hz, {} chip selects",
            config.bus_hz,
            config.num_chip_select
        );

        Self {
            regs,
            config,
            state: Mutex::new(RefCell::new(State {
                stopping: false,
                busy: false,
                queue: VecDeque::new(),
                xfer: InFlight::default(),
            })),
            done: Signal::new(),
            work: Signal::new(),
            idle: Signal::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn stopping(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).stopping)
    }

    /// Validate a peer's settings and cache the register values for them.
    ///
    /// On failure any previously cached configuration is dropped.
    pub fn setup(
        &self,
        peer: &mut Peer,
        max_speed_hz: u32,
        chip_select: u8,
        mode: ModeFlags,
        bits_per_word: u8,
    ) -> Result<(), Error> {
        if self.stopping() {
            return Err(Error::Shutdown);
        }

        peer.settings = PeerSettings {
            max_speed_hz,
            chip_select,
            mode,
            bits_per_word,
        };
        let config = self
            .config
            .resolve(max_speed_hz, chip_select, mode, bits_per_word)
            .inspect_err(|_| peer.config = None)?;

        debug!(
            "setup: cs {}: want {} Hz, get {} Hz (cdiv {}), bpw {}, mode {:#x} -> CS={:#x}",
            chip_select,
            max_speed_hz,
            config.effective_hz(self.config.bus_hz),
            config.cdiv,
            bits_per_word,
            mode.bits(),
            config.cs
        );
        peer.config = Some(config);
        Ok(())
    }

    /// Forget the peer's cached configuration. Messages already queued are unaffected.
    pub fn release(&self, peer: &mut Peer) {
        peer.config = None;
    }

    /// Queue `message` for `peer`.
    ///
    /// Returns once the message is queued; the outcome is delivered to the message's completion
    /// callback. A rejected message is dropped without its callback being run.
    pub fn submit(&self, peer: &Peer, mut message: Message) -> Result<(), Error> {
        if message.transfers().is_empty() {
            return Err(Error::Parameter);
        }
        if self.stopping() {
            return Err(Error::Shutdown);
        }
        let Some(config) = peer.config else {
            debug!("submit: peer is not set up");
            return Err(Error::Parameter);
        };
        let target = Target {
            settings: peer.settings,
            config,
        };

        for transfer in message.transfers() {
            transfer.validate()?;
            let lossi = self.transfer_config(&target, transfer)?.lossi();
            if lossi && transfer.len % 2 != 0 {
                debug!("submit: odd length {} in LoSSI mode", transfer.len);
                return Err(Error::Parameter);
            }
        }

        message.reset();
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.stopping {
                return Err(Error::Shutdown);
            }
            state.queue.try_reserve(1).map_err(|_| Error::Resource)?;
            state.queue.push_back(Pending { target, message });
            self.work.signal(());
            Ok(())
        })
    }

    /// Refuse new work, reset the hardware and cut short the transfer in flight.
    ///
    /// Messages still queued are completed with [`Error::Shutdown`] by the worker. Does not
    /// wait for it; see [`Spi::shutdown`].
    pub fn stop(&self) {
        let already = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let already = state.stopping;
            if !already {
                state.stopping = true;
                self.regs.set_control(Control::CLEAR_RX | Control::CLEAR_TX);
            }
            already
        });
        if already {
            return;
        }
        info!("stopping, {} message(s) left", self.queued());

        self.done.signal(());
        self.work.signal(());
    }

    /// [`Spi::stop`], then wait for the worker to drain the queue. After this returns the
    /// registers and the interrupt line can be released.
    pub async fn shutdown(&self) {
        self.stop();
        while critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            state.busy || !state.queue.is_empty()
        }) {
            self.idle.wait().await;
        }
    }

    /// Messages waiting for the worker.
    pub fn queued(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).queue.len())
    }
}
