use embassy_time::{with_timeout, Duration, Timer};

use super::{
    fifo::{InFlight, RxCursor, TxCursor},
    registers::{Control, Registers, CLK},
    Error, Message, Pending, PeerConfig, Spi, Target, Transfer,
};

/// How long the hardware gets to finish one transfer.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(150);

impl<R: Registers> Spi<R> {
    /// The worker: wait for messages and process them, forever.
    ///
    /// Exactly one instance may run per controller.
    pub async fn run(&self) -> ! {
        loop {
            self.work.wait().await;
            self.process_queue().await;
        }
    }

    /// Process queued messages in order until the queue is empty.
    pub async fn process_queue(&self) {
        loop {
            let next = critical_section::with(|cs| {
                let mut state = self.state.borrow_ref_mut(cs);
                let next = state.queue.pop_front();
                state.busy = next.is_some();
                next
            });
            let Some(Pending {
                target,
                mut message,
            }) = next
            else {
                break;
            };

            let result = self.process_message(&target, &mut message).await;
            message.finish(result.into());
        }
        self.idle.signal(());
    }

    /// Register values for `transfer`: the peer's cached ones unless the transfer overrides the
    /// clock or the word width.
    pub(super) fn transfer_config(
        &self,
        target: &Target,
        transfer: &Transfer,
    ) -> Result<PeerConfig, Error> {
        if !transfer.has_override() {
            return Ok(target.config);
        }
        let settings = &target.settings;
        self.config.resolve(
            transfer.speed_hz.unwrap_or(settings.max_speed_hz),
            settings.chip_select,
            settings.mode,
            transfer.bits_per_word.unwrap_or(settings.bits_per_word),
        )
    }

    async fn process_message(&self, target: &Target, message: &mut Message) -> Result<(), Error> {
        let count = message.transfers().len();
        for index in 0..count {
            let transfer = &mut message.transfers_mut()[index];
            let consumed = self
                .process_transfer(target, transfer, index + 1 == count)
                .await?;
            message.add_actual_length(consumed);
        }
        Ok(())
    }

    /// Run one transfer on the hardware. Returns the number of bytes consumed.
    async fn process_transfer(
        &self,
        target: &Target,
        transfer: &mut Transfer,
        last: bool,
    ) -> Result<usize, Error> {
        if self.stopping() {
            return Err(Error::Shutdown);
        }
        let config = self.transfer_config(target, transfer)?;
        let len = transfer.len;

        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.stopping {
                return Err(Error::Shutdown);
            }
            self.done.reset();
            state.xfer = InFlight::new(transfer.tx.take(), transfer.rx.take(), len);

            self.regs.write(CLK, u32::from(config.cdiv));
            // The first DONE interrupt fires right away and starts filling the FIFO.
            self.regs
                .set_control(config.control() | Control::INTR | Control::INTD | Control::TA);
            Ok(())
        })?;

        let waited = with_timeout(TRANSFER_TIMEOUT, self.done.wait()).await;

        let (xfer, stopping) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if waited.is_err() && !state.stopping {
                self.regs.set_control(config.control());
            }
            (core::mem::take(&mut state.xfer), state.stopping)
        });
        transfer.tx = xfer.tx.map(TxCursor::into_inner);
        transfer.rx = xfer.rx.map(RxCursor::into_inner);

        if stopping {
            return Err(Error::Shutdown);
        }
        if waited.is_err() {
            error!("transfer timed out, {} of {} bytes left", xfer.remaining, len);
            return Err(Error::Timeout);
        }
        if let Some(fault) = xfer.fault {
            critical_section::with(|cs| {
                if !self.state.borrow_ref(cs).stopping {
                    self.regs.set_control(config.control());
                }
            });
            return Err(fault);
        }

        if transfer.delay_us != 0 {
            Timer::after_micros(u64::from(transfer.delay_us)).await;
        }

        if last || transfer.cs_change {
            // Clear TA and the interrupt enables, releasing chip select.
            critical_section::with(|cs| {
                if !self.state.borrow_ref(cs).stopping {
                    self.regs.set_control(config.control());
                }
            });
        }

        Ok(len - xfer.remaining)
    }
}
