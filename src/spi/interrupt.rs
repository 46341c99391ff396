use super::{
    fifo::{read_burst, write_burst, FIFO_DEPTH, RX_THRESHOLD},
    registers::{Control, Registers},
    Spi,
};

impl<R: Registers> Spi<R> {
    /// Service the controller interrupt.
    ///
    /// Must be called from the SPI interrupt handler (or anything standing in for it). Never
    /// blocks.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let xfer = &mut state.xfer;
            let mut status = self.regs.control();

            if status.contains(Control::DONE) {
                if xfer.remaining > 0 {
                    // First interrupt in a transfer: fill the TX FIFO.
                    write_burst(&self.regs, xfer, FIFO_DEPTH);
                } else {
                    status -= Control::INTR | Control::INTD;
                    self.regs.set_control(status);

                    while status.contains(Control::RXD) {
                        read_burst(&self.regs, xfer, 1);
                        status = self.regs.control();
                    }

                    trace!("transfer done");
                    self.done.signal(());
                }
            } else if status.contains(Control::RXR) {
                read_burst(&self.regs, xfer, RX_THRESHOLD);
                write_burst(&self.regs, xfer, RX_THRESHOLD);
            }
        });
    }
}
