use alloc::{boxed::Box, vec, vec::Vec};
use core::fmt;

use super::Error;

/// One contiguous exchange on the bus.
///
/// The engine only reads `tx` and writes into `rx`; both buffers travel with the transfer and
/// come back to the caller through the message's completion callback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub tx: Option<Vec<u8>>,
    pub rx: Option<Vec<u8>>,
    pub len: usize,
    /// Overrides the peer's word width for this transfer.
    pub bits_per_word: Option<u8>,
    /// Overrides the peer's clock for this transfer.
    pub speed_hz: Option<u32>,
    /// Deassert chip select after this transfer, even in the middle of a message.
    pub cs_change: bool,
    /// Delay after the transfer completes, before chip select is touched.
    pub delay_us: u16,
}

impl Transfer {
    /// Transmit `data`, discarding what comes back.
    pub fn write(data: Vec<u8>) -> Self {
        Self {
            len: data.len(),
            tx: Some(data),
            ..Self::default()
        }
    }

    /// Clock in `len` bytes while sending zeros.
    pub fn read(len: usize) -> Self {
        Self {
            len,
            rx: Some(vec![0; len]),
            ..Self::default()
        }
    }

    /// Full duplex: transmit `data` and receive as many bytes.
    pub fn transfer(data: Vec<u8>) -> Self {
        Self {
            len: data.len(),
            rx: Some(vec![0; data.len()]),
            tx: Some(data),
            ..Self::default()
        }
    }

    /// A transfer that moves no data, only waits.
    pub fn delay(delay_us: u16) -> Self {
        Self {
            delay_us,
            ..Self::default()
        }
    }

    pub fn with_speed_hz(mut self, hz: u32) -> Self {
        self.speed_hz = Some(hz);
        self
    }

    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = Some(bits);
        self
    }

    pub fn with_cs_change(mut self) -> Self {
        self.cs_change = true;
        self
    }

    pub fn with_delay_us(mut self, delay_us: u16) -> Self {
        self.delay_us = delay_us;
        self
    }

    pub(crate) fn has_override(&self) -> bool {
        self.speed_hz.is_some() || self.bits_per_word.is_some()
    }

    /// Checks that can be made without the controller.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.len == 0 {
            return Ok(());
        }
        if self.tx.is_none() && self.rx.is_none() {
            debug!("missing rx or tx buf");
            return Err(Error::Parameter);
        }
        let short = |buf: &Option<Vec<u8>>| buf.as_ref().is_some_and(|b| b.len() < self.len);
        if short(&self.tx) || short(&self.rx) {
            debug!("buffer shorter than transfer length {}", self.len);
            return Err(Error::Parameter);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    InProgress,
    Success,
    Failed(Error),
}

impl Status {
    pub fn result(self) -> Result<(), Error> {
        match self {
            Status::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}

impl From<Result<(), Error>> for Status {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Status::Success,
            Err(err) => Status::Failed(err),
        }
    }
}

pub type Complete = Box<dyn FnOnce(Message) + Send>;

/// An ordered group of transfers, executed back to back with chip select held between them.
pub struct Message {
    transfers: Vec<Transfer>,
    status: Status,
    actual_length: usize,
    complete: Option<Complete>,
}

impl Message {
    /// `complete` runs on the worker once the message is done, successfully or not, and
    /// receives the message back. Anything the caller needs there is captured by the closure.
    pub fn new(transfers: Vec<Transfer>, complete: impl FnOnce(Message) + Send + 'static) -> Self {
        Self {
            transfers,
            status: Status::InProgress,
            actual_length: 0,
            complete: Some(Box::new(complete)),
        }
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn into_transfers(self) -> Vec<Transfer> {
        self.transfers
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Bytes actually clocked through the controller.
    pub fn actual_length(&self) -> usize {
        self.actual_length
    }

    pub(crate) fn transfers_mut(&mut self) -> &mut [Transfer] {
        &mut self.transfers
    }

    pub(crate) fn reset(&mut self) {
        self.status = Status::InProgress;
        self.actual_length = 0;
    }

    pub(crate) fn add_actual_length(&mut self, len: usize) {
        self.actual_length += len;
    }

    /// Record the outcome and hand the message back to its owner.
    pub(crate) fn finish(mut self, status: Status) {
        self.status = status;
        if let Some(complete) = self.complete.take() {
            complete(self);
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("transfers", &self.transfers)
            .field("status", &self.status)
            .field("actual_length", &self.actual_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn constructors_size_buffers() {
        let t = Transfer::transfer(vec![1, 2, 3]);
        assert_eq!(t.len, 3);
        assert_eq!(t.rx.as_deref(), Some(&[0, 0, 0][..]));
        let r = Transfer::read(4);
        assert!(r.tx.is_none());
        assert_eq!(r.rx.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn validation() {
        assert_eq!(Transfer::delay(10).validate(), Ok(()));
        let bare = Transfer {
            len: 2,
            ..Transfer::default()
        };
        assert_eq!(bare.validate(), Err(Error::Parameter));
        let short = Transfer {
            len: 4,
            ..Transfer::write(vec![1, 2])
        };
        assert_eq!(short.validate(), Err(Error::Parameter));
        assert_eq!(Transfer::write(vec![1, 2]).validate(), Ok(()));
    }

    #[test]
    fn finish_hands_the_message_back() {
        let seen = Arc::new(Mutex::new(None));
        let message = Message::new(vec![Transfer::read(1)], {
            let seen = seen.clone();
            move |m: Message| *seen.lock().unwrap() = Some(m.status())
        });
        message.finish(Status::Failed(Error::Timeout));
        assert_eq!(*seen.lock().unwrap(), Some(Status::Failed(Error::Timeout)));
    }
}
