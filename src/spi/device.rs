use alloc::{sync::Arc, vec, vec::Vec};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embedded_hal_async::spi::{ErrorType, Operation, SpiDevice as HalSpiDevice};

use super::{registers::Registers, Error, Message, Peer, Spi, Transfer};

/// A set-up peer bound to its controller, usable wherever an async
/// [`embedded_hal_async::spi::SpiDevice`] is expected.
///
/// Each transaction is queued as one message; chip select stays asserted across its operations.
pub struct SpiDevice<'a, R> {
    spi: &'a Spi<R>,
    peer: Peer,
}

impl<'a, R: Registers> SpiDevice<'a, R> {
    pub fn new(spi: &'a Spi<R>, peer: Peer) -> Self {
        Self { spi, peer }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn into_peer(self) -> Peer {
        self.peer
    }
}

impl<R> ErrorType for SpiDevice<'_, R> {
    type Error = Error;
}

fn to_transfer(operation: &Operation<'_, u8>) -> Transfer {
    match operation {
        Operation::Read(words) => Transfer::read(words.len()),
        Operation::Write(words) => Transfer::write(words.to_vec()),
        Operation::Transfer(read, write) => {
            let len = read.len().max(write.len());
            let mut tx = write.to_vec();
            tx.resize(len, 0);
            Transfer {
                len,
                tx: Some(tx),
                rx: Some(vec![0; len]),
                ..Transfer::default()
            }
        }
        Operation::TransferInPlace(words) => Transfer::transfer(words.to_vec()),
        Operation::DelayNs(ns) => {
            let us = ns.div_ceil(1000);
            Transfer::delay(u16::try_from(us).unwrap_or(u16::MAX))
        }
    }
}

impl<R: Registers> HalSpiDevice<u8> for SpiDevice<'_, R> {
    async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Error> {
        if operations.is_empty() {
            return Ok(());
        }
        let transfers: Vec<Transfer> = operations.iter().map(to_transfer).collect();

        let done = Arc::new(Signal::<CriticalSectionRawMutex, Message>::new());
        let message = Message::new(transfers, {
            let done = done.clone();
            move |message| done.signal(message)
        });
        self.spi.submit(&self.peer, message)?;

        let message = done.wait().await;
        message.status().result()?;

        for (operation, transfer) in operations.iter_mut().zip(message.into_transfers()) {
            let Some(rx) = transfer.rx else { continue };
            match operation {
                Operation::Read(words) | Operation::TransferInPlace(words) => {
                    words.copy_from_slice(&rx[..words.len()]);
                }
                Operation::Transfer(read, _) => {
                    read.copy_from_slice(&rx[..read.len()]);
                }
                _ => {}
            }
        }
        Ok(())
    }
}
