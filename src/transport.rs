//! The boundary to the bus the coprocessor is attached to.
//!
//! Byte exchange happens through [SpiDevice::transaction], which asserts chip select for the
//! entire list of operations. Everything else about the board, like which GPIO carries the
//! interrupt line, stays with the implementor.

use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

/// The bus, over which the coprocessor is reached.
pub trait Transport: SpiDevice<u8> {
    /// Bring up the bus, before the first transaction.
    fn bus_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    /// Arm the interrupt line of the coprocessor.
    ///
    /// The handler of that line must do nothing but call
    /// [WiFi::on_interrupt](crate::WiFi::on_interrupt). All bus traffic happens later, from
    /// [WiFi::isr](crate::WiFi::isr).
    fn register_interrupt(&mut self) -> Result<(), Self::Error>;
}

/// A [Transport] for boards without an interrupt line, which poll [WiFi::isr](crate::WiFi::isr)
/// instead.
pub struct SpiTransport<SPI> {
    spi: SPI,
}
impl<SPI: SpiDevice<u8>> SpiTransport<SPI> {
    pub const fn new(spi: SPI) -> Self {
        Self { spi }
    }
    /// Return the wrapped [SpiDevice].
    pub fn release(self) -> SPI {
        self.spi
    }
}
impl<SPI: SpiDevice<u8>> ErrorType for SpiTransport<SPI> {
    type Error = SPI::Error;
}
impl<SPI: SpiDevice<u8>> SpiDevice<u8> for SpiTransport<SPI> {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.spi.transaction(operations)
    }
}
impl<SPI: SpiDevice<u8>> Transport for SpiTransport<SPI> {
    fn register_interrupt(&mut self) -> Result<(), Self::Error> {
        trace!("No interrupt line, events have to be polled.");
        Ok(())
    }
}
