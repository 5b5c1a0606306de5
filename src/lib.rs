//! # `winc-wifi-hal`
//! This is a driver for Wi-Fi coprocessors, which are attached over SPI and speak the Host
//! Interface (HIF) protocol. The coprocessor runs the entire Wi-Fi stack, including
//! authentication and DHCP, and exchanges raw Ethernet frames with the host (Ethernet bypass
//! mode). The driver connects that protocol to an async control API and a pull based network
//! device interface.
//! ## Protocol overview
//! This chapter will give a short overview of how the host and the coprocessor talk to each
//! other.
//!
//! ### Events
//! Whenever the coprocessor has something to tell us, it stages the payload in its own memory
//! and raises the interrupt line. The interrupt handler only calls [WiFi::on_interrupt], which
//! records that an event is pending. All bus traffic happens in [WiFi::isr], which is driven by
//! [WiFi::run] or polled by the embedder. For every event, we read a notification consisting of
//! an opcode, the size of the payload and its address in device memory. The payload is then read
//! and decoded according to the opcode. Control events, like the completion of a scan, are put
//! into a mailbox, where the caller waiting for them picks them up.
//!
//! ### Receive (RX)
//! A received frame stays in the memory of the coprocessor, until we release it. When the
//! coprocessor announces a frame, we only read the header in front of it and remember where the
//! frame starts. [WiFi::receive] then copies as much of the frame as fits into the buffer of the
//! caller, so a frame may be received over multiple calls. Once the last byte was delivered, we
//! release the buffer. If a new frame is announced while another one is still pending, we drop
//! both and report [Error::ProtocolDesync], since the coprocessor only has a single RX buffer.
//!
//! ### Transmit (TX)
//! To transmit a frame, we ask the coprocessor to reserve a buffer, DMA the frame into it and
//! then commit it. If no buffer is available, [Error::BusBusy] is returned immediately. There is
//! no queueing inside the driver.
//!
//! ### Control
//! Requests, like [WiFi::scan] or [WiFi::connect], are posted the same way as frames. The
//! response arrives later as an event. Only one request is in flight at a time, which is
//! enforced by an async lock, and every wait is bounded by the timeouts in [Config].
//!
//! ## Logging
//! Enable either the `log` or the `defmt` feature to get log output.

#![cfg_attr(not(test), no_std)]
pub(crate) mod fmt;

mod config;
mod dispatch;
mod error;
mod event;
mod hif;
mod mailbox;
mod rx;
mod state;
mod sync;
#[cfg(test)]
mod testing;
mod transport;
mod types;
mod wifi;

pub use config::Config;
pub use error::{Error, WiFiResult};
pub use event::{DhcpConfiguration, MAX_RANDOM_LEN};
pub use hif::MAX_FRAME_LEN;
pub use state::ConnectionState;
pub use transport::{SpiTransport, Transport};
pub use types::*;
pub use wifi::WiFi;

cfg_if::cfg_if! {
    if #[cfg(feature = "critical_section")] {
        type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    } else {
        type DefaultRawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
    }
}
