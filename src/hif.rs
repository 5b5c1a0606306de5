//! The Host Interface Protocol (HIF) codec.
//!
//! The coprocessor stages every event in its own memory and tells us about it with a
//! notification, which consists of an opcode, the payload size and the device memory address of
//! the payload. Requests travel the other way: we ask the coprocessor to reserve a buffer for the
//! request, DMA the payload into it and then commit it.
//!
//! Every exchange is a single bus transaction, that starts with one of the bus commands below.
//! All multi byte fields are little endian.
//!
//! | Command | Host writes | Host reads |
//! |---|---|---|
//! | `0xc1` | `[0xc1]` | `opcode, reserved, size: u16, address: u32` |
//! | `0xc2` | `[0xc2, address: u32, length: u16]` | `length` bytes |
//! | `0xc3` | `[0xc3, opcode, length: u16]` | `status, address: u32` |
//! | `0xc4` | `[0xc4, address: u32, length: u16]`, followed by the data | |
//! | `0xc5` | `[0xc5, address: u32]` | |
//! | `0xc6` | `[0xc6]` | |
//! | `0xc7` | `[0xc7]` | MAC address |
//!
//! The codec has no state of its own. Each call is self-contained.

use embedded_hal::spi::Operation;
use macro_bits::serializable_enum;

use crate::{transport::Transport, Error, WiFiResult};

pub(crate) const CMD_READ_NOTIFICATION: u8 = 0xc1;
pub(crate) const CMD_DMA_READ: u8 = 0xc2;
pub(crate) const CMD_RESERVE: u8 = 0xc3;
pub(crate) const CMD_DMA_WRITE: u8 = 0xc4;
pub(crate) const CMD_COMMIT: u8 = 0xc5;
pub(crate) const CMD_RX_DONE: u8 = 0xc6;
pub(crate) const CMD_READ_MAC: u8 = 0xc7;

pub(crate) const RESERVE_OK: u8 = 0;
pub(crate) const RESERVE_BUSY: u8 = 1;

/// The largest frame the coprocessor accepts in one buffer.
pub const MAX_FRAME_LEN: usize = 1600;
/// Payload lengths are transferred as `u16`, so bigger reads are split.
const MAX_DMA_CHUNK: usize = u16::MAX as usize;

serializable_enum! {
    /// Requests posted by the host.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum Request: u8 {
        CurrentRssi => 3,
        GetConnectionInfo => 5,
        StartProvisioning => 8,
        StopProvisioning => 10,
        Scan => 16,
        ScanResult => 18,
        GetSystemTime => 26,
        SendEthernetPacket => 28,
        GetPrng => 31,
        Connect => 40,
        Disconnect => 43
    }
}

/// One pending event, as announced by the coprocessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HifNotification {
    pub opcode: u8,
    pub payload_size: u16,
    /// Device memory address of the payload.
    pub address: u32,
}
impl HifNotification {
    pub const WIRE_LEN: usize = 8;

    /// Parse a notification. Opcode zero means, that nothing is pending.
    pub fn parse(raw: &[u8; Self::WIRE_LEN]) -> Option<Self> {
        if raw[0] == 0 {
            return None;
        }
        Some(Self {
            opcode: raw[0],
            payload_size: u16::from_le_bytes([raw[2], raw[3]]),
            address: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }
}

fn dma_header(command: u8, address: u32, length: usize) -> [u8; 7] {
    let address = address.to_le_bytes();
    let length = (length as u16).to_le_bytes();
    [
        command, address[0], address[1], address[2], address[3], length[0], length[1],
    ]
}

/// Translates between typed HIF requests and notifications and bus transactions.
pub struct HifCodec<T> {
    transport: T,
}
impl<T: Transport> HifCodec<T> {
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> WiFiResult<()> {
        self.transport.transaction(operations).map_err(Error::bus)
    }
    /// Bring up the bus and arm the interrupt line.
    pub fn init(&mut self) -> WiFiResult<()> {
        self.transport.bus_init().map_err(Error::bus)?;
        self.transport.register_interrupt().map_err(Error::bus)
    }
    /// Fetch the next pending notification, if there is one.
    pub fn read_notification(&mut self) -> WiFiResult<Option<HifNotification>> {
        let mut raw = [0u8; HifNotification::WIRE_LEN];
        self.transaction(&mut [
            Operation::Write(&[CMD_READ_NOTIFICATION]),
            Operation::Read(&mut raw),
        ])?;
        Ok(HifNotification::parse(&raw))
    }
    /// Copy `out.len()` bytes starting at `address` into `out`.
    pub fn read_payload(&mut self, address: u32, out: &mut [u8]) -> WiFiResult<()> {
        self.read_payload_partial(address, 0, out)
    }
    /// Copy `out.len()` bytes starting at `address + offset` into `out`.
    pub fn read_payload_partial(
        &mut self,
        address: u32,
        offset: u32,
        out: &mut [u8],
    ) -> WiFiResult<()> {
        let mut cursor = address.wrapping_add(offset);
        for chunk in out.chunks_mut(MAX_DMA_CHUNK) {
            let header = dma_header(CMD_DMA_READ, cursor, chunk.len());
            self.transaction(&mut [Operation::Write(&header), Operation::Read(chunk)])?;
            cursor = cursor.wrapping_add(chunk.len() as u32);
        }
        Ok(())
    }
    fn dma_write(&mut self, address: u32, data: &[u8]) -> WiFiResult<()> {
        let mut cursor = address;
        for chunk in data.chunks(MAX_DMA_CHUNK) {
            let header = dma_header(CMD_DMA_WRITE, cursor, chunk.len());
            self.transaction(&mut [Operation::Write(&header), Operation::Write(chunk)])?;
            cursor = cursor.wrapping_add(chunk.len() as u32);
        }
        Ok(())
    }
    /// Ask the coprocessor for a buffer of `length` bytes for `request`.
    ///
    /// Returns the device memory address of that buffer.
    fn reserve(&mut self, request: Request, length: usize) -> WiFiResult<u32> {
        let length = (length as u16).to_le_bytes();
        let mut response = [0u8; 5];
        self.transaction(&mut [
            Operation::Write(&[CMD_RESERVE, request.into_bits(), length[0], length[1]]),
            Operation::Read(&mut response),
        ])?;
        match response[0] {
            RESERVE_OK => Ok(u32::from_le_bytes([
                response[1],
                response[2],
                response[3],
                response[4],
            ])),
            RESERVE_BUSY => Err(Error::BusBusy),
            status => Err(Error::RequestRejected(status)),
        }
    }
    fn commit(&mut self, address: u32) -> WiFiResult<()> {
        let address = address.to_le_bytes();
        self.transaction(&mut [Operation::Write(&[
            CMD_COMMIT, address[0], address[1], address[2], address[3],
        ])])
    }
    /// Post a request with the payload gathered from `parts`.
    fn post(&mut self, request: Request, parts: &[&[u8]]) -> WiFiResult<usize> {
        let length = parts.iter().map(|part| part.len()).sum::<usize>();
        if length > u16::MAX as usize {
            return Err(Error::FrameTooLarge);
        }
        let address = self.reserve(request, length)?;
        let mut offset = 0;
        for part in parts.iter().filter(|part| !part.is_empty()) {
            self.dma_write(address.wrapping_add(offset as u32), part)?;
            offset += part.len();
        }
        self.commit(address)?;
        trace!(
            "Posted request {} with {} bytes at {:x}.",
            request.into_bits(),
            length,
            address
        );
        Ok(length)
    }
    /// Post a control request.
    pub fn send_request(&mut self, request: Request, payload: &[u8]) -> WiFiResult<()> {
        self.post(request, &[payload]).map(|_| ())
    }
    /// Hand an Ethernet frame, split over `iovecs`, to the transmit primitive of the coprocessor.
    ///
    /// Returns the number of bytes accepted.
    pub fn send_frame(&mut self, iovecs: &[&[u8]]) -> WiFiResult<usize> {
        self.post(Request::SendEthernetPacket, iovecs)
    }
    /// Tell the coprocessor, that the current RX buffer may be reused.
    pub fn rx_done(&mut self) -> WiFiResult<()> {
        self.transaction(&mut [Operation::Write(&[CMD_RX_DONE])])
    }
    pub fn read_mac_address(&mut self) -> WiFiResult<[u8; 6]> {
        let mut mac_address = [0u8; 6];
        self.transaction(&mut [
            Operation::Write(&[CMD_READ_MAC]),
            Operation::Read(&mut mac_address),
        ])?;
        Ok(mac_address)
    }
}
