//! A simulated coprocessor, which speaks the bus protocol of [HifCodec](crate::hif::HifCodec).

use std::{
    boxed::Box,
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    vec::Vec,
};

use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};

use crate::{
    hif::{
        HifNotification, Request, CMD_COMMIT, CMD_DMA_READ, CMD_DMA_WRITE, CMD_READ_MAC,
        CMD_READ_NOTIFICATION, CMD_RESERVE, CMD_RX_DONE, RESERVE_BUSY, RESERVE_OK,
    },
    transport::Transport,
    types::SecurityFlags,
};

const MEMORY_SIZE: usize = 0x10000;
const HEAP_START: usize = 0x1000;
pub const SIM_MAC_ADDRESS: [u8; 6] = [0xf8, 0xf0, 0x05, 0x12, 0x34, 0x56];
/// Distance between the RX header and the frame.
pub const RX_FRAME_OFFSET: u16 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimError;
impl embedded_hal::spi::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

type Responder = Box<dyn FnMut(&SimChip, &[u8])>;

struct SimState {
    memory: Vec<u8>,
    next_free: usize,
    notifications: VecDeque<HifNotification>,
    reservations: HashMap<u32, (u8, usize)>,
    requests: Vec<(u8, Vec<u8>)>,
    frames: Vec<Vec<u8>>,
    responders: HashMap<u8, Responder>,
    tx_busy: bool,
    failing_transfers: usize,
    failing_rx_done: bool,
    rx_done_count: usize,
    interrupt_registered: bool,
}
impl SimState {
    fn allocate(&mut self, length: usize) -> u32 {
        let length = length.max(1);
        if self.next_free + length > MEMORY_SIZE {
            self.next_free = HEAP_START;
        }
        let address = self.next_free;
        // Keep allocations word aligned, like the real buffers.
        self.next_free += (length + 3) & !3;
        address as u32
    }
    fn write(&mut self, address: u32, data: &[u8]) {
        let address = address as usize;
        self.memory[address..address + data.len()].copy_from_slice(data);
    }
    fn read(&self, address: u32, out: &mut [u8]) {
        let address = address as usize;
        out.copy_from_slice(&self.memory[address..address + out.len()]);
    }
}

fn le_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}
fn le_u16(raw: &[u8]) -> u16 {
    u16::from_le_bytes([raw[0], raw[1]])
}

/// The simulated coprocessor. Clones share the same device.
#[derive(Clone)]
pub struct SimChip {
    state: Rc<RefCell<SimState>>,
}
impl SimChip {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                memory: std::vec![0; MEMORY_SIZE],
                next_free: HEAP_START,
                notifications: VecDeque::new(),
                reservations: HashMap::new(),
                requests: Vec::new(),
                frames: Vec::new(),
                responders: HashMap::new(),
                tx_busy: false,
                failing_transfers: 0,
                failing_rx_done: false,
                rx_done_count: 0,
                interrupt_registered: false,
            })),
        }
    }
    /// Place `data` in device memory and return its address.
    pub fn write_memory(&self, data: &[u8]) -> u32 {
        let mut state = self.state.borrow_mut();
        let address = state.allocate(data.len());
        state.write(address, data);
        address
    }
    fn notify(&self, opcode: u8, payload_size: usize, address: u32) {
        self.state
            .borrow_mut()
            .notifications
            .push_back(HifNotification {
                opcode,
                payload_size: payload_size as u16,
                address,
            });
    }
    /// Queue an event and return the address of its payload.
    pub fn push_event(&self, opcode: u8, payload: &[u8]) -> u32 {
        let address = self.write_memory(payload);
        self.notify(opcode, payload.len(), address);
        address
    }
    /// Stage a received frame and announce it.
    pub fn push_rx_frame(&self, frame: &[u8]) -> u32 {
        let mut staged = std::vec![0u8; RX_FRAME_OFFSET as usize + frame.len()];
        staged[0..2].copy_from_slice(&(frame.len() as u16).to_le_bytes());
        // Framing bytes, which must not be mistaken for the length.
        staged[2..4].copy_from_slice(&[0xef, 0xbe]);
        staged[4..6].copy_from_slice(&RX_FRAME_OFFSET.to_le_bytes());
        staged[RX_FRAME_OFFSET as usize..].copy_from_slice(frame);
        let address = self.write_memory(&staged);
        self.notify(29, staged.len(), address);
        address
    }
    /// Answer every request with `opcode` by calling `responder` with its payload.
    pub fn on_request(&self, opcode: Request, responder: impl FnMut(&SimChip, &[u8]) + 'static) {
        self.state
            .borrow_mut()
            .responders
            .insert(opcode.into_bits(), Box::new(responder));
    }
    pub fn set_tx_busy(&self, busy: bool) {
        self.state.borrow_mut().tx_busy = busy;
    }
    /// Let the next `count` transfers fail.
    pub fn fail_next_transfers(&self, count: usize) {
        self.state.borrow_mut().failing_transfers = count;
    }
    /// Let the next rx-done fail.
    pub fn fail_next_rx_done(&self) {
        self.state.borrow_mut().failing_rx_done = true;
    }
    pub fn rx_done_count(&self) -> usize {
        self.state.borrow().rx_done_count
    }
    pub fn pending_events(&self) -> usize {
        self.state.borrow().notifications.len()
    }
    pub fn interrupt_registered(&self) -> bool {
        self.state.borrow().interrupt_registered
    }
    /// The Ethernet frames, that were handed to the coprocessor.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.borrow().frames.clone()
    }
    /// The opcodes of all control requests posted so far.
    pub fn request_opcodes(&self) -> Vec<u8> {
        self.state
            .borrow()
            .requests
            .iter()
            .map(|(opcode, _)| *opcode)
            .collect()
    }
    /// The payload of the last request with `opcode`.
    pub fn last_request(&self, opcode: Request) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .requests
            .iter()
            .rev()
            .find(|(request, _)| *request == opcode.into_bits())
            .map(|(_, payload)| payload.clone())
    }
    fn commit(&self, address: u32) {
        let (opcode, payload) = {
            let mut state = self.state.borrow_mut();
            let Some((opcode, length)) = state.reservations.remove(&address) else {
                panic!("Commit of unreserved buffer at {address:x}.");
            };
            let mut payload = std::vec![0u8; length];
            state.read(address, &mut payload);
            (opcode, payload)
        };
        if opcode == Request::SendEthernetPacket.into_bits() {
            self.state.borrow_mut().frames.push(payload);
            return;
        }
        self.state
            .borrow_mut()
            .requests
            .push((opcode, payload.clone()));
        // The responder may queue events, so the state must not be borrowed while it runs.
        let responder = self.state.borrow_mut().responders.remove(&opcode);
        if let Some(mut responder) = responder {
            responder(self, &payload);
            self.state
                .borrow_mut()
                .responders
                .entry(opcode)
                .or_insert(responder);
        }
    }
}

impl ErrorType for SimChip {
    type Error = SimError;
}
impl SpiDevice<u8> for SimChip {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        {
            let mut state = self.state.borrow_mut();
            if state.failing_transfers != 0 {
                state.failing_transfers -= 1;
                return Err(SimError);
            }
        }
        match operations {
            [Operation::Write([CMD_READ_NOTIFICATION]), Operation::Read(out)] => {
                let notification = self.state.borrow_mut().notifications.pop_front();
                out.fill(0);
                if let Some(notification) = notification {
                    out[0] = notification.opcode;
                    out[2..4].copy_from_slice(&notification.payload_size.to_le_bytes());
                    out[4..8].copy_from_slice(&notification.address.to_le_bytes());
                }
            }
            [Operation::Write(header), Operation::Read(out)] if header[0] == CMD_DMA_READ => {
                assert_eq!(le_u16(&header[5..]) as usize, out.len());
                self.state.borrow().read(le_u32(&header[1..]), out);
            }
            [Operation::Write(header), Operation::Read(out)] if header[0] == CMD_RESERVE => {
                let mut state = self.state.borrow_mut();
                let opcode = header[1];
                if state.tx_busy && opcode == Request::SendEthernetPacket.into_bits() {
                    out[0] = RESERVE_BUSY;
                    return Ok(());
                }
                let length = le_u16(&header[2..]) as usize;
                let address = state.allocate(length);
                state.reservations.insert(address, (opcode, length));
                out[0] = RESERVE_OK;
                out[1..5].copy_from_slice(&address.to_le_bytes());
            }
            [Operation::Write(header), Operation::Write(data)] if header[0] == CMD_DMA_WRITE => {
                assert_eq!(le_u16(&header[5..]) as usize, data.len());
                self.state.borrow_mut().write(le_u32(&header[1..]), data);
            }
            [Operation::Write(header)] if header[0] == CMD_COMMIT => self.commit(le_u32(&header[1..])),
            [Operation::Write([CMD_RX_DONE])] => {
                let mut state = self.state.borrow_mut();
                if core::mem::take(&mut state.failing_rx_done) {
                    return Err(SimError);
                }
                state.rx_done_count += 1;
            }
            [Operation::Write([CMD_READ_MAC]), Operation::Read(out)] => {
                out.copy_from_slice(&SIM_MAC_ADDRESS)
            }
            _ => panic!("Unexpected bus transaction."),
        }
        Ok(())
    }
}
impl Transport for SimChip {
    fn register_interrupt(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().interrupt_registered = true;
        Ok(())
    }
}

/// The payload of a scan result event.
pub fn scan_result_payload(index: u8, ssid: &[u8], security: SecurityFlags, rssi: i8) -> [u8; 44] {
    let mut payload = [0u8; 44];
    payload[0] = index;
    payload[1] = rssi as u8;
    payload[2] = security.into_bits();
    payload[3] = 6;
    payload[4..10].copy_from_slice(&[0x02, 0, 0, 0, 0, index]);
    payload[10..10 + ssid.len()].copy_from_slice(ssid);
    payload
}
/// The payload of a connection info event.
pub fn connection_info_payload(ssid: &[u8], security: SecurityFlags, ip: [u8; 4]) -> [u8; 48] {
    let mut payload = [0u8; 48];
    payload[..ssid.len()].copy_from_slice(ssid);
    payload[33] = security.into_bits();
    payload[34..38].copy_from_slice(&ip);
    payload[38..44].copy_from_slice(&[0x02, 0, 0, 0, 0, 1]);
    payload[44] = -40i8 as u8;
    payload
}
/// The payload of a DHCP configuration event.
pub fn dhcp_payload(ip: [u8; 4]) -> [u8; 20] {
    let mut payload = [0u8; 20];
    payload[..4].copy_from_slice(&ip);
    payload[4..8].copy_from_slice(&[ip[0], ip[1], ip[2], 1]);
    payload[12..16].copy_from_slice(&[255, 255, 255, 0]);
    payload[16..].copy_from_slice(&3600u32.to_le_bytes());
    payload
}
