//! Routing of coprocessor events to the state they affect.
//!
//! Every event is first acknowledged to the coprocessor, except for received frames, which are
//! only released once they were drained by [WiFi::receive](crate::WiFi::receive).

use crate::{
    event::{DhcpConfiguration, Event, Opcode, MAX_RANDOM_LEN},
    hif::{HifCodec, HifNotification},
    mailbox::{Mailbox, Message},
    rx::RxReassembly,
    state::{ConnectionTracker, Transition},
    sync::SignalQueue,
    transport::Transport,
    Error, WiFiResult,
};

/// The offset of the random bytes from the start of a PRNG event.
const PRNG_DATA_OFFSET: u32 = 8;
/// Enough for the largest fixed payload, the provisioning info.
const MAX_PAYLOAD_LEN: usize = 100;

/// The state shared between the interrupt context and the callers of the driver.
pub(crate) struct Inner<T> {
    pub codec: HifCodec<T>,
    pub tracker: ConnectionTracker,
    pub rx: RxReassembly,
    /// Set by [WiFi::scan](crate::WiFi::scan) until it returns.
    pub scan_in_progress: bool,
    /// The number of results of the last successful scan.
    pub scan_count: Option<u8>,
    pub mac_address: [u8; 6],
    /// Only present, while we hold an address.
    pub dhcp: Option<DhcpConfiguration>,
}
impl<T: Transport> Inner<T> {
    pub fn new(transport: T) -> Self {
        Self {
            codec: HifCodec::new(transport),
            tracker: ConnectionTracker::default(),
            rx: RxReassembly::default(),
            scan_in_progress: false,
            scan_count: None,
            mac_address: [0; 6],
            dhcp: None,
        }
    }
    /// Handle a single pending event.
    ///
    /// Returns `false`, if no event was pending. Events, that can't be decoded, are logged and
    /// dropped. Bus errors and [Error::ProtocolDesync] are returned.
    pub fn dispatch_one(&mut self, mailbox: &Mailbox, rx_ready: &SignalQueue) -> WiFiResult<bool> {
        let Some(notification) = self.codec.read_notification()? else {
            return Ok(false);
        };
        match self.dispatch(notification, mailbox, rx_ready) {
            Err(Error::UnknownOpcode(opcode)) => {
                warn!(
                    "Dropping event with unknown opcode {} and {} bytes of payload.",
                    opcode, notification.payload_size
                );
                self.codec.rx_done()?;
            }
            Err(Error::MalformedEvent(opcode)) => {
                warn!(
                    "Dropping event with opcode {}, since {} bytes of payload are too few.",
                    opcode, notification.payload_size
                );
                self.codec.rx_done()?;
            }
            res => res?,
        }
        Ok(true)
    }
    fn dispatch(
        &mut self,
        notification: HifNotification,
        mailbox: &Mailbox,
        rx_ready: &SignalQueue,
    ) -> WiFiResult<()> {
        let opcode =
            Opcode::from_u8(notification.opcode).ok_or(Error::UnknownOpcode(notification.opcode))?;
        let payload_len = opcode.payload_len();
        if (notification.payload_size as usize) < payload_len {
            return Err(Error::MalformedEvent(notification.opcode));
        }
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        let payload = &mut payload[..payload_len];
        self.codec.read_payload(notification.address, payload)?;
        let event = Event::decode(opcode, payload)?;
        trace!("Dispatching event with opcode {}.", notification.opcode);

        if let Event::PacketReady(header) = event {
            return match self.rx.begin(notification.address, header) {
                Ok(true) => {
                    rx_ready.put();
                    Ok(())
                }
                Ok(false) => self.codec.rx_done(),
                Err(err) => {
                    rx_ready.reset();
                    self.codec.rx_done()?;
                    Err(err)
                }
            };
        }
        let message = match event {
            Event::Prng { len } => {
                let mut data = [0u8; MAX_RANDOM_LEN];
                let len = (len as usize)
                    .min(MAX_RANDOM_LEN)
                    .min((notification.payload_size as usize).saturating_sub(payload_len));
                self.codec.read_payload_partial(
                    notification.address,
                    PRNG_DATA_OFFSET,
                    &mut data[..len],
                )?;
                self.codec.rx_done()?;
                Some(Message::Random { data, len })
            }
            event => {
                self.codec.rx_done()?;
                self.route(event)
            }
        };
        if let Some(message) = message {
            mailbox.post(message);
        }
        Ok(())
    }
    /// Apply a control event to the driver state and return the message for the caller, if any.
    fn route(&mut self, event: Event) -> Option<Message> {
        match event {
            Event::CurrentRssi(rssi) => Some(Message::Rssi(rssi)),
            Event::ConnectionInfo(info) => {
                self.tracker.set_bssid(info.bssid);
                Some(Message::ConnectionInfo(info))
            }
            Event::ProvisioningInfo(info) => Some(Message::Provisioned(info)),
            Event::ScanDone { count, status } => {
                if !self.scan_in_progress {
                    debug!("Ignoring scan done, since no scan is running.");
                    return None;
                }
                debug!("Scan done with {} results and status {}.", count, status);
                Some(Message::ScanDone { count, status })
            }
            Event::ScanResult { index, ap } => Some(Message::ScanResult { index, ap }),
            Event::SystemTime(time) => Some(Message::SystemTime(time)),
            Event::ConnectionStateChanged { connected, reason } => {
                if connected {
                    self.tracker.apply(Transition::Associated);
                } else {
                    self.tracker.apply(Transition::Disassociated);
                    self.dhcp = None;
                }
                Some(Message::ConnectionChanged { connected, reason })
            }
            Event::DhcpConfiguration(configuration) => {
                let state = self
                    .tracker
                    .apply(Transition::DhcpBound(configuration.address));
                if state.ip_address() != Some(configuration.address) {
                    debug!("Ignoring DHCP configuration, since we're not associated.");
                    return None;
                }
                self.dhcp = Some(configuration);
                let [a, b, c, d] = configuration.address.octets();
                info!("Obtained IP address {}.{}.{}.{}.", a, b, c, d);
                Some(Message::IpAssigned(configuration.address))
            }
            Event::IpConflict(address) => {
                let [a, b, c, d] = address.octets();
                warn!("Another host claims our address {}.{}.{}.{}.", a, b, c, d);
                None
            }
            Event::PacketReady(_) | Event::Prng { .. } => None,
        }
    }
}
