use core::{cell::RefCell, net::Ipv4Addr};

use embassy_sync::{blocking_mutex, mutex::Mutex};
use embassy_time::{with_timeout, Duration};

use crate::{
    config::Config,
    dispatch::Inner,
    event::{DhcpConfiguration, Opcode, MAX_RANDOM_LEN},
    hif::{Request, MAX_FRAME_LEN},
    mailbox::{Mailbox, Message},
    state::{ConnectionState, Transition},
    sync::{InterruptFlag, SignalQueue},
    transport::Transport,
    types::{ApRecord, ConnectionInfo, Passphrase, ProvisioningInfo, Ssid, SystemTime},
    DefaultRawMutex, Error, WiFiResult,
};

const CONNECT_PAYLOAD_LEN: usize = 100;
const PROVISIONING_PAYLOAD_LEN: usize = 35;

fn connect_payload(ap: &ApRecord, passphrase: Option<&Passphrase>) -> [u8; CONNECT_PAYLOAD_LEN] {
    let mut payload = [0u8; CONNECT_PAYLOAD_LEN];
    let ssid = ap.ssid.as_bytes();
    payload[0] = ssid.len() as u8;
    payload[1..1 + ssid.len()].copy_from_slice(ssid);
    payload[33] = ap.security.into_bits();
    payload[34] = ap.channel;
    if let Some(passphrase) = passphrase {
        let passphrase = passphrase.as_bytes();
        payload[35] = passphrase.len() as u8;
        payload[36..36 + passphrase.len()].copy_from_slice(passphrase);
    }
    payload
}

/// Clears the scan flag, however the scan ends.
struct ScanGuard<'a, T: Transport> {
    wifi: &'a WiFi<T>,
}
impl<T: Transport> Drop for ScanGuard<'_, T> {
    fn drop(&mut self) {
        self.wifi.with_inner(|inner| inner.scan_in_progress = false);
    }
}
/// Returns the state machine to [ConnectionState::Idle], if the association didn't complete.
struct AssociationGuard<'a, T: Transport> {
    wifi: &'a WiFi<T>,
}
impl<T: Transport> Drop for AssociationGuard<'_, T> {
    fn drop(&mut self) {
        self.wifi.with_inner(|inner| inner.tracker.apply(Transition::Abort));
    }
}

/// The driver for the coprocessor.
///
/// All state lives in this struct. It's meant to be placed in a `static` or a `StaticCell`, so
/// that the task calling [WiFi::run] and the tasks using the network can share it.
pub struct WiFi<T> {
    inner: blocking_mutex::Mutex<DefaultRawMutex, RefCell<Inner<T>>>,
    mailbox: Mailbox,
    /// Only one request may be in flight.
    request_lock: Mutex<DefaultRawMutex, ()>,
    config: Config,
    interrupt: InterruptFlag,
    rx_ready: SignalQueue,
}
impl<T: Transport> WiFi<T> {
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            inner: blocking_mutex::Mutex::new(RefCell::new(Inner::new(transport))),
            mailbox: Mailbox::new(),
            request_lock: Mutex::new(()),
            config,
            interrupt: InterruptFlag::new(),
            rx_ready: SignalQueue::new(),
        }
    }
    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<T>) -> R) -> R {
        self.inner.lock(|inner| f(&mut inner.borrow_mut()))
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    /// Bring up the bus, arm the interrupt line and read the MAC address.
    pub fn init(&self) -> WiFiResult<()> {
        self.with_inner(|inner| {
            inner.codec.init()?;
            inner.mac_address = inner.codec.read_mac_address()?;
            inner.tracker.apply(Transition::Initialized);
            let [a, b, c, d, e, f] = inner.mac_address;
            info!(
                "Coprocessor initialized with MAC address {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}.",
                a, b, c, d, e, f
            );
            Ok(())
        })
    }
    fn ensure_initialized(&self) -> WiFiResult<()> {
        if self.connection_state() == ConnectionState::Init {
            Err(Error::NotInitialized)
        } else {
            Ok(())
        }
    }
    /// The MAC address of the coprocessor. All zeros before [WiFi::init].
    pub fn get_mac_address(&self) -> [u8; 6] {
        self.with_inner(|inner| inner.mac_address)
    }
    pub fn connection_state(&self) -> ConnectionState {
        self.with_inner(|inner| inner.tracker.state())
    }
    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        self.connection_state().ip_address()
    }
    /// The network configuration, while we hold an address.
    pub fn dhcp_configuration(&self) -> Option<DhcpConfiguration> {
        self.with_inner(|inner| inner.dhcp)
    }
    /// The access point of the last connect attempt.
    pub fn current_ap(&self) -> Option<ApRecord> {
        self.with_inner(|inner| inner.tracker.access_point().cloned())
    }
    /// The BSSID of the access point, if the coprocessor told us about it.
    pub fn current_bssid(&self) -> Option<[u8; 6]> {
        self.with_inner(|inner| inner.tracker.bssid())
    }

    /// Record, that the coprocessor raised its interrupt line.
    ///
    /// This is the only function, that may be called from interrupt context. The events are
    /// handled later by [WiFi::isr].
    pub fn on_interrupt(&self) {
        self.interrupt.raise();
    }
    /// Wait for [WiFi::on_interrupt] to be called.
    pub async fn wait_for_interrupt(&self) {
        self.interrupt.wait().await
    }
    /// Handle pending events.
    ///
    /// Returns the number of events handled. At most [Config::max_events_per_isr] events are
    /// handled per call. If more may be pending, because the limit was hit or an event failed, the
    /// interrupt flag is raised again.
    pub fn isr(&self) -> WiFiResult<usize> {
        self.interrupt.take();
        let mut handled = 0;
        while handled < self.config.max_events_per_isr {
            match self.with_inner(|inner| inner.dispatch_one(&self.mailbox, &self.rx_ready)) {
                Ok(true) => handled += 1,
                Ok(false) => return Ok(handled),
                Err(err) => {
                    self.interrupt.raise();
                    return Err(err);
                }
            }
        }
        self.interrupt.raise();
        Ok(handled)
    }
    /// Service the interrupt line forever.
    ///
    /// This has to run in its own task, for any of the async functions to complete.
    pub async fn run(&self) -> ! {
        loop {
            self.wait_for_interrupt().await;
            match self.isr() {
                Ok(handled) => trace!("Handled {} events.", handled),
                Err(err) => error!("Handling events failed: {:?}", err),
            }
        }
    }

    /// Transmit an Ethernet frame, which is split over `iovecs`.
    ///
    /// Returns the number of bytes accepted by the coprocessor. If it has no space for the frame,
    /// [Error::BusBusy] is returned and the frame should be retried later.
    pub fn send(&self, iovecs: &[&[u8]]) -> WiFiResult<usize> {
        self.ensure_initialized()?;
        let length = iovecs.iter().map(|iovec| iovec.len()).sum::<usize>();
        if length == 0 {
            return Ok(0);
        }
        if length > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge);
        }
        let sent = self.with_inner(|inner| inner.codec.send_frame(iovecs))?;
        trace!("Sent frame with {} bytes.", sent);
        Ok(sent)
    }
    /// Copy the next bytes of the current received frame into `buf`.
    ///
    /// Returns the number of bytes copied, which is zero, if no frame is pending. A frame larger
    /// than `buf` is delivered over multiple calls. If the frame can't be released after its last
    /// bytes were copied, the error is returned and the next call delivers those bytes again.
    pub fn receive(&self, buf: &mut [u8]) -> WiFiResult<usize> {
        self.with_inner(|inner| {
            let Some((address, length)) = inner.rx.next_chunk(buf.len()) else {
                return Ok(0);
            };
            let buf = &mut buf[..length];
            inner.codec.read_payload(address, buf)?;
            // The buffer is only forgotten once the coprocessor took it back.
            if length == inner.rx.pending_len() {
                inner.codec.rx_done()?;
            }
            inner.rx.advance(length);
            Ok(length)
        })
    }
    /// The number of bytes of the current frame, that weren't received yet.
    pub fn pending_rx_len(&self) -> usize {
        self.with_inner(|inner| inner.rx.pending_len())
    }
    /// Wait for a received frame and return its length.
    pub async fn wait_for_frame(&self) -> usize {
        loop {
            let pending = self.pending_rx_len();
            if pending != 0 {
                return pending;
            }
            self.rx_ready.next().await;
        }
    }

    /// Post a request and wait for the first message, which `filter` accepts.
    ///
    /// The request lock must be held.
    async fn request<R>(
        &self,
        request: Request,
        payload: &[u8],
        timeout: Duration,
        filter: impl FnMut(Message) -> Option<R>,
    ) -> WiFiResult<R> {
        self.mailbox.drain();
        self.with_inner(|inner| inner.codec.send_request(request, payload))?;
        with_timeout(timeout, self.mailbox.wait_for(filter))
            .await
            .map_err(|_| {
                debug!("Request {} timed out.", request.into_bits());
                Error::Timeout
            })
    }
    /// Scan for access points.
    ///
    /// Returns the number of access points found, which can then be retrieved with
    /// [WiFi::read_scan_result].
    pub async fn scan(&self) -> WiFiResult<u8> {
        self.ensure_initialized()?;
        self.with_inner(|inner| {
            if inner.scan_in_progress {
                return Err(Error::ScanInProgress);
            }
            inner.scan_in_progress = true;
            inner.scan_count = None;
            Ok(())
        })?;
        let _scan_guard = ScanGuard { wifi: self };
        let _request_lock = self.request_lock.lock().await;

        let passive_scan_time = self.config.passive_scan_time_ms.to_le_bytes();
        let payload = [
            self.config.scan_channel,
            0,
            passive_scan_time[0],
            passive_scan_time[1],
        ];
        let (count, status) = self
            .request(Request::Scan, &payload, self.config.scan_timeout, |message| {
                match message {
                    Message::ScanDone { count, status } => Some((count, status)),
                    _ => None,
                }
            })
            .await?;
        if status != 0 {
            return Err(Error::RequestRejected(status as u8));
        }
        self.with_inner(|inner| inner.scan_count = Some(count));
        debug!("Scan found {} access points.", count);
        Ok(count)
    }
    /// Retrieve one result of the last scan.
    pub async fn read_scan_result(&self, index: u8) -> WiFiResult<ApRecord> {
        self.ensure_initialized()?;
        let _request_lock = self.request_lock.lock().await;
        self.with_inner(|inner| {
            if inner.scan_in_progress {
                return Err(Error::ScanInProgress);
            }
            match inner.scan_count {
                Some(count) if index < count => Ok(()),
                _ => Err(Error::InvalidIndex),
            }
        })?;
        self.request(
            Request::ScanResult,
            &[index, 0, 0, 0],
            self.config.request_timeout,
            |message| match message {
                Message::ScanResult {
                    index: result_index,
                    ap,
                } if result_index == index => Some(ap),
                _ => None,
            },
        )
        .await
    }
    async fn associate(&self, ap: &ApRecord, passphrase: Option<&Passphrase>) -> WiFiResult<()> {
        let _request_lock = self.request_lock.lock().await;
        self.with_inner(|inner| match inner.tracker.state() {
            ConnectionState::Init => Err(Error::NotInitialized),
            ConnectionState::Idle => {
                inner.tracker.set_access_point(ap.clone());
                inner.tracker.apply(Transition::ConnectRequested);
                Ok(())
            }
            _ => Err(Error::InvalidState),
        })?;
        let _association_guard = AssociationGuard { wifi: self };

        let payload = connect_payload(ap, passphrase);
        match self
            .request(
                Request::Connect,
                &payload,
                self.config.connect_timeout,
                |message| match message {
                    Message::ConnectionChanged { connected, reason } => Some((connected, reason)),
                    _ => None,
                },
            )
            .await
        {
            Ok((true, _)) => Ok(()),
            Ok((false, reason)) => {
                warn!("Association failed with reason {}.", reason);
                Err(Error::ConnectFailed(reason))
            }
            Err(Error::Timeout) => {
                warn!("Association timed out.");
                // Keep the coprocessor from associating after we gave up.
                if let Err(err) =
                    self.with_inner(|inner| inner.codec.send_request(Request::Disconnect, &[]))
                {
                    debug!("Cancelling the association failed: {:?}", err);
                }
                Err(Error::ConnectTimeout)
            }
            Err(err) => Err(err),
        }
    }
    /// Connect to an access point, with the credentials stored on the coprocessor or without any.
    ///
    /// This returns once the coprocessor reported the association. Use [WiFi::wait_for_ip] to
    /// wait for DHCP.
    pub async fn connect(&self, ap: &ApRecord) -> WiFiResult<()> {
        self.associate(ap, None).await
    }
    /// Connect to an access point with a passphrase.
    pub async fn connect_with_passphrase(
        &self,
        ap: &ApRecord,
        passphrase: &Passphrase,
    ) -> WiFiResult<()> {
        self.associate(ap, Some(passphrase)).await
    }
    /// Tear down the current association.
    pub async fn disconnect(&self) -> WiFiResult<()> {
        let _request_lock = self.request_lock.lock().await;
        match self.connection_state() {
            ConnectionState::Init => return Err(Error::NotInitialized),
            state if !state.is_associated() => return Err(Error::NotConnected),
            _ => {}
        }
        self.request(
            Request::Disconnect,
            &[],
            self.config.request_timeout,
            |message| match message {
                Message::ConnectionChanged {
                    connected: false, ..
                } => Some(()),
                _ => None,
            },
        )
        .await
    }
    /// Wait for DHCP to complete.
    pub async fn wait_for_ip(&self) -> WiFiResult<Ipv4Addr> {
        let _request_lock = self.request_lock.lock().await;
        match self.connection_state() {
            ConnectionState::Init => return Err(Error::NotInitialized),
            ConnectionState::IpObtained(address) => return Ok(address),
            state if !state.is_associated() => return Err(Error::NotConnected),
            _ => {}
        }
        with_timeout(
            self.config.connect_timeout,
            self.mailbox.wait_for(|message| match message {
                Message::IpAssigned(address) => Some(Ok(address)),
                Message::ConnectionChanged {
                    connected: false, ..
                } => Some(Err(Error::NotConnected)),
                _ => None,
            }),
        )
        .await
        .map_err(|_| Error::Timeout)?
    }
    /// Query the coprocessor for the current association.
    pub async fn connection_info(&self) -> WiFiResult<ConnectionInfo> {
        let _request_lock = self.request_lock.lock().await;
        self.ensure_associated()?;
        self.request(
            Request::GetConnectionInfo,
            &[],
            self.config.request_timeout,
            |message| match message {
                Message::ConnectionInfo(info) => Some(info),
                _ => None,
            },
        )
        .await
    }
    fn ensure_associated(&self) -> WiFiResult<()> {
        match self.connection_state() {
            ConnectionState::Init => Err(Error::NotInitialized),
            state if state.is_associated() => Ok(()),
            _ => Err(Error::NotConnected),
        }
    }
    /// The signal strength of the access point in dBm.
    pub async fn rssi(&self) -> WiFiResult<i8> {
        let _request_lock = self.request_lock.lock().await;
        self.ensure_associated()?;
        self.request(
            Request::CurrentRssi,
            &[],
            self.config.request_timeout,
            |message| match message {
                Message::Rssi(rssi) => Some(rssi),
                _ => None,
            },
        )
        .await
    }
    /// Fill `buf` with random bytes from the hardware RNG of the coprocessor.
    pub async fn random_bytes(&self, buf: &mut [u8]) -> WiFiResult<()> {
        self.ensure_initialized()?;
        let _request_lock = self.request_lock.lock().await;
        let mut filled = 0;
        while filled < buf.len() {
            let requested = (buf.len() - filled).min(MAX_RANDOM_LEN);
            let requested_bytes = (requested as u16).to_le_bytes();
            let (data, len) = self
                .request(
                    Request::GetPrng,
                    &[requested_bytes[0], requested_bytes[1], 0, 0],
                    self.config.request_timeout,
                    |message| match message {
                        Message::Random { data, len } => Some((data, len)),
                        _ => None,
                    },
                )
                .await?;
            let len = len.min(requested);
            if len == 0 {
                return Err(Error::MalformedEvent(Opcode::Prng.into_u8()));
            }
            buf[filled..filled + len].copy_from_slice(&data[..len]);
            filled += len;
        }
        Ok(())
    }
    /// The wall clock time of the coprocessor.
    pub async fn system_time(&self) -> WiFiResult<SystemTime> {
        self.ensure_initialized()?;
        let _request_lock = self.request_lock.lock().await;
        self.request(
            Request::GetSystemTime,
            &[],
            self.config.request_timeout,
            |message| match message {
                Message::SystemTime(time) => Some(time),
                _ => None,
            },
        )
        .await
    }
    /// Open an access point named `ssid` on `channel` and wait for a user to enter the
    /// credentials of the network to join.
    pub async fn provision(&self, ssid: &Ssid, channel: u8) -> WiFiResult<ProvisioningInfo> {
        let _request_lock = self.request_lock.lock().await;
        match self.connection_state() {
            ConnectionState::Init => return Err(Error::NotInitialized),
            ConnectionState::Idle => {}
            _ => return Err(Error::InvalidState),
        }
        let mut payload = [0u8; PROVISIONING_PAYLOAD_LEN];
        payload[0] = ssid.len() as u8;
        payload[1..1 + ssid.len()].copy_from_slice(ssid.as_bytes());
        payload[33] = channel;
        match self
            .request(
                Request::StartProvisioning,
                &payload,
                self.config.provisioning_timeout,
                |message| match message {
                    Message::Provisioned(info) => Some(info),
                    _ => None,
                },
            )
            .await
        {
            Ok(Ok(info)) => Ok(info),
            Ok(Err(status)) => Err(Error::RequestRejected(status)),
            Err(err) => {
                if let Err(err) =
                    self.with_inner(|inner| inner.codec.send_request(Request::StopProvisioning, &[]))
                {
                    debug!("Stopping provisioning failed: {:?}", err);
                }
                Err(err)
            }
        }
    }
}
