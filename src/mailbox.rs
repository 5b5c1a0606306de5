use core::net::Ipv4Addr;

use embassy_sync::channel::Channel;

use crate::{
    event::MAX_RANDOM_LEN,
    types::{ApRecord, ConnectionInfo, ProvisioningInfo, SystemTime},
    DefaultRawMutex,
};

const MAILBOX_DEPTH: usize = 8;

/// A control event, handed from the dispatcher to whoever waits for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Message {
    ConnectionChanged { connected: bool, reason: u8 },
    ScanDone { count: u8, status: i8 },
    ScanResult { index: u8, ap: ApRecord },
    ConnectionInfo(ConnectionInfo),
    Rssi(i8),
    Random { data: [u8; MAX_RANDOM_LEN], len: usize },
    SystemTime(SystemTime),
    Provisioned(Result<ProvisioningInfo, u8>),
    IpAssigned(Ipv4Addr),
}
impl Message {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "ConnectionChanged",
            Self::ScanDone { .. } => "ScanDone",
            Self::ScanResult { .. } => "ScanResult",
            Self::ConnectionInfo(_) => "ConnectionInfo",
            Self::Rssi(_) => "Rssi",
            Self::Random { .. } => "Random",
            Self::SystemTime(_) => "SystemTime",
            Self::Provisioned(_) => "Provisioned",
            Self::IpAssigned(_) => "IpAssigned",
        }
    }
}

/// FIFO between the dispatcher and the control API.
pub(crate) struct Mailbox {
    channel: Channel<DefaultRawMutex, Message, MAILBOX_DEPTH>,
}
impl Mailbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }
    /// Queue a message. If nobody collected the previous ones, the message is dropped.
    pub fn post(&self, message: Message) {
        let name = message.name();
        if self.channel.try_send(message).is_err() {
            warn!("Mailbox full, dropping {} message.", name);
        } else {
            trace!("Posted {} message.", name);
        }
    }
    /// Discard stale messages.
    pub fn drain(&self) {
        while let Ok(message) = self.channel.try_receive() {
            trace!("Discarding stale {} message.", message.name());
        }
    }
    /// Wait for the first message, which `filter` maps to `Some`.
    ///
    /// All other messages are discarded.
    pub async fn wait_for<R>(&self, mut filter: impl FnMut(Message) -> Option<R>) -> R {
        loop {
            let message = self.channel.receive().await;
            let name = message.name();
            if let Some(result) = filter(message) {
                return result;
            }
            trace!("Discarding unrelated {} message.", name);
        }
    }
}
