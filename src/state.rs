use core::net::Ipv4Addr;

use crate::types::ApRecord;

/// The association and IP acquisition state of the coprocessor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// [WiFi::init](crate::WiFi::init) wasn't called yet.
    #[default]
    Init,
    /// Not associated with any access point.
    Idle,
    /// A connect request was posted, but the coprocessor hasn't reported the outcome yet.
    Associating,
    /// Associated, but without an IPv4 address.
    Connected,
    /// Associated, with an address acquired over DHCP.
    IpObtained(Ipv4Addr),
}

/// Everything, that moves the [ConnectionState].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The driver was initialized.
    Initialized,
    /// The host posted a connect request.
    ConnectRequested,
    /// The coprocessor reported, that it's associated.
    Associated,
    /// The coprocessor reported, that the association is gone or failed.
    Disassociated,
    /// The coprocessor acquired an address.
    DhcpBound(Ipv4Addr),
    /// The host gave up waiting for an association.
    Abort,
}

impl ConnectionState {
    /// Compute the state following `transition`.
    ///
    /// Transitions, that have no meaning in the current state, leave it unchanged.
    pub const fn next(self, transition: Transition) -> Self {
        use ConnectionState::*;
        match (self, transition) {
            (Init, Transition::Initialized) => Idle,
            (Init, _) => Init,

            (_, Transition::Disassociated) => Idle,

            (Idle, Transition::ConnectRequested) => Associating,
            // The coprocessor may reconnect on its own.
            (Idle | Associating, Transition::Associated) => Connected,
            (Associating, Transition::Abort) => Idle,

            (Connected | IpObtained(_), Transition::DhcpBound(address)) => IpObtained(address),

            (state, _) => state,
        }
    }
    /// Check if the coprocessor is associated with an access point.
    pub const fn is_associated(&self) -> bool {
        matches!(self, Self::Connected | Self::IpObtained(_))
    }
    /// The IPv4 address, if one was obtained.
    pub const fn ip_address(&self) -> Option<Ipv4Addr> {
        match self {
            Self::IpObtained(address) => Some(*address),
            _ => None,
        }
    }
    /// A short name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Idle => "Idle",
            Self::Associating => "Associating",
            Self::Connected => "Connected",
            Self::IpObtained(_) => "IpObtained",
        }
    }
}

/// Owns the [ConnectionState] and what we last learned about the access point.
#[derive(Debug, Default)]
pub(crate) struct ConnectionTracker {
    state: ConnectionState,
    access_point: Option<ApRecord>,
    bssid: Option<[u8; 6]>,
}
impl ConnectionTracker {
    pub const fn state(&self) -> ConnectionState {
        self.state
    }
    pub fn access_point(&self) -> Option<&ApRecord> {
        self.access_point.as_ref()
    }
    pub const fn bssid(&self) -> Option<[u8; 6]> {
        self.bssid
    }
    /// Apply a transition and return the new state.
    pub fn apply(&mut self, transition: Transition) -> ConnectionState {
        let previous = self.state;
        self.state = previous.next(transition);
        if previous != self.state {
            debug!(
                "Connection state: {} -> {}",
                previous.name(),
                self.state.name()
            );
        }
        if self.state == ConnectionState::Idle && transition == Transition::Disassociated {
            self.bssid = None;
        }
        self.state
    }
    /// Remember the access point we're trying to connect to.
    pub fn set_access_point(&mut self, access_point: ApRecord) {
        self.access_point = Some(access_point);
    }
    pub fn set_bssid(&mut self, bssid: [u8; 6]) {
        self.bssid = Some(bssid);
    }
}
