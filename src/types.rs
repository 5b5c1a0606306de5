use core::net::Ipv4Addr;

use arrayvec::ArrayVec;
use bitfield_struct::bitfield;

use crate::{Error, WiFiResult};

/// The longest SSID allowed by IEEE 802.11.
pub const MAX_SSID_LEN: usize = 32;
/// The longest passphrase accepted by the coprocessor, which is a 64 digit hex PSK.
pub const MAX_PASSPHRASE_LEN: usize = 64;
/// Scan or connect on every channel.
pub const ANY_CHANNEL: u8 = 0xff;

/// Copy bytes up to the first NUL, dropping whatever doesn't fit.
fn collect_nul_terminated<const N: usize>(raw: &[u8]) -> ArrayVec<u8, N> {
    raw.iter()
        .copied()
        .take_while(|byte| *byte != 0)
        .take(N)
        .collect()
}

/// An SSID of at most [MAX_SSID_LEN] bytes.
///
/// SSIDs aren't required to be UTF-8, so the raw bytes are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ssid(ArrayVec<u8, MAX_SSID_LEN>);
impl Ssid {
    pub fn new(ssid: &[u8]) -> WiFiResult<Self> {
        ArrayVec::try_from(ssid)
            .map(Self)
            .map_err(|_| Error::InvalidArgument)
    }
    /// Parse the NUL terminated representation used in coprocessor payloads.
    pub(crate) fn from_nul_terminated(raw: &[u8]) -> Self {
        Self(collect_nul_terminated(raw))
    }
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
    /// Returns the SSID as a string, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl TryFrom<&str> for Ssid {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.as_bytes())
    }
}

/// A WPA passphrase or PSK.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Passphrase(ArrayVec<u8, MAX_PASSPHRASE_LEN>);
impl Passphrase {
    pub fn new(passphrase: &[u8]) -> WiFiResult<Self> {
        ArrayVec::try_from(passphrase)
            .map(Self)
            .map_err(|_| Error::InvalidArgument)
    }
    pub(crate) fn from_nul_terminated(raw: &[u8]) -> Self {
        Self(collect_nul_terminated(raw))
    }
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
// Keep secrets out of the logs.
impl core::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Passphrase(<{} bytes>)", self.len())
    }
}

/// The security suites offered by an access point.
///
/// This is transferred to and from the coprocessor as is.
#[bitfield(u8)]
#[derive(PartialEq, Eq, Hash)]
pub struct SecurityFlags {
    pub open: bool,
    pub wep: bool,
    pub wpa: bool,
    pub wpa2: bool,
    pub enterprise: bool,
    #[bits(3)]
    pub __: u8,
}
impl SecurityFlags {
    pub const OPEN: Self = Self::new().with_open(true);
    pub const WEP: Self = Self::new().with_wep(true);
    pub const WPA2: Self = Self::new().with_wpa2(true);
    pub const WPA_WPA2: Self = Self::new().with_wpa(true).with_wpa2(true);

    /// Check if no credentials are required.
    pub const fn is_open(&self) -> bool {
        self.open() || self.into_bits() & 0b1_1110 == 0
    }
}

/// An access point, as seen during a scan or while connected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApRecord {
    pub ssid: Ssid,
    pub security: SecurityFlags,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// The channel the access point was seen on, or [ANY_CHANNEL].
    pub channel: u8,
    /// The MAC address of the access point, if it was seen during a scan.
    pub bssid: Option<[u8; 6]>,
}
impl ApRecord {
    /// Describe an access point to connect to, on whatever channel it is found.
    pub fn new(ssid: Ssid, security: SecurityFlags) -> Self {
        Self {
            ssid,
            security,
            rssi: 0,
            channel: ANY_CHANNEL,
            bssid: None,
        }
    }
}

/// The current association, as reported by the coprocessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub ap: ApRecord,
    /// The MAC address of the access point.
    pub bssid: [u8; 6],
    /// The address the coprocessor holds. [Ipv4Addr::UNSPECIFIED] before DHCP completed.
    pub ip: Ipv4Addr,
}

/// Wall clock time kept by the coprocessor (UTC, from SNTP).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Credentials entered by a user through the coprocessor's provisioning access point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningInfo {
    pub ap: ApRecord,
    pub passphrase: Passphrase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssid_stops_at_nul() {
        let mut raw = [0u8; 33];
        raw[..4].copy_from_slice(b"Home");
        let ssid = Ssid::from_nul_terminated(&raw);
        assert_eq!(ssid.as_bytes(), b"Home");
        assert_eq!(ssid.as_str(), Some("Home"));
    }
    #[test]
    fn ssid_rejects_overlong() {
        assert_eq!(Ssid::new(&[b'a'; 33]), Err(Error::InvalidArgument));
        assert_eq!(Ssid::new(&[b'a'; 32]).map(|ssid| ssid.len()), Ok(32));
    }
    #[test]
    fn unterminated_ssid_is_truncated() {
        let ssid = Ssid::from_nul_terminated(&[b'x'; 40]);
        assert_eq!(ssid.len(), MAX_SSID_LEN);
    }
    #[test]
    fn security_flags() {
        assert!(SecurityFlags::OPEN.is_open());
        assert!(SecurityFlags::new().is_open());
        assert!(!SecurityFlags::WPA2.is_open());
        assert_eq!(SecurityFlags::WPA2.into_bits(), 0b1000);
        assert_eq!(SecurityFlags::from_bits(0b1100), SecurityFlags::WPA_WPA2);
    }
    #[test]
    fn passphrase_is_not_logged() {
        let passphrase = Passphrase::new(b"hunter22").unwrap();
        let mut out = std::string::String::new();
        core::fmt::write(&mut out, format_args!("{passphrase:?}")).unwrap();
        assert!(!out.contains("hunter22"));
    }
}
