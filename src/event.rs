//! Decoding of the events the coprocessor announces.
//!
//! Every opcode has a payload of fixed size. Shorter payloads are rejected, longer ones are
//! truncated to the expected size.

use core::net::Ipv4Addr;

use crate::{
    rx::{RxHeader, RX_HEADER_LEN},
    types::{ApRecord, ConnectionInfo, Passphrase, ProvisioningInfo, SecurityFlags, Ssid, SystemTime},
    Error, WiFiResult,
};

/// The most random bytes we fetch with a single request.
pub const MAX_RANDOM_LEN: usize = 32;

const SSID_FIELD_LEN: usize = 33;
const PASSPHRASE_FIELD_LEN: usize = 65;

/// The opcodes of the events, which are understood by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    CurrentRssi,
    ConnectionInfo,
    ProvisioningInfo,
    ScanDone,
    ScanResult,
    SystemTime,
    PacketReady,
    Prng,
    ConnectionStateChanged,
    DhcpConfiguration,
    IpConflict,
}
impl Opcode {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            4 => Self::CurrentRssi,
            6 => Self::ConnectionInfo,
            9 => Self::ProvisioningInfo,
            17 => Self::ScanDone,
            19 => Self::ScanResult,
            27 => Self::SystemTime,
            29 => Self::PacketReady,
            32 => Self::Prng,
            44 => Self::ConnectionStateChanged,
            50 => Self::DhcpConfiguration,
            52 => Self::IpConflict,
            _ => return None,
        })
    }
    pub const fn into_u8(self) -> u8 {
        match self {
            Self::CurrentRssi => 4,
            Self::ConnectionInfo => 6,
            Self::ProvisioningInfo => 9,
            Self::ScanDone => 17,
            Self::ScanResult => 19,
            Self::SystemTime => 27,
            Self::PacketReady => 29,
            Self::Prng => 32,
            Self::ConnectionStateChanged => 44,
            Self::DhcpConfiguration => 50,
            Self::IpConflict => 52,
        }
    }
    /// The size of the fixed part of the payload.
    ///
    /// For [Opcode::PacketReady] this is only the RX header and for [Opcode::Prng] only the
    /// descriptor in front of the random bytes.
    pub const fn payload_len(self) -> usize {
        match self {
            Self::CurrentRssi => 4,
            Self::ConnectionInfo => 48,
            Self::ProvisioningInfo => 100,
            Self::ScanDone => 4,
            Self::ScanResult => 44,
            Self::SystemTime => 8,
            Self::PacketReady => RX_HEADER_LEN,
            Self::Prng => 8,
            Self::ConnectionStateChanged => 4,
            Self::DhcpConfiguration => 20,
            Self::IpConflict => 4,
        }
    }
}

/// The network configuration handed out by the DHCP server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DhcpConfiguration {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns_server: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    /// Lease time in seconds.
    pub lease_time: u32,
}

/// A decoded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CurrentRssi(i8),
    ConnectionInfo(ConnectionInfo),
    /// The status code, if provisioning failed or was aborted.
    ProvisioningInfo(Result<ProvisioningInfo, u8>),
    ScanDone {
        count: u8,
        status: i8,
    },
    ScanResult {
        index: u8,
        ap: ApRecord,
    },
    SystemTime(SystemTime),
    PacketReady(RxHeader),
    /// The random bytes follow the descriptor.
    Prng {
        len: u16,
    },
    ConnectionStateChanged {
        connected: bool,
        reason: u8,
    },
    DhcpConfiguration(DhcpConfiguration),
    IpConflict(Ipv4Addr),
}

fn ipv4(raw: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3])
}
fn mac(raw: &[u8]) -> [u8; 6] {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&raw[..6]);
    mac
}

impl Event {
    /// Decode the payload of an event with `opcode`.
    pub fn decode(opcode: Opcode, payload: &[u8]) -> WiFiResult<Self> {
        let Some(payload) = payload.get(..opcode.payload_len()) else {
            return Err(Error::MalformedEvent(opcode.into_u8()));
        };
        Ok(match opcode {
            Opcode::CurrentRssi => Self::CurrentRssi(payload[0] as i8),
            Opcode::ConnectionInfo => {
                let mut ap = ApRecord::new(
                    Ssid::from_nul_terminated(&payload[..SSID_FIELD_LEN]),
                    SecurityFlags::from_bits(payload[33]),
                );
                ap.rssi = payload[44] as i8;
                Self::ConnectionInfo(ConnectionInfo {
                    ap,
                    ip: ipv4(&payload[34..38]),
                    bssid: mac(&payload[38..44]),
                })
            }
            Opcode::ProvisioningInfo => {
                let passphrase_end = SSID_FIELD_LEN + PASSPHRASE_FIELD_LEN;
                let status = payload[99];
                if status != 0 {
                    return Ok(Self::ProvisioningInfo(Err(status)));
                }
                Self::ProvisioningInfo(Ok(ProvisioningInfo {
                    ap: ApRecord::new(
                        Ssid::from_nul_terminated(&payload[..SSID_FIELD_LEN]),
                        SecurityFlags::from_bits(payload[passphrase_end]),
                    ),
                    passphrase: Passphrase::from_nul_terminated(
                        &payload[SSID_FIELD_LEN..passphrase_end],
                    ),
                }))
            }
            Opcode::ScanDone => Self::ScanDone {
                count: payload[0],
                status: payload[1] as i8,
            },
            Opcode::ScanResult => Self::ScanResult {
                index: payload[0],
                ap: ApRecord {
                    ssid: Ssid::from_nul_terminated(&payload[10..10 + SSID_FIELD_LEN]),
                    security: SecurityFlags::from_bits(payload[2]),
                    rssi: payload[1] as i8,
                    channel: payload[3],
                    bssid: Some(mac(&payload[4..10])),
                },
            },
            Opcode::SystemTime => Self::SystemTime(SystemTime {
                year: u16::from_le_bytes([payload[0], payload[1]]),
                month: payload[2],
                day: payload[3],
                hour: payload[4],
                minute: payload[5],
                second: payload[6],
            }),
            Opcode::PacketReady => Self::PacketReady(
                RxHeader::parse(payload).ok_or(Error::MalformedEvent(opcode.into_u8()))?,
            ),
            // The first four bytes are the address of the requesting buffer on the host, which
            // is meaningless to us.
            Opcode::Prng => Self::Prng {
                len: u16::from_le_bytes([payload[4], payload[5]]),
            },
            Opcode::ConnectionStateChanged => Self::ConnectionStateChanged {
                connected: payload[0] == 1,
                reason: payload[1],
            },
            Opcode::DhcpConfiguration => Self::DhcpConfiguration(DhcpConfiguration {
                address: ipv4(&payload[0..4]),
                gateway: ipv4(&payload[4..8]),
                dns_server: ipv4(&payload[8..12]),
                subnet_mask: ipv4(&payload[12..16]),
                lease_time: u32::from_le_bytes([payload[16], payload[17], payload[18], payload[19]]),
            }),
            Opcode::IpConflict => Self::IpConflict(ipv4(payload)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_roundtrip() {
        for raw in 0..=u8::MAX {
            if let Some(opcode) = Opcode::from_u8(raw) {
                assert_eq!(opcode.into_u8(), raw);
            }
        }
        assert_eq!(Opcode::from_u8(0x7f), None);
    }
    #[test]
    fn short_payloads_are_malformed() {
        assert_eq!(
            Event::decode(Opcode::ScanResult, &[0; 43]),
            Err(Error::MalformedEvent(19))
        );
        assert_eq!(
            Event::decode(Opcode::ConnectionStateChanged, &[1]),
            Err(Error::MalformedEvent(44))
        );
    }
    #[test]
    fn scan_result() {
        let mut payload = [0u8; 44];
        payload[0] = 2;
        payload[1] = -40i8 as u8;
        payload[2] = SecurityFlags::WPA2.into_bits();
        payload[3] = 6;
        payload[4..10].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        payload[10..14].copy_from_slice(b"Home");
        let Ok(Event::ScanResult { index, ap }) = Event::decode(Opcode::ScanResult, &payload) else {
            panic!("Scan result wasn't decoded.");
        };
        assert_eq!(index, 2);
        assert_eq!(ap.ssid.as_bytes(), b"Home");
        assert_eq!(ap.security, SecurityFlags::WPA2);
        assert_eq!(ap.rssi, -40);
        assert_eq!(ap.channel, 6);
        assert_eq!(ap.bssid, Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
    }
    #[test]
    fn dhcp_addresses_are_in_network_order() {
        let mut payload = [0u8; 20];
        payload[..4].copy_from_slice(&[192, 168, 1, 20]);
        payload[12..16].copy_from_slice(&[255, 255, 255, 0]);
        payload[16..].copy_from_slice(&3600u32.to_le_bytes());
        let Ok(Event::DhcpConfiguration(configuration)) =
            Event::decode(Opcode::DhcpConfiguration, &payload)
        else {
            panic!("DHCP configuration wasn't decoded.");
        };
        assert_eq!(configuration.address, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(configuration.subnet_mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(configuration.lease_time, 3600);
    }
    #[test]
    fn failed_provisioning() {
        let mut payload = [0u8; 100];
        payload[99] = 1;
        assert_eq!(
            Event::decode(Opcode::ProvisioningInfo, &payload),
            Ok(Event::ProvisioningInfo(Err(1)))
        );
    }
    #[test]
    fn connection_state() {
        assert_eq!(
            Event::decode(Opcode::ConnectionStateChanged, &[0, 3, 0, 0]),
            Ok(Event::ConnectionStateChanged {
                connected: false,
                reason: 3
            })
        );
    }
}
