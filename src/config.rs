use embassy_time::Duration;

use crate::types::ANY_CHANNEL;

/// Tunables of the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// How long [WiFi::scan](crate::WiFi::scan) waits for the scan to complete.
    pub scan_timeout: Duration,
    /// How long [WiFi::connect](crate::WiFi::connect) waits for the association.
    pub connect_timeout: Duration,
    /// How long all other requests wait for their response.
    pub request_timeout: Duration,
    /// How long [WiFi::provision](crate::WiFi::provision) waits for the user to enter credentials.
    pub provisioning_timeout: Duration,
    /// The channel to scan, or [ANY_CHANNEL].
    pub scan_channel: u8,
    /// The time spent listening on each channel during a scan, in milliseconds.
    pub passive_scan_time_ms: u16,
    /// The most events [WiFi::isr](crate::WiFi::isr) handles in one call.
    pub max_events_per_isr: usize,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(2),
            provisioning_timeout: Duration::from_secs(300),
            scan_channel: ANY_CHANNEL,
            passive_scan_time_ms: 0,
            max_events_per_isr: 16,
        }
    }
}
