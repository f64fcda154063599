//! Device identity derived from the factory MAC address.
//!
//! The full 6-byte eFuse MAC, rendered as 12 uppercase hex digits, is the
//! `device_id` carried in every telemetry heartbeat. It is deterministic
//! across reboots and requires no provisioning.

/// Hex-rendered MAC: 12 chars.
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x6F, 0x28, 0xA1, 0xB2, 0xC3]
}

/// Render the MAC as the canonical device ID, e.g. `246F28A1B2C3`.
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(
        id,
        "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    id
}
