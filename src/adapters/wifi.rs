//! Wi-Fi station adapter.
//!
//! The MAC/PHY and TCP/IP stack are external collaborators; this adapter is
//! only the interface the firmware consumes: bring the station up with the
//! provisioned credentials, then answer RSSI/IP queries for telemetry.
//!
//! Activating the driver permanently fragments internal SRAM, which is why
//! the boot orchestrator calls [`WifiStation::connect`] only after every
//! DMA-adjacent buffer has been reserved.
//!
//! - **`target_os = "espidf"`**: raw `esp_wifi_*` / `esp_netif_*` calls.
//! - **all other targets**: simulation with deterministic RSSI/IP.

use core::fmt;
use log::info;

#[cfg(target_os = "espidf")]
use log::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    /// SSID empty or longer than the 32-byte 802.11 limit.
    InvalidSsid,
    /// Password outside the 8–64 byte WPA2 bounds (empty = open network).
    InvalidPassword,
    /// Driver or stack bring-up failed.
    ConnectFailed,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (1-32 bytes required)"),
            Self::InvalidPassword => write!(f, "password invalid (8-64 bytes, or empty for open)"),
            Self::ConnectFailed => write!(f, "WiFi connection failed"),
        }
    }
}

pub struct WifiStation {
    connected: bool,
    ssid: heapless::String<32>,
}

impl WifiStation {
    pub fn new() -> Self {
        Self {
            connected: false,
            ssid: heapless::String::new(),
        }
    }

    /// Bring the station up and connect. Blocks until the driver accepts
    /// the connect request; DHCP completes asynchronously in the stack.
    pub fn connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(WifiError::InvalidSsid);
        }
        if !password.is_empty() && (password.len() < 8 || password.len() > 64) {
            return Err(WifiError::InvalidPassword);
        }

        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|_| WifiError::InvalidSsid)?;

        info!("WiFi: connecting to '{}'", self.ssid);
        self.platform_connect(password)?;
        self.connected = true;
        info!("WiFi: station up (RSSI={:?})", self.rssi());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Signal strength of the associated AP in dBm, if associated.
    pub fn rssi(&self) -> Option<i8> {
        if !self.connected {
            return None;
        }
        self.platform_rssi()
    }

    /// Current IPv4 address as dotted quad, `0.0.0.0` before DHCP.
    pub fn ip_addr(&self) -> heapless::String<16> {
        let mut out = heapless::String::new();
        if !self.connected {
            let _ = out.push_str("0.0.0.0");
            return out;
        }
        self.platform_ip(&mut out);
        out
    }

    // ── Platform backends ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, password: &str) -> Result<(), WifiError> {
        use esp_idf_svc::sys::*;
        // SAFETY: one-shot bring-up from the main task, before any
        // concurrent use of the Wi-Fi driver.
        unsafe {
            if esp_netif_init() != ESP_OK {
                error!("WiFi: esp_netif_init failed");
                return Err(WifiError::ConnectFailed);
            }
            let loop_ret = esp_event_loop_create_default();
            if loop_ret != ESP_OK && loop_ret != ESP_ERR_INVALID_STATE {
                error!("WiFi: event loop create failed ({})", loop_ret);
                return Err(WifiError::ConnectFailed);
            }
            esp_netif_create_default_wifi_sta();

            let init_cfg = wifi_init_config_t::default();
            if esp_wifi_init(&init_cfg) != ESP_OK {
                error!("WiFi: esp_wifi_init failed");
                return Err(WifiError::ConnectFailed);
            }

            let mut wifi_cfg: wifi_config_t = core::mem::zeroed();
            let sta = &mut wifi_cfg.sta;
            let ssid_bytes = self.ssid.as_bytes();
            let pw_bytes = password.as_bytes();
            sta.ssid[..ssid_bytes.len()].copy_from_slice(ssid_bytes);
            sta.password[..pw_bytes.len()].copy_from_slice(pw_bytes);
            sta.threshold.authmode = if password.is_empty() {
                wifi_auth_mode_t_WIFI_AUTH_OPEN
            } else {
                wifi_auth_mode_t_WIFI_AUTH_WPA2_PSK
            };

            if esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA) != ESP_OK
                || esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut wifi_cfg) != ESP_OK
                || esp_wifi_start() != ESP_OK
                || esp_wifi_connect() != ESP_OK
            {
                error!("WiFi: STA start/connect failed");
                return Err(WifiError::ConnectFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, _password: &str) -> Result<(), WifiError> {
        info!("WiFi(sim): connected to '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::*;
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        if unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) } == ESP_OK {
            Some(ap_info.rssi)
        } else {
            None
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        Some(-58)
    }

    #[cfg(target_os = "espidf")]
    fn platform_ip(&self, out: &mut heapless::String<16>) {
        use core::fmt::Write;
        use esp_idf_svc::sys::*;
        // SAFETY: read-only queries against the default STA netif.
        unsafe {
            let key = b"WIFI_STA_DEF\0";
            let netif = esp_netif_get_handle_from_ifkey(key.as_ptr() as *const _);
            let mut ip_info: esp_netif_ip_info_t = core::mem::zeroed();
            if !netif.is_null() && esp_netif_get_ip_info(netif, &mut ip_info) == ESP_OK {
                let ip = u32::from_le(ip_info.ip.addr);
                let _ = write!(
                    out,
                    "{}.{}.{}.{}",
                    ip & 0xFF,
                    (ip >> 8) & 0xFF,
                    (ip >> 16) & 0xFF,
                    (ip >> 24) & 0xFF
                );
                return;
            }
        }
        let _ = out.push_str("0.0.0.0");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_ip(&self, out: &mut heapless::String<16>) {
        let _ = out.push_str("192.168.1.42");
    }
}

impl Default for WifiStation {
    fn default() -> Self {
        Self::new()
    }
}
