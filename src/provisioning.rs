//! First-boot provisioning branch.
//!
//! A device without stored credentials cannot reach any server, so the
//! boot orchestrator parks here: the provisioning screen goes up, a SoftAP
//! with a captive portal collects `ssid`/`password`/`ws_url`, the strings
//! land in NVS and the device soft-restarts into the normal path.
//!
//! The portal itself (SoftAP, DNS hijack, HTTP form) is an external
//! component; this module owns the branch decision, the screen, the
//! persistence and the restart.

use log::{info, warn};

use crate::adapters::nvs::NvsAdapter;
use crate::ui::SharedUi;

/// Shown while the portal waits for the user.
const PROVISIONING_SCREEN: &str = r##"{
    "type": "container", "flex": "column", "justify": "center",
    "align_items": "center", "gap": 16,
    "children": [
        {"type": "label", "text": "Setup", "font_size": 26, "text_color": "#FFFFFF"},
        {"type": "label", "text": "Join 'HaloTerm-Setup' to configure Wi-Fi",
         "font_size": 16, "text_color": "#AAAAAA",
         "anim": {"type": "breathe"}}
    ]
}"##;

#[cfg(target_os = "espidf")]
extern "C" {
    // Captive-portal component (C side): SoftAP + DNS + HTTP form.
    // Blocks until the user submits; buffers receive NUL-terminated
    // strings.
    fn captive_portal_run(
        ssid: *mut u8,
        ssid_len: usize,
        password: *mut u8,
        password_len: usize,
        ws_url: *mut u8,
        ws_url_len: usize,
    ) -> i32;
}

/// Returns `true` when the device already has credentials. Otherwise the
/// portal runs to completion; on hardware this call never returns (the
/// device restarts), on the host the simulation stores test credentials
/// and returns `false` so boot can continue.
pub fn ensure_provisioned(ui: &SharedUi, nvs: &mut NvsAdapter) -> bool {
    if nvs.is_provisioned() {
        return true;
    }

    warn!("Provisioning: no stored SSID, entering setup mode");
    {
        let guard = ui.lock();
        guard.borrow_mut().render(PROVISIONING_SCREEN);
    }

    run_portal(nvs);
    false
}

#[cfg(target_os = "espidf")]
fn run_portal(nvs: &mut NvsAdapter) {
    let mut ssid = [0u8; 33];
    let mut password = [0u8; 65];
    let mut ws_url = [0u8; 97];

    // SAFETY: buffers outlive the blocking call; the portal NUL-terminates.
    let ret = unsafe {
        captive_portal_run(
            ssid.as_mut_ptr(),
            ssid.len(),
            password.as_mut_ptr(),
            password.len(),
            ws_url.as_mut_ptr(),
            ws_url.len(),
        )
    };
    if ret != 0 {
        log::error!("Provisioning: portal failed ({}), restarting", ret);
        // SAFETY: esp_restart never returns.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    let as_str = |buf: &[u8]| -> heapless::String<96> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let mut s = heapless::String::new();
        let _ = s.push_str(core::str::from_utf8(&buf[..end]).unwrap_or(""));
        s
    };

    let _ = nvs.set_credential("ssid", &as_str(&ssid));
    let _ = nvs.set_credential("password", &as_str(&password));
    let _ = nvs.set_credential("ws_url", &as_str(&ws_url));
    info!("Provisioning: credentials stored, restarting");

    // SAFETY: esp_restart never returns.
    unsafe { esp_idf_svc::sys::esp_restart() };
}

/// Host simulation: "the user" submits fixed credentials immediately.
#[cfg(not(target_os = "espidf"))]
fn run_portal(nvs: &mut NvsAdapter) {
    let _ = nvs.set_credential("ssid", "SimNet");
    let _ = nvs.set_credential("password", "simsecret");
    let _ = nvs.set_credential("ws_url", "ws://127.0.0.1:8080");
    info!("Provisioning(sim): test credentials stored");
}
