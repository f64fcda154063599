//! Periodic device heartbeat.
//!
//! Every report interval the task snapshots device identity, link quality,
//! chip temperature, heap headroom and uptime, serialises the snapshot and
//! publishes it on `telemetry/heartbeat`. The first report waits a few
//! seconds so the transport has a chance to come up; while the link is
//! down the bus send-drop policy keeps reports from piling up anywhere.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};
use serde::Serialize;

use crate::adapters::device_id::{self, DeviceIdString};
use crate::adapters::mem;
use crate::adapters::temp::TempSensor;
use crate::adapters::time::MonotonicClock;
use crate::adapters::wifi::WifiStation;
use crate::bus::Bus;
use crate::drivers::task_pin::{spawn_pinned, Core, TaskOptions};

/// Delay before the first report.
const INITIAL_DELAY_SECS: u64 = 5;

/// One heartbeat snapshot, serialised verbatim onto the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub device_id: DeviceIdString,
    pub wifi_rssi: i32,
    pub ip: heapless::String<16>,
    pub temperature: f32,
    pub free_heap_internal: u32,
    pub free_heap_total: u32,
    pub uptime_s: u64,
}

/// Collect a snapshot from the ambient sources.
pub fn collect(
    device_id: &DeviceIdString,
    wifi: &Mutex<WifiStation>,
    temp: &TempSensor,
    clock: &MonotonicClock,
) -> Heartbeat {
    let (rssi, ip) = {
        let wifi = wifi.lock().unwrap();
        (wifi.rssi().map(i32::from).unwrap_or(0), wifi.ip_addr())
    };

    Heartbeat {
        device_id: device_id.clone(),
        wifi_rssi: rssi,
        ip,
        temperature: temp.celsius(),
        free_heap_internal: mem::free_heap_internal(),
        free_heap_total: mem::free_heap_total(),
        uptime_s: clock.uptime_secs(),
    }
}

/// Start the reporting task. The device ID is read once from eFuse and
/// registered with the bus for other uplink modules.
pub fn start(bus: Arc<Bus>, wifi: Arc<Mutex<WifiStation>>, interval_secs: u32) {
    let mac = device_id::read_mac();
    let id = device_id::device_id(&mac);
    info!("Telemetry: device ID {}", id);
    bus.set_device_id(&id);

    let interval_secs = if interval_secs > 0 { interval_secs } else { 30 };

    spawn_pinned(
        TaskOptions {
            core: Core::App,
            priority: 2,
            stack_kb: 4,
            stack_in_psram: true,
        },
        "telemetry\0",
        move || {
            let temp = TempSensor::install();
            let clock = MonotonicClock::new();
            info!("Telemetry: reporting every {}s", interval_secs);

            std::thread::sleep(Duration::from_secs(INITIAL_DELAY_SECS));

            loop {
                let snapshot = collect(&id, &wifi, &temp, &clock);
                match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        info!(
                            "Telemetry: id={} rssi={} ip={} heap_int={}",
                            snapshot.device_id,
                            snapshot.wifi_rssi,
                            snapshot.ip,
                            snapshot.free_heap_internal
                        );
                        bus.publish_up("telemetry/heartbeat", &json);
                    }
                    Err(e) => error!("Telemetry: serialisation failed: {}", e),
                }
                std::thread::sleep(Duration::from_secs(interval_secs as u64));
            }
        },
    );
}
