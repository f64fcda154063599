//! Framed WebSocket transport.
//!
//! Wraps the platform WebSocket client behind three guarantees:
//! - **whole frames up** — fragmented text messages are reassembled and the
//!   downlink callback fires exactly once per complete message;
//! - **silent drop down** — `send` is strictly non-blocking; while the link
//!   is not `Connected` outbound frames are discarded with a debug log;
//! - **self-healing** — after a disconnect the client retries every 5 s
//!   (configurable) until the link is back.
//!
//! No error crosses this surface; failures are logged and absorbed.

pub mod reassembly;

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use self::reassembly::{Reassembler, WsChunk};

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Outbound connection attempt in progress.
    Connecting,
    /// Link up; sends pass through.
    Connected,
    /// Link down; waiting for the auto-reconnect timer.
    Disconnected,
}

type CompleteCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub struct Transport {
    state: Mutex<LinkState>,
    reassembler: Mutex<Reassembler>,
    on_complete: Mutex<Option<CompleteCallback>>,
    reconnect_delay_ms: u32,
    /// Uptime at the moment the link last dropped (drives sim reconnect).
    #[cfg(not(target_os = "espidf"))]
    disconnected_at_ms: Mutex<Option<u64>>,
    #[cfg(not(target_os = "espidf"))]
    sim_sent: Mutex<Vec<String>>,
    #[cfg(target_os = "espidf")]
    client: Mutex<Option<EspWsClient>>,
}

impl Transport {
    pub fn new(reconnect_delay_ms: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LinkState::Disconnected),
            reassembler: Mutex::new(Reassembler::new()),
            on_complete: Mutex::new(None),
            reconnect_delay_ms,
            #[cfg(not(target_os = "espidf"))]
            disconnected_at_ms: Mutex::new(None),
            #[cfg(not(target_os = "espidf"))]
            sim_sent: Mutex::new(Vec::new()),
            #[cfg(target_os = "espidf")]
            client: Mutex::new(None),
        })
    }

    /// Open the outbound connection. `on_complete` fires exactly once per
    /// complete application message, in the receive task's context.
    pub fn start(self: &Arc<Self>, url: &str, on_complete: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_complete.lock().unwrap() = Some(Arc::new(on_complete));
        *self.state.lock().unwrap() = LinkState::Connecting;
        info!("Transport: connecting to {}...", url);

        #[cfg(target_os = "espidf")]
        {
            match EspWsClient::start(url, self.reconnect_delay_ms, Arc::clone(self)) {
                Ok(client) => *self.client.lock().unwrap() = Some(client),
                Err(e) => log::error!("Transport: client start failed: {}", e),
            }
        }
    }

    /// Non-blocking send. While the link is anything but `Connected` the
    /// frame is dropped silently (debug log only).
    pub fn send(&self, text: &str) {
        if *self.state.lock().unwrap() != LinkState::Connected {
            debug!("Transport: drop TX data: link not connected");
            return;
        }

        #[cfg(target_os = "espidf")]
        {
            let guard = self.client.lock().unwrap();
            if let Some(client) = guard.as_ref() {
                client.send_text(text);
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.sim_sent.lock().unwrap().push(text.to_owned());
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap()
    }

    /// Tear the client down.
    pub fn stop(&self) {
        #[cfg(target_os = "espidf")]
        {
            *self.client.lock().unwrap() = None;
        }
        self.on_disconnected();
        info!("Transport: stopped");
    }

    // ── Event plumbing (shared by both backends) ──────────────

    fn on_connected(&self) {
        *self.state.lock().unwrap() = LinkState::Connected;
        #[cfg(not(target_os = "espidf"))]
        {
            *self.disconnected_at_ms.lock().unwrap() = None;
        }
        info!("Transport: connected");
    }

    fn on_disconnected(&self) {
        *self.state.lock().unwrap() = LinkState::Disconnected;
        // In-flight reassembly is worthless across a reconnect.
        self.reassembler.lock().unwrap().reset();
        warn!("Transport: disconnected");
    }

    fn on_chunk(&self, chunk: &WsChunk<'_>) {
        let complete = self.reassembler.lock().unwrap().feed(chunk);
        if let Some(text) = complete {
            let cb = self.on_complete.lock().unwrap().clone();
            if let Some(cb) = cb {
                cb(&text);
            }
        }
    }

    // ── Simulation control surface ────────────────────────────
    //
    // Host tests drive the link by hand: bring it up, feed chunks the way
    // the client library would, and inspect what was sent.

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connect(&self) {
        self.on_connected();
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_disconnect(&self, now_ms: u64) {
        self.on_disconnected();
        *self.disconnected_at_ms.lock().unwrap() = Some(now_ms);
    }

    /// Drive the auto-reconnect timer: `Disconnected` → `Connecting` once
    /// the delay elapses, then `Connected` on the next tick (the sim peer
    /// always accepts).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_tick(&self, now_ms: u64) {
        let state = *self.state.lock().unwrap();
        match state {
            LinkState::Disconnected => {
                let dropped_at = self.disconnected_at_ms.lock().unwrap().unwrap_or(0);
                if now_ms.saturating_sub(dropped_at) >= self.reconnect_delay_ms as u64 {
                    *self.state.lock().unwrap() = LinkState::Connecting;
                    info!("Transport(sim): auto-reconnect attempt");
                }
            }
            LinkState::Connecting => self.on_connected(),
            LinkState::Connected => {}
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_feed_chunk(&self, op_code: u8, data: &[u8], payload_offset: usize, payload_len: usize) {
        self.on_chunk(&WsChunk {
            op_code,
            data,
            payload_offset,
            payload_len,
        });
    }

    /// Drain everything sent since the last call.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_take_sent(&self) -> Vec<String> {
        core::mem::take(&mut *self.sim_sent.lock().unwrap())
    }
}

// ── ESP-IDF backend ───────────────────────────────────────────
//
// Thin wrapper over the esp_websocket_client component. The component owns
// the receive task and the reconnect timer; this wrapper translates its
// events into the shared plumbing above.

#[cfg(target_os = "espidf")]
mod esp_ws {
    use super::*;
    use core::ffi::c_void;
    use esp_idf_svc::sys::*;
    use log::error;

    pub struct EspWsClient {
        handle: esp_websocket_client_handle_t,
        // Keeps the Arc alive for as long as the event handler can fire.
        _owner: Arc<Transport>,
    }

    // SAFETY: the client handle is internally synchronised by the
    // esp_websocket_client component.
    unsafe impl Send for EspWsClient {}

    impl EspWsClient {
        pub fn start(
            url: &str,
            reconnect_delay_ms: u32,
            owner: Arc<Transport>,
        ) -> Result<Self, &'static str> {
            let mut url_buf = [0u8; 128];
            let n = url.len().min(127);
            url_buf[..n].copy_from_slice(&url.as_bytes()[..n]);

            // SAFETY: config and URL buffer outlive the init call; the
            // component copies the URL internally.
            let handle = unsafe {
                let mut cfg: esp_websocket_client_config_t = core::mem::zeroed();
                cfg.uri = url_buf.as_ptr() as *const _;
                cfg.reconnect_timeout_ms = reconnect_delay_ms as i32;
                cfg.network_timeout_ms = 10_000;
                // Larger TCP buffer; with PSRAM enabled it lands off-die.
                cfg.buffer_size = 4096;
                // Receive task: below the UI handler, above audio capture.
                cfg.task_prio = 4;
                esp_websocket_client_init(&cfg)
            };
            if handle.is_null() {
                return Err("esp_websocket_client_init failed");
            }

            // The Arc reference handed to the C callback lives until stop;
            // `_owner` below holds the matching strong count.
            let arg = Arc::as_ptr(&owner) as *mut c_void;
            // SAFETY: handler + arg remain valid while the client exists.
            unsafe {
                esp_websocket_register_events(
                    handle,
                    esp_websocket_event_id_t_WEBSOCKET_EVENT_ANY,
                    Some(ws_event_handler),
                    arg,
                );
                if esp_websocket_client_start(handle) != ESP_OK {
                    esp_websocket_client_destroy(handle);
                    return Err("esp_websocket_client_start failed");
                }
            }

            Ok(Self {
                handle,
                _owner: owner,
            })
        }

        pub fn send_text(&self, text: &str) {
            // SAFETY: blocking inside the component is bounded by its
            // network timeout; callers are never UI-locked.
            unsafe {
                esp_websocket_client_send_text(
                    self.handle,
                    text.as_ptr() as *const _,
                    text.len() as i32,
                    0xFFFFFFFF, // portMAX_DELAY
                );
            }
        }
    }

    impl Drop for EspWsClient {
        fn drop(&mut self) {
            // SAFETY: stop/destroy are the component's documented teardown.
            unsafe {
                esp_websocket_client_stop(self.handle);
                esp_websocket_client_destroy(self.handle);
            }
        }
    }

    unsafe extern "C" fn ws_event_handler(
        arg: *mut c_void,
        _base: esp_event_base_t,
        event_id: i32,
        event_data: *mut c_void,
    ) {
        // SAFETY: arg is the Transport the client was registered with; the
        // owning Arc outlives the client (held in EspWsClient::_owner).
        let transport = &*(arg as *const Transport);

        match event_id as u32 {
            x if x == esp_websocket_event_id_t_WEBSOCKET_EVENT_CONNECTED as u32 => {
                transport.on_connected();
            }
            x if x == esp_websocket_event_id_t_WEBSOCKET_EVENT_DISCONNECTED as u32 => {
                transport.on_disconnected();
            }
            x if x == esp_websocket_event_id_t_WEBSOCKET_EVENT_DATA as u32 => {
                let data = &*(event_data as *const esp_websocket_event_data_t);
                let slice = if data.data_ptr.is_null() || data.data_len <= 0 {
                    &[][..]
                } else {
                    core::slice::from_raw_parts(data.data_ptr as *const u8, data.data_len as usize)
                };
                transport.on_chunk(&WsChunk {
                    op_code: data.op_code,
                    data: slice,
                    payload_offset: data.payload_offset as usize,
                    payload_len: data.payload_len as usize,
                });
            }
            x if x == esp_websocket_event_id_t_WEBSOCKET_EVENT_ERROR as u32 => {
                error!("Transport: WEBSOCKET_EVENT_ERROR");
            }
            _ => {}
        }
    }
}

#[cfg(target_os = "espidf")]
use esp_ws::EspWsClient;

// ── Tests ─────────────────────────────────────────────────────
