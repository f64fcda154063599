//! Topic-routed publish/subscribe message bus.
//!
//! One bus unifies three flows:
//! - **downlink** — complete text frames from the transport are demuxed by
//!   the outer `{topic, payload}` envelope and fanned out to subscribers;
//! - **uplink** — device modules publish payloads that get wrapped into the
//!   envelope and handed to the transport's non-blocking send;
//! - **local** — device-internal events fan out with no serialisation and
//!   no transport involvement.
//!
//! The bus parses only the envelope. Payloads cross the bus as strings and
//! are re-parsed by whichever subscriber cares, which keeps dispatch
//! O(topic length) and avoids a second allocation for payloads that will
//! be parsed again anyway.
//!
//! Callbacks must copy anything they retain; the bus owns payload memory
//! only for the duration of a dispatch. Delivery order among subscribers
//! to one topic is registration order. The table is mutated only during
//! boot, before routing begins.

use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use serde_json::Value;

/// Bounded subscription table size.
pub const MAX_SUBSCRIBERS: usize = 15;

/// Topics are short flat ASCII strings; slashes are for humans only.
pub type TopicString = heapless::String<32>;

type Callback = Arc<dyn Fn(&str) + Send + Sync>;
type UplinkSender = Arc<dyn Fn(&str) + Send + Sync>;

struct Subscriber {
    topic: TopicString,
    cb: Callback,
}

pub struct Bus {
    subscribers: Mutex<heapless::Vec<Subscriber, MAX_SUBSCRIBERS>>,
    uplink: Mutex<Option<UplinkSender>>,
    device_id: Mutex<heapless::String<16>>,
}

impl Bus {
    pub fn new() -> Arc<Self> {
        info!("Bus: initialised");
        Arc::new(Self {
            subscribers: Mutex::new(heapless::Vec::new()),
            uplink: Mutex::new(None),
            device_id: Mutex::new(heapless::String::new()),
        })
    }

    /// Register a callback for a topic. Multiple subscribers per topic are
    /// allowed; each is invoked in registration order. Overflow beyond the
    /// bounded table is a logged no-op.
    pub fn subscribe(&self, topic: &str, cb: impl Fn(&str) + Send + Sync + 'static) {
        let mut t = TopicString::new();
        if t.push_str(topic).is_err() {
            error!("Bus: topic too long, not subscribing: {}", topic);
            return;
        }

        let mut table = self.subscribers.lock().unwrap();
        if table
            .push(Subscriber {
                topic: t,
                cb: Arc::new(cb),
            })
            .is_err()
        {
            error!("Bus: failed to subscribe {}: max subscribers reached", topic);
            return;
        }
        info!("Bus: subscribed to topic: {}", topic);
    }

    /// Demux one complete downlink frame. The outer envelope is parsed;
    /// the payload is materialised as a string — a JSON string payload is
    /// passed by literal value, anything else is re-serialised compactly.
    /// A malformed envelope is logged and dropped; state is unchanged.
    pub fn route_down(&self, raw_text: &str) {
        let root: Value = match serde_json::from_str(raw_text) {
            Ok(v) => v,
            Err(_) => {
                warn!("Bus: failed to parse incoming frame");
                return;
            }
        };

        let Some(topic) = root.get("topic").and_then(Value::as_str) else {
            warn!("Bus: frame missing string 'topic'");
            return;
        };

        let payload: String = match root.get("payload") {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string(other).unwrap_or_default(),
        };

        self.deliver(topic, &payload);
    }

    /// Wrap a payload into the uplink envelope and hand it to the
    /// transport. A payload that parses as JSON is embedded structurally;
    /// anything else is embedded as a JSON string. Send is non-blocking:
    /// without a sender (or with the link down) the frame is dropped.
    pub fn publish_up(&self, topic: &str, payload: &str) {
        let payload_value = match serde_json::from_str::<Value>(payload) {
            Ok(v) => v,
            Err(_) => Value::String(payload.to_owned()),
        };

        let envelope = serde_json::json!({
            "topic": topic,
            "payload": payload_value,
        });

        let text = match serde_json::to_string(&envelope) {
            Ok(t) => t,
            Err(e) => {
                error!("Bus: envelope serialisation failed: {}", e);
                return;
            }
        };

        let sender = self.uplink.lock().unwrap().clone();
        match sender {
            Some(send) => send(&text),
            None => debug!("Bus: no uplink sender, dropping {}", topic),
        }
    }

    /// Fan a payload out to local subscribers. No serialisation, no
    /// transport.
    pub fn publish_local(&self, topic: &str, payload: &str) {
        debug!("Bus: local publish: topic={}", topic);
        self.deliver(topic, payload);
    }

    /// Install the transport send hook. Called once during boot after the
    /// transport starts.
    pub fn set_uplink(&self, send: impl Fn(&str) + Send + Sync + 'static) {
        *self.uplink.lock().unwrap() = Some(Arc::new(send));
    }

    /// Cache the device ID so uplink modules can query it without
    /// re-reading eFuse.
    pub fn set_device_id(&self, id: &str) {
        let mut slot = self.device_id.lock().unwrap();
        slot.clear();
        let _ = slot.push_str(id);
    }

    pub fn device_id(&self) -> heapless::String<16> {
        self.device_id.lock().unwrap().clone()
    }

    /// Invoke every subscriber of `topic` in registration order. The
    /// matching callbacks are collected first so a callback may publish
    /// again without deadlocking on the table lock. One subscriber
    /// panicking cannot be isolated here; failure isolation is per-task.
    fn deliver(&self, topic: &str, payload: &str) {
        let matched: Vec<Callback> = {
            let table = self.subscribers.lock().unwrap();
            table
                .iter()
                .filter(|s| s.topic.as_str() == topic)
                .map(|s| s.cb.clone())
                .collect()
        };

        for cb in matched {
            cb(payload);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        (seen, move |p: &str| seen2.lock().unwrap().push(p.to_owned()))
    }

    #[test]
    fn route_down_delivers_to_matching_topic() {
        let bus = Bus::new();
        let (seen, cb) = collector();
        bus.subscribe("ui/update", cb);

        bus.route_down(r#"{"topic":"ui/update","payload":{"id":"x","text":"hi"}}"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let v: Value = serde_json::from_str(&seen[0]).unwrap();
        assert_eq!(v["id"], "x");
        assert_eq!(v["text"], "hi");
    }

    #[test]
    fn string_payload_passed_by_literal_value() {
        let bus = Bus::new();
        let (seen, cb) = collector();
        bus.subscribe("audio/play", cb);

        bus.route_down(r#"{"topic":"audio/play","payload":"QUJD"}"#);
        assert_eq!(seen.lock().unwrap()[0], "QUJD");
    }

    #[test]
    fn missing_payload_delivers_empty_string() {
        let bus = Bus::new();
        let (seen, cb) = collector();
        bus.subscribe("ping", cb);

        bus.route_down(r#"{"topic":"ping"}"#);
        assert_eq!(seen.lock().unwrap()[0], "");
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let bus = Bus::new();
        let (seen, cb) = collector();
        bus.subscribe("t", cb);

        bus.route_down("not json");
        bus.route_down(r#"{"payload":"no topic"}"#);
        bus.route_down(r#"{"topic":42,"payload":""}"#);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn delivery_respects_registration_order() {
        let bus = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe("t", move |_| order.lock().unwrap().push(tag));
        }

        bus.publish_local("t", "");
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn table_overflow_is_a_logged_noop() {
        let bus = Bus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..MAX_SUBSCRIBERS {
            let count = count.clone();
            bus.subscribe("t", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        // 16th subscriber is dropped.
        let count2 = count.clone();
        bus.subscribe("t", move |_| {
            count2.fetch_add(100, Ordering::SeqCst);
        });

        bus.publish_local("t", "");
        assert_eq!(count.load(Ordering::SeqCst), MAX_SUBSCRIBERS);
    }

    #[test]
    fn publish_up_embeds_json_payload_structurally() {
        let bus = Bus::new();
        let (sent, tx) = collector();
        bus.set_uplink(tx);

        bus.publish_up("motion", r#"{"type":"shake","magnitude":16.0}"#);

        let sent = sent.lock().unwrap();
        let v: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(v["topic"], "motion");
        assert_eq!(v["payload"]["type"], "shake");
    }

    #[test]
    fn publish_up_embeds_plain_text_as_string() {
        let bus = Bus::new();
        let (sent, tx) = collector();
        bus.set_uplink(tx);

        bus.publish_up("debug", "hello there");

        let v: Value = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert_eq!(v["payload"], "hello there");
    }

    #[test]
    fn publish_up_without_sender_is_silent() {
        let bus = Bus::new();
        bus.publish_up("t", "dropped");
    }

    #[test]
    fn publish_local_does_not_touch_uplink() {
        let bus = Bus::new();
        let (sent, tx) = collector();
        bus.set_uplink(tx);
        let (seen, cb) = collector();
        bus.subscribe("local/x", cb);

        bus.publish_local("local/x", "raw-not-json{");

        assert_eq!(seen.lock().unwrap()[0], "raw-not-json{");
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn callback_may_publish_again() {
        let bus = Bus::new();
        let (seen, cb) = collector();
        bus.subscribe("second", cb);
        let bus2 = bus.clone();
        bus.subscribe("first", move |_| bus2.publish_local("second", "chained"));

        bus.publish_local("first", "");
        assert_eq!(seen.lock().unwrap()[0], "chained");
    }

    #[test]
    fn device_id_is_cached() {
        let bus = Bus::new();
        bus.set_device_id("246F28A1B2C3");
        assert_eq!(bus.device_id().as_str(), "246F28A1B2C3");
    }

    #[test]
    fn round_trip_preserves_structure() {
        let bus = Bus::new();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent2 = sent.clone();
        bus.set_uplink(move |t: &str| sent2.lock().unwrap().push(t.to_owned()));
        let (seen, cb) = collector();
        bus.subscribe("echo", cb);

        bus.publish_up("echo", r#"{"n":1,"s":"x"}"#);
        let wire = sent.lock().unwrap()[0].clone();
        bus.route_down(&wire);

        let v: Value = serde_json::from_str(&seen.lock().unwrap()[0]).unwrap();
        assert_eq!(v["n"], 1);
        assert_eq!(v["s"], "x");
    }
}
