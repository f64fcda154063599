//! End-to-end scenarios against the wired rig.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::json;

use haloterm::transport::LinkState;
use haloterm::ui::node::Widget;
use haloterm::ui::InputEvent;

use crate::rig::{serial, Rig};

fn label_text(rig: &Rig, id: &str) -> String {
    let guard = rig.ui.lock();
    let engine = guard.borrow_mut();
    let node = engine.find_by_id(id).expect("widget present");
    match &engine.node(node).unwrap().widget {
        Widget::Label { text, .. } => text.clone(),
        _ => panic!("{id} is not a label"),
    }
}

// ── 1. Hold-to-talk ───────────────────────────────────────────

#[test]
fn hold_to_talk_streams_while_pressed() {
    let _s = serial();
    let rig = Rig::boot();
    rig.connect();

    rig.server_push(
        "ui/layout",
        &json!([{
            "type": "button", "id": "talk", "text": "Hold to talk",
            "on_press": "local://audio/cmd/record_start",
            "on_release": "local://audio/cmd/record_stop"
        }]),
    );

    let talk = {
        let guard = rig.ui.lock();
        let engine = guard.borrow_mut();
        engine.find_by_id("talk").expect("button built")
    };

    // Press: the local URI starts capture.
    {
        let guard = rig.ui.lock();
        guard.borrow_mut().on_input(talk, InputEvent::Press, &rig.bus);
    }
    assert!(rig.audio.is_recording());
    std::thread::sleep(Duration::from_millis(200));

    // Release stops the stream.
    {
        let guard = rig.ui.lock();
        guard
            .borrow_mut()
            .on_input(talk, InputEvent::Release, &rig.bus);
    }
    assert!(!rig.audio.is_recording());
    std::thread::sleep(Duration::from_millis(100));

    let frames = rig.take_uplink();
    let audio_frames: Vec<&serde_json::Value> = frames
        .iter()
        .filter(|(t, _)| t == "audio/record")
        .map(|(_, p)| p)
        .collect();

    assert_eq!(audio_frames[0]["state"], "start");
    let stop_idx = audio_frames
        .iter()
        .position(|p| p["state"] == "stop")
        .expect("stop frame present");
    let streams_before_stop = audio_frames[..stop_idx]
        .iter()
        .filter(|p| p["state"] == "stream")
        .count();
    assert!(streams_before_stop >= 1, "no stream frames while pressed");

    // Stream payloads carry decodable PCM.
    let sample = audio_frames[1..stop_idx]
        .iter()
        .find(|p| p["state"] == "stream")
        .unwrap();
    let pcm = BASE64_STANDARD
        .decode(sample["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(pcm.len(), 1024);

    // Streaming ceases within one chunk period of the stop frame.
    let stray_after_stop = audio_frames[stop_idx + 1..]
        .iter()
        .filter(|p| p["state"] == "stream")
        .count();
    assert!(stray_after_stop <= 1, "{stray_after_stop} frames after stop");

    std::thread::sleep(Duration::from_millis(150));
    let late: Vec<_> = rig.take_uplink();
    assert!(
        late.iter().all(|(t, _)| t != "audio/record"),
        "stream continued after stop"
    );
}

// ── 2. Counter increment ──────────────────────────────────────

#[test]
fn click_round_trip_updates_label() {
    let _s = serial();
    let rig = Rig::boot();
    rig.connect();

    rig.server_push(
        "ui/layout",
        &json!([
            {"type": "label", "id": "count", "text": "0"},
            {"type": "button", "id": "btn", "text": "+1", "on_click": ""}
        ]),
    );
    assert_eq!(label_text(&rig, "count"), "0");

    let btn = {
        let guard = rig.ui.lock();
        let engine = guard.borrow_mut();
        engine.find_by_id("btn").unwrap()
    };
    {
        let guard = rig.ui.lock();
        guard.borrow_mut().on_input(btn, InputEvent::Click, &rig.bus);
    }

    // The click reached the server on the canonical topic.
    let uplink = rig.take_uplink();
    let (topic, payload) = &uplink[0];
    assert_eq!(topic, "ui/click");
    assert_eq!(payload["id"], "btn");

    // The fake server answers with an incremental update.
    rig.server_push("ui/update", &json!({"id": "count", "text": "1"}));
    assert_eq!(label_text(&rig, "count"), "1");
}

// ── 3. Fragmented frame ───────────────────────────────────────

#[test]
fn fragmented_layout_renders_once() {
    let _s = serial();
    let rig = Rig::boot();
    rig.connect();

    // Count layout deliveries alongside the engine's subscription.
    let deliveries = std::sync::Arc::new(std::sync::Mutex::new(0usize));
    {
        let deliveries = deliveries.clone();
        rig.bus.subscribe("ui/layout", move |_| {
            *deliveries.lock().unwrap() += 1;
        });
    }

    // ~12 KiB layout: 150 labels.
    let children: Vec<serde_json::Value> = (0..150)
        .map(|i| {
            json!({"type": "label", "id": format!("row-{i}"),
                   "text": format!("telemetry row number {i} with some padding text")})
        })
        .collect();
    let frame = json!({"topic": "ui/layout", "payload": children}).to_string();
    let bytes = frame.as_bytes();
    assert!(bytes.len() > 8 * 1024);

    // Three arbitrary fragments.
    let a = bytes.len() / 3;
    let b = 2 * bytes.len() / 3;
    rig.transport.sim_feed_chunk(0x01, &bytes[..a], 0, bytes.len());
    rig.transport.sim_feed_chunk(0x00, &bytes[a..b], a, bytes.len());
    rig.transport.sim_feed_chunk(0x00, &bytes[b..], b, bytes.len());

    assert_eq!(*deliveries.lock().unwrap(), 1);

    {
        let guard = rig.ui.lock();
        let engine = guard.borrow_mut();
        let root = engine.root();
        assert_eq!(engine.node(root).unwrap().children.len(), 150);
        assert!(engine.find_by_id("row-0").is_some());
    }
    assert_eq!(
        label_text(&rig, "row-63"),
        "telemetry row number 63 with some padding text"
    );
}

// ── 4. Offline send-drop ──────────────────────────────────────

#[test]
fn offline_sends_drop_silently_and_recover() {
    let _s = serial();
    let rig = Rig::boot();
    assert_ne!(rig.transport.state(), LinkState::Connected);

    for i in 0..100 {
        rig.bus.publish_up("ui/click", &format!(r#"{{"id":"b{i}"}}"#));
    }
    assert!(rig.take_uplink().is_empty());

    rig.connect();
    rig.bus.publish_up("ui/click", r#"{"id":"fresh"}"#);
    let uplink = rig.take_uplink();
    assert_eq!(uplink.len(), 1);
    assert_eq!(uplink[0].1["id"], "fresh");
}

// ── 5. Shake ──────────────────────────────────────────────────

#[test]
fn shake_fires_once_then_cools_down() {
    let _s = serial();
    let rig = Rig::boot();
    rig.connect();

    // One above-threshold burst followed by a cooldown's worth of
    // continued shaking: 11 samples at the 10 Hz poll.
    {
        let mut q = rig.accel_feed.lock().unwrap();
        for _ in 0..11 {
            q.push_back([16.0, 0.0, 0.0]);
        }
    }

    std::thread::sleep(Duration::from_millis(1_500));

    let motions: Vec<_> = rig
        .take_uplink()
        .into_iter()
        .filter(|(t, _)| t == "motion")
        .collect();
    assert_eq!(motions.len(), 1, "expected exactly one motion event");
    let payload = &motions[0].1;
    assert_eq!(payload["type"], "shake");
    let magnitude = payload["magnitude"].as_f64().unwrap();
    assert!((magnitude - 16.0).abs() < 0.1);
}

// ── 6. Particle throttle ──────────────────────────────────────

#[test]
fn recording_throttles_particle_frames() {
    let _s = serial();
    let rig = Rig::boot();
    rig.connect();

    rig.server_push(
        "ui/layout",
        &json!([{"type": "particle", "id": "fx", "canvas_w": 80, "canvas_h": 80}]),
    );

    let fx = {
        let guard = rig.ui.lock();
        let engine = guard.borrow_mut();
        engine.find_by_id("fx").unwrap()
    };
    let frames = |rig: &Rig| {
        let guard = rig.ui.lock();
        let engine = guard.borrow_mut();
        match &engine.node(fx).unwrap().widget {
            Widget::Particle(ps) => ps.frames(),
            _ => panic!(),
        }
    };
    let tick = |rig: &Rig, now: u64| {
        let guard = rig.ui.lock();
        guard.borrow_mut().tick(now, rig.audio.is_recording());
    };

    tick(&rig, 0);
    tick(&rig, 40);
    let drawn = frames(&rig);
    assert!(drawn >= 1);

    // Recording freezes the canvas.
    rig.audio.record_start();
    for t in 0..10u64 {
        tick(&rig, 80 + t * 40);
    }
    assert_eq!(frames(&rig), drawn);

    // One timer period after recording stops, frames resume.
    rig.audio.record_stop();
    tick(&rig, 600);
    assert_eq!(frames(&rig), drawn + 1);
}
