//! WebSocket fragment reassembly.
//!
//! The client library reports incoming data as chunks carrying
//! `(op_code, data, payload_offset, payload_len)`. A chunk with
//! `payload_offset == 0` opens a fresh buffer sized for the whole
//! application message; subsequent chunks append until the accumulated
//! length reaches `payload_len`, at which point the complete text is
//! handed up and the buffer is released. A disconnect mid-message discards
//! the in-flight buffer — zero callbacks fire for that frame.

use log::{debug, error};

use crate::adapters::mem::{Region, RegionBuf};

/// Continuation frame.
pub const OP_CONTINUATION: u8 = 0x00;
/// Text frame.
pub const OP_TEXT: u8 = 0x01;

/// One chunk as reported by the client library.
#[derive(Debug, Clone, Copy)]
pub struct WsChunk<'a> {
    pub op_code: u8,
    pub data: &'a [u8],
    pub payload_offset: usize,
    pub payload_len: usize,
}

/// Reassembles fragmented text messages into whole payloads.
pub struct Reassembler {
    buf: Option<RegionBuf>,
    filled: usize,
    expected: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buf: None,
            filled: 0,
            expected: 0,
        }
    }

    /// Feed one chunk. Returns the complete message text exactly once,
    /// when the final chunk lands. Non-text frames are ignored.
    pub fn feed(&mut self, chunk: &WsChunk<'_>) -> Option<String> {
        if chunk.op_code != OP_TEXT && chunk.op_code != OP_CONTINUATION {
            return None;
        }

        if chunk.payload_offset == 0 {
            // Start of a message; any stale in-flight buffer is replaced.
            if self.buf.is_some() {
                debug!("Reassembler: discarding stale partial message");
            }
            self.filled = 0;
            self.expected = chunk.payload_len;

            if chunk.payload_len == 0 {
                self.buf = None;
                return Some(String::new());
            }

            self.buf = RegionBuf::alloc(Region::Default, chunk.payload_len);
            if self.buf.is_none() {
                error!(
                    "Reassembler: no memory for RX buffer (size: {})",
                    chunk.payload_len
                );
                return None;
            }
        }

        let Some(buf) = self.buf.as_mut() else {
            // Continuation without an open buffer (e.g. alloc failed).
            return None;
        };

        if self.filled + chunk.data.len() <= self.expected {
            buf.as_mut_slice()[self.filled..self.filled + chunk.data.len()]
                .copy_from_slice(chunk.data);
            self.filled += chunk.data.len();
        } else {
            error!("Reassembler: chunk overruns declared payload, dropping message");
            self.reset();
            return None;
        }

        if self.filled == self.expected {
            let buf = self.buf.take().expect("buffer present at completion");
            let text = String::from_utf8_lossy(buf.as_slice()).into_owned();
            self.filled = 0;
            self.expected = 0;
            return Some(text);
        }

        None
    }

    /// Discard any in-flight buffer (called on disconnect).
    pub fn reset(&mut self) {
        self.buf = None;
        self.filled = 0;
        self.expected = 0;
    }

    /// Whether a partial message is buffered.
    pub fn in_flight(&self) -> bool {
        self.buf.is_some()
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mem;

    fn chunk(op: u8, data: &[u8], offset: usize, total: usize) -> WsChunk<'_> {
        WsChunk {
            op_code: op,
            data,
            payload_offset: offset,
            payload_len: total,
        }
    }

    #[test]
    fn single_chunk_message() {
        let _g = mem::counters_lock();
        let mut r = Reassembler::new();
        let msg = r.feed(&chunk(OP_TEXT, b"hello", 0, 5));
        assert_eq!(msg.as_deref(), Some("hello"));
        assert!(!r.in_flight());
    }

    #[test]
    fn three_chunk_message_delivers_once() {
        let _g = mem::counters_lock();
        let mut r = Reassembler::new();
        let total = 12;
        assert!(r.feed(&chunk(OP_TEXT, b"aaaa", 0, total)).is_none());
        assert!(r.in_flight());
        assert!(r.feed(&chunk(OP_CONTINUATION, b"bbbb", 4, total)).is_none());
        let msg = r.feed(&chunk(OP_CONTINUATION, b"cccc", 8, total));
        assert_eq!(msg.as_deref(), Some("aaaabbbbcccc"));
        assert!(!r.in_flight());
    }

    #[test]
    fn disconnect_discards_in_flight_buffer() {
        let _g = mem::counters_lock();
        let baseline = mem::live_blocks();
        let mut r = Reassembler::new();
        assert!(r.feed(&chunk(OP_TEXT, b"part", 0, 100)).is_none());
        assert!(r.in_flight());
        r.reset();
        assert!(!r.in_flight());
        assert_eq!(mem::live_blocks(), baseline);
    }

    #[test]
    fn fresh_start_replaces_stale_partial() {
        let _g = mem::counters_lock();
        let mut r = Reassembler::new();
        assert!(r.feed(&chunk(OP_TEXT, b"old", 0, 50)).is_none());
        let msg = r.feed(&chunk(OP_TEXT, b"new", 0, 3));
        assert_eq!(msg.as_deref(), Some("new"));
    }

    #[test]
    fn non_text_frames_ignored() {
        let _g = mem::counters_lock();
        let mut r = Reassembler::new();
        assert!(r.feed(&chunk(0x02, b"binary", 0, 6)).is_none());
        assert!(r.feed(&chunk(0x09, b"ping", 0, 4)).is_none());
        assert!(!r.in_flight());
    }

    #[test]
    fn empty_message_delivers_empty_string() {
        let _g = mem::counters_lock();
        let mut r = Reassembler::new();
        assert_eq!(r.feed(&chunk(OP_TEXT, b"", 0, 0)).as_deref(), Some(""));
    }

    #[test]
    fn overrun_drops_message() {
        let _g = mem::counters_lock();
        let mut r = Reassembler::new();
        assert!(r.feed(&chunk(OP_TEXT, b"abcd", 0, 6)).is_none());
        assert!(r.feed(&chunk(OP_CONTINUATION, b"efgh", 4, 6)).is_none());
        assert!(!r.in_flight());
    }

    #[test]
    fn alloc_failure_degrades_without_callback() {
        let _g = mem::counters_lock();
        mem::set_alloc_fail_above(16);
        let mut r = Reassembler::new();
        assert!(r.feed(&chunk(OP_TEXT, b"big", 0, 64)).is_none());
        assert!(!r.in_flight());
        // Continuations of the failed message are absorbed.
        assert!(r.feed(&chunk(OP_CONTINUATION, b"more", 3, 64)).is_none());
        mem::set_alloc_fail_above(usize::MAX);
    }
}
