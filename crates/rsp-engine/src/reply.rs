//! Reply sender with single-packet retransmission.

use std::io::Write;

use metrics::{counter, histogram};
use rsp_wire::{MAX_PACKET_LENGTH, encode_frame};
use tracing::{trace, warn};

/// Writes framed replies and keeps the last one for retransmission.
#[derive(Debug, Default)]
pub struct ReplySender {
    last_packet: Vec<u8>,
    pending: bool,
}

impl ReplySender {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_packet: Vec::with_capacity(MAX_PACKET_LENGTH + 4),
            pending: false,
        }
    }

    /// Whether the last packet is still waiting for an ACK.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// Exact bytes of the last packet sent.
    #[must_use]
    pub fn last_packet(&self) -> &[u8] {
        &self.last_packet
    }

    /// Frame and send a text reply.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error.
    pub fn send<W: Write>(&mut self, out: &mut W, payload: &[u8]) -> std::io::Result<()> {
        trace!(payload = %String::from_utf8_lossy(payload), "tx");
        self.put(out, payload)
    }

    /// Frame and send a reply whose payload was already binary-escaped.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error.
    pub fn send_binary<W: Write>(&mut self, out: &mut W, payload: &[u8]) -> std::io::Result<()> {
        trace!(len = payload.len(), "tx binary");
        self.put(out, payload)
    }

    fn put<W: Write>(&mut self, out: &mut W, payload: &[u8]) -> std::io::Result<()> {
        let payload = if payload.len() > MAX_PACKET_LENGTH {
            warn!(len = payload.len(), "reply exceeds packet size, truncating");
            &payload[..MAX_PACKET_LENGTH]
        } else {
            payload
        };
        self.last_packet = encode_frame(payload);
        self.pending = true;
        counter!("rsp_replies_sent_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("rsp_reply_bytes").record(payload.len() as f64);
        out.write_all(&self.last_packet)?;
        out.flush()
    }

    /// Send the last packet again, byte for byte.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error.
    pub fn retransmit<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        trace!(len = self.last_packet.len(), "retransmit");
        counter!("rsp_retransmits_total").increment(1);
        out.write_all(&self.last_packet)?;
        out.flush()
    }

    /// The peer acknowledged (or moved on from) the last packet.
    pub const fn acknowledge(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_frames_and_marks_pending() {
        let mut sender = ReplySender::new();
        let mut out = Vec::new();
        sender.send(&mut out, b"OK").unwrap();
        assert_eq!(out, b"$OK#9a");
        assert!(sender.is_pending());
        assert_eq!(sender.last_packet(), b"$OK#9a");
    }

    #[test]
    fn test_retransmit_is_identical() {
        let mut sender = ReplySender::new();
        let mut out = Vec::new();
        sender.send(&mut out, b"T05thread:1;").unwrap();
        let first = out.clone();
        out.clear();
        sender.retransmit(&mut out).unwrap();
        assert_eq!(out, first);
        assert!(sender.is_pending());
    }

    #[test]
    fn test_acknowledge_keeps_last_packet() {
        let mut sender = ReplySender::new();
        let mut out = Vec::new();
        sender.send_binary(&mut out, b"l}]").unwrap();
        assert_eq!(out, b"$l}]#46");
        sender.acknowledge();
        assert!(!sender.is_pending());
        assert_eq!(sender.last_packet(), b"$l}]#46");
    }
}
