//! The sending half of the client channel, abstracted so that
//! `compositor-core`'s own tests can assert on outbound traffic without a
//! real socket.
use compositor_channel::Source;
use compositor_proto::Message;
use compositor_wire::Wire as _;

/// Anything that can deliver a typed protocol message to a [`Source`].
pub trait Outbox {
    /// Sends `msg`, tagged with `M::KIND` and window id `window`, to `dest`.
    fn send<M: Message>(&mut self, dest: Source, window: u32, msg: &M);
}

impl Outbox for compositor_channel::Channel {
    fn send<M: Message>(&mut self, dest: Source, window: u32, msg: &M) {
        if let Err(e) = self.send_raw(dest, M::KIND as u32, window, msg.as_bytes()) {
            // Message-send failures to a subscriber/owner are swallowed;
            // the subscriber list is not pruned here (documented design debt).
            log::warn!("send to {:?} failed: {}", dest, e);
        }
    }
}

/// An in-memory [`Outbox`] that records every send, for unit tests.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    /// Every message sent so far, as `(dest, window, type, body)`.
    pub sent: Vec<(Source, u32, u32, Vec<u8>)>,
}

impl RecordingOutbox {
    /// A fresh, empty recorder.
    pub fn new() -> RecordingOutbox {
        RecordingOutbox::default()
    }
}

impl Outbox for RecordingOutbox {
    fn send<M: Message>(&mut self, dest: Source, window: u32, msg: &M) {
        self.sent.push((dest, window, M::KIND as u32, msg.as_bytes().to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compositor_proto::{Flip, Msg};

    #[test]
    fn recording_outbox_captures_sends() {
        let mut ob = RecordingOutbox::new();
        ob.send(Source::from_raw(1), 7, &Flip {});
        assert_eq!(ob.sent.len(), 1);
        assert_eq!(ob.sent[0].1, 7);
        assert_eq!(ob.sent[0].2, Msg::Flip as u32);
    }
}
