//! Wraps the one real [`compositor_channel::Channel`] so every thread that
//! needs to send (the dispatcher, the render thread emitting `Flip`-driven
//! replies, the disconnect path) shares it through a single lock rather
//! than each owning a socket of its own.
use compositor_channel::{Channel, Source};
use compositor_core::Outbox as OutboxTrait;
use compositor_proto::Message;
use spin::Mutex;
use std::sync::Arc;

/// A cloneable handle to the compositor's one listening [`Channel`].
#[derive(Clone)]
pub struct SharedChannel(pub Arc<Mutex<Channel>>);

impl SharedChannel {
    /// Wraps a bound channel for sharing across threads.
    pub fn new(channel: Channel) -> SharedChannel {
        SharedChannel(Arc::new(Mutex::new(channel)))
    }
}

impl OutboxTrait for SharedChannel {
    fn send<M: Message>(&mut self, dest: Source, window: u32, msg: &M) {
        self.0.lock().send(dest, window, msg);
    }
}
