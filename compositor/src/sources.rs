//! The three threads that feed the dispatcher (one
//! client-transport thread plus one thread per input device, each emitting
//! fully-formed packets with no direct cross-thread mutation of server
//! state).
//!
//! Reading a real mouse/keyboard device is outside this crate's reach (akin
//! to how `compositor-core`'s `Canvas`/`CursorSprite` are pluggable
//! contracts rather than concrete hardware code); [`MouseDevice`] and
//! [`KeyDevice`] are the seam a real evdev backend would implement.
use crate::outbox::SharedChannel;
use compositor_channel::{Recv, Source};
use compositor_core::MouseSample;
use compositor_proto::{Header, KeyEvent, Message, MouseEvent, MAGIC};
use compositor_wire::Wire as _;
use crossbeam_channel::Sender;
use std::io;
use std::os::unix::io::RawFd;
use std::thread;

/// One already-framed datagram on its way to the dispatcher, tagged with
/// where it came from so the dispatcher doesn't need to know about threads
/// at all.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A well-formed message, client traffic or a synthesized input event.
    Packet(Source, Header, Vec<u8>),
    /// A client's transport signaled disconnect.
    Disconnect(Source),
}

/// A source of raw mouse samples, decoupled from any particular input
/// backend.
pub trait MouseDevice: Send {
    /// Blocks until the next sample is available, or returns `None` if the
    /// device has been closed and the source thread should exit.
    fn next_event(&mut self) -> Option<MouseSample>;
}

/// A source of raw key events, decoupled from any particular input
/// backend.
pub trait KeyDevice: Send {
    /// Blocks until the next event is available, or returns `None` if the
    /// device has been closed and the source thread should exit.
    /// Returns `(keycode, modifiers, pressed)`.
    fn next_event(&mut self) -> Option<(u32, u32, bool)>;
}

/// A device that never produces an event: the default when no real input
/// hardware is wired in. Parks its thread indefinitely rather than busy
/// looping or exiting, so a headless run still has live source threads.
#[derive(Debug, Default)]
pub struct NeverDevice;

impl MouseDevice for NeverDevice {
    fn next_event(&mut self) -> Option<MouseSample> {
        loop {
            thread::park();
        }
    }
}

impl KeyDevice for NeverDevice {
    fn next_event(&mut self) -> Option<(u32, u32, bool)> {
        loop {
            thread::park();
        }
    }
}

/// Runs `device` on the calling thread, forwarding every sample as a
/// [`MouseEvent`] packet tagged [`Source::SYNTHETIC`] until the device is
/// closed or the receiver is dropped.
pub fn run_mouse_source(mut device: impl MouseDevice, tx: Sender<Inbound>) {
    while let Some(sample) = device.next_event() {
        let ev = MouseEvent {
            x: sample.x,
            y: sample.y,
            buttons: sample.buttons,
            button: sample.button,
            pressed: sample.pressed as u32,
        };
        let header = Header { magic: MAGIC, ty: MouseEvent::KIND as u32, window: 0, len: MouseEvent::SIZE as u32 };
        if tx.send(Inbound::Packet(Source::SYNTHETIC, header, ev.as_bytes().to_vec())).is_err() {
            return;
        }
    }
}

/// Runs `device` on the calling thread, forwarding every event as a
/// [`KeyEvent`] packet tagged [`Source::SYNTHETIC`] until the device is
/// closed or the receiver is dropped.
pub fn run_key_source(mut device: impl KeyDevice, tx: Sender<Inbound>) {
    while let Some((keycode, modifiers, pressed)) = device.next_event() {
        let ev = KeyEvent { keycode, modifiers, pressed: pressed as u32 };
        let header = Header { magic: MAGIC, ty: KeyEvent::KIND as u32, window: 0, len: KeyEvent::SIZE as u32 };
        if tx.send(Inbound::Packet(Source::SYNTHETIC, header, ev.as_bytes().to_vec())).is_err() {
            return;
        }
    }
}

fn poll_readable(fd: RawFd, timeout_ms: i32) {
    let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc >= 0 || io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
            return;
        }
    }
}

/// Runs the client-transport loop on the calling thread: waits for the
/// listening socket to have data (with a bounded timeout so queued writes
/// still get a chance to flush even with no incoming traffic), drains every
/// ready datagram, and forwards each as an [`Inbound`]. Malformed packets
/// are logged and skipped; they do not stop the loop.
pub fn run_transport(channel: SharedChannel, tx: Sender<Inbound>) {
    let fd = channel.0.lock().as_raw_fd();
    loop {
        poll_readable(fd, 50);
        loop {
            let outcome = channel.0.lock().recv();
            match outcome {
                Ok(Some(Recv::Packet(source, header, body))) => {
                    if tx.send(Inbound::Packet(source, header, body)).is_err() {
                        return;
                    }
                }
                Ok(Some(Recv::Disconnect(source))) => {
                    if tx.send(Inbound::Disconnect(source)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("dropping malformed packet: {}", e);
                }
            }
        }
    }
}
