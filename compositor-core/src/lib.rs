//! Window registry, damage tracking, the render pipeline, the input state
//! machine, and the client message dispatcher: everything the `compositor`
//! binary needs except the actual transport and framebuffer surfaces.
//!
//! This crate has no knowledge of threads or locks (see `server::Server`'s
//! docs): every operation takes `&mut` state explicitly, so it can be
//! exercised directly from tests with a [`outbox::RecordingOutbox`] standing
//! in for the wire.

pub mod canvas;
pub mod compositor;
pub mod damage;
pub mod dispatcher;
pub mod error;
pub mod input;
pub mod keybind;
pub mod outbox;
pub mod registry;
pub mod server;

pub use canvas::{Canvas, FramebufferCanvas};
pub use compositor::{ArrowCursor, Compositor, CursorSprite};
pub use damage::{DamageQueue, Rect};
pub use dispatcher::dispatch;
pub use error::ProtocolError;
pub use input::{InputState, MouseSample, MouseState};
pub use keybind::{Binding, KeyBindTable};
pub use outbox::{Outbox, RecordingOutbox};
pub use registry::{AnimMode, Registry, Wid, Window};
pub use server::{mark_for_close, ScreenConfig, Server, Shared};
