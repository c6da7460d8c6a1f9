//! The one process-wide lock guarding [`compositor_core::Server`]. Coarse
//! locking around the whole server struct is acceptable given how the
//! dispatcher and render threads actually contend: one short critical
//! section per packet versus one per frame.
use compositor_core::Server;
use spin::Mutex;
use std::sync::Arc;

/// A [`Server`] shared between the dispatcher thread and the render
/// thread. Cloning shares the same underlying lock.
#[derive(Clone)]
pub struct SharedServer(Arc<Mutex<Server>>);

impl SharedServer {
    /// Wraps a freshly built server for sharing across threads.
    pub fn new(server: Server) -> SharedServer {
        SharedServer(Arc::new(Mutex::new(server)))
    }

    /// Locks the server for the duration of `f`, returning its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut Server) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut guard)
    }
}
