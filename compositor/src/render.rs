//! The render ticker: sleeps ~16.6ms, then composes one frame.
use crate::outbox::SharedChannel;
use crate::shared::SharedServer;
use compositor_core::{ArrowCursor, Canvas, Compositor, CursorSprite};
use std::thread;
use std::time::Duration;

/// One frame period, matching a 60Hz refresh.
const FRAME_PERIOD: Duration = Duration::from_micros(16_666);

/// Runs the render loop on the calling thread until the process exits:
/// every frame period, locks the server, composes into `backbuffer`, and
/// presents into `front`.
pub fn run_render(
    server: SharedServer,
    mut outbox: SharedChannel,
    mut backbuffer: impl Canvas,
    mut front: impl Canvas,
    cursor: impl CursorSprite,
    nested: bool,
) {
    let mut compositor = Compositor::new();
    loop {
        thread::sleep(FRAME_PERIOD);
        server.with(|srv| {
            compositor.compose(srv, &mut backbuffer, &mut front, &cursor, &mut outbox, nested);
        });
    }
}

/// A render backend made of two heap-allocated framebuffers: the one the
/// compositor blits into, and the one a real display would scan out from.
/// Sufficient for a software-only run with no windowing toolkit beneath it.
pub fn default_backend(width: u32, height: u32) -> (compositor_core::FramebufferCanvas, compositor_core::FramebufferCanvas, ArrowCursor) {
    (
        compositor_core::FramebufferCanvas::new(width, height),
        compositor_core::FramebufferCanvas::new(width, height),
        ArrowCursor,
    )
}
