//! The per-frame render pipeline: drains damage, blits windows
//! bottom-to-top, overlays the resize outline and cursor, presents, and
//! processes the close queue.
use crate::canvas::{self, Canvas};
use crate::damage::Rect;
use crate::outbox::Outbox;
use crate::registry::{AnimMode, Wid, ANIM_LENGTH};
use crate::server::Server;
use compositor_proto::Band;

/// Ticks the server clock advances by on every composed frame.
pub const TICK_STEP: u64 = 10;

/// Margin added around a resize outline on each side, in pixels, matching
/// the invalidation margin used while dragging.
const OUTLINE_MARGIN: i32 = 2;
/// Stroke width of the resize outline, in pixels.
const OUTLINE_STROKE: u32 = 10;
/// Translucent fill color for the in-progress resize outline.
const OUTLINE_FILL: u32 = 0x4000_80FF;
/// Opaque stroke color for the resize outline.
const OUTLINE_STROKE_COLOR: u32 = 0xFF00_80FF;

/// A cursor glyph: the pixel blitter's cursor-sprite contract, kept as
/// a trait so a real backend can supply a themed pointer while this crate's
/// own tests and the binary's default run use a trivial glyph.
pub trait CursorSprite {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Reads one pixel, packed ARGB32.
    fn get_pixel(&self, x: i32, y: i32) -> u32;
}

/// A minimal 8x8 filled-square pointer, sufficient to exercise the
/// compositor's cursor-drawing step without depending on a real asset
/// loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowCursor;

impl CursorSprite for ArrowCursor {
    fn width(&self) -> u32 {
        8
    }
    fn height(&self) -> u32 {
        8
    }
    fn get_pixel(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= 8 || y >= 8 {
            0
        } else {
            0xFFFF_FFFF
        }
    }
}

fn cursor_damage_rect(pointer: (i64, i64)) -> Rect {
    const HALF: i32 = 32;
    Rect::new(pointer.0 as i32 - HALF, pointer.1 as i32 - HALF, 64, 64)
}

/// Returns `(alpha, scale)` to paint a window at, or `None` if its
/// `FADE_OUT` has run its full course and it should be destroyed instead of
/// painted this frame.
fn fade_params(mode: AnimMode, frame: u32) -> Option<(f64, f64)> {
    match mode {
        AnimMode::None => Some((1.0, 1.0)),
        AnimMode::FadeIn => {
            let frame = frame.min(ANIM_LENGTH);
            let alpha = frame as f64 / ANIM_LENGTH as f64;
            Some((alpha, 0.75 + 0.25 * alpha))
        }
        AnimMode::FadeOut => {
            if frame >= ANIM_LENGTH {
                None
            } else {
                let effective = ANIM_LENGTH - frame;
                let alpha = effective as f64 / ANIM_LENGTH as f64;
                Some((alpha, 0.75 + 0.25 * alpha))
            }
        }
    }
}

/// Per-frame scratch the compositor keeps between calls to [`compose`]:
/// just enough state to damage the cursor's old position when it moves.
#[derive(Debug, Default)]
pub struct Compositor {
    last_pointer: (i64, i64),
}

impl Compositor {
    /// A fresh compositor with the pointer latched at the origin.
    pub fn new() -> Compositor {
        Compositor::default()
    }

    /// Runs one frame. `nested` suppresses the cursor
    /// draw in step 7, standing in for "flip the nested surface instead"
    /// (the nested self-hosting mode itself is an external contract, see
    /// the pixel blitter contract's external scope).
    pub fn compose(
        &mut self,
        server: &mut Server,
        backbuffer: &mut dyn Canvas,
        front: &mut dyn Canvas,
        cursor: &dyn CursorSprite,
        outbox: &mut impl Outbox,
        nested: bool,
    ) {
        // Step 1: latch the pointer, damage its old and new 64x64 footprint
        // if it moved since the last frame.
        let (px, py) = server.input.pointer_screen();
        let pointer = (px.round() as i64, py.round() as i64);
        if pointer != self.last_pointer {
            let old = cursor_damage_rect(self.last_pointer);
            let new = cursor_damage_rect(pointer);
            server.damage.mark_region(old.x, old.y, old.w, old.h);
            server.damage.mark_region(new.x, new.y, new.w, new.h);
        }
        self.last_pointer = pointer;

        // Step 2: any window mid-animation is damaged every frame.
        server.tick = server.tick.wrapping_add(TICK_STEP);
        let animated: Vec<Wid> = server
            .shared
            .registry
            .iter()
            .filter(|w| w.anim_mode != AnimMode::None)
            .map(|w| w.wid)
            .collect();
        for wid in &animated {
            if let Some(w) = server.shared.registry.lookup(*wid) {
                server.damage.mark_window(w);
            }
        }

        // Step 3: drain and union into a clip region.
        let rects = server.damage.drain();
        let clip = match rects.into_iter().reduce(Rect::union) {
            Some(r) => r,
            // Step 4: nothing to do this frame.
            None => return,
        };

        // Step 5: blit bottom, then mid back-to-front, then top.
        let paint_order: Vec<Wid> = server.shared.registry.paint_order().map(|w| w.wid).collect();
        let mut closing = Vec::new();
        for wid in paint_order {
            let (band, rotation, anim_mode, anim_start, x, y, width, height) =
                match server.shared.registry.lookup(wid) {
                    Some(w) => (w.band, w.rotation, w.anim_mode, w.anim_start, w.x, w.y, w.width, w.height),
                    None => continue,
                };
            let frame = server.tick.saturating_sub(anim_start) as u32;
            match fade_params(anim_mode, frame) {
                Some((alpha, scale)) => {
                    if let Some(w) = server.shared.registry.lookup(wid) {
                        let src = canvas::Source { pixels: w.buffer.as_slice(), width, height };
                        let rot = if band == Band::Mid { rotation } else { 0 };
                        canvas::composite(backbuffer, &src, x, y, rot, scale, alpha);
                    }
                    if anim_mode == AnimMode::FadeIn && frame >= ANIM_LENGTH {
                        if let Some(w) = server.shared.registry.lookup_mut(wid) {
                            w.anim_mode = AnimMode::None;
                        }
                    }
                }
                None => closing.push(wid),
            }
        }

        // Step 6: resize outline overlay.
        if server.input.mouse_state == crate::input::MouseState::Resizing {
            if let Some(capture) = server.shared.registry.capture {
                if let Some(w) = server.shared.registry.lookup(capture) {
                    let outline = Rect::new(
                        w.x - OUTLINE_MARGIN,
                        w.y - OUTLINE_MARGIN,
                        server.input.resizing_w + 2 * OUTLINE_MARGIN as u32,
                        server.input.resizing_h + 2 * OUTLINE_MARGIN as u32,
                    );
                    canvas::fill_rect(backbuffer, outline, OUTLINE_FILL);
                    for i in 0..OUTLINE_STROKE {
                        let shrink = Rect::new(
                            outline.x + i as i32,
                            outline.y + i as i32,
                            outline.w.saturating_sub(2 * i),
                            outline.h.saturating_sub(2 * i),
                        );
                        canvas::stroke_rect(backbuffer, shrink, OUTLINE_STROKE_COLOR);
                    }
                }
            }
        }

        // Step 7: cursor sprite, unless a nested host surface owns the
        // pointer instead.
        if !nested {
            let half = (cursor.width() as i32 / 2, cursor.height() as i32 / 2);
            for dy in 0..cursor.height() as i32 {
                for dx in 0..cursor.width() as i32 {
                    let argb = cursor.get_pixel(dx, dy);
                    if argb >> 24 == 0 {
                        continue;
                    }
                    backbuffer.set_pixel(pointer.0 as i32 - half.0 + dx, pointer.1 as i32 - half.1 + dy, argb);
                }
            }
        }

        // Step 8: present the clipped region.
        canvas::copy_rect(front, &*backbuffer, clip);

        // Step 9: close queue.
        for wid in closing {
            let was_focus = server.shared.registry.focus == Some(wid);
            server.shared.registry.destroy(wid);
            if was_focus {
                let fallback = server.shared.registry.bottom();
                server.shared.set_focus(outbox, fallback);
            } else {
                server.shared.notify_subscribers(outbox);
            }
        }

        // Step 10: nothing to reset explicitly; `clip` does not outlive
        // this call.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::FramebufferCanvas;
    use crate::outbox::RecordingOutbox;
    use crate::server::Server;
    use compositor_channel::Source;

    fn src(n: u64) -> Source {
        Source::from_raw(n)
    }

    #[test]
    fn empty_damage_queue_skips_the_frame() {
        let mut server = Server::new(100, 100);
        let mut comp = Compositor::new();
        let mut back = FramebufferCanvas::new(100, 100);
        let mut front = FramebufferCanvas::new(100, 100);
        let mut ob = RecordingOutbox::new();
        comp.compose(&mut server, &mut back, &mut front, &ArrowCursor, &mut ob, false);
        assert_eq!(front.pixels(), back.pixels());
    }

    #[test]
    fn fade_out_completion_destroys_the_window_and_notifies() {
        let mut server = Server::new(100, 100);
        let owner = src(1);
        let wid = server.shared.registry.create(owner, 10, 10, 0).unwrap();
        server.shared.subscribers.insert(src(9));
        crate::server::mark_for_close(&mut server.shared.registry, &mut server.damage, server.tick, wid);
        let mut comp = Compositor::new();
        let mut back = FramebufferCanvas::new(100, 100);
        let mut front = FramebufferCanvas::new(100, 100);
        let mut ob = RecordingOutbox::new();

        // Advance past the fade's full duration.
        let frames = (ANIM_LENGTH / TICK_STEP as u32) + 2;
        for _ in 0..frames {
            server.damage.mark_region(0, 0, 1, 1);
            comp.compose(&mut server, &mut back, &mut front, &ArrowCursor, &mut ob, false);
        }

        assert!(server.shared.registry.lookup(wid).is_none());
        let kinds: Vec<u32> = ob.sent.iter().map(|(_, _, k, _)| *k).collect();
        assert!(kinds.contains(&(compositor_proto::Msg::WindowsChanged as u32)));
    }
}
