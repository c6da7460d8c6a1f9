//! Accumulates dirty screen-space rectangles between frames.
//!
//! The queue itself does no coalescing: it is a plain list, drained whole by
//! the compositor once per frame, which unions the rectangles into a clip
//! region. Keeping the two concerns separate means the queue stays a trivial,
//! lock-friendly structure even though the union it feeds is not.
use crate::registry::Window;

/// A screen-space rectangle to be repainted. Has no lifetime beyond one
/// composite; the queue is drained completely every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

impl Rect {
    /// Builds a rectangle from its corners, normalizing so `w`/`h` are
    /// non-negative even if the caller passes them in the "wrong" order.
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Rect {
        Rect { x, y, w, h }
    }

    /// The smallest rectangle containing both `self` and `other`.
    pub fn union(self, other: Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.w as i32).max(other.x + other.w as i32);
        let max_y = (self.y + self.h as i32).max(other.y + other.h as i32);
        Rect::new(min_x, min_y, (max_x - min_x).max(0) as u32, (max_y - min_y).max(0) as u32)
    }

    /// Whether `self` and `other` share any pixel.
    pub fn intersects(self, other: Rect) -> bool {
        self.x < other.x + other.w as i32
            && other.x < self.x + self.w as i32
            && self.y < other.y + other.h as i32
            && other.y < self.y + self.h as i32
    }
}

/// A lock-guarded (by the caller; see `Server`) sequence of damage rectangles.
#[derive(Debug, Default)]
pub struct DamageQueue {
    rects: Vec<Rect>,
}

impl DamageQueue {
    /// An empty queue.
    pub fn new() -> DamageQueue {
        DamageQueue::default()
    }

    /// Enqueues a rectangle directly.
    pub fn mark_region(&mut self, x: i32, y: i32, w: u32, h: u32) {
        self.rects.push(Rect::new(x, y, w, h));
    }

    /// Enqueues `window`'s screen-space bounding box, accounting for rotation.
    pub fn mark_window(&mut self, window: &Window) {
        let (x, y, w, h) = window.rotated_bounds();
        self.mark_region(x, y, w, h);
    }

    /// Enqueues the screen-space bounding box of an internal rectangle
    /// `(rx, ry, rw, rh)` of `window`, forward-rotating its four corners the
    /// same way a client-reported flip region is placed on screen.
    pub fn mark_window_relative(&mut self, window: &Window, rx: i32, ry: i32, rw: u32, rh: u32) {
        let corners = [
            (rx as f64, ry as f64),
            ((rx + rw as i32) as f64, ry as f64),
            ((rx + rw as i32) as f64, (ry + rh as i32) as f64),
            (rx as f64, (ry + rh as i32) as f64),
        ];
        let angle = if window.band == compositor_proto::Band::Mid { window.rotation } else { 0 };
        let screen = corners.map(|(lx, ly)| {
            let (sx, sy) = crate::registry::forward_rotate(lx, ly, window.width, window.height, angle);
            (sx + window.x as f64, sy + window.y as f64)
        });
        let xs = screen.map(|(x, _)| x);
        let ys = screen.map(|(_, y)| y);
        let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min).floor() as i32;
        let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min).floor() as i32;
        let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        self.mark_region(min_x, min_y, (max_x - min_x).max(0) as u32, (max_y - min_y).max(0) as u32);
    }

    /// Whether anything has been enqueued since the last drain.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Drains every queued rectangle. The compositor is responsible for
    /// unioning these into a clip region; this queue never coalesces.
    pub fn drain(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.rects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_grows_to_cover_both() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        let u = a.union(b);
        assert_eq!(u, Rect::new(0, 0, 15, 15));
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut q = DamageQueue::new();
        q.mark_region(0, 0, 1, 1);
        q.mark_region(2, 2, 1, 1);
        assert!(!q.is_empty());
        let rects = q.drain();
        assert_eq!(rects.len(), 2);
        assert!(q.is_empty());
        assert!(q.drain().is_empty());
    }

    #[test]
    fn intersects_detects_overlap_and_touching_edges() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(Rect::new(5, 5, 10, 10)));
        assert!(!a.intersects(Rect::new(10, 10, 10, 10)));
    }
}
