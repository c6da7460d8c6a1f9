//! The set of windows, their z-order, and per-client ownership.
use compositor_proto::Band;
use compositor_shm::Buffer;
use compositor_channel::Source;
use std::collections::{HashMap, HashSet};

/// Stable identifier of a window, assigned once by [`Registry::create`] and
/// never reused for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wid(pub u32);

/// Animation a window is currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimMode {
    /// No animation; painted at full opacity.
    None,
    /// Growing in from 75% scale and fading in.
    FadeIn,
    /// Shrinking and fading out; destroyed when it completes.
    FadeOut,
}

/// Number of ticks a fade animation takes to complete. The compositor
/// advances the tick counter by 10 per frame, so a fade lasts
/// roughly 26 frames at the nominal 60Hz frame rate.
pub const ANIM_LENGTH: u32 = 256;

/// One window: position, size, buffer, and the metadata the interaction
/// state machine and compositor consult every frame.
#[derive(Debug)]
pub struct Window {
    /// This window's id.
    pub wid: Wid,
    /// The client that owns it.
    pub owner: Source,
    /// Screen-space X coordinate of the top-left corner. May be negative.
    pub x: i32,
    /// Screen-space Y coordinate of the top-left corner. May be negative.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Current z-band.
    pub band: Band,
    /// The pixel buffer.
    pub buffer: Buffer,
    /// Buffer allocated during an in-flight resize handshake, promoted to
    /// `buffer` on `RESIZE_DONE`. `None` iff no resize is in flight.
    pub pending_buffer: Option<Buffer>,
    /// Rotation in degrees, conventionally `[0, 360)`. Clockwise is positive.
    /// Ignored (treated as 0) for windows in `BOTTOM`/`TOP`.
    pub rotation: i32,
    /// Pixels with alpha strictly below this are transparent to hit-testing.
    pub alpha_threshold: u8,
    /// Current fade animation.
    pub anim_mode: AnimMode,
    /// Tick value at which `anim_mode` started.
    pub anim_start: u64,
    /// Opaque client-supplied flags, shown to subscribers.
    pub client_flags: u32,
    /// Opaque client-supplied offsets, shown to subscribers.
    pub client_offsets: [u32; compositor_proto::CLIENT_OFFSET_COUNT],
    /// Opaque client-supplied string blob, shown to subscribers.
    pub client_strings: [u8; compositor_proto::CLIENT_STRINGS_LEN],
}

impl Window {
    /// This window's buffer id, as handed to clients over the wire.
    pub fn bufid(&self) -> u32 {
        self.buffer.id().as_u32()
    }

    /// The window's bounding rectangle, ignoring rotation: `(x, y, w, h)`.
    pub fn bounds(&self) -> (i32, i32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }

    /// The four corners of the window, rotated forward around its center,
    /// in screen space. Identity for `BOTTOM`/`TOP` windows.
    pub fn rotated_corners(&self) -> [(f64, f64); 4] {
        let corners = [
            (0.0, 0.0),
            (self.width as f64, 0.0),
            (self.width as f64, self.height as f64),
            (0.0, self.height as f64),
        ];
        let angle = if self.band == Band::Mid { self.rotation } else { 0 };
        corners.map(|(lx, ly)| {
            let (sx, sy) = forward_rotate(lx, ly, self.width, self.height, angle);
            (sx + self.x as f64, sy + self.y as f64)
        })
    }

    /// Bounding box of this window's rotated corners, in screen space,
    /// rounded outward to integer pixels: `(x, y, w, h)`.
    pub fn rotated_bounds(&self) -> (i32, i32, u32, u32) {
        let corners = self.rotated_corners();
        let xs = corners.map(|(x, _)| x);
        let ys = corners.map(|(_, y)| y);
        let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min).floor() as i32;
        let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min).floor() as i32;
        let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        (min_x, min_y, (max_x - min_x).max(0) as u32, (max_y - min_y).max(0) as u32)
    }
}

/// Maps a device (screen) coordinate to a window-local coordinate, undoing
/// the window's rotation: translate by `-(x,y)`, then (if rotated)
/// translate to center, rotate by `-rotation`, translate back.
pub fn inverse_rotate(sx: f64, sy: f64, win_x: i32, win_y: i32, width: u32, height: u32, rotation: i32) -> (f64, f64) {
    let lx = sx - win_x as f64;
    let ly = sy - win_y as f64;
    if rotation == 0 {
        return (lx, ly);
    }
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let theta = -(rotation as f64).to_radians();
    let (dx, dy) = (lx - cx, ly - cy);
    let (rx, ry) = (dx * theta.cos() - dy * theta.sin(), dx * theta.sin() + dy * theta.cos());
    (rx + cx, ry + cy)
}

/// Maps a window-local coordinate to a screen coordinate, applying the
/// window's rotation. The inverse of [`inverse_rotate`].
pub fn forward_rotate(lx: f64, ly: f64, width: u32, height: u32, rotation: i32) -> (f64, f64) {
    if rotation == 0 {
        return (lx, ly);
    }
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let theta = (rotation as f64).to_radians();
    let (dx, dy) = (lx - cx, ly - cy);
    let (rx, ry) = (dx * theta.cos() - dy * theta.sin(), dx * theta.sin() + dy * theta.cos());
    (rx + cx, ry + cy)
}

/// Reads the alpha byte of the pixel at window-local `(x, y)` from `w`'s own
/// buffer, for use as the `sample_alpha` argument to [`Registry::hit_test`].
/// Out-of-bounds coordinates are fully transparent.
pub fn sample_alpha(w: &Window, x: u32, y: u32) -> u8 {
    if x >= w.width || y >= w.height {
        return 0;
    }
    let offset = (y as usize * w.width as usize + x as usize) * compositor_shm::BYTES_PER_PIXEL as usize;
    let slice = w.buffer.as_slice();
    if offset + 4 > slice.len() {
        return 0;
    }
    slice[offset + 3]
}

/// The window registry: owns every window, its z-order, and the index from
/// client to the windows it owns.
#[derive(Debug, Default)]
pub struct Registry {
    windows: HashMap<Wid, Window>,
    bottom: Option<Wid>,
    top: Option<Wid>,
    /// Back (furthest) to front (nearest) within the `MID` band.
    mid: Vec<Wid>,
    by_client: HashMap<Source, HashSet<Wid>>,
    next_wid: u32,
    /// The currently focused window, if any.
    pub focus: Option<Wid>,
    /// The window currently under the pointer, if any.
    pub hover: Option<Wid>,
    /// The window receiving mouse events during a drag/move/resize gesture.
    pub capture: Option<Wid>,
}

impl Registry {
    /// Creates an empty registry. Window ids start at 1; 0 is reserved to
    /// mean "no window" on the wire (see `WindowAdvertise`'s terminator).
    pub fn new() -> Registry {
        Registry {
            next_wid: 1,
            ..Default::default()
        }
    }

    /// Allocates a new window owned by `owner`, sized `width x height`,
    /// placed at the front of `MID`, with a fresh `FADE_IN` animation.
    ///
    /// Returns an error only if the backing shared-memory allocation fails;
    /// `width == 0` or `height == 0` is accepted and yields a
    /// minimally-sized buffer that is never a hit.
    pub fn create(
        &mut self,
        owner: Source,
        width: u32,
        height: u32,
        now: u64,
    ) -> Result<Wid, compositor_shm::ShmError> {
        let buffer = Buffer::new(width, height)?;
        let wid = Wid(self.next_wid);
        self.next_wid += 1;
        let window = Window {
            wid,
            owner,
            x: 0,
            y: 0,
            width,
            height,
            band: Band::Mid,
            buffer,
            pending_buffer: None,
            rotation: 0,
            alpha_threshold: 1,
            anim_mode: AnimMode::FadeIn,
            anim_start: now,
            client_flags: 0,
            client_offsets: [0; compositor_proto::CLIENT_OFFSET_COUNT],
            client_strings: [0; compositor_proto::CLIENT_STRINGS_LEN],
        };
        self.mid.push(wid);
        self.windows.insert(wid, window);
        self.by_client.entry(owner).or_default().insert(wid);
        Ok(wid)
    }

    /// Moves `wid` into `band`, evicting whatever previously occupied a
    /// single-slot band (`BOTTOM`/`TOP`) back into the front of `MID`.
    pub fn reorder(&mut self, wid: Wid, band: Band) {
        self.remove_from_bands(wid);
        match band {
            Band::Bottom => {
                if let Some(evicted) = self.bottom.replace(wid) {
                    self.mid.push(evicted);
                    if let Some(w) = self.windows.get_mut(&evicted) {
                        w.band = Band::Mid;
                    }
                }
            }
            Band::Top => {
                if let Some(evicted) = self.top.replace(wid) {
                    self.mid.push(evicted);
                    if let Some(w) = self.windows.get_mut(&evicted) {
                        w.band = Band::Mid;
                    }
                }
            }
            Band::Mid => {
                self.mid.push(wid);
            }
        }
        if let Some(w) = self.windows.get_mut(&wid) {
            w.band = band;
        }
    }

    /// Removes `wid` from whichever band index currently holds it, without
    /// touching `self.windows` or reassigning `w.band`. Used internally by
    /// [`Registry::reorder`] and [`Registry::destroy`].
    fn remove_from_bands(&mut self, wid: Wid) {
        if self.bottom == Some(wid) {
            self.bottom = None;
        }
        if self.top == Some(wid) {
            self.top = None;
        }
        self.mid.retain(|&w| w != wid);
    }

    /// Moves `wid` to the frontmost `MID` slot. No-op if `wid` is in
    /// `BOTTOM`/`TOP`, or does not exist.
    pub fn raise(&mut self, wid: Wid) {
        if !self.mid.contains(&wid) {
            return;
        }
        self.mid.retain(|&w| w != wid);
        self.mid.push(wid);
    }

    /// Finds the topmost window whose opaque region contains `(x, y)` in
    /// screen space, scanning `TOP`, then `MID` front-to-back, then
    /// `BOTTOM`.
    pub fn hit_test(&self, x: f64, y: f64, sample_alpha: impl Fn(&Window, u32, u32) -> u8) -> Option<Wid> {
        let candidates = self
            .top
            .into_iter()
            .chain(self.mid.iter().rev().copied())
            .chain(self.bottom);
        for wid in candidates {
            let w = match self.windows.get(&wid) {
                Some(w) => w,
                None => continue,
            };
            let (lx, ly) = inverse_rotate(x, y, w.x, w.y, w.width, w.height, if w.band == Band::Mid { w.rotation } else { 0 });
            if lx < 0.0 || ly < 0.0 || lx >= w.width as f64 || ly >= w.height as f64 {
                continue;
            }
            let (px, py) = (lx as u32, ly as u32);
            if sample_alpha(w, px, py) >= w.alpha_threshold {
                return Some(wid);
            }
        }
        None
    }

    /// Looks up a window by id.
    pub fn lookup(&self, wid: Wid) -> Option<&Window> {
        self.windows.get(&wid)
    }

    /// Looks up a window by id, mutably.
    pub fn lookup_mut(&mut self, wid: Wid) -> Option<&mut Window> {
        self.windows.get_mut(&wid)
    }

    /// The `BOTTOM` window, if any.
    pub fn bottom(&self) -> Option<Wid> {
        self.bottom
    }

    /// The `TOP` window, if any.
    pub fn top(&self) -> Option<Wid> {
        self.top
    }

    /// The `MID` band, back-to-front.
    pub fn mid(&self) -> &[Wid] {
        &self.mid
    }

    /// All windows, in no particular order. Used by `QUERY_WINDOWS`-adjacent
    /// code that needs every window rather than paint order.
    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.windows.values()
    }

    /// Paint order: `BOTTOM`, then `MID` back-to-front, then `TOP`.
    pub fn paint_order(&self) -> impl Iterator<Item = &Window> + '_ {
        self.bottom
            .into_iter()
            .chain(self.mid.iter().copied())
            .chain(self.top)
            .filter_map(move |wid| self.windows.get(&wid))
    }

    /// Removes `wid` entirely: clears its band slot, its client bucket entry
    /// (dropping the bucket if it becomes empty), and any focus/hover/capture
    /// pointer that referenced it.
    pub fn destroy(&mut self, wid: Wid) -> Option<Window> {
        self.remove_from_bands(wid);
        let window = self.windows.remove(&wid)?;
        if let Some(bucket) = self.by_client.get_mut(&window.owner) {
            bucket.remove(&wid);
            if bucket.is_empty() {
                self.by_client.remove(&window.owner);
            }
        }
        if self.focus == Some(wid) {
            self.focus = None;
        }
        if self.hover == Some(wid) {
            self.hover = None;
        }
        if self.capture == Some(wid) {
            self.capture = None;
        }
        Some(window)
    }

    /// The windows owned by `owner`, or an empty slice if it owns none.
    pub fn windows_of(&self, owner: Source) -> impl Iterator<Item = Wid> + '_ {
        self.by_client
            .get(&owner)
            .into_iter()
            .flat_map(|bucket| bucket.iter().copied())
    }

    /// Whether `owner` has any windows registered.
    pub fn has_client(&self, owner: Source) -> bool {
        self.by_client.contains_key(&owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(n: u64) -> Source {
        Source::from_raw(n)
    }

    #[test]
    fn create_assigns_increasing_ids() {
        let mut reg = Registry::new();
        let a = reg.create(src(1), 10, 10, 0).unwrap();
        let b = reg.create(src(1), 10, 10, 0).unwrap();
        assert!(b.0 > a.0);
        assert_eq!(reg.mid(), &[a, b]);
    }

    #[test]
    fn reorder_to_bottom_and_back_to_mid() {
        let mut reg = Registry::new();
        let a = reg.create(src(1), 10, 10, 0).unwrap();
        let b = reg.create(src(1), 10, 10, 0).unwrap();
        reg.reorder(a, Band::Bottom);
        assert_eq!(reg.bottom(), Some(a));
        assert_eq!(reg.mid(), &[b]);
        reg.reorder(a, Band::Mid);
        assert_eq!(reg.bottom(), None);
        assert!(reg.mid().contains(&a));
    }

    #[test]
    fn reorder_to_top_evicts_previous_occupant() {
        let mut reg = Registry::new();
        let a = reg.create(src(1), 10, 10, 0).unwrap();
        let b = reg.create(src(1), 10, 10, 0).unwrap();
        reg.reorder(a, Band::Top);
        reg.reorder(b, Band::Top);
        assert_eq!(reg.top(), Some(b));
        assert!(reg.mid().contains(&a));
    }

    #[test]
    fn destroy_clears_focus_hover_capture_and_bucket() {
        let mut reg = Registry::new();
        let owner = src(1);
        let a = reg.create(owner, 10, 10, 0).unwrap();
        reg.focus = Some(a);
        reg.hover = Some(a);
        reg.capture = Some(a);
        reg.destroy(a);
        assert_eq!(reg.focus, None);
        assert_eq!(reg.hover, None);
        assert_eq!(reg.capture, None);
        assert!(!reg.has_client(owner));
        assert!(reg.lookup(a).is_none());
    }

    #[test]
    fn hit_test_respects_alpha_threshold() {
        let mut reg = Registry::new();
        let a = reg.create(src(1), 10, 10, 0).unwrap();
        reg.lookup_mut(a).unwrap().alpha_threshold = 200;
        let hit = reg.hit_test(5.0, 5.0, |_w, _x, _y| 100);
        assert_eq!(hit, None);
        let hit = reg.hit_test(5.0, 5.0, |_w, _x, _y| 255);
        assert_eq!(hit, Some(a));
    }

    #[test]
    fn rotation_round_trips() {
        let (sx, sy) = forward_rotate(3.0, 4.0, 20, 20, 37);
        let (lx, ly) = inverse_rotate(sx, sy, 0, 0, 20, 20, 37);
        assert!((lx - 3.0).abs() < 1e-9);
        assert!((ly - 4.0).abs() < 1e-9);
    }
}
