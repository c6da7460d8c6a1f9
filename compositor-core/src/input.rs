//! The input-driven interaction state machine: focus, click,
//! drag-to-move, alt-drag-to-resize, tiling hotkeys, key-binding grabs.
use crate::damage::DamageQueue;
use crate::keybind::KeyBindTable;
use crate::outbox::Outbox;
use crate::registry::{inverse_rotate, sample_alpha, Wid};
use crate::server::Shared;
use compositor_proto::{
    Band, BindResponse, MouseClick, MouseDown, MouseDrag, MouseEnter, MouseLeave, MouseMoveEvent,
    MouseRaise, ResizeOffer, BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_NONE,
};

/// Pointer coordinates are tracked at 3x screen-pixel resolution.
pub const PTR_SCALE: i64 = 3;

/// Bitmask values for [`compositor_proto::KeyEvent::modifiers`]. The exact
/// bit assignment is this server's own convention; an input backend
/// translating real keyboard state into `KeyEvent`s is expected to produce
/// these (analogous to how a platform input layer maps raw scancodes into a
/// compositor's own keysym space).
pub const MOD_SHIFT: u32 = 1 << 0;
/// See [`MOD_SHIFT`].
pub const MOD_CTRL: u32 = 1 << 1;
/// See [`MOD_SHIFT`].
pub const MOD_ALT: u32 = 1 << 2;
/// See [`MOD_SHIFT`].
pub const MOD_SUPER: u32 = 1 << 3;

// Evdev keycodes, reused here as this server's own keycode space so that a
// real `/dev/input` backend needs no translation table of its own.
const KEY_Z: u32 = 44;
const KEY_X: u32 = 45;
const KEY_C: u32 = 46;
const KEY_V: u32 = 47;
const KEY_B: u32 = 48;
const KEY_F10: u32 = 68;
const KEY_UP: u32 = 103;
const KEY_LEFT: u32 = 105;
const KEY_RIGHT: u32 = 106;
const KEY_DOWN: u32 = 108;

/// The mouse interaction state (see the module-level transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseState {
    /// No gesture in progress.
    Normal,
    /// Tracking a plain click-or-drag on the focused window.
    Dragging,
    /// Alt-dragging the captured window by its origin.
    Moving,
    /// Alt-middle-dragging to resize the captured window.
    Resizing,
}

/// A raw mouse sample, as decoded from a [`compositor_proto::MouseEvent`].
#[derive(Debug, Clone, Copy)]
pub struct MouseSample {
    /// New pointer position, in 3x-scaled screen-space subpixels.
    pub x: i32,
    /// See `x`.
    pub y: i32,
    /// Bitmask of held buttons.
    pub buttons: u32,
    /// The button whose state changed, or [`BUTTON_NONE`] for plain motion.
    pub button: u32,
    /// Whether `button` was just pressed (vs. released).
    pub pressed: bool,
}

/// The input & interaction state machine: everything driving focus, drag,
/// and resize gestures that is not
/// already owned by the registry or damage queue.
#[derive(Debug)]
pub struct InputState {
    /// Current gesture state.
    pub mouse_state: MouseState,
    /// Pointer position, 3x-scaled screen-space subpixels, clamped to the
    /// screen.
    pub pointer_x: i64,
    /// See `pointer_x`.
    pub pointer_y: i64,
    /// Currently stored modifier-key snapshot.
    pub modifiers: u32,
    /// Pointer position at gesture start (subpixels).
    init: (i64, i64),
    /// Captured window's origin at gesture start.
    win_origin: (i32, i32),
    /// Last window-local coordinate seen during a drag, for delta detection.
    click: (i32, i32),
    /// Whether the pointer moved since the `DRAGGING` gesture began.
    moved: bool,
    /// The button that started the current `DRAGGING` gesture.
    drag_button: u32,
    /// The window a `DRAGGING` gesture targets (the window focused at
    /// press time; distinct from `capture`, which only `MOVING`/`RESIZING`
    /// use).
    drag_target: Option<Wid>,
    /// In-progress resize dimensions, screen pixels.
    pub resizing_w: u32,
    /// See `resizing_w`.
    pub resizing_h: u32,
    /// Whether hit-test visualisation is toggled on (CTRL+SHIFT+V).
    pub debug_hit_test: bool,
    /// Whether the window-bounds overlay is toggled on (CTRL+SHIFT+B).
    pub debug_bounds: bool,
}

impl Default for InputState {
    fn default() -> InputState {
        InputState {
            mouse_state: MouseState::Normal,
            pointer_x: 0,
            pointer_y: 0,
            modifiers: 0,
            init: (0, 0),
            win_origin: (0, 0),
            click: (0, 0),
            moved: false,
            drag_button: BUTTON_NONE,
            drag_target: None,
            resizing_w: 0,
            resizing_h: 0,
            debug_hit_test: false,
            debug_bounds: false,
        }
    }
}

impl InputState {
    /// A fresh state machine in `NORMAL` with the pointer at the origin.
    pub fn new() -> InputState {
        InputState::default()
    }

    /// The pointer position in plain screen pixels (subpixels / 3).
    pub fn pointer_screen(&self) -> (f64, f64) {
        (self.pointer_x as f64 / PTR_SCALE as f64, self.pointer_y as f64 / PTR_SCALE as f64)
    }

    fn hit_test(&self, shared: &Shared) -> Option<Wid> {
        let (x, y) = self.pointer_screen();
        shared.registry.hit_test(x, y, sample_alpha)
    }

    /// Window-local coordinates of the pointer within `wid`, or `(0, 0)` if
    /// `wid` no longer exists.
    fn local_coords(&self, shared: &Shared, wid: Wid) -> (i32, i32) {
        match shared.registry.lookup(wid) {
            Some(w) => {
                let (x, y) = self.pointer_screen();
                let rotation = if w.band == Band::Mid { w.rotation } else { 0 };
                let (lx, ly) = inverse_rotate(x, y, w.x, w.y, w.width, w.height, rotation);
                (lx as i32, ly as i32)
            }
            None => (0, 0),
        }
    }

    /// Feeds one decoded mouse sample into the state machine, mutating the
    /// registry/damage queue and emitting client messages as needed.
    pub fn handle_mouse(
        &mut self,
        shared: &mut Shared,
        damage: &mut DamageQueue,
        outbox: &mut impl Outbox,
        screen_w: u32,
        screen_h: u32,
        sample: MouseSample,
    ) {
        let max_x = (screen_w as i64 * PTR_SCALE - 1).max(0);
        let max_y = (screen_h as i64 * PTR_SCALE - 1).max(0);
        let moved_since = sample.x as i64 != self.pointer_x || sample.y as i64 != self.pointer_y;
        self.pointer_x = (sample.x as i64).clamp(0, max_x);
        self.pointer_y = (sample.y as i64).clamp(0, max_y);

        if sample.button != BUTTON_NONE && sample.pressed {
            self.on_press(shared, outbox, sample.button);
        } else if sample.button != BUTTON_NONE && !sample.pressed {
            self.on_release(shared, damage, outbox, sample.button);
        } else if moved_since {
            self.on_motion(shared, damage, outbox);
        }
    }

    fn on_press(&mut self, shared: &mut Shared, outbox: &mut impl Outbox, button: u32) {
        let alt = self.modifiers & MOD_ALT != 0;
        if self.mouse_state != MouseState::Normal {
            return;
        }
        match (button, alt) {
            (BUTTON_LEFT, true) => {
                let hit = self.hit_test(shared);
                shared.set_focus(outbox, hit);
                if let Some(wid) = hit.filter(|&w| self.is_mid(shared, w)) {
                    if let Some(win) = shared.registry.lookup(wid) {
                        shared.registry.capture = Some(wid);
                        self.init = (self.pointer_x, self.pointer_y);
                        self.win_origin = (win.x, win.y);
                        self.mouse_state = MouseState::Moving;
                    }
                }
            }
            (BUTTON_MIDDLE, true) => {
                let hit = self.hit_test(shared);
                shared.set_focus(outbox, hit);
                if let Some(wid) = hit.filter(|&w| self.is_mid(shared, w)) {
                    if let Some(win) = shared.registry.lookup(wid) {
                        shared.registry.capture = Some(wid);
                        self.init = (self.pointer_x, self.pointer_y);
                        self.resizing_w = win.width;
                        self.resizing_h = win.height;
                        self.mouse_state = MouseState::Resizing;
                    }
                }
            }
            (BUTTON_LEFT, false) => {
                let hit = self.hit_test(shared);
                shared.set_focus(outbox, hit);
                if let Some(wid) = hit {
                    let local = self.local_coords(shared, wid);
                    let owner = shared.registry.lookup(wid).map(|w| w.owner);
                    if let Some(owner) = owner {
                        outbox.send(owner, wid.0, &MouseDown { x: local.0, y: local.1, button });
                    }
                    self.click = local;
                    self.moved = false;
                    self.drag_button = button;
                    self.drag_target = Some(wid);
                    self.mouse_state = MouseState::Dragging;
                }
            }
            _ => {}
        }
    }

    fn on_release(&mut self, shared: &mut Shared, damage: &mut DamageQueue, outbox: &mut impl Outbox, button: u32) {
        match self.mouse_state {
            MouseState::Moving if button == BUTTON_LEFT => {
                shared.registry.capture = None;
                self.mouse_state = MouseState::Normal;
            }
            MouseState::Dragging if button == self.drag_button => {
                if let Some(wid) = self.drag_target {
                    let new_local = self.local_coords(shared, wid);
                    let owner = shared.registry.lookup(wid).map(|w| w.owner);
                    if let Some(owner) = owner {
                        if !self.moved {
                            outbox.send(owner, wid.0, &MouseClick { x: new_local.0, y: new_local.1, button });
                        } else {
                            outbox.send(
                                owner,
                                wid.0,
                                &MouseRaise {
                                    old_x: self.click.0,
                                    old_y: self.click.1,
                                    new_x: new_local.0,
                                    new_y: new_local.1,
                                    button,
                                },
                            );
                        }
                    }
                }
                self.drag_target = None;
                self.mouse_state = MouseState::Normal;
            }
            MouseState::Resizing if button == BUTTON_MIDDLE => {
                if let Some(wid) = shared.registry.capture {
                    let owner = shared.registry.lookup(wid).map(|w| w.owner);
                    if let Some(owner) = owner {
                        outbox.send(
                            owner,
                            wid.0,
                            &ResizeOffer { width: self.resizing_w, height: self.resizing_h, flags: 0 },
                        );
                    }
                }
                let _ = damage; // outline invalidation already happened during motion
                shared.registry.capture = None;
                self.mouse_state = MouseState::Normal;
            }
            _ => {}
        }
    }

    fn on_motion(&mut self, shared: &mut Shared, damage: &mut DamageQueue, outbox: &mut impl Outbox) {
        match self.mouse_state {
            MouseState::Normal => {
                if let Some(focus) = shared.registry.focus {
                    let (x, y) = self.local_coords(shared, focus);
                    if let Some(owner) = shared.registry.lookup(focus).map(|w| w.owner) {
                        outbox.send(owner, focus.0, &MouseMoveEvent { x, y });
                    }
                }
                let hit = self.hit_test(shared);
                if hit != shared.registry.hover {
                    if let Some(old) = shared.registry.hover {
                        if let Some(owner) = shared.registry.lookup(old).map(|w| w.owner) {
                            outbox.send(owner, old.0, &MouseLeave {});
                        }
                    }
                    shared.registry.hover = hit;
                    if let Some(new) = hit {
                        if let Some(owner) = shared.registry.lookup(new).map(|w| w.owner) {
                            outbox.send(owner, new.0, &MouseEnter {});
                            let (x, y) = self.local_coords(shared, new);
                            outbox.send(owner, new.0, &MouseMoveEvent { x, y });
                        }
                    }
                }
            }
            MouseState::Moving => {
                if let Some(wid) = shared.registry.capture {
                    if let Some(w) = shared.registry.lookup(wid) {
                        damage.mark_window(w);
                    }
                    let dx = ((self.pointer_x - self.init.0) / PTR_SCALE) as i32;
                    let dy = ((self.pointer_y - self.init.1) / PTR_SCALE) as i32;
                    if let Some(w) = shared.registry.lookup_mut(wid) {
                        w.x = self.win_origin.0 + dx;
                        w.y = self.win_origin.1 + dy;
                    }
                    if let Some(w) = shared.registry.lookup(wid) {
                        damage.mark_window(w);
                    }
                }
            }
            MouseState::Dragging => {
                if let Some(wid) = self.drag_target {
                    let new_local = self.local_coords(shared, wid);
                    if new_local != self.click {
                        self.moved = true;
                        if let Some(owner) = shared.registry.lookup(wid).map(|w| w.owner) {
                            outbox.send(
                                owner,
                                wid.0,
                                &MouseDrag { old_x: self.click.0, old_y: self.click.1, new_x: new_local.0, new_y: new_local.1 },
                            );
                        }
                        self.click = new_local;
                    }
                }
            }
            MouseState::Resizing => {
                if let Some(wid) = shared.registry.capture {
                    const MARGIN: i32 = 2;
                    const STROKE: u32 = 10;
                    if let Some(w) = shared.registry.lookup(wid) {
                        let (x, y) = (w.x, w.y);
                        let (ow, oh) = (self.resizing_w, self.resizing_h);
                        damage.mark_region(
                            x - MARGIN,
                            y - MARGIN,
                            ow + 2 * (MARGIN as u32 + STROKE),
                            oh + 2 * (MARGIN as u32 + STROKE),
                        );
                    }
                    let dx = ((self.pointer_x - self.init.0) / PTR_SCALE) as i32;
                    let dy = ((self.pointer_y - self.init.1) / PTR_SCALE) as i32;
                    self.resizing_w = self.resizing_w.saturating_add_signed(dx).max(1);
                    self.resizing_h = self.resizing_h.saturating_add_signed(dy).max(1);
                    self.init = (self.pointer_x, self.pointer_y);
                    if let Some(w) = shared.registry.lookup(wid) {
                        let (x, y) = (w.x, w.y);
                        let (nw, nh) = (self.resizing_w, self.resizing_h);
                        damage.mark_region(
                            x - MARGIN,
                            y - MARGIN,
                            nw + 2 * (MARGIN as u32 + STROKE),
                            nh + 2 * (MARGIN as u32 + STROKE),
                        );
                    }
                }
            }
        }
    }

    fn is_mid(&self, shared: &Shared, wid: Wid) -> bool {
        shared.registry.lookup(wid).map(|w| w.band == Band::Mid).unwrap_or(false)
    }

    /// Starts a `MOVING` gesture for `wid` using the current pointer
    /// position, as requested by `WINDOW_DRAG_START`. A no-op unless
    /// `wid` is in `MID` and no gesture is already in progress.
    pub fn begin_drag(&mut self, shared: &mut Shared, wid: Wid) {
        if self.mouse_state != MouseState::Normal || !self.is_mid(shared, wid) {
            return;
        }
        if let Some(w) = shared.registry.lookup(wid) {
            shared.registry.capture = Some(wid);
            self.init = (self.pointer_x, self.pointer_y);
            self.win_origin = (w.x, w.y);
            self.mouse_state = MouseState::Moving;
        }
    }

    /// Feeds one key event into the state machine: built-in shortcuts first,
    /// then the global key-bind table, then the focused window (or its
    /// fallback) as a plain forward.
    pub fn handle_key(
        &mut self,
        shared: &mut Shared,
        damage: &mut DamageQueue,
        binds: &KeyBindTable,
        outbox: &mut impl Outbox,
        screen_w: u32,
        screen_h: u32,
        keycode: u32,
        modifiers: u32,
        pressed: bool,
    ) {
        self.modifiers = modifiers;
        if pressed {
            if let Some(focus) = shared.focus_or_fallback() {
                self.handle_builtin_key(shared, damage, outbox, screen_w, screen_h, focus, keycode, modifiers);
            }
        }
        if let Some(binding) = binds.lookup(modifiers, keycode) {
            outbox.send(
                binding.owner,
                0,
                &compositor_proto::KeyEvent { keycode, modifiers, pressed: pressed as u32 },
            );
            if binding.response == BindResponse::Steal {
                return;
            }
        }
        if let Some(focus) = shared.focus_or_fallback() {
            if let Some(owner) = shared.registry.lookup(focus).map(|w| w.owner) {
                outbox.send(owner, focus.0, &compositor_proto::KeyEvent { keycode, modifiers, pressed: pressed as u32 });
            }
        }
    }

    fn handle_builtin_key(
        &mut self,
        shared: &mut Shared,
        damage: &mut DamageQueue,
        outbox: &mut impl Outbox,
        screen_w: u32,
        screen_h: u32,
        wid: Wid,
        keycode: u32,
        modifiers: u32,
    ) {
        let is_mid = self.is_mid(shared, wid);
        match (modifiers, keycode) {
            (m, KEY_Z) if m == MOD_CTRL | MOD_SHIFT && is_mid => rotate_by(shared, damage, wid, -5),
            (m, KEY_X) if m == MOD_CTRL | MOD_SHIFT && is_mid => rotate_by(shared, damage, wid, 5),
            (m, KEY_C) if m == MOD_CTRL | MOD_SHIFT && is_mid => rotate_to(shared, damage, wid, 0),
            (m, KEY_F10) if m == MOD_ALT => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 1, 1, 0, 0),
            (m, KEY_LEFT) if m == MOD_SUPER => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 2, 1, 0, 0),
            (m, KEY_RIGHT) if m == MOD_SUPER => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 2, 1, 1, 0),
            (m, KEY_UP) if m == MOD_SUPER => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 1, 2, 0, 0),
            (m, KEY_DOWN) if m == MOD_SUPER => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 1, 2, 0, 1),
            (m, KEY_LEFT) if m == MOD_SUPER | MOD_SHIFT => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 2, 2, 0, 0),
            (m, KEY_RIGHT) if m == MOD_SUPER | MOD_SHIFT => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 2, 2, 1, 0),
            (m, KEY_LEFT) if m == MOD_SUPER | MOD_CTRL => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 2, 2, 0, 1),
            (m, KEY_RIGHT) if m == MOD_SUPER | MOD_CTRL => self.tile(shared, damage, outbox, screen_w, screen_h, wid, 2, 2, 1, 1),
            (m, KEY_V) if m == MOD_CTRL | MOD_SHIFT => self.debug_hit_test = !self.debug_hit_test,
            (m, KEY_B) if m == MOD_CTRL | MOD_SHIFT => self.debug_bounds = !self.debug_bounds,
            _ => {}
        }
    }

    /// `tile(W, wdiv, hdiv, cx, cy)`: repositions `wid` into cell
    /// `(cx, cy)` of a `wdiv x hdiv` grid covering the screen below the
    /// `TOP` band, and offers the corresponding size for the client to
    /// accept via the normal resize handshake.
    pub fn tile(
        &self,
        shared: &mut Shared,
        damage: &mut DamageQueue,
        outbox: &mut impl Outbox,
        screen_w: u32,
        screen_h: u32,
        wid: Wid,
        wdiv: u32,
        hdiv: u32,
        cx: u32,
        cy: u32,
    ) {
        let panel_h = shared
            .registry
            .top()
            .and_then(|t| shared.registry.lookup(t))
            .map(|w| w.height)
            .unwrap_or(0);
        let w = screen_w / wdiv.max(1);
        let h = screen_h.saturating_sub(panel_h) / hdiv.max(1);
        if let Some(win) = shared.registry.lookup(wid) {
            damage.mark_window(win);
        }
        if let Some(win) = shared.registry.lookup_mut(wid) {
            win.x = (w * cx) as i32;
            win.y = (panel_h + h * cy) as i32;
        }
        if let Some(win) = shared.registry.lookup(wid) {
            damage.mark_window(win);
            outbox.send(win.owner, wid.0, &ResizeOffer { width: w, height: h, flags: 0 });
        }
    }
}

fn rotate_by(shared: &mut Shared, damage: &mut DamageQueue, wid: Wid, delta: i32) {
    if let Some(w) = shared.registry.lookup(wid) {
        damage.mark_window(w);
    }
    if let Some(w) = shared.registry.lookup_mut(wid) {
        w.rotation = (w.rotation + delta).rem_euclid(360);
    }
    if let Some(w) = shared.registry.lookup(wid) {
        damage.mark_window(w);
    }
}

fn rotate_to(shared: &mut Shared, damage: &mut DamageQueue, wid: Wid, value: i32) {
    if let Some(w) = shared.registry.lookup(wid) {
        damage.mark_window(w);
    }
    if let Some(w) = shared.registry.lookup_mut(wid) {
        w.rotation = value.rem_euclid(360);
    }
    if let Some(w) = shared.registry.lookup(wid) {
        damage.mark_window(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::RecordingOutbox;
    use compositor_channel::Source;
    use compositor_proto::Msg;
    use compositor_wire::Wire as _;

    fn src(n: u64) -> Source {
        Source::from_raw(n)
    }

    fn sample(x: i32, y: i32, button: u32, pressed: bool) -> MouseSample {
        MouseSample { x: x * PTR_SCALE as i32, y: y * PTR_SCALE as i32, buttons: 0, button, pressed }
    }

    #[test]
    fn click_with_no_motion_sends_down_then_click() {
        let mut shared = Shared::new();
        let mut damage = DamageQueue::new();
        let mut input = InputState::new();
        let mut ob = RecordingOutbox::new();
        let owner = src(1);
        let wid = shared.registry.create(owner, 100, 50, 0).unwrap();
        shared.registry.lookup_mut(wid).unwrap().x = 10;
        shared.registry.lookup_mut(wid).unwrap().y = 10;
        // A freshly-created buffer is zero-filled (fully transparent); drop
        // the threshold to 0 so the window is hit-testable without painting.
        shared.registry.lookup_mut(wid).unwrap().alpha_threshold = 0;

        input.handle_mouse(&mut shared, &mut damage, &mut ob, 800, 600, sample(50, 30, BUTTON_NONE, false));
        input.handle_mouse(&mut shared, &mut damage, &mut ob, 800, 600, sample(50, 30, BUTTON_LEFT, true));
        input.handle_mouse(&mut shared, &mut damage, &mut ob, 800, 600, sample(50, 30, BUTTON_LEFT, false));

        let kinds: Vec<u32> = ob.sent.iter().map(|(_, _, k, _)| *k).collect();
        assert!(kinds.contains(&(Msg::MouseDown as u32)));
        assert!(kinds.contains(&(Msg::MouseClick as u32)));
        assert!(!kinds.contains(&(Msg::MouseRaise as u32)));
        assert_eq!(input.mouse_state, MouseState::Normal);
    }

    #[test]
    fn alt_drag_moves_the_window() {
        let mut shared = Shared::new();
        let mut damage = DamageQueue::new();
        let mut input = InputState::new();
        let mut ob = RecordingOutbox::new();
        let wid = shared.registry.create(src(1), 50, 50, 0).unwrap();
        {
            let w = shared.registry.lookup_mut(wid).unwrap();
            w.x = 100;
            w.y = 100;
            w.alpha_threshold = 0;
        }
        input.modifiers = MOD_ALT;
        input.handle_mouse(&mut shared, &mut damage, &mut ob, 800, 600, sample(150, 150, BUTTON_LEFT, true));
        assert_eq!(input.mouse_state, MouseState::Moving);
        input.handle_mouse(&mut shared, &mut damage, &mut ob, 800, 600, sample(170, 155, BUTTON_NONE, false));
        let w = shared.registry.lookup(wid).unwrap();
        assert_eq!((w.x, w.y), (120, 105));
        input.handle_mouse(&mut shared, &mut damage, &mut ob, 800, 600, sample(170, 155, BUTTON_LEFT, false));
        assert_eq!(input.mouse_state, MouseState::Normal);
        assert_eq!(shared.registry.capture, None);
    }

    #[test]
    fn tile_maximal_matches_the_documented_law() {
        let mut shared = Shared::new();
        let mut damage = DamageQueue::new();
        let mut ob = RecordingOutbox::new();
        let input = InputState::new();
        let wid = shared.registry.create(src(1), 10, 10, 0).unwrap();
        input.tile(&mut shared, &mut damage, &mut ob, 800, 600, wid, 1, 1, 0, 0);
        let w = shared.registry.lookup(wid).unwrap();
        assert_eq!((w.x, w.y), (0, 0));
        let (_, _, _, body) = ob.sent.last().unwrap();
        let offer = compositor_proto::ResizeOffer::from_bytes(body);
        assert_eq!((offer.width, offer.height), (800, 600));
    }

    #[test]
    fn key_bind_steal_suppresses_forwarding_to_focus() {
        let mut shared = Shared::new();
        let mut damage = DamageQueue::new();
        let mut input = InputState::new();
        let mut binds = KeyBindTable::new();
        let mut ob = RecordingOutbox::new();
        let focused_owner = src(1);
        let bind_owner = src(2);
        let wid = shared.registry.create(focused_owner, 10, 10, 0).unwrap();
        shared.set_focus(&mut ob, Some(wid));
        ob.sent.clear();
        binds.bind(MOD_CTRL | MOD_ALT, 20, bind_owner, BindResponse::Steal);

        input.handle_key(&mut shared, &mut damage, &binds, &mut ob, 800, 600, 20, MOD_CTRL | MOD_ALT, true);

        assert_eq!(ob.sent.len(), 1);
        assert_eq!(ob.sent[0].0, bind_owner);
    }

    #[test]
    fn rotation_only_applies_to_mid_windows() {
        let mut shared = Shared::new();
        let mut damage = DamageQueue::new();
        let mut input = InputState::new();
        let binds = KeyBindTable::new();
        let mut ob = RecordingOutbox::new();
        let wid = shared.registry.create(src(1), 10, 10, 0).unwrap();
        shared.registry.reorder(wid, Band::Top);
        shared.set_focus(&mut ob, Some(wid));
        input.handle_key(&mut shared, &mut damage, &binds, &mut ob, 800, 600, KEY_Z, MOD_CTRL | MOD_SHIFT, true);
        assert_eq!(shared.registry.lookup(wid).unwrap().rotation, 0);
    }
}
