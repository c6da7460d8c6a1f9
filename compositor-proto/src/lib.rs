//! # Wire protocol for the compositor's client channel
//!
//! ## Transport and terminology
//!
//! The compositor protocol is spoken over a local datagram channel (see
//! `compositor-channel`) between the compositor process and each connected
//! client.  Every packet carries an opaque *source* handle, attached by the
//! transport, that identifies which client (or input-source thread) sent it.
//!
//! ## Message format
//!
//! Each message is a C-like struct that is cast to a byte slice and sent
//! directly over the channel, without any marshalling step.  This is safe
//! because no message defined here has any padding bytes; see
//! `compositor_wire` for the mechanism that makes the cast safe.  All
//! messages are in native byte order (little-endian on every platform this
//! crate is built for).
//!
//! Every packet begins with a [`Header`], whose first field is the protocol
//! [`MAGIC`] number.  A packet whose magic does not match is a transient
//! protocol error: it is logged and dropped, and the connection is left open.
//!
//! ## Window IDs
//!
//! Windows are identified by a 32-bit id, assigned by the compositor and
//! returned in [`WindowInit`].  Zero is reserved and never assigned to a real
//! window.  It is used as a wid in contexts (such as the [`WindowAdvertise`]
//! stream terminator) where "no window" must be representable.
#![no_std]
#![forbid(missing_docs)]

use compositor_wire::Wire;
use core::convert::TryFrom;

/// Magic number that must begin every packet payload.
pub const MAGIC: u32 = 0x434D_5057;

/// Arbitrary maximum window width, in pixels.
pub const MAX_WINDOW_WIDTH: u32 = 16384;

/// Arbitrary maximum window height, in pixels.
pub const MAX_WINDOW_HEIGHT: u32 = 6144;

/// Number of client-defined 32-bit advertisement offsets carried per window.
pub const CLIENT_OFFSET_COUNT: usize = 5;

/// Number of bytes reserved for the opaque client string blob in
/// [`WindowAdvertise`] (title, icon name, window class, ...).
pub const CLIENT_STRINGS_LEN: usize = 128;

// This allows pattern-matching against constant values without a huge amount
// of boilerplate code, the common pattern for wire-protocol message-type
// enums that also need a `TryFrom` back off the raw integer.
macro_rules! enum_const {
    (
        #[repr($t: ty)]
        $(#[$i: meta])*
        $p: vis enum $n: ident {
            $(
                $(#[$j: meta])*
                ($const_name: ident, $variant_name: ident) $(= $e: expr)?
            ),*$(,)?
        }
    ) => {
        $(#[$i])*
        #[repr($t)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $p enum $n {
            $(
                $(#[$j])*
                $variant_name $(= $e)?,
            )*
        }

        $(
            $(#[$j])*
            $p const $const_name: $t = $n::$variant_name as $t;
        )*

        impl core::convert::TryFrom<$t> for $n {
            type Error = $t;
            #[allow(non_upper_case_globals)]
            #[inline]
            fn try_from(value: $t) -> core::result::Result<Self, $t> {
                match value {
                    $(
                        $const_name => return core::result::Result::Ok($n::$variant_name),
                    )*
                    other => core::result::Result::Err(other),
                }
            }
        }
    }
}

enum_const! {
    #[repr(u32)]
    /// Message types.
    pub enum Msg {
        /// Client ⇒ server: first message on a new connection.
        (MSG_HELLO, Hello) = 1,
        /// Server ⇒ client: reply to [`MSG_HELLO`].
        (MSG_WELCOME, Welcome),
        /// Client ⇒ server: create a new window.
        (MSG_WINDOW_NEW, WindowNew),
        /// Server ⇒ client: reply to [`MSG_WINDOW_NEW`].
        (MSG_WINDOW_INIT, WindowInit),
        /// Client ⇒ server: the whole window was repainted into its buffer.
        (MSG_FLIP, Flip),
        /// Client ⇒ server: a sub-rectangle of the window was repainted.
        (MSG_FLIP_REGION, FlipRegion),
        /// Input source ⇒ server: a key changed state.
        (MSG_KEY_EVENT, KeyEvent),
        /// Input source ⇒ server, or Server ⇒ client: pointer state changed.
        (MSG_MOUSE_EVENT, MouseEvent),
        /// Client ⇒ server: move a window.
        (MSG_WINDOW_MOVE, WindowMove),
        /// Client ⇒ server: close a window.
        (MSG_WINDOW_CLOSE, WindowClose),
        /// Client ⇒ server: change a window's z-band.
        (MSG_WINDOW_STACK, WindowStack),
        /// Client ⇒ server: ask to resize a window.
        (MSG_RESIZE_REQUEST, ResizeRequest),
        /// Server ⇒ client: a resize is being offered (requested or by tiling).
        (MSG_RESIZE_OFFER, ResizeOffer),
        /// Client ⇒ server: accept a previously offered resize.
        (MSG_RESIZE_ACCEPT, ResizeAccept),
        /// Server ⇒ client: reply to [`MSG_RESIZE_ACCEPT`] with the new buffer id.
        (MSG_RESIZE_BUFID, ResizeBufid),
        /// Client ⇒ server: the new buffer has been painted; commit the resize.
        (MSG_RESIZE_DONE, ResizeDone),
        /// Client ⇒ server: request a full window list.
        (MSG_QUERY_WINDOWS, QueryWindows),
        /// Server ⇒ client: one entry of the window list, or (wid=0) its terminator.
        (MSG_WINDOW_ADVERTISE, WindowAdvertise),
        /// Client ⇒ server: subscribe to window-list change notifications.
        (MSG_SUBSCRIBE, Subscribe),
        /// Client ⇒ server: undo a previous [`MSG_SUBSCRIBE`].
        (MSG_UNSUBSCRIBE, Unsubscribe),
        /// Client ⇒ server, broadcast server ⇒ all clients: end the session.
        (MSG_SESSION_END, SessionEnd),
        /// Client ⇒ server: request focus for a window.
        (MSG_WINDOW_FOCUS, WindowFocus),
        /// Client ⇒ server: install or overwrite a global key binding.
        (MSG_KEY_BIND, KeyBind),
        /// Client ⇒ server: begin a drag-move gesture for a window.
        (MSG_WINDOW_DRAG_START, WindowDragStart),
        /// Client ⇒ server: set the hit-test alpha threshold for a window.
        (MSG_WINDOW_UPDATE_SHAPE, WindowUpdateShape),
        /// Server ⇒ client: the pointer went down over the window.
        (MSG_MOUSE_DOWN, MouseDown),
        /// Server ⇒ client: a plain click (press+release, no motion).
        (MSG_MOUSE_CLICK, MouseClick),
        /// Server ⇒ client: a click that raised the window (motion occurred).
        (MSG_MOUSE_RAISE, MouseRaise),
        /// Server ⇒ client: the pointer is being dragged within the window.
        (MSG_MOUSE_DRAG, MouseDrag),
        /// Server ⇒ client: pointer motion while hovering/focused, no buttons.
        (MSG_MOUSE_MOVE, MouseMoveEvent),
        /// Server ⇒ client: pointer entered the window.
        (MSG_MOUSE_ENTER, MouseEnter),
        /// Server ⇒ client: pointer left the window.
        (MSG_MOUSE_LEAVE, MouseLeave),
        /// Server ⇒ client: focus changed (in or out).
        (MSG_FOCUS_CHANGE, FocusChange),
        /// Server ⇒ subscriber: the window list or a window's advertised
        /// metadata changed; reconcile with [`MSG_QUERY_WINDOWS`].
        (MSG_WINDOWS_CHANGED, WindowsChanged),
    }
}

enum_const! {
    #[repr(u32)]
    /// Z-band a window occupies.
    pub enum Band {
        /// Single-slot band painted first (furthest from the viewer).
        (BAND_BOTTOM, Bottom) = 0,
        /// Ordered, multi-window band.
        (BAND_MID, Mid) = 1,
        /// Single-slot band painted last (closest to the viewer).
        (BAND_TOP, Top) = 2,
    }
}

enum_const! {
    #[repr(u32)]
    /// Whether a key binding is forwarded to the focused window afterwards.
    pub enum BindResponse {
        /// The event is also forwarded to the focused window.
        (BIND_PASS_THROUGH, PassThrough) = 0,
        /// The event is consumed entirely by the bind owner.
        (BIND_STEAL, Steal) = 1,
    }
}

enum_const! {
    #[repr(u32)]
    /// Direction of a [`FocusChange`] notification.
    pub enum FocusDirection {
        /// The window lost focus.
        (FOCUS_OUT, Out) = 0,
        /// The window gained focus.
        (FOCUS_IN, In) = 1,
    }
}

enum_const! {
    #[repr(u32)]
    /// Mouse button identifiers used in [`MouseEvent`] and friends.
    pub enum MouseButton {
        /// No button / not applicable.
        (BUTTON_NONE, None) = 0,
        /// Primary (left) button.
        (BUTTON_LEFT, Left) = 1,
        /// Secondary (right) button.
        (BUTTON_RIGHT, Right) = 2,
        /// Middle button.
        (BUTTON_MIDDLE, Middle) = 3,
    }
}

/// Trait for protocol structs, associating each with its [`Msg`] discriminant.
pub trait Message: compositor_wire::Wire {
    /// The kind of the message.
    const KIND: Msg;
}

compositor_wire::wire_struct! {
    /// A message as it appears on the wire, immediately after [`MAGIC`].
    pub struct Header {
        /// Must equal [`MAGIC`]; otherwise the packet is a protocol error.
        pub magic: u32,
        /// The message type; see [`Msg`].
        pub ty: u32,
        /// The window the message concerns, or 0 if not applicable.
        pub window: u32,
        /// Length in bytes of the body that follows this header.
        pub len: u32,
    }

    /// Client ⇒ server: first message on a new connection. Carries no body.
    pub struct Hello {}

    /// Server ⇒ client: reply to [`Hello`].
    pub struct Welcome {
        /// Width of the virtual screen, in pixels.
        pub screen_width: u32,
        /// Height of the virtual screen, in pixels.
        pub screen_height: u32,
    }

    /// Client ⇒ server: request a new window of the given size.
    pub struct WindowNew {
        /// Requested width in pixels. Zero is permitted (see the design
        /// notes on zero-sized windows).
        pub width: u32,
        /// Requested height in pixels.
        pub height: u32,
    }

    /// Server ⇒ client: reply to [`WindowNew`].
    pub struct WindowInit {
        /// The newly assigned window id.
        pub wid: u32,
        /// Width of the allocated buffer, in pixels.
        pub width: u32,
        /// Height of the allocated buffer, in pixels.
        pub height: u32,
        /// Shared-memory buffer id backing the window.
        pub bufid: u32,
    }

    /// Client ⇒ server: the whole window buffer was repainted.
    pub struct Flip {}

    /// Client ⇒ server: a sub-rectangle of the window buffer was repainted.
    pub struct FlipRegion {
        /// X offset of the damaged rectangle, window-relative.
        pub x: i32,
        /// Y offset of the damaged rectangle, window-relative.
        pub y: i32,
        /// Width of the damaged rectangle.
        pub width: u32,
        /// Height of the damaged rectangle.
        pub height: u32,
    }

    /// Input source ⇒ server: a key changed state.
    pub struct KeyEvent {
        /// Platform keycode.
        pub keycode: u32,
        /// Bitmask of currently-held modifier keys.
        pub modifiers: u32,
        /// Non-zero if the key was pressed, zero if released.
        pub pressed: u32,
    }

    /// Input source ⇒ server, or server ⇒ client: pointer state.
    pub struct MouseEvent {
        /// X coordinate. Screen-space when sent by an input source,
        /// window-local when delivered to a client.
        pub x: i32,
        /// Y coordinate, same convention as `x`.
        pub y: i32,
        /// Bitmask of currently-held buttons (bit `n` = [`MouseButton`] `n`).
        pub buttons: u32,
        /// The button whose state changed, or [`BUTTON_NONE`] for plain motion.
        pub button: u32,
        /// Non-zero if `button` was just pressed, zero if released or n/a.
        pub pressed: u32,
    }

    /// Client ⇒ server: move a window to an absolute screen position.
    pub struct WindowMove {
        /// New X coordinate of the window's top-left corner.
        pub x: i32,
        /// New Y coordinate of the window's top-left corner.
        pub y: i32,
    }

    /// Client ⇒ server: close a window. Carries no body.
    pub struct WindowClose {}

    /// Client ⇒ server: change a window's z-band.
    pub struct WindowStack {
        /// The requested [`Band`].
        pub band: u32,
    }

    /// Client ⇒ server: ask the server to resize one of the client's windows.
    pub struct ResizeRequest {
        /// Requested width, in pixels.
        pub width: u32,
        /// Requested height, in pixels.
        pub height: u32,
    }

    /// Server ⇒ client: a resize is being offered.
    pub struct ResizeOffer {
        /// Offered width, in pixels.
        pub width: u32,
        /// Offered height, in pixels.
        pub height: u32,
        /// Reserved for future use; always 0.
        pub flags: u32,
    }

    /// Client ⇒ server: accept a previously offered resize.
    pub struct ResizeAccept {
        /// Accepted width, in pixels.
        pub width: u32,
        /// Accepted height, in pixels.
        pub height: u32,
    }

    /// Server ⇒ client: reply to [`ResizeAccept`] with the pending buffer id.
    pub struct ResizeBufid {
        /// Width of the pending buffer, in pixels.
        pub width: u32,
        /// Height of the pending buffer, in pixels.
        pub height: u32,
        /// Shared-memory buffer id of the pending buffer.
        pub bufid: u32,
    }

    /// Client ⇒ server: the pending buffer has been painted; commit the resize.
    pub struct ResizeDone {
        /// Width that was committed, in pixels.
        pub width: u32,
        /// Height that was committed, in pixels.
        pub height: u32,
    }

    /// Client ⇒ server: request a snapshot of the window list. Carries no body.
    pub struct QueryWindows {}

    /// Server ⇒ client: one entry in a [`QueryWindows`] reply, or (when
    /// `wid == 0`) the terminator of the stream.
    pub struct WindowAdvertise {
        /// The advertised window's id, or 0 for the terminator.
        pub wid: u32,
        /// Opaque, client-supplied flags, OR'd with a synthetic "focused" bit.
        pub flags: u32,
        /// Opaque, client-supplied offsets.
        pub offsets: [u32; CLIENT_OFFSET_COUNT],
        /// Current width, in pixels.
        pub width: u32,
        /// Current height, in pixels.
        pub height: u32,
        /// Current X coordinate.
        pub x: i32,
        /// Current Y coordinate.
        pub y: i32,
        /// Opaque, client-supplied string blob (title, class, ...), NUL-padded.
        pub strings: [u8; CLIENT_STRINGS_LEN],
    }

    /// Client ⇒ server: subscribe to window-list notifications. Carries no body.
    pub struct Subscribe {}

    /// Client ⇒ server: undo a previous [`Subscribe`]. Carries no body.
    pub struct Unsubscribe {}

    /// Bidirectional: end the session. Carries no body.
    pub struct SessionEnd {}

    /// Client ⇒ server: request focus for a window. Carries no body.
    pub struct WindowFocus {}

    /// Client ⇒ server: install or overwrite a global key binding.
    pub struct KeyBind {
        /// Modifier bitmask to match.
        pub modifiers: u32,
        /// Keycode to match.
        pub keycode: u32,
        /// The requested [`BindResponse`].
        pub response: u32,
    }

    /// Client ⇒ server: begin a drag-move gesture using the current pointer
    /// position. Carries no body.
    pub struct WindowDragStart {}

    /// Client ⇒ server: set the hit-test alpha threshold for a window.
    pub struct WindowUpdateShape {
        /// Pixels with alpha strictly below this value are transparent to
        /// hit-testing.
        pub alpha_threshold: u32,
    }

    /// Server ⇒ client: the pointer went down over the window, no motion yet.
    pub struct MouseDown {
        /// Window-local X coordinate.
        pub x: i32,
        /// Window-local Y coordinate.
        pub y: i32,
        /// The button that was pressed.
        pub button: u32,
    }

    /// Server ⇒ client: a plain click (press and release, no motion).
    pub struct MouseClick {
        /// Window-local X coordinate.
        pub x: i32,
        /// Window-local Y coordinate.
        pub y: i32,
        /// The button that was released.
        pub button: u32,
    }

    /// Server ⇒ client: a click that involved motion (treated as a raise).
    pub struct MouseRaise {
        /// Window-local X coordinate at press time.
        pub old_x: i32,
        /// Window-local Y coordinate at press time.
        pub old_y: i32,
        /// Window-local X coordinate at release time.
        pub new_x: i32,
        /// Window-local Y coordinate at release time.
        pub new_y: i32,
        /// The button that was released.
        pub button: u32,
    }

    /// Server ⇒ client: the pointer moved while a button was held.
    pub struct MouseDrag {
        /// Window-local X coordinate before this motion.
        pub old_x: i32,
        /// Window-local Y coordinate before this motion.
        pub old_y: i32,
        /// Window-local X coordinate after this motion.
        pub new_x: i32,
        /// Window-local Y coordinate after this motion.
        pub new_y: i32,
    }

    /// Server ⇒ client: pointer motion with no buttons held.
    pub struct MouseMoveEvent {
        /// Window-local X coordinate.
        pub x: i32,
        /// Window-local Y coordinate.
        pub y: i32,
    }

    /// Server ⇒ client: the pointer entered the window. Carries no body.
    pub struct MouseEnter {}

    /// Server ⇒ client: the pointer left the window. Carries no body.
    pub struct MouseLeave {}

    /// Server ⇒ client: focus changed.
    pub struct FocusChange {
        /// The [`FocusDirection`] of the change.
        pub direction: u32,
    }

    /// Server ⇒ subscriber: the window list changed. Carries no body; the
    /// subscriber is expected to reconcile with [`QueryWindows`].
    pub struct WindowsChanged {}
}

macro_rules! impl_message {
    ($($ty: ty => $kind: expr),* $(,)?) => {
        $(impl Message for $ty {
            const KIND: Msg = $kind;
        })*
    }
}

impl_message! {
    Hello => Msg::Hello,
    Welcome => Msg::Welcome,
    WindowNew => Msg::WindowNew,
    WindowInit => Msg::WindowInit,
    Flip => Msg::Flip,
    FlipRegion => Msg::FlipRegion,
    KeyEvent => Msg::KeyEvent,
    MouseEvent => Msg::MouseEvent,
    WindowMove => Msg::WindowMove,
    WindowClose => Msg::WindowClose,
    WindowStack => Msg::WindowStack,
    ResizeRequest => Msg::ResizeRequest,
    ResizeOffer => Msg::ResizeOffer,
    ResizeAccept => Msg::ResizeAccept,
    ResizeBufid => Msg::ResizeBufid,
    ResizeDone => Msg::ResizeDone,
    QueryWindows => Msg::QueryWindows,
    WindowAdvertise => Msg::WindowAdvertise,
    Subscribe => Msg::Subscribe,
    Unsubscribe => Msg::Unsubscribe,
    SessionEnd => Msg::SessionEnd,
    WindowFocus => Msg::WindowFocus,
    KeyBind => Msg::KeyBind,
    WindowDragStart => Msg::WindowDragStart,
    WindowUpdateShape => Msg::WindowUpdateShape,
    MouseDown => Msg::MouseDown,
    MouseClick => Msg::MouseClick,
    MouseRaise => Msg::MouseRaise,
    MouseDrag => Msg::MouseDrag,
    MouseMoveEvent => Msg::MouseMoveEvent,
    MouseEnter => Msg::MouseEnter,
    MouseLeave => Msg::MouseLeave,
    FocusChange => Msg::FocusChange,
    WindowsChanged => Msg::WindowsChanged,
}

/// Returns the expected body length for a given message type, or `None` if
/// `ty` is not a recognized [`Msg`] discriminant.
///
/// The dispatcher uses this to validate the untrusted `len` field of a
/// [`Header`] before trusting it to size a read.
pub fn body_len(ty: u32) -> Option<usize> {
    use core::mem::size_of;
    Some(match Msg::try_from(ty).ok()? {
        Msg::Hello => size_of::<Hello>(),
        Msg::Welcome => size_of::<Welcome>(),
        Msg::WindowNew => size_of::<WindowNew>(),
        Msg::WindowInit => size_of::<WindowInit>(),
        Msg::Flip => size_of::<Flip>(),
        Msg::FlipRegion => size_of::<FlipRegion>(),
        Msg::KeyEvent => size_of::<KeyEvent>(),
        Msg::MouseEvent => size_of::<MouseEvent>(),
        Msg::WindowMove => size_of::<WindowMove>(),
        Msg::WindowClose => size_of::<WindowClose>(),
        Msg::WindowStack => size_of::<WindowStack>(),
        Msg::ResizeRequest => size_of::<ResizeRequest>(),
        Msg::ResizeOffer => size_of::<ResizeOffer>(),
        Msg::ResizeAccept => size_of::<ResizeAccept>(),
        Msg::ResizeBufid => size_of::<ResizeBufid>(),
        Msg::ResizeDone => size_of::<ResizeDone>(),
        Msg::QueryWindows => size_of::<QueryWindows>(),
        Msg::WindowAdvertise => size_of::<WindowAdvertise>(),
        Msg::Subscribe => size_of::<Subscribe>(),
        Msg::Unsubscribe => size_of::<Unsubscribe>(),
        Msg::SessionEnd => size_of::<SessionEnd>(),
        Msg::WindowFocus => size_of::<WindowFocus>(),
        Msg::KeyBind => size_of::<KeyBind>(),
        Msg::WindowDragStart => size_of::<WindowDragStart>(),
        Msg::WindowUpdateShape => size_of::<WindowUpdateShape>(),
        Msg::MouseDown => size_of::<MouseDown>(),
        Msg::MouseClick => size_of::<MouseClick>(),
        Msg::MouseRaise => size_of::<MouseRaise>(),
        Msg::MouseDrag => size_of::<MouseDrag>(),
        Msg::MouseMoveEvent => size_of::<MouseMoveEvent>(),
        Msg::MouseEnter => size_of::<MouseEnter>(),
        Msg::MouseLeave => size_of::<MouseLeave>(),
        Msg::FocusChange => size_of::<FocusChange>(),
        Msg::WindowsChanged => size_of::<WindowsChanged>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = Header {
            magic: MAGIC,
            ty: MSG_WINDOW_NEW,
            window: 0,
            len: core::mem::size_of::<WindowNew>() as u32,
        };
        assert_eq!(Header::from_bytes(h.as_bytes()), h);
    }

    #[test]
    fn msg_round_trips_through_try_from() {
        assert_eq!(Msg::try_from(MSG_HELLO), Ok(Msg::Hello));
        assert_eq!(Msg::try_from(MSG_FOCUS_CHANGE), Ok(Msg::FocusChange));
        assert!(Msg::try_from(0xFFFF_FFFFu32).is_err());
    }

    #[test]
    fn body_len_matches_struct_size() {
        assert_eq!(body_len(MSG_WINDOW_NEW), Some(core::mem::size_of::<WindowNew>()));
        assert_eq!(body_len(MSG_FLIP), Some(0));
        assert_eq!(body_len(0xFFFF_FFFF), None);
    }

    #[test]
    fn window_advertise_strings_are_embedded() {
        let mut adv = WindowAdvertise::default();
        adv.strings[0] = b'h';
        adv.strings[1] = b'i';
        let bytes = adv.as_bytes();
        assert_eq!(bytes.len(), core::mem::size_of::<WindowAdvertise>());
    }
}
