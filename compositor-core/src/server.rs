//! The server struct that threads the registry, damage queue, input state,
//! key bindings, and subscriber set through every operation, in place of a
//! scattering of ambient mutable state.
use crate::input::InputState;
use crate::keybind::KeyBindTable;
use crate::outbox::Outbox;
use crate::registry::{Registry, Wid};
use compositor_channel::Source;
use compositor_proto::{FocusChange, FOCUS_IN, FOCUS_OUT, WindowsChanged};
use std::collections::HashSet;

/// Registry plus the subscriber set, guarded together: both are mutated by
/// structural operations (create, destroy, focus change, stacking) that the
/// compositor's paint order must see atomically.
#[derive(Debug, Default)]
pub struct Shared {
    /// The window registry.
    pub registry: Registry,
    /// Clients that asked for window-list change notifications.
    pub subscribers: HashSet<Source>,
    /// Every client that has said `HELLO`, whether or not it owns a window
    /// or has subscribed. `SESSION_END` broadcasts to this set; owners and
    /// subscribers are each only a subset of it.
    pub clients: HashSet<Source>,
}

impl Shared {
    /// A fresh, empty `Shared`.
    pub fn new() -> Shared {
        Shared { registry: Registry::new(), subscribers: HashSet::new(), clients: HashSet::new() }
    }

    /// Changes the focused window, sending focus-lost to the previous
    /// owner strictly before focus-gained to the new one (an ordering
    /// guarantee), raising the new focus within `MID`, and notifying
    /// subscribers. A no-op if `new` is already the current focus.
    pub fn set_focus(&mut self, outbox: &mut impl Outbox, new: Option<Wid>) {
        if self.registry.focus == new {
            return;
        }
        if let Some(old) = self.registry.focus {
            if let Some(w) = self.registry.lookup(old) {
                let owner = w.owner;
                outbox.send(owner, old.0, &FocusChange { direction: FOCUS_OUT });
            }
        }
        self.registry.focus = new;
        if let Some(wid) = new {
            if let Some(w) = self.registry.lookup(wid) {
                let owner = w.owner;
                outbox.send(owner, wid.0, &FocusChange { direction: FOCUS_IN });
            }
            self.registry.raise(wid);
        }
        self.notify_subscribers(outbox);
    }

    /// The window key events should route to when nothing is explicitly
    /// focused: the `BOTTOM` window, its implicit default.
    pub fn focus_or_fallback(&self) -> Option<Wid> {
        self.registry.focus.or_else(|| self.registry.bottom())
    }

    /// Broadcasts a `WindowsChanged` notification to every subscriber.
    /// Send failures are swallowed; the subscriber list is not
    /// pruned (documented design debt).
    pub fn notify_subscribers(&self, outbox: &mut impl Outbox) {
        for &sub in &self.subscribers {
            outbox.send(sub, 0, &WindowsChanged {});
        }
    }
}

/// Immutable server-wide configuration, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ScreenConfig {
    /// Virtual screen width, in pixels.
    pub width: u32,
    /// Virtual screen height, in pixels.
    pub height: u32,
}

/// The complete mutable state of one compositor instance, excluding the
/// transport and backend surfaces (which the `compositor` binary owns and
/// passes in explicitly to each operation, rather than through a global
/// singleton).
#[derive(Debug)]
pub struct Server {
    /// Registry + subscribers, guarded as one unit.
    pub shared: Shared,
    /// Damage queue.
    pub damage: crate::damage::DamageQueue,
    /// Input/interaction state machine.
    pub input: InputState,
    /// Global key bindings.
    pub binds: KeyBindTable,
    /// Screen geometry.
    pub screen: ScreenConfig,
    /// Monotonically increasing tick counter, advanced by the compositor
    /// (ticks increment by 10 per frame).
    pub tick: u64,
}

impl Server {
    /// Builds a fresh server for a screen of the given size.
    pub fn new(width: u32, height: u32) -> Server {
        Server {
            shared: Shared::new(),
            damage: crate::damage::DamageQueue::new(),
            input: InputState::new(),
            binds: KeyBindTable::new(),
            screen: ScreenConfig { width, height },
            tick: 0,
        }
    }

    /// Tears down every window owned by `owner` via the normal fade-out
    /// close path (disconnect marks windows for close, it does not
    /// destroy them immediately), drops any key bindings they installed,
    /// and removes them from the client set (so a later `SESSION_END`
    /// broadcast does not address a closed transport).
    pub fn disconnect_client(&mut self, owner: Source) {
        let wids: Vec<Wid> = self.shared.registry.windows_of(owner).collect();
        for wid in wids {
            mark_for_close(&mut self.shared.registry, &mut self.damage, self.tick, wid);
        }
        self.binds.remove_owner(owner);
        self.shared.clients.remove(&owner);
    }
}

/// Begins a window's fade-out close animation: sets
/// `anim_mode = FadeOut` with `anim_start = now` and marks it damaged so the
/// first fade frame is painted. The window is not removed from any index
/// yet; that happens once the compositor observes the animation's end.
pub fn mark_for_close(registry: &mut Registry, damage: &mut crate::damage::DamageQueue, now: u64, wid: Wid) {
    if let Some(w) = registry.lookup_mut(wid) {
        w.anim_mode = crate::registry::AnimMode::FadeOut;
        w.anim_start = now;
    }
    if let Some(w) = registry.lookup(wid) {
        damage.mark_window(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::RecordingOutbox;
    use compositor_channel::Source;

    fn src(n: u64) -> Source {
        Source::from_raw(n)
    }

    #[test]
    fn set_focus_sends_out_before_in() {
        let mut shared = Shared::new();
        let a = shared.registry.create(src(1), 10, 10, 0).unwrap();
        let b = shared.registry.create(src(2), 10, 10, 0).unwrap();
        let mut ob = RecordingOutbox::new();
        shared.set_focus(&mut ob, Some(a));
        shared.set_focus(&mut ob, Some(b));
        // second call: one FOCUS_OUT to a's owner, one FOCUS_IN to b's owner,
        // plus two WindowsChanged notifies total (one per set_focus call;
        // no subscribers here, so zero).
        let kinds: Vec<u32> = ob.sent.iter().map(|(_, _, k, _)| *k).collect();
        assert_eq!(kinds, vec![compositor_proto::Msg::FocusChange as u32, compositor_proto::Msg::FocusChange as u32, compositor_proto::Msg::FocusChange as u32]);
        // first call only sends FOCUS_IN (no previous focus); second call
        // sends FOCUS_OUT then FOCUS_IN.
        assert_eq!(ob.sent[0].0, src(1));
        assert_eq!(ob.sent[1].0, src(1));
        assert_eq!(ob.sent[2].0, src(2));
    }

    #[test]
    fn disconnect_fades_out_rather_than_destroying_immediately() {
        let mut server = Server::new(800, 600);
        let owner = src(5);
        let a = server.shared.registry.create(owner, 10, 10, 0).unwrap();
        server.disconnect_client(owner);
        assert!(server.shared.registry.lookup(a).is_some());
        assert_eq!(
            server.shared.registry.lookup(a).unwrap().anim_mode,
            crate::registry::AnimMode::FadeOut
        );
    }
}
