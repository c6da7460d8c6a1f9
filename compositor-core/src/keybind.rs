//! The global key-binding table.
use compositor_channel::Source;
use compositor_proto::BindResponse;
use std::collections::HashMap;

/// Packs `(modifiers, keycode)` into the table's hash key, matching the wire
/// layout's convention: `(modifiers << 24) | (keycode & 0x00FFFFFF)`.
fn pack(modifiers: u32, keycode: u32) -> u32 {
    (modifiers << 24) | (keycode & 0x00FF_FFFF)
}

/// What happens to a key event once a matching binding fires.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    /// The client that installed the binding.
    pub owner: Source,
    /// Whether the event also reaches the focused window afterwards.
    pub response: BindResponse,
}

/// `(modifiers, keycode) -> (owner, response)`.
#[derive(Debug, Default)]
pub struct KeyBindTable {
    bindings: HashMap<u32, Binding>,
}

impl KeyBindTable {
    /// An empty table.
    pub fn new() -> KeyBindTable {
        KeyBindTable::default()
    }

    /// Installs a binding, overwriting any existing one for the same
    /// `(modifiers, keycode)` pair regardless of which client owned it.
    pub fn bind(&mut self, modifiers: u32, keycode: u32, owner: Source, response: BindResponse) {
        self.bindings.insert(pack(modifiers, keycode), Binding { owner, response });
    }

    /// Looks up the binding for a `(modifiers, keycode)` pair, if any.
    pub fn lookup(&self, modifiers: u32, keycode: u32) -> Option<Binding> {
        self.bindings.get(&pack(modifiers, keycode)).copied()
    }

    /// Removes every binding owned by `owner`, e.g. on disconnect.
    pub fn remove_owner(&mut self, owner: Source) {
        self.bindings.retain(|_, b| b.owner != owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(n: u64) -> Source {
        Source::from_raw(n)
    }

    #[test]
    fn install_and_lookup_round_trips() {
        let mut t = KeyBindTable::new();
        t.bind(0b101, 42, src(1), BindResponse::Steal);
        let b = t.lookup(0b101, 42).unwrap();
        assert_eq!(b.owner, src(1));
        assert_eq!(b.response, BindResponse::Steal);
        assert!(t.lookup(0b101, 43).is_none());
    }

    #[test]
    fn rebinding_overwrites() {
        let mut t = KeyBindTable::new();
        t.bind(1, 1, src(1), BindResponse::Steal);
        t.bind(1, 1, src(2), BindResponse::PassThrough);
        let b = t.lookup(1, 1).unwrap();
        assert_eq!(b.owner, src(2));
        assert_eq!(b.response, BindResponse::PassThrough);
    }

    #[test]
    fn remove_owner_clears_only_their_bindings() {
        let mut t = KeyBindTable::new();
        t.bind(1, 1, src(1), BindResponse::Steal);
        t.bind(2, 2, src(2), BindResponse::Steal);
        t.remove_owner(src(1));
        assert!(t.lookup(1, 1).is_none());
        assert!(t.lookup(2, 2).is_some());
    }
}
