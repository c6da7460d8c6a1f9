//! The client packet loop: decodes one already-framed packet at a
//! time, mutates the registry/damage queue/input state, and replies or
//! broadcasts as needed.
//!
//! Framing (the magic check and the `len`-vs-received-bytes check) is
//! already done by [`compositor_channel::Channel::recv`] before a packet
//! reaches here; what's left to validate is that the body's length actually
//! matches what its declared `ty` expects, since the channel has no notion
//! of message types. A packet that fails that check, or whose `ty` is not a
//! recognized [`Msg`], is logged and dropped; the connection is left open.
use crate::error::ProtocolError;
use crate::input::MouseSample;
use crate::outbox::Outbox;
use crate::registry::Wid;
use crate::server::{mark_for_close, Server};
use compositor_channel::Source;
use compositor_proto::{
    Band, BindResponse, Header, KeyBind, Msg, MouseEvent, QueryWindows, ResizeAccept, ResizeBufid,
    ResizeDone, ResizeOffer, ResizeRequest, SessionEnd, WindowAdvertise, WindowMove, WindowNew,
    WindowStack, WindowUpdateShape,
};
use compositor_wire::Wire as _;
use core::convert::TryFrom;

/// Synthetic flag bit OR'd into an advertised window's `flags` when it is
/// the currently focused window (the "advertised flags" rule).
const ADVERTISE_FOCUSED_BIT: u32 = 1 << 31;

/// Applies one already-framed packet from `source`. `header.ty` must still
/// be validated against `body`'s actual length; everything else about the
/// header has already been checked by the transport.
pub fn dispatch(server: &mut Server, outbox: &mut impl Outbox, source: Source, header: Header, body: &[u8]) {
    let msg = match Msg::try_from(header.ty) {
        Ok(msg) => msg,
        Err(ty) => {
            log::warn!("{}", ProtocolError::UnknownMessageType { source, ty });
            return;
        }
    };
    let expected = compositor_proto::body_len(header.ty).expect("ty already validated above");
    if body.len() != expected {
        log::warn!(
            "{}",
            ProtocolError::BadBodyLength { source, ty: header.ty, got: body.len(), expected }
        );
        return;
    }

    let window = Wid(header.window);
    match msg {
        Msg::Hello => on_hello(server, outbox, source),
        Msg::WindowNew => on_window_new(server, outbox, source, body),
        Msg::Flip => on_flip(server, source, window),
        Msg::FlipRegion => on_flip_region(server, source, window, body),
        Msg::KeyEvent => on_key_event(server, outbox, body),
        Msg::MouseEvent => on_mouse_event(server, outbox, body),
        Msg::WindowMove => on_window_move(server, source, window, body),
        Msg::WindowClose => on_window_close(server, outbox, source, window),
        Msg::WindowStack => on_window_stack(server, source, window, body),
        Msg::ResizeRequest => on_resize_request(server, outbox, source, window, body),
        Msg::ResizeOffer => on_resize_offer_echo(outbox, source, window, body),
        Msg::ResizeAccept => on_resize_accept(server, outbox, source, window, body),
        Msg::ResizeDone => on_resize_done(server, source, window, body),
        Msg::QueryWindows => on_query_windows(server, outbox, source),
        Msg::Subscribe => {
            server.shared.subscribers.insert(source);
        }
        Msg::Unsubscribe => {
            server.shared.subscribers.remove(&source);
        }
        Msg::WindowAdvertise => on_window_advertise(server, outbox, source, window, body),
        Msg::SessionEnd => on_session_end(server, outbox),
        Msg::WindowFocus => on_window_focus(server, outbox, source, window),
        Msg::KeyBind => on_key_bind(server, source, body),
        Msg::WindowDragStart => on_window_drag_start(server, source, window),
        Msg::WindowUpdateShape => on_window_update_shape(server, source, window, body),
        // The remaining types are server-to-client only; a client sending
        // one back is sending nonsense.
        other => log::warn!("client {:?} sent reply-only message type {:?}", source, other),
    }
}

fn owns(server: &Server, source: Source, wid: Wid) -> bool {
    server.shared.registry.lookup(wid).map(|w| w.owner == source).unwrap_or(false)
}

fn on_hello(server: &mut Server, outbox: &mut impl Outbox, source: Source) {
    server.shared.clients.insert(source);
    outbox.send(source, 0, &compositor_proto::Welcome { screen_width: server.screen.width, screen_height: server.screen.height });
}

fn on_window_new(server: &mut Server, outbox: &mut impl Outbox, source: Source, body: &[u8]) {
    let req = WindowNew::from_bytes(body);
    match server.shared.registry.create(source, req.width, req.height, server.tick) {
        Ok(wid) => {
            let bufid = server.shared.registry.lookup(wid).map(|w| w.bufid()).unwrap_or(0);
            outbox.send(
                source,
                wid.0,
                &compositor_proto::WindowInit { wid: wid.0, width: req.width, height: req.height, bufid },
            );
            server.shared.notify_subscribers(outbox);
            log::debug!("client {:?} created window {} ({}x{})", source, wid.0, req.width, req.height);
        }
        Err(e) => log::warn!("failed to allocate window for {:?}: {}", source, e),
    }
}

fn on_flip(server: &mut Server, source: Source, wid: Wid) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
}

fn on_flip_region(server: &mut Server, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let region = compositor_proto::FlipRegion::from_bytes(body);
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window_relative(w, region.x, region.y, region.width, region.height);
    }
}

fn on_key_event(server: &mut Server, outbox: &mut impl Outbox, body: &[u8]) {
    let ev = compositor_proto::KeyEvent::from_bytes(body);
    let (screen_w, screen_h) = (server.screen.width, server.screen.height);
    let mut input = std::mem::take(&mut server.input);
    input.handle_key(
        &mut server.shared,
        &mut server.damage,
        &server.binds,
        outbox,
        screen_w,
        screen_h,
        ev.keycode,
        ev.modifiers,
        ev.pressed != 0,
    );
    server.input = input;
}

fn on_mouse_event(server: &mut Server, outbox: &mut impl Outbox, body: &[u8]) {
    let ev = MouseEvent::from_bytes(body);
    let (screen_w, screen_h) = (server.screen.width, server.screen.height);
    let sample = MouseSample { x: ev.x, y: ev.y, buttons: ev.buttons, button: ev.button, pressed: ev.pressed != 0 };
    let mut input = std::mem::take(&mut server.input);
    input.handle_mouse(&mut server.shared, &mut server.damage, outbox, screen_w, screen_h, sample);
    server.input = input;
}

fn on_window_move(server: &mut Server, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let req = WindowMove::from_bytes(body);
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
    if let Some(w) = server.shared.registry.lookup_mut(wid) {
        w.x = req.x;
        w.y = req.y;
    }
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
}

fn on_window_close(server: &mut Server, outbox: &mut impl Outbox, source: Source, wid: Wid) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    mark_for_close(&mut server.shared.registry, &mut server.damage, server.tick, wid);
    server.shared.notify_subscribers(outbox);
}

fn on_window_stack(server: &mut Server, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let req = WindowStack::from_bytes(body);
    let band = match Band::try_from(req.band) {
        Ok(band) => band,
        Err(_) => {
            log::warn!("client {:?} requested unknown band {}", source, req.band);
            return;
        }
    };
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
    server.shared.registry.reorder(wid, band);
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
}

fn on_resize_request(server: &Server, outbox: &mut impl Outbox, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let req = ResizeRequest::from_bytes(body);
    outbox.send(source, wid.0, &ResizeOffer { width: req.width, height: req.height, flags: 0 });
}

/// A `RESIZE_OFFER` sent by a server-owning client (e.g. a session manager
/// driving a resize on another client's behalf, rather than the usual
/// server-to-client direction) is echoed straight back to its sender
/// unchanged. Unlike the other handlers this performs no
/// ownership check: the sender need not own `wid`.
fn on_resize_offer_echo(outbox: &mut impl Outbox, source: Source, wid: Wid, body: &[u8]) {
    let req = ResizeOffer::from_bytes(body);
    outbox.send(source, wid.0, &ResizeOffer { width: req.width, height: req.height, flags: req.flags });
}

fn on_resize_accept(server: &mut Server, outbox: &mut impl Outbox, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let req = ResizeAccept::from_bytes(body);
    let already_pending = server.shared.registry.lookup(wid).and_then(|w| w.pending_buffer.as_ref()).is_some();
    if already_pending {
        // Resize races are idempotent: re-report the in-flight buffer.
        if let Some(w) = server.shared.registry.lookup(wid) {
            if let Some(pending) = &w.pending_buffer {
                let bufid = pending.id().as_u32();
                outbox.send(source, wid.0, &ResizeBufid { width: pending.width(), height: pending.height(), bufid });
            }
        }
        return;
    }
    match compositor_shm::Buffer::new(req.width, req.height) {
        Ok(buffer) => {
            let bufid = buffer.id().as_u32();
            let (width, height) = (buffer.width(), buffer.height());
            if let Some(w) = server.shared.registry.lookup_mut(wid) {
                w.pending_buffer = Some(buffer);
            }
            outbox.send(source, wid.0, &ResizeBufid { width, height, bufid });
        }
        Err(e) => log::warn!("failed to allocate resize buffer for window {}: {}", wid.0, e),
    }
}

fn on_resize_done(server: &mut Server, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let req = ResizeDone::from_bytes(body);
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
    if let Some(w) = server.shared.registry.lookup_mut(wid) {
        if let Some(pending) = w.pending_buffer.take() {
            w.buffer = pending;
            w.width = req.width;
            w.height = req.height;
        }
    }
    if let Some(w) = server.shared.registry.lookup(wid) {
        server.damage.mark_window(w);
    }
}

fn on_query_windows(server: &Server, outbox: &mut impl Outbox, source: Source) {
    for w in server.shared.registry.paint_order() {
        let mut flags = w.client_flags;
        if server.shared.registry.focus == Some(w.wid) {
            flags |= ADVERTISE_FOCUSED_BIT;
        }
        outbox.send(
            source,
            w.wid.0,
            &WindowAdvertise {
                wid: w.wid.0,
                flags,
                offsets: w.client_offsets,
                width: w.width,
                height: w.height,
                x: w.x,
                y: w.y,
                strings: w.client_strings,
            },
        );
    }
    outbox.send(source, 0, &WindowAdvertise::default());
}

fn on_window_advertise(server: &mut Server, outbox: &mut impl Outbox, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let adv = WindowAdvertise::from_bytes(body);
    if let Some(w) = server.shared.registry.lookup_mut(wid) {
        w.client_flags = adv.flags;
        w.client_offsets = adv.offsets;
        w.client_strings = adv.strings;
    }
    server.shared.notify_subscribers(outbox);
}

fn on_session_end(server: &Server, outbox: &mut impl Outbox) {
    for &client in &server.shared.clients {
        outbox.send(client, 0, &SessionEnd {});
    }
}

fn on_window_focus(server: &mut Server, outbox: &mut impl Outbox, source: Source, wid: Wid) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    server.shared.set_focus(outbox, Some(wid));
}

fn on_key_bind(server: &mut Server, source: Source, body: &[u8]) {
    let req = KeyBind::from_bytes(body);
    let response = match BindResponse::try_from(req.response) {
        Ok(r) => r,
        Err(_) => {
            log::warn!("client {:?} requested unknown bind response {}", source, req.response);
            return;
        }
    };
    server.binds.bind(req.modifiers, req.keycode, source, response);
}

fn on_window_drag_start(server: &mut Server, source: Source, wid: Wid) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let mut input = std::mem::take(&mut server.input);
    input.begin_drag(&mut server.shared, wid);
    server.input = input;
}

fn on_window_update_shape(server: &mut Server, source: Source, wid: Wid, body: &[u8]) {
    if !owns(server, source, wid) {
        log::warn!("{}", ProtocolError::UnknownWindow { source, wid: wid.0 });
        return;
    }
    let req = WindowUpdateShape::from_bytes(body);
    if let Some(w) = server.shared.registry.lookup_mut(wid) {
        w.alpha_threshold = req.alpha_threshold as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::RecordingOutbox;
    use compositor_proto::{Flip, Hello, Msg as WireMsg, WindowNew as WireWindowNew, MAGIC};

    fn src(n: u64) -> Source {
        Source::from_raw(n)
    }

    fn header_for<M: compositor_proto::Message>(window: u32, msg: &M) -> Header {
        Header { magic: MAGIC, ty: M::KIND as u32, window, len: msg.as_bytes().len() as u32 }
    }

    #[test]
    fn hello_replies_with_welcome() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let msg = Hello {};
        dispatch(&mut server, &mut ob, src(1), header_for(0, &msg), msg.as_bytes());
        assert_eq!(ob.sent.len(), 1);
        assert_eq!(ob.sent[0].2, WireMsg::Welcome as u32);
    }

    #[test]
    fn session_end_reaches_a_client_that_never_created_a_window_or_subscribed() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let idle_client = src(7);
        let hello = Hello {};
        dispatch(&mut server, &mut ob, idle_client, header_for(0, &hello), hello.as_bytes());
        ob.sent.clear();

        let end = SessionEnd {};
        dispatch(&mut server, &mut ob, idle_client, header_for(0, &end), end.as_bytes());

        assert!(ob.sent.iter().any(|(dest, _, kind, _)| *dest == idle_client && *kind == WireMsg::SessionEnd as u32));
    }

    #[test]
    fn disconnect_removes_the_client_from_future_session_end_broadcasts() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let client = src(3);
        let hello = Hello {};
        dispatch(&mut server, &mut ob, client, header_for(0, &hello), hello.as_bytes());
        server.disconnect_client(client);
        ob.sent.clear();

        let end = SessionEnd {};
        dispatch(&mut server, &mut ob, client, header_for(0, &end), end.as_bytes());

        assert!(!ob.sent.iter().any(|(dest, _, _, _)| *dest == client));
    }

    #[test]
    fn window_new_then_flip_marks_damage() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let msg = WireWindowNew { width: 10, height: 10 };
        dispatch(&mut server, &mut ob, src(1), header_for(0, &msg), msg.as_bytes());
        let wid = server.shared.registry.iter().next().unwrap().wid;
        assert!(!server.damage.is_empty());
        server.damage.drain();
        let flip = Flip {};
        dispatch(&mut server, &mut ob, src(1), header_for(wid.0, &flip), flip.as_bytes());
        assert!(!server.damage.is_empty());
    }

    #[test]
    fn flip_from_non_owner_is_rejected() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let wid = server.shared.registry.create(src(1), 10, 10, 0).unwrap();
        server.damage.drain();
        let flip = Flip {};
        dispatch(&mut server, &mut ob, src(2), header_for(wid.0, &flip), flip.as_bytes());
        assert!(server.damage.is_empty());
    }

    #[test]
    fn unknown_type_is_dropped() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let header = Header { magic: MAGIC, ty: 0xFFFF_FFFF, window: 0, len: 0 };
        dispatch(&mut server, &mut ob, src(1), header, &[]);
        assert!(ob.sent.is_empty());
    }

    #[test]
    fn wrong_body_length_for_a_known_type_is_dropped() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let header = Header { magic: MAGIC, ty: WireMsg::Hello as u32, window: 0, len: 4 };
        dispatch(&mut server, &mut ob, src(1), header, &[0, 0, 0, 0]);
        assert!(ob.sent.is_empty());
    }

    #[test]
    fn resize_accept_twice_reports_the_same_pending_bufid() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        let owner = src(4);
        let wid = server.shared.registry.create(owner, 10, 10, 0).unwrap();
        let accept = ResizeAccept { width: 20, height: 20 };
        dispatch(&mut server, &mut ob, owner, header_for(wid.0, &accept), accept.as_bytes());
        let accept2 = ResizeAccept { width: 30, height: 30 };
        dispatch(&mut server, &mut ob, owner, header_for(wid.0, &accept2), accept2.as_bytes());
        let bufids: Vec<u32> = ob
            .sent
            .iter()
            .filter(|(_, _, k, _)| *k == WireMsg::ResizeBufid as u32)
            .map(|(_, _, _, body)| ResizeBufid::from_bytes(body).bufid)
            .collect();
        assert_eq!(bufids.len(), 2);
        assert_eq!(bufids[0], bufids[1]);
    }

    #[test]
    fn query_windows_streams_one_advertise_per_window_plus_terminator() {
        let mut server = Server::new(800, 600);
        let mut ob = RecordingOutbox::new();
        server.shared.registry.create(src(1), 10, 10, 0).unwrap();
        server.shared.registry.create(src(1), 10, 10, 0).unwrap();
        let query = QueryWindows {};
        dispatch(&mut server, &mut ob, src(1), header_for(0, &query), query.as_bytes());
        assert_eq!(ob.sent.len(), 3);
        assert_eq!(ob.sent[2].1, 0);
    }
}
