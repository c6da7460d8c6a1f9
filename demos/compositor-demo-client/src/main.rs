//! A minimal client: connects, creates one window, paints a solid shade
//! into its shared buffer, flips it, then prints every event it receives
//! until Escape is pressed.
//!
//! Mirrors the shape of a GUI agent demo: connect, create a window, write
//! pixels, loop on input events.
use compositor_channel::{Channel, Recv};
use compositor_proto::{Flip, Hello, Msg, WindowNew, MAGIC};
use compositor_shm::{BufId, ClientMapping};
use compositor_wire::Wire as _;
use std::convert::TryFrom;
use std::env;
use std::io;

/// evdev keycode for Escape.
const KEY_ESC: u32 = 1;

fn main() -> io::Result<()> {
    let socket_path = env::args().nth(1).unwrap_or_else(|| "/tmp/compositor.sock".to_string());
    let my_path = format!("/tmp/compositor-demo-client-{}.sock", std::process::id());

    let mut channel = Channel::connect(&my_path, &socket_path)?;
    let server = Channel::server();

    channel.send_raw(server, Msg::Hello as u32, 0, Hello {}.as_bytes())?;
    println!("sent HELLO, waiting for WELCOME");

    let welcome = recv_packet(&mut channel, Msg::Welcome);
    let welcome = compositor_proto::Welcome::from_bytes(&welcome);
    println!("screen is {}x{}", welcome.screen_width, welcome.screen_height);

    let (width, height) = (200u32, 150u32);
    channel.send_raw(server, Msg::WindowNew as u32, 0, WindowNew { width, height }.as_bytes())?;
    let init = recv_packet(&mut channel, Msg::WindowInit);
    let init = compositor_proto::WindowInit::from_bytes(&init);
    println!(
        "created window {} ({}x{}), bufid {}",
        init.wid, init.width, init.height, init.bufid
    );

    let mut mapping =
        ClientMapping::open(BufId::from_raw(init.bufid), init.width, init.height).expect("map window buffer");
    paint_shade(&mut mapping);

    channel.send_raw(server, Msg::Flip as u32, init.wid, Flip {}.as_bytes())?;
    println!("flipped, now watching for events (Escape to quit)");

    loop {
        channel.wait();
        loop {
            match channel.recv() {
                Ok(Some(Recv::Packet(_source, header, body))) => {
                    if describe(header.ty, &body) {
                        return Ok(());
                    }
                }
                Ok(Some(Recv::Disconnect(_))) => {
                    println!("server disconnected us");
                    return Ok(());
                }
                Ok(None) => break,
                Err(e) => println!("malformed packet: {}", e),
            }
        }
    }
}

fn recv_packet(channel: &mut Channel, expect: Msg) -> Vec<u8> {
    loop {
        channel.wait();
        match channel.recv() {
            Ok(Some(Recv::Packet(_source, header, body))) if header.magic == MAGIC && Msg::try_from(header.ty) == Ok(expect) => {
                return body;
            }
            Ok(_) => continue,
            Err(e) => println!("ignoring malformed packet while waiting for {:?}: {}", expect, e),
        }
    }
}

fn paint_shade(mapping: &mut ClientMapping) {
    let pixels = mapping.as_mut_slice();
    for chunk in pixels.chunks_mut(4) {
        chunk.copy_from_slice(&0xFF00_80FFu32.to_ne_bytes());
    }
}

/// Prints a decoded event. Returns `true` if the client should exit.
fn describe(ty: u32, body: &[u8]) -> bool {
    let msg = match Msg::try_from(ty) {
        Ok(m) => m,
        Err(ty) => {
            println!("unknown message type {}", ty);
            return false;
        }
    };
    match msg {
        Msg::KeyEvent => {
            let ev = compositor_proto::KeyEvent::from_bytes(body);
            println!("key event: {:?}", ev);
            ev.pressed != 0 && ev.keycode == KEY_ESC
        }
        Msg::MouseDown => {
            println!("mouse down: {:?}", compositor_proto::MouseDown::from_bytes(body));
            false
        }
        Msg::MouseClick => {
            println!("mouse click: {:?}", compositor_proto::MouseClick::from_bytes(body));
            false
        }
        Msg::MouseRaise => {
            println!("mouse raise: {:?}", compositor_proto::MouseRaise::from_bytes(body));
            false
        }
        Msg::MouseDrag => {
            println!("mouse drag: {:?}", compositor_proto::MouseDrag::from_bytes(body));
            false
        }
        Msg::MouseMoveEvent => {
            println!("mouse move: {:?}", compositor_proto::MouseMoveEvent::from_bytes(body));
            false
        }
        Msg::MouseEnter => {
            println!("mouse entered");
            false
        }
        Msg::MouseLeave => {
            println!("mouse left");
            false
        }
        Msg::FocusChange => {
            println!("focus change: {:?}", compositor_proto::FocusChange::from_bytes(body));
            false
        }
        Msg::WindowsChanged => {
            println!("window list changed");
            false
        }
        other => {
            println!("got {:?}", other);
            false
        }
    }
}
