//! Process entry point: parses the CLI, binds the client socket, forks the
//! first client, and wires up the four long-lived threads described in
//! DESIGN.md's concurrency section.
mod bootstrap;
mod cli;
mod dispatch;
mod error;
mod outbox;
mod render;
mod shared;
mod sources;

use clap::Parser;
use cli::Cli;
use compositor_channel::Channel;
use compositor_core::Server;
use outbox::SharedChannel;
use shared::SharedServer;
use sources::NeverDevice;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), error::StartupError> {
    let ident = bootstrap::server_ident(cli.nest);
    log::info!("starting as {} on {}x{}", ident, cli.geometry.width, cli.geometry.height);

    let channel = Channel::bind(&cli.socket).map_err(|source| error::StartupError::Socket {
        path: cli.socket.clone(),
        source,
    })?;
    let outbox = SharedChannel::new(channel);

    let pid = bootstrap::spawn_first_client(&cli.command, &ident)?;
    log::info!("first client pid {}", pid);

    let server = SharedServer::new(Server::new(cli.geometry.width, cli.geometry.height));

    let (tx, rx) = crossbeam_channel::unbounded();

    let transport_tx = tx.clone();
    let transport_channel = outbox.clone();
    std::thread::spawn(move || sources::run_transport(transport_channel, transport_tx));

    let mouse_tx = tx.clone();
    std::thread::spawn(move || sources::run_mouse_source(NeverDevice, mouse_tx));

    let key_tx = tx;
    std::thread::spawn(move || sources::run_key_source(NeverDevice, key_tx));

    let render_server = server.clone();
    let render_channel = outbox.clone();
    let (width, height) = (cli.geometry.width, cli.geometry.height);
    let nested = cli.nest;
    std::thread::spawn(move || {
        let (backbuffer, front, cursor) = render::default_backend(width, height);
        render::run_render(render_server, render_channel, backbuffer, front, cursor, nested);
    });

    dispatch::run_dispatch(server, outbox, rx);
    Ok(())
}
